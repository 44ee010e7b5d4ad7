//! Ed25519 key pairs and signatures for account signing.

use sha2::{Digest, Sha256};
use std::fmt;

/// Length of an account address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// An account signing key.
#[derive(Clone)]
pub struct KeyPair(ed25519_dalek::SigningKey);

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        KeyPair(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Derive a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        KeyPair(ed25519_dalek::SigningKey::from_bytes(seed))
    }

    /// Derive a keypair from a hex-encoded 32-byte seed.
    pub fn from_hex_seed(hex_seed: &str) -> Result<Self, KeyError> {
        let mut seed = [0u8; 32];
        hex::decode_to_slice(hex_seed.trim(), &mut seed).map_err(|_| KeyError::InvalidSeed)?;
        Ok(Self::from_seed(&seed))
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        Signature(self.0.sign(message).to_bytes())
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({:?})", self.public_key())
    }
}

/// A public key for signature verification.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Verify a signature.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        use ed25519_dalek::Verifier;
        let pk = match ed25519_dalek::VerifyingKey::from_bytes(&self.0) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        pk.verify(message, &sig).is_ok()
    }

    /// Hex encoding of the key bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Account address owned by this key: the leading [`ADDRESS_LEN`] bytes
    /// of its SHA-256 digest.
    pub fn address_bytes(&self) -> [u8; ADDRESS_LEN] {
        let digest = Sha256::digest(self.0);
        let mut address = [0u8; ADDRESS_LEN];
        address.copy_from_slice(&digest[..ADDRESS_LEN]);
        address
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// An Ed25519 signature (64 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// Get signature as byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex encoding of the signature bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", &self.to_hex()[..16])
    }
}

/// Errors when loading keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// Seed is not 32 bytes of hex.
    #[error("key seed must be 64 hex characters")]
    InvalidSeed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(b"sign doc");
        assert!(keypair.public_key().verify(b"sign doc", &signature));
        assert!(!keypair.public_key().verify(b"other doc", &signature));
    }

    #[test]
    fn test_keypair_from_seed_is_deterministic() {
        let kp1 = KeyPair::from_seed(&[42u8; 32]);
        let kp2 = KeyPair::from_hex_seed(&"2a".repeat(32)).unwrap();

        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.sign(b"m"), kp2.sign(b"m"));
    }

    #[test]
    fn test_address_bytes_follow_key() {
        let key = KeyPair::from_seed(&[7u8; 32]).public_key();
        let digest = Sha256::digest(key.0);

        assert_eq!(key.address_bytes(), digest[..ADDRESS_LEN]);
        assert_eq!(key.address_bytes(), key.address_bytes());
        assert_ne!(
            key.address_bytes(),
            KeyPair::from_seed(&[8u8; 32]).public_key().address_bytes()
        );
    }

    #[test]
    fn test_bad_hex_seed() {
        assert_eq!(KeyPair::from_hex_seed("abcd").unwrap_err(), KeyError::InvalidSeed);
        assert_eq!(
            KeyPair::from_hex_seed(&"xy".repeat(32)).unwrap_err(),
            KeyError::InvalidSeed
        );
    }
}
