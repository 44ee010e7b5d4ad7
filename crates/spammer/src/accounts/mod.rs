//! Per-account sequence allocation.
//!
//! The [`SequenceAllocator`] is the single owner of every account's
//! next-to-use sequence. Workers never see the counter itself: they receive a
//! [`Reservation`] and report back through [`SequenceAllocator::correct`],
//! [`SequenceAllocator::advance_past`] or [`SequenceAllocator::release`].
//!
//! Each account's state sits behind its own mutex, so reservations for
//! different accounts never contend. The concurrent map is only read-locked
//! long enough to clone the account's `Arc`.

use dashmap::DashMap;
use hardhat_types::{AccountAddress, AccountNumber, AccountState};
use parking_lot::Mutex;
use std::sync::Arc;

/// A lease on one sequence value of one account.
///
/// Held by exactly one worker from reservation to terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Account the sequence belongs to.
    pub account: AccountAddress,
    /// Reserved sequence value.
    pub sequence: u64,
    /// Account number, captured alongside so signing needs no second lookup.
    pub account_number: AccountNumber,
    /// Correction epoch the reservation was issued in.
    epoch: u64,
}

impl Reservation {
    /// Correction epoch this reservation was issued in.
    ///
    /// Every [`SequenceAllocator::correct`] starts a new epoch; the
    /// no-duplicate guarantee holds among reservations of the same epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Mutable per-account state.
#[derive(Debug)]
struct SequenceState {
    next: u64,
    epoch: u64,
    account_number: AccountNumber,
}

/// Errors from the allocator. Only an unregistered account can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("account {0} is not registered with the sequence allocator")]
    UnknownAccount(AccountAddress),
}

/// Owner of the next-to-use sequence of every account.
///
/// Cheap to clone; clones share state.
#[derive(Clone, Debug, Default)]
pub struct SequenceAllocator {
    accounts: Arc<DashMap<AccountAddress, Arc<Mutex<SequenceState>>>>,
}

impl SequenceAllocator {
    /// Create an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the discovered state of an account.
    ///
    /// Re-registering a known account overwrites its sequence (a resync) and
    /// starts a new epoch, exactly like a correction.
    pub fn register(&self, account: AccountAddress, state: AccountState) {
        match self.accounts.get(&account).map(|e| Arc::clone(e.value())) {
            Some(slot) => {
                let mut slot = slot.lock();
                slot.next = state.sequence;
                slot.account_number = state.account_number;
                slot.epoch += 1;
            }
            None => {
                self.accounts.insert(
                    account,
                    Arc::new(Mutex::new(SequenceState {
                        next: state.sequence,
                        epoch: 0,
                        account_number: state.account_number,
                    })),
                );
            }
        }
    }

    /// Whether the account is known.
    pub fn contains(&self, account: &AccountAddress) -> bool {
        self.accounts.contains_key(account)
    }

    /// Number of registered accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether no account is registered.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Reserve the next sequence of `account`.
    ///
    /// Reads and increments under the account's lock, so concurrent callers
    /// always receive distinct values.
    pub fn reserve(&self, account: &AccountAddress) -> Result<Reservation, SequenceError> {
        let slot = self.slot(account)?;
        let mut state = slot.lock();
        let sequence = state.next;
        state.next += 1;
        Ok(Reservation {
            account: account.clone(),
            sequence,
            account_number: state.account_number,
            epoch: state.epoch,
        })
    }

    /// Overwrite the next sequence with the value the ledger says it expects.
    ///
    /// Discards all speculative increments; the next [`reserve`](Self::reserve)
    /// returns exactly `expected`. Returns the value that was overwritten.
    pub fn correct(&self, account: &AccountAddress, expected: u64) -> Result<u64, SequenceError> {
        let slot = self.slot(account)?;
        let mut state = slot.lock();
        let previous = state.next;
        state.next = expected;
        state.epoch += 1;
        Ok(previous)
    }

    /// Read the next sequence without reserving it.
    pub fn peek(&self, account: &AccountAddress) -> Result<u64, SequenceError> {
        Ok(self.slot(account)?.lock().next)
    }

    /// Shift the next sequence by `delta`, saturating at zero and `u64::MAX`.
    ///
    /// Returns the new next value.
    pub fn peek_and_adjust(&self, account: &AccountAddress, delta: i64) -> Result<u64, SequenceError> {
        let slot = self.slot(account)?;
        let mut state = slot.lock();
        state.next = if delta >= 0 {
            state.next.saturating_add(delta.unsigned_abs())
        } else {
            state.next.saturating_sub(delta.unsigned_abs())
        };
        Ok(state.next)
    }

    /// Make sure the next reservation is strictly greater than `sequence`.
    ///
    /// Used when the ledger reports that `sequence` was already consumed.
    /// Never moves the counter backwards. Returns the new next value.
    pub fn advance_past(&self, account: &AccountAddress, sequence: u64) -> Result<u64, SequenceError> {
        let slot = self.slot(account)?;
        let mut state = slot.lock();
        if state.next <= sequence {
            state.next = sequence.saturating_add(1);
        }
        Ok(state.next)
    }

    /// Give back a reservation that was never broadcast.
    ///
    /// Only the most recent reservation of the current epoch can be returned;
    /// otherwise a later reservation or a correction already moved on and the
    /// call is a no-op. Returns whether the sequence was reclaimed.
    pub fn release(&self, reservation: &Reservation) -> Result<bool, SequenceError> {
        let slot = self.slot(&reservation.account)?;
        let mut state = slot.lock();
        if state.epoch == reservation.epoch && state.next == reservation.sequence + 1 {
            state.next = reservation.sequence;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// All registered accounts.
    pub fn accounts(&self) -> Vec<AccountAddress> {
        self.accounts.iter().map(|e| e.key().clone()).collect()
    }

    fn slot(&self, account: &AccountAddress) -> Result<Arc<Mutex<SequenceState>>, SequenceError> {
        // Clone the Arc so the map shard lock is released before the account lock is taken.
        self.accounts
            .get(account)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| SequenceError::UnknownAccount(account.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn allocator_with(account: &str, sequence: u64) -> (SequenceAllocator, AccountAddress) {
        let allocator = SequenceAllocator::new();
        let addr = AccountAddress::new(account);
        allocator.register(
            addr.clone(),
            AccountState {
                sequence,
                account_number: AccountNumber(7),
            },
        );
        (allocator, addr)
    }

    #[test]
    fn test_reserve_is_monotonic_from_initial_sequence() {
        let (allocator, addr) = allocator_with("acc", 10);

        let seqs: Vec<u64> = (0..5)
            .map(|_| allocator.reserve(&addr).unwrap().sequence)
            .collect();

        assert_eq!(seqs, vec![10, 11, 12, 13, 14]);
        assert_eq!(allocator.peek(&addr).unwrap(), 15);
    }

    #[test]
    fn test_reservation_carries_account_number() {
        let (allocator, addr) = allocator_with("acc", 0);
        let r = allocator.reserve(&addr).unwrap();
        assert_eq!(r.account_number, AccountNumber(7));
        assert_eq!(r.account, addr);
    }

    #[test]
    fn test_correction_converges_regardless_of_speculative_reservations() {
        let (allocator, addr) = allocator_with("acc", 10);
        for _ in 0..25 {
            allocator.reserve(&addr).unwrap();
        }

        let previous = allocator.correct(&addr, 12).unwrap();

        assert_eq!(previous, 35);
        assert_eq!(allocator.reserve(&addr).unwrap().sequence, 12);
        assert_eq!(allocator.reserve(&addr).unwrap().sequence, 13);
    }

    #[test]
    fn test_correction_starts_new_epoch() {
        let (allocator, addr) = allocator_with("acc", 0);
        let before = allocator.reserve(&addr).unwrap();
        allocator.correct(&addr, 0).unwrap();
        let after = allocator.reserve(&addr).unwrap();

        assert_eq!(before.sequence, after.sequence);
        assert_ne!(before.epoch(), after.epoch());
    }

    #[test]
    fn test_unknown_account() {
        let allocator = SequenceAllocator::new();
        let addr = AccountAddress::new("ghost");

        assert_eq!(
            allocator.reserve(&addr),
            Err(SequenceError::UnknownAccount(addr.clone()))
        );
        assert!(allocator.correct(&addr, 1).is_err());
        assert!(allocator.peek(&addr).is_err());
    }

    #[test]
    fn test_advance_past_never_moves_backwards() {
        let (allocator, addr) = allocator_with("acc", 5);

        assert_eq!(allocator.advance_past(&addr, 9).unwrap(), 10);
        assert_eq!(allocator.advance_past(&addr, 3).unwrap(), 10);
    }

    #[test]
    fn test_peek_and_adjust_saturates() {
        let (allocator, addr) = allocator_with("acc", 2);

        assert_eq!(allocator.peek_and_adjust(&addr, 1).unwrap(), 3);
        assert_eq!(allocator.peek_and_adjust(&addr, -10).unwrap(), 0);
    }

    #[test]
    fn test_release_only_reclaims_latest_reservation() {
        let (allocator, addr) = allocator_with("acc", 0);

        let first = allocator.reserve(&addr).unwrap();
        let second = allocator.reserve(&addr).unwrap();

        // A later reservation exists: first cannot be reclaimed.
        assert!(!allocator.release(&first).unwrap());
        assert!(allocator.release(&second).unwrap());
        assert_eq!(allocator.reserve(&addr).unwrap().sequence, 1);
    }

    #[test]
    fn test_release_after_correction_is_noop() {
        let (allocator, addr) = allocator_with("acc", 0);

        let r = allocator.reserve(&addr).unwrap();
        allocator.correct(&addr, 1).unwrap();

        assert!(!allocator.release(&r).unwrap());
        assert_eq!(allocator.peek(&addr).unwrap(), 1);
    }

    #[test]
    fn test_reregister_resyncs() {
        let (allocator, addr) = allocator_with("acc", 0);
        allocator.reserve(&addr).unwrap();

        allocator.register(
            addr.clone(),
            AccountState {
                sequence: 40,
                account_number: AccountNumber(7),
            },
        );

        assert_eq!(allocator.len(), 1);
        assert_eq!(allocator.reserve(&addr).unwrap().sequence, 40);
    }

    async fn reserve_concurrently(n: usize) {
        let (allocator, addr) = allocator_with("acc", 100);

        let handles: Vec<_> = (0..n)
            .map(|_| {
                let allocator = allocator.clone();
                let addr = addr.clone();
                tokio::spawn(async move { allocator.reserve(&addr).unwrap().sequence })
            })
            .collect();

        let mut seen = HashSet::with_capacity(n);
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()), "duplicate sequence");
        }

        let expected: HashSet<u64> = (100..100 + n as u64).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_duplicate_reservation_two() {
        reserve_concurrently(2).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_duplicate_reservation_hundred() {
        reserve_concurrently(100).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_no_duplicate_reservation_ten_thousand() {
        reserve_concurrently(10_000).await;
    }

    #[test]
    fn test_accounts_do_not_share_counters() {
        let (allocator, a) = allocator_with("a", 0);
        let b = AccountAddress::new("b");
        allocator.register(
            b.clone(),
            AccountState {
                sequence: 50,
                account_number: AccountNumber(8),
            },
        );

        assert_eq!(allocator.reserve(&a).unwrap().sequence, 0);
        assert_eq!(allocator.reserve(&b).unwrap().sequence, 50);
        assert_eq!(allocator.reserve(&a).unwrap().sequence, 1);
    }
}
