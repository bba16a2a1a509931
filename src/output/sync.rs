//! Output synchronization across worker threads.
//!
//! One [`Synchronizer`] exists per top-level search. It mediates which
//! worker may drain its buffer chain to the shared sink:
//!
//! - `Unordered`: plain mutual exclusion; worker blocks appear in the order
//!   threads won the lock.
//! - `Ordered`: each worker is assigned a monotonically increasing slot at
//!   creation and blocks emit in ascending slot order, regardless of the
//!   order workers finish. Workers with no output mark themselves done in a
//!   slot bitset and run ahead without waking anyone; when the turn-holder
//!   finishes, any chain of already-completed later slots is collapsed in
//!   one pass.
//!
//! Cancellation is absorbing: once `last` holds the stop sentinel, acquire
//! returns immediately, all waiters wake, and no further emit blocks reach
//! the sink.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Sentinel slot value encoding a global cancel.
const STOP: usize = usize::MAX;

/// Output serialization policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    /// First-come serialization; emission order is lock acquisition order.
    Unordered,
    /// Strict ascending slot order with out-of-order completion tracking.
    Ordered,
}

/// Bitset of slots that finished ahead of the current turn.
///
/// Bit `n` means "slot `last + n` has completed". The turn-collapse in
/// [`Synchronizer::finish`] only needs three operations: test bit 0, shift
/// the whole set right by one, and set bit `n`. Bits are stored in `u64`
/// words; words are dropped from the front as the shift consumes them.
#[derive(Default)]
struct SlotBits {
    words: Vec<u64>,
}

impl SlotBits {
    fn test0(&self) -> bool {
        self.words.first().is_some_and(|w| w & 1 != 0)
    }

    fn shift_right(&mut self) {
        let n = self.words.len();
        for i in 0..n {
            self.words[i] >>= 1;
            if i + 1 < n {
                self.words[i] |= self.words[i + 1] << 63;
            }
        }
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }

    fn set(&mut self, n: usize) {
        let word = n / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (n % 64);
    }
}

/// Global coordinator gating access to the shared sink.
pub struct Synchronizer {
    mode: SyncMode,
    /// Main emit lock. In `Ordered` mode it is retained across the whole
    /// emit phase of the turn-holding slot.
    mutex: Mutex<()>,
    /// Threads wait here for their turn in `Ordered` mode.
    turn: Condvar,
    /// Next slot to assign, in worker creation order.
    next: AtomicUsize,
    /// Slot currently allowed to emit, or [`STOP`].
    last: AtomicUsize,
    /// Guards `completed` and the transition of `last` to [`STOP`].
    bits: Mutex<SlotBits>,
}

/// A held emit lock, returned by [`Synchronizer::acquire`].
pub type SyncGuard<'a> = MutexGuard<'a, ()>;

// A worker that panicked while holding a lock must not wedge the sink for
// the surviving workers; the protected state is a unit, so the "poisoned"
// value is always valid.
fn unpoison<'a, T>(r: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>) -> MutexGuard<'a, T> {
    r.unwrap_or_else(PoisonError::into_inner)
}

impl Synchronizer {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            mutex: Mutex::new(()),
            turn: Condvar::new(),
            next: AtomicUsize::new(0),
            last: AtomicUsize::new(0),
            bits: Mutex::new(SlotBits::default()),
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Assigns the next slot number, in worker creation order.
    pub fn assign_slot(&self) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Acquires emit access for `slot`, blocking in `Ordered` mode until it
    /// is this slot's turn or the synchronizer is cancelled. A lock already
    /// held is returned unchanged.
    pub fn acquire<'a>(&'a self, held: Option<SyncGuard<'a>>, slot: usize) -> SyncGuard<'a> {
        if let Some(guard) = held {
            return guard;
        }
        let mut guard = unpoison(self.mutex.lock());
        if self.mode == SyncMode::Ordered {
            loop {
                let last = self.last.load(Ordering::Acquire);
                if last == STOP || last == slot {
                    break;
                }
                guard = unpoison(self.turn.wait(guard));
            }
        }
        guard
    }

    /// Attempts to acquire emit access without blocking.
    ///
    /// `Unordered`: succeeds iff the lock is free right now. `Ordered`:
    /// never acquires lazily; a caller not already holding the lock must
    /// keep buffering instead.
    pub fn try_acquire(&self) -> Option<SyncGuard<'_>> {
        match self.mode {
            SyncMode::Unordered => self.mutex.try_lock().ok(),
            SyncMode::Ordered => None,
        }
    }

    /// Releases emit access in `Unordered` mode. In `Ordered` mode the lock
    /// is retained so the slot's emit phase stays atomic until
    /// [`finish`](Self::finish).
    pub fn release<'a>(&self, held: Option<SyncGuard<'a>>) -> Option<SyncGuard<'a>> {
        match self.mode {
            SyncMode::Unordered => None,
            SyncMode::Ordered => held,
        }
    }

    /// Marks `slot` finished and hands the turn onward in `Ordered` mode.
    ///
    /// Three cases under the bitset guard:
    /// - cancelled: drop any held lock and wake everyone;
    /// - `slot` holds the turn: advance `last`, collapsing the chain of
    ///   already-completed successors recorded in the bitset, then wake all
    ///   waiters;
    /// - `slot` ran ahead with no output: record bit `slot - last` and
    ///   return without waking anyone.
    pub fn finish(&self, held: Option<SyncGuard<'_>>, slot: usize) {
        if self.mode == SyncMode::Unordered {
            return;
        }

        let mut bits = unpoison(self.bits.lock());
        let last = self.last.load(Ordering::Acquire);

        if last == STOP {
            drop(held);
            self.turn.notify_all();
        } else if slot == last {
            let guard = self.acquire(held, slot);
            loop {
                self.last.fetch_add(1, Ordering::Release);
                bits.shift_right();
                if !bits.test0() {
                    break;
                }
            }
            drop(guard);
            self.turn.notify_all();
        } else {
            debug_assert!(slot > last);
            bits.set(slot - last);
        }
    }

    /// Cancels the synchronizer, releasing every thread waiting on its turn.
    pub fn cancel(&self) {
        match self.mode {
            SyncMode::Unordered => {
                self.last.store(STOP, Ordering::Release);
            }
            SyncMode::Ordered => {
                let bits = unpoison(self.bits.lock());
                self.last.store(STOP, Ordering::Release);
                drop(bits);
                self.turn.notify_all();
            }
        }
    }

    /// True once [`cancel`](Self::cancel) has run.
    pub fn cancelled(&self) -> bool {
        self.last.load(Ordering::Acquire) == STOP
    }
}
