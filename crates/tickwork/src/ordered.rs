//! Ordered multi-resource locking.
//!
//! Every participant in a multi-resource operation locks in ascending
//! [`LockId`] order and unlocks in descending order. Two callers asking for
//! overlapping sets therefore always contend in the same relative order, which
//! rules out circular waits. The guarantee only holds if every resource keeps
//! one process-unique id for its whole lifetime; [`ResourceLock`] allocates its
//! id at construction for exactly that reason.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

pub type LockId = u64;

/// A resource that can take part in [`acquire_all`].
pub trait Lockable {
    /// Stable, process-unique id used for ordering.
    fn lock_id(&self) -> LockId;
    fn lock(&self);
    fn unlock(&self);
}

impl<T: Lockable + ?Sized> Lockable for &T {
    fn lock_id(&self) -> LockId {
        (**self).lock_id()
    }

    fn lock(&self) {
        (**self).lock()
    }

    fn unlock(&self) {
        (**self).unlock()
    }
}

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

/// Blocking binary lock with an id handed out from a process-wide counter.
///
/// It guards no data of its own: holders agree that whatever the lock stands
/// for (an actor, a location) is theirs until they unlock.
#[derive(Debug)]
pub struct ResourceLock {
    id: LockId,
    held: Mutex<bool>,
    released: Condvar,
}

impl ResourceLock {
    pub fn new() -> Self {
        Self {
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
            held: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    pub fn id(&self) -> LockId {
        self.id
    }

    pub fn is_locked(&self) -> bool {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ResourceLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockable for ResourceLock {
    fn lock_id(&self) -> LockId {
        self.id
    }

    fn lock(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while *held {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
    }

    fn unlock(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert!(*held, "unlock of resource {} that is not locked", self.id);
        *held = false;
        drop(held);
        self.released.notify_one();
    }
}

/// Lock every resource in ascending id order.
///
/// Sorts `resources` in place. Repeated ids are treated as the same resource
/// and locked once.
pub fn lock_all<L: Lockable + ?Sized>(resources: &mut [&L]) {
    resources.sort_by_key(|r| r.lock_id());
    let mut last = None;
    for r in resources.iter() {
        let id = r.lock_id();
        if last == Some(id) {
            continue;
        }
        r.lock();
        last = Some(id);
    }
}

/// Unlock every resource in descending id order; the mirror of [`lock_all`].
pub fn unlock_all<L: Lockable + ?Sized>(resources: &mut [&L]) {
    resources.sort_by_key(|r| std::cmp::Reverse(r.lock_id()));
    let mut last = None;
    for r in resources.iter() {
        let id = r.lock_id();
        if last == Some(id) {
            continue;
        }
        r.unlock();
        last = Some(id);
    }
}

/// Locks taken by [`acquire_all`]; released in descending id order on drop.
#[must_use = "the resources are unlocked as soon as the guard is dropped"]
pub struct OrderedGuard<'a, L: Lockable + ?Sized> {
    // Ascending by id, no repeats.
    held: Vec<&'a L>,
}

/// Acquire all `resources` in ascending id order.
pub fn acquire_all<'a, L, I>(resources: I) -> OrderedGuard<'a, L>
where
    L: Lockable + ?Sized + 'a,
    I: IntoIterator<Item = &'a L>,
{
    let mut held: Vec<&'a L> = resources.into_iter().collect();
    held.sort_by_key(|r| r.lock_id());
    held.dedup_by_key(|r| r.lock_id());
    for r in &held {
        r.lock();
    }
    OrderedGuard { held }
}

impl<L: Lockable + ?Sized> OrderedGuard<'_, L> {
    /// Ids held, in the order they were locked.
    pub fn ids(&self) -> Vec<LockId> {
        self.held.iter().map(|r| r.lock_id()).collect()
    }

    pub fn release_all(self) {
        drop(self);
    }
}

impl<L: Lockable + ?Sized> Drop for OrderedGuard<'_, L> {
    fn drop(&mut self) {
        while let Some(r) = self.held.pop() {
            r.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Op {
        Lock(LockId),
        Unlock(LockId),
    }

    struct Recorder {
        id: LockId,
        log: Arc<Mutex<Vec<Op>>>,
    }

    impl Lockable for Recorder {
        fn lock_id(&self) -> LockId {
            self.id
        }

        fn lock(&self) {
            self.log.lock().unwrap().push(Op::Lock(self.id));
        }

        fn unlock(&self) {
            self.log.lock().unwrap().push(Op::Unlock(self.id));
        }
    }

    fn permutations(items: &[LockId]) -> Vec<Vec<LockId>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn guard_locks_ascending_and_unlocks_descending_for_every_permutation() {
        for order in permutations(&[7, 2, 11, 5]) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let recs = order
                .iter()
                .map(|&id| Recorder {
                    id,
                    log: log.clone(),
                })
                .collect::<Vec<_>>();

            let guard = acquire_all(recs.iter());
            assert_eq!(guard.ids(), vec![2, 5, 7, 11]);
            guard.release_all();

            let got = log.lock().unwrap().clone();
            assert_eq!(
                got,
                vec![
                    Op::Lock(2),
                    Op::Lock(5),
                    Op::Lock(7),
                    Op::Lock(11),
                    Op::Unlock(11),
                    Op::Unlock(7),
                    Op::Unlock(5),
                    Op::Unlock(2),
                ],
                "input order {order:?}"
            );
        }
    }

    #[test]
    fn slice_helpers_sort_in_place() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = Recorder {
            id: 3,
            log: log.clone(),
        };
        let b = Recorder {
            id: 1,
            log: log.clone(),
        };
        let c = Recorder {
            id: 2,
            log: log.clone(),
        };

        let mut set: Vec<&dyn Lockable> = vec![&a, &b, &c];
        lock_all(&mut set);
        let mut set: Vec<&dyn Lockable> = vec![&c, &a, &b];
        unlock_all(&mut set);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Op::Lock(1),
                Op::Lock(2),
                Op::Lock(3),
                Op::Unlock(3),
                Op::Unlock(2),
                Op::Unlock(1),
            ]
        );
    }

    #[test]
    fn repeated_resource_is_locked_once() {
        let r = ResourceLock::new();
        let other = ResourceLock::new();
        let guard = acquire_all([&r, &other, &r]);
        assert_eq!(guard.ids().len(), 2);
        assert!(r.is_locked());
        drop(guard);
        assert!(!r.is_locked());
        assert!(!other.is_locked());
    }

    #[test]
    fn resource_lock_ids_are_unique() {
        let locks = (0..64).map(|_| ResourceLock::new()).collect::<Vec<_>>();
        let mut ids = locks.iter().map(|l| l.id()).collect::<Vec<_>>();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), locks.len());
    }

    #[test]
    fn mixed_resource_kinds_share_one_ordering() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let rec = Recorder { id: 0, log };
        let real = ResourceLock::new();
        let set: [&dyn Lockable; 2] = [&real, &rec];
        let guard = acquire_all(set);
        assert_eq!(guard.ids(), vec![0, real.id()]);
    }

    // xorshift; good enough to shuffle two-element orders.
    fn next(state: &mut u64) -> u64 {
        let mut x = *state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        *state = x;
        x
    }

    #[test]
    fn reversed_requests_never_deadlock() {
        let mut seed = 0x9e37_79b9_7f4a_7c15u64;

        for _trial in 0..200 {
            let a = Arc::new(ResourceLock::new());
            let b = Arc::new(ResourceLock::new());
            let inside = Arc::new(AtomicBool::new(false));
            let (done_tx, done_rx) = std::sync::mpsc::channel();

            for flip in [false, true] {
                let (first, second) = if flip {
                    (b.clone(), a.clone())
                } else {
                    (a.clone(), b.clone())
                };
                let inside = inside.clone();
                let done_tx = done_tx.clone();
                let rounds = 1 + (next(&mut seed) % 20) as usize;
                std::thread::spawn(move || {
                    for _ in 0..rounds {
                        let guard = acquire_all([&*first, &*second]);
                        assert!(!inside.swap(true, Ordering::SeqCst));
                        std::thread::yield_now();
                        inside.store(false, Ordering::SeqCst);
                        drop(guard);
                    }
                    let _ = done_tx.send(());
                });
            }
            drop(done_tx);

            for _ in 0..2 {
                done_rx
                    .recv_timeout(Duration::from_secs(5))
                    .expect("ordered acquisition deadlocked");
            }
            assert!(!a.is_locked());
            assert!(!b.is_locked());
        }
    }
}
