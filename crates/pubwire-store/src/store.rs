//! The identifier store: a concurrent map from monotonically increasing ids
//! to owned items.
//!
//! # Concurrency
//!
//! Each store has one [`RwLock`]. Any number of `get`/`for_each` calls run
//! together; `put`, `put_with`, `update` and `delete` each take the lock
//! exclusively for the duration of one mutation. Id assignment happens
//! inside that exclusive section, so two concurrent `put`s never see the
//! same id.
//!
//! # Reentrancy
//!
//! A `for_each` visitor must not mutate the store it is visiting: the
//! visitor runs under the read lock and a mutation would wait forever for
//! the write lock. The store tracks which instances the current thread is
//! visiting and panics on such a call instead of deadlocking. Collect the
//! ids during the traversal and mutate afterwards.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

thread_local! {
    /// Addresses of the stores this thread is currently inside `for_each` of.
    static VISITING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

struct Inner<T> {
    items: HashMap<u64, T>,
    /// Last id handed out. Ids start at 1, so 0 means "none yet".
    last_id: u64,
}

/// A concurrent map from synthetic `u64` ids to owned items.
///
/// ## Invariants
///
/// - the first id is 1;
/// - every `put` returns an id strictly greater than all earlier ones;
/// - ids are never reused, even after `delete`;
/// - an id maps to at most one item at a time.
///
/// Absence is an expected outcome, not an error: lookups return `Option`,
/// mutations of absent ids return `false`.
pub struct IdentifierStore<T> {
    inner: RwLock<Inner<T>>,
}

impl<T> IdentifierStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                items: HashMap::new(),
                last_id: 0,
            }),
        }
    }

    /// Inserts an item under the next id and returns that id.
    pub fn put(&self, item: T) -> u64 {
        self.put_with(|_| item)
    }

    /// Builds an item from its own id and inserts it.
    ///
    /// Useful when the item needs to know its id, like a subscriber record.
    /// `build` runs inside the exclusive section, so it must not touch this
    /// store.
    pub fn put_with(&self, build: impl FnOnce(u64) -> T) -> u64 {
        let mut inner = self.write("put");
        inner.last_id += 1;
        let id = inner.last_id;
        inner.items.insert(id, build(id));
        tracing::trace!(id, "store put");
        id
    }

    /// Replaces the item at `id`. Returns `false`, changing nothing, if `id`
    /// is absent.
    pub fn update(&self, id: u64, item: T) -> bool {
        let mut inner = self.write("update");
        match inner.items.get_mut(&id) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    /// Removes the item at `id`. Returns whether anything was removed.
    pub fn delete(&self, id: u64) -> bool {
        let removed = self.write("delete").items.remove(&id).is_some();
        if removed {
            tracing::trace!(id, "store delete");
        }
        removed
    }

    /// Calls `visitor` for every entry under a shared read lock.
    ///
    /// Iteration order is unspecified. The visitor must not call `put`,
    /// `put_with`, `update` or `delete` on this store; doing so panics.
    pub fn for_each(&self, mut visitor: impl FnMut(u64, &T)) {
        let inner = self.read();
        let _visit = VisitGuard::enter(self.addr());
        for (id, item) in &inner.items {
            visitor(*id, item);
        }
    }

    /// Returns the number of items currently stored.
    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    /// Returns `true` if the store holds no items.
    pub fn is_empty(&self) -> bool {
        self.read().items.is_empty()
    }

    /// Returns the ids currently in use, in ascending order.
    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.read().items.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn addr(&self) -> usize {
        self as *const Self as usize
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<T>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, op: &str) -> RwLockWriteGuard<'_, Inner<T>> {
        let addr = self.addr();
        let reentrant = VISITING.with(|v| v.borrow().contains(&addr));
        assert!(
            !reentrant,
            "IdentifierStore::{op} called from inside for_each on the same store"
        );
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> IdentifierStore<T> {
    /// Returns a clone of the item at `id`, or `None` if absent.
    pub fn get(&self, id: u64) -> Option<T> {
        self.read().items.get(&id).cloned()
    }
}

impl<T> Default for IdentifierStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for IdentifierStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read();
        f.debug_struct("IdentifierStore")
            .field("len", &inner.items.len())
            .field("last_id", &inner.last_id)
            .finish()
    }
}

/// Marks a store as being visited by this thread until dropped, panics
/// included.
///
/// ## Why the marker is thread-local
///
/// `for_each` is synchronous and holds the read lock for the whole
/// traversal, so the visitor always runs on the thread that entered
/// `for_each`. A reentrant `put` or `delete` therefore comes from the same
/// thread, and a per-thread list of "stores I am inside" is enough to
/// catch it. Another thread mutating the store at the same time is not
/// reentrancy; it simply waits for the traversal to finish, so it must not
/// see this thread's marker.
///
/// The list holds store addresses rather than a single flag so that a
/// visitor may freely mutate a *different* store, and nested `for_each`
/// calls on several stores unwind correctly.
///
/// ## Panics in the visitor
///
/// The marker is removed in `Drop`, which also runs while a panic unwinds
/// out of the visitor. Without that, a caught panic would leave the store
/// marked and every later mutation on this thread would be refused.
struct VisitGuard {
    addr: usize,
}

impl VisitGuard {
    fn enter(addr: usize) -> Self {
        VISITING.with(|v| v.borrow_mut().push(addr));
        Self { addr }
    }
}

impl Drop for VisitGuard {
    fn drop(&mut self) {
        VISITING.with(|v| {
            let mut visiting = v.borrow_mut();
            if let Some(pos) = visiting.iter().rposition(|a| *a == self.addr) {
                visiting.remove(pos);
            }
        });
    }
}
