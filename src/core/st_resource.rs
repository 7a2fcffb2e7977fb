use std::{
    rc::Rc,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError},
};

/// A single-threaded, reference-counted resource with interior mutability.
///
/// `StResource` uses `Rc<RwLock<T>>` internally, which makes it `!Send`. The render
/// context is stored in one of these so the GPU backend stays pinned to the thread
/// that created it, while the `RwLock` still refuses re-entrant exclusive access.
///
/// # Examples
/// ```
/// use voxel_terrain::core::StResource;
///
/// let resource = StResource::new(vec![1, 2, 3]);
/// let clone = resource.clone();
///
/// clone.get_mut().push(4);
/// assert_eq!(resource.get().len(), 4);
/// ```
///
/// # Panics
/// - Panics if the lock is poisoned
/// - Deadlocks if a guard is held while trying to acquire a write guard in the same thread;
///   use `try_get_mut` when re-entrancy is possible
pub struct StResource<T> {
    resource: Rc<RwLock<T>>,
}

impl<T> StResource<T> {
    /// Creates a new `StResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Rc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read-only guard that allows reading the contained value.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap()
    }

    /// Returns a mutable guard that allows modifying the contained value.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap()
    }

    /// Attempts to take a mutable guard without blocking.
    ///
    /// # Returns
    /// `None` if another guard on this thread is still alive.
    pub fn try_get_mut(&self) -> Option<RwLockWriteGuard<'_, T>> {
        match self.resource.try_write() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(error)) => panic!("poisoned resource lock: {error}"),
        }
    }
}

impl<T> Clone for StResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}
