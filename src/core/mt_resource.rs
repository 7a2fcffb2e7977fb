use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

/// A thread-safe, reference-counted resource container with read-write locking.
///
/// `MtResource` provides synchronized access to a value of type `T` that can be shared
/// across threads. It uses an `Arc<RwLock<T>>` internally. Voxel grids, sunlight fields
/// and the edit log are all stored this way: many readers build derived artifacts in
/// parallel, while an edit takes the exclusive side for the duration of one mutation.
///
/// # Type Parameters
/// - `T`: The type of the contained resource, must be `Send + Sync`
///
/// # Examples
///
/// ## Sharing Between Threads
/// ```
/// # use std::thread;
/// use voxel_terrain::core::MtResource;
///
/// let counter = MtResource::new(0);
/// let counter_clone = counter.clone();
///
/// let handle = thread::spawn(move || {
///     *counter_clone.get_mut() += 1;
/// });
///
/// handle.join().unwrap();
/// assert_eq!(*counter.get(), 1);
/// ```
///
/// ## Non-blocking Access
/// ```
/// use voxel_terrain::core::MtResource;
///
/// let value = MtResource::new(7);
/// let writer = value.get_mut();
/// assert!(value.try_get().is_none());
/// drop(writer);
/// assert_eq!(*value.try_get().unwrap(), 7);
/// ```
///
/// # Panics
/// Every accessor panics if the lock is poisoned. A poisoned artifact lock means a
/// worker died halfway through a mutation, and the cached state can no longer be trusted.
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync + 'static> MtResource<T> {
    /// Creates a new `MtResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read-only guard, blocking while a writer holds the lock.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap()
    }

    /// Returns a mutable guard, blocking until every other holder has released the lock.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap()
    }

    /// Attempts to take a read guard without blocking.
    ///
    /// # Returns
    /// - `Some(guard)` if no writer currently holds the lock
    /// - `None` if the lock is held exclusively
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn try_get(&self) -> Option<RwLockReadGuard<'_, T>> {
        match self.resource.try_read() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(error)) => panic!("poisoned resource lock: {error}"),
        }
    }

    /// Attempts to take a write guard without blocking.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn try_get_mut(&self) -> Option<RwLockWriteGuard<'_, T>> {
        match self.resource.try_write() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(error)) => panic!("poisoned resource lock: {error}"),
        }
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}
