use std::sync::{Arc, Mutex, PoisonError};

/// Configuration shared between a control thread and a processing block.
/// The block takes a snapshot once per frame so the lock is never held while symbols are processed.
pub struct ConfigSnapshot<T> {
    current: Mutex<Arc<T>>,
}

impl<T> ConfigSnapshot<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: Mutex::new(Arc::new(value)),
        }
    }

    pub fn snapshot(&self) -> Arc<T> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replaces the configuration. Frames already holding a snapshot keep the old value.
    pub fn update(&self, value: T) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(value);
    }
}

impl<T: Default> Default for ConfigSnapshot<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
