use std::cell::RefCell;
use std::rc::Rc;

pub mod utils;

/// Flat key-value persistence substrate.
///
/// Every call is atomic for a single key; nothing spans keys.
pub trait KvStore {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    /// Stores `value` under `key`, replacing any previous value.
    /// Fails with [`StoreError::CapacityExceeded`] when the store refuses the write;
    /// in that case the previous value is left untouched.
    fn set(&mut self, key: &str, value: &str) -> StoreResult<()>;
    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> StoreResult<()>;
    /// Returns all keys currently stored, in storage order.
    fn keys(&self) -> StoreResult<Vec<String>>;
}

/// Errors reported by a [`KvStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage capacity exceeded")]
    CapacityExceeded,
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

/// Lets several file systems with distinct namespaces share one store.
impl<S: KvStore> KvStore for Rc<RefCell<S>> {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.borrow().get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.borrow_mut().set(key, value)
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        self.borrow_mut().remove(key)
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.borrow().keys()
    }
}
