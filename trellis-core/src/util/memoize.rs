//! Single-slot memoizer.
//!
//! The first successful result is kept and returned for every later call,
//! whatever the arguments. Failures are not kept.

use std::fmt;

use parking_lot::Mutex;

/// A function that remembers its first successful result.
pub struct MemoFn<A, T, E> {
    f: Box<dyn Fn(A) -> Result<T, E> + Send + Sync>,
    slot: Mutex<Option<T>>,
}

impl<A, T: Clone, E> MemoFn<A, T, E> {
    /// Wrap `f`.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            f: Box::new(f),
            slot: Mutex::new(None),
        }
    }

    /// Return the remembered result, or call `f` and remember it on success.
    pub fn call(&self, args: A) -> Result<T, E> {
        if let Some(value) = self.slot.lock().clone() {
            return Ok(value);
        }
        let value = (self.f)(args)?;
        *self.slot.lock() = Some(value.clone());
        Ok(value)
    }

    /// Whether a result is remembered.
    pub fn is_cached(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Forget the remembered result.
    pub fn reset(&self) {
        *self.slot.lock() = None;
    }
}

impl<A, T, E> fmt::Debug for MemoFn<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoFn").finish_non_exhaustive()
    }
}
