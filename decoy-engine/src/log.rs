//! Invocation log

use decoy_core::{Invocation, MockError, MockResult};
use std::sync::{Arc, Mutex};

/// Append-only history of the calls a mock received.
#[derive(Debug, Default)]
pub struct InvocationLog {
    entries: Mutex<Vec<Arc<Invocation>>>,
}

impl InvocationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MockResult<std::sync::MutexGuard<'_, Vec<Arc<Invocation>>>> {
        self.entries
            .lock()
            .map_err(|_| MockError::lock_poisoned("invocation log"))
    }

    pub fn append(&self, invocation: Arc<Invocation>) -> MockResult<()> {
        self.lock()?.push(invocation);
        Ok(())
    }

    /// Entries in call order.
    pub fn snapshot(&self) -> MockResult<Vec<Arc<Invocation>>> {
        Ok(self.lock()?.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> MockResult<()> {
        self.lock()?.clear();
        Ok(())
    }
}
