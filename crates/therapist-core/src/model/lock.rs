use std::sync::{Arc, Mutex};

use tracing::debug;

use super::Operation;
use crate::error::ModelError;

/// Ensures scans, reloads and commits never overlap for one session.
///
/// Clones share state; the guard returned by [`OperationLock::try_begin`]
/// releases the lock when dropped.
#[derive(Debug, Clone, Default)]
pub struct OperationLock {
    current: Arc<Mutex<Option<Operation>>>,
}

impl OperationLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self, operation: Operation) -> Result<OperationGuard, ModelError> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| ModelError::Busy(operation))?;
        if let Some(running) = *current {
            return Err(ModelError::Busy(running));
        }
        *current = Some(operation);
        debug!("{} started", operation);
        Ok(OperationGuard {
            current: Arc::clone(&self.current),
            operation,
        })
    }

    /// Operation in progress, if any.
    pub fn current(&self) -> Option<Operation> {
        self.current.lock().ok().and_then(|current| *current)
    }
}

#[derive(Debug)]
pub struct OperationGuard {
    current: Arc<Mutex<Option<Operation>>>,
    operation: Operation,
}

impl OperationGuard {
    pub fn operation(&self) -> Operation {
        self.operation
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
        debug!("{} finished", self.operation);
    }
}
