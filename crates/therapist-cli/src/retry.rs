//! Retry utilities for locating and loading creatures.

use anyhow::{Result, bail};
use therapist_core::config::retry::{MAX_LOAD_ATTEMPTS, RETRY_DELAY};
use therapist_core::{CancelSignal, Error, ProgressSink, ScanError, Session, WriteMemory};
use tracing::{debug, warn};

/// Whether `error` can clear up once the game has finished loading.
fn is_transient(error: &Error) -> bool {
    matches!(
        error,
        Error::Scan(ScanError::NoCandidateFound { .. }) | Error::Decode(_)
    ) && !error.is_session_lost()
}

/// Scan for the creature vector and load every creature, retrying while the
/// game is still loading a fort.
///
/// Returns `Ok(None)` if `cancel` was signalled.
pub fn load_with_retry<P>(
    session: &Session<P>,
    progress: &dyn ProgressSink,
    cancel: &CancelSignal,
) -> Result<Option<usize>>
where
    P: WriteMemory + Send + Sync + 'static,
{
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        attempts += 1;

        // Empty or corrupt loads drop the collections, so this rescans
        let result = match session.collections() {
            Some(_) => Ok(()),
            None => session.scan(progress, cancel).map(|_| ()),
        }
        .and_then(|()| session.reload());

        let last_error = match result {
            Ok(0) => "no creatures in the creature vector".to_string(),
            Ok(count) => return Ok(Some(count)),
            Err(Error::Scan(ScanError::Cancelled)) => return Ok(None),
            Err(e) if is_transient(&e) => e.to_string(),
            Err(e) => return Err(e.into()),
        };

        if attempts >= MAX_LOAD_ATTEMPTS {
            bail!(
                "Failed to load creatures after {} attempts: {}",
                MAX_LOAD_ATTEMPTS,
                last_error
            );
        }
        warn!(
            "Fort not ready ({}), retrying in {}s (attempt {}/{})",
            last_error,
            RETRY_DELAY.as_secs(),
            attempts,
            MAX_LOAD_ATTEMPTS
        );

        // Wait before retry (interruptible)
        if cancel.wait(RETRY_DELAY) {
            debug!("Retry wait cancelled");
            return Ok(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use therapist_core::{DecodeError, MemoryError, ModelError, Operation, ScanTarget};

    #[test]
    fn test_transient_errors() {
        let missing = Error::Scan(ScanError::NoCandidateFound {
            target: ScanTarget::CreatureVector,
            start: 0x1000,
            end: 0x2000,
        });
        assert!(is_transient(&missing));

        let corrupt = Error::Decode(DecodeError::CorruptRecord {
            address: 0x10,
            reason: "bad id".to_string(),
        });
        assert!(is_transient(&corrupt));
    }

    #[test]
    fn test_fatal_errors() {
        let revoked = Error::Decode(DecodeError::Memory(MemoryError::AccessRevoked));
        assert!(!is_transient(&revoked));
        assert!(!is_transient(&Error::Memory(MemoryError::AccessRevoked)));
        assert!(!is_transient(&Error::Model(ModelError::Busy(Operation::Commit))));
        assert!(!is_transient(&Error::Scan(ScanError::Cancelled)));
    }
}
