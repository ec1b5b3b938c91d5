//! CLI command implementations.

pub mod dump;
pub mod edit;
pub mod list;
pub mod scan;
pub mod status;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use therapist_core::{CancelSignal, ProcessHandle, ScanProgress, Session};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::retry::load_with_retry;

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub config: AppConfig,
    pub process_name: String,
    pub cancel: CancelSignal,
}

impl Context {
    pub fn attach(&self) -> Result<Session<ProcessHandle>> {
        let registry = self.config.layout_registry()?;
        let game = Arc::new(self.config.game_data()?);
        Session::attach(&self.process_name, &registry, game)
            .with_context(|| format!("Failed to attach to {}", self.process_name))
    }

    /// Attach and load every creature. `None` if interrupted.
    pub fn connect(&self) -> Result<Option<Session<ProcessHandle>>> {
        let session = self.attach()?;
        match load_with_retry(&session, &log_progress, &self.cancel)? {
            Some(count) => {
                info!("Loaded {} creature(s)", count);
                Ok(Some(session))
            }
            None => {
                eprintln!("Interrupted");
                Ok(None)
            }
        }
    }
}

fn log_progress(progress: ScanProgress) {
    debug!("Scanning for {}: {}%", progress.target, progress.percent());
}
