//! Edit command implementation.

use std::fs;
use std::path::Path;
use std::sync::mpsc;

use anyhow::{Context as _, Result, bail};
use owo_colors::OwoColorize;
use therapist_core::{CommitOutcome, CommitReport, EntityId, EntityModel, PendingChange};
use tracing::info;

use super::Context;

pub fn load_changes<P: AsRef<Path>>(path: P) -> Result<Vec<PendingChange>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read changes from {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid change list {}", path.display()))
}

/// Stage every change in the model; stops at the first invalid one.
pub fn stage_changes(model: &mut EntityModel, changes: &[PendingChange]) -> Result<usize> {
    for change in changes {
        model
            .set_field(change.entity, change.field, change.value)
            .with_context(|| format!("Cannot set {} of {}", change.field, change.entity))?;
    }
    Ok(model.pending_count())
}

fn describe(model: &EntityModel, change: &PendingChange) -> String {
    let name = model
        .entity(change.entity)
        .map(|e| e.nice_name())
        .unwrap_or_else(|| change.entity.to_string());
    format!("{} {}: {} -> {}", change.entity, name, change.field, change.value)
}

fn print_report(report: &CommitReport) {
    for (change, outcome) in &report.outcomes {
        match outcome {
            CommitOutcome::Committed => {
                println!("  {} {} {}", "✓".green(), change.entity, change.field)
            }
            CommitOutcome::Failed { failure } => println!(
                "  {} {} {}: {}",
                "✗".red(),
                change.entity,
                change.field,
                failure
            ),
        }
    }
}

pub fn run(
    ctx: &Context,
    changes: Option<&Path>,
    profession: Option<&str>,
    entities: &[i32],
    dry_run: bool,
) -> Result<()> {
    let changes = changes.map(load_changes).transpose()?;
    let profession = match profession {
        Some(name) => Some(
            ctx.config
                .custom_profession(name)
                .with_context(|| format!("No custom profession named {}", name))?
                .clone(),
        ),
        None => None,
    };
    if changes.is_none() && profession.is_none() {
        bail!("Nothing to do: pass --changes or --profession");
    }

    let Some(session) = ctx.connect()? else {
        return Ok(());
    };

    {
        let mut model = session.model();
        if let Some(changes) = &changes {
            stage_changes(&mut model, changes)?;
        }
        if let Some(profession) = &profession {
            for &id in entities {
                let differing = model.apply_custom_profession(EntityId(id), profession)?;
                info!("{} applied to {} ({} labor change(s))", profession.name, EntityId(id), differing);
            }
        }

        let pending = model.pending_changes();
        println!("{} pending change(s)", pending.len());
        for change in &pending {
            println!("  {}", describe(&model, change));
        }

        if pending.is_empty() {
            return Ok(());
        }
        if dry_run {
            model.discard_pending();
            println!("Dry run, nothing written");
            return Ok(());
        }
    }

    let (tx, rx) = mpsc::channel();
    let task = session.spawn_commit(move |report| {
        let _ = tx.send(report.clone());
    })?;
    if let Ok(report) = rx.recv() {
        print_report(&report);
    }
    let report = task.join()?;

    println!(
        "{} written, {} failed",
        report.committed_count(),
        report.failed_count()
    );
    if report.session_lost() {
        bail!("Lost access to the game; failed changes were not written");
    }
    if !report.is_success() {
        bail!("{} change(s) could not be written", report.failed_count());
    }
    Ok(())
}
