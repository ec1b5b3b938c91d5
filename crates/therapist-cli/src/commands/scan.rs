//! Scan command implementation.

use std::io::{self, Write};

use anyhow::Result;
use therapist_core::{Error, ScanError, ScanProgress};

use super::Context;

fn print_progress(progress: ScanProgress) {
    eprint!("\r  {:<20} {:>3}%", progress.target.to_string(), progress.percent());
    if progress.step == progress.total {
        eprintln!();
    }
    let _ = io::stderr().flush();
}

pub fn run(ctx: &Context) -> Result<()> {
    let session = ctx.attach()?;
    println!(
        "Scanning with layout {} (Ctrl-C to stop)",
        session.layout().game_version
    );

    let task = session.spawn_scan(print_progress, ctx.cancel.clone())?;
    let collections = match task.join() {
        Ok(collections) => collections,
        Err(Error::Scan(ScanError::Cancelled)) => {
            eprintln!("Scan cancelled");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let show = |address: Option<u64>| match address {
        Some(address) => format!("0x{:X}", address),
        None => "not found".to_string(),
    };
    println!();
    println!("  creature_vector:    0x{:X}", collections.creature_vector);
    println!("  language_vector:    {}", show(collections.language_vector));
    println!("  translation_vector: {}", show(collections.translation_vector));
    if let Some(dictionary) = session.dictionary() {
        println!("  dictionary:         {} words", dictionary.len());
    }

    Ok(())
}
