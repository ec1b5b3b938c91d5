//! Status command implementation.

use anyhow::Result;
use owo_colors::OwoColorize;
use therapist_core::{ReadMemory, detect_build_id, list_processes};

use super::Context;

pub fn run(ctx: &Context) -> Result<()> {
    let current_version = env!("CARGO_PKG_VERSION");
    println!("therapist {} - Status", current_version);

    let registry = ctx.config.layout_registry()?;
    println!();
    println!("=== Known layouts ({}) ===", registry.len());
    for version in registry.versions() {
        println!("  {}", version);
    }

    println!();
    println!("=== Game process ===");
    let running = list_processes().map(|processes| {
        processes
            .into_iter()
            .filter(|p| p.name.eq_ignore_ascii_case(&ctx.process_name))
            .collect::<Vec<_>>()
    });
    match running {
        Ok(matches) if matches.is_empty() => {
            println!("  {} {} is not running", "✗".red(), ctx.process_name);
            return Ok(());
        }
        Ok(matches) => {
            for process in &matches {
                println!("  {} (PID {})", process.name, process.pid);
            }
        }
        Err(e) => {
            println!("  {} {}", "✗".red(), e);
            return Ok(());
        }
    }

    match ctx.attach() {
        Ok(session) => {
            let process = session.process();
            let build_id = detect_build_id(process)?;
            println!("  Base:    0x{:X}", process.base_address());
            println!("  Build:   {}", build_id);
            println!(
                "  Layout:  {} {}",
                session.layout().game_version,
                "✓".green()
            );
        }
        Err(e) => println!("  {} {:#}", "✗".red(), e),
    }

    Ok(())
}
