//! Dump command implementation.

use std::path::Path;

use anyhow::Result;
use therapist_core::{export_entities_json, generate_entities_json};

use super::Context;

pub fn run(ctx: &Context, output: Option<&Path>) -> Result<()> {
    let Some(session) = ctx.connect()? else {
        return Ok(());
    };
    let model = session.model();
    let version = &session.layout().game_version;

    if let Some(output_path) = output {
        export_entities_json(output_path, &model, version)?;
        eprintln!(
            "Exported {} creature(s) to: {}",
            model.len(),
            output_path.display()
        );
    } else {
        let document = generate_entities_json(&model, version);
        println!("{}", serde_json::to_string_pretty(&document)?);
    }

    Ok(())
}
