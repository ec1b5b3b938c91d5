use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use super::{LayoutRegistry, MemoryLayout};
use crate::error::Result;

/// Profiles shipped with the crate.
const BUILTIN_LAYOUTS: &[&str] = &[
    include_str!("../../data/layouts/v0.28.181.40d.json"),
    include_str!("../../data/layouts/v0.28.181.39f.json"),
];

pub fn load_layout<P: AsRef<Path>>(path: P) -> Result<MemoryLayout> {
    let content = fs::read_to_string(&path)?;
    let layout: MemoryLayout = serde_json::from_str(&content)?;
    layout.validate()?;
    Ok(layout)
}

pub fn save_layout<P: AsRef<Path>>(path: P, layout: &MemoryLayout) -> Result<()> {
    let content = serde_json::to_string_pretty(layout)?;
    fs::write(path, content)?;
    Ok(())
}

/// Parse the profiles compiled into the crate.
pub fn builtin_layouts() -> Result<Vec<MemoryLayout>> {
    BUILTIN_LAYOUTS
        .iter()
        .map(|json| {
            let layout: MemoryLayout = serde_json::from_str(json)?;
            layout.validate()?;
            Ok(layout)
        })
        .collect()
}

impl LayoutRegistry {
    /// Registry holding only the compiled-in profiles.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        for layout in builtin_layouts()? {
            registry.insert(layout)?;
        }
        Ok(registry)
    }

    /// Add every `*.json` profile in `dir`. Later files override earlier
    /// profiles with the same build id, including builtin ones.
    ///
    /// Unparseable files are skipped with a warning; returns how many loaded.
    pub fn load_dir<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize> {
        let mut paths: Vec<_> = fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match load_layout(&path) {
                Ok(layout) => {
                    debug!("Loaded layout {} from {}", layout.game_version, path.display());
                    self.insert(layout)?;
                    loaded += 1;
                }
                Err(e) => warn!("Skipping layout {}: {}", path.display(), e),
            }
        }
        Ok(loaded)
    }
}
