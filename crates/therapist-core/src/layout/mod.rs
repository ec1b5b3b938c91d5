//! Memory layout profiles.
//!
//! A profile describes one build of the game: where its global collections
//! live, how big a creature record is, and the offset and width of every field
//! the decoder needs. Profiles are pure data, immutable once loaded, and are
//! looked up by the build id detected at attach time.

mod loader;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::debug;

use crate::error::{AttachError, LayoutError};
use crate::memory::{Address, Width};
use crate::scanner::ScanTarget;

pub use loader::*;

/// Named field offsets a profile must provide.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    // Creature record
    Id,
    FirstName,
    Nickname,
    LastName,
    CustomProfession,
    Profession,
    Sex,
    Happiness,
    SkillsVector,
    Labors,
    // Skill record
    SkillId,
    SkillRating,
    SkillExperience,
    // std::string
    StringBuffer,
    StringLength,
    StringCapacity,
    // Language tables
    WordBase,
    TranslationName,
    TranslationWords,
}

impl Field {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub offset: u64,
    pub width: Width,
}

/// How creature records are stored behind the creature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CollectionLayout {
    /// Records stored back to back, `stride` bytes apart.
    Inline { stride: u64 },
    /// The vector holds pointers to records of `record_size` bytes.
    Pointers { record_size: u64 },
}

impl CollectionLayout {
    /// Size of one vector element.
    pub fn element_size(&self, pointer_size: u8) -> u64 {
        match self {
            CollectionLayout::Inline { stride } => *stride,
            CollectionLayout::Pointers { .. } => u64::from(pointer_size),
        }
    }

    /// Number of bytes to copy out per record.
    pub fn record_size(&self) -> u64 {
        match self {
            CollectionLayout::Inline { stride } => *stride,
            CollectionLayout::Pointers { record_size } => *record_size,
        }
    }
}

/// Plausibility bounds for a vector header found by scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorShape {
    /// Element size in bytes; 0 means "one pointer".
    #[serde(default)]
    pub element_size: u64,
    pub min_count: u64,
    pub max_count: u64,
    /// Count a fully loaded game is expected to reach.
    #[serde(default)]
    pub expected_count: u64,
}

/// Statically known global addresses (module-relative). Zero means "scan".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalAddresses {
    #[serde(default)]
    pub creature_vector: u64,
    #[serde(default)]
    pub language_vector: u64,
    #[serde(default)]
    pub translation_vector: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProfile {
    /// Module-relative start of the scanned range.
    pub start: u64,
    /// Module-relative end of the scanned range (exclusive).
    pub end: u64,
    pub creature_vector: VectorShape,
    pub language_vector: VectorShape,
    pub translation_vector: VectorShape,
}

impl ScanProfile {
    pub fn shape(&self, target: ScanTarget) -> VectorShape {
        match target {
            ScanTarget::CreatureVector => self.creature_vector,
            ScanTarget::LanguageVector => self.language_vector,
            ScanTarget::TranslationVector => self.translation_vector,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLayout {
    /// Human readable game version, e.g. "v0.28.181.40d".
    pub game_version: String,
    /// PE timestamp of the build this profile describes.
    pub build_id: String,
    pub pointer_size: u8,
    #[serde(default)]
    pub addresses: GlobalAddresses,
    pub creatures: CollectionLayout,
    /// Number of labor toggles stored per creature.
    pub labor_count: u16,
    pub scan: ScanProfile,
    pub fields: BTreeMap<String, FieldSpec>,
}

impl MemoryLayout {
    pub fn field(&self, field: Field) -> Result<FieldSpec, LayoutError> {
        self.fields
            .get(field.name())
            .copied()
            .ok_or_else(|| LayoutError::MissingField {
                version: self.game_version.clone(),
                field: field.name().to_string(),
            })
    }

    pub fn offset(&self, field: Field) -> Result<u64, LayoutError> {
        self.field(field).map(|f| f.offset)
    }

    /// Statically known address of a collection, if the profile has one.
    pub fn static_address(&self, target: ScanTarget, base: Address) -> Option<Address> {
        let relative = match target {
            ScanTarget::CreatureVector => self.addresses.creature_vector,
            ScanTarget::LanguageVector => self.addresses.language_vector,
            ScanTarget::TranslationVector => self.addresses.translation_vector,
        };
        (relative != 0).then(|| base + relative)
    }

    /// Check that the profile is complete and self-consistent.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let invalid = |message: String| LayoutError::Invalid {
            version: self.game_version.clone(),
            message,
        };

        if self.pointer_size != 4 && self.pointer_size != 8 {
            return Err(invalid(format!("pointer_size {} is not 4 or 8", self.pointer_size)));
        }
        if self.build_id.trim().is_empty() {
            return Err(invalid("build_id is empty".to_string()));
        }
        if self.creatures.record_size() == 0 {
            return Err(invalid("creature record size is zero".to_string()));
        }
        if self.scan.end <= self.scan.start {
            return Err(invalid(format!(
                "scan range 0x{:X}..0x{:X} is empty",
                self.scan.start, self.scan.end
            )));
        }
        for field in Field::iter() {
            self.field(field)?;
        }

        let labors_end = self.offset(Field::Labors)? + u64::from(self.labor_count);
        if matches!(self.creatures, CollectionLayout::Inline { .. })
            && labors_end > self.creatures.record_size()
        {
            return Err(invalid(format!(
                "labor block ends at 0x{:X}, past the record size",
                labors_end
            )));
        }

        Ok(())
    }
}

/// All known profiles, keyed by build id.
#[derive(Debug, Clone, Default)]
pub struct LayoutRegistry {
    layouts: HashMap<String, Arc<MemoryLayout>>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, layout: MemoryLayout) -> Result<(), LayoutError> {
        layout.validate()?;
        debug!(
            "Registered layout {} for build {}",
            layout.game_version, layout.build_id
        );
        self.layouts
            .insert(layout.build_id.to_ascii_lowercase(), Arc::new(layout));
        Ok(())
    }

    pub fn get(&self, build_id: &str) -> Option<Arc<MemoryLayout>> {
        self.layouts.get(&build_id.to_ascii_lowercase()).cloned()
    }

    /// Look up the profile for a detected build.
    pub fn lookup(&self, build_id: &str) -> Result<Arc<MemoryLayout>, AttachError> {
        self.get(build_id)
            .ok_or_else(|| AttachError::VersionUnsupported {
                build_id: build_id.to_string(),
            })
    }

    pub fn versions(&self) -> Vec<&str> {
        let mut versions: Vec<&str> = self
            .layouts
            .values()
            .map(|l| l.game_version.as_str())
            .collect();
        versions.sort_unstable();
        versions
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}
