//! Static labor, skill and profession tables.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

const BUILTIN_GAME_DATA: &str = include_str!("../data/game_data.json");

pub type LaborId = u16;
pub type SkillId = u16;

/// One togglable labor, shown as a grid column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaborColumn {
    pub id: LaborId,
    pub name: String,
    /// Skill that governs this labor, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<SkillId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDef {
    pub id: SkillId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfessionDef {
    pub id: u8,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GameDataFile {
    labors: Vec<LaborColumn>,
    skills: Vec<SkillDef>,
    professions: Vec<ProfessionDef>,
}

/// Read-only game schema, loaded once and shared by the model and decoder.
#[derive(Debug, Clone)]
pub struct GameData {
    labors: Vec<LaborColumn>,
    skills: HashMap<SkillId, String>,
    professions: HashMap<u8, String>,
}

impl GameData {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_GAME_DATA)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: GameDataFile = serde_json::from_str(json)?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: GameDataFile) -> Self {
        let mut labors = file.labors;
        labors.sort_by_key(|labor| labor.id);
        labors.dedup_by_key(|labor| labor.id);
        Self {
            labors,
            skills: file.skills.into_iter().map(|s| (s.id, s.name)).collect(),
            professions: file.professions.into_iter().map(|p| (p.id, p.name)).collect(),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut skills: Vec<SkillDef> = self
            .skills
            .iter()
            .map(|(&id, name)| SkillDef {
                id,
                name: name.clone(),
            })
            .collect();
        skills.sort_by_key(|s| s.id);
        let mut professions: Vec<ProfessionDef> = self
            .professions
            .iter()
            .map(|(&id, name)| ProfessionDef {
                id,
                name: name.clone(),
            })
            .collect();
        professions.sort_by_key(|p| p.id);

        let file = GameDataFile {
            labors: self.labors.clone(),
            skills,
            professions,
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Labor columns in id order.
    pub fn labors(&self) -> &[LaborColumn] {
        &self.labors
    }

    pub fn labor(&self, id: LaborId) -> Option<&LaborColumn> {
        self.labors
            .binary_search_by_key(&id, |labor| labor.id)
            .ok()
            .map(|i| &self.labors[i])
    }

    /// Case-insensitive lookup by labor name.
    pub fn labor_by_name(&self, name: &str) -> Option<&LaborColumn> {
        self.labors
            .iter()
            .find(|labor| labor.name.eq_ignore_ascii_case(name))
    }

    pub fn skill_name(&self, id: SkillId) -> Option<&str> {
        self.skills.get(&id).map(String::as_str)
    }

    pub fn profession_name(&self, id: u8) -> Option<&str> {
        self.professions.get(&id).map(String::as_str)
    }
}
