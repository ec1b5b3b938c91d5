//! JSON dump of the loaded creatures.

use std::fs;
use std::path::Path;

use chrono::Local;
use serde::Serialize;

use crate::decode::Entity;
use crate::error::Result;
use crate::gamedata::GameData;
use crate::model::EntityModel;

#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub exported_at: String,
    pub game_version: String,
    pub count: usize,
    pub entities: Vec<EntityJson>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityJson {
    pub id: i32,
    pub address: String,
    pub name: String,
    pub profession: String,
    pub sex: String,
    pub happiness: i32,
    pub mood: String,
    pub legendary: bool,
    pub skills: Vec<SkillJson>,
    /// Names of enabled labors, pending edits included.
    pub labors: Vec<String>,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkillJson {
    pub id: u16,
    pub name: String,
    pub rating: i32,
    pub experience: u32,
}

fn entity_json(model: &EntityModel, entity: &Entity) -> EntityJson {
    let game: &GameData = model.game();
    let skills = entity
        .skills
        .iter()
        .map(|skill| SkillJson {
            id: skill.id,
            name: game
                .skill_name(skill.id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Skill {}", skill.id)),
            rating: skill.rating,
            experience: skill.experience,
        })
        .collect();
    let labors = game
        .labors()
        .iter()
        .filter(|column| model.labor_enabled(entity.id, column.id).unwrap_or(false))
        .map(|column| column.name.clone())
        .collect();

    EntityJson {
        id: entity.id.0,
        address: format!("0x{:X}", entity.address),
        name: entity.nice_name(),
        profession: entity.profession_name(game),
        sex: entity.sex.to_string(),
        happiness: entity.happiness,
        mood: entity.happiness_level().to_string(),
        legendary: entity.is_legendary(),
        skills,
        labors,
        pending: model.pending_for(entity.id).len(),
    }
}

/// Build the export document for every entity in load order.
pub fn generate_entities_json(model: &EntityModel, game_version: &str) -> ExportDocument {
    let entities: Vec<EntityJson> = model
        .entities()
        .iter()
        .map(|entity| entity_json(model, entity))
        .collect();
    ExportDocument {
        exported_at: Local::now().to_rfc3339(),
        game_version: game_version.to_string(),
        count: entities.len(),
        entities,
    }
}

/// Write the export document to `path` as pretty-printed JSON.
pub fn export_entities_json<P: AsRef<Path>>(
    path: P,
    model: &EntityModel,
    game_version: &str,
) -> Result<()> {
    let document = generate_entities_json(model, game_version);
    fs::write(path, serde_json::to_string_pretty(&document)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::decode::EntityId;
    use crate::decode::fixtures::{entity, skill};
    use crate::model::{FieldId, FieldValue};

    fn model() -> EntityModel {
        let mut model = EntityModel::new(Arc::new(GameData::builtin().unwrap()));
        let mut urist = entity(7, "Urist");
        urist.skills = vec![skill(0, 15, 0x2000)];
        urist.labors[0] = true;
        model.load(vec![urist, entity(8, "Bomrek")]);
        model
    }

    #[test]
    fn test_generate_entities_json() {
        let mut model = model();
        model
            .set_field(EntityId(8), FieldId::Labor(0), FieldValue::Flag(true))
            .unwrap();

        let doc = generate_entities_json(&model, "v0.28.181.40d");
        assert_eq!(doc.count, 2);
        assert_eq!(doc.game_version, "v0.28.181.40d");

        let urist = &doc.entities[0];
        assert_eq!(urist.name, "Urist");
        assert!(urist.legendary);
        assert_eq!(urist.skills[0].rating, 15);
        assert_eq!(urist.labors, vec!["Mining"]);
        assert_eq!(urist.pending, 0);

        let bomrek = &doc.entities[1];
        assert_eq!(bomrek.labors, vec!["Mining"]);
        assert_eq!(bomrek.pending, 1);
    }

    #[test]
    fn test_export_entities_json_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creatures.json");
        export_entities_json(&path, &model(), "test").unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["count"], 2);
        assert_eq!(value["entities"][0]["address"], "0x10700");
        assert!(value["exported_at"].as_str().is_some());
    }
}
