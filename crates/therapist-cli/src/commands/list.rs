//! List command implementation.

use anyhow::{Context as _, Result};
use owo_colors::OwoColorize;
use serde_json::json;
use therapist_core::{Entity, EntityModel, FieldId, Group, GroupBy, LaborId, SortKey};

use super::Context;

/// One grid row: id, name, profession, mood, then either the sort labor or
/// every enabled labor. Pending labor edits are marked with `*`.
fn entity_row(model: &EntityModel, entity: &Entity, labor: Option<LaborId>) -> String {
    let game = model.game();
    let head = format!(
        "{:>7}  {:<28} {:<18} {:<14}",
        entity.id.to_string(),
        entity.nice_name(),
        entity.profession_name(game),
        entity.happiness_level().to_string()
    );
    let pending = model.pending_for(entity.id);
    let marker = |labor: LaborId| {
        if pending.iter().any(|c| c.field == FieldId::Labor(labor)) {
            "*"
        } else {
            ""
        }
    };

    match labor {
        Some(labor) => {
            let enabled = model.labor_enabled(entity.id, labor).unwrap_or(false);
            format!(
                "{} rating {:>2}  [{}]{}",
                head,
                entity.rating_for_labor(game, labor),
                if enabled { "x" } else { " " },
                marker(labor)
            )
        }
        None => {
            let labors: Vec<String> = game
                .labors()
                .iter()
                .filter(|column| model.labor_enabled(entity.id, column.id).unwrap_or(false))
                .map(|column| format!("{}{}", column.name, marker(column.id)))
                .collect();
            format!("{} {}", head, labors.join(", "))
        }
    }
}

fn group_rows(model: &EntityModel, group: &Group, labor: Option<LaborId>) -> Vec<String> {
    group
        .members
        .iter()
        .filter_map(|&id| model.entity(id))
        .map(|entity| entity_row(model, entity, labor))
        .collect()
}

fn groups_json(model: &EntityModel, groups: &[Group]) -> serde_json::Value {
    let groups: Vec<_> = groups
        .iter()
        .map(|group| {
            let members: Vec<_> = group
                .members
                .iter()
                .filter_map(|&id| model.entity(id))
                .map(|entity| {
                    json!({
                        "id": entity.id,
                        "name": entity.nice_name(),
                        "profession": entity.profession_name(model.game()),
                    })
                })
                .collect();
            json!({
                "title": group.title(),
                "members": members,
            })
        })
        .collect();
    json!(groups)
}

pub fn run(ctx: &Context, group: Option<GroupBy>, labor: Option<&str>, as_json: bool) -> Result<()> {
    let Some(session) = ctx.connect()? else {
        return Ok(());
    };
    let mut model = session.model();

    let labor = match labor {
        Some(name) => Some(
            model
                .game()
                .labor_by_name(name)
                .map(|column| column.id)
                .with_context(|| format!("Unknown labor: {}", name))?,
        ),
        None => None,
    };
    let sort = labor.map_or(SortKey::Name, SortKey::Labor);
    model.set_grouping(group.unwrap_or(ctx.config.group_by), sort);
    let groups = model.groups();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&groups_json(&model, &groups))?);
        return Ok(());
    }

    for group in &groups {
        if model.grouping().0 != GroupBy::Nothing {
            println!("{}", group.title().bold());
        }
        for row in group_rows(&model, group, labor) {
            println!("{}", row);
        }
    }
    println!();
    println!("{} creature(s)", model.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use therapist_core::{EntityId, FieldValue, GameData, Sex, Skill};

    fn creature(id: i32, name: &str, mining: i32) -> Entity {
        Entity {
            id: EntityId(id),
            address: 0x1000 * id as u64,
            first_name: name.to_string(),
            nickname: String::new(),
            last_name: String::new(),
            custom_profession: String::new(),
            profession: 0,
            sex: Sex::Male,
            happiness: 100,
            skills: vec![Skill {
                id: 0,
                rating: mining,
                experience: 0,
                address: 0,
            }],
            labors: vec![false; 32],
        }
    }

    fn model() -> EntityModel {
        let mut model = EntityModel::new(Arc::new(GameData::builtin().unwrap()));
        model.load(vec![creature(1, "Urist", 3), creature(2, "Bomrek", 12)]);
        model
    }

    #[test]
    fn test_rows_follow_labor_sort() {
        let mut model = model();
        model.set_grouping(GroupBy::Nothing, SortKey::Labor(0));
        let groups = model.groups();

        let first = group_rows(&model, &groups[0], Some(0));
        assert_eq!(first.len(), 1);
        assert!(first[0].contains("Bomrek"));
        assert!(first[0].contains("rating 12"));
        assert!(first[0].ends_with("[ ]"));
    }

    #[test]
    fn test_pending_labor_is_marked() {
        let mut model = model();
        model
            .set_field(EntityId(1), FieldId::Labor(0), FieldValue::Flag(true))
            .unwrap();

        let urist = model.entity(EntityId(1)).unwrap();
        assert!(entity_row(&model, urist, None).ends_with("Mining*"));
        assert!(entity_row(&model, urist, Some(0)).ends_with("[x]*"));
    }

    #[test]
    fn test_groups_json() {
        let model = model();
        let groups = model.group_by(GroupBy::Profession);
        let value = groups_json(&model, &groups);

        assert_eq!(value[0]["title"], "Miner (2)");
        assert_eq!(value[0]["members"][0]["name"], "Bomrek");
        assert_eq!(value[0]["members"][1]["id"], 1);
    }
}
