//! Grouping and sorting of entities for display.
//!
//! Groups are a derived index over the flat entity store: each group holds
//! member ids, never the entities themselves, and is recomputed on demand.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::decode::{Entity, EntityId, HappinessLevel, Sex};
use crate::gamedata::{GameData, LaborId};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum GroupBy {
    /// One group per entity.
    #[default]
    Nothing,
    Profession,
    Legendary,
    Sex,
    Happiness,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    /// Alphabetical by display name within a group.
    #[default]
    Name,
    /// Descending by the labor's skill rating; groups by their best member.
    Labor(LaborId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum GroupKey {
    Entity(EntityId),
    Profession(String),
    Legendary(bool),
    Sex(Sex),
    Happiness(HappinessLevel),
}

impl GroupKey {
    fn of(entity: &Entity, mode: GroupBy, game: &GameData) -> Self {
        match mode {
            GroupBy::Nothing => GroupKey::Entity(entity.id),
            GroupBy::Profession => GroupKey::Profession(entity.profession_name(game)),
            GroupBy::Legendary => GroupKey::Legendary(entity.is_legendary()),
            GroupBy::Sex => GroupKey::Sex(entity.sex),
            GroupBy::Happiness => GroupKey::Happiness(entity.happiness_level()),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Entity(id) => write!(f, "{}", id),
            GroupKey::Profession(name) => f.write_str(name),
            GroupKey::Legendary(true) => f.write_str("Legendary"),
            GroupKey::Legendary(false) => f.write_str("Not Legendary"),
            GroupKey::Sex(sex) => write!(f, "{}", sex),
            GroupKey::Happiness(level) => write!(f, "{}", level),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub key: GroupKey,
    /// Member ids in display order.
    pub members: Vec<EntityId>,
}

impl Group {
    /// `"<key> (<member count>)"`
    pub fn title(&self) -> String {
        format!("{} ({})", self.key, self.members.len())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Bucket `entities` by `mode` and order members and groups by `sort`.
///
/// All sorts are stable, so equal keys keep load order.
pub fn group_entities(
    entities: &[Entity],
    game: &GameData,
    mode: GroupBy,
    sort: SortKey,
) -> Vec<Group> {
    // Buckets in order of first appearance
    let mut buckets: Vec<(GroupKey, Vec<&Entity>)> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    for entity in entities {
        let key = GroupKey::of(entity, mode, game);
        match index.get(&key) {
            Some(&i) => buckets[i].1.push(entity),
            None => {
                index.insert(key.clone(), buckets.len());
                buckets.push((key, vec![entity]));
            }
        }
    }

    match sort {
        SortKey::Name => {
            for (_, members) in &mut buckets {
                members.sort_by_cached_key(|e| e.nice_name().to_lowercase());
            }
            if mode == GroupBy::Nothing {
                buckets.sort_by_cached_key(|(_, members)| {
                    members.first().map(|e| e.nice_name().to_lowercase())
                });
            } else {
                buckets.sort_by(|(a, _), (b, _)| a.cmp(b));
            }
        }
        SortKey::Labor(labor) => {
            let rating = |e: &Entity| e.rating_for_labor(game, labor);
            for (_, members) in &mut buckets {
                members.sort_by_key(|e| std::cmp::Reverse(rating(*e)));
            }
            buckets.sort_by_key(|(_, members)| {
                std::cmp::Reverse(members.iter().map(|e| rating(*e)).max().unwrap_or(0))
            });
        }
    }

    buckets
        .into_iter()
        .map(|(key, members)| Group {
            key,
            members: members.iter().map(|e| e.id).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::fixtures::{entity, skill};

    fn crew() -> Vec<Entity> {
        let mut urist = entity(1, "Urist");
        urist.skills = vec![skill(0, 15, 0)];
        let mut bomrek = entity(2, "Bomrek");
        bomrek.profession = 7;
        bomrek.skills = vec![skill(0, 4, 0)];
        let mut asmel = entity(3, "Asmel");
        asmel.sex = Sex::Female;
        asmel.skills = vec![skill(0, 4, 0)];
        let kadol = entity(4, "kadol");
        vec![urist, bomrek, asmel, kadol]
    }

    fn ids(group: &Group) -> Vec<i32> {
        group.members.iter().map(|id| id.0).collect()
    }

    #[test]
    fn test_nothing_gives_one_group_per_entity() {
        let game = GameData::builtin().unwrap();
        let entities = crew();
        let groups = group_entities(&entities, &game, GroupBy::Nothing, SortKey::Name);

        assert_eq!(groups.len(), entities.len());
        assert!(groups.iter().all(|g| g.len() == 1));
        let names: Vec<i32> = groups.iter().flat_map(ids).collect();
        assert_eq!(names, vec![3, 2, 4, 1]);
    }

    #[test]
    fn test_group_by_profession() {
        let game = GameData::builtin().unwrap();
        let groups = group_entities(&crew(), &game, GroupBy::Profession, SortKey::Name);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].title(), "Mason (1)");
        assert_eq!(groups[1].title(), "Miner (3)");
        assert_eq!(ids(&groups[1]), vec![3, 4, 1]);
    }

    #[test]
    fn test_labor_sort_is_descending_and_stable() {
        let game = GameData::builtin().unwrap();
        // Mining labor (0) follows the Mining skill (0)
        let groups = group_entities(&crew(), &game, GroupBy::Nothing, SortKey::Labor(0));
        let order: Vec<i32> = groups.iter().flat_map(ids).collect();
        // Bomrek and Asmel tie at 4 and keep load order
        assert_eq!(order, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_labor_sort_orders_groups_by_best_member() {
        let game = GameData::builtin().unwrap();
        let groups = group_entities(&crew(), &game, GroupBy::Sex, SortKey::Labor(0));

        assert_eq!(groups[0].key, GroupKey::Sex(Sex::Male));
        assert_eq!(ids(&groups[0]), vec![1, 2, 4]);
        assert_eq!(groups[1].title(), "Female (1)");
    }

    #[test]
    fn test_group_by_legendary() {
        let game = GameData::builtin().unwrap();
        let groups = group_entities(&crew(), &game, GroupBy::Legendary, SortKey::Name);
        let titles: Vec<String> = groups.iter().map(Group::title).collect();
        assert_eq!(titles, vec!["Not Legendary (3)", "Legendary (1)"]);
    }

    #[test]
    fn test_group_by_parse() {
        assert_eq!("Profession".parse::<GroupBy>().unwrap(), GroupBy::Profession);
        assert_eq!(GroupBy::Happiness.to_string(), "happiness");
    }
}
