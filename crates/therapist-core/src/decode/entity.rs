use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

use crate::config::decode::LEGENDARY_RATING;
use crate::gamedata::{GameData, LaborId, SkillId};
use crate::memory::Address;

/// Stable creature id, taken from the record's own id field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub i32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    IntoStaticStr,
)]
pub enum Sex {
    Female,
    Male,
    Unknown,
}

impl Sex {
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => Sex::Female,
            1 => Sex::Male,
            _ => Sex::Unknown,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    IntoStaticStr,
)]
pub enum HappinessLevel {
    Miserable,
    #[strum(serialize = "Very Unhappy")]
    VeryUnhappy,
    Unhappy,
    Fine,
    Content,
    Happy,
    Ecstatic,
}

impl HappinessLevel {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            i32::MIN..=0 => HappinessLevel::Miserable,
            1..=25 => HappinessLevel::VeryUnhappy,
            26..=50 => HappinessLevel::Unhappy,
            51..=75 => HappinessLevel::Fine,
            76..=125 => HappinessLevel::Content,
            126..=150 => HappinessLevel::Happy,
            _ => HappinessLevel::Ecstatic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skill {
    pub id: SkillId,
    pub rating: i32,
    pub experience: u32,
    /// Foreign address of the skill record, for write-back.
    #[serde(skip)]
    pub address: Address,
}

/// Read-only snapshot of one creature, replaced wholesale on every reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub id: EntityId,
    /// Foreign address of the record, for write-back.
    #[serde(skip)]
    pub address: Address,
    pub first_name: String,
    pub nickname: String,
    pub last_name: String,
    pub custom_profession: String,
    pub profession: u8,
    pub sex: Sex,
    pub happiness: i32,
    pub skills: Vec<Skill>,
    /// One toggle per labor id.
    pub labors: Vec<bool>,
}

impl Entity {
    /// `First "Nick" Last`, omitting empty parts.
    pub fn nice_name(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if !self.first_name.is_empty() {
            parts.push(self.first_name.clone());
        }
        if !self.nickname.is_empty() {
            parts.push(format!("\"{}\"", self.nickname));
        }
        if !self.last_name.is_empty() {
            parts.push(self.last_name.clone());
        }
        parts.join(" ")
    }

    /// Custom profession text if set, otherwise the schema name.
    pub fn profession_name(&self, game: &GameData) -> String {
        if !self.custom_profession.is_empty() {
            return self.custom_profession.clone();
        }
        game.profession_name(self.profession)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Profession {}", self.profession))
    }

    pub fn happiness_level(&self) -> HappinessLevel {
        HappinessLevel::from_raw(self.happiness)
    }

    pub fn skill(&self, id: SkillId) -> Option<&Skill> {
        self.skills.iter().find(|skill| skill.id == id)
    }

    /// Rating of `id`, 0 when the creature has no record for it.
    pub fn skill_rating(&self, id: SkillId) -> i32 {
        self.skill(id).map_or(0, |skill| skill.rating)
    }

    pub fn is_legendary(&self) -> bool {
        self.skills
            .iter()
            .any(|skill| skill.rating >= LEGENDARY_RATING)
    }

    /// Rating of the skill governing `labor`, 0 for labors without one.
    pub fn rating_for_labor(&self, game: &GameData, labor: LaborId) -> i32 {
        game.labor(labor)
            .and_then(|column| column.skill)
            .map_or(0, |skill| self.skill_rating(skill))
    }

    /// Snapshot state of a labor toggle; `None` past the stored labors.
    pub fn labor(&self, labor: LaborId) -> Option<bool> {
        self.labors.get(usize::from(labor)).copied()
    }

    /// One `name: rating` line per skill, highest first.
    pub fn skill_summary(&self, game: &GameData) -> Vec<String> {
        let mut skills: Vec<&Skill> = self.skills.iter().collect();
        skills.sort_by(|a, b| b.rating.cmp(&a.rating));
        skills
            .into_iter()
            .map(|skill| {
                let name = game
                    .skill_name(skill.id)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Skill {}", skill.id));
                format!("{}: {}", name, skill.rating)
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn entity(id: i32, name: &str) -> Entity {
        Entity {
            id: EntityId(id),
            address: 0x10000 + id as u64 * 0x100,
            first_name: name.to_string(),
            nickname: String::new(),
            last_name: String::new(),
            custom_profession: String::new(),
            profession: 0,
            sex: Sex::Male,
            happiness: 100,
            skills: Vec::new(),
            labors: vec![false; 32],
        }
    }

    pub fn skill(id: SkillId, rating: i32, address: Address) -> Skill {
        Skill {
            id,
            rating,
            experience: 0,
            address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{entity, skill};
    use super::*;

    #[test]
    fn test_nice_name() {
        let mut urist = entity(1, "Urist");
        urist.nickname = "Boss".into();
        urist.last_name = "Kadolustuth".into();
        assert_eq!(urist.nice_name(), "Urist \"Boss\" Kadolustuth");

        let plain = entity(2, "Bomrek");
        assert_eq!(plain.nice_name(), "Bomrek");
    }

    #[test]
    fn test_profession_name_prefers_custom() {
        let game = GameData::builtin().unwrap();
        let mut urist = entity(1, "Urist");
        assert_eq!(urist.profession_name(&game), "Miner");

        urist.custom_profession = "Digger".into();
        assert_eq!(urist.profession_name(&game), "Digger");
    }

    #[test]
    fn test_happiness_levels() {
        assert_eq!(HappinessLevel::from_raw(0), HappinessLevel::Miserable);
        assert_eq!(HappinessLevel::from_raw(25), HappinessLevel::VeryUnhappy);
        assert_eq!(HappinessLevel::from_raw(50), HappinessLevel::Unhappy);
        assert_eq!(HappinessLevel::from_raw(75), HappinessLevel::Fine);
        assert_eq!(HappinessLevel::from_raw(125), HappinessLevel::Content);
        assert_eq!(HappinessLevel::from_raw(150), HappinessLevel::Happy);
        assert_eq!(HappinessLevel::from_raw(151), HappinessLevel::Ecstatic);
        assert_eq!(HappinessLevel::VeryUnhappy.to_string(), "Very Unhappy");
    }

    #[test]
    fn test_legendary_and_labor_rating() {
        let game = GameData::builtin().unwrap();
        let mut urist = entity(1, "Urist");
        urist.skills = vec![skill(0, 15, 0x500), skill(4, 3, 0x600)];

        assert!(urist.is_legendary());
        // Mining labor (0) is governed by the Mining skill (0)
        assert_eq!(urist.rating_for_labor(&game, 0), 15);
        // Masonry labor (13) uses skill 4
        assert_eq!(urist.rating_for_labor(&game, 13), 3);
        // Hauling has no skill
        assert_eq!(urist.rating_for_labor(&game, 1), 0);

        urist.skills[0].rating = 14;
        assert!(!urist.is_legendary());
    }

    #[test]
    fn test_skill_summary_orders_by_rating() {
        let game = GameData::builtin().unwrap();
        let mut urist = entity(1, "Urist");
        urist.skills = vec![skill(4, 3, 0), skill(0, 10, 0)];
        assert_eq!(urist.skill_summary(&game), vec!["Mining: 10", "Masonry: 3"]);
    }
}
