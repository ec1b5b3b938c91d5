use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{EntityId, FieldId, FieldValue};

/// One user edit not yet written to the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub entity: EntityId,
    pub field: FieldId,
    pub value: FieldValue,
}

/// Pending edits keyed by (entity, field); a second edit to the same pair
/// replaces the first.
#[derive(Debug, Clone, Default)]
pub struct PendingOverlay {
    changes: BTreeMap<(EntityId, FieldId), FieldValue>,
}

impl PendingOverlay {
    pub fn upsert(&mut self, entity: EntityId, field: FieldId, value: FieldValue) {
        self.changes.insert((entity, field), value);
    }

    pub fn remove(&mut self, entity: EntityId, field: FieldId) -> Option<FieldValue> {
        self.changes.remove(&(entity, field))
    }

    pub fn get(&self, entity: EntityId, field: FieldId) -> Option<FieldValue> {
        self.changes.get(&(entity, field)).copied()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// All changes, ordered by entity then field.
    pub fn iter(&self) -> impl Iterator<Item = PendingChange> + '_ {
        self.changes
            .iter()
            .map(|(&(entity, field), &value)| PendingChange {
                entity,
                field,
                value,
            })
    }

    pub fn for_entity(&self, entity: EntityId) -> impl Iterator<Item = PendingChange> + '_ {
        self.iter().filter(move |change| change.entity == entity)
    }

    /// Entities with at least one change, each listed once.
    pub fn entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.changes.keys().map(|&(entity, _)| entity).collect();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_overwrites() {
        let mut overlay = PendingOverlay::default();
        let id = EntityId(1);
        overlay.upsert(id, FieldId::Labor(3), FieldValue::Flag(true));
        overlay.upsert(id, FieldId::Labor(3), FieldValue::Flag(false));

        assert_eq!(overlay.len(), 1);
        assert_eq!(overlay.get(id, FieldId::Labor(3)), Some(FieldValue::Flag(false)));
    }

    #[test]
    fn test_entities_are_deduplicated() {
        let mut overlay = PendingOverlay::default();
        overlay.upsert(EntityId(2), FieldId::Labor(1), FieldValue::Flag(true));
        overlay.upsert(EntityId(1), FieldId::Labor(1), FieldValue::Flag(true));
        overlay.upsert(EntityId(2), FieldId::SkillRating(0), FieldValue::Rating(5));

        assert_eq!(overlay.entities(), vec![EntityId(1), EntityId(2)]);
        assert_eq!(overlay.for_entity(EntityId(2)).count(), 2);
    }
}
