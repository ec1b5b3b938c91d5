//! Decoded entities plus the pending-change overlay.
//!
//! Entities are read-only snapshots between loads. User edits live only in
//! the overlay until they are committed or discarded.
//!
//! ```text
//! Empty --load--> Loaded --set_field--> Dirty --commit/discard--> Loaded
//!   ^                                                               |
//!   +------------------------------clear----------------------------+
//! ```

mod group;
mod lock;
mod observer;
mod pending;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use tracing::{debug, warn};

use crate::commit::CommitReport;
use crate::config::decode::MAX_SKILL_RATING;
use crate::error::ModelError;
use crate::gamedata::{GameData, LaborId, SkillId};

pub use crate::decode::{Entity, EntityId};
pub use group::*;
pub use lock::*;
pub use observer::*;
pub use pending::*;

/// An editable field of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldId {
    Labor(LaborId),
    SkillRating(SkillId),
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldId::Labor(id) => write!(f, "labor {}", id),
            FieldId::SkillRating(id) => write!(f, "skill {} rating", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Rating(i32),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Flag(true) => f.write_str("on"),
            FieldValue::Flag(false) => f.write_str("off"),
            FieldValue::Rating(rating) => write!(f, "{}", rating),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum Operation {
    Scan,
    Reload,
    Commit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ModelState {
    Empty,
    Loaded,
    Dirty,
}

/// Notification sent to subscribers after the model changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    Loaded { count: usize },
    Cleared,
    PendingChanged { pending: usize },
    Committed { committed: usize, failed: usize },
    GroupingChanged { group_by: GroupBy, sort: SortKey },
}

/// A named labor set that can be stamped onto an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomProfession {
    pub name: String,
    pub labors: Vec<LaborId>,
}

impl CustomProfession {
    pub fn has_labor(&self, labor: LaborId) -> bool {
        self.labors.contains(&labor)
    }
}

pub struct EntityModel {
    game: Arc<GameData>,
    entities: Vec<Entity>,
    index: HashMap<EntityId, usize>,
    loaded: bool,
    pending: PendingOverlay,
    group_by: GroupBy,
    sort: SortKey,
    observers: Observers,
    lock: OperationLock,
}

impl EntityModel {
    pub fn new(game: Arc<GameData>) -> Self {
        Self {
            game,
            entities: Vec::new(),
            index: HashMap::new(),
            loaded: false,
            pending: PendingOverlay::default(),
            group_by: GroupBy::default(),
            sort: SortKey::default(),
            observers: Observers::default(),
            lock: OperationLock::new(),
        }
    }

    pub fn game(&self) -> &GameData {
        &self.game
    }

    pub fn state(&self) -> ModelState {
        if !self.loaded {
            ModelState::Empty
        } else if self.pending.is_empty() {
            ModelState::Loaded
        } else {
            ModelState::Dirty
        }
    }

    /// Replace every entity and drop all pending changes.
    ///
    /// Entities with an id already seen in `entities` are dropped.
    pub fn load(&mut self, entities: Vec<Entity>) {
        let mut index = HashMap::with_capacity(entities.len());
        let mut kept = Vec::with_capacity(entities.len());
        for entity in entities {
            if index.contains_key(&entity.id) {
                warn!("Dropping duplicate entity {} at 0x{:X}", entity.id, entity.address);
                continue;
            }
            index.insert(entity.id, kept.len());
            kept.push(entity);
        }

        self.entities = kept;
        self.index = index;
        self.loaded = true;
        self.pending.clear();
        debug!("Model loaded with {} entities", self.entities.len());
        self.observers.notify(&ModelEvent::Loaded {
            count: self.entities.len(),
        });
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.index.clear();
        self.loaded = false;
        self.pending.clear();
        self.observers.notify(&ModelEvent::Cleared);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in load order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.index.get(&id).map(|&i| &self.entities[i])
    }

    fn require(&self, id: EntityId) -> Result<&Entity, ModelError> {
        self.entity(id).ok_or(ModelError::UnknownEntity(id))
    }

    /// Value of `field` in the last loaded snapshot.
    pub fn snapshot_value(&self, id: EntityId, field: FieldId) -> Result<FieldValue, ModelError> {
        let entity = self.require(id)?;
        let unknown = ModelError::UnknownField { entity: id, field };
        match field {
            FieldId::Labor(labor) => entity.labor(labor).map(FieldValue::Flag).ok_or(unknown),
            FieldId::SkillRating(skill) => entity
                .skill(skill)
                .map(|s| FieldValue::Rating(s.rating))
                .ok_or(unknown),
        }
    }

    /// Value the user sees: the pending value if any, else the snapshot.
    pub fn value(&self, id: EntityId, field: FieldId) -> Result<FieldValue, ModelError> {
        let snapshot = self.snapshot_value(id, field)?;
        Ok(self.pending.get(id, field).unwrap_or(snapshot))
    }

    /// Record an edit, replacing any earlier pending value for the same
    /// field.
    pub fn set_field(
        &mut self,
        id: EntityId,
        field: FieldId,
        value: FieldValue,
    ) -> Result<(), ModelError> {
        self.snapshot_value(id, field)?;
        match (field, value) {
            (FieldId::Labor(_), FieldValue::Flag(_)) => {}
            (FieldId::SkillRating(_), FieldValue::Rating(rating))
                if (0..=MAX_SKILL_RATING).contains(&rating) => {}
            _ => return Err(ModelError::TypeMismatch(field)),
        }

        self.pending.upsert(id, field, value);
        self.observers.notify(&ModelEvent::PendingChanged {
            pending: self.pending.len(),
        });
        Ok(())
    }

    /// Effective state of a labor toggle.
    pub fn labor_enabled(&self, id: EntityId, labor: LaborId) -> Result<bool, ModelError> {
        match self.value(id, FieldId::Labor(labor))? {
            FieldValue::Flag(enabled) => Ok(enabled),
            FieldValue::Rating(_) => Err(ModelError::TypeMismatch(FieldId::Labor(labor))),
        }
    }

    pub fn toggle_labor(&mut self, id: EntityId, labor: LaborId) -> Result<bool, ModelError> {
        let enabled = !self.labor_enabled(id, labor)?;
        self.set_field(id, FieldId::Labor(labor), FieldValue::Flag(enabled))?;
        Ok(enabled)
    }

    /// Set every labor in the schema to match `profession`.
    ///
    /// Only labors whose current value differs are staged. Returns how many
    /// were staged.
    pub fn apply_custom_profession(
        &mut self,
        id: EntityId,
        profession: &CustomProfession,
    ) -> Result<usize, ModelError> {
        let labor_count = self.require(id)?.labors.len();
        let labors: Vec<LaborId> = self
            .game
            .labors()
            .iter()
            .map(|column| column.id)
            .filter(|&labor| usize::from(labor) < labor_count)
            .collect();

        let mut staged = 0;
        for labor in labors {
            let enabled = profession.has_labor(labor);
            if self.labor_enabled(id, labor)? != enabled {
                self.set_field(id, FieldId::Labor(labor), FieldValue::Flag(enabled))?;
                staged += 1;
            }
        }
        Ok(staged)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_changes(&self) -> Vec<PendingChange> {
        self.pending.iter().collect()
    }

    pub fn pending_for(&self, id: EntityId) -> Vec<PendingChange> {
        self.pending.for_entity(id).collect()
    }

    pub fn dirty_entities(&self) -> Vec<EntityId> {
        self.pending.entities()
    }

    /// Drop every pending change without touching the game.
    pub fn discard_pending(&mut self) {
        let dropped = self.pending.len();
        self.pending.clear();
        debug!("Discarded {} pending change(s)", dropped);
        self.observers
            .notify(&ModelEvent::PendingChanged { pending: 0 });
    }

    /// Remove committed changes from the overlay; failed ones stay.
    ///
    /// A change edited again after the commit started is kept.
    pub fn apply_commit(&mut self, report: &CommitReport) {
        for change in report.committed() {
            if self.pending.get(change.entity, change.field) == Some(change.value) {
                self.pending.remove(change.entity, change.field);
            }
        }
        self.observers.notify(&ModelEvent::Committed {
            committed: report.committed_count(),
            failed: report.failed_count(),
        });
    }

    pub fn group_by(&self, mode: GroupBy) -> Vec<Group> {
        group_entities(&self.entities, &self.game, mode, self.sort)
    }

    /// Groups for the current grouping mode and sort key.
    pub fn groups(&self) -> Vec<Group> {
        group_entities(&self.entities, &self.game, self.group_by, self.sort)
    }

    pub fn grouping(&self) -> (GroupBy, SortKey) {
        (self.group_by, self.sort)
    }

    pub fn set_grouping(&mut self, group_by: GroupBy, sort: SortKey) {
        self.group_by = group_by;
        self.sort = sort;
        self.observers
            .notify(&ModelEvent::GroupingChanged { group_by, sort });
    }

    /// Register a listener. Callbacks run while the model is borrowed and
    /// must not call back into it.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&ModelEvent) + Send + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Lock shared by scan, reload and commit.
    pub fn operations(&self) -> OperationLock {
        self.lock.clone()
    }

    pub fn begin(&self, operation: Operation) -> Result<OperationGuard, ModelError> {
        self.lock.try_begin(operation)
    }
}

impl fmt::Debug for EntityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityModel")
            .field("entities", &self.entities.len())
            .field("pending", &self.pending.len())
            .field("group_by", &self.group_by)
            .field("sort", &self.sort)
            .finish()
    }
}
