//! # therapist-core
//!
//! Core library for the therapist labor manager.
//!
//! This crate provides:
//! - Windows process memory reading and writing
//! - Versioned memory layout profiles
//! - Heuristic scanning for the game's global vectors
//! - Creature decoding, a pending-change model with grouping, and commit

pub mod cancel;
pub mod commit;
pub mod config;
pub mod decode;
pub mod error;
pub mod export;
pub mod gamedata;
pub mod layout;
pub mod memory;
pub mod model;
pub mod scanner;
pub mod session;

pub use cancel::CancelSignal;
pub use commit::{
    CommitOutcome, CommitPlan, CommitReport, FailureReason, PlannedWrite, commit, execute_commit,
    plan_commit,
};
pub use decode::{
    Dictionary, Entity, EntityDecoder, EntityId, HappinessLevel, Sex, Skill, VectorHeader,
    read_msvc_string,
};
pub use error::{
    AttachError, DecodeError, Error, LayoutError, MemoryError, ModelError, Result, ScanError,
};
pub use export::{ExportDocument, export_entities_json, generate_entities_json};
pub use gamedata::{GameData, LaborColumn, LaborId, SkillId};
pub use layout::{
    CollectionLayout, Field, FieldSpec, LayoutRegistry, MemoryLayout, builtin_layouts, load_layout,
    save_layout,
};
pub use memory::{
    Address, ByteBuffer, DEFAULT_PROCESS_NAME, ProcessHandle, ProcessInfo, ReadMemory, WriteMemory,
    detect_build_id, list_processes,
};
pub use model::{
    CustomProfession, EntityModel, FieldId, FieldValue, Group, GroupBy, GroupKey, ModelEvent,
    ModelState, Operation, PendingChange, SortKey, SubscriptionId,
};
pub use scanner::{NoProgress, ProgressSink, ScanCandidate, ScanProgress, ScanTarget, VectorScanner};
pub use session::{Collections, Session, TaskHandle};
