//! One attached game process and everything derived from it.
//!
//! A [`Session`] owns the process handle, the memory layout matched to the
//! running build, the labor schema and the [`EntityModel`]. Scans, reloads
//! and commits can run inline or on a background thread via the `spawn_*`
//! methods, each of which hands back a [`TaskHandle`].
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use therapist_core::{CancelSignal, GameData, LayoutRegistry, NoProgress, Session};
//!
//! let registry = LayoutRegistry::builtin()?;
//! let game = Arc::new(GameData::builtin()?);
//! let session = Session::attach("dwarfort.exe", &registry, game)?;
//!
//! session.spawn_scan(NoProgress, CancelSignal::new())?.join()?;
//! session.reload()?;
//! println!("{} creatures", session.model().len());
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::commit::{CommitReport, execute_commit, plan_commit};
use crate::decode::{Dictionary, Entity, EntityDecoder};
use crate::error::{AttachError, DecodeError, Error, MemoryError, Result, ScanError};
use crate::gamedata::GameData;
use crate::layout::{LayoutRegistry, MemoryLayout};
use crate::memory::{Address, ProcessHandle, WriteMemory, detect_build_id};
use crate::model::{EntityModel, Operation, OperationLock};
use crate::scanner::{NoProgress, ProgressSink, ScanTarget, VectorScanner};

/// Foreign addresses of the global vectors a session reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collections {
    pub creature_vector: Address,
    /// `None` when the word tables could not be located.
    pub language_vector: Option<Address>,
    pub translation_vector: Option<Address>,
}

#[derive(Debug, Default)]
struct Located {
    collections: Option<Collections>,
    dictionary: Option<Arc<Dictionary>>,
}

pub struct Session<P> {
    process: Arc<P>,
    layout: Arc<MemoryLayout>,
    game: Arc<GameData>,
    model: Arc<Mutex<EntityModel>>,
    operations: OperationLock,
    located: Arc<Mutex<Located>>,
}

impl<P> Clone for Session<P> {
    fn clone(&self) -> Self {
        Self {
            process: Arc::clone(&self.process),
            layout: Arc::clone(&self.layout),
            game: Arc::clone(&self.game),
            model: Arc::clone(&self.model),
            operations: self.operations.clone(),
            located: Arc::clone(&self.located),
        }
    }
}

impl Session<ProcessHandle> {
    /// Find the game process by executable name, detect its build and pick
    /// the matching layout from `registry`.
    pub fn attach(name: &str, registry: &LayoutRegistry, game: Arc<GameData>) -> Result<Self> {
        let process = ProcessHandle::find_and_open(name)?;
        let build_id = detect_build_id(&process).map_err(AttachError::from)?;
        let layout = registry.lookup(&build_id)?;
        info!(
            "Attached to {} (PID {}), build {} uses layout {}",
            process.name, process.pid, build_id, layout.game_version
        );
        Ok(Self::new(process, layout, game))
    }

    /// Revoke the process handle. Every later operation fails with
    /// [`MemoryError::AccessRevoked`].
    pub fn detach(&self) {
        self.process.invalidate();
        self.forget_collections();
    }
}

impl<P: WriteMemory + Send + Sync + 'static> Session<P> {
    pub fn new(process: P, layout: Arc<MemoryLayout>, game: Arc<GameData>) -> Self {
        let model = EntityModel::new(Arc::clone(&game));
        let operations = model.operations();
        Self {
            process: Arc::new(process),
            layout,
            game,
            model: Arc::new(Mutex::new(model)),
            operations,
            located: Arc::default(),
        }
    }

    pub fn process(&self) -> &P {
        &self.process
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    pub fn game(&self) -> &GameData {
        &self.game
    }

    pub fn is_connected(&self) -> bool {
        self.process.is_valid()
    }

    /// Lock the model.
    ///
    /// Observer callbacks run while this lock is held and must not call back
    /// into the session.
    pub fn model(&self) -> MutexGuard<'_, EntityModel> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Collections found by the last successful scan.
    pub fn collections(&self) -> Option<Collections> {
        self.located().collections
    }

    pub fn dictionary(&self) -> Option<Arc<Dictionary>> {
        self.located().dictionary.clone()
    }

    /// Locate the creature vector and, when possible, the word tables used
    /// for last names.
    ///
    /// Missing word tables only disable last names; a missing creature
    /// vector fails the scan.
    pub fn scan(&self, progress: &dyn ProgressSink, cancel: &CancelSignal) -> Result<Collections> {
        self.ensure_connected()?;
        let _guard = self.operations.try_begin(Operation::Scan)?;
        self.locate(progress, cancel)
    }

    fn locate(&self, progress: &dyn ProgressSink, cancel: &CancelSignal) -> Result<Collections> {
        let scanner = VectorScanner::new(&*self.process, &self.layout);

        let creature_vector = scanner
            .locate(ScanTarget::CreatureVector, progress, cancel)
            .map_err(|e| self.disconnect_if_lost(e.into()))?;
        let language_vector =
            self.locate_optional(&scanner, ScanTarget::LanguageVector, progress, cancel)?;
        let translation_vector =
            self.locate_optional(&scanner, ScanTarget::TranslationVector, progress, cancel)?;

        let dictionary = match (language_vector, translation_vector) {
            (Some(language), Some(translation)) => {
                match Dictionary::load(&*self.process, &self.layout, language, translation) {
                    Ok(dictionary) => Some(Arc::new(dictionary)),
                    Err(DecodeError::Memory(e)) if e.is_session_lost() => {
                        return Err(self.disconnect_if_lost(e.into()));
                    }
                    Err(e) => {
                        warn!("Word tables unreadable, last names disabled: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        let collections = Collections {
            creature_vector,
            language_vector,
            translation_vector,
        };
        let mut located = self.located();
        located.collections = Some(collections);
        located.dictionary = dictionary;
        Ok(collections)
    }

    fn locate_optional(
        &self,
        scanner: &VectorScanner<'_, P>,
        target: ScanTarget,
        progress: &dyn ProgressSink,
        cancel: &CancelSignal,
    ) -> Result<Option<Address>> {
        match scanner.locate(target, progress, cancel) {
            Ok(address) => Ok(Some(address)),
            Err(ScanError::NoCandidateFound { .. }) => {
                warn!("{} not found, last names disabled", target);
                Ok(None)
            }
            Err(e) => Err(self.disconnect_if_lost(e.into())),
        }
    }

    /// Decode every creature and replace the model's contents.
    ///
    /// Scans first if nothing has been located yet. A corrupt record aborts
    /// the reload and leaves the model untouched; the located collections
    /// are dropped so the next reload scans again, as they are after an
    /// empty load. Returns the number of entities loaded.
    pub fn reload(&self) -> Result<usize> {
        self.ensure_connected()?;
        let _guard = self.operations.try_begin(Operation::Reload)?;

        let collections = match self.collections() {
            Some(collections) => collections,
            None => self.locate(&NoProgress, &CancelSignal::new())?,
        };
        let dictionary = self.dictionary();
        let entities = match self.decode(collections.creature_vector, dictionary.as_deref()) {
            Ok(entities) => entities,
            Err(e) if e.is_session_lost() => return Err(self.disconnect_if_lost(e)),
            Err(e) => {
                warn!(
                    "Creature vector at 0x{:X} is unusable, rescanning next time: {}",
                    collections.creature_vector, e
                );
                self.forget_collections();
                return Err(e);
            }
        };

        let count = entities.len();
        if count == 0 {
            debug!("Creature vector is empty, rescanning next time");
            self.forget_collections();
        }
        self.model().load(entities);
        Ok(count)
    }

    fn decode(&self, base: Address, dictionary: Option<&Dictionary>) -> Result<Vec<Entity>> {
        let mut decoder = EntityDecoder::new(&*self.process, &self.layout)?;
        if let Some(dictionary) = dictionary {
            decoder = decoder.with_dictionary(dictionary);
        }

        let entities = decoder.decode_all(base)?.collect::<std::result::Result<Vec<_>, _>>()?;
        info!("Decoded {} creature(s)", entities.len());
        Ok(entities)
    }

    /// Write every pending change to the process.
    ///
    /// The model is only locked while planning and while applying the
    /// report, never during the writes themselves.
    pub fn commit(&self) -> Result<CommitReport> {
        let _guard = self.operations.try_begin(Operation::Commit)?;

        let plan = plan_commit(&self.model(), &self.layout)?;
        let report = execute_commit(&*self.process, &plan);
        self.model().apply_commit(&report);

        if report.session_lost() {
            self.disconnect_if_lost(MemoryError::AccessRevoked.into());
        }
        Ok(report)
    }

    /// Drop every pending change without touching the process.
    pub fn discard(&self) {
        self.model().discard_pending();
    }

    pub fn spawn_scan<S>(&self, progress: S, cancel: CancelSignal) -> Result<TaskHandle<Collections>>
    where
        S: ProgressSink + 'static,
    {
        let session = self.clone();
        spawn_task("scan", move || session.scan(&progress, &cancel))
    }

    pub fn spawn_reload(&self) -> Result<TaskHandle<usize>> {
        let session = self.clone();
        spawn_task("reload", move || session.reload())
    }

    /// Commit on a background thread and hand the report to `on_complete`
    /// once the batch has been applied to the model.
    pub fn spawn_commit<F>(&self, on_complete: F) -> Result<TaskHandle<CommitReport>>
    where
        F: FnOnce(&CommitReport) + Send + 'static,
    {
        let session = self.clone();
        spawn_task("commit", move || {
            let report = session.commit()?;
            on_complete(&report);
            Ok(report)
        })
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.process.is_valid() {
            Ok(())
        } else {
            Err(self.disconnect_if_lost(MemoryError::AccessRevoked.into()))
        }
    }

    /// Demote the session to disconnected if `error` means the process is gone.
    fn disconnect_if_lost(&self, error: Error) -> Error {
        if error.is_session_lost() {
            warn!("Lost access to the game process; re-attach to continue");
            self.forget_collections();
        }
        error
    }
}

impl<P> Session<P> {
    fn located(&self) -> MutexGuard<'_, Located> {
        self.located.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the located collections and dictionary so the next scan or
    /// reload locates them again.
    pub fn forget_collections(&self) {
        *self.located() = Located::default();
    }
}

/// A background session task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    name: &'static str,
    handle: JoinHandle<Result<T>>,
}

impl<T> TaskHandle<T> {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task and return its result.
    pub fn join(self) -> Result<T> {
        let TaskHandle { name, handle } = self;
        handle
            .join()
            .map_err(|_| Error::TaskPanicked(name.to_string()))?
    }
}

fn spawn_task<T, F>(name: &'static str, task: F) -> Result<TaskHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(format!("therapist-{}", name))
        .spawn(task)?;
    debug!("Spawned {} task", name);
    Ok(TaskHandle { name, handle })
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::decode::test_memory::{self, HEADER};
    use crate::error::ModelError;
    use crate::layout::fixtures::test_layout;
    use crate::memory::MockMemory;
    use crate::model::{EntityId, FieldId, FieldValue, ModelState};
    use crate::scanner::ScanProgress;

    fn session() -> Session<MockMemory> {
        let mut layout = test_layout();
        // The fake process carries no word tables
        layout.scan.language_vector.min_count = 5000;
        layout.scan.translation_vector.min_count = 5000;
        Session::new(
            test_memory::memory(),
            Arc::new(layout),
            Arc::new(GameData::builtin().unwrap()),
        )
    }

    fn ids(session: &Session<MockMemory>) -> Vec<i32> {
        session.model().entities().iter().map(|e| e.id.0).collect()
    }

    #[test]
    fn test_reload_scans_then_loads() {
        let session = session();
        assert_eq!(session.collections(), None);

        assert_eq!(session.reload().unwrap(), 3);
        assert_eq!(ids(&session), vec![101, 57, 230]);
        assert_eq!(session.model().state(), ModelState::Loaded);

        let collections = session.collections().unwrap();
        assert_eq!(collections.creature_vector, HEADER);
        assert_eq!(collections.language_vector, None);
        assert!(session.dictionary().is_none());
    }

    #[test]
    fn test_spawned_scan_reports_progress() {
        let session = session();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let reports = Arc::clone(&reports);
            move |progress: ScanProgress| reports.lock().unwrap().push(progress)
        };

        let collections = session
            .spawn_scan(sink, CancelSignal::new())
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(collections.creature_vector, HEADER);
        let reports = reports.lock().unwrap();
        assert!(
            reports
                .iter()
                .any(|p| p.target == ScanTarget::CreatureVector && p.percent() == 100)
        );
    }

    #[test]
    fn test_cancelled_scan_fails() {
        let session = session();
        let cancel = CancelSignal::new();
        cancel.cancel();

        let err = session.spawn_scan(NoProgress, cancel).unwrap().join().unwrap_err();
        assert!(matches!(err, Error::Scan(ScanError::Cancelled)));
        assert_eq!(session.collections(), None);
    }

    #[test]
    fn test_spawned_commit_calls_back_with_report() {
        let session = session();
        session.reload().unwrap();
        session
            .model()
            .set_field(EntityId(57), FieldId::Labor(0), FieldValue::Flag(true))
            .unwrap();

        let (tx, rx) = mpsc::channel();
        let report = session
            .spawn_commit(move |report| tx.send(report.committed_count()).unwrap())
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(report.committed_count(), 1);
        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(session.model().pending_count(), 0);
        assert_eq!(session.process().byte_at(test_memory::record(1) + 0x90), 1);
    }

    #[test]
    fn test_lost_process_disconnects_session() {
        let session = session();
        session.reload().unwrap();
        session
            .model()
            .set_field(EntityId(101), FieldId::Labor(0), FieldValue::Flag(false))
            .unwrap();

        session.process().invalidate();
        assert!(!session.is_connected());

        let err = session.spawn_reload().unwrap().join().unwrap_err();
        assert!(err.is_session_lost());
        assert!(session.scan(&NoProgress, &CancelSignal::new()).unwrap_err().is_session_lost());

        let report = session.commit().unwrap();
        assert!(report.session_lost());
        assert_eq!(session.process().write_count(), 0);
        assert_eq!(session.model().pending_count(), 1);
        assert_eq!(session.collections(), None);
    }

    #[test]
    fn test_reload_refused_during_commit() {
        let session = session();
        let _commit = session.operations.try_begin(Operation::Commit).unwrap();

        let err = session.reload().unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Busy(Operation::Commit))));
    }

    #[test]
    fn test_corrupt_record_aborts_reload() {
        let session = session();
        session.reload().unwrap();
        session
            .model()
            .set_field(EntityId(57), FieldId::Labor(0), FieldValue::Flag(true))
            .unwrap();

        session
            .process()
            .write_bytes(test_memory::record(1), &(-5i32).to_le_bytes())
            .unwrap();

        let err = session.reload().unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::CorruptRecord { .. })));
        assert!(!err.is_session_lost());
        assert_eq!(ids(&session), vec![101, 57, 230]);
        assert_eq!(session.model().pending_count(), 1);
        assert_eq!(session.collections(), None);
        assert!(session.is_connected());
    }

    #[test]
    fn test_empty_load_rescans_next_time() {
        let session = session();
        session.reload().unwrap();

        // Game unloads its fort: the creature vector becomes empty
        session
            .process()
            .write_bytes(HEADER + 4, &(test_memory::RECORDS as u32).to_le_bytes())
            .unwrap();
        assert_eq!(session.reload().unwrap(), 0);
        assert_eq!(session.collections(), None);
        assert!(session.model().is_empty());
    }

    #[test]
    fn test_scan_refused_during_commit() {
        let session = session();
        let _commit = session.operations.try_begin(Operation::Commit).unwrap();

        let err = session.scan(&NoProgress, &CancelSignal::new()).unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Busy(Operation::Commit))));
        assert_eq!(session.collections(), None);
    }

    #[test]
    fn test_discard_issues_no_writes() {
        let session = session();
        session.reload().unwrap();
        session
            .model()
            .set_field(EntityId(230), FieldId::Labor(13), FieldValue::Flag(true))
            .unwrap();

        session.discard();
        let report = session.commit().unwrap();

        assert!(report.is_empty());
        assert_eq!(session.process().write_count(), 0);
    }
}
