use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use super::backend::StorageBackend;
use super::backup::BackupManager;
use super::StorageKeys;
use crate::autosave::SaveTrigger;
use crate::clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::codec::{Codec, JsonCodec};
use crate::commands;
use crate::error::{MigrationError, Result, StickyError, WriteFailure};
use crate::migrations::{MigrationFailure, Migrator};
use crate::model::{
    AppSettings, Document, Note, NoteId, NotePatch, SettingsPatch, SizePolicy, CURRENT_VERSION,
};

/// Lifecycle of a store: `Uninitialized -> Loading -> {Ready, Degraded}`.
///
/// `Ready` and `Degraded` accept the same API; `Degraded` only means the last
/// load hit an error that is still visible through `last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Uninitialized,
    Loading,
    Ready,
    Degraded,
}

impl StoreStatus {
    pub fn is_loaded(self) -> bool {
        matches!(self, StoreStatus::Ready | StoreStatus::Degraded)
    }
}

/// Where the live document came from on the last load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// No primary document existed yet.
    Fresh,
    Primary,
    Backup,
    /// Nothing was usable; the store started from an empty document.
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub source: LoadSource,
    /// Schema version found in storage, if a record was read.
    pub from_version: Option<u32>,
    /// Schema version of the live document.
    pub version: u32,
    pub migrated: bool,
    /// Every error met along the way, in the order encountered.
    pub errors: Vec<StickyError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Collaborators and policies a store is built from.
pub struct StoreOptions {
    pub keys: StorageKeys,
    pub codec: Arc<dyn Codec>,
    pub migrator: Arc<Migrator>,
    pub target_version: u32,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub size_policy: SizePolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            keys: StorageKeys::default(),
            codec: Arc::new(JsonCodec::pretty()),
            migrator: Arc::new(Migrator::builtin()),
            target_version: CURRENT_VERSION,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
            size_policy: SizePolicy::default(),
        }
    }
}

impl StoreOptions {
    pub fn with_keys(mut self, keys: StorageKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Install a migration chain and the version it upgrades to.
    pub fn with_migrator(mut self, migrator: Migrator, target_version: u32) -> Self {
        self.migrator = Arc::new(migrator);
        self.target_version = target_version;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_size_policy(mut self, policy: SizePolicy) -> Self {
        self.size_policy = policy;
        self
    }
}

struct State {
    document: Document,
    status: StoreStatus,
    last_error: Option<StickyError>,
    last_saved: Option<DateTime<Utc>>,
    migration_backup: Option<Value>,
    /// Original bytes of a migrated document, written to the recovery key
    /// ahead of the first save that would replace them.
    pending_stash: Option<Vec<u8>>,
    /// Set when a document that failed to migrate could not be stashed;
    /// the primary is then the only copy and must not be overwritten.
    protect_primary: Option<MigrationError>,
    revision: u64,
    saved_revision: u64,
}

struct Shared<B: StorageBackend> {
    state: Mutex<State>,
    backend: Arc<B>,
    codec: Arc<dyn Codec>,
    keys: StorageKeys,
    backups: BackupManager<B>,
    migrator: Arc<Migrator>,
    target_version: u32,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    policy: SizePolicy,
    /// Serializes loads and saves against the backend.
    save_gate: tokio::sync::Mutex<()>,
    trigger: SaveTrigger,
}

/// The live document and everything needed to persist it.
///
/// Mutations and queries are synchronous and atomic with respect to each
/// other. Persistence is async and runs one operation at a time; a save
/// encodes a snapshot taken when it starts, so mutations issued during a
/// save are picked up by the next one.
///
/// Cloning is cheap and yields another handle to the same store.
pub struct DocumentStore<B: StorageBackend> {
    shared: Arc<Shared<B>>,
}

impl<B: StorageBackend> Clone for DocumentStore<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Outcome of turning stored bytes into a current document.
enum Upgrade {
    Done {
        document: Document,
        from_version: u32,
        migrated: bool,
    },
    /// The bytes or the record they hold are unusable.
    Unreadable(StickyError),
    /// The record is intact but could not be brought to the target version.
    Failed(MigrationFailure),
}

impl<B: StorageBackend + 'static> DocumentStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_options(backend, StoreOptions::default())
    }

    pub fn with_options(backend: Arc<B>, options: StoreOptions) -> Self {
        let backups = BackupManager::new(
            Arc::clone(&backend),
            Arc::clone(&options.codec),
            options.keys.clone(),
        );
        let state = State {
            document: Document::empty(options.clock.now()),
            status: StoreStatus::Uninitialized,
            last_error: None,
            last_saved: None,
            migration_backup: None,
            pending_stash: None,
            protect_primary: None,
            revision: 0,
            saved_revision: 0,
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                backend,
                codec: options.codec,
                keys: options.keys,
                backups,
                migrator: options.migrator,
                target_version: options.target_version,
                clock: options.clock,
                ids: options.ids,
                policy: options.size_policy,
                save_gate: tokio::sync::Mutex::new(()),
                trigger: SaveTrigger::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn trigger(&self) -> &SaveTrigger {
        &self.shared.trigger
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.shared.keys
    }

    pub fn codec_name(&self) -> &'static str {
        self.shared.codec.name()
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.shared.backend
    }

    // --- Mutations ---------------------------------------------------------

    /// Apply `op` to the live document and arm the auto-save window.
    ///
    /// A failing op must leave the document untouched; nothing is armed then.
    fn mutate<T>(&self, op: impl FnOnce(&mut Document, DateTime<Utc>) -> Result<T>) -> Result<T> {
        let (output, delay) = {
            let mut state = self.state();
            if !state.status.is_loaded() {
                return Err(StickyError::NotLoaded);
            }
            let now = self.shared.clock.now();
            let output = op(&mut state.document, now)?;
            state.revision += 1;
            let settings = &state.document.settings;
            (output, settings.auto_save.then(|| settings.save_delay()))
        };
        if let Some(delay) = delay {
            self.shared.trigger.touch(delay);
        }
        Ok(output)
    }

    pub fn create_note(&self, patch: NotePatch) -> Result<Note> {
        let ids = Arc::clone(&self.shared.ids);
        let policy = self.shared.policy;
        self.mutate(|doc, now| commands::create::run(doc, ids.as_ref(), &policy, now, patch))
    }

    pub fn update_note(&self, id: &NoteId, patch: NotePatch) -> Result<Note> {
        let policy = self.shared.policy;
        self.mutate(|doc, now| commands::update::run(doc, &policy, now, id, patch))
    }

    pub fn delete_note(&self, id: &NoteId) -> Result<Note> {
        self.mutate(|doc, _| commands::delete::run(doc, id))
    }

    /// Flip the pin state. Returns the new value.
    pub fn toggle_pin(&self, id: &NoteId) -> Result<bool> {
        self.mutate(|doc, now| commands::pinning::toggle(doc, now, id))
    }

    pub fn update_settings(&self, patch: &SettingsPatch) -> Result<AppSettings> {
        self.mutate(|doc, _| Ok(commands::settings::update(doc, patch)))
    }

    pub fn replace_settings(&self, settings: AppSettings) -> Result<AppSettings> {
        self.mutate(|doc, _| Ok(commands::settings::replace(doc, settings)))
    }

    // --- Queries -----------------------------------------------------------

    pub fn get_note_by_id(&self, id: &NoteId) -> Option<Note> {
        commands::query::get(&self.state().document.notes, id).cloned()
    }

    pub fn notes(&self) -> Vec<Note> {
        self.state().document.notes.clone()
    }

    /// Pinned notes first, insertion order kept within each group.
    pub fn sorted_notes(&self) -> Vec<Note> {
        commands::query::sorted(&self.state().document.notes)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn total_notes(&self) -> usize {
        commands::query::total(&self.state().document.notes)
    }

    pub fn pinned_count(&self) -> usize {
        commands::query::pinned_count(&self.state().document.notes)
    }

    pub fn settings(&self) -> AppSettings {
        self.state().document.settings.clone()
    }

    /// A copy of the live document.
    pub fn document(&self) -> Document {
        self.state().document.clone()
    }

    pub fn status(&self) -> StoreStatus {
        self.state().status
    }

    pub fn is_loading(&self) -> bool {
        self.status() == StoreStatus::Loading
    }

    pub fn last_error(&self) -> Option<StickyError> {
        self.state().last_error.clone()
    }

    pub fn dismiss_error(&self) {
        self.state().last_error = None;
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.state().last_saved
    }

    pub fn has_unsaved_changes(&self) -> bool {
        let state = self.state();
        state.revision != state.saved_revision
    }

    /// The untouched record of the last document that had to be migrated.
    pub fn migration_backup(&self) -> Option<Value> {
        self.state().migration_backup.clone()
    }

    // --- Persistence -------------------------------------------------------

    /// Encode the live document and write it under the primary key.
    ///
    /// On failure the error is recorded in `last_error`, the in-memory
    /// document is kept as is, and no backup is taken.
    pub async fn save_to_storage(&self) -> Result<()> {
        let _gate = self.shared.save_gate.lock().await;
        if !self.status().is_loaded() {
            return Err(StickyError::NotLoaded);
        }
        self.persist().await
    }

    /// Caller must hold the save gate.
    async fn persist(&self) -> Result<()> {
        let now = self.shared.clock.now();
        let (snapshot, revision, stash) = {
            let state = self.state();
            if let Some(err) = &state.protect_primary {
                return Err(StickyError::Migration(err.clone()));
            }
            let mut snapshot = state.document.clone();
            snapshot.timestamp = now;
            (snapshot, state.revision, state.pending_stash.clone())
        };

        let bytes = match self.shared.codec.encode(&snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "document could not be encoded; nothing written");
                self.state().last_error = Some(e.clone());
                return Err(e);
            }
        };

        let size = bytes.len();
        let stashed = stash.is_some();
        if let Err(e) = self.write_through(stash, bytes).await {
            warn!(key = %self.shared.keys.primary, error = %e, "save failed; data kept in memory");
            self.state().last_error = Some(e.clone());
            return Err(e);
        }

        let mut state = self.state();
        state.document.timestamp = now;
        state.last_saved = Some(now);
        state.saved_revision = revision;
        if stashed {
            state.pending_stash = None;
        }
        if state.last_error.as_ref().is_some_and(StickyError::is_save_error) {
            state.last_error = None;
        }
        debug!(
            key = %self.shared.keys.primary,
            notes = snapshot.notes.len(),
            bytes = size,
            "document saved"
        );
        Ok(())
    }

    /// Stash (if pending), primary write, backup snapshot, in that order.
    /// Backend calls block, so they run on tokio's blocking pool.
    async fn write_through(&self, stash: Option<Vec<u8>>, bytes: Vec<u8>) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(original) = stash {
                shared.backups.stash_pre_migration(&original)?;
            }
            shared.backend.write(&shared.keys.primary, &bytes)?;
            shared.backups.snapshot(&bytes);
            Ok(())
        })
        .await
        .unwrap_or_else(|e| {
            Err(StickyError::Write {
                key: self.shared.keys.primary.clone(),
                failure: WriteFailure::Other,
                message: e.to_string(),
            })
        })
    }

    /// Read the primary document, falling back to the backup and finally to
    /// an empty document. Never fails; what happened is in the report and,
    /// for unrecovered errors, in `last_error`.
    pub async fn load_from_storage(&self) -> LoadReport {
        let _gate = self.shared.save_gate.lock().await;
        {
            let mut state = self.state();
            state.status = StoreStatus::Loading;
            state.protect_primary = None;
            state.pending_stash = None;
            state.migration_backup = None;
        }
        let keys = &self.shared.keys;
        debug!(key = %keys.primary, "loading document");

        let mut errors = Vec::new();
        let primary = match self.shared.backend.read(&keys.primary) {
            Ok(None) => {
                debug!(key = %keys.primary, "no stored document; starting fresh");
                let document = Document::empty(self.shared.clock.now());
                return self
                    .finish_load(document, LoadSource::Fresh, None, false, errors)
                    .await;
            }
            Ok(Some(bytes)) => self.upgrade(&bytes),
            Err(e) => Upgrade::Unreadable(e),
        };

        match primary {
            Upgrade::Done {
                document,
                from_version,
                migrated,
            } => {
                return self
                    .finish_load(
                        document,
                        LoadSource::Primary,
                        Some(from_version),
                        migrated,
                        errors,
                    )
                    .await;
            }
            Upgrade::Failed(failure) => {
                return self.salvage(failure, LoadSource::Primary, errors);
            }
            Upgrade::Unreadable(e) => {
                warn!(key = %keys.primary, error = %e, "primary document unreadable; trying backup");
                errors.push(e);
            }
        }

        match self.upgrade_backup() {
            Ok(Some(Upgrade::Done {
                document,
                from_version,
                migrated,
            })) => {
                info!(key = %keys.backup, version = document.version, "document restored from backup");
                let report = self
                    .finish_load(
                        document,
                        LoadSource::Backup,
                        Some(from_version),
                        migrated,
                        errors,
                    )
                    .await;
                if !migrated {
                    // The primary still holds the unreadable bytes.
                    self.state().revision += 1;
                }
                return report;
            }
            Ok(Some(Upgrade::Failed(failure))) => {
                return self.salvage(failure, LoadSource::Backup, errors);
            }
            Ok(Some(Upgrade::Unreadable(e))) => errors.push(e),
            Ok(None) => debug!(key = %keys.backup, "no backup to fall back to"),
            Err(e) => errors.push(e),
        }

        error!(
            key = %keys.primary,
            errors = errors.len(),
            "no readable document or backup; starting from an empty document"
        );
        let document = Document::empty(self.shared.clock.now());
        let first = errors.first().cloned();
        let mut report = self.install(document, StoreStatus::Degraded, first, None);
        report.source = LoadSource::Default;
        report.errors = errors;
        report
    }

    /// Decode stored bytes and run the migration chain over them. A migrated
    /// document's original bytes are queued for the recovery key, which the
    /// next save writes before anything else.
    fn upgrade(&self, bytes: &[u8]) -> Upgrade {
        let record = match self.shared.codec.decode_value(bytes) {
            Ok(record) => record,
            Err(e) => return Upgrade::Unreadable(e),
        };
        self.upgrade_record(bytes, record)
    }

    fn upgrade_backup(&self) -> Result<Option<Upgrade>> {
        Ok(self
            .shared
            .backups
            .restore_record()?
            .map(|raw| self.upgrade_record(&raw.bytes, raw.record)))
    }

    fn upgrade_record(&self, bytes: &[u8], record: Value) -> Upgrade {
        match self.shared.migrator.run(record, self.shared.target_version) {
            Ok(migrated) => {
                let upgraded = migrated.upgraded();
                let from_version = migrated.from_version;
                match Document::from_value(migrated.document) {
                    Ok(document) => {
                        if upgraded {
                            let mut state = self.state();
                            state.migration_backup = migrated.backup;
                            state.pending_stash = Some(bytes.to_vec());
                        }
                        Upgrade::Done {
                            document,
                            from_version,
                            migrated: upgraded,
                        }
                    }
                    Err(e) => Upgrade::Unreadable(e),
                }
            }
            Err(failure) => {
                if self.shared.backups.stash_pre_migration(bytes).is_err() {
                    self.state().protect_primary = Some(failure.error.clone());
                }
                Upgrade::Failed(failure)
            }
        }
    }

    /// Migration failed: keep the engine's backup for manual recovery and
    /// run on the pre-migration document if it still decodes. `source` is
    /// the key the record was read from.
    fn salvage(
        &self,
        failure: MigrationFailure,
        source: LoadSource,
        mut errors: Vec<StickyError>,
    ) -> LoadReport {
        let err = StickyError::Migration(failure.error.clone());
        warn!(
            from = ?failure.from_version,
            to = failure.to_version,
            error = %failure.error,
            "migration failed; stored document left untouched"
        );
        let salvaged = failure
            .backup
            .clone()
            .and_then(|record| Document::from_value(record).ok());
        let salvaged_any = salvaged.is_some();
        let document = salvaged.unwrap_or_else(|| Document::empty(self.shared.clock.now()));
        if salvaged_any {
            info!(notes = document.notes.len(), "running on the pre-migration document");
        }

        let mut report = self.install(
            document,
            StoreStatus::Degraded,
            Some(err.clone()),
            failure.backup,
        );
        report.source = if salvaged_any {
            source
        } else {
            LoadSource::Default
        };
        report.from_version = failure.from_version;
        errors.push(err);
        report.errors = errors;
        report
    }

    async fn finish_load(
        &self,
        document: Document,
        source: LoadSource,
        from_version: Option<u32>,
        migrated: bool,
        errors: Vec<StickyError>,
    ) -> LoadReport {
        let migration_backup = if migrated {
            self.state().migration_backup.take()
        } else {
            None
        };
        let mut report = self.install(document, StoreStatus::Ready, None, migration_backup);
        report.source = source;
        report.from_version = from_version;
        report.migrated = migrated;
        report.errors = errors;

        if migrated {
            self.state().revision += 1;
            if let Err(e) = self.persist().await {
                warn!(error = %e, "upgraded document could not be written back");
                report.errors.push(e);
            }
        }
        debug!(source = ?report.source, version = report.version, "document loaded");
        report
    }

    fn install(
        &self,
        document: Document,
        status: StoreStatus,
        last_error: Option<StickyError>,
        migration_backup: Option<Value>,
    ) -> LoadReport {
        let mut state = self.state();
        let version = document.version;
        state.document = document;
        state.status = status;
        state.last_error = last_error;
        state.migration_backup = migration_backup;
        state.revision = 0;
        state.saved_revision = 0;
        LoadReport {
            source: LoadSource::Fresh,
            from_version: None,
            version,
            migrated: false,
            errors: Vec::new(),
        }
    }

    /// Replace the live document with the backup generation.
    ///
    /// The restored document is marked unsaved and arms auto-save like any
    /// other mutation. Fails with a read error when no backup exists.
    pub async fn restore_from_backup(&self) -> Result<Document> {
        let _gate = self.shared.save_gate.lock().await;
        if !self.status().is_loaded() {
            return Err(StickyError::NotLoaded);
        }
        let raw = self
            .shared
            .backups
            .restore_record()?
            .ok_or_else(|| StickyError::Read {
                key: self.shared.backups.key().to_string(),
                message: "no backup available".to_string(),
            })?;
        let migrated = self
            .shared
            .migrator
            .run(raw.record, self.shared.target_version)?;
        let document = Document::from_value(migrated.document)?;

        let delay = {
            let mut state = self.state();
            state.document = document.clone();
            state.status = StoreStatus::Ready;
            state.last_error = None;
            state.protect_primary = None;
            state.revision += 1;
            let settings = &state.document.settings;
            settings.auto_save.then(|| settings.save_delay())
        };
        if let Some(delay) = delay {
            self.shared.trigger.touch(delay);
        }
        info!(notes = document.notes.len(), "document restored from backup on request");
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SequentialIds};
    use crate::error::WriteFailure;
    use crate::migrations::Migration;
    use crate::model::{Position, Size, Theme};
    use crate::store::mem_backend::MemBackend;
    use std::collections::HashSet;

    struct Fixture {
        store: DocumentStore<MemBackend>,
        backend: Arc<MemBackend>,
        clock: Arc<ManualClock>,
    }

    fn options(clock: Arc<ManualClock>) -> StoreOptions {
        StoreOptions::default()
            .with_keys(StorageKeys::derive("doc"))
            .with_codec(JsonCodec::new())
            .with_clock(clock)
            .with_ids(Arc::new(SequentialIds::new()))
    }

    fn fixture_on(backend: Arc<MemBackend>) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let store = DocumentStore::with_options(backend.clone(), options(clock.clone()));
        Fixture {
            store,
            backend,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_on(Arc::new(MemBackend::new()))
    }

    async fn loaded() -> Fixture {
        let fx = fixture();
        fx.store.load_from_storage().await;
        fx
    }

    fn legacy_v1() -> Vec<u8> {
        br##"{
            "notes": [
                {"id": "a", "content": "old", "position": {"x": 1, "y": 2},
                 "size": {"width": 250, "height": 250}, "color": "#ffccbc",
                 "createdAt": 1000, "pinned": true}
            ],
            "settings": {"theme": "dark"}
        }"##
        .to_vec()
    }

    #[tokio::test]
    async fn absent_primary_starts_fresh_without_error() {
        let fx = fixture();
        assert_eq!(fx.store.status(), StoreStatus::Uninitialized);

        let report = fx.store.load_from_storage().await;
        assert_eq!(report.source, LoadSource::Fresh);
        assert!(report.is_clean());
        assert_eq!(fx.store.status(), StoreStatus::Ready);
        assert!(!fx.store.is_loading());
        assert_eq!(fx.store.last_error(), None);

        let doc = fx.store.document();
        assert!(doc.notes.is_empty());
        assert_eq!(doc.version, CURRENT_VERSION);
        assert_eq!(doc.settings, AppSettings::default());
        assert!(fx.backend.keys().is_empty());
    }

    #[tokio::test]
    async fn store_is_unusable_before_first_load() {
        let fx = fixture();
        assert_eq!(
            fx.store.create_note(NotePatch::content("early")),
            Err(StickyError::NotLoaded)
        );
        assert_eq!(fx.store.save_to_storage().await, Err(StickyError::NotLoaded));
        assert_eq!(fx.store.total_notes(), 0);
    }

    #[tokio::test]
    async fn create_pin_delete_keeps_counts_consistent() {
        let fx = loaded().await;
        let note = fx.store.create_note(NotePatch::content("hello")).unwrap();
        assert_eq!(fx.store.total_notes(), 1);

        assert!(fx.store.toggle_pin(&note.id).unwrap());
        assert_eq!(fx.store.pinned_count(), 1);

        fx.store.delete_note(&note.id).unwrap();
        assert_eq!(fx.store.total_notes(), 0);
        assert_eq!(fx.store.pinned_count(), 0);
        assert_eq!(fx.store.get_note_by_id(&note.id), None);
    }

    #[tokio::test]
    async fn created_ids_are_distinct() {
        let fx = fixture();
        let store = DocumentStore::with_options(
            fx.backend.clone(),
            options(fx.clock.clone()).with_ids(Arc::new(crate::clock::UuidGenerator)),
        );
        store.load_from_storage().await;

        let ids: HashSet<NoteId> = (0..200)
            .map(|_| store.create_note(NotePatch::default()).unwrap().id)
            .collect();
        assert_eq!(ids.len(), 200);
    }

    #[tokio::test]
    async fn created_note_uses_settings_defaults_and_clock() {
        let fx = loaded().await;
        let note = fx.store.create_note(NotePatch::default()).unwrap();
        let settings = fx.store.settings();
        assert_eq!(note.size, settings.default_note_size);
        assert_eq!(note.position, settings.default_note_position);
        assert_eq!(note.created_at, fx.clock.now());
        assert_eq!(note.updated_at, note.created_at);
        assert!(!note.is_pinned);
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let fx = loaded().await;
        let before = fx.store.create_note(NotePatch::content("draft")).unwrap();
        fx.clock.advance(5_000);

        let after = fx
            .store
            .update_note(&before.id, NotePatch::default().with_position(Position::new(7, 9)))
            .unwrap();
        assert_eq!(after.position, Position::new(7, 9));
        assert_eq!(after.content, before.content);
        assert_eq!(after.size, before.size);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.updated_at, fx.clock.now());
        assert_eq!(fx.store.get_note_by_id(&before.id), Some(after));
    }

    #[tokio::test]
    async fn missing_id_leaves_document_untouched() {
        let fx = loaded().await;
        fx.store.create_note(NotePatch::content("keep")).unwrap();
        let before = fx.store.document();
        let ghost = NoteId::from("ghost");

        assert_eq!(
            fx.store.update_note(&ghost, NotePatch::content("x")),
            Err(StickyError::NoteNotFound(ghost.clone()))
        );
        assert_eq!(
            fx.store.delete_note(&ghost),
            Err(StickyError::NoteNotFound(ghost.clone()))
        );
        assert!(fx.store.toggle_pin(&ghost).is_err());
        assert_eq!(fx.store.document(), before);
    }

    #[tokio::test]
    async fn oversized_note_is_rejected() {
        let fx = loaded().await;
        let result = fx
            .store
            .create_note(NotePatch::content("huge").with_size(Size::new(2_000, 300)));
        assert!(matches!(result, Err(StickyError::Validation(_))));
        assert_eq!(fx.store.total_notes(), 0);
        assert!(!fx.store.has_unsaved_changes());
    }

    #[tokio::test]
    async fn toggle_twice_restores_pin_state() {
        let fx = loaded().await;
        let note = fx.store.create_note(NotePatch::content("pin me")).unwrap();
        assert!(fx.store.toggle_pin(&note.id).unwrap());
        assert!(!fx.store.toggle_pin(&note.id).unwrap());
        assert!(!fx.store.get_note_by_id(&note.id).unwrap().is_pinned);
    }

    #[tokio::test]
    async fn sorted_notes_put_pinned_first_in_insertion_order() {
        let fx = loaded().await;
        let ids: Vec<NoteId> = (0..5)
            .map(|i| fx.store.create_note(NotePatch::content(i.to_string())).unwrap().id)
            .collect();
        fx.store.toggle_pin(&ids[3]).unwrap();
        fx.store.toggle_pin(&ids[1]).unwrap();

        let order: Vec<NoteId> = fx.store.sorted_notes().into_iter().map(|n| n.id).collect();
        assert_eq!(
            order,
            vec![
                ids[1].clone(),
                ids[3].clone(),
                ids[0].clone(),
                ids[2].clone(),
                ids[4].clone()
            ]
        );
    }

    #[tokio::test]
    async fn settings_merge_and_replace() {
        let fx = loaded().await;
        let merged = fx
            .store
            .update_settings(&SettingsPatch {
                theme: Some(Theme::Dark),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(merged.theme, Theme::Dark);
        assert_eq!(merged.save_interval, AppSettings::default().save_interval);

        let replaced = fx.store.replace_settings(AppSettings::default()).unwrap();
        assert_eq!(replaced, AppSettings::default());
        assert_eq!(fx.store.settings(), AppSettings::default());
    }

    #[tokio::test]
    async fn save_then_fresh_load_yields_same_document() {
        let fx = loaded().await;
        fx.store
            .create_note(NotePatch::content("persist me").with_title("Title"))
            .unwrap();
        let pinned = fx.store.create_note(NotePatch::content("second")).unwrap();
        fx.store.toggle_pin(&pinned.id).unwrap();
        fx.store
            .update_settings(&SettingsPatch {
                theme: Some(Theme::Light),
                ..Default::default()
            })
            .unwrap();
        fx.clock.advance(1_234);
        fx.store.save_to_storage().await.unwrap();

        let reopened = fixture_on(fx.backend.clone());
        let report = reopened.store.load_from_storage().await;
        assert_eq!(report.source, LoadSource::Primary);
        assert_eq!(report.from_version, Some(CURRENT_VERSION));
        assert!(!report.migrated);
        assert_eq!(reopened.store.document(), fx.store.document());
    }

    #[tokio::test]
    async fn successful_save_updates_bookkeeping_and_backup() {
        let fx = loaded().await;
        fx.store.create_note(NotePatch::content("a")).unwrap();
        assert!(fx.store.has_unsaved_changes());
        assert_eq!(fx.store.last_saved(), None);

        fx.clock.advance(10);
        fx.store.save_to_storage().await.unwrap();
        assert_eq!(fx.backend.write_count("doc"), 1);
        assert_eq!(fx.backend.write_count("doc-backup"), 1);
        assert_eq!(fx.backend.get_raw("doc"), fx.backend.get_raw("doc-backup"));
        assert_eq!(fx.store.last_saved(), Some(fx.clock.now()));
        assert_eq!(fx.store.document().timestamp, fx.clock.now());
        assert!(!fx.store.has_unsaved_changes());
    }

    #[tokio::test]
    async fn write_failure_keeps_notes_and_records_error() {
        let fx = loaded().await;
        fx.store.create_note(NotePatch::content("precious")).unwrap();
        fx.backend
            .set_simulate_write_error(Some(WriteFailure::QuotaExceeded));

        let result = fx.store.save_to_storage().await;
        assert!(matches!(
            result,
            Err(StickyError::Write {
                failure: WriteFailure::QuotaExceeded,
                ..
            })
        ));
        assert_eq!(fx.store.last_error(), result.err());
        assert_eq!(fx.store.total_notes(), 1);
        assert!(fx.store.has_unsaved_changes());
        assert_eq!(fx.store.last_saved(), None);

        fx.backend.set_simulate_write_error(None);
        fx.store.save_to_storage().await.unwrap();
        assert_eq!(fx.store.last_error(), None);
        assert!(!fx.store.has_unsaved_changes());
    }

    struct BrokenEncoder;

    impl Codec for BrokenEncoder {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn encode_value(&self, _value: &Value) -> Result<Vec<u8>> {
            Err(StickyError::Serialization("encoder out of order".into()))
        }

        fn decode_value(&self, bytes: &[u8]) -> Result<Value> {
            JsonCodec::new().decode_value(bytes)
        }
    }

    #[tokio::test]
    async fn encode_failure_writes_nothing() {
        let backend = Arc::new(MemBackend::new());
        let store = DocumentStore::with_options(
            backend.clone(),
            options(Arc::new(ManualClock::default())).with_codec(BrokenEncoder),
        );
        store.load_from_storage().await;
        store.create_note(NotePatch::content("stays")).unwrap();
        let before = store.document();

        let result = store.save_to_storage().await;
        assert!(matches!(result, Err(StickyError::Serialization(_))));
        assert!(matches!(
            store.last_error(),
            Some(StickyError::Serialization(_))
        ));
        assert!(backend.keys().is_empty());
        assert_eq!(store.document(), before);
    }

    #[tokio::test]
    async fn corrupt_primary_recovers_from_backup() {
        let fx = loaded().await;
        let note = fx.store.create_note(NotePatch::content("survivor")).unwrap();
        fx.store.save_to_storage().await.unwrap();
        fx.backend.put_raw("doc", "{ truncated");

        let reopened = fixture_on(fx.backend.clone());
        let report = reopened.store.load_from_storage().await;
        assert_eq!(report.source, LoadSource::Backup);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0], StickyError::Deserialization(_)));
        assert_eq!(reopened.store.status(), StoreStatus::Ready);
        assert_eq!(reopened.store.last_error(), None);
        assert!(reopened.store.get_note_by_id(&note.id).is_some());
        assert!(reopened.store.has_unsaved_changes());
    }

    #[tokio::test]
    async fn corrupt_primary_and_backup_degrade_to_empty() {
        let backend = Arc::new(MemBackend::new());
        backend.put_raw("doc", "not json at all");
        backend.put_raw("doc-backup", "[1, 2, 3]");
        let fx = fixture_on(backend);

        let report = fx.store.load_from_storage().await;
        assert_eq!(report.source, LoadSource::Default);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(fx.store.status(), StoreStatus::Degraded);
        assert!(!fx.store.is_loading());
        assert!(matches!(
            fx.store.last_error(),
            Some(StickyError::Deserialization(_))
        ));
        assert_eq!(fx.store.total_notes(), 0);

        // Degraded still takes the full API.
        fx.store.create_note(NotePatch::content("fresh start")).unwrap();
        assert_eq!(fx.store.total_notes(), 1);
    }

    #[tokio::test]
    async fn unreadable_medium_degrades_with_read_error() {
        let fx = fixture();
        fx.backend.set_simulate_read_error(true);
        let report = fx.store.load_from_storage().await;
        assert_eq!(report.source, LoadSource::Default);
        assert_eq!(fx.store.status(), StoreStatus::Degraded);
        assert!(matches!(fx.store.last_error(), Some(StickyError::Read { .. })));
    }

    #[tokio::test]
    async fn legacy_document_is_migrated_stashed_and_written_back() {
        let backend = Arc::new(MemBackend::new());
        let original = legacy_v1();
        backend.put_raw("doc", original.clone());
        let fx = fixture_on(backend);

        let report = fx.store.load_from_storage().await;
        assert_eq!(report.source, LoadSource::Primary);
        assert_eq!(report.from_version, Some(1));
        assert_eq!(report.version, CURRENT_VERSION);
        assert!(report.migrated);
        assert!(report.is_clean());

        assert_eq!(fx.backend.get_raw("doc-pre-migration"), Some(original.clone()));
        let expected: Value = serde_json::from_slice(&original).unwrap();
        assert_eq!(fx.store.migration_backup(), Some(expected));

        assert_eq!(fx.backend.write_count("doc"), 1);
        let written = JsonCodec::new().decode(&fx.backend.get_raw("doc").unwrap()).unwrap();
        assert_eq!(written.version, CURRENT_VERSION);
        let note = &written.notes[0];
        assert!(note.is_pinned);
        assert_eq!(note.style.background_color, "#ffccbc");
        assert_eq!(written.settings.theme, Theme::Dark);
        assert!(!fx.store.has_unsaved_changes());
    }

    fn failing_migrator() -> Migrator {
        Migrator::new(vec![Migration::new(2, "explode", |_| {
            Err("cannot reshape notes".to_string())
        })])
        .unwrap()
    }

    fn fixture_with_failing_chain(backend: Arc<MemBackend>) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let store = DocumentStore::with_options(
            backend.clone(),
            options(clock.clone()).with_migrator(failing_migrator(), 2),
        );
        Fixture {
            store,
            backend,
            clock,
        }
    }

    #[tokio::test]
    async fn failed_migration_never_writes_primary() {
        let backend = Arc::new(MemBackend::new());
        let original = legacy_v1();
        backend.put_raw("doc", original.clone());
        let fx = fixture_with_failing_chain(backend);

        let report = fx.store.load_from_storage().await;
        assert_eq!(report.from_version, Some(1));
        assert_eq!(fx.store.status(), StoreStatus::Degraded);
        match fx.store.last_error() {
            Some(StickyError::Migration(err)) => assert_eq!(err.version, Some(2)),
            other => panic!("Expected migration error, got {:?}", other),
        }

        assert_eq!(fx.backend.write_count("doc"), 0);
        assert_eq!(fx.backend.get_raw("doc"), Some(original.clone()));
        assert_eq!(fx.backend.get_raw("doc-pre-migration"), Some(original.clone()));
        let expected: Value = serde_json::from_slice(&original).unwrap();
        assert_eq!(fx.store.migration_backup(), Some(expected));
    }

    #[tokio::test]
    async fn salvageable_document_stays_live_after_failed_migration() {
        let mut doc = crate::test_utils::document_with_notes(2);
        doc.version = 1;
        let bytes = JsonCodec::new().encode(&doc).unwrap();
        let backend = Arc::new(MemBackend::new());
        backend.put_raw("doc", bytes);
        let fx = fixture_with_failing_chain(backend);

        let report = fx.store.load_from_storage().await;
        assert_eq!(report.source, LoadSource::Primary);
        assert_eq!(fx.store.status(), StoreStatus::Degraded);
        assert_eq!(fx.store.total_notes(), 2);
        assert_eq!(fx.store.document(), doc);
    }

    #[tokio::test]
    async fn unstashed_failed_migration_protects_primary() {
        let backend = Arc::new(MemBackend::new());
        let original = legacy_v1();
        backend.put_raw("doc", original.clone());
        backend.set_simulate_write_error(Some(WriteFailure::Unavailable));
        let fx = fixture_with_failing_chain(backend);
        fx.store.load_from_storage().await;

        fx.backend.set_simulate_write_error(None);
        fx.store.create_note(NotePatch::content("new")).unwrap();
        assert!(matches!(
            fx.store.save_to_storage().await,
            Err(StickyError::Migration(_))
        ));
        assert_eq!(fx.backend.get_raw("doc"), Some(original));
    }

    #[tokio::test]
    async fn backup_that_fails_migration_is_salvaged() {
        let mut old = crate::test_utils::document_with_notes(2);
        old.version = 1;
        let old_bytes = JsonCodec::new().encode(&old).unwrap();
        let backend = Arc::new(MemBackend::new());
        backend.put_raw("doc", "{ corrupt");
        backend.put_raw("doc-backup", old_bytes.clone());
        let fx = fixture_with_failing_chain(backend);

        let report = fx.store.load_from_storage().await;
        assert_eq!(report.source, LoadSource::Backup);
        assert_eq!(report.from_version, Some(1));
        assert_eq!(report.errors.len(), 2);
        assert!(matches!(report.errors[0], StickyError::Deserialization(_)));
        assert!(matches!(report.errors[1], StickyError::Migration(_)));

        assert_eq!(fx.store.status(), StoreStatus::Degraded);
        assert!(matches!(fx.store.last_error(), Some(StickyError::Migration(_))));
        assert_eq!(fx.store.document(), old);
        let expected: Value = serde_json::from_slice(&old_bytes).unwrap();
        assert_eq!(fx.store.migration_backup(), Some(expected));
        assert_eq!(fx.backend.get_raw("doc-pre-migration"), Some(old_bytes));

        // Saving keeps every note the backup held.
        fx.store.create_note(NotePatch::content("after")).unwrap();
        fx.store.save_to_storage().await.unwrap();
        let backup = JsonCodec::new()
            .decode(&fx.backend.get_raw("doc-backup").unwrap())
            .unwrap();
        assert_eq!(backup.notes.len(), 3);
    }

    #[tokio::test]
    async fn backup_that_migrates_repairs_primary() {
        let backend = Arc::new(MemBackend::new());
        backend.put_raw("doc", "{ corrupt");
        backend.put_raw("doc-backup", legacy_v1());
        let fx = fixture_on(backend);

        let report = fx.store.load_from_storage().await;
        assert_eq!(report.source, LoadSource::Backup);
        assert!(report.migrated);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(fx.store.status(), StoreStatus::Ready);

        assert_eq!(fx.backend.get_raw("doc-pre-migration"), Some(legacy_v1()));
        assert_eq!(fx.backend.write_count("doc"), 1);
        let primary = JsonCodec::new().decode(&fx.backend.get_raw("doc").unwrap()).unwrap();
        assert_eq!(primary.version, CURRENT_VERSION);
        assert_eq!(primary.notes.len(), 1);
        assert!(!fx.store.has_unsaved_changes());
    }

    #[tokio::test]
    async fn migrated_document_is_not_written_until_stashed() {
        let backend = Arc::new(MemBackend::new());
        let original = legacy_v1();
        backend.put_raw("doc", original.clone());
        backend.set_simulate_write_error_for("doc-pre-migration", Some(WriteFailure::QuotaExceeded));
        let fx = fixture_on(backend);

        let report = fx.store.load_from_storage().await;
        assert!(report.migrated);
        match report.errors.as_slice() {
            [StickyError::Write { key, .. }] => assert_eq!(key, "doc-pre-migration"),
            other => panic!("Expected stash write error, got {:?}", other),
        }
        assert_eq!(fx.backend.get_raw("doc"), Some(original.clone()));
        assert_eq!(fx.backend.write_count("doc"), 0);
        assert_eq!(fx.backend.write_count("doc-backup"), 0);
        assert!(fx.store.migration_backup().is_some());
        assert!(fx.store.has_unsaved_changes());

        // Later saves are refused the same way until the stash lands.
        fx.store.create_note(NotePatch::content("new")).unwrap();
        assert!(fx.store.save_to_storage().await.is_err());
        assert_eq!(fx.backend.get_raw("doc"), Some(original.clone()));

        fx.backend.set_simulate_write_error_for("doc-pre-migration", None);
        fx.store.save_to_storage().await.unwrap();
        assert_eq!(fx.backend.get_raw("doc-pre-migration"), Some(original));
        let primary = JsonCodec::new().decode(&fx.backend.get_raw("doc").unwrap()).unwrap();
        assert_eq!(primary.version, CURRENT_VERSION);
        assert_eq!(primary.notes.len(), 2);
        assert_eq!(fx.store.last_error(), None);
    }

    #[tokio::test]
    async fn restore_from_backup_discards_unsaved_edits() {
        let fx = loaded().await;
        let kept = fx.store.create_note(NotePatch::content("saved")).unwrap();
        fx.store.save_to_storage().await.unwrap();
        let dropped = fx.store.create_note(NotePatch::content("unsaved")).unwrap();

        let restored = fx.store.restore_from_backup().await.unwrap();
        assert_eq!(restored.notes.len(), 1);
        assert!(fx.store.get_note_by_id(&kept.id).is_some());
        assert!(fx.store.get_note_by_id(&dropped.id).is_none());
        assert_eq!(fx.store.status(), StoreStatus::Ready);
        assert!(fx.store.has_unsaved_changes());
    }

    #[tokio::test]
    async fn restore_without_backup_is_a_read_error() {
        let fx = loaded().await;
        match fx.store.restore_from_backup().await {
            Err(StickyError::Read { key, .. }) => assert_eq!(key, "doc-backup"),
            other => panic!("Expected read error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dismiss_error_clears_last_error() {
        let fx = fixture();
        fx.backend.set_simulate_read_error(true);
        fx.store.load_from_storage().await;
        assert!(fx.store.last_error().is_some());
        fx.store.dismiss_error();
        assert_eq!(fx.store.last_error(), None);
    }
}
