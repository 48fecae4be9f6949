//! # Auto-Save Scheduler
//!
//! Debounced persistence for a [`DocumentStore`]. Every mutation sends a
//! [`SaveSignal::Touched`] through the store's [`SaveTrigger`]; a single
//! background task collapses each burst into one `save_to_storage()` call
//! once the document has been quiet for `settings.saveInterval`.
//!
//! ```text
//! mutation ─┐  touch(delay)          ┌── deadline reached ──> save
//! mutation ─┼──────────────> [task] ─┤
//! mutation ─┘  (deadline = now+delay) └── flush / shutdown ───> save now
//! ```
//!
//! - The window restarts on every touch; it does not accumulate.
//! - Saves run one at a time. Touches that arrive while a save is running
//!   wait in the channel and arm the next window, so newer data is never
//!   dropped. Explicit `save_to_storage()` calls take the same gate.
//! - Save failures are not retried here. The store records them in
//!   `last_error` and the next mutation arms a fresh window.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::store::backend::StorageBackend;
use crate::store::document_store::DocumentStore;

#[derive(Debug)]
pub(crate) enum SaveSignal {
    /// The document changed; save once it has been quiet for this long.
    Touched(Duration),
    /// Save now if anything is pending, then acknowledge.
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct Slot {
    next_generation: u64,
    attached: Option<(u64, mpsc::UnboundedSender<SaveSignal>)>,
}

/// The store's side of the scheduler. Cheap to clone; a no-op until an
/// [`AutoSaveHandle`] attaches to it.
#[derive(Clone, Default)]
pub(crate) struct SaveTrigger {
    slot: Arc<Mutex<Slot>>,
}

impl SaveTrigger {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attach(&self, sender: mpsc::UnboundedSender<SaveSignal>) -> u64 {
        let mut slot = self.slot();
        slot.next_generation += 1;
        let generation = slot.next_generation;
        slot.attached = Some((generation, sender));
        generation
    }

    /// Only detaches if `generation` is still the attached scheduler.
    fn detach(&self, generation: u64) {
        let mut slot = self.slot();
        if matches!(slot.attached, Some((current, _)) if current == generation) {
            slot.attached = None;
        }
    }

    pub(crate) fn touch(&self, delay: Duration) {
        if let Some((_, sender)) = &self.slot().attached {
            let _ = sender.send(SaveSignal::Touched(delay));
        }
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.slot().attached.is_some()
    }
}

impl<B: StorageBackend + 'static> DocumentStore<B> {
    /// Spawn the debounced saver for this store on the current tokio runtime.
    ///
    /// Starting a second saver replaces the first as the target of new
    /// mutations. Dropping the handle stops the task after it has saved any
    /// pending burst; prefer [`AutoSaveHandle::shutdown`] to wait for that.
    pub fn start_autosave(&self) -> AutoSaveHandle {
        let (sender, receiver) = mpsc::unbounded_channel();
        let trigger = self.trigger().clone();
        let replaced = trigger.is_attached();
        let generation = trigger.attach(sender.clone());
        let task = tokio::spawn(run(self.clone(), receiver));
        debug!(generation, replaced, "auto-save scheduler started");
        AutoSaveHandle {
            sender: Some(sender),
            trigger,
            generation,
            task: Some(task),
        }
    }
}

pub struct AutoSaveHandle {
    sender: Option<mpsc::UnboundedSender<SaveSignal>>,
    trigger: SaveTrigger,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl AutoSaveHandle {
    /// Run any pending save immediately and wait until it has finished.
    pub async fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack, done) = oneshot::channel();
        if sender.send(SaveSignal::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Flush, then stop the scheduler and wait for its task to exit.
    pub async fn shutdown(mut self) {
        self.flush().await;
        self.trigger.detach(self.generation);
        self.sender.take();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!(generation = self.generation, "auto-save scheduler stopped");
    }
}

impl Drop for AutoSaveHandle {
    fn drop(&mut self) {
        self.trigger.detach(self.generation);
    }
}

async fn run<B: StorageBackend + 'static>(
    store: DocumentStore<B>,
    mut signals: mpsc::UnboundedReceiver<SaveSignal>,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        let signal = match deadline {
            Some(at) => tokio::select! {
                signal = signals.recv() => signal,
                _ = tokio::time::sleep_until(at) => {
                    deadline = None;
                    save(&store, "debounce").await;
                    continue;
                }
            },
            None => signals.recv().await,
        };

        match signal {
            Some(SaveSignal::Touched(delay)) => {
                deadline = Some(Instant::now() + delay);
            }
            Some(SaveSignal::Flush(ack)) => {
                if deadline.take().is_some() || store.has_unsaved_changes() {
                    save(&store, "flush").await;
                }
                let _ = ack.send(());
            }
            None => {
                if deadline.take().is_some() {
                    save(&store, "shutdown").await;
                }
                break;
            }
        }
    }
}

async fn save<B: StorageBackend + 'static>(store: &DocumentStore<B>, reason: &'static str) {
    match store.save_to_storage().await {
        Ok(()) => debug!(reason, "auto-save complete"),
        // Already recorded as the store's last_error.
        Err(e) => debug!(reason, error = %e, "auto-save failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SequentialIds};
    use crate::codec::{Codec, JsonCodec};
    use crate::error::{StickyError, WriteFailure};
    use crate::model::{NotePatch, SettingsPatch};
    use crate::store::document_store::StoreOptions;
    use crate::store::mem_backend::MemBackend;
    use crate::store::StorageKeys;

    async fn loaded_store() -> (DocumentStore<MemBackend>, Arc<MemBackend>) {
        let backend = Arc::new(MemBackend::new());
        let options = StoreOptions::default()
            .with_keys(StorageKeys::derive("doc"))
            .with_codec(JsonCodec::new())
            .with_clock(Arc::new(ManualClock::default()))
            .with_ids(Arc::new(SequentialIds::new()));
        let store = DocumentStore::with_options(backend.clone(), options);
        store.load_from_storage().await;
        (store, backend)
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_mutations_collapses_to_one_write() {
        let (store, backend) = loaded_store().await;
        let _autosave = store.start_autosave();

        for i in 0..10 {
            store.create_note(NotePatch::content(format!("note {}", i))).unwrap();
        }
        tokio::time::sleep(ms(499)).await;
        assert_eq!(backend.write_count("doc"), 0);

        tokio::time::sleep(ms(100)).await;
        assert_eq!(backend.write_count("doc"), 1);
        assert_eq!(backend.write_count("doc-backup"), 1);
        assert!(!store.has_unsaved_changes());

        let saved = JsonCodec::new().decode(&backend.get_raw("doc").unwrap()).unwrap();
        assert_eq!(saved.notes.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_restarts_the_window() {
        let (store, backend) = loaded_store().await;
        let _autosave = store.start_autosave();

        store.create_note(NotePatch::content("first")).unwrap();
        tokio::time::sleep(ms(300)).await;
        store.create_note(NotePatch::content("second")).unwrap();
        tokio::time::sleep(ms(300)).await;
        assert_eq!(backend.write_count("doc"), 0);

        tokio::time::sleep(ms(250)).await;
        assert_eq!(backend.write_count("doc"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_follows_save_interval_setting() {
        let (store, backend) = loaded_store().await;
        let _autosave = store.start_autosave();

        store
            .update_settings(&SettingsPatch {
                save_interval: Some(2_000),
                ..Default::default()
            })
            .unwrap();
        store.create_note(NotePatch::content("slow")).unwrap();

        tokio::time::sleep(ms(1_500)).await;
        assert_eq!(backend.write_count("doc"), 0);
        tokio::time::sleep(ms(600)).await;
        assert_eq!(backend.write_count("doc"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_auto_save_never_arms() {
        let (store, backend) = loaded_store().await;
        let _autosave = store.start_autosave();

        store
            .update_settings(&SettingsPatch {
                auto_save: Some(false),
                ..Default::default()
            })
            .unwrap();
        store.create_note(NotePatch::content("manual only")).unwrap();

        tokio::time::sleep(ms(5_000)).await;
        assert_eq!(backend.write_count("doc"), 0);
        assert!(store.has_unsaved_changes());

        store.save_to_storage().await.unwrap();
        assert_eq!(backend.write_count("doc"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn later_burst_gets_its_own_save() {
        let (store, backend) = loaded_store().await;
        let _autosave = store.start_autosave();

        store.create_note(NotePatch::content("one")).unwrap();
        tokio::time::sleep(ms(600)).await;
        store.create_note(NotePatch::content("two")).unwrap();
        tokio::time::sleep(ms(600)).await;

        assert_eq!(backend.write_count("doc"), 2);
        let saved = JsonCodec::new().decode(&backend.get_raw("doc").unwrap()).unwrap();
        assert_eq!(saved.notes.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_saves_pending_burst_without_waiting() {
        let (store, backend) = loaded_store().await;
        let autosave = store.start_autosave();

        store.create_note(NotePatch::content("urgent")).unwrap();
        autosave.flush().await;
        assert_eq!(backend.write_count("doc"), 1);

        // The flushed window must not fire a second save later.
        tokio::time::sleep(ms(1_000)).await;
        assert_eq!(backend.write_count("doc"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_with_nothing_pending_does_not_write() {
        let (store, backend) = loaded_store().await;
        let autosave = store.start_autosave();
        autosave.flush().await;
        assert_eq!(backend.write_count("doc"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_persists_pending_changes() {
        let (store, backend) = loaded_store().await;
        let autosave = store.start_autosave();

        store.create_note(NotePatch::content("last words")).unwrap();
        autosave.shutdown().await;
        assert_eq!(backend.write_count("doc"), 1);
        assert!(!store.trigger().is_attached());

        // Nothing listens any more.
        store.create_note(NotePatch::content("unsaved")).unwrap();
        tokio::time::sleep(ms(1_000)).await;
        assert_eq!(backend.write_count("doc"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_is_retried_by_next_mutation() {
        let (store, backend) = loaded_store().await;
        let _autosave = store.start_autosave();

        backend.set_simulate_write_error(Some(WriteFailure::QuotaExceeded));
        store.create_note(NotePatch::content("kept in memory")).unwrap();
        tokio::time::sleep(ms(600)).await;
        assert!(matches!(store.last_error(), Some(StickyError::Write { .. })));
        assert_eq!(store.total_notes(), 1);

        backend.set_simulate_write_error(None);
        store.create_note(NotePatch::content("retry")).unwrap();
        tokio::time::sleep(ms(600)).await;
        assert_eq!(store.last_error(), None);

        let saved = JsonCodec::new().decode(&backend.get_raw("doc").unwrap()).unwrap();
        assert_eq!(saved.notes.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn restarted_scheduler_replaces_previous() {
        let (store, backend) = loaded_store().await;
        let first = store.start_autosave();
        let second = store.start_autosave();
        drop(first);
        assert!(store.trigger().is_attached());

        store.create_note(NotePatch::content("still saved")).unwrap();
        tokio::time::sleep(ms(600)).await;
        assert_eq!(backend.write_count("doc"), 1);
        second.shutdown().await;
    }
}
