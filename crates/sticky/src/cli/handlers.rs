use anyhow::{bail, Context};
use chrono::Utc;
use serde_json::json;
use stickyapp::init::{self, StickyContext};
use stickyapp::model::{Note, NoteId, NotePatch, SettingsPatch};
use stickyapp::store::backend::StorageBackend;
use stickyapp::store::fs_backend::FsBackend;
use stickyapp::{DocumentStore, LoadReport, StickyError};

use super::render;
use super::setup::{Cli, Commands, SettingsAction};

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let ctx = init::initialize(cli.data_dir.clone()).context("could not set up the store")?;
    let report = ctx.store.load_from_storage().await;
    if !cli.json {
        render::print_load_warnings(&report);
    }

    let json = cli.json;
    match cli.command.unwrap_or(Commands::List) {
        Commands::List => list(&ctx.store, json),
        Commands::Show { note } => show(&ctx.store, &note, json),
        Commands::Status => status(&ctx, &report, json),
        Commands::Settings { action } => match action.unwrap_or(SettingsAction::Show) {
            SettingsAction::Show => show_settings(&ctx.store, json),
            SettingsAction::Set {
                theme,
                auto_save,
                save_interval,
                note_size,
                note_position,
            } => {
                let patch = SettingsPatch {
                    theme,
                    default_note_size: note_size,
                    default_note_position: note_position,
                    auto_save,
                    save_interval,
                };
                mutating(&ctx.store, |store| {
                    let settings = store.update_settings(&patch)?;
                    if json {
                        render::print_json(&settings)?;
                    } else {
                        render::print_success("Settings updated.");
                        render::print_lines(&render::format_settings(&settings));
                    }
                    Ok(())
                })
                .await
            }
        },
        Commands::Add {
            content,
            title,
            at,
            size,
            pin,
        } => {
            let patch = NotePatch {
                title,
                content: Some(content),
                position: at,
                size,
                style: None,
                is_pinned: pin.then_some(true),
            };
            mutating(&ctx.store, |store| {
                let note = store.create_note(patch)?;
                report_note("Created", &note, json)
            })
            .await
        }
        Commands::Edit {
            note,
            content,
            title,
            at,
            size,
        } => {
            let patch = NotePatch {
                title,
                content,
                position: at,
                size,
                style: None,
                is_pinned: None,
            };
            if patch.is_empty() {
                bail!("nothing to change; pass --content, --title, --at or --size");
            }
            mutating(&ctx.store, |store| {
                let id = resolve(store, &note)?;
                let note = store.update_note(&id, patch)?;
                report_note("Updated", &note, json)
            })
            .await
        }
        Commands::Pin { note } => {
            mutating(&ctx.store, |store| {
                let id = resolve(store, &note)?;
                let pinned = store.toggle_pin(&id)?;
                if json {
                    render::print_json(&json!({ "id": id, "isPinned": pinned }))
                } else {
                    let verb = if pinned { "Pinned" } else { "Unpinned" };
                    render::print_success(&format!("{} {}", verb, id));
                    Ok(())
                }
            })
            .await
        }
        Commands::Rm { note } => {
            mutating(&ctx.store, |store| {
                let id = resolve(store, &note)?;
                let removed = store.delete_note(&id)?;
                report_note("Deleted", &removed, json)
            })
            .await
        }
        Commands::RestoreBackup => {
            let autosave = ctx.store.start_autosave();
            let restored = ctx.store.restore_from_backup().await;
            autosave.shutdown().await;
            let document = restored?;
            ensure_saved(&ctx.store)?;
            if json {
                render::print_json(&document)
            } else {
                render::print_success(&format!(
                    "Restored {} notes from backup.",
                    document.notes.len()
                ));
                Ok(())
            }
        }
    }
}

/// Run a mutation with the auto-saver attached, then flush it before
/// returning so the change is on disk when the process exits.
async fn mutating<F>(store: &DocumentStore<FsBackend>, op: F) -> anyhow::Result<()>
where
    F: FnOnce(&DocumentStore<FsBackend>) -> anyhow::Result<()>,
{
    let autosave = store.start_autosave();
    let result = op(store);
    autosave.shutdown().await;
    result?;
    ensure_saved(store)
}

fn ensure_saved<B: StorageBackend + 'static>(store: &DocumentStore<B>) -> anyhow::Result<()> {
    if store.has_unsaved_changes() {
        match store.last_error() {
            Some(err) => bail!("change kept in memory but not saved: {}", err),
            None => bail!("change kept in memory but not saved"),
        }
    }
    Ok(())
}

fn report_note(verb: &str, note: &Note, json: bool) -> anyhow::Result<()> {
    if json {
        return render::print_json(note);
    }
    render::print_success(&format!("{} {}", verb, note.id));
    Ok(())
}

/// A list position (1-based, as printed by `list`), an exact id, or a
/// unique id prefix.
fn resolve<B: StorageBackend + 'static>(store: &DocumentStore<B>, selector: &str) -> anyhow::Result<NoteId> {
    let notes = store.sorted_notes();
    if let Ok(position) = selector.parse::<usize>() {
        if (1..=notes.len()).contains(&position) {
            return Ok(notes[position - 1].id.clone());
        }
    }
    if let Some(exact) = notes.iter().find(|n| n.id.as_str() == selector) {
        return Ok(exact.id.clone());
    }
    let matches: Vec<&Note> = notes
        .iter()
        .filter(|n| n.id.as_str().starts_with(selector))
        .collect();
    match matches.as_slice() {
        [one] => Ok(one.id.clone()),
        [] => Err(StickyError::NoteNotFound(NoteId::from(selector)).into()),
        many => bail!("'{}' matches {} notes; use more of the id", selector, many.len()),
    }
}

fn list<B: StorageBackend + 'static>(store: &DocumentStore<B>, json: bool) -> anyhow::Result<()> {
    let notes = store.sorted_notes();
    if json {
        return render::print_json(&notes);
    }
    render::print_lines(&render::format_notes(&notes, Utc::now()));
    Ok(())
}

fn show<B: StorageBackend + 'static>(store: &DocumentStore<B>, selector: &str, json: bool) -> anyhow::Result<()> {
    let id = resolve(store, selector)?;
    let note = store
        .get_note_by_id(&id)
        .ok_or_else(|| StickyError::NoteNotFound(id.clone()))?;
    if json {
        return render::print_json(&note);
    }
    render::print_lines(&render::format_note(&note));
    Ok(())
}

fn show_settings<B: StorageBackend + 'static>(store: &DocumentStore<B>, json: bool) -> anyhow::Result<()> {
    let settings = store.settings();
    if json {
        return render::print_json(&settings);
    }
    render::print_lines(&render::format_settings(&settings));
    Ok(())
}

fn status(ctx: &StickyContext, report: &LoadReport, json: bool) -> anyhow::Result<()> {
    let store = &ctx.store;
    let keys = store.keys();
    let backup_present = store
        .backend()
        .read(&keys.backup)
        .map(|bytes| bytes.is_some())
        .unwrap_or(false);
    let last_error = store.last_error().map(|e| e.to_string());
    let last_saved = store.last_saved();
    let status = format!("{:?}", store.status()).to_lowercase();
    let source = format!("{:?}", report.source).to_lowercase();

    if json {
        return render::print_json(&json!({
            "dataDir": ctx.data_dir,
            "documentKey": keys.primary,
            "codec": store.codec_name(),
            "status": status,
            "loadSource": source,
            "version": report.version,
            "migrated": report.migrated,
            "totalNotes": store.total_notes(),
            "pinnedCount": store.pinned_count(),
            "backup": backup_present,
            "lastSaved": last_saved.map(|t| t.timestamp_millis()),
            "lastError": last_error,
        }));
    }

    let lines = [
        format!("data dir     {}", ctx.data_dir.display()),
        format!("document     {} ({})", keys.primary, store.codec_name()),
        format!("status       {} (loaded from {})", status, source),
        format!("version      v{}", report.version),
        format!(
            "notes        {} ({} pinned)",
            store.total_notes(),
            store.pinned_count()
        ),
        format!(
            "backup       {}",
            if backup_present { "present" } else { "none" }
        ),
        format!(
            "last error   {}",
            last_error.unwrap_or_else(|| "none".to_string())
        ),
    ];
    render::print_lines(&lines.join("\n"));
    Ok(())
}
