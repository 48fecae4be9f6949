//! # Rendering
//!
//! Formatting is split from printing: `format_*` functions build strings (and
//! are what the tests exercise), `print_*` wrappers write them out.
//!
//! ## List Layout
//!
//! ```text
//!  ⚲ 1. Errands: groceries, stamps            8f3a2c1b   3 minutes ago
//!    2. call the plumber                      0c9e77d4      1 hour ago
//! ```
//!
//! - pin marker (2 cols), list position (4 cols)
//! - title + content preview, truncated to fit
//! - short id (8 cols), relative update time (right aligned)

use chrono::{DateTime, Utc};
use colored::Colorize;
use stickyapp::model::{AppSettings, Note};
use stickyapp::{LoadReport, LoadSource, StickyError};
use timeago::Formatter;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const LINE_WIDTH: usize = 88;
const TIME_WIDTH: usize = 16;
const ID_WIDTH: usize = 10;
const PIN_MARKER: &str = "⚲";

pub fn format_notes(notes: &[Note], now: DateTime<Utc>) -> String {
    if notes.is_empty() {
        return "No notes yet. Create one with `sticky add <text>`.".to_string();
    }

    let mut out = Vec::with_capacity(notes.len());
    let mut last_was_pinned = false;
    for (i, note) in notes.iter().enumerate() {
        if last_was_pinned && !note.is_pinned {
            out.push(String::new());
        }
        last_was_pinned = note.is_pinned;

        let marker = if note.is_pinned {
            format!("{} ", PIN_MARKER)
        } else {
            "  ".to_string()
        };
        let index = format!("{:>2}. ", i + 1);
        let short_id: String = note.id.as_str().chars().take(8).collect();
        let id_col = format!("{:<width$}", short_id, width = ID_WIDTH);
        let time = format_time_ago(note.updated_at, now);

        let fixed = marker.width() + index.width() + ID_WIDTH + TIME_WIDTH;
        let available = LINE_WIDTH.saturating_sub(fixed);
        let summary = truncate_to_width(&summary_line(note), available);
        let padding = available.saturating_sub(summary.width());

        let index = if note.is_pinned {
            index.yellow()
        } else {
            index.normal()
        };
        out.push(format!(
            "{}{}{}{}{}{}",
            marker.yellow(),
            index,
            summary,
            " ".repeat(padding),
            id_col.dimmed(),
            time.dimmed()
        ));
    }
    out.join("\n")
}

fn summary_line(note: &Note) -> String {
    let preview: String = note
        .content
        .chars()
        .take(60)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();
    match note.title.as_deref() {
        Some(title) if !title.is_empty() && !preview.is_empty() => {
            format!("{}: {}", title, preview)
        }
        Some(title) if !title.is_empty() => title.to_string(),
        _ => preview,
    }
}

pub fn format_note(note: &Note) -> String {
    let mut lines = Vec::new();
    let title = note.title.as_deref().unwrap_or("(untitled)");
    let pin = if note.is_pinned {
        format!(" {}", PIN_MARKER.yellow())
    } else {
        String::new()
    };
    lines.push(format!("{}{}", title.bold(), pin));
    lines.push(format!("{}", note.id.as_str().dimmed()));
    lines.push("--------------------------------".to_string());
    lines.push(note.content.clone());
    lines.push("--------------------------------".to_string());
    lines.push(format!(
        "at {},{}  size {}x{}  color {}",
        note.position.x,
        note.position.y,
        note.size.width,
        note.size.height,
        note.style.background_color
    ));
    lines.push(format!(
        "created {}  updated {}",
        note.created_at.format("%Y-%m-%d %H:%M"),
        note.updated_at.format("%Y-%m-%d %H:%M")
    ));
    lines.join("\n")
}

pub fn format_settings(settings: &AppSettings) -> String {
    let theme = serde_json::to_value(settings.theme)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    [
        format!("theme                  {}", theme),
        format!("auto save              {}", settings.auto_save),
        format!("save interval          {} ms", settings.save_interval),
        format!(
            "default note size      {}x{}",
            settings.default_note_size.width, settings.default_note_size.height
        ),
        format!(
            "default note position  {},{}",
            settings.default_note_position.x, settings.default_note_position.y
        ),
    ]
    .join("\n")
}

/// Warnings worth showing after a load. Empty for a clean load.
pub fn format_load_warnings(report: &LoadReport) -> Vec<String> {
    let mut lines = Vec::new();
    match report.source {
        LoadSource::Backup => {
            lines.push("Primary document was unreadable; restored from backup.".to_string())
        }
        LoadSource::Default if !report.errors.is_empty() => lines.push(
            "No readable document or backup; starting with an empty board.".to_string(),
        ),
        _ => {}
    }
    if report.migrated {
        lines.push(format!(
            "Upgraded document from v{} to v{}.",
            report.from_version.unwrap_or(1),
            report.version
        ));
    }
    for error in &report.errors {
        if let StickyError::Migration(err) = error {
            lines.push(format!(
                "Document could not be upgraded ({}); the original was kept.",
                err
            ));
        }
    }
    lines
}

pub fn print_load_warnings(report: &LoadReport) {
    for line in format_load_warnings(report) {
        eprintln!("{}", line.yellow());
    }
}

pub fn print_success(message: &str) {
    println!("{}", message.green());
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_lines(text: &str) {
    println!("{}", text);
}

fn truncate_to_width(s: &str, max_width: usize) -> String {
    if s.width() <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut current_width = 0;
    for c in s.chars() {
        let char_width = c.width().unwrap_or(0);
        if current_width + char_width > max_width.saturating_sub(1) {
            result.push('…');
            return result;
        }
        result.push(c);
        current_width += char_width;
    }
    result
}

pub fn format_time_ago(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(timestamp);
    let formatter = Formatter::new();
    let time_str = formatter.convert(duration.to_std().unwrap_or_default());
    format!("{:>width$}", time_str, width = TIME_WIDTH)
}
