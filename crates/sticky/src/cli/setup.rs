use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stickyapp::model::{Position, Size, Theme};

#[derive(Parser, Debug)]
#[command(name = "sticky", bin_name = "sticky", version, disable_help_subcommand = true)]
#[command(about = "Sticky notes from the terminal", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Data directory (default: $STICKY_DATA_DIR or the OS data directory)
    #[arg(long, global = true, value_name = "DIR", help_heading = "Options")]
    pub data_dir: Option<PathBuf>,

    /// Print JSON instead of formatted text
    #[arg(long, global = true, help_heading = "Options")]
    pub json: bool,

    /// Verbose output (debug logs on stderr)
    #[arg(short, long, global = true, help_heading = "Options")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// List notes, pinned first
    #[command(alias = "ls", display_order = 1)]
    List,

    /// Show a note in full
    #[command(alias = "v", display_order = 2)]
    Show {
        /// List position or id prefix
        note: String,
    },

    /// Create a note
    #[command(alias = "new", display_order = 3)]
    Add {
        content: String,

        #[arg(long, short)]
        title: Option<String>,

        /// Position as X,Y
        #[arg(long, value_parser = parse_position)]
        at: Option<Position>,

        /// Size as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_size)]
        size: Option<Size>,

        /// Pin the new note
        #[arg(long)]
        pin: bool,
    },

    /// Change fields of a note; fields not given are left alone
    #[command(alias = "e", display_order = 4)]
    Edit {
        note: String,

        #[arg(long, short)]
        content: Option<String>,

        #[arg(long, short)]
        title: Option<String>,

        #[arg(long, value_parser = parse_position)]
        at: Option<Position>,

        #[arg(long, value_parser = parse_size)]
        size: Option<Size>,
    },

    /// Toggle a note's pin
    #[command(alias = "p", display_order = 5)]
    Pin { note: String },

    /// Delete a note
    #[command(alias = "delete", display_order = 6)]
    Rm { note: String },

    /// Show or change app settings
    #[command(display_order = 10)]
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },

    /// Storage health: load outcome, last save, last error
    #[command(display_order = 11)]
    Status,

    /// Replace the document with the last backup generation
    #[command(display_order = 12)]
    RestoreBackup,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum SettingsAction {
    Show,

    Set {
        /// light, dark or auto
        #[arg(long, value_parser = parse_theme)]
        theme: Option<Theme>,

        #[arg(long)]
        auto_save: Option<bool>,

        /// Auto-save debounce in milliseconds
        #[arg(long)]
        save_interval: Option<u64>,

        /// Default size for new notes, WIDTHxHEIGHT
        #[arg(long, value_parser = parse_size)]
        note_size: Option<Size>,

        /// Default position for new notes, X,Y
        #[arg(long, value_parser = parse_position)]
        note_position: Option<Position>,
    },
}

fn parse_pair(s: &str, sep: char, what: &str) -> Result<(i32, i32), String> {
    let (a, b) = s
        .split_once(sep)
        .ok_or_else(|| format!("expected {} as A{}B", what, sep))?;
    let a = a.trim().parse().map_err(|_| format!("invalid {}: {}", what, s))?;
    let b = b.trim().parse().map_err(|_| format!("invalid {}: {}", what, s))?;
    Ok((a, b))
}

fn parse_position(s: &str) -> Result<Position, String> {
    parse_pair(s, ',', "position").map(|(x, y)| Position::new(x, y))
}

fn parse_size(s: &str) -> Result<Size, String> {
    parse_pair(&s.to_ascii_lowercase(), 'x', "size").map(|(w, h)| Size::new(w, h))
}

fn parse_theme(s: &str) -> Result<Theme, String> {
    s.parse::<Theme>().map_err(|e| e.to_string())
}
