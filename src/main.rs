//! Draftsmith - a command-line front end for the document engine.
//!
//! # Usage
//!
//! ```bash
//! draftsmith type "Hello"
//! draftsmith open README.md
//! draftsmith --state-dir ./state show
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use draftsmith::app::{Args, Controller, File, FileStorage, Model, SystemClock};
use draftsmith::collab::LocalHub;
use draftsmith::config::{
    ConfigFlags, ConfigPatch, ThemeMode, clear_config_flags, global_config_path, load_config_flags,
    local_override_path, parse_flag_tokens, save_config_flags,
};
use draftsmith::markdown;
use draftsmith::perf;
use draftsmith::state::input::{InputEvent, PasteEvent};
use draftsmith::state::Selection;

/// Edit a persisted draftsmith session from the command line
#[derive(Parser, Debug)]
#[command(name = "draftsmith", version, about, long_about = None)]
struct Cli {
    /// Directory holding the persisted session
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Start fresh documents in markdown source mode
    #[arg(long)]
    markdown: bool,

    /// Enable typewriter scrolling
    #[arg(long)]
    typewriter: bool,

    /// Editor theme
    #[arg(long, value_enum)]
    theme: Option<ThemeMode>,

    /// Editor font size
    #[arg(long, value_name = "PX")]
    font_size: Option<u32>,

    /// Print timing for parse, serialize, and save
    #[arg(long)]
    perf: bool,

    /// Write detailed debug events to a file
    #[arg(long, value_name = "PATH")]
    debug_log: Option<PathBuf>,

    /// Save current command-line flags as defaults in .draftsmithrc
    #[arg(long)]
    save: bool,

    /// Clear saved defaults in .draftsmithrc
    #[arg(long)]
    clear: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current document
    Show {
        /// Print the serialized editor state instead of markdown
        #[arg(long)]
        json: bool,
    },
    /// Insert text at the end of the document
    Type {
        /// Text to insert; multi-line text is pasted as markdown
        text: String,
    },
    /// Set the current document aside and start an empty one
    New,
    /// Rotate to the previous file, or clear the document
    Discard,
    /// Switch between rich text and markdown source
    ToggleMarkdown,
    /// Open a markdown file from disk
    Open {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// List the documents set aside
    Files,
    /// Reset the session, dropping stored state that fails to load
    Clean,
}

fn default_state_dir() -> PathBuf {
    global_config_path()
        .parent()
        .map_or_else(|| PathBuf::from("state"), |dir| dir.join("state"))
}

fn describe(file: &File) -> String {
    if let Some(path) = &file.path {
        return path.clone();
    }
    let preview = file
        .text
        .as_ref()
        .and_then(|text| text.pointer("/doc/content/0/content/0/text"))
        .and_then(serde_json::Value::as_str)
        .or(file.body.as_deref().and_then(|body| body.lines().next()))
        .unwrap_or("(empty)");
    preview.chars().take(60).collect()
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string())
}

fn document_text(model: &Model) -> String {
    let Some(state) = model.editor_state() else {
        return String::new();
    };
    if model.markdown {
        markdown::source_text(state.doc())
    } else {
        markdown::serialize(state.doc())
    }
}

fn type_text(ctrl: &mut Controller, text: &str) -> Result<()> {
    let Some(state) = ctrl.state() else {
        anyhow::bail!("document is not loaded");
    };
    let mut tr = state.tr();
    tr.set_selection(Selection::at_end(state.doc()));
    ctrl.apply(tr);

    let event = if text.contains('\n') {
        InputEvent::Paste(PasteEvent {
            text: Some(text.to_string()),
            ..PasteEvent::default()
        })
    } else {
        InputEvent::Text(text.to_string())
    };
    if !ctrl.handle_input(&event) {
        anyhow::bail!("text was not accepted by the editor");
    }
    Ok(())
}

fn open_file(ctrl: &mut Controller, path: &Path) -> Result<()> {
    let body = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let modified = std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    ctrl.open_file(File {
        body: Some(body),
        path: Some(path.display().to_string()),
        last_modified: modified,
        ..File::default()
    });
    Ok(())
}

fn run(ctrl: &mut Controller, command: Command) -> Result<()> {
    match command {
        Command::Show { json } => {
            if json {
                let text = ctrl.model().text_json().unwrap_or_default();
                println!("{}", serde_json::to_string_pretty(&text)?);
            } else {
                print!("{}", document_text(ctrl.model()));
            }
        }
        Command::Type { text } => type_text(ctrl, &text)?,
        Command::New => ctrl.new_file(),
        Command::Discard => ctrl.discard(),
        Command::ToggleMarkdown => ctrl.toggle_markdown(),
        Command::Open { file } => open_file(ctrl, &file)?,
        Command::Files => {
            for (index, file) in ctrl.model().files.iter().enumerate() {
                let mode = if file.markdown { "md" } else { "rich" };
                println!(
                    "{index:>3}  {:<16}  {mode:<4}  {}",
                    format_time(file.last_modified),
                    describe(file)
                );
            }
        }
        Command::Clean => {
            ctrl.clean().context("Failed to reset state")?;
            return Ok(());
        }
    }
    if ctrl.model().error.is_none() {
        ctrl.save().context("Failed to save state")?;
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let raw_args = std::env::args().collect::<Vec<_>>();
    let cli = Cli::parse();
    let global_path = global_config_path();
    let local_path = local_override_path();
    let cli_flags = parse_flag_tokens(&raw_args);

    if cli.clear {
        clear_config_flags(&global_path)?;
    }
    if cli.save {
        save_config_flags(&global_path, &cli_flags)?;
    }

    let file_flags = if cli.clear {
        ConfigFlags::default()
    } else {
        let global_flags = load_config_flags(&global_path)?;
        let local_flags = load_config_flags(&local_path)?;
        global_flags.union(&local_flags)
    };
    let effective = file_flags.union(&cli_flags);

    perf::set_enabled(effective.perf);
    let debug_log_path = effective
        .debug_log
        .clone()
        .or_else(|| std::env::var_os("DRAFTSMITH_DEBUG_LOG").map(PathBuf::from));
    if let Err(err) = perf::set_debug_log_path(debug_log_path.as_deref()) {
        eprintln!(
            "[warn] Failed to initialize debug log {}: {}",
            debug_log_path
                .as_ref()
                .map_or_else(|| "<unset>".to_string(), |p| p.display().to_string()),
            err
        );
    }

    let state_dir = effective.state_dir.clone().unwrap_or_else(default_state_dir);
    let mut ctrl = Controller::new(FileStorage::new(&state_dir), LocalHub::new(), SystemClock);
    ctrl.init(Args::default());

    if let Some(err) = &ctrl.model().error {
        eprintln!("[warn] Stored state in {} could not be loaded: {err}", state_dir.display());
        if let Some(props) = &err.props {
            eprintln!("{props}");
        }
        eprintln!("Run `draftsmith clean` to start over.");
    }

    let patch = effective.patch();
    if patch != ConfigPatch::default() {
        if let Err(err) = ctrl.update_config(patch) {
            eprintln!("[warn] Ignoring configuration flags: {err}");
        }
    }
    let fresh = ctrl.model().is_empty() && ctrl.model().files.is_empty();
    if effective.markdown && fresh && !ctrl.model().markdown {
        ctrl.toggle_markdown();
    }

    let command = cli.command.unwrap_or(Command::Show { json: false });
    let result = run(&mut ctrl, command);
    ctrl.close();
    perf::report();
    result
}
