use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(clap::ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Auto,
    Light,
    Dark,
}

impl ThemeMode {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

/// Formatting options applied to code blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrettierOptions {
    pub print_width: u32,
    pub tab_width: u32,
    pub use_tabs: bool,
    pub semi: bool,
    pub single_quote: bool,
}

impl Default for PrettierOptions {
    fn default() -> Self {
        Self {
            print_width: 80,
            tab_width: 2,
            use_tabs: false,
            semi: false,
            single_quote: true,
        }
    }
}

impl PrettierOptions {
    /// One level of indentation.
    pub fn indent(&self) -> String {
        if self.use_tabs {
            "\t".to_string()
        } else {
            " ".repeat(self.tab_width as usize)
        }
    }
}

/// Editor settings persisted with the controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub theme: ThemeMode,
    pub font: Option<String>,
    pub font_size: u32,
    pub content_width: u32,
    pub typewriter_mode: bool,
    pub prettier: PrettierOptions,
    /// Signaling endpoints handed to the collaboration provider.
    pub signaling: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: ThemeMode::Auto,
            font: None,
            font_size: 14,
            content_width: 600,
            typewriter_mode: false,
            prettier: PrettierOptions::default(),
            signaling: vec!["wss://signaling.draftsmith.dev".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("font size must be between 8 and 72, got {0}")]
    FontSize(u32),
    #[error("content width must be at least 200, got {0}")]
    ContentWidth(u32),
    #[error("tab width must be between 1 and 16, got {0}")]
    TabWidth(u32),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(8..=72).contains(&self.font_size) {
            return Err(ConfigError::FontSize(self.font_size));
        }
        if self.content_width < 200 {
            return Err(ConfigError::ContentWidth(self.content_width));
        }
        if !(1..=16).contains(&self.prettier.tab_width) {
            return Err(ConfigError::TabWidth(self.prettier.tab_width));
        }
        Ok(())
    }

    /// Shallow merge: every field set in `patch` replaces ours.
    #[must_use]
    pub fn merge(&self, patch: &ConfigPatch) -> Self {
        Self {
            theme: patch.theme.unwrap_or(self.theme),
            font: patch.font.clone().or_else(|| self.font.clone()),
            font_size: patch.font_size.unwrap_or(self.font_size),
            content_width: patch.content_width.unwrap_or(self.content_width),
            typewriter_mode: patch.typewriter_mode.unwrap_or(self.typewriter_mode),
            prettier: patch.prettier.clone().unwrap_or_else(|| self.prettier.clone()),
            signaling: patch.signaling.clone().unwrap_or_else(|| self.signaling.clone()),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub theme: Option<ThemeMode>,
    pub font: Option<String>,
    pub font_size: Option<u32>,
    pub content_width: Option<u32>,
    pub typewriter_mode: Option<bool>,
    pub prettier: Option<PrettierOptions>,
    pub signaling: Option<Vec<String>>,
}

/// Defaults read from flag-token config files.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigFlags {
    pub markdown: bool,
    pub typewriter: bool,
    pub perf: bool,
    pub theme: Option<ThemeMode>,
    pub font_size: Option<u32>,
    pub state_dir: Option<PathBuf>,
    pub debug_log: Option<PathBuf>,
}

impl ConfigFlags {
    pub fn union(&self, other: &Self) -> Self {
        Self {
            markdown: self.markdown || other.markdown,
            typewriter: self.typewriter || other.typewriter,
            perf: self.perf || other.perf,
            theme: other.theme.or(self.theme),
            font_size: other.font_size.or(self.font_size),
            state_dir: other.state_dir.clone().or_else(|| self.state_dir.clone()),
            debug_log: other.debug_log.clone().or_else(|| self.debug_log.clone()),
        }
    }

    /// The editor settings these flags override.
    pub fn patch(&self) -> ConfigPatch {
        ConfigPatch {
            theme: self.theme,
            font_size: self.font_size,
            typewriter_mode: self.typewriter.then_some(true),
            ..ConfigPatch::default()
        }
    }
}

pub fn global_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("draftsmith").join("config");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("draftsmith")
                .join("config");
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("draftsmith").join("config");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config").join("draftsmith").join("config");
        }
    }

    PathBuf::from(".draftsmithrc")
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(".draftsmithrc")
}

pub fn load_config_flags(path: &Path) -> Result<ConfigFlags> {
    if !path.exists() {
        return Ok(ConfigFlags::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let tokens = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split_whitespace().map(ToOwned::to_owned))
        .collect::<Vec<_>>();
    Ok(parse_flag_tokens(&tokens))
}

pub fn save_config_flags(path: &Path, flags: &ConfigFlags) -> Result<()> {
    let mut lines = Vec::new();
    lines.push("# draftsmith defaults (saved with --save)".to_string());
    if flags.markdown {
        lines.push("--markdown".to_string());
    }
    if flags.typewriter {
        lines.push("--typewriter".to_string());
    }
    if let Some(theme) = flags.theme {
        lines.push(format!("--theme {}", theme.name()));
    }
    if let Some(size) = flags.font_size {
        lines.push(format!("--font-size {size}"));
    }
    if flags.perf {
        lines.push("--perf".to_string());
    }
    if let Some(dir) = &flags.state_dir {
        lines.push(format!("--state-dir {}", dir.display()));
    }
    if let Some(path) = &flags.debug_log {
        lines.push(format!("--debug-log {}", path.display()));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    fs::write(path, format!("{}\n", lines.join("\n")))
        .with_context(|| format!("Failed to write config {}", path.display()))
}

pub fn clear_config_flags(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

pub fn parse_flag_tokens(tokens: &[String]) -> ConfigFlags {
    let mut flags = ConfigFlags::default();
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if token == "--markdown" {
            flags.markdown = true;
        } else if token == "--typewriter" {
            flags.typewriter = true;
        } else if token == "--perf" {
            flags.perf = true;
        } else if token == "--theme" {
            if let Some(next) = tokens.get(i + 1) {
                flags.theme = parse_theme(next);
                i += 1;
            }
        } else if let Some(value) = token.strip_prefix("--theme=") {
            flags.theme = parse_theme(value);
        } else if token == "--font-size" {
            if let Some(next) = tokens.get(i + 1) {
                flags.font_size = next.parse().ok();
                i += 1;
            }
        } else if let Some(value) = token.strip_prefix("--font-size=") {
            flags.font_size = value.parse().ok();
        } else if token == "--state-dir" {
            if let Some(next) = tokens.get(i + 1) {
                flags.state_dir = Some(PathBuf::from(next));
                i += 1;
            }
        } else if let Some(value) = token.strip_prefix("--state-dir=") {
            flags.state_dir = Some(PathBuf::from(value));
        } else if token == "--debug-log" {
            if let Some(next) = tokens.get(i + 1) {
                flags.debug_log = Some(PathBuf::from(next));
                i += 1;
            }
        } else if let Some(value) = token.strip_prefix("--debug-log=") {
            flags.debug_log = Some(PathBuf::from(value));
        }
        i += 1;
    }
    flags
}

fn parse_theme(s: &str) -> Option<ThemeMode> {
    match s {
        "auto" => Some(ThemeMode::Auto),
        "light" => Some(ThemeMode::Light),
        "dark" => Some(ThemeMode::Dark),
        _ => None,
    }
}
