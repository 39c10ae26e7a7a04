use std::path::PathBuf;

use draftsmith::config::{
    Config, ConfigError, ConfigFlags, ConfigPatch, ThemeMode, load_config_flags, parse_flag_tokens,
    save_config_flags,
};

#[test]
fn test_config_file_parsing_ignores_comments_and_blank_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".draftsmithrc");
    let content = r#"
# comment
--markdown

--theme light

--debug-log=debug.log
"#;
    std::fs::write(&path, content).unwrap();

    let flags = load_config_flags(&path).unwrap();
    assert!(flags.markdown);
    assert_eq!(flags.theme, Some(ThemeMode::Light));
    assert_eq!(flags.debug_log, Some(PathBuf::from("debug.log")));
}

#[test]
fn test_cli_flags_override_file_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".draftsmithrc");
    let content = "--markdown\n--theme light\n--state-dir saved\n";
    std::fs::write(&path, content).unwrap();

    let file_flags = load_config_flags(&path).unwrap();
    let cli_args = vec![
        "draftsmith".to_string(),
        "--theme".to_string(),
        "dark".to_string(),
        "--typewriter".to_string(),
    ];
    let cli_flags = parse_flag_tokens(&cli_args);

    let effective = file_flags.union(&cli_flags);
    assert!(effective.markdown, "file flags should remain enabled");
    assert!(effective.typewriter, "cli flags should be applied");
    assert_eq!(effective.theme, Some(ThemeMode::Dark), "cli should override theme");
    assert_eq!(
        effective.state_dir,
        Some(PathBuf::from("saved")),
        "file config should be preserved when CLI does not override"
    );
}

#[test]
fn test_saved_flags_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config");
    let flags = ConfigFlags {
        perf: true,
        font_size: Some(18),
        theme: Some(ThemeMode::Dark),
        ..ConfigFlags::default()
    };
    save_config_flags(&path, &flags).unwrap();
    assert_eq!(load_config_flags(&path).unwrap(), flags);
}

#[test]
fn test_flag_patch_updates_editor_config() {
    let flags = parse_flag_tokens(&[
        "draftsmith".to_string(),
        "--font-size=20".to_string(),
        "--typewriter".to_string(),
    ]);
    let config = Config::default().merge(&flags.patch());
    assert_eq!(config.font_size, 20);
    assert!(config.typewriter_mode);
    assert!(config.validate().is_ok());
}

#[test]
fn test_out_of_range_patch_fails_validation() {
    let patch = ConfigPatch {
        font_size: Some(200),
        ..ConfigPatch::default()
    };
    let config = Config::default().merge(&patch);
    assert_eq!(config.validate(), Err(ConfigError::FontSize(200)));
}
