//! Theme, font, and content width as editor-level styling.

use std::rc::Rc;

use super::Extension;
use crate::config::Config;
use crate::state::view::Decoration;
use crate::state::{EditorState, Plugin};

#[derive(Debug)]
pub struct Appearance {
    class: String,
    style: String,
}

impl Appearance {
    pub fn new(config: &Config) -> Self {
        let mut style = format!(
            "font-size: {}px; max-width: {}px;",
            config.font_size, config.content_width
        );
        if let Some(font) = config.font.as_deref().filter(|f| !f.trim().is_empty()) {
            style = format!("font-family: \"{}\"; {style}", font.replace('"', ""));
        }
        Self {
            class: format!("theme-{}", config.theme.name()),
            style,
        }
    }
}

impl Plugin for Appearance {
    fn key(&self) -> &'static str {
        "appearance"
    }

    fn decorations(&self, _state: &EditorState) -> Vec<Decoration> {
        vec![Decoration::Editor {
            class: self.class.clone(),
            style: self.style.clone(),
        }]
    }
}

pub fn extension(config: &Config) -> Extension {
    let config = config.clone();
    Extension::new("appearance").with_plugins(move |mut plugins, _schema| {
        plugins.push(Rc::new(Appearance::new(&config)));
        plugins
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThemeMode;
    use crate::extension::tests::rich_state;

    #[test]
    fn test_defaults_style_the_editor() {
        let decorations = Appearance::new(&Config::default()).decorations(&rich_state("x"));
        assert_eq!(
            decorations,
            vec![Decoration::Editor {
                class: "theme-auto".to_string(),
                style: "font-size: 14px; max-width: 600px;".to_string(),
            }]
        );
    }

    #[test]
    fn test_font_and_theme_come_from_config() {
        let config = Config {
            theme: ThemeMode::Dark,
            font: Some("iA \"Writer\"".to_string()),
            font_size: 20,
            content_width: 800,
            ..Config::default()
        };
        let appearance = Appearance::new(&config);
        assert_eq!(appearance.class, "theme-dark");
        assert_eq!(
            appearance.style,
            "font-family: \"iA Writer\"; font-size: 20px; max-width: 800px;"
        );
    }
}
