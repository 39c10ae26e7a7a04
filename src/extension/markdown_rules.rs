//! Markdown-style auto-formatting while typing.

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::Extension;
use crate::document::{Attrs, NodeKind};
use crate::state::input::{InputRule, InputRules};

static OPEN_DOUBLE_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|[\s{\[(<'"\x{2018}\x{201C}])(")$"#).unwrap());
static CLOSE_DOUBLE_QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""$"#).unwrap());
static OPEN_SINGLE_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|[\s{\[(<'"\x{2018}\x{201C}])(')$"#).unwrap());
static CLOSE_SINGLE_QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"'$").unwrap());
static ELLIPSIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\.\.$").unwrap());
static EM_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"--$").unwrap());
static BLOCKQUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*>\s$").unwrap());
static ORDERED_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.\s$").unwrap());
static BULLET_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([-+*])\s$").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s$").unwrap());
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```([a-zA-Z0-9_+-]*)\s$").unwrap());

pub fn rules() -> Vec<InputRule> {
    vec![
        InputRule::text(OPEN_DOUBLE_QUOTE.clone(), "\u{201C}"),
        InputRule::text(CLOSE_DOUBLE_QUOTE.clone(), "\u{201D}"),
        InputRule::text(OPEN_SINGLE_QUOTE.clone(), "\u{2018}"),
        InputRule::text(CLOSE_SINGLE_QUOTE.clone(), "\u{2019}"),
        InputRule::text(ELLIPSIS.clone(), "\u{2026}"),
        InputRule::text(EM_DASH.clone(), "\u{2014}"),
        InputRule::wrapping(
            BLOCKQUOTE.clone(),
            |_| vec![(NodeKind::Blockquote, Attrs::new())],
            |_, _| false,
        ),
        InputRule::wrapping(
            ORDERED_LIST.clone(),
            |caps| {
                let order = caps[1].parse::<u64>().unwrap_or(1);
                vec![
                    (
                        NodeKind::OrderedList,
                        crate::attrs! { "order" => order, "tight" => true },
                    ),
                    (NodeKind::ListItem, Attrs::new()),
                ]
            },
            |caps, before| {
                let order = caps[1].parse::<u64>().unwrap_or(1);
                before.child_count() as u64 + before.attr_u64("order").unwrap_or(1) == order
            },
        ),
        InputRule::wrapping(
            BULLET_LIST.clone(),
            |_| {
                vec![
                    (NodeKind::BulletList, crate::attrs! { "tight" => true }),
                    (NodeKind::ListItem, Attrs::new()),
                ]
            },
            |_, _| true,
        ),
        InputRule::textblock_type(HEADING.clone(), NodeKind::Heading, |caps| {
            crate::attrs! { "level" => caps[1].len() }
        }),
        InputRule::textblock_type(CODE_FENCE.clone(), NodeKind::CodeBlock, |caps| {
            match caps.get(1).map(|m| m.as_str()).filter(|lang| !lang.is_empty()) {
                Some(lang) => crate::attrs! { "lang" => lang },
                None => Attrs::new(),
            }
        }),
    ]
}

pub fn extension() -> Extension {
    Extension::new("markdown-rules").with_plugins(|mut plugins, _schema| {
        plugins.push(Rc::new(InputRules::new("markdown-rules", rules())));
        plugins
    })
}

#[cfg(test)]
mod tests {
    use crate::extension::tests::rich_state;
    use crate::markdown::serialize;
    use crate::state::EditorState;
    use crate::state::input::InputEvent;
    use crate::state::view::EditorView;

    fn type_text(state: &EditorState, text: &str) -> EditorState {
        let view = EditorView::default();
        text.chars().fold(state.clone(), |state, ch| {
            let tr = view
                .handle_input(&state, &InputEvent::Text(ch.to_string()))
                .unwrap();
            state.apply(&tr)
        })
    }

    #[test]
    fn test_smart_quotes() {
        let state = type_text(&rich_state(""), "say \"hi\" it's");
        assert_eq!(state.doc().text_content(), "say \u{201C}hi\u{201D} it\u{2019}s");
    }

    #[test]
    fn test_ellipsis_and_em_dash() {
        let state = type_text(&rich_state(""), "wait... a--b");
        assert_eq!(state.doc().text_content(), "wait\u{2026} a\u{2014}b");
    }

    #[test]
    fn test_heading_rule() {
        let state = type_text(&rich_state(""), "### Title");
        assert_eq!(serialize(state.doc()), "### Title\n");
    }

    #[test]
    fn test_bullet_and_ordered_list_rules() {
        let state = type_text(&rich_state(""), "- item");
        assert_eq!(serialize(state.doc()), "* item\n");
        let state = type_text(&rich_state(""), "3. third");
        assert_eq!(serialize(state.doc()), "3. third\n");
    }

    #[test]
    fn test_blockquote_rule() {
        let state = type_text(&rich_state(""), "> quoted");
        assert_eq!(serialize(state.doc()), "> quoted\n");
    }

    #[test]
    fn test_code_fence_rule_sets_language() {
        let state = type_text(&rich_state(""), "```rust let");
        let block = &state.doc().content()[0];
        assert_eq!(block.kind(), crate::document::NodeKind::CodeBlock);
        assert_eq!(block.attr_str("lang"), Some("rust"));
        assert_eq!(block.text_content(), "let");
    }

    #[test]
    fn test_rules_do_not_fire_in_code() {
        let state = type_text(&rich_state(""), "``` a--b");
        assert_eq!(state.doc().text_content(), "a--b");
    }
}
