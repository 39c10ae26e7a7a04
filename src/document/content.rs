//! Content expressions: the nesting rules of a node type.
//!
//! The grammar is a small subset of the usual one: a sequence of terms,
//! each a node type name, a group name, or a parenthesized `|` choice of
//! them, optionally followed by `*`, `+`, or `?`.

use super::node::{Node, NodeKind};
use super::schema::{Group, SchemaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Atom {
    Kind(NodeKind),
    Group(Group),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    atoms: Vec<Atom>,
    min: usize,
    max: Option<usize>,
}

/// A parsed content expression.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentExpr {
    terms: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Open,
    Close,
    Pipe,
    Star,
    Plus,
    Question,
}

fn tokenize(source: &str) -> Result<Vec<Token>, SchemaError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '?' => {
                chars.next();
                tokens.push(Token::Question);
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            _ => return Err(SchemaError::InvalidContentExpr(source.to_string())),
        }
    }
    Ok(tokens)
}

fn resolve_word(word: &str, source: &str) -> Result<Atom, SchemaError> {
    if let Some(kind) = NodeKind::from_name(word) {
        return Ok(Atom::Kind(kind));
    }
    Group::from_name(word)
        .map(Atom::Group)
        .ok_or_else(|| SchemaError::InvalidContentExpr(source.to_string()))
}

impl ContentExpr {
    pub fn parse(source: &str) -> Result<Self, SchemaError> {
        let tokens = tokenize(source)?;
        let invalid = || SchemaError::InvalidContentExpr(source.to_string());
        let mut terms = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let atoms = match &tokens[i] {
                Token::Word(word) => {
                    i += 1;
                    vec![resolve_word(word, source)?]
                }
                Token::Open => {
                    i += 1;
                    let mut atoms = Vec::new();
                    loop {
                        match tokens.get(i) {
                            Some(Token::Word(word)) => atoms.push(resolve_word(word, source)?),
                            _ => return Err(invalid()),
                        }
                        i += 1;
                        match tokens.get(i) {
                            Some(Token::Pipe) => i += 1,
                            Some(Token::Close) => {
                                i += 1;
                                break;
                            }
                            _ => return Err(invalid()),
                        }
                    }
                    atoms
                }
                _ => return Err(invalid()),
            };
            let (min, max) = match tokens.get(i) {
                Some(Token::Star) => {
                    i += 1;
                    (0, None)
                }
                Some(Token::Plus) => {
                    i += 1;
                    (1, None)
                }
                Some(Token::Question) => {
                    i += 1;
                    (0, Some(1))
                }
                _ => (1, Some(1)),
            };
            terms.push(Term { atoms, min, max });
        }
        Ok(Self { terms })
    }

    /// True when the expression accepts no content at all.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Check a child sequence. `group_of` maps a node type to its group in
    /// the active schema.
    pub fn matches(&self, children: &[Node], group_of: impl Fn(NodeKind) -> Option<Group>) -> bool {
        let accepts = |atoms: &[Atom], kind: NodeKind| {
            atoms.iter().any(|atom| match atom {
                Atom::Kind(k) => *k == kind,
                Atom::Group(g) => group_of(kind) == Some(*g),
            })
        };
        let mut index = 0;
        for term in &self.terms {
            let mut count = 0;
            while index < children.len()
                && term.max.is_none_or(|max| count < max)
                && accepts(&term.atoms, children[index].kind())
            {
                count += 1;
                index += 1;
            }
            if count < term.min {
                return false;
            }
        }
        index == children.len()
    }

    /// Node types required to fill an empty node, in order. Groups resolve
    /// through `default_of`.
    pub fn required(&self, default_of: impl Fn(Group) -> Option<NodeKind>) -> Vec<NodeKind> {
        let mut out = Vec::new();
        for term in &self.terms {
            let Some(first) = term.atoms.first() else {
                continue;
            };
            let kind = match first {
                Atom::Kind(kind) => Some(*kind),
                Atom::Group(group) => default_of(*group),
            };
            if let Some(kind) = kind {
                out.extend(std::iter::repeat_n(kind, term.min));
            }
        }
        out
    }

    /// Every node type named directly (not through a group).
    pub fn named_kinds(&self) -> impl Iterator<Item = NodeKind> + '_ {
        self.terms.iter().flat_map(|term| {
            term.atoms.iter().filter_map(|atom| match atom {
                Atom::Kind(kind) => Some(*kind),
                Atom::Group(_) => None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::node::Attrs;

    fn node(kind: NodeKind) -> Node {
        Node::branch(kind, Attrs::new(), Vec::new())
    }

    fn group_of(kind: NodeKind) -> Option<Group> {
        match kind {
            NodeKind::Paragraph | NodeKind::Heading | NodeKind::BulletList => Some(Group::Block),
            NodeKind::Text | NodeKind::Image => Some(Group::Inline),
            _ => None,
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ContentExpr::parse("paragraph!").is_err());
        assert!(ContentExpr::parse("(paragraph").is_err());
        assert!(ContentExpr::parse("nonsense+").is_err());
    }

    #[test]
    fn test_block_plus_requires_one_block() {
        let expr = ContentExpr::parse("block+").unwrap();
        assert!(!expr.matches(&[], group_of));
        assert!(expr.matches(&[node(NodeKind::Paragraph)], group_of));
        assert!(!expr.matches(&[node(NodeKind::ListItem)], group_of));
    }

    #[test]
    fn test_sequence_with_leading_paragraph() {
        let expr = ContentExpr::parse("paragraph block*").unwrap();
        assert!(expr.matches(
            &[node(NodeKind::Paragraph), node(NodeKind::BulletList)],
            group_of
        ));
        assert!(!expr.matches(&[node(NodeKind::BulletList)], group_of));
    }

    #[test]
    fn test_choice_group() {
        let expr = ContentExpr::parse("(table_cell | table_header)*").unwrap();
        assert!(expr.matches(
            &[node(NodeKind::TableHeader), node(NodeKind::TableCell)],
            group_of
        ));
        assert!(!expr.matches(&[node(NodeKind::Paragraph)], group_of));
    }

    #[test]
    fn test_required_fills_minimums() {
        let expr = ContentExpr::parse("paragraph block*").unwrap();
        assert_eq!(expr.required(|_| Some(NodeKind::Paragraph)), vec![NodeKind::Paragraph]);
        let empty = ContentExpr::parse("").unwrap();
        assert!(empty.is_empty());
        assert!(empty.required(|_| None).is_empty());
    }
}
