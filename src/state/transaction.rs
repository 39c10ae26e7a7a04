//! Transactions: an ordered batch of steps plus selection and metadata.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;

use super::selection::Selection;
use super::step::{Assoc, Step, StepError, StepMap};
use crate::document::{Attrs, Mark, MarkKind, Node, NodeKind, Schema};

/// Well-known metadata keys.
pub mod meta {
    /// `false` keeps the transaction out of the local undo history.
    pub const ADD_TO_HISTORY: &str = "addToHistory";
    /// Set on transactions that mirror a remote CRDT update.
    pub const REMOTE: &str = "remote";
    /// `"undo"` or `"redo"` on history transactions.
    pub const HISTORY: &str = "history";
    /// A controller action requested by a key binding.
    pub const ACTION: &str = "action";
    /// Set on transactions produced by paste handling.
    pub const PASTE: &str = "paste";
}

/// A pending edit against the state it was created from.
///
/// Steps are applied as they are added, so every builder method that adds a
/// step can fail; a failed step leaves the transaction unchanged.
#[derive(Debug, Clone)]
pub struct Transaction {
    before: Node,
    doc: Node,
    schema: Rc<Schema>,
    steps: Vec<Step>,
    maps: Vec<StepMap>,
    selection: Selection,
    selection_set: bool,
    stored_marks: Option<Vec<Mark>>,
    stored_marks_set: bool,
    meta: BTreeMap<&'static str, Value>,
}

impl Transaction {
    pub(crate) fn new(doc: Node, selection: Selection, schema: Rc<Schema>, stored: Option<Vec<Mark>>) -> Self {
        Self {
            before: doc.clone(),
            doc,
            schema,
            steps: Vec::new(),
            maps: Vec::new(),
            selection,
            selection_set: false,
            stored_marks: stored,
            stored_marks_set: false,
            meta: BTreeMap::new(),
        }
    }

    pub const fn doc(&self) -> &Node {
        &self.doc
    }

    pub const fn before(&self) -> &Node {
        &self.before
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn maps(&self) -> &[StepMap] {
        &self.maps
    }

    pub fn doc_changed(&self) -> bool {
        !self.steps.is_empty()
    }

    pub const fn selection(&self) -> Selection {
        self.selection
    }

    pub const fn selection_set(&self) -> bool {
        self.selection_set
    }

    pub fn stored_marks(&self) -> Option<&[Mark]> {
        self.stored_marks.as_deref()
    }

    pub const fn stored_marks_set(&self) -> bool {
        self.stored_marks_set
    }

    /// Map a position from the starting document through every step.
    pub fn map_pos(&self, pos: usize, assoc: Assoc) -> usize {
        self.maps.iter().fold(pos, |p, map| map.map(p, assoc))
    }

    /// Apply a step, mapping the selection through it.
    pub fn step(&mut self, step: Step) -> Result<&mut Self, StepError> {
        let (doc, map) = step.apply(&self.doc, &self.schema)?;
        self.selection = self.selection.map(&map, &doc);
        self.doc = doc;
        self.steps.push(step);
        self.maps.push(map);
        if !self.stored_marks_set {
            self.stored_marks = None;
        }
        Ok(self)
    }

    pub fn set_selection(&mut self, selection: Selection) -> &mut Self {
        self.selection = selection.resolve(&self.doc);
        self.selection_set = true;
        self.stored_marks = None;
        self.stored_marks_set = false;
        self
    }

    pub fn set_stored_marks(&mut self, marks: Option<Vec<Mark>>) -> &mut Self {
        self.stored_marks = marks;
        self.stored_marks_set = true;
        self
    }

    pub fn set_meta(&mut self, key: &'static str, value: impl Into<Value>) -> &mut Self {
        self.meta.insert(key, value.into());
        self
    }

    pub fn get_meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    /// True unless the transaction opted out of undo history.
    pub fn adds_to_history(&self) -> bool {
        self.get_meta(meta::ADD_TO_HISTORY).and_then(Value::as_bool) != Some(false)
            && self.get_meta(meta::REMOTE).is_none()
    }

    pub fn replace(&mut self, from: usize, to: usize, content: Vec<Node>) -> Result<&mut Self, StepError> {
        self.step(Step::Replace { from, to, content })
    }

    pub fn delete(&mut self, from: usize, to: usize) -> Result<&mut Self, StepError> {
        self.replace(from, to, Vec::new())
    }

    /// Insert text, inheriting the stored marks or the marks at `from`.
    pub fn insert_text(&mut self, text: &str, from: usize, to: usize) -> Result<&mut Self, StepError> {
        if text.is_empty() {
            return self.delete(from, to);
        }
        let rp = self.doc.resolve(from)?;
        let marks = if self.schema.allows_marks(rp.parent().kind()) {
            self.stored_marks.clone().unwrap_or_else(|| rp.marks())
        } else {
            Vec::new()
        };
        let node = self.schema.text(text, marks)?;
        self.replace(from, to, vec![node])?;
        let end = from + text.chars().count();
        self.set_selection(Selection::cursor(end));
        Ok(self)
    }

    /// Replace the whole document content.
    pub fn replace_doc(&mut self, doc: &Node) -> Result<&mut Self, StepError> {
        let size = self.doc.content_size();
        self.replace(0, size, doc.content().to_vec())
    }

    pub fn add_mark(&mut self, from: usize, to: usize, mark: Mark) -> Result<&mut Self, StepError> {
        self.step(Step::AddMark { from, to, mark })
    }

    pub fn remove_mark(&mut self, from: usize, to: usize, kind: MarkKind) -> Result<&mut Self, StepError> {
        self.step(Step::RemoveMark { from, to, kind })
    }

    pub fn set_node_markup(
        &mut self,
        pos: usize,
        kind: Option<NodeKind>,
        attrs: Attrs,
    ) -> Result<&mut Self, StepError> {
        self.step(Step::SetAttrs { pos, kind, attrs })
    }

    pub fn split(
        &mut self,
        pos: usize,
        depth: usize,
        types_after: Vec<Option<(NodeKind, Attrs)>>,
    ) -> Result<&mut Self, StepError> {
        self.step(Step::Split {
            pos,
            depth,
            types_after,
        })
    }

    pub fn join(&mut self, pos: usize) -> Result<&mut Self, StepError> {
        self.step(Step::Join { pos })
    }

    pub fn wrap(
        &mut self,
        from: usize,
        to: usize,
        wrappers: Vec<(NodeKind, Attrs)>,
    ) -> Result<&mut Self, StepError> {
        self.step(Step::Wrap { from, to, wrappers })
    }

    pub fn unwrap_node(&mut self, pos: usize) -> Result<&mut Self, StepError> {
        self.step(Step::Unwrap { pos })
    }

    /// Delete the selected content. A selection covering the whole
    /// document leaves one empty paragraph behind.
    pub fn delete_selection(&mut self) -> Result<&mut Self, StepError> {
        let from = self.selection.from();
        let to = self.selection.to(&self.doc);
        if from == to {
            return Ok(self);
        }
        let whole = from == 0 && to == self.doc.content_size();
        if whole || self.delete(from, to).is_err() {
            let filler = self.schema.create_and_fill(NodeKind::Paragraph, Attrs::new())?;
            self.replace(from, to, vec![filler])?;
            self.set_selection(Selection::near(&self.doc, from, Assoc::After));
        } else {
            let cursor = self.maps.last().map_or(from, |map| map.map(from, Assoc::Before));
            self.set_selection(Selection::cursor(cursor));
        }
        Ok(self)
    }

    /// Replace the selection with a node (or inline content).
    pub fn replace_selection_with(&mut self, node: Node) -> Result<&mut Self, StepError> {
        let from = self.selection.from();
        let to = self.selection.to(&self.doc);
        let size = node.node_size();
        self.replace(from, to, vec![node])?;
        self.set_selection(Selection::near(&self.doc, from + size, Assoc::After));
        Ok(self)
    }
}
