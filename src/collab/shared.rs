//! CRDT replica of a document.
//!
//! Each top-level block is a yrs map holding the block's structure (its JSON
//! with every textblock emptied) under `shape`, and one shared text per
//! textblock under `t0`, `t1`, ... in document order. Marks are text
//! formatting attributes and inline leaves are embeds. Local edits are folded
//! in block by block and then character by character, so concurrent typing
//! in the same paragraph merges instead of duplicating the block.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};
use yrs::types::Attrs;
use yrs::types::text::YChange;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Any, Array, ArrayRef, Doc, Map, MapPrelim, MapRef, Out, ReadTxn, StateVector, Text, TextPrelim, TextRef,
    Transact, TransactionMut, UndoManager, Update,
};

use super::CollabError;
use crate::document::{Node, NodeKind, Schema};

const BLOCKS: &str = "blocks";
const SHAPE: &str = "shape";
const EMBED: &str = "node";
const LOCAL: &str = "local";
const REMOTE: &str = "remote";

/// Mark name to the mark's JSON text.
type Marks = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Inline {
    Char(char, Marks),
    /// An inline leaf, as the JSON text of the node including its marks.
    Embed(String),
}

impl Inline {
    /// Length in yrs text offsets, which count UTF-8 bytes.
    fn width(&self) -> u32 {
        match self {
            Self::Char(ch, _) => u32::try_from(ch.len_utf8()).unwrap_or(1),
            Self::Embed(_) => 1,
        }
    }
}

fn width(units: &[Inline]) -> u32 {
    units.iter().map(Inline::width).sum()
}

/// One top-level block, split into structure and text.
#[derive(Debug, Clone, PartialEq)]
struct Block {
    shape: Value,
    texts: Vec<Vec<Inline>>,
}

fn is_textblock(value: &Value) -> bool {
    value
        .get("type")
        .and_then(Value::as_str)
        .and_then(NodeKind::from_name)
        .is_some_and(NodeKind::is_textblock)
}

fn slot_count(shape: &Value) -> usize {
    if is_textblock(shape) {
        return 1;
    }
    shape
        .get("content")
        .and_then(Value::as_array)
        .map_or(0, |children| children.iter().map(slot_count).sum())
}

fn slot(i: usize) -> String {
    format!("t{i}")
}

fn index(i: usize) -> u32 {
    u32::try_from(i).unwrap_or(u32::MAX)
}

fn node_units(content: &[Node]) -> Vec<Inline> {
    let mut units = Vec::new();
    for child in content {
        match child.text_str() {
            Some(text) => {
                let marks: Marks = child
                    .marks()
                    .iter()
                    .map(|mark| (mark.kind().name().to_string(), mark.to_json().to_string()))
                    .collect();
                units.extend(text.chars().map(|ch| Inline::Char(ch, marks.clone())));
            }
            None => units.push(Inline::Embed(child.to_json().to_string())),
        }
    }
    units
}

fn shape_of(node: &Node, texts: &mut Vec<Vec<Inline>>) -> Value {
    if node.is_textblock() {
        texts.push(node_units(node.content()));
        return node.copy(Vec::new()).to_json();
    }
    let mut value = node.copy(Vec::new()).to_json();
    if node.child_count() > 0 {
        value["content"] = Value::Array(node.content().iter().map(|child| shape_of(child, texts)).collect());
    }
    value
}

/// Inline JSON for a run of units, merging characters that share marks.
fn inline_json(units: &[Inline]) -> Vec<Value> {
    let mut out = Vec::new();
    let mut run = String::new();
    let mut run_marks: Option<&Marks> = None;
    let flush = |out: &mut Vec<Value>, run: &mut String, marks: Option<&Marks>| {
        if run.is_empty() {
            return;
        }
        let mut text = json!({ "type": "text", "text": std::mem::take(run) });
        if let Some(marks) = marks.filter(|marks| !marks.is_empty()) {
            text["marks"] = Value::Array(
                marks
                    .values()
                    .map(|mark| serde_json::from_str(mark).unwrap_or(Value::Null))
                    .collect(),
            );
        }
        out.push(text);
    };
    for unit in units {
        match unit {
            Inline::Char(ch, marks) => {
                if run_marks != Some(marks) {
                    flush(&mut out, &mut run, run_marks);
                    run_marks = Some(marks);
                }
                run.push(*ch);
            }
            Inline::Embed(node) => {
                flush(&mut out, &mut run, run_marks);
                run_marks = None;
                out.push(serde_json::from_str(node).unwrap_or(Value::Null));
            }
        }
    }
    flush(&mut out, &mut run, run_marks);
    out
}

fn fill(shape: &Value, texts: &mut std::slice::Iter<'_, Vec<Inline>>) -> Value {
    let mut value = shape.clone();
    if is_textblock(shape) {
        let content = texts.next().map(|units| inline_json(units)).unwrap_or_default();
        if !content.is_empty() {
            value["content"] = Value::Array(content);
        }
        return value;
    }
    if let Some(children) = shape.get("content").and_then(Value::as_array) {
        value["content"] = Value::Array(children.iter().map(|child| fill(child, texts)).collect());
    }
    value
}

fn read_text<T: ReadTxn>(text: &TextRef, txn: &T) -> Vec<Inline> {
    let mut units = Vec::new();
    for chunk in text.diff(txn, YChange::identity) {
        match chunk.insert {
            Out::Any(Any::String(s)) => {
                let marks: Marks = chunk
                    .attributes
                    .iter()
                    .flat_map(|attrs| attrs.iter())
                    .filter_map(|(name, value)| match value {
                        Any::String(mark) => Some((name.to_string(), mark.to_string())),
                        _ => None,
                    })
                    .collect();
                units.extend(s.chars().map(|ch| Inline::Char(ch, marks.clone())));
            }
            Out::Any(Any::Map(map)) => {
                if let Some(Any::String(node)) = map.get(EMBED) {
                    units.push(Inline::Embed(node.to_string()));
                }
            }
            _ => {}
        }
    }
    units
}

/// Insert `units` at `at`, one call per run of equally marked characters.
fn write_text(text: &TextRef, txn: &mut TransactionMut, at: u32, units: &[Inline]) {
    let mut at = at;
    let mut i = 0;
    while i < units.len() {
        match &units[i] {
            Inline::Embed(node) => {
                let embed = Any::Map(Arc::new(HashMap::from([(EMBED.to_string(), Any::from(node.as_str()))])));
                text.insert_embed_with_attributes(txn, at, embed, Attrs::new());
                at += 1;
                i += 1;
            }
            Inline::Char(_, marks) => {
                let mut chunk = String::new();
                while let Some(Inline::Char(ch, next)) = units.get(i) {
                    if next != marks {
                        break;
                    }
                    chunk.push(*ch);
                    i += 1;
                }
                let attrs: Attrs = marks
                    .iter()
                    .map(|(name, mark)| (Arc::from(name.as_str()), Any::from(mark.as_str())))
                    .collect();
                text.insert_with_attributes(txn, at, &chunk, attrs);
                at += u32::try_from(chunk.len()).unwrap_or(u32::MAX);
            }
        }
    }
}

/// Replace the changed middle of `before` with the matching run of `after`.
fn update_text(text: &TextRef, txn: &mut TransactionMut, before: &[Inline], after: &[Inline]) {
    let prefix = before.iter().zip(after).take_while(|(a, b)| a == b).count();
    let max_suffix = before.len().min(after.len()) - prefix;
    let suffix = before
        .iter()
        .rev()
        .zip(after.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();
    let at = width(&before[..prefix]);
    let removed = width(&before[prefix..before.len() - suffix]);
    if removed > 0 {
        text.remove_range(txn, at, removed);
    }
    write_text(text, txn, at, &after[prefix..after.len() - suffix]);
}

impl Block {
    fn from_node(node: &Node) -> Self {
        let mut texts = Vec::new();
        let shape = shape_of(node, &mut texts);
        Self { shape, texts }
    }

    fn read<T: ReadTxn>(map: &MapRef, txn: &T) -> Self {
        let shape = match map.get(txn, SHAPE) {
            Some(Out::Any(Any::String(shape))) => serde_json::from_str(&shape).unwrap_or(Value::Null),
            _ => Value::Null,
        };
        let texts = (0..slot_count(&shape))
            .map(|i| match map.get(txn, &slot(i)) {
                Some(Out::YText(text)) => read_text(&text, txn),
                _ => Vec::new(),
            })
            .collect();
        Self { shape, texts }
    }

    fn kind(&self) -> Option<&str> {
        self.shape.get("type").and_then(Value::as_str)
    }

    /// Whether `other` can be written over this block in place.
    fn pairs_with(&self, other: &Self) -> bool {
        self.kind() == other.kind() || self.texts.len() == other.texts.len()
    }

    fn to_json(&self) -> Value {
        fill(&self.shape, &mut self.texts.iter())
    }

    fn insert(&self, blocks: &ArrayRef, txn: &mut TransactionMut, at: u32) {
        let map = blocks.insert(txn, at, MapPrelim::default());
        map.insert(txn, SHAPE, self.shape.to_string());
        for (i, units) in self.texts.iter().enumerate() {
            let text = map.insert(txn, slot(i), TextPrelim::new(""));
            write_text(&text, txn, 0, units);
        }
    }

    /// Rewrite `map`, currently holding `self`, to hold `next`.
    fn update(&self, map: &MapRef, txn: &mut TransactionMut, next: &Self) {
        if self.shape != next.shape {
            map.insert(txn, SHAPE, next.shape.to_string());
        }
        for (i, units) in next.texts.iter().enumerate() {
            let key = slot(i);
            let existing = match map.get(&*txn, &key) {
                Some(Out::YText(text)) => Some(text),
                _ => None,
            };
            match (self.texts.get(i), existing) {
                (Some(before), Some(text)) => update_text(&text, txn, before, units),
                _ => {
                    let text = map.insert(txn, key, TextPrelim::new(""));
                    write_text(&text, txn, 0, units);
                }
            }
        }
        for i in next.texts.len()..self.texts.len() {
            map.remove(txn, &slot(i));
        }
    }
}

pub struct SharedDocument {
    doc: Doc,
    blocks: ArrayRef,
    undo: UndoManager,
}

impl fmt::Debug for SharedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedDocument")
            .field("client", &self.doc.client_id())
            .field("blocks", &self.blocks.len(&self.doc.transact()))
            .finish_non_exhaustive()
    }
}

impl SharedDocument {
    pub fn new(client: u64) -> Self {
        let doc = Doc::with_client_id(client);
        let blocks = doc.get_or_insert_array(BLOCKS);
        let mut undo: UndoManager = UndoManager::new(&doc, &blocks);
        undo.include_origin(LOCAL);
        Self { doc, blocks, undo }
    }

    fn entries(&self) -> Vec<(MapRef, Block)> {
        let txn = self.doc.transact();
        self.blocks
            .iter(&txn)
            .filter_map(|out| match out {
                Out::YMap(map) => {
                    let block = Block::read(&map, &txn);
                    Some((map, block))
                }
                _ => None,
            })
            .collect()
    }

    /// Current blocks as JSON text, in document order.
    pub fn blocks(&self) -> Vec<String> {
        self.entries()
            .iter()
            .map(|(_, block)| block.to_json().to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.len(&self.doc.transact()) == 0
    }

    /// Bring the replica in line with `doc`. Returns the update to broadcast,
    /// or `None` when nothing changed.
    pub fn apply_local(&mut self, doc: &Node) -> Option<Vec<u8>> {
        let (maps, old): (Vec<MapRef>, Vec<Block>) = self.entries().into_iter().unzip();
        let new: Vec<Block> = doc.content().iter().map(Block::from_node).collect();
        let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
        let max_suffix = old.len().min(new.len()) - prefix;
        let suffix = old
            .iter()
            .rev()
            .zip(new.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();
        if prefix + suffix == old.len() && old.len() == new.len() {
            return None;
        }

        let before = self.doc.transact().state_vector();
        let (mut old_start, mut new_start) = (prefix, prefix);
        let (mut old_end, mut new_end) = (old.len() - suffix, new.len() - suffix);
        let mut updated = 0;
        {
            let mut txn = self.doc.transact_mut_with(LOCAL);
            while old_start < old_end && new_start < new_end {
                if old[old_start].pairs_with(&new[new_start]) {
                    old[old_start].update(&maps[old_start], &mut txn, &new[new_start]);
                    old_start += 1;
                    new_start += 1;
                } else if old[old_end - 1].pairs_with(&new[new_end - 1]) {
                    old[old_end - 1].update(&maps[old_end - 1], &mut txn, &new[new_end - 1]);
                    old_end -= 1;
                    new_end -= 1;
                } else {
                    break;
                }
                updated += 1;
            }
            if old_end > old_start {
                self.blocks
                    .remove_range(&mut txn, index(old_start), index(old_end - old_start));
            }
            for (offset, block) in new[new_start..new_end].iter().enumerate() {
                block.insert(&self.blocks, &mut txn, index(old_start + offset));
            }
        }
        tracing::trace!(
            prefix,
            updated,
            removed = old_end - old_start,
            inserted = new_end - new_start,
            "mirrored local change"
        );
        Some(self.doc.transact().encode_state_as_update_v1(&before))
    }
    /// Encoded state vector, sent as the first sync step.
    pub fn state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    /// Everything a peer with `state_vector` is missing.
    pub fn encode_diff(&self, state_vector: &[u8]) -> Result<Vec<u8>, CollabError> {
        let sv = StateVector::decode_v1(state_vector).map_err(|e| CollabError::Decode(e.to_string()))?;
        Ok(self.doc.transact().encode_state_as_update_v1(&sv))
    }

    /// Everything this replica holds, as one update.
    pub fn encode_all(&self) -> Vec<u8> {
        self.doc.transact().encode_state_as_update_v1(&StateVector::default())
    }

    /// Merge a peer's update. Returns whether the blocks changed.
    pub fn apply_remote(&mut self, update: &[u8]) -> Result<bool, CollabError> {
        let update = Update::decode_v1(update).map_err(|e| CollabError::Decode(e.to_string()))?;
        let before = self.blocks();
        {
            let mut txn = self.doc.transact_mut_with(REMOTE);
            txn.apply_update(update)
                .map_err(|e| CollabError::Apply(e.to_string()))?;
        }
        Ok(self.blocks() != before)
    }

    /// Rebuild the document. An empty replica yields the schema's empty doc.
    pub fn to_doc(&self, schema: &Schema) -> Result<Node, CollabError> {
        let content: Vec<Value> = self.entries().iter().map(|(_, block)| block.to_json()).collect();
        if content.is_empty() {
            return schema
                .empty_doc()
                .map_err(|e| CollabError::Document(e.to_string()));
        }
        schema
            .node_from_json(&json!({ "type": "doc", "content": content }))
            .map_err(|e| CollabError::Document(e.to_string()))
    }

    /// Undo the last local change. Returns the update to broadcast.
    pub fn undo(&mut self) -> Option<Vec<u8>> {
        let before = self.doc.transact().state_vector();
        if !self.undo.undo_blocking() {
            return None;
        }
        Some(self.doc.transact().encode_state_as_update_v1(&before))
    }

    pub fn redo(&mut self) -> Option<Vec<u8>> {
        let before = self.doc.transact().state_vector();
        if !self.undo.redo_blocking() {
            return None;
        }
        Some(self.doc.transact().encode_state_as_update_v1(&before))
    }
}
