//! JSON form of documents: `{type, attrs?, content?, text?, marks?}`.

use serde_json::{Map, Value};

use super::node::{Attrs, Mark, MarkKind, Node, NodeKind};
use super::schema::{Schema, SchemaError};

impl Mark {
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), Value::String(self.kind().name().into()));
        if !self.attrs().is_empty() {
            obj.insert("attrs".into(), attrs_to_json(self.attrs()));
        }
        Value::Object(obj)
    }
}

impl Node {
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), Value::String(self.kind().name().into()));
        if !self.attrs().is_empty() {
            obj.insert("attrs".into(), attrs_to_json(self.attrs()));
        }
        if let Some(text) = self.text_str() {
            obj.insert("text".into(), Value::String(text.into()));
        }
        if self.child_count() > 0 {
            obj.insert(
                "content".into(),
                Value::Array(self.content().iter().map(Self::to_json).collect()),
            );
        }
        if !self.marks().is_empty() {
            obj.insert(
                "marks".into(),
                Value::Array(self.marks().iter().map(Mark::to_json).collect()),
            );
        }
        Value::Object(obj)
    }
}

fn attrs_to_json(attrs: &Attrs) -> Value {
    Value::Object(attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

fn attrs_from_json(value: Option<&Value>) -> Result<Attrs, SchemaError> {
    match value {
        None | Some(Value::Null) => Ok(Attrs::new()),
        Some(Value::Object(map)) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Some(other) => Err(SchemaError::Malformed(format!("attrs must be an object, got {other}"))),
    }
}

fn type_name(obj: &Map<String, Value>) -> Result<&str, SchemaError> {
    obj.get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::Malformed("missing `type`".into()))
}

impl Schema {
    /// Rebuild a document from JSON, validating every node.
    pub fn node_from_json(&self, value: &Value) -> Result<Node, SchemaError> {
        let obj = value
            .as_object()
            .ok_or_else(|| SchemaError::Malformed(format!("expected a node object, got {value}")))?;
        let name = type_name(obj)?;
        let kind =
            NodeKind::from_name(name).ok_or_else(|| SchemaError::UnknownNodeType(name.into()))?;
        if !self.has_node(kind) {
            return Err(SchemaError::NodeNotInSchema(kind));
        }

        if kind == NodeKind::Text {
            let text = obj
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| SchemaError::Malformed("text node without `text`".into()))?;
            let marks = match obj.get("marks") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|m| self.mark_from_json(m))
                    .collect::<Result<Vec<_>, _>>()?,
                Some(other) => {
                    return Err(SchemaError::Malformed(format!(
                        "marks must be an array, got {other}"
                    )));
                }
            };
            let marks = marks
                .iter()
                .fold(Vec::new(), |set: Vec<Mark>, mark| mark.add_to_set(&set));
            return self.text(text, marks);
        }

        let attrs = attrs_from_json(obj.get("attrs"))?;
        let content = match obj.get("content") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|child| self.node_from_json(child))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(SchemaError::Malformed(format!(
                    "content must be an array, got {other}"
                )));
            }
        };
        self.node(kind, attrs, content)
    }

    pub fn mark_from_json(&self, value: &Value) -> Result<Mark, SchemaError> {
        let obj = value
            .as_object()
            .ok_or_else(|| SchemaError::Malformed(format!("expected a mark object, got {value}")))?;
        let name = type_name(obj)?;
        let kind =
            MarkKind::from_name(name).ok_or_else(|| SchemaError::UnknownMarkType(name.into()))?;
        let attrs = attrs_from_json(obj.get("attrs"))?;
        self.mark(kind, attrs)
    }
}
