//! Tag tree records.
//!
//! A [`Node`] is one tag type: a stable id, its display attributes, an optional
//! hidden flag and, for root nodes only, an ordered list of child nodes.
//! Nodes are shared behind `Rc` so that unchanged parts of a tree keep their
//! identity across mutations.

use crate::TreeError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;
use uuid::Uuid;

/// Shared handle to a node.
pub type NodeRef = Rc<Node>;

/// Shared ordered sequence of nodes (the root list, or one parent's children).
pub type NodeSeq = Rc<Vec<NodeRef>>;

/// Prefix of every generated node id.
pub const ID_PREFIX: &str = "WTK";

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Za-z]+$").expect("Invalid node id regex"));

/// Display attributes of a tag type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFields {
    pub name: String,
    /// Text color.
    pub color: String,
    pub background_color: String,
    pub description: String,
}

/// One tag type in the two-level tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "typeKey")]
    pub id: String,
    #[serde(flatten)]
    pub fields: NodeFields,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<NodeSeq>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Partial update of a node's display attributes.
///
/// `None` leaves the attribute untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub background_color: Option<String>,
    pub description: Option<String>,
    pub hidden: Option<bool>,
}

impl NodePatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn background_color(mut self, color: impl Into<String>) -> Self {
        self.background_color = Some(color.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }
}

impl Node {
    /// Create a leaf node with empty display attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Create a leaf node with a freshly generated id.
    pub fn generated() -> Self {
        let simple = Uuid::now_v7().simple().to_string();
        let tail = &simple[simple.len() - 12..];
        Self::new(format!("{}{}", ID_PREFIX, tail))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.fields.name = name.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.fields.color = color.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.fields.description = description.into();
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Attach children, turning this node into a parent.
    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = Some(Rc::new(
            children.into_iter().map(|c| Rc::new(c.into_leaf())).collect(),
        ));
        self
    }

    /// Drop any children so the node can live on the second level.
    pub fn into_leaf(mut self) -> Self {
        self.children = None;
        self
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.as_ref().map_or(0, |c| c.len())
    }

    /// Merge a patch into a copy of this node.
    ///
    /// Children are carried over untouched; `hidden: Some(false)` clears the flag.
    pub fn merged(&self, patch: &NodePatch) -> Node {
        Node {
            id: self.id.clone(),
            fields: NodeFields {
                name: patch.name.clone().unwrap_or_else(|| self.fields.name.clone()),
                color: patch
                    .color
                    .clone()
                    .unwrap_or_else(|| self.fields.color.clone()),
                background_color: patch
                    .background_color
                    .clone()
                    .unwrap_or_else(|| self.fields.background_color.clone()),
                description: patch
                    .description
                    .clone()
                    .unwrap_or_else(|| self.fields.description.clone()),
            },
            hidden: patch.hidden.unwrap_or(self.hidden),
            children: self.children.clone(),
        }
    }

    /// Build a node from a loosely shaped JSON record.
    ///
    /// Missing or non-string attributes become `""`, a missing or falsy
    /// `hidden` becomes `false`, and children are read one level deep only.
    pub fn from_value(value: &Value) -> Node {
        let text = |field: &str| -> String {
            value
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Node {
            id: text("typeKey"),
            fields: NodeFields {
                name: text("name"),
                color: text("color"),
                background_color: text("backgroundColor"),
                description: text("description"),
            },
            hidden: value.get("hidden").and_then(Value::as_bool).unwrap_or(false),
            children: None,
        }
    }

    /// Same as [`Node::from_value`] but keeps one level of children.
    pub fn root_from_value(value: &Value) -> Node {
        let mut node = Node::from_value(value);
        if let Some(children) = value.get("children").and_then(Value::as_array) {
            node.children = Some(Rc::new(
                children.iter().map(|c| Rc::new(Node::from_value(c))).collect(),
            ));
        }
        node
    }

    /// True when the display attributes and hidden flag match, ignoring children.
    pub fn same_fields(&self, other: &Node) -> bool {
        self.id == other.id && self.fields == other.fields && self.hidden == other.hidden
    }
}

/// Check that an id only contains ASCII letters and digits.
pub fn validate_id(id: &str) -> Result<(), TreeError> {
    if ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(TreeError::InvalidId { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_fills_defaults() {
        let node = Node::from_value(&json!({"typeKey": "WTK01", "color": 7}));
        assert_eq!(node.id, "WTK01");
        assert_eq!(node.fields.name, "");
        assert_eq!(node.fields.color, "");
        assert!(!node.hidden);
        assert!(node.children.is_none());

        assert_eq!(Node::from_value(&Value::Null), Node::default());
    }

    #[test]
    fn test_root_from_value_reads_one_level() {
        let node = Node::root_from_value(&json!({
            "typeKey": "WTK01",
            "children": [{"typeKey": "WTK0101", "children": [{"typeKey": "deep"}]}]
        }));
        let children = node.children.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, "WTK0101");
        assert!(children[0].children.is_none());
    }

    #[test]
    fn test_merged_keeps_children_and_clears_hidden() {
        let node = Node::new("WTK01")
            .with_hidden(true)
            .with_children(vec![Node::new("WTK0101")]);
        let merged = node.merged(&NodePatch::default().name("Hedge").hidden(false));
        assert_eq!(merged.fields.name, "Hedge");
        assert!(!merged.hidden);
        assert!(Rc::ptr_eq(
            merged.children.as_ref().unwrap(),
            node.children.as_ref().unwrap()
        ));
    }

    #[test]
    fn test_serde_shape() {
        let node = Node::new("WTK01").with_name("Hedge");
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(
            value,
            json!({
                "typeKey": "WTK01",
                "name": "Hedge",
                "color": "",
                "backgroundColor": "",
                "description": ""
            })
        );
        let back: Node = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("WTK01").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("WTK 01").is_err());
        assert!(validate_id("WTK-01").is_err());
    }

    #[test]
    fn test_generated_ids_are_valid() {
        let node = Node::generated();
        assert!(node.id.starts_with(ID_PREFIX));
        assert_eq!(node.id.len(), ID_PREFIX.len() + 12);
        assert!(validate_id(&node.id).is_ok());
    }
}
