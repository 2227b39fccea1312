//! Node types and structures for the architecture graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Maximum length of a node identifier, in bytes.
pub const MAX_ID_LEN: usize = 512;

/// Well-known attribute keys understood by the analyses.
pub mod attr {
    /// Module source path.
    pub const PATH: &str = "path";
    /// Module layer tag (`data`, `business`, `presentation`, `unspecified`).
    pub const LAYER: &str = "layer";
    /// Function cyclomatic complexity (integer >= 0).
    pub const COMPLEXITY: &str = "complexity";
    /// Function parameter list.
    pub const PARAMETERS: &str = "parameters";
    /// Function return-type label.
    pub const RETURN_TYPE: &str = "return_type";
}

/// Errors related to NodeId operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeIdError {
    #[error("Node identifier cannot be empty")]
    Empty,

    #[error("Node identifier cannot contain control character {0:?}")]
    InvalidCharacter(char),

    #[error("Node identifier too long: {0} bytes (max {MAX_ID_LEN})")]
    TooLong(usize),

    #[error("Invalid node kind: {0}")]
    InvalidKind(String),
}

/// Errors related to Node building.
#[derive(Debug, Error)]
pub enum NodeBuilderError {
    #[error("Node ID is required")]
    MissingId,

    #[error("Node kind is required")]
    MissingKind,

    #[error("NodeId error: {0}")]
    NodeId(#[from] NodeIdError),
}

/// The variant of a node in the architecture graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Root of a per-project subgraph
    Project,
    /// A module / package
    Module,
    /// A source file
    File,
    /// A class, struct or type definition
    Class,
    /// A function or method
    Function,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Project => "project",
            NodeKind::Module => "module",
            NodeKind::File => "file",
            NodeKind::Class => "class",
            NodeKind::Function => "function",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(NodeKind::Project),
            "module" => Ok(NodeKind::Module),
            "file" => Ok(NodeKind::File),
            "class" => Ok(NodeKind::Class),
            "function" => Ok(NodeKind::Function),
            _ => Err(NodeIdError::InvalidKind(s.to_string())),
        }
    }
}

/// Architectural layer tag carried by Module nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Data,
    Business,
    Presentation,
    #[default]
    Unspecified,
}

impl LayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerType::Data => "data",
            LayerType::Business => "business",
            LayerType::Presentation => "presentation",
            LayerType::Unspecified => "unspecified",
        }
    }
}

impl std::fmt::Display for LayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LayerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "data" => Ok(LayerType::Data),
            "business" => Ok(LayerType::Business),
            "presentation" => Ok(LayerType::Presentation),
            "unspecified" | "" => Ok(LayerType::Unspecified),
            other => Err(format!("unknown layer '{}'", other)),
        }
    }
}

/// Stable identifier of a node, unique within its project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

/// Projects are addressed by the id of their Project node.
pub type ProjectId = NodeId;

impl NodeId {
    /// Create a new NodeId with validation.
    pub fn new(id: impl Into<String>) -> Result<Self, NodeIdError> {
        let id = id.into();
        validate_id(&id)?;
        Ok(Self(id))
    }

    /// Get the full ID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl std::str::FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

fn validate_id(s: &str) -> Result<(), NodeIdError> {
    if s.trim().is_empty() {
        return Err(NodeIdError::Empty);
    }
    if s.len() > MAX_ID_LEN {
        return Err(NodeIdError::TooLong(s.len()));
    }
    if let Some(c) = s.chars().find(|c| c.is_control()) {
        return Err(NodeIdError::InvalidCharacter(c));
    }
    Ok(())
}

/// Typed attribute values for node properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<AttributeValue>),
    Map(HashMap<String, AttributeValue>),
    Null,
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(n) => Some(*n as f64),
            AttributeValue::Float(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Integer(n)
    }
}

impl From<i32> for AttributeValue {
    fn from(n: i32) -> Self {
        AttributeValue::Integer(n as i64)
    }
}

impl From<u32> for AttributeValue {
    fn from(n: u32) -> Self {
        AttributeValue::Integer(n as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Float(n)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<LayerType> for AttributeValue {
    fn from(layer: LayerType) -> Self {
        AttributeValue::String(layer.as_str().to_string())
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(items: Vec<T>) -> Self {
        AttributeValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Metadata tracking node creation and updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// When this node was first created
    pub created_at: DateTime<Utc>,

    /// When this node was last merged
    pub updated_at: DateTime<Utc>,

    /// Commit of the batch that last touched this node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            commit: None,
        }
    }
}

/// A node in the architecture graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within the project
    pub id: NodeId,

    /// Node variant
    pub kind: NodeKind,

    /// Human-readable display name
    pub name: String,

    /// Kind-specific attributes
    /// - Module: path, layer
    /// - Function: complexity, parameters, return_type
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,

    pub metadata: NodeMetadata,

    /// The name was filled in from the id rather than supplied.
    #[serde(skip)]
    name_defaulted: bool,
}

impl Node {
    /// Layer tag of a module. Missing or unreadable tags are `Unspecified`.
    pub fn layer(&self) -> LayerType {
        self.attributes
            .get(attr::LAYER)
            .and_then(AttributeValue::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Cyclomatic complexity of a function, 0 when absent.
    pub fn complexity(&self) -> u64 {
        self.attributes
            .get(attr::COMPLEXITY)
            .and_then(AttributeValue::as_i64)
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0)
    }

    pub fn path(&self) -> Option<&str> {
        self.attributes.get(attr::PATH).and_then(AttributeValue::as_str)
    }

    pub fn return_type(&self) -> Option<&str> {
        self.attributes
            .get(attr::RETURN_TYPE)
            .and_then(AttributeValue::as_str)
    }

    pub fn parameters(&self) -> Vec<&str> {
        match self.attributes.get(attr::PARAMETERS) {
            Some(AttributeValue::List(items)) => {
                items.iter().filter_map(AttributeValue::as_str).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Merge another version of this node over it: new values win,
    /// attributes the update does not mention are left untouched.
    ///
    /// A defaulted name never replaces a supplied one.
    pub(crate) fn merge_from(&mut self, update: Node) {
        if !update.name_defaulted || self.name_defaulted {
            self.name = update.name;
            self.name_defaulted = update.name_defaulted;
        }
        self.attributes.extend(update.attributes);
        self.metadata.updated_at = update.metadata.updated_at;
        if update.metadata.commit.is_some() {
            self.metadata.commit = update.metadata.commit;
        }
    }
}

/// Builder for constructing Node instances.
#[derive(Debug, Default)]
pub struct NodeBuilder {
    id: Option<NodeId>,
    kind: Option<NodeKind>,
    name: Option<String>,
    attributes: HashMap<String, AttributeValue>,
    commit: Option<String>,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node ID.
    pub fn id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the node kind.
    pub fn kind(mut self, kind: NodeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the display name. Defaults to the id.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add an attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add several attributes at once.
    pub fn attributes(mut self, attrs: HashMap<String, AttributeValue>) -> Self {
        self.attributes.extend(attrs);
        self
    }

    /// Set the commit identifier.
    pub fn commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Build the Node.
    pub fn build(self) -> Result<Node, NodeBuilderError> {
        let id = self.id.ok_or(NodeBuilderError::MissingId)?;
        let kind = self.kind.ok_or(NodeBuilderError::MissingKind)?;
        let name_defaulted = self.name.is_none();
        let name = self.name.unwrap_or_else(|| id.to_string());

        let now = Utc::now();
        Ok(Node {
            id,
            kind,
            name,
            attributes: self.attributes,
            metadata: NodeMetadata {
                created_at: now,
                updated_at: now,
                commit: self.commit,
            },
            name_defaulted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod node_id_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_create_valid_node_id() {
            let id = NodeId::new("mod:billing").unwrap();
            assert_eq!(id.as_str(), "mod:billing");
            assert_eq!(id.to_string(), "mod:billing");
        }

        #[test]
        fn test_empty_id_fails() {
            assert_eq!(NodeId::new(""), Err(NodeIdError::Empty));
            assert_eq!(NodeId::new("   "), Err(NodeIdError::Empty));
        }

        #[test]
        fn test_control_character_fails() {
            let result = NodeId::new("a\nb");
            assert_eq!(result, Err(NodeIdError::InvalidCharacter('\n')));
        }

        #[test]
        fn test_too_long_fails() {
            let result = NodeId::new("x".repeat(MAX_ID_LEN + 1));
            assert!(matches!(result, Err(NodeIdError::TooLong(_))));
        }

        #[test]
        fn test_deserialize_rejects_invalid_id() {
            let result: Result<NodeId, _> = serde_json::from_str("\"\"");
            assert!(result.is_err());
        }

        #[test]
        fn test_all_node_kinds() {
            let kinds = [
                (NodeKind::Project, "project"),
                (NodeKind::Module, "module"),
                (NodeKind::File, "file"),
                (NodeKind::Class, "class"),
                (NodeKind::Function, "function"),
            ];

            for (kind, expected) in kinds {
                assert_eq!(kind.as_str(), expected);
                assert_eq!(expected.parse::<NodeKind>().unwrap(), kind);
            }
            assert!("service".parse::<NodeKind>().is_err());
        }
    }

    mod node_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        fn module(id: &str) -> NodeBuilder {
            NodeBuilder::new()
                .id(NodeId::new(id).unwrap())
                .kind(NodeKind::Module)
        }

        #[test]
        fn test_node_builder() {
            let node = module("billing")
                .name("Billing")
                .attribute(attr::LAYER, LayerType::Data)
                .attribute(attr::PATH, "src/billing")
                .build()
                .unwrap();

            assert_eq!(node.name, "Billing");
            assert_eq!(node.layer(), LayerType::Data);
            assert_eq!(node.path(), Some("src/billing"));
        }

        #[test]
        fn test_name_defaults_to_id() {
            let node = module("billing").build().unwrap();
            assert_eq!(node.name, "billing");
        }

        #[test]
        fn test_node_builder_missing_kind() {
            let result = NodeBuilder::new().id(NodeId::new("x").unwrap()).build();
            assert!(matches!(result, Err(NodeBuilderError::MissingKind)));
        }

        #[test]
        fn test_layer_defaults_to_unspecified() {
            let node = module("m").attribute(attr::LAYER, "cloud").build().unwrap();
            assert_eq!(node.layer(), LayerType::Unspecified);
        }

        #[test]
        fn test_function_accessors() {
            let node = NodeBuilder::new()
                .id(NodeId::new("fn:charge").unwrap())
                .kind(NodeKind::Function)
                .attribute(attr::COMPLEXITY, 7)
                .attribute(attr::PARAMETERS, vec!["amount", "currency"])
                .attribute(attr::RETURN_TYPE, "Receipt")
                .build()
                .unwrap();

            assert_eq!(node.complexity(), 7);
            assert_eq!(node.parameters(), vec!["amount", "currency"]);
            assert_eq!(node.return_type(), Some("Receipt"));
        }

        #[test]
        fn test_merge_keeps_unset_attributes() {
            let mut node = module("m")
                .attribute(attr::PATH, "src/m")
                .attribute(attr::LAYER, "data")
                .build()
                .unwrap();
            let update = module("m")
                .name("M")
                .attribute(attr::LAYER, "business")
                .build()
                .unwrap();

            node.merge_from(update);

            assert_eq!(node.name, "M");
            assert_eq!(node.layer(), LayerType::Business);
            assert_eq!(node.path(), Some("src/m"));
        }

        #[test]
        fn test_merge_without_name_keeps_name() {
            let mut node = module("m").name("Orders").build().unwrap();

            node.merge_from(module("m").build().unwrap());
            assert_eq!(node.name, "Orders");

            node.merge_from(module("m").name("Order Service").build().unwrap());
            assert_eq!(node.name, "Order Service");
        }

        #[test]
        fn test_attribute_value_numeric_views() {
            assert_eq!(AttributeValue::from(3).as_f64(), Some(3.0));
            assert_eq!(AttributeValue::from(0.5).as_f64(), Some(0.5));
            assert_eq!(AttributeValue::from("x").as_f64(), None);
            assert_eq!(AttributeValue::from(0.5).as_i64(), None);
        }
    }
}
