// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node model of the downstream address space.
//!
//! A deliberately small subset of the OPC UA information model: node ids,
//! attributes, variants, data values, status codes and references. Only what
//! the thing and property namespaces need to answer browse, read and
//! monitored-item requests.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Index into the server namespace table.
pub type NamespaceIndex = u16;

/// Identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    Numeric(u32),
    String(String),
}

/// Node identifier: namespace index plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub namespace: NamespaceIndex,
    pub identifier: Identifier,
}

impl NodeId {
    /// Create a numeric node id.
    pub const fn numeric(namespace: NamespaceIndex, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    /// Create a string node id.
    pub fn string(namespace: NamespaceIndex, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    /// String identifier, if this is a string node id.
    pub fn as_str(&self) -> Option<&str> {
        match &self.identifier {
            Identifier::String(s) => Some(s),
            Identifier::Numeric(_) => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match &self.identifier {
            Identifier::Numeric(n) => write!(f, "i={}", n),
            Identifier::String(s) => write!(f, "s={}", s),
        }
    }
}

/// Textual node id parse errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeIdParseError {
    #[error("Invalid namespace index: {0}")]
    Namespace(String),

    #[error("Invalid numeric identifier: {0}")]
    Numeric(String),

    #[error("Unsupported node id format: {0}")]
    Format(String),
}

impl FromStr for NodeId {
    type Err = NodeIdParseError;

    /// Parse `ns=<n>;i=<num>` or `ns=<n>;s=<text>`; the namespace part is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, rest) = match s.strip_prefix("ns=") {
            Some(tail) => {
                let (ns, rest) = tail
                    .split_once(';')
                    .ok_or_else(|| NodeIdParseError::Format(s.to_string()))?;
                let ns = ns
                    .parse::<NamespaceIndex>()
                    .map_err(|_| NodeIdParseError::Namespace(ns.to_string()))?;
                (ns, rest)
            }
            None => (0, s),
        };

        if let Some(value) = rest.strip_prefix("i=") {
            let value = value
                .parse::<u32>()
                .map_err(|_| NodeIdParseError::Numeric(value.to_string()))?;
            Ok(Self::numeric(namespace, value))
        } else if let Some(value) = rest.strip_prefix("s=") {
            Ok(Self::string(namespace, value))
        } else {
            Err(NodeIdParseError::Format(s.to_string()))
        }
    }
}

/// Well-known nodes of namespace 0.
pub mod ids {
    use super::NodeId;

    pub const BASE_DATA_TYPE: NodeId = NodeId::numeric(0, 24);
    pub const ORGANIZES: NodeId = NodeId::numeric(0, 35);
    pub const HAS_TYPE_DEFINITION: NodeId = NodeId::numeric(0, 40);
    pub const FOLDER_TYPE: NodeId = NodeId::numeric(0, 61);
    pub const BASE_DATA_VARIABLE_TYPE: NodeId = NodeId::numeric(0, 63);
    pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);
}

/// Node attributes, numbered as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AttributeId {
    NodeId = 1,
    NodeClass = 2,
    BrowseName = 3,
    DisplayName = 4,
    Description = 5,
    WriteMask = 6,
    UserWriteMask = 7,
    IsAbstract = 8,
    Symmetric = 9,
    InverseName = 10,
    ContainsNoLoops = 11,
    EventNotifier = 12,
    Value = 13,
    DataType = 14,
    ValueRank = 15,
    ArrayDimensions = 16,
    AccessLevel = 17,
    UserAccessLevel = 18,
    MinimumSamplingInterval = 19,
    Historizing = 20,
    Executable = 21,
    UserExecutable = 22,
}

impl AttributeId {
    /// Map a wire attribute id, `None` if out of range.
    pub fn from_u32(id: u32) -> Option<Self> {
        let attribute = match id {
            1 => Self::NodeId,
            2 => Self::NodeClass,
            3 => Self::BrowseName,
            4 => Self::DisplayName,
            5 => Self::Description,
            6 => Self::WriteMask,
            7 => Self::UserWriteMask,
            8 => Self::IsAbstract,
            9 => Self::Symmetric,
            10 => Self::InverseName,
            11 => Self::ContainsNoLoops,
            12 => Self::EventNotifier,
            13 => Self::Value,
            14 => Self::DataType,
            15 => Self::ValueRank,
            16 => Self::ArrayDimensions,
            17 => Self::AccessLevel,
            18 => Self::UserAccessLevel,
            19 => Self::MinimumSamplingInterval,
            20 => Self::Historizing,
            21 => Self::Executable,
            22 => Self::UserExecutable,
            _ => return None,
        };
        Some(attribute)
    }

    /// Wire value.
    pub fn id(self) -> u32 {
        self as u32
    }
}

/// Node class of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum NodeClass {
    Object = 1,
    Variable = 2,
}

/// Namespace-qualified browse name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub namespace: NamespaceIndex,
    pub name: String,
}

impl QualifiedName {
    pub fn new(namespace: NamespaceIndex, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }
}

/// Text with optional locale.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalizedText {
    pub locale: Option<String>,
    pub text: Option<String>,
}

impl LocalizedText {
    /// English text.
    pub fn english(text: impl Into<String>) -> Self {
        Self {
            locale: Some("en".to_string()),
            text: Some(text.into()),
        }
    }

    /// The null text (no locale, no text).
    pub fn null() -> Self {
        Self::default()
    }
}

/// Typed value carried by a [`DataValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    /// Explicit null.
    Empty,
    Boolean(bool),
    Byte(u8),
    Int32(i32),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    NodeId(NodeId),
    NodeClass(NodeClass),
    QualifiedName(QualifiedName),
    LocalizedText(LocalizedText),
    Array(Vec<Variant>),
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Byte(b) => write!(f, "{}", b),
            Self::Int32(n) => write!(f, "{}", n),
            Self::Double(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{:?}", s),
            Self::DateTime(t) => write!(f, "{}", t.to_rfc3339()),
            Self::NodeId(id) => write!(f, "{}", id),
            Self::NodeClass(class) => write!(f, "{:?}", class),
            Self::QualifiedName(name) => write!(f, "{}:{}", name.namespace, name.name),
            Self::LocalizedText(text) => write!(f, "{}", text.text.as_deref().unwrap_or("")),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Status code: severity in the two top bits, sub-code below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const GOOD: Self = Self(0x0000_0000);
    pub const UNCERTAIN: Self = Self(0x4000_0000);
    pub const BAD: Self = Self(0x8000_0000);
    pub const BAD_NODE_ID_INVALID: Self = Self(0x8033_0000);
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    pub const BAD_ATTRIBUTE_ID_INVALID: Self = Self(0x8035_0000);
    pub const BAD_NOT_WRITABLE: Self = Self(0x803B_0000);
    pub const BAD_NOT_FOUND: Self = Self(0x803E_0000);

    pub fn is_good(self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    pub fn is_uncertain(self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    pub fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Symbolic name for the codes this bridge produces.
    pub fn name(self) -> &'static str {
        match self {
            Self::GOOD => "Good",
            Self::UNCERTAIN => "Uncertain",
            Self::BAD => "Bad",
            Self::BAD_NODE_ID_INVALID => "BadNodeIdInvalid",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_ATTRIBUTE_ID_INVALID => "BadAttributeIdInvalid",
            Self::BAD_NOT_WRITABLE => "BadNotWritable",
            Self::BAD_NOT_FOUND => "BadNotFound",
            _ if self.is_bad() => "Bad(other)",
            _ if self.is_uncertain() => "Uncertain(other)",
            _ => "Good(other)",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

/// Value with status and source timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct DataValue {
    pub value: Option<Variant>,
    pub status: StatusCode,
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Good value without timestamp.
    pub fn new(value: Variant) -> Self {
        Self {
            value: Some(value),
            status: StatusCode::GOOD,
            source_timestamp: None,
        }
    }

    /// Status only, no value.
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            value: None,
            status,
            source_timestamp: None,
        }
    }

    /// Good value stamped with its source time.
    pub fn with_timestamp(value: Variant, source_timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            value: Some(value),
            status: StatusCode::GOOD,
            source_timestamp,
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} [{}]", value, self.status.name())?,
            None => write!(f, "<no value> [{}]", self.status.name())?,
        }
        if let Some(ts) = self.source_timestamp {
            write!(f, " @ {}", ts.to_rfc3339())?;
        }
        Ok(())
    }
}

/// One item of a read request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadValueId {
    pub node_id: NodeId,
    /// Raw attribute id; may be out of range.
    pub attribute_id: u32,
}

impl ReadValueId {
    pub fn new(node_id: NodeId, attribute: AttributeId) -> Self {
        Self {
            node_id,
            attribute_id: attribute.id(),
        }
    }

    /// Read of the `Value` attribute.
    pub fn value(node_id: NodeId) -> Self {
        Self::new(node_id, AttributeId::Value)
    }
}

/// One item of a write request.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteValue {
    pub node_id: NodeId,
    pub attribute_id: u32,
    pub value: DataValue,
}

/// Directed reference between two nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub source: NodeId,
    pub reference_type: NodeId,
    pub target: NodeId,
    pub forward: bool,
}

impl Reference {
    /// Forward reference.
    pub fn forward(source: NodeId, reference_type: NodeId, target: NodeId) -> Self {
        Self {
            source,
            reference_type,
            target,
            forward: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_parse_string() {
        let id: NodeId = "ns=2;s=foo#bar".parse().expect("parse");
        assert_eq!(id, NodeId::string(2, "foo#bar"));
        assert_eq!(id.to_string(), "ns=2;s=foo#bar");
    }

    #[test]
    fn test_node_id_parse_numeric_default_namespace() {
        let id: NodeId = "i=85".parse().expect("parse");
        assert_eq!(id, ids::OBJECTS_FOLDER);
        assert_eq!(id.to_string(), "i=85");
    }

    #[test]
    fn test_node_id_string_may_contain_semicolons() {
        let id: NodeId = "ns=1;s=a;b".parse().expect("parse");
        assert_eq!(id.as_str(), Some("a;b"));
    }

    #[test]
    fn test_node_id_parse_errors() {
        assert!(matches!(
            "ns=x;s=a".parse::<NodeId>(),
            Err(NodeIdParseError::Namespace(_))
        ));
        assert!(matches!(
            "i=abc".parse::<NodeId>(),
            Err(NodeIdParseError::Numeric(_))
        ));
        assert!(matches!(
            "g=1234".parse::<NodeId>(),
            Err(NodeIdParseError::Format(_))
        ));
    }

    #[test]
    fn test_attribute_id_mapping() {
        assert_eq!(AttributeId::from_u32(13), Some(AttributeId::Value));
        assert_eq!(AttributeId::from_u32(0), None);
        assert_eq!(AttributeId::from_u32(23), None);
        assert_eq!(AttributeId::Historizing.id(), 20);
    }

    #[test]
    fn test_status_code_severity() {
        assert!(StatusCode::GOOD.is_good());
        assert!(StatusCode::UNCERTAIN.is_uncertain());
        assert!(StatusCode::BAD_NOT_FOUND.is_bad());
        assert!(!StatusCode::BAD_NOT_FOUND.is_good());
        assert_eq!(StatusCode::BAD_NODE_ID_INVALID.name(), "BadNodeIdInvalid");
    }
}
