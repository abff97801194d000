pub mod openapi;

use std::collections::BTreeMap;

use kube::core::GroupVersionKind;

use crate::{
    error::{Error, Result},
    path::Segment,
};

/// Vendor extension naming the field that identifies items of a mergeable list
pub const MERGE_KEY_EXTENSION: &str = "x-kubernetes-patch-merge-key";

/// Chains of references longer than this are treated as cyclic
const MAX_REFERENCE_HOPS: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveType {
    Integer,
    Number,
    Boolean,
    String,
}

impl PrimitiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::String => "string",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Primitive {
    pub kind: PrimitiveType,
    pub format: Option<String>,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    pub items: Box<SchemaNode>,
    pub description: String,
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl Array {
    /// Field that identifies items of this list. Lists without one cannot be indexed.
    pub fn merge_key(&self, path: &[Segment]) -> Result<&str> {
        match self.extensions.get(MERGE_KEY_EXTENSION) {
            None => Err(Error::UnmergeableList { path: path.into() }),
            Some(serde_json::Value::String(key)) => Ok(key),
            Some(value) => Err(Error::MergeKeyNotString {
                path: path.into(),
                value: value.clone(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Map {
    pub value: Box<SchemaNode>,
    pub description: String,
}

/// An object type with a fixed set of fields
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Kind {
    /// Name of the definition this object came from, if any
    pub name: Option<String>,
    pub description: String,
    pub fields: BTreeMap<String, SchemaNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SchemaNode {
    Primitive(Primitive),
    Array(Array),
    Map(Map),
    Kind(Kind),
    /// Indirection to a named definition of the owning [`Models`]
    Reference(String),
}

impl SchemaNode {
    pub fn primitive(kind: PrimitiveType, description: &str) -> Self {
        Self::Primitive(Primitive {
            kind,
            format: None,
            description: description.to_string(),
        })
    }

    pub fn string(description: &str) -> Self {
        Self::primitive(PrimitiveType::String, description)
    }

    pub fn integer(description: &str) -> Self {
        Self::primitive(PrimitiveType::Integer, description)
    }

    pub fn boolean(description: &str) -> Self {
        Self::primitive(PrimitiveType::Boolean, description)
    }

    pub fn number(description: &str) -> Self {
        Self::primitive(PrimitiveType::Number, description)
    }

    pub fn array(items: SchemaNode) -> Self {
        Self::Array(Array {
            items: Box::new(items),
            description: String::new(),
            extensions: BTreeMap::new(),
        })
    }

    pub fn merge_array(items: SchemaNode, merge_key: &str) -> Self {
        let mut extensions = BTreeMap::new();
        extensions.insert(MERGE_KEY_EXTENSION.to_string(), merge_key.into());
        Self::Array(Array {
            items: Box::new(items),
            description: String::new(),
            extensions,
        })
    }

    pub fn map(value: SchemaNode) -> Self {
        Self::Map(Map {
            value: Box::new(value),
            description: String::new(),
        })
    }

    pub fn object<'a>(fields: impl IntoIterator<Item = (&'a str, SchemaNode)>) -> Self {
        Self::Kind(Kind {
            name: None,
            description: String::new(),
            fields: fields
                .into_iter()
                .map(|(name, node)| (name.to_string(), node))
                .collect(),
        })
    }

    pub fn reference(name: &str) -> Self {
        Self::Reference(name.to_string())
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Primitive(p) => &p.description,
            Self::Array(a) => &a.description,
            Self::Map(m) => &m.description,
            Self::Kind(k) => &k.description,
            Self::Reference(_) => "",
        }
    }

    /// Human readable type name for error messages
    pub fn type_name(&self) -> String {
        match self {
            Self::Primitive(p) => p.kind.as_str().to_string(),
            Self::Array(_) => "array".to_string(),
            Self::Map(_) => "map".to_string(),
            Self::Kind(Kind { name: Some(name), .. }) => name.clone(),
            Self::Kind(_) => "object".to_string(),
            Self::Reference(name) => name.clone(),
        }
    }
}

/// Looks up the schema of a top-level resource
pub trait SchemaProvider {
    fn lookup_resource(&self, gvk: &GroupVersionKind) -> Option<&SchemaNode>;
}

/// Set of named schema definitions, loaded once and shared read-only by every traversal.
#[derive(Clone, Debug, Default)]
pub struct Models {
    definitions: BTreeMap<String, SchemaNode>,
    /// (group, version, kind) -> definition name
    resources: BTreeMap<(String, String, String), String>,
}

impl Models {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_definition(&mut self, name: impl Into<String>, node: SchemaNode) {
        self.definitions.insert(name.into(), node);
    }

    /// Mark a definition as the schema of a top-level resource
    pub fn register_resource(&mut self, gvk: &GroupVersionKind, definition: impl Into<String>) {
        self.resources.insert(
            (gvk.group.clone(), gvk.version.clone(), gvk.kind.clone()),
            definition.into(),
        );
    }

    pub fn definition(&self, name: &str) -> Option<&SchemaNode> {
        self.definitions.get(name)
    }

    pub fn definitions_len(&self) -> usize {
        self.definitions.len()
    }

    /// All registered resources with the name of their definition
    pub fn resources(&self) -> impl Iterator<Item = (GroupVersionKind, &str)> {
        self.resources
            .iter()
            .map(|((g, v, k), name)| (GroupVersionKind::gvk(g, v, k), name.as_str()))
    }

    /// Name of the definition registered for a resource
    pub fn resource_definition(&self, gvk: &GroupVersionKind) -> Option<&str> {
        let key = (gvk.group.clone(), gvk.version.clone(), gvk.kind.clone());
        self.resources.get(&key).map(String::as_str)
    }

    /// Follow references until a concrete node is reached
    pub fn resolve<'a>(&'a self, mut node: &'a SchemaNode) -> Result<&'a SchemaNode> {
        for _ in 0..MAX_REFERENCE_HOPS {
            match node {
                SchemaNode::Reference(name) => {
                    node = self
                        .definitions
                        .get(name)
                        .ok_or_else(|| Error::UnresolvedReference(name.clone()))?;
                }
                node => return Ok(node),
            }
        }
        Err(Error::UnresolvedReference(node.type_name()))
    }
}

impl SchemaProvider for Models {
    fn lookup_resource(&self, gvk: &GroupVersionKind) -> Option<&SchemaNode> {
        self.resource_definition(gvk)
            .and_then(|name| self.definitions.get(name))
    }
}
