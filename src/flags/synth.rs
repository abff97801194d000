//! Flag synthesis: walk a resource schema along field paths, register one flag per reachable
//! primitive and remember where each value goes.
//!
//! Synthesis produces a [`Materializer`] holding a template of the document fragment. The
//! template is evaluated against the current flag values every time the fragment is requested.

use std::collections::{BTreeMap, BTreeSet};

use kube::core::GroupVersionKind;
use serde_json::{Map, Value};

use super::{FlagCell, FlagKind, FlagSpec, FlagSurface, FlagValue};
use crate::{
    error::{Error, Result},
    locator::scalar_to_string,
    path::{FieldPath, Segment},
    schema::{Kind, Models, Primitive, PrimitiveType, SchemaNode},
};

/// Never become flags when an object is expanded
const EXPANSION_BLACKLIST: [&str; 4] = ["apiVersion", "kind", "metadata", "status"];

/// Cannot be named by a path at all
const PATH_BLACKLIST: [&str; 3] = ["apiVersion", "kind", "status"];

/// Nested objects deeper than this are not expanded, recursive schemas would never end
const MAX_EXPANSION_DEPTH: usize = 10;

/// How the values of a flag map onto the document
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// One value
    Scalar,
    /// One value per selected list item, zipped with the item keys
    Elementwise,
    /// The whole list value of a list-of-primitives field
    List,
}

/// A registered flag and the location it writes to
#[derive(Clone, Debug)]
pub struct Binding {
    pub name: String,
    /// Document location in a form like `.spec.containers[].image`
    pub location: String,
    pub shape: Shape,
    pub kind: FlagKind,
    cell: FlagCell,
}

impl Binding {
    pub fn value(&self) -> FlagValue {
        self.cell.get()
    }

    pub fn changed(&self) -> bool {
        self.cell.changed()
    }
}

#[derive(Clone, Debug)]
enum Step {
    Field(String),
    /// List items, selected by a fixed key or by a key flag
    Item(Option<String>),
    /// Map values, under a fixed key or a key flag
    Entry(Option<String>),
}

#[derive(Clone, Copy, Debug, Default)]
struct Context<'n> {
    /// Below a list whose items are selected by a key flag
    elementwise: bool,
    /// Field carried by the key flag of the enclosing list
    merge_key: Option<&'n str>,
}

#[derive(Clone, Debug)]
enum Key {
    Fixed(Value),
    Flag(Binding),
}

impl Key {
    fn same(&self, other: &Key) -> bool {
        match (self, other) {
            (Key::Fixed(a), Key::Fixed(b)) => a == b,
            (Key::Flag(a), Key::Flag(b)) => a.name == b.name,
            _ => false,
        }
    }
}

/// Template of the document fragment built from flags
#[derive(Clone, Debug)]
enum Node {
    Object(BTreeMap<String, Node>),
    Leaf(Binding),
    List {
        key: Key,
        key_field: String,
        item: Box<Node>,
    },
    Entry {
        key: Key,
        value: Box<Node>,
    },
}

impl Node {
    fn merge(self, other: Node, at: &str) -> Result<Node> {
        match (self, other) {
            (Node::Object(mut fields), Node::Object(others)) => {
                for (name, node) in others {
                    let merged = match fields.remove(&name) {
                        Some(existing) => existing.merge(node, &name)?,
                        None => node,
                    };
                    fields.insert(name, merged);
                }
                Ok(Node::Object(fields))
            }
            (Node::Leaf(a), Node::Leaf(b)) if a.name == b.name => Ok(Node::Leaf(a)),
            (
                Node::List {
                    key,
                    key_field,
                    item,
                },
                Node::List {
                    key: other_key,
                    item: other_item,
                    ..
                },
            ) if key.same(&other_key) => Ok(Node::List {
                key,
                key_field,
                item: Box::new(item.merge(*other_item, at)?),
            }),
            (
                Node::Entry { key, value },
                Node::Entry {
                    key: other_key,
                    value: other_value,
                },
            ) if key.same(&other_key) => Ok(Node::Entry {
                key,
                value: Box::new(value.merge(*other_value, at)?),
            }),
            _ => Err(Error::ConflictingPaths(at.to_string())),
        }
    }

    /// Whether any element-wise flag holds values
    fn has_element_values(&self) -> bool {
        match self {
            Node::Object(fields) => fields.values().any(Node::has_element_values),
            Node::Leaf(binding) => {
                binding.shape == Shape::Elementwise && !binding.value().elements().is_empty()
            }
            Node::List { item, .. } => item.has_element_values(),
            Node::Entry { value, .. } => value.has_element_values(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Render {
    changed_only: bool,
    /// Item of the outermost selected list being rendered, and the number of items selected
    index: Option<(usize, usize)>,
}

impl Render {
    /// The value of an element-wise flag for the current item
    fn pick(&self, binding: &Binding) -> Result<Option<Value>> {
        let mut values = binding.value().elements();
        let Some((index, count)) = self.index else {
            return Ok(Some(Value::Array(values)));
        };
        match values.len() {
            0 => Ok(None),
            1 => Ok(values.pop()),
            n if n == count => Ok(Some(values.swap_remove(index))),
            n => Err(Error::ElementCount {
                flag: binding.name.clone(),
                expected: count,
                found: n,
            }),
        }
    }

    fn leaf(&self, binding: &Binding) -> Result<Option<Value>> {
        if self.changed_only && !binding.changed() {
            return Ok(None);
        }
        match binding.shape {
            Shape::Scalar => Ok(Some(binding.value().to_json())),
            Shape::List => {
                let values = binding.value().elements();
                Ok((!values.is_empty()).then(|| Value::Array(values)))
            }
            Shape::Elementwise => self.pick(binding),
        }
    }

    fn keys(&self, key: &Key) -> Result<Vec<Value>> {
        match key {
            Key::Fixed(value) => Ok(vec![value.clone()]),
            Key::Flag(binding) => match self.index {
                Some((_, count)) if count > 1 => Ok(self.pick(binding)?.into_iter().collect()),
                _ => Ok(binding.value().elements()),
            },
        }
    }

    fn node(&self, node: &Node) -> Result<Option<Value>> {
        match node {
            Node::Leaf(binding) => self.leaf(binding),
            Node::Object(fields) => {
                let mut object = Map::new();
                for (name, field) in fields {
                    if let Some(value) = self.node(field)? {
                        object.insert(name.clone(), value);
                    }
                }
                Ok((!object.is_empty()).then(|| Value::Object(object)))
            }
            Node::Entry { key, value } => {
                let Some(key) = self.keys(key)?.pop() else {
                    return Ok(None);
                };
                let key = scalar_to_string(&key);
                if key.is_empty() {
                    return Ok(None);
                }
                Ok(self.node(value)?.map(|value| {
                    let mut entry = Map::new();
                    entry.insert(key, value);
                    Value::Object(entry)
                }))
            }
            Node::List {
                key,
                key_field,
                item,
            } => {
                let keys = self.keys(key)?;
                if keys.is_empty() {
                    if item.has_element_values() {
                        let name = match key {
                            Key::Flag(binding) => binding.name.clone(),
                            Key::Fixed(value) => scalar_to_string(value),
                        };
                        return Err(Error::MissingElementKey(name));
                    }
                    return Ok(None);
                }
                let count = keys.len();
                let mut items = Vec::with_capacity(count);
                for (i, key) in keys.into_iter().enumerate() {
                    // Lists nested inside one of several selected items stay on that item,
                    // below a single item the inner list is zipped instead
                    let index = match self.index {
                        Some(outer) if outer.1 > 1 => outer,
                        _ => (i, count),
                    };
                    let render = Render {
                        index: Some(index),
                        ..*self
                    };
                    let element = match render.node(item)? {
                        Some(Value::Object(mut object)) => {
                            object.insert(key_field.clone(), key);
                            Value::Object(object)
                        }
                        Some(value) => value,
                        None => {
                            let mut object = Map::new();
                            object.insert(key_field.clone(), key);
                            Value::Object(object)
                        }
                    };
                    items.push(element);
                }
                Ok(Some(Value::Array(items)))
            }
        }
    }
}

/// Assembles the request body from the current values of synthesized flags
#[derive(Clone, Debug)]
pub struct Materializer {
    api_version: String,
    kind: String,
    name: Binding,
    namespace: Binding,
    root: Node,
}

impl Materializer {
    /// Full fragment including defaults of flags that were not given
    pub fn materialize(&self) -> Result<Value> {
        self.build(false)
    }

    /// Fragment of the flags given on the command line only, for merging onto a live object
    pub fn materialize_changed(&self) -> Result<Value> {
        self.build(true)
    }

    fn build(&self, changed_only: bool) -> Result<Value> {
        let render = Render {
            changed_only,
            index: None,
        };
        let mut document = match render.node(&self.root)? {
            Some(Value::Object(object)) => object,
            _ => Map::new(),
        };

        let mut metadata = match document.remove("metadata") {
            Some(Value::Object(metadata)) => metadata,
            _ => Map::new(),
        };
        for (field, binding) in [("name", &self.name), ("namespace", &self.namespace)] {
            if changed_only && !binding.changed() {
                continue;
            }
            if let FlagValue::String(value) = binding.value() {
                if !value.is_empty() {
                    metadata.insert(field.to_string(), Value::String(value));
                }
            }
        }

        let mut envelope = Map::new();
        envelope.insert("apiVersion".into(), Value::String(self.api_version.clone()));
        envelope.insert("kind".into(), Value::String(self.kind.clone()));
        if !metadata.is_empty() {
            envelope.insert("metadata".into(), Value::Object(metadata));
        }
        envelope.extend(document);
        Ok(Value::Object(envelope))
    }

    pub fn name(&self) -> Option<String> {
        match self.name.value() {
            FlagValue::String(name) if !name.is_empty() => Some(name),
            _ => None,
        }
    }

    pub fn namespace(&self) -> Option<String> {
        match self.namespace.value() {
            FlagValue::String(namespace) if !namespace.is_empty() => Some(namespace),
            _ => None,
        }
    }
}

/// Registers flags for field paths of one resource on a [`FlagSurface`].
pub struct FlagSynthesizer<'a, S> {
    models: &'a Models,
    surface: &'a mut S,
    expand_roots: BTreeSet<String>,
    bindings: BTreeMap<String, Binding>,
}

impl<'a, S: FlagSurface> FlagSynthesizer<'a, S> {
    pub fn new(models: &'a Models, surface: &'a mut S) -> Self {
        Self {
            models,
            surface,
            expand_roots: BTreeSet::from(["spec".to_string()]),
            bindings: BTreeMap::new(),
        }
    }

    /// Top-level fields whose objects may be expanded into one flag per primitive
    pub fn with_expand_roots<I, T>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.expand_roots = roots.into_iter().map(Into::into).collect();
        self
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    pub fn synthesize(
        &mut self,
        gvk: &GroupVersionKind,
        schema: &SchemaNode,
        paths: &[FieldPath],
    ) -> Result<Materializer> {
        let models = self.models;
        let root = models.resolve(schema)?;
        if !matches!(root, SchemaNode::Kind(_)) {
            return Err(Error::TypeMismatch {
                path: FieldPath::default(),
                expected: "object",
                found: node_kind(root),
            });
        }

        let name = self.bind(
            vec!["name".to_string()],
            ".metadata.name".to_string(),
            FlagValue::String(String::new()),
            Shape::Scalar,
            "Name of the resource",
        )?;
        let namespace = self.bind(
            vec!["namespace".to_string()],
            ".metadata.namespace".to_string(),
            FlagValue::String("default".to_string()),
            Shape::Scalar,
            "Namespace of the resource",
        )?;

        let mut tree: Option<Node> = None;
        for path in paths {
            let mut trail = Vec::new();
            let Some(node) = self.visit(root, path.segments(), &mut trail, Context::default())?
            else {
                continue;
            };
            tree = Some(match tree {
                Some(tree) => tree.merge(node, &path.to_string())?,
                None => node,
            });
        }

        Ok(Materializer {
            api_version: api_version(gvk),
            kind: gvk.kind.clone(),
            name,
            namespace,
            root: tree.unwrap_or_else(|| Node::Object(BTreeMap::new())),
        })
    }

    fn visit(
        &mut self,
        node: &SchemaNode,
        rest: &[Segment],
        trail: &mut Vec<Step>,
        ctx: Context<'_>,
    ) -> Result<Option<Node>> {
        let models = self.models;
        let node = models.resolve(node)?;
        match node {
            SchemaNode::Primitive(primitive) => {
                if !rest.is_empty() {
                    return Err(Error::PathBeyondPrimitive {
                        path: trail_path(trail),
                        remaining: rest.into(),
                    });
                }
                Ok(Some(Node::Leaf(self.primitive(primitive, trail, ctx)?)))
            }
            SchemaNode::Kind(kind) => {
                let Some((segment, rest)) = rest.split_first() else {
                    return self.expand_terminal(kind, trail, ctx);
                };
                let name = segment.as_str();
                if PATH_BLACKLIST.contains(&name) {
                    trail.push(Step::Field(name.to_string()));
                    let path = trail_path(trail);
                    trail.pop();
                    return Err(Error::BlacklistedField {
                        field: name.to_string(),
                        path,
                    });
                }
                let Some(field) = kind.fields.get(name) else {
                    trail.push(Step::Field(name.to_string()));
                    let path = trail_path(trail);
                    trail.pop();
                    return Err(Error::FieldNotFound {
                        field: name.to_string(),
                        schema: node.type_name(),
                        path,
                    });
                };
                let field_ctx = Context {
                    merge_key: None,
                    ..ctx
                };
                trail.push(Step::Field(name.to_string()));
                let child = self.visit(field, rest, trail, field_ctx);
                trail.pop();
                Ok(child?.map(|child| Node::Object(BTreeMap::from([(name.to_string(), child)]))))
            }
            SchemaNode::Array(array) => {
                let items = models.resolve(&array.items)?;
                if rest.is_empty() {
                    if let SchemaNode::Primitive(primitive) = items {
                        return Ok(Some(Node::Leaf(self.list(primitive, trail)?)));
                    }
                }
                let merge_key = array.merge_key(trail_path(trail).segments())?;
                let fixed = match rest.first() {
                    Some(segment) => segment.index()?.map(str::to_string),
                    None => None,
                };
                let (key, rest) = match &fixed {
                    Some(index) => {
                        let key = typed_key(models, items, merge_key, index);
                        (Key::Fixed(key), &rest[1..])
                    }
                    None => (Key::Flag(self.list_key(items, merge_key, trail)?), rest),
                };
                trail.push(Step::Item(fixed.clone()));
                let element_ctx = Context {
                    elementwise: ctx.elementwise || fixed.is_none(),
                    merge_key: Some(merge_key),
                };
                let child = self.visit(&array.items, rest, trail, element_ctx);
                trail.pop();
                Ok(Some(Node::List {
                    key,
                    key_field: merge_key.to_string(),
                    item: Box::new(child?.unwrap_or_else(|| Node::Object(BTreeMap::new()))),
                }))
            }
            SchemaNode::Map(map) => {
                let ctx = Context {
                    merge_key: None,
                    ..ctx
                };
                if let Some((segment, rest)) = rest.split_first() {
                    let key = segment.key()?.to_string();
                    trail.push(Step::Entry(Some(key.clone())));
                    let child = self.visit(&map.value, rest, trail, ctx);
                    trail.pop();
                    return Ok(child?.map(|value| Node::Entry {
                        key: Key::Fixed(Value::String(key)),
                        value: Box::new(value),
                    }));
                }
                trail.push(Step::Entry(None));
                let child = self.visit(&map.value, &[], trail, ctx);
                trail.pop();
                let Some(value) = child? else {
                    return Ok(None);
                };
                let key = self.map_key(trail, ctx)?;
                Ok(Some(Node::Entry {
                    key: Key::Flag(key),
                    value: Box::new(value),
                }))
            }
            SchemaNode::Reference(name) => Err(Error::UnresolvedReference(name.clone())),
        }
    }

    /// An object at the end of a path becomes one flag per primitive below it, but only under
    /// the expansion roots.
    fn expand_terminal(
        &mut self,
        kind: &Kind,
        trail: &mut Vec<Step>,
        ctx: Context<'_>,
    ) -> Result<Option<Node>> {
        let root = trail.iter().find_map(|step| match step {
            Step::Field(name) => Some(name.as_str()),
            _ => None,
        });
        match root {
            Some(root) if self.expand_roots.contains(root) => self.expand(kind, trail, ctx, 0),
            _ => {
                tracing::warn!(
                    path = %trail_path(trail),
                    "object outside of the expandable fields, skipping"
                );
                Ok(None)
            }
        }
    }

    fn expand(
        &mut self,
        kind: &Kind,
        trail: &mut Vec<Step>,
        ctx: Context<'_>,
        depth: usize,
    ) -> Result<Option<Node>> {
        let mut fields = BTreeMap::new();
        for (name, field) in &kind.fields {
            let merge_key = ctx.merge_key == Some(name.as_str());
            if merge_key || EXPANSION_BLACKLIST.contains(&name.as_str()) {
                continue;
            }
            trail.push(Step::Field(name.clone()));
            let node = self.expand_field(field, trail, ctx, depth);
            trail.pop();
            if let Some(node) = node? {
                fields.insert(name.clone(), node);
            }
        }
        Ok((!fields.is_empty()).then(|| Node::Object(fields)))
    }

    fn expand_field(
        &mut self,
        field: &SchemaNode,
        trail: &mut Vec<Step>,
        ctx: Context<'_>,
        depth: usize,
    ) -> Result<Option<Node>> {
        let models = self.models;
        match models.resolve(field)? {
            SchemaNode::Primitive(primitive) => {
                Ok(Some(Node::Leaf(self.primitive(primitive, trail, ctx)?)))
            }
            SchemaNode::Kind(kind) if depth < MAX_EXPANSION_DEPTH => self.expand(
                kind,
                trail,
                Context {
                    merge_key: None,
                    ..ctx
                },
                depth + 1,
            ),
            SchemaNode::Array(array) => match models.resolve(&array.items)? {
                SchemaNode::Primitive(primitive) => {
                    Ok(Some(Node::Leaf(self.list(primitive, trail)?)))
                }
                _ => {
                    tracing::debug!(path = %trail_path(trail), "not expanding list of objects");
                    Ok(None)
                }
            },
            node => {
                tracing::debug!(
                    path = %trail_path(trail),
                    kind = node_kind(node),
                    "not expanding field"
                );
                Ok(None)
            }
        }
    }

    fn primitive(
        &mut self,
        primitive: &Primitive,
        trail: &[Step],
        ctx: Context<'_>,
    ) -> Result<Binding> {
        let kind = FlagKind::from_primitive(primitive.kind);
        let (kind, shape) = if ctx.elementwise {
            (kind.slice(), Shape::Elementwise)
        } else {
            (kind, Shape::Scalar)
        };
        self.bind(
            candidates(&field_names(trail), 1),
            location(trail),
            kind.zero(),
            shape,
            &primitive.description,
        )
    }

    /// Flag holding the whole value of a list of primitives
    fn list(&mut self, primitive: &Primitive, trail: &[Step]) -> Result<Binding> {
        let kind = FlagKind::from_primitive(primitive.kind).slice();
        self.bind(
            candidates(&field_names(trail), 1),
            location(trail),
            kind.zero(),
            Shape::List,
            &primitive.description,
        )
    }

    /// Flag selecting list items by their merge key
    fn list_key(
        &mut self,
        items: &SchemaNode,
        merge_key: &str,
        trail: &[Step],
    ) -> Result<Binding> {
        let kind = key_type(self.models, items, merge_key)
            .map_or(FlagKind::String, FlagKind::from_primitive)
            .slice();
        let mut names = field_names(trail);
        let description = format!(
            "{} of the {} items to set",
            merge_key,
            names.last().map(String::as_str).unwrap_or("list")
        );
        names.push(merge_key.to_string());
        self.bind(
            candidates(&names, 2),
            format!("{}[].{}", location(trail), merge_key),
            kind.zero(),
            Shape::Elementwise,
            &description,
        )
    }

    /// Flag naming the map entry to set
    fn map_key(&mut self, trail: &[Step], ctx: Context<'_>) -> Result<Binding> {
        let mut names = field_names(trail);
        let description = format!(
            "Key of the {} entry to set",
            names.last().map(String::as_str).unwrap_or("map")
        );
        names.push("key".to_string());
        let (kind, shape) = if ctx.elementwise {
            (FlagKind::StringSlice, Shape::Elementwise)
        } else {
            (FlagKind::String, Shape::Scalar)
        };
        self.bind(
            candidates(&names, 2),
            format!("{}{{key}}", location(trail)),
            kind.zero(),
            shape,
            &description,
        )
    }

    /// Register a flag under the first free candidate name. A candidate already bound to the same
    /// location is shared instead.
    fn bind(
        &mut self,
        candidates: Vec<String>,
        location: String,
        default: FlagValue,
        shape: Shape,
        description: &str,
    ) -> Result<Binding> {
        let kind = default.kind();
        for name in &candidates {
            if let Some(existing) = self.bindings.get(name) {
                if existing.location == location && existing.kind == kind {
                    return Ok(existing.clone());
                }
                continue;
            }
            let spec = FlagSpec::new(name, default.clone(), description);
            match self.surface.register(spec) {
                Ok(cell) => {
                    let binding = Binding {
                        name: name.clone(),
                        location,
                        shape,
                        kind,
                        cell,
                    };
                    self.bindings.insert(name.clone(), binding.clone());
                    return Ok(binding);
                }
                Err(Error::FlagConflict(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(Error::FlagConflict(
            candidates.last().cloned().unwrap_or(location),
        ))
    }
}

/// Names for a flag, from the shortest to the fully qualified one
fn candidates(names: &[String], min: usize) -> Vec<String> {
    (min.max(1)..=names.len())
        .map(|k| names[names.len() - k..].join("-"))
        .collect()
}

/// Field names and fixed map keys along the trail
fn field_names(trail: &[Step]) -> Vec<String> {
    trail
        .iter()
        .filter_map(|step| match step {
            Step::Field(name) | Step::Entry(Some(name)) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

fn location(trail: &[Step]) -> String {
    trail
        .iter()
        .map(|step| match step {
            Step::Field(name) => format!(".{}", name),
            Step::Item(Some(key)) => format!("[{}]", key),
            Step::Item(None) => "[]".to_string(),
            Step::Entry(Some(key)) => format!("{{{}}}", key),
            Step::Entry(None) => "{}".to_string(),
        })
        .collect()
}

fn trail_path(trail: &[Step]) -> FieldPath {
    FieldPath::new(
        trail
            .iter()
            .filter_map(|step| match step {
                Step::Field(name) => Some(Segment::new(name.clone())),
                Step::Item(Some(key)) | Step::Entry(Some(key)) => {
                    Some(Segment::new(format!("[{}]", key)))
                }
                _ => None,
            })
            .collect(),
    )
}

/// Primitive type of the merge key field of list items
fn key_type(models: &Models, items: &SchemaNode, merge_key: &str) -> Option<PrimitiveType> {
    let SchemaNode::Kind(kind) = models.resolve(items).ok()? else {
        return None;
    };
    match models.resolve(kind.fields.get(merge_key)?).ok()? {
        SchemaNode::Primitive(primitive) => Some(primitive.kind),
        _ => None,
    }
}

/// Bracketed keys are strings, numeric merge keys need a number in the document
fn typed_key(models: &Models, items: &SchemaNode, merge_key: &str, index: &str) -> Value {
    match key_type(models, items, merge_key) {
        Some(PrimitiveType::Integer) => index
            .parse::<i64>()
            .map_or_else(|_| Value::String(index.to_string()), Value::from),
        _ => Value::String(index.to_string()),
    }
}

fn api_version(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.version.clone()
    } else {
        format!("{}/{}", gvk.group, gvk.version)
    }
}

fn node_kind(node: &SchemaNode) -> &'static str {
    match node {
        SchemaNode::Primitive(_) => "primitive",
        SchemaNode::Array(_) => "array",
        SchemaNode::Map(_) => "map",
        SchemaNode::Kind(_) => "object",
        SchemaNode::Reference(_) => "reference",
    }
}

#[cfg(test)]
mod tests {
    use ::clap::Command;
    use serde_json::json;

    use super::*;
    use crate::flags::ClapFlags;

    fn models() -> Models {
        let mut models = Models::new();
        models.insert_definition(
            "Container",
            SchemaNode::object([
                ("name", SchemaNode::string("Name of the container")),
                ("image", SchemaNode::string("Container image name")),
                ("args", SchemaNode::array(SchemaNode::string("Arguments"))),
                (
                    "ports",
                    SchemaNode::merge_array(
                        SchemaNode::object([
                            ("containerPort", SchemaNode::integer("Port number")),
                            ("protocol", SchemaNode::string("Protocol")),
                        ]),
                        "containerPort",
                    ),
                ),
            ]),
        );
        models.insert_definition(
            "Deployment",
            SchemaNode::object([
                ("apiVersion", SchemaNode::string("")),
                ("kind", SchemaNode::string("")),
                (
                    "metadata",
                    SchemaNode::object([
                        ("name", SchemaNode::string("")),
                        ("labels", SchemaNode::map(SchemaNode::string("Labels"))),
                    ]),
                ),
                (
                    "spec",
                    SchemaNode::object([
                        ("replicas", SchemaNode::integer("Number of desired pods")),
                        ("paused", SchemaNode::boolean("Paused")),
                        (
                            "selector",
                            SchemaNode::object([(
                                "matchLabels",
                                SchemaNode::map(SchemaNode::string("")),
                            )]),
                        ),
                        (
                            "strategy",
                            SchemaNode::object([
                                ("type", SchemaNode::string("Type of deployment")),
                                (
                                    "rollingUpdate",
                                    SchemaNode::object([(
                                        "maxSurge",
                                        SchemaNode::string("Maximum surge"),
                                    )]),
                                ),
                            ]),
                        ),
                        (
                            "template",
                            SchemaNode::object([
                                (
                                    "metadata",
                                    SchemaNode::object([(
                                        "labels",
                                        SchemaNode::map(SchemaNode::string("")),
                                    )]),
                                ),
                                (
                                    "spec",
                                    SchemaNode::object([
                                        (
                                            "containers",
                                            SchemaNode::merge_array(
                                                SchemaNode::reference("Container"),
                                                "name",
                                            ),
                                        ),
                                        (
                                            "volumes",
                                            SchemaNode::array(SchemaNode::object([(
                                                "name",
                                                SchemaNode::string(""),
                                            )])),
                                        ),
                                    ]),
                                ),
                            ]),
                        ),
                    ]),
                ),
                ("status", SchemaNode::object([("replicas", SchemaNode::integer(""))])),
            ]),
        );
        models
    }

    fn gvk() -> GroupVersionKind {
        GroupVersionKind::gvk("apps", "v1", "Deployment")
    }

    fn paths(paths: &[&str]) -> Vec<FieldPath> {
        paths.iter().map(|p| p.parse().unwrap()).collect()
    }

    /// Synthesize flags for `field_paths` and parse `args` against them
    fn run(field_paths: &[&str], args: &[&str]) -> Result<(Materializer, Vec<String>)> {
        let models = models();
        let schema = SchemaNode::reference("Deployment");
        let mut flags = ClapFlags::new();
        let materializer = FlagSynthesizer::new(&models, &mut flags).synthesize(
            &gvk(),
            &schema,
            &paths(field_paths),
        )?;
        let matches = flags
            .augment(Command::new("test").no_binary_name(true))
            .try_get_matches_from(args)
            .unwrap();
        flags.apply(&matches)?;
        let names = flags.specs().map(|spec| spec.name.clone()).collect();
        Ok((materializer, names))
    }

    #[test]
    fn test_deployment_image() {
        let (materializer, names) = run(
            &["spec.template.spec.containers.image"],
            &["--containers-name=web", "--image=nginx:1.21", "--name=frontend"],
        )
        .unwrap();
        assert_eq!(names, vec!["name", "namespace", "containers-name", "image"]);

        let document = materializer.materialize().unwrap();
        assert_eq!(
            document,
            json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {"name": "frontend", "namespace": "default"},
                "spec": {"template": {"spec": {"containers": [
                    {"name": "web", "image": "nginx:1.21"}
                ]}}}
            })
        );
        // Materializing again reads the same values
        assert_eq!(materializer.materialize().unwrap(), document);
    }

    #[test]
    fn test_elementwise_values() {
        let (materializer, _) = run(
            &["spec.template.spec.containers.image"],
            &["--containers-name=web,sidecar", "--image=nginx,envoy"],
        )
        .unwrap();
        let document = materializer.materialize().unwrap();
        assert_eq!(
            document["spec"]["template"]["spec"]["containers"],
            json!([
                {"name": "web", "image": "nginx"},
                {"name": "sidecar", "image": "envoy"}
            ])
        );

        // A single value applies to every item
        let (materializer, _) = run(
            &["spec.template.spec.containers.image"],
            &["--containers-name=web,sidecar", "--image=nginx"],
        )
        .unwrap();
        let document = materializer.materialize().unwrap();
        assert_eq!(
            document["spec"]["template"]["spec"]["containers"][1]["image"],
            json!("nginx")
        );

        let (materializer, _) = run(
            &["spec.template.spec.containers.image"],
            &["--containers-name=web,sidecar", "--image=a,b,c"],
        )
        .unwrap();
        assert!(matches!(
            materializer.materialize(),
            Err(Error::ElementCount {
                expected: 2,
                found: 3,
                ..
            })
        ));

        let (materializer, _) = run(
            &["spec.template.spec.containers.image"],
            &["--image=nginx"],
        )
        .unwrap();
        assert!(matches!(
            materializer.materialize(),
            Err(Error::MissingElementKey(_))
        ));
    }

    #[test]
    fn test_fixed_item() {
        let (materializer, names) = run(
            &["spec.template.spec.containers[web].image"],
            &["--image=nginx:1.21"],
        )
        .unwrap();
        assert_eq!(names, vec!["name", "namespace", "image"]);
        assert_eq!(
            materializer.materialize().unwrap()["spec"]["template"]["spec"]["containers"],
            json!([{"name": "web", "image": "nginx:1.21"}])
        );
    }

    #[test]
    fn test_expand_defaults() {
        let (materializer, names) = run(&["spec.strategy"], &[]).unwrap();
        assert_eq!(names, vec!["name", "namespace", "maxSurge", "type"]);
        assert_eq!(
            materializer.materialize().unwrap()["spec"],
            json!({"strategy": {"type": "", "rollingUpdate": {"maxSurge": ""}}})
        );
        // Nothing given, nothing to merge
        assert_eq!(
            materializer.materialize_changed().unwrap(),
            json!({"apiVersion": "apps/v1", "kind": "Deployment"})
        );
    }

    #[test]
    fn test_expand_skips() {
        let (materializer, names) = run(&["spec"], &["--replicas=3"]).unwrap();
        // Lists of objects without values and maps are not expanded
        assert!(!names.iter().any(|n| n.contains("volumes")));
        assert!(!names.iter().any(|n| n.contains("matchLabels")));
        assert!(names.contains(&"replicas".to_string()));
        assert!(names.contains(&"paused".to_string()));
        let document = materializer.materialize_changed().unwrap();
        assert_eq!(document["spec"], json!({"replicas": 3}));
    }

    #[test]
    fn test_blacklist() {
        // Expansion outside of the whitelist yields nothing
        let (materializer, names) = run(&["metadata"], &[]).unwrap();
        assert_eq!(names, vec!["name", "namespace"]);
        assert_eq!(
            materializer.materialize().unwrap(),
            json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"namespace": "default"}})
        );

        assert!(matches!(
            run(&["status.replicas"], &[]),
            Err(Error::BlacklistedField { .. })
        ));

        // Expansion never descends into identity fields
        let models = models();
        let schema = SchemaNode::reference("Deployment");
        let mut flags = ClapFlags::new();
        let mut synth = FlagSynthesizer::new(&models, &mut flags).with_expand_roots(["spec", "status"]);
        synth
            .synthesize(&gvk(), &schema, &paths(&["spec.template"]))
            .unwrap();
        assert!(synth
            .bindings()
            .all(|b| b.name == "name" || b.name == "namespace" || !b.location.contains("metadata")));
    }

    #[test]
    fn test_map_flags() {
        let (materializer, names) = run(
            &["spec.selector.matchLabels"],
            &["--matchLabels-key=app", "--matchLabels=web"],
        )
        .unwrap();
        assert_eq!(names, vec!["name", "namespace", "matchLabels", "matchLabels-key"]);
        assert_eq!(
            materializer.materialize().unwrap()["spec"],
            json!({"selector": {"matchLabels": {"app": "web"}}})
        );

        let (materializer, names) = run(&["metadata.labels[tier]"], &["--tier=frontend"]).unwrap();
        assert_eq!(names, vec!["name", "namespace", "tier"]);
        assert_eq!(
            materializer.materialize().unwrap()["metadata"],
            json!({"labels": {"tier": "frontend"}, "namespace": "default"})
        );
    }

    #[test]
    fn test_name_reuse() {
        let (materializer, names) = run(&["metadata.name"], &["--name=web"]).unwrap();
        assert_eq!(names, vec!["name", "namespace"]);
        assert_eq!(materializer.materialize().unwrap()["metadata"]["name"], json!("web"));
    }

    #[test]
    fn test_collision() {
        // Both fields would be `image` unqualified
        let mut models = Models::new();
        models.insert_definition(
            "Widget",
            SchemaNode::object([
                (
                    "spec",
                    SchemaNode::object([
                        ("image", SchemaNode::string("")),
                        ("sidecar", SchemaNode::object([("image", SchemaNode::string(""))])),
                    ]),
                ),
            ]),
        );
        let schema = SchemaNode::reference("Widget");
        let mut flags = ClapFlags::new();
        let mut synth = FlagSynthesizer::new(&models, &mut flags);
        synth
            .synthesize(
                &GroupVersionKind::gvk("example.io", "v1", "Widget"),
                &schema,
                &paths(&["spec"]),
            )
            .unwrap();
        let bindings: Vec<_> = synth.bindings().cloned().collect();
        let image = bindings.iter().find(|b| b.name == "image").unwrap();
        let sidecar = bindings.iter().find(|b| b.name == "sidecar-image").unwrap();
        assert_eq!(image.location, ".spec.image");
        assert_eq!(sidecar.location, ".spec.sidecar.image");
        assert!(!image.cell.ptr_eq(&sidecar.cell));
    }

    #[test]
    fn test_multiple_paths() {
        let (materializer, names) = run(
            &[
                "spec.template.spec.containers.image",
                "spec.template.spec.containers.args",
            ],
            &["--containers-name=web", "--image=nginx", "--args=-v,--debug"],
        )
        .unwrap();
        assert_eq!(
            names,
            vec!["name", "namespace", "containers-name", "image", "args"]
        );
        assert_eq!(
            materializer.materialize().unwrap()["spec"]["template"]["spec"]["containers"],
            json!([{"name": "web", "image": "nginx", "args": ["-v", "--debug"]}])
        );
    }

    #[test]
    fn test_nested_lists() {
        let (materializer, names) = run(
            &["spec.template.spec.containers.ports"],
            &[
                "--containers-name=web,sidecar",
                "--ports-containerPort=80,9090",
                "--protocol=TCP",
            ],
        )
        .unwrap();
        assert!(names.contains(&"ports-containerPort".to_string()));
        assert_eq!(
            materializer.materialize().unwrap()["spec"]["template"]["spec"]["containers"],
            json!([
                {"name": "web", "ports": [{"containerPort": 80, "protocol": "TCP"}]},
                {"name": "sidecar", "ports": [{"containerPort": 9090, "protocol": "TCP"}]}
            ])
        );
    }

    #[test]
    fn test_nested_list_below_single_item() {
        let (materializer, _) = run(
            &["spec.template.spec.containers.ports"],
            &[
                "--containers-name=web",
                "--ports-containerPort=80,443",
                "--protocol=TCP",
            ],
        )
        .unwrap();
        assert_eq!(
            materializer.materialize().unwrap()["spec"]["template"]["spec"]["containers"],
            json!([
                {"name": "web", "ports": [
                    {"containerPort": 80, "protocol": "TCP"},
                    {"containerPort": 443, "protocol": "TCP"}
                ]}
            ])
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            run(&["spec.template.spec.volumes.name"], &[]),
            Err(Error::UnmergeableList { .. })
        ));
        assert!(matches!(
            run(&["spec.revisionHistoryLimit"], &[]),
            Err(Error::FieldNotFound { .. })
        ));
        assert!(matches!(
            run(&["spec.replicas.value"], &[]),
            Err(Error::PathBeyondPrimitive { .. })
        ));
    }
}
