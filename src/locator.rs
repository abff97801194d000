//! Locating values inside documents by walking their schema

use serde_json::Value;

use crate::{
    error::{Error, Result},
    path::{FieldPath, Segment},
    schema::{Models, SchemaNode},
};

/// Reads and rewrites values at a [`FieldPath`] inside documents shaped like one schema.
///
/// Objects consume one path segment naming a declared field. Maps consume one segment naming
/// the key (`key` or `[key]`). Lists consume a segment only when it is a bracketed index, which
/// selects the item whose merge key equals the index; with a bare segment the rest of the path
/// is applied to every item.
#[derive(Clone, Copy)]
pub struct FieldLocator<'a> {
    models: &'a Models,
    schema: &'a SchemaNode,
}

impl<'a> FieldLocator<'a> {
    pub fn new(models: &'a Models, schema: &'a SchemaNode) -> Self {
        Self { models, schema }
    }

    /// Whether `path` names a location in the schema. Never fails, unresolvable paths are
    /// simply not found.
    pub fn has_field(&self, path: &FieldPath) -> bool {
        self.validate(self.schema, path.segments(), 0).is_ok()
    }

    /// Walk `document` along `path` and replace the value found there with the output of
    /// `transform`. Missing objects on the way are created; a `null` output removes the value.
    pub fn field<F>(&self, path: &FieldPath, document: &mut Value, mut transform: F) -> Result<()>
    where
        F: FnMut(Value, &SchemaNode) -> Value,
    {
        let segments = path.segments();
        self.validate(self.schema, segments, 0)?;
        self.walk(self.schema, segments, 0, document, &mut transform)
    }

    pub fn set_field(&self, path: &FieldPath, document: &mut Value, value: Value) -> Result<()> {
        self.field(path, document, |_, _| value.clone())
    }

    /// All non-null values at `path`. Bulk access through lists yields one value per item.
    pub fn get(&self, path: &FieldPath, document: &Value) -> Result<Vec<Value>> {
        let mut scratch = document.clone();
        let mut found = Vec::new();
        self.field(path, &mut scratch, |value, _| {
            if !value.is_null() {
                found.push(value.clone());
            }
            value
        })?;
        Ok(found)
    }

    /// Check the path against the schema alone
    fn validate(&self, node: &SchemaNode, path: &[Segment], pos: usize) -> Result<()> {
        let node = self.models.resolve(node)?;
        let Some(segment) = path.get(pos) else {
            return Ok(());
        };
        match node {
            SchemaNode::Primitive(_) => Err(Error::PathBeyondPrimitive {
                path: path[..pos].into(),
                remaining: path[pos..].into(),
            }),
            SchemaNode::Kind(kind) => {
                let field = kind
                    .fields
                    .get(segment.as_str())
                    .ok_or_else(|| Error::FieldNotFound {
                        field: segment.to_string(),
                        schema: node.type_name(),
                        path: path[..=pos].into(),
                    })?;
                self.validate(field, path, pos + 1)
            }
            SchemaNode::Array(array) => match segment.index()? {
                Some(_) => {
                    array.merge_key(&path[..=pos])?;
                    self.validate(&array.items, path, pos + 1)
                }
                // Lists do not eat a path element
                None => self.validate(&array.items, path, pos),
            },
            SchemaNode::Map(map) => {
                segment.key()?;
                self.validate(&map.value, path, pos + 1)
            }
            SchemaNode::Reference(name) => Err(Error::UnresolvedReference(name.clone())),
        }
    }

    fn walk<F>(
        &self,
        node: &SchemaNode,
        path: &[Segment],
        pos: usize,
        cursor: &mut Value,
        transform: &mut F,
    ) -> Result<()>
    where
        F: FnMut(Value, &SchemaNode) -> Value,
    {
        let node = self.models.resolve(node)?;
        let Some(segment) = path.get(pos) else {
            *cursor = transform(cursor.take(), node);
            return Ok(());
        };
        match node {
            SchemaNode::Primitive(_) => Err(Error::PathBeyondPrimitive {
                path: path[..pos].into(),
                remaining: path[pos..].into(),
            }),
            SchemaNode::Kind(kind) => {
                let name = segment.as_str();
                let field = kind.fields.get(name).ok_or_else(|| Error::FieldNotFound {
                    field: name.to_string(),
                    schema: node.type_name(),
                    path: path[..=pos].into(),
                })?;
                self.walk_entry(field, name, path, pos, cursor, transform)
            }
            SchemaNode::Map(map) => {
                let key = segment.key()?;
                self.walk_entry(&map.value, key, path, pos, cursor, transform)
            }
            SchemaNode::Array(array) => match segment.index()? {
                Some(index) => {
                    let merge_key = array.merge_key(&path[..=pos])?;
                    let list = as_array(cursor, &path[..pos])?;
                    match list
                        .iter()
                        .position(|item| item_matches(item, merge_key, index))
                    {
                        Some(i) => {
                            self.walk(&array.items, path, pos + 1, &mut list[i], transform)?;
                            if list[i].is_null() {
                                list.remove(i);
                            }
                        }
                        None => {
                            let mut item = Value::Null;
                            self.walk(&array.items, path, pos + 1, &mut item, transform)?;
                            if !item.is_null() {
                                if let Value::Object(object) = &mut item {
                                    object
                                        .entry(merge_key)
                                        .or_insert_with(|| Value::String(index.to_string()));
                                }
                                list.push(item);
                            }
                        }
                    }
                    Ok(())
                }
                None => match cursor {
                    Value::Null => Ok(()),
                    Value::Array(list) => {
                        for item in list.iter_mut() {
                            self.walk(&array.items, path, pos, item, transform)?;
                        }
                        list.retain(|item| !item.is_null());
                        Ok(())
                    }
                    other => Err(Error::TypeMismatch {
                        path: path[..pos].into(),
                        expected: "array",
                        found: type_name(other),
                    }),
                },
            },
            SchemaNode::Reference(name) => Err(Error::UnresolvedReference(name.clone())),
        }
    }

    /// Descend into `cursor[key]`, dropping the entry again if nothing ends up there
    fn walk_entry<F>(
        &self,
        node: &SchemaNode,
        key: &str,
        path: &[Segment],
        pos: usize,
        cursor: &mut Value,
        transform: &mut F,
    ) -> Result<()>
    where
        F: FnMut(Value, &SchemaNode) -> Value,
    {
        let was_null = cursor.is_null();
        let object = as_object(cursor, &path[..pos])?;
        let entry = object.entry(key).or_insert(Value::Null);
        self.walk(node, path, pos + 1, entry, transform)?;
        if entry.is_null() {
            object.remove(key);
        }
        if was_null && object.is_empty() {
            *cursor = Value::Null;
        }
        Ok(())
    }
}

fn as_object<'v>(
    cursor: &'v mut Value,
    path: &[Segment],
) -> Result<&'v mut serde_json::Map<String, Value>> {
    if cursor.is_null() {
        *cursor = Value::Object(Default::default());
    }
    match cursor {
        Value::Object(object) => Ok(object),
        other => Err(Error::TypeMismatch {
            path: path.into(),
            expected: "object",
            found: type_name(other),
        }),
    }
}

fn as_array<'v>(cursor: &'v mut Value, path: &[Segment]) -> Result<&'v mut Vec<Value>> {
    if cursor.is_null() {
        *cursor = Value::Array(Vec::new());
    }
    match cursor {
        Value::Array(list) => Ok(list),
        other => Err(Error::TypeMismatch {
            path: path.into(),
            expected: "array",
            found: type_name(other),
        }),
    }
}

/// Items that are objects match on their merge key, scalar items on their own value
fn item_matches(item: &Value, merge_key: &str, index: &str) -> bool {
    match item {
        Value::Object(object) => object
            .get(merge_key)
            .map_or(false, |value| scalar_to_string(value) == index),
        value => scalar_to_string(value) == index,
    }
}

pub(crate) fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        value => value.to_string(),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
