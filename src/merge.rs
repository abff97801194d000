//! Schema-aware merge of a locally built fragment onto a live object

use serde_json::Value;

use crate::{
    error::Result,
    locator::scalar_to_string,
    schema::{Models, SchemaNode},
};

/// Merge `local` onto `live`.
///
/// Objects and maps merge key by key. Lists with a merge key merge item by item, items not
/// present in `live` are appended. Everything else in `local` replaces the live value.
/// `apiVersion` and `kind` are always those of `live`.
pub fn merge(models: &Models, schema: &SchemaNode, local: &Value, live: &Value) -> Result<Value> {
    let mut merged = merge_value(models, Some(schema), local.clone(), live.clone())?;
    if let (Value::Object(merged), Value::Object(live)) = (&mut merged, live) {
        for field in ["apiVersion", "kind"] {
            if let Some(value) = live.get(field) {
                merged.insert(field.to_string(), value.clone());
            }
        }
    }
    Ok(merged)
}

fn merge_value(
    models: &Models,
    schema: Option<&SchemaNode>,
    local: Value,
    live: Value,
) -> Result<Value> {
    let schema = match schema {
        Some(schema) => Some(models.resolve(schema)?),
        None => None,
    };
    match (local, live) {
        (Value::Null, live) => Ok(live),
        (Value::Object(local), Value::Object(mut live)) => {
            for (key, value) in local {
                let field = match schema {
                    Some(SchemaNode::Kind(kind)) => kind.fields.get(&key),
                    Some(SchemaNode::Map(map)) => Some(map.value.as_ref()),
                    _ => None,
                };
                let existing = live.remove(&key).unwrap_or(Value::Null);
                live.insert(key, merge_value(models, field, value, existing)?);
            }
            Ok(Value::Object(live))
        }
        (Value::Array(local), Value::Array(mut live)) => {
            let Some(SchemaNode::Array(array)) = schema else {
                return Ok(Value::Array(local));
            };
            let Ok(merge_key) = array.merge_key(&[]) else {
                return Ok(Value::Array(local));
            };
            for item in local {
                let position = item_key(&item, merge_key).and_then(|key| {
                    live.iter()
                        .position(|i| item_key(i, merge_key).as_ref() == Some(&key))
                });
                match position {
                    Some(i) => {
                        let existing = std::mem::take(&mut live[i]);
                        live[i] = merge_value(models, Some(&array.items), item, existing)?;
                    }
                    None => live.push(item),
                }
            }
            Ok(Value::Array(live))
        }
        (local, _) => Ok(local),
    }
}

fn item_key(item: &Value, merge_key: &str) -> Option<String> {
    match item {
        Value::Object(object) => object.get(merge_key).map(scalar_to_string),
        Value::Null => None,
        scalar => Some(scalar_to_string(scalar)),
    }
}
