//! Running a field command against documents

use std::{
    fs,
    io::{self, Read},
};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;

use super::FieldCommand;
use crate::{fields::Verb, locator::FieldLocator, merge::merge, output::Outcome, schema::Models};

/// Read every YAML or JSON document of the given files, `-` being stdin
pub fn read_documents(filenames: &[String]) -> Result<Vec<Value>> {
    let mut documents = Vec::new();
    for filename in filenames {
        let reader: Box<dyn Read> = if filename == "-" {
            Box::new(io::stdin())
        } else {
            Box::new(
                fs::File::open(filename)
                    .with_context(|| format!("failed to open file {}", filename))?,
            )
        };
        documents.extend(
            parse_documents(reader).with_context(|| format!("failed to read {}", filename))?,
        );
    }
    Ok(documents)
}

fn parse_documents<R: Read>(reader: R) -> Result<Vec<Value>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_reader(reader) {
        let value = serde_yaml::Value::deserialize(document)
            .context("failed to deserialize document")?;
        let value: Value =
            serde_yaml::from_value(value).context("failed to convert document to JSON")?;
        // Empty documents between separators
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

impl FieldCommand {
    /// Whether `document` is an object of this command's kind. Documents without a kind are
    /// assumed to be.
    fn accepts(&self, document: &Value) -> bool {
        document
            .get("kind")
            .and_then(Value::as_str)
            .map_or(true, |kind| kind == self.resource.api.kind)
    }

    pub fn run(
        &self,
        models: &Models,
        documents: Vec<Value>,
        prefix: Option<&str>,
    ) -> Result<Vec<Outcome>> {
        let schema = self
            .resource
            .schema(models)
            .ok_or_else(|| anyhow!("no schema for {}", self.resource.definition))?;
        let locator = FieldLocator::new(models, schema);

        match self.verb {
            Verb::Patch => Ok(vec![Outcome::new(self.materializer.materialize()?)]),
            Verb::Set if documents.is_empty() => {
                Ok(vec![Outcome::new(self.materializer.materialize()?)])
            }
            Verb::Set => {
                let local = self.materializer.materialize_changed()?;
                documents
                    .into_iter()
                    .map(|document| {
                        if !self.accepts(&document) {
                            return Ok(Outcome::derived(document.clone(), document));
                        }
                        let merged = merge(models, schema, &local, &document)?;
                        Ok(Outcome::derived(document, merged))
                    })
                    .collect()
            }
            Verb::Get => {
                let mut outcomes = Vec::new();
                for document in documents.iter().filter(|document| self.accepts(document)) {
                    let mut values = Vec::new();
                    for path in &self.paths {
                        values.extend(locator.get(path, document)?);
                    }
                    let value = match values.len() {
                        1 => values.remove(0),
                        _ => Value::Array(values),
                    };
                    outcomes.push(Outcome::new(value));
                }
                Ok(outcomes)
            }
            Verb::Clear | Verb::Prefix => {
                let prefix = match (self.verb, prefix) {
                    (Verb::Prefix, Some(prefix)) => Some(prefix),
                    (Verb::Prefix, None) => return Err(anyhow!("no prefix given")),
                    _ => None,
                };
                let mut outcomes = Vec::new();
                for document in documents {
                    let mut result = document.clone();
                    if self.accepts(&document) {
                        for path in &self.paths {
                            locator
                                .field(path, &mut result, |value, _| match prefix {
                                    None => Value::Null,
                                    Some(prefix) => prefixed(prefix, value),
                                })
                                .with_context(|| format!("failed to update `{}`", path))?;
                        }
                    }
                    outcomes.push(Outcome::derived(document, result));
                }
                Ok(outcomes)
            }
        }
    }
}

/// Put `prefix` in front of a scalar's text. An absent value becomes the bare prefix.
fn prefixed(prefix: &str, value: Value) -> Value {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    };
    Value::String(format!("{}{}", prefix, text))
}
