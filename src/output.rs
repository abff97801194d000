//! Printing command results

use std::{fs, io::Write, path::Path};

use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to serialize YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to write output: {0}")]
    Write(#[from] std::io::Error),
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
    /// JSON Patch from the input document to the result
    Patch,
}

/// A document produced by a command, with the document it was derived from
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    pub before: Option<Value>,
    pub after: Value,
}

impl Outcome {
    pub fn new(after: Value) -> Self {
        Self {
            before: None,
            after,
        }
    }

    pub fn derived(before: Value, after: Value) -> Self {
        Self {
            before: Some(before),
            after,
        }
    }
}

pub fn render(format: OutputFormat, outcomes: &[Outcome]) -> Result<String, Error> {
    let mut out = String::new();
    for (i, outcome) in outcomes.iter().enumerate() {
        match format {
            OutputFormat::Yaml => {
                if i > 0 {
                    out.push_str("---\n");
                }
                out.push_str(&serde_yaml::to_string(&outcome.after)?);
            }
            OutputFormat::Json => {
                out.push_str(&serde_json::to_string_pretty(&outcome.after)?);
                out.push('\n');
            }
            OutputFormat::Patch => {
                let rendered = match &outcome.before {
                    Some(before) => serde_json::to_string(&json_patch::diff(before, &outcome.after))?,
                    None => serde_json::to_string(&outcome.after)?,
                };
                out.push_str(&rendered);
                out.push('\n');
            }
        }
    }
    Ok(out)
}

/// Write rendered outcomes to `destination`, or stdout when there is none
pub fn write(
    format: OutputFormat,
    destination: Option<&Path>,
    outcomes: &[Outcome],
) -> Result<(), Error> {
    let rendered = render(format, outcomes)?;
    match destination {
        Some(path) => fs::write(path, rendered)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_render_yaml() {
        let rendered = render(
            OutputFormat::Yaml,
            &[
                Outcome::new(json!({"kind": "Deployment"})),
                Outcome::new(json!({"kind": "Service"})),
            ],
        )
        .unwrap();
        assert_eq!(rendered, "kind: Deployment\n---\nkind: Service\n");
    }

    #[test]
    fn test_render_patch() {
        let rendered = render(
            OutputFormat::Patch,
            &[
                Outcome::derived(json!({"spec": {"replicas": 1}}), json!({"spec": {"replicas": 3}})),
                Outcome::new(json!({"spec": {"replicas": 2}})),
            ],
        )
        .unwrap();
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(
            serde_json::from_str::<Value>(lines[0]).unwrap(),
            json!([{"op": "replace", "path": "/spec/replicas", "value": 3}])
        );
        assert_eq!(lines[1], r#"{"spec":{"replicas":2}}"#);
    }

    #[test]
    fn test_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write(
            OutputFormat::Json,
            Some(&path),
            &[Outcome::new(json!({"a": 1}))],
        )
        .unwrap();
        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"a": 1}));
    }
}
