//! Loader for Swagger 2.0 documents as served by the API server at `/openapi/v2`

use std::{collections::BTreeMap, fs, path::Path};

use kube::core::GroupVersionKind;
use serde::Deserialize;

use super::{Array, Kind, Map, Models, Primitive, PrimitiveType, SchemaNode};

const DEFINITIONS_PREFIX: &str = "#/definitions/";

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read OpenAPI document: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to parse OpenAPI document as JSON: {0}")]
    ParseJson(#[source] serde_json::Error),
    #[error("failed to parse OpenAPI document as YAML: {0}")]
    ParseYaml(#[source] serde_yaml::Error),
    #[error("definition `{0}`: array has no items schema")]
    MissingItems(String),
    #[error("definition `{definition}`: unsupported type `{type_name}`")]
    UnsupportedType {
        definition: String,
        type_name: String,
    },
    #[error("definition `{definition}`: unsupported reference `{reference}`")]
    UnsupportedReference {
        definition: String,
        reference: String,
    },
}

#[derive(Deserialize, Debug)]
struct Document {
    #[serde(default)]
    definitions: BTreeMap<String, RawSchema>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<RawSchema>),
}

#[derive(Deserialize, Debug)]
struct RawGroupVersionKind {
    #[serde(default)]
    group: String,
    version: String,
    kind: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct RawSchema {
    #[serde(rename = "$ref")]
    reference: Option<String>,
    #[serde(rename = "type")]
    type_name: Option<String>,
    format: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    properties: BTreeMap<String, RawSchema>,
    items: Option<Box<RawSchema>>,
    additional_properties: Option<AdditionalProperties>,
    #[serde(default)]
    all_of: Vec<RawSchema>,
    #[serde(rename = "x-kubernetes-group-version-kind", default)]
    group_version_kind: Vec<RawGroupVersionKind>,
    /// Everything else, including vendor extensions
    #[serde(flatten)]
    other: BTreeMap<String, serde_json::Value>,
}

/// Parse a Swagger document given as JSON or YAML
pub fn parse(text: &str) -> Result<Models, LoadError> {
    let document: Document = if text.trim_start().starts_with('{') {
        serde_json::from_str(text).map_err(LoadError::ParseJson)?
    } else {
        serde_yaml::from_str(text).map_err(LoadError::ParseYaml)?
    };
    build_models(document)
}

pub fn from_path(path: &Path) -> Result<Models, LoadError> {
    let text = fs::read_to_string(path).map_err(LoadError::Read)?;
    parse(&text)
}

fn build_models(document: Document) -> Result<Models, LoadError> {
    let mut models = Models::new();
    for (name, mut raw) in document.definitions {
        for gvk in std::mem::take(&mut raw.group_version_kind) {
            models.register_resource(
                &GroupVersionKind::gvk(&gvk.group, &gvk.version, &gvk.kind),
                name.clone(),
            );
        }
        let mut node = convert(&name, raw)?;
        if let SchemaNode::Kind(kind) = &mut node {
            kind.name = Some(name.clone());
        }
        models.insert_definition(name, node);
    }
    tracing::info!(
        definitions = models.definitions_len(),
        resources = models.resources().count(),
        "loaded OpenAPI models"
    );
    Ok(models)
}

fn convert(definition: &str, mut raw: RawSchema) -> Result<SchemaNode, LoadError> {
    if let Some(reference) = raw.reference {
        return reference
            .strip_prefix(DEFINITIONS_PREFIX)
            .map(SchemaNode::reference)
            .ok_or_else(|| LoadError::UnsupportedReference {
                definition: definition.to_string(),
                reference: reference.clone(),
            });
    }
    // `allOf` with a single member is how newer documents attach a description to a `$ref`
    if raw.all_of.len() == 1 && raw.type_name.is_none() && raw.properties.is_empty() {
        if let Some(inner) = raw.all_of.pop() {
            return convert(definition, inner);
        }
    }

    let description = raw.description;
    let primitive = |kind| {
        SchemaNode::Primitive(Primitive {
            kind,
            format: raw.format.clone(),
            description: description.clone(),
        })
    };

    let node = match raw.type_name.as_deref() {
        Some("integer") => primitive(PrimitiveType::Integer),
        Some("number") => primitive(PrimitiveType::Number),
        Some("boolean") => primitive(PrimitiveType::Boolean),
        Some("string") => primitive(PrimitiveType::String),
        Some("array") => {
            let items = raw
                .items
                .ok_or_else(|| LoadError::MissingItems(definition.to_string()))?;
            let extensions = raw
                .other
                .into_iter()
                .filter(|(key, _)| key.starts_with("x-"))
                .collect();
            SchemaNode::Array(Array {
                items: Box::new(convert(definition, *items)?),
                description,
                extensions,
            })
        }
        Some("object") | None => {
            if !raw.properties.is_empty() {
                let fields = raw
                    .properties
                    .into_iter()
                    .map(|(field, schema)| Ok((field, convert(definition, schema)?)))
                    .collect::<Result<_, LoadError>>()?;
                SchemaNode::Kind(Kind {
                    name: None,
                    description,
                    fields,
                })
            } else if let Some(AdditionalProperties::Schema(value)) = raw.additional_properties {
                SchemaNode::Map(Map {
                    value: Box::new(convert(definition, *value)?),
                    description,
                })
            } else {
                // Free-form object without declared fields
                SchemaNode::Kind(Kind {
                    name: None,
                    description,
                    fields: BTreeMap::new(),
                })
            }
        }
        Some(other) => {
            return Err(LoadError::UnsupportedType {
                definition: definition.to_string(),
                type_name: other.to_string(),
            })
        }
    };
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaProvider;

    const DOCUMENT: &str = r##"{
  "swagger": "2.0",
  "definitions": {
    "io.k8s.api.apps.v1.Deployment": {
      "description": "Deployment enables declarative updates for Pods and ReplicaSets.",
      "type": "object",
      "properties": {
        "apiVersion": {"type": "string"},
        "kind": {"type": "string"},
        "metadata": {"$ref": "#/definitions/io.k8s.apimachinery.pkg.apis.meta.v1.ObjectMeta"},
        "spec": {"$ref": "#/definitions/io.k8s.api.apps.v1.DeploymentSpec"}
      },
      "x-kubernetes-group-version-kind": [{"group": "apps", "kind": "Deployment", "version": "v1"}]
    },
    "io.k8s.api.apps.v1.DeploymentSpec": {
      "properties": {
        "replicas": {"type": "integer", "format": "int32", "description": "Number of desired pods."},
        "containers": {
          "type": "array",
          "items": {"$ref": "#/definitions/io.k8s.api.core.v1.Container"},
          "x-kubernetes-patch-merge-key": "name",
          "x-kubernetes-patch-strategy": "merge"
        },
        "paused": {"allOf": [{"type": "boolean"}], "description": "Indicates that the deployment is paused."}
      }
    },
    "io.k8s.api.core.v1.Container": {
      "type": "object",
      "properties": {
        "name": {"type": "string"},
        "image": {"type": "string"}
      }
    },
    "io.k8s.apimachinery.pkg.apis.meta.v1.ObjectMeta": {
      "type": "object",
      "properties": {
        "labels": {"type": "object", "additionalProperties": {"type": "string"}},
        "name": {"type": "string"}
      }
    }
  }
}"##;

    #[test]
    fn test_parse_document() {
        let models = parse(DOCUMENT).unwrap();
        let gvk = GroupVersionKind::gvk("apps", "v1", "Deployment");
        let deployment = models.lookup_resource(&gvk).unwrap();
        let SchemaNode::Kind(deployment) = deployment else {
            panic!("expected object, got {:?}", deployment);
        };
        assert_eq!(
            deployment.name.as_deref(),
            Some("io.k8s.api.apps.v1.Deployment")
        );
        assert_eq!(
            deployment.fields["spec"],
            SchemaNode::reference("io.k8s.api.apps.v1.DeploymentSpec")
        );

        let SchemaNode::Kind(spec) = models.resolve(&deployment.fields["spec"]).unwrap() else {
            panic!("expected object");
        };
        let SchemaNode::Array(containers) = &spec.fields["containers"] else {
            panic!("expected array");
        };
        assert_eq!(containers.merge_key(&[]).unwrap(), "name");
        assert!(matches!(
            spec.fields["replicas"],
            SchemaNode::Primitive(Primitive {
                kind: PrimitiveType::Integer,
                ..
            })
        ));
        assert!(matches!(
            spec.fields["paused"],
            SchemaNode::Primitive(Primitive {
                kind: PrimitiveType::Boolean,
                ..
            })
        ));

        let SchemaNode::Kind(meta) = models
            .definition("io.k8s.apimachinery.pkg.apis.meta.v1.ObjectMeta")
            .unwrap()
        else {
            panic!("expected object");
        };
        assert!(matches!(meta.fields["labels"], SchemaNode::Map(_)));
    }

    #[test]
    fn test_parse_yaml_document() {
        let models = parse(
            r#"
definitions:
  io.example.v1.Widget:
    type: object
    properties:
      spec:
        type: object
        properties:
          size:
            type: integer
    x-kubernetes-group-version-kind:
      - group: example.io
        version: v1
        kind: Widget
"#,
        )
        .unwrap();
        assert!(models
            .lookup_resource(&GroupVersionKind::gvk("example.io", "v1", "Widget"))
            .is_some());
    }

    #[test]
    fn test_parse_errors() {
        let err = parse(r#"{"definitions": {"a": {"type": "array"}}}"#).unwrap_err();
        assert!(matches!(err, LoadError::MissingItems(_)));
        let err = parse(r#"{"definitions": {"a": {"type": "tuple"}}}"#).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedType { .. }));
        let err = parse(r#"{"definitions": {"a": {"$ref": "other.json#/a"}}}"#).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedReference { .. }));
    }
}
