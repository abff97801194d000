//! Named fields that commands are generated for

use std::{collections::BTreeSet, fmt, fs, path::Path};

use serde::Deserialize;

use crate::path::FieldPath;

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read field definitions: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to parse field definitions: {0}")]
    Parse(#[source] serde_yaml::Error),
    #[error("field `{0}` is defined more than once")]
    Duplicate(String),
    #[error("field `{0}` has no paths")]
    NoPaths(String),
}

/// What a generated command does with its field
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Set,
    Patch,
    Get,
    Clear,
    Prefix,
}

impl Verb {
    pub const ALL: [Verb; 5] = [Verb::Set, Verb::Patch, Verb::Get, Verb::Clear, Verb::Prefix];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Set => "set",
            Verb::Patch => "patch",
            Verb::Get => "get",
            Verb::Clear => "clear",
            Verb::Prefix => "prefix",
        }
    }

    pub fn about(&self) -> &'static str {
        match self {
            Verb::Set => "Set fields of resources from flags",
            Verb::Patch => "Print a patch built from flags",
            Verb::Get => "Print fields of resources",
            Verb::Clear => "Remove fields from resources",
            Verb::Prefix => "Prefix fields of resources with a value",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FieldDefinition {
    /// Name of the generated command
    pub name: String,
    /// Locations of the field, in order of preference
    #[serde(alias = "path")]
    pub paths: Vec<FieldPath>,
    /// Verbs the field is offered for, all of them when empty
    #[serde(default)]
    pub verbs: BTreeSet<Verb>,
}

impl FieldDefinition {
    fn new(name: &str, path: &str, verbs: &[Verb]) -> Self {
        Self {
            name: name.to_string(),
            paths: vec![path.split('.').collect()],
            verbs: verbs.iter().copied().collect(),
        }
    }

    pub fn supports(&self, verb: Verb) -> bool {
        self.verbs.is_empty() || self.verbs.contains(&verb)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldTable {
    definitions: Vec<FieldDefinition>,
}

impl FieldTable {
    pub fn builtin() -> Self {
        use Verb::*;

        const EDIT: &[Verb] = &[Set, Patch, Get, Clear];
        let container = |field: &str| format!("spec.template.spec.containers.{}", field);
        Self {
            definitions: vec![
                FieldDefinition::new("container-labels", "spec.template.metadata.labels", EDIT),
                FieldDefinition::new("cpu-limits", &container("resources.limits.cpu"), EDIT),
                FieldDefinition::new("cpu-requests", &container("resources.requests.cpu"), EDIT),
                FieldDefinition::new("env", &container("env"), EDIT),
                FieldDefinition::new("image", &container("image"), &Verb::ALL),
                FieldDefinition::new("labels", "metadata.labels", EDIT),
                FieldDefinition::new("memory-limits", &container("resources.limits.memory"), EDIT),
                FieldDefinition::new(
                    "memory-requests",
                    &container("resources.requests.memory"),
                    EDIT,
                ),
                FieldDefinition::new("ports", &container("ports"), EDIT),
                FieldDefinition::new("replicas", "spec.replicas", EDIT),
                FieldDefinition::new("selector", "spec.selector.matchLabels", EDIT),
                FieldDefinition::new("name", "metadata.name", &Verb::ALL),
            ],
        }
    }

    /// Parse definitions from a YAML list
    pub fn from_yaml(text: &str) -> Result<Self, LoadError> {
        let definitions: Vec<FieldDefinition> =
            serde_yaml::from_str(text).map_err(LoadError::Parse)?;
        let mut seen = BTreeSet::new();
        for definition in &definitions {
            if !seen.insert(definition.name.as_str()) {
                return Err(LoadError::Duplicate(definition.name.clone()));
            }
            if definition.paths.is_empty() {
                return Err(LoadError::NoPaths(definition.name.clone()));
            }
        }
        Ok(Self { definitions })
    }

    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let text = fs::read_to_string(path).map_err(LoadError::Read)?;
        Self::from_yaml(&text)
    }

    pub fn for_verb(&self, verb: Verb) -> impl Iterator<Item = &FieldDefinition> {
        self.definitions
            .iter()
            .filter(move |definition| definition.supports(verb))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.definitions.iter()
    }
}
