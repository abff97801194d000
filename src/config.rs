use std::{borrow::Cow, collections::BTreeSet, path::PathBuf};

use serde::{Deserialize, Deserializer};

fn default_expand_roots() -> BTreeSet<String> {
    BTreeSet::from(["spec".to_string()])
}

fn deserialize_comma_list<'de, D>(d: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Cow::<'_, str>::deserialize(d)?;
    Ok(s.split(',')
        .map(str::trim)
        .filter(|root| !root.is_empty())
        .map(str::to_string)
        .collect())
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Swagger document to read schemas from instead of asking the cluster
    pub openapi_path: Option<PathBuf>,
    /// YAML file of field definitions replacing the built-in table
    pub fields_path: Option<PathBuf>,

    /// Only generate commands for resources of this API group
    pub api_group: Option<String>,
    /// Only generate commands for resources of this API version
    pub api_version: Option<String>,

    /// Top-level fields whose objects may be expanded into flags
    #[serde(
        default = "default_expand_roots",
        deserialize_with = "deserialize_comma_list"
    )]
    pub expand_roots: BTreeSet<String>,

    /// Resolve resource names with the cluster's discovery endpoints
    #[serde(default)]
    pub discovery: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openapi_path: None,
            fields_path: None,
            api_group: None,
            api_version: None,
            expand_roots: default_expand_roots(),
            discovery: false,
        }
    }
}

impl Config {
    pub fn try_from_env() -> Result<Self, envy::Error> {
        Self::from_iter(std::env::vars())
    }

    fn from_iter<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed("KUBEFIELD_").from_iter(vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_iter(vars(&[("PATH", "/usr/bin")])).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.expand_roots.contains("spec"));
    }

    #[test]
    fn test_from_vars() {
        let config = Config::from_iter(vars(&[
            ("KUBEFIELD_OPENAPI_PATH", "/tmp/swagger.json"),
            ("KUBEFIELD_API_GROUP", "apps"),
            ("KUBEFIELD_EXPAND_ROOTS", "spec, data,"),
            ("KUBEFIELD_DISCOVERY", "true"),
        ]))
        .unwrap();
        assert_eq!(config.openapi_path, Some(PathBuf::from("/tmp/swagger.json")));
        assert_eq!(config.api_group.as_deref(), Some("apps"));
        assert_eq!(config.api_version, None);
        assert_eq!(
            config.expand_roots,
            BTreeSet::from(["spec".to_string(), "data".to_string()])
        );
        assert!(config.discovery);
    }

    #[test]
    fn test_invalid() {
        assert!(Config::from_iter(vars(&[("KUBEFIELD_DISCOVERY", "maybe")])).is_err());
    }
}
