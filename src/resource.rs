//! Index of the resources commands can be generated for

use std::collections::BTreeMap;

use kube::{core::GroupVersionKind, discovery::ApiResource};

use crate::{
    locator::FieldLocator,
    path::FieldPath,
    schema::{Models, SchemaNode, SchemaProvider},
};

/// A resource as reported by the API server's discovery endpoints
#[derive(Clone, Debug)]
pub struct Discovered {
    pub api: ApiResource,
    pub namespaced: bool,
}

#[derive(Clone, Debug)]
pub struct Resource {
    pub api: ApiResource,
    pub namespaced: bool,
    /// Name of the OpenAPI definition describing the resource
    pub definition: String,
}

impl Resource {
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.api.group, &self.api.version, &self.api.kind)
    }

    pub fn schema<'m>(&self, models: &'m Models) -> Option<&'m SchemaNode> {
        models.definition(&self.definition)
    }

    pub fn has_field(&self, models: &Models, path: &FieldPath) -> bool {
        self.schema(models)
            .map_or(false, |schema| FieldLocator::new(models, schema).has_field(path))
    }
}

/// Resources by plural name, versions of one name ordered from the most preferred.
#[derive(Clone, Debug, Default)]
pub struct ResourceIndex {
    resources: BTreeMap<String, Vec<Resource>>,
}

impl ResourceIndex {
    /// Every top-level resource described by the models. Plural names are derived from kinds
    /// and all resources are assumed to be namespaced.
    pub fn from_models(models: &Models) -> Self {
        let mut index = Self::default();
        for (gvk, definition) in models.resources() {
            if !is_resource(models, &gvk, definition) {
                tracing::debug!(kind = %gvk.kind, %definition, "not a resource, skipping");
                continue;
            }
            index.insert(Resource {
                api: ApiResource::from_gvk(&gvk),
                namespaced: true,
                definition: definition.to_string(),
            });
        }
        index.sort();
        index
    }

    /// Resources served by the cluster that the models have a schema for
    pub fn from_discovery(models: &Models, discovered: Vec<Discovered>) -> Self {
        let mut index = Self::default();
        for Discovered { api, namespaced } in discovered {
            let gvk = GroupVersionKind::gvk(&api.group, &api.version, &api.kind);
            let Some(definition) = models.resource_definition(&gvk) else {
                tracing::debug!(
                    resource = %api.plural,
                    api_version = %api.api_version,
                    "no schema for resource, skipping"
                );
                continue;
            };
            if !is_resource(models, &gvk, definition) {
                continue;
            }
            let definition = definition.to_string();
            index.insert(Resource {
                api,
                namespaced,
                definition,
            });
        }
        index.sort();
        index
    }

    fn insert(&mut self, resource: Resource) {
        self.resources
            .entry(resource.api.plural.clone())
            .or_default()
            .push(resource);
    }

    fn sort(&mut self) {
        for versions in self.resources.values_mut() {
            versions.sort_by(|a, b| {
                version_priority(&b.api.version)
                    .cmp(&version_priority(&a.api.version))
                    .then_with(|| a.api.group.cmp(&b.api.group))
            });
        }
    }

    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&Resource) -> bool,
    {
        for versions in self.resources.values_mut() {
            versions.retain(|resource| f(resource));
        }
        self.resources.retain(|_, versions| !versions.is_empty());
    }

    /// Keep only resources of the given API group and version
    pub fn filter_group_version(&mut self, group: Option<&str>, version: Option<&str>) {
        self.retain(|resource| {
            group.map_or(true, |group| resource.api.group == group)
                && version.map_or(true, |version| resource.api.version == version)
        });
    }

    pub fn get(&self, name: &str) -> Option<&[Resource]> {
        self.resources.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Resource])> {
        self.resources
            .iter()
            .map(|(name, versions)| (name.as_str(), versions.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// The most preferred version of `name` in which any of `paths` resolves, with the paths
    /// that do.
    pub fn select<'r>(
        &'r self,
        models: &Models,
        name: &str,
        paths: &[FieldPath],
    ) -> Option<(&'r Resource, Vec<FieldPath>)> {
        self.resources.get(name)?.iter().find_map(|resource| {
            let found: Vec<_> = paths
                .iter()
                .filter(|path| resource.has_field(models, path))
                .cloned()
                .collect();
            (!found.is_empty()).then_some((resource, found))
        })
    }
}

/// Lists, shared apimachinery types and kinds without object metadata are not resources
fn is_resource(models: &Models, gvk: &GroupVersionKind, definition: &str) -> bool {
    if gvk.kind.ends_with("List") || definition.starts_with("io.k8s.apimachinery.") {
        return false;
    }
    match models.lookup_resource(gvk).map(|node| models.resolve(node)) {
        Some(Ok(SchemaNode::Kind(kind))) => kind.fields.contains_key("metadata"),
        _ => false,
    }
}

/// Sort key of an API version: stable before beta before alpha, newer first
pub fn version_priority(version: &str) -> (u8, u32, u32) {
    let Some(rest) = version.strip_prefix('v') else {
        return (0, 0, 0);
    };
    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let Ok(major) = rest[..digits].parse::<u32>() else {
        return (0, 0, 0);
    };
    let qualifier = &rest[digits..];
    if qualifier.is_empty() {
        return (3, major, 0);
    }
    let (level, minor) = if let Some(minor) = qualifier.strip_prefix("beta") {
        (2, minor)
    } else if let Some(minor) = qualifier.strip_prefix("alpha") {
        (1, minor)
    } else {
        return (0, 0, 0);
    };
    match minor.parse::<u32>() {
        Ok(minor) => (level, major, minor),
        Err(_) => (0, 0, 0),
    }
}
