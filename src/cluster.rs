//! Talking to the API server: the OpenAPI document, discovery and live objects

use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResource;
use kube::{
    core::{DynamicObject, GroupVersionKind},
    discovery::ApiResource,
    Api, Client,
};
use serde_json::Value;

use crate::{
    resource::{Discovered, Resource},
    schema::{openapi, Models},
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Kubernetes API request failed: {0}")]
    Kube(#[from] kube::Error),
    #[error("failed to build request: {0}")]
    Http(#[from] http::Error),
    #[error("failed to load OpenAPI document served by the cluster: {0}")]
    Schema(#[from] openapi::LoadError),
    #[error("failed to serialize object: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{kind} `{name}` not found")]
    NotFound { kind: String, name: String },
}

/// Fetch and parse the Swagger document at `/openapi/v2`
pub async fn fetch_models(client: &Client) -> Result<Models, Error> {
    let request = http::Request::get("/openapi/v2")
        .header(http::header::ACCEPT, "application/json")
        .body(Vec::new())?;
    let text = client.request_text(request).await?;
    Ok(openapi::parse(&text)?)
}

/// All resources served in every group version. Subresources are left out.
pub async fn discover(client: &Client) -> Result<Vec<Discovered>, Error> {
    let mut discovered = Vec::new();

    for group in client.list_api_groups().await?.groups {
        for version in group.versions {
            let list = client
                .list_api_group_resources(&version.group_version)
                .await?;
            collect(&mut discovered, &group.name, &version.version, list.resources);
        }
    }

    for version in client.list_core_api_versions().await?.versions {
        let list = client.list_core_api_resources(&version).await?;
        collect(&mut discovered, "", &version, list.resources);
    }

    tracing::info!(resources = discovered.len(), "discovered API resources");
    Ok(discovered)
}

fn collect(
    discovered: &mut Vec<Discovered>,
    group: &str,
    version: &str,
    resources: Vec<APIResource>,
) {
    for resource in resources {
        if resource.name.contains('/') {
            continue;
        }
        let gvk = GroupVersionKind::gvk(group, version, &resource.kind);
        discovered.push(Discovered {
            api: ApiResource::from_gvk_with_plural(&gvk, &resource.name),
            namespaced: resource.namespaced,
        });
    }
}

/// Get the current state of an object
pub async fn fetch_live(
    client: &Client,
    resource: &Resource,
    namespace: Option<&str>,
    name: &str,
) -> Result<Value, Error> {
    let api = match namespace {
        Some(namespace) if resource.namespaced => {
            Api::<DynamicObject>::namespaced_with(client.clone(), namespace, &resource.api)
        }
        _ => Api::<DynamicObject>::all_with(client.clone(), &resource.api),
    };
    let object = api.get_opt(name).await?.ok_or_else(|| Error::NotFound {
        kind: resource.api.kind.clone(),
        name: name.to_string(),
    })?;
    Ok(serde_json::to_value(object)?)
}
