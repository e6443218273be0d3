//! Datacenter and host lookups on a connected vCenter.
//!
//! Handles returned here are plain references. They are not tracked by the
//! session, so a handle obtained before a reconnect keeps pointing at the old
//! inventory and simply fails on use if it no longer resolves.

use super::{
    client::{decode, ApiError, ManagedObjectReference, VimClient},
    Error,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use tracing::{debug, error};

const ROOT_FOLDER: &str = "group-d1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datacenter {
    pub reference: ManagedObjectReference,
    /// Inventory path, e.g. `/dc1` or `/folder/dc2`.
    pub inventory_path: String,
    pub virtual_center_host: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSystem {
    pub reference: ManagedObjectReference,
    pub virtual_center_host: String,
}

fn root_folder() -> ManagedObjectReference {
    ManagedObjectReference::new("Folder", ROOT_FOLDER)
}

fn search_index() -> ManagedObjectReference {
    ManagedObjectReference::new("SearchIndex", "SearchIndex")
}

async fn name_of(client: &VimClient, target: &ManagedObjectReference) -> Result<String, ApiError> {
    let value = client.property(target, "name").await?;
    decode("name", value)
}

async fn children_of(
    client: &VimClient,
    folder: &ManagedObjectReference,
) -> Result<Vec<ManagedObjectReference>, ApiError> {
    let value = client.property(folder, "childEntity").await?;
    decode("childEntity", value)
}

/// Every datacenter below the root folder, including nested folders.
pub(crate) async fn list_datacenters(
    client: &VimClient,
    host: &str,
) -> Result<Vec<Datacenter>, Error> {
    let discovery = |source: ApiError| {
        error!("Failed to list datacenters: {source}");
        Error::Discovery {
            host: host.to_string(),
            source,
        }
    };

    let mut datacenters = Vec::new();
    let mut folders = VecDeque::from([(root_folder(), String::new())]);

    while let Some((folder, prefix)) = folders.pop_front() {
        for child in children_of(client, &folder).await.map_err(discovery)? {
            match child.kind.as_str() {
                "Datacenter" | "Folder" => {
                    let name = name_of(client, &child).await.map_err(discovery)?;
                    let path = format!("{prefix}/{name}");
                    if child.kind == "Folder" {
                        folders.push_back((child, path));
                    } else {
                        datacenters.push(Datacenter {
                            reference: child,
                            inventory_path: path,
                            virtual_center_host: host.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    debug!("found {} datacenters on {host}", datacenters.len());
    Ok(datacenters)
}

/// Resolve each path in order, stopping at the first one that does not resolve.
pub(crate) async fn datacenters_by_path(
    client: &VimClient,
    host: &str,
    paths: &[String],
) -> Result<Vec<Datacenter>, Error> {
    let mut datacenters = Vec::with_capacity(paths.len());

    for path in paths {
        let not_found = |source: Option<ApiError>| Error::DatacenterNotFound {
            host: host.to_string(),
            path: path.clone(),
            source,
        };

        let body = json!({ "inventoryPath": path.trim_start_matches('/') });
        let found = match client
            .call(&search_index(), "FindByInventoryPath", Some(body))
            .await
        {
            Ok(Value::Null) => None,
            Ok(value) => Some(
                decode::<ManagedObjectReference>("FindByInventoryPath", value)
                    .map_err(|e| not_found(Some(e)))?,
            ),
            Err(source) => {
                error!("Failed to fetch datacenter given path {path}: {source}");
                return Err(not_found(Some(source)));
            }
        };

        match found {
            Some(reference) if reference.kind == "Datacenter" => datacenters.push(Datacenter {
                reference,
                inventory_path: path.clone(),
                virtual_center_host: host.to_string(),
            }),
            _ => {
                error!("Datacenter {path} not found on {host}");
                return Err(not_found(None));
            }
        }
    }

    Ok(datacenters)
}

/// Hosts that are members of the cluster with the given managed object id.
pub(crate) async fn hosts_by_cluster(
    client: &VimClient,
    host: &str,
    cluster: &str,
) -> Result<Vec<HostSystem>, Error> {
    let reference = ManagedObjectReference::new("ClusterComputeResource", cluster);
    let not_found = |source: ApiError| {
        error!("Failed to fetch hosts from cluster {cluster}: {source}");
        Error::ClusterNotFound {
            host: host.to_string(),
            cluster: cluster.to_string(),
            source,
        }
    };

    let value = client.property(&reference, "host").await.map_err(not_found)?;
    let members: Vec<ManagedObjectReference> = decode("host", value).map_err(not_found)?;

    Ok(members
        .into_iter()
        .map(|reference| HostSystem {
            reference,
            virtual_center_host: host.to_string(),
        })
        .collect())
}
