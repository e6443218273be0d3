use crate::{
    cli::actions::Action,
    config::{CloudConfig, ConfigFuture, ConfigSource},
    vcenter::{Datacenter, Error, HostSystem, VirtualCenter},
};
use anyhow::{Context, Result};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, warn};

/// Reloads credentials from the file given on the command line, whatever
/// `VSPHERE_CSI_CONFIG` says.
struct PinnedConfigSource(PathBuf);

impl ConfigSource for PinnedConfigSource {
    fn get_config<'a>(&'a self, _path: &'a Path) -> ConfigFuture<'a> {
        Box::pin(CloudConfig::load(&self.0))
    }
}

/// Handle the probe action
///
/// # Errors
/// Returns an error if the config cannot be loaded, the vCenter cannot be
/// reached, or a lookup fails.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Probe {
            config,
            host,
            cluster,
        } => {
            let cloud_config = CloudConfig::load(&config).await?;
            let vc_config = cloud_config.virtual_center_config(host.as_deref())?;
            info!("{vc_config}");

            let vc = VirtualCenter::with_config_source(
                vc_config,
                Arc::new(PinnedConfigSource(config)),
            );
            if let Err(err) = vc.ensure_connected().await {
                let context = connect_failure(vc.host(), &err);
                return Err(err).context(context);
            }

            let result = report(&vc, cluster.as_deref()).await;

            if let Err(err) = vc.disconnect().await {
                warn!("{err}");
            }

            result
        }
    }
}

async fn report(vc: &VirtualCenter, cluster: Option<&str>) -> Result<()> {
    let session = vc.session().await?;
    if let Some(user) = session.current_session().await? {
        println!("{}: logged in as {}", vc.host(), user.user_name);
    }

    let datacenters = vc.get_datacenters().await?;
    for line in datacenter_lines(&datacenters) {
        println!("{line}");
    }

    if let Some(cluster) = cluster {
        let hosts = vc.get_hosts_by_cluster(cluster).await?;
        for line in host_lines(cluster, &hosts) {
            println!("{line}");
        }
    }

    Ok(())
}

fn connect_failure(host: &str, err: &Error) -> String {
    if err.is_transient() {
        format!("failed to connect to {host}, the network dropped the request; try again")
    } else {
        format!("failed to connect to {host}")
    }
}

fn datacenter_lines(datacenters: &[Datacenter]) -> Vec<String> {
    datacenters
        .iter()
        .map(|dc| format!("datacenter {} ({})", dc.inventory_path, dc.reference))
        .collect()
}

fn host_lines(cluster: &str, hosts: &[HostSystem]) -> Vec<String> {
    hosts
        .iter()
        .map(|host| format!("cluster {cluster}: host {}", host.reference))
        .collect()
}
