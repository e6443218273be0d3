use super::{endpoint::Identity, Error};
use crate::config::{config_path, ConfigSource};
use tracing::{debug, error};

/// Re-read the cloud config and pick the credentials configured for `host`.
pub(crate) async fn reload_identity(
    source: &dyn ConfigSource,
    host: &str,
) -> Result<Identity, Error> {
    let config_error = |source| {
        error!("Failed to get config for {host}: {source}");
        Error::Config {
            host: host.to_string(),
            source,
        }
    };

    let path = config_path();
    debug!("reloading credentials for {host} from {}", path.display());
    let config = source.get_config(&path).await.map_err(config_error)?;
    let virtual_center = config
        .virtual_center_config(Some(host))
        .map_err(config_error)?;
    Ok(virtual_center.identity)
}
