//! Cloud config file holding vCenter endpoints and their credentials.
//!
//! The file is TOML with optional `[Global]` defaults and one
//! `[VirtualCenter."<host>"]` table per endpoint:
//!
//! ```toml
//! [Global]
//! user = "administrator@vsphere.local"
//! password = "secret"
//! port = 443
//! insecure-flag = false
//!
//! [VirtualCenter."vc.example.com"]
//! datacenters = "dc1, dc2"
//! ```
//!
//! The same file is re-read when a vCenter rejects the configured credentials.

use crate::vcenter::{Endpoint, Identity, VirtualCenterConfig};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    env, fmt,
    future::Future,
    io,
    path::{Path, PathBuf},
    pin::Pin,
};
use thiserror::Error;

/// Environment variable pointing at the cloud config file.
pub const ENV_CLOUD_CONFIG: &str = "VSPHERE_CSI_CONFIG";

/// Location used when `VSPHERE_CSI_CONFIG` is unset or empty.
pub const DEFAULT_CLOUD_CONFIG_PATH: &str = "/etc/cloud/csi-vsphere.conf";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no virtual center configured")]
    NoVirtualCenter,
    #[error("virtual center {0:?} is not configured")]
    UnknownVirtualCenter(String),
    #[error("several virtual centers configured, pick one of: {0}")]
    AmbiguousVirtualCenter(String),
    #[error("no user configured for virtual center {0:?}")]
    MissingCredentials(String),
}

/// Resolve the config path from the environment.
#[must_use]
pub fn config_path() -> PathBuf {
    env::var_os(ENV_CLOUD_CONFIG)
        .filter(|path| !path.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CLOUD_CONFIG_PATH), PathBuf::from)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Datacenters {
    List(Vec<String>),
    Csv(String),
}

impl Datacenters {
    fn paths(&self) -> Vec<String> {
        let items: Vec<&str> = match self {
            Self::List(items) => items.iter().map(String::as_str).collect(),
            Self::Csv(csv) => csv.split(',').collect(),
        };
        items
            .into_iter()
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Settings shared by `[Global]` and `[VirtualCenter."<host>"]` tables.
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Section {
    scheme: Option<String>,
    user: Option<String>,
    password: Option<String>,
    port: Option<u16>,
    insecure_flag: Option<bool>,
    ca_file: Option<PathBuf>,
    datacenters: Option<Datacenters>,
    soap_roundtrip_count: Option<u32>,
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("scheme", &self.scheme)
            .field("user", &self.user.as_ref().map(|_| "[SET]"))
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("port", &self.port)
            .field("insecure_flag", &self.insecure_flag)
            .field("ca_file", &self.ca_file)
            .field("datacenters", &self.datacenters)
            .field("soap_roundtrip_count", &self.soap_roundtrip_count)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudConfig {
    #[serde(default, rename = "Global")]
    global: Section,
    #[serde(default, rename = "VirtualCenter")]
    virtual_centers: BTreeMap<String, Section>,
}

impl CloudConfig {
    /// # Errors
    /// Returns an error if `contents` is not a valid cloud config document.
    pub fn from_toml(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|source| {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::from_toml(path, &contents)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.virtual_centers.keys().map(String::as_str)
    }

    /// Settings for `host`, with `[Global]` filling whatever the host table omits.
    ///
    /// Without a host, the config must describe exactly one virtual center.
    ///
    /// # Errors
    /// Returns an error if the host is unknown, ambiguous, or has no user.
    pub fn virtual_center_config(
        &self,
        host: Option<&str>,
    ) -> Result<VirtualCenterConfig, ConfigError> {
        let (host, section) = match host {
            Some(host) => self
                .virtual_centers
                .get_key_value(host)
                .ok_or_else(|| ConfigError::UnknownVirtualCenter(host.to_string()))?,
            None => {
                let mut entries = self.virtual_centers.iter();
                match (entries.next(), entries.next()) {
                    (Some(entry), None) => entry,
                    (None, _) => return Err(ConfigError::NoVirtualCenter),
                    (Some(_), Some(_)) => {
                        return Err(ConfigError::AmbiguousVirtualCenter(
                            self.hosts().collect::<Vec<_>>().join(", "),
                        ))
                    }
                }
            }
        };

        let global = &self.global;
        let user = section
            .user
            .clone()
            .or_else(|| global.user.clone())
            .filter(|user| !user.is_empty())
            .ok_or_else(|| ConfigError::MissingCredentials(host.clone()))?;
        let password = section
            .password
            .clone()
            .or_else(|| global.password.clone())
            .unwrap_or_default();

        let endpoint = Endpoint {
            scheme: section
                .scheme
                .clone()
                .or_else(|| global.scheme.clone())
                .unwrap_or_default(),
            host: host.clone(),
            port: section.port.or(global.port).unwrap_or(0),
            insecure: section.insecure_flag.or(global.insecure_flag).unwrap_or(false),
            ca_file: section.ca_file.clone().or_else(|| global.ca_file.clone()),
            round_tripper_count: section
                .soap_roundtrip_count
                .or(global.soap_roundtrip_count)
                .unwrap_or(0),
            datacenter_paths: section
                .datacenters
                .as_ref()
                .or(global.datacenters.as_ref())
                .map(Datacenters::paths)
                .unwrap_or_default(),
        };

        Ok(VirtualCenterConfig {
            endpoint,
            identity: Identity::from_credentials(user, password),
        })
    }
}

pub type ConfigFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CloudConfig, ConfigError>> + Send + 'a>>;

/// Where refreshed credentials come from.
pub trait ConfigSource: Send + Sync {
    fn get_config<'a>(&'a self, path: &'a Path) -> ConfigFuture<'a>;
}

/// Reads the cloud config from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileConfigSource;

impl ConfigSource for FileConfigSource {
    fn get_config<'a>(&'a self, path: &'a Path) -> ConfigFuture<'a> {
        Box::pin(CloudConfig::load(path))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use uuid::Uuid;

    const SAMPLE: &str = r#"
[Global]
user = "administrator@vsphere.local"
password = "global-secret"
port = 443
insecure-flag = true
soap-roundtrip-count = 5

[VirtualCenter."vc1.example.com"]
datacenters = "dc1, /lab/dc2 ,"

[VirtualCenter."vc2.example.com"]
user = "svc-csi@vsphere.local"
password = "vc2-secret"
port = 8443
insecure-flag = false
ca-file = "/etc/ssl/vc2.pem"
datacenters = ["dc3"]
"#;

    fn sample() -> CloudConfig {
        CloudConfig::from_toml(Path::new("sample.conf"), SAMPLE).unwrap()
    }

    #[test]
    fn global_section_fills_defaults() {
        let config = sample()
            .virtual_center_config(Some("vc1.example.com"))
            .unwrap();
        assert_eq!(config.endpoint.host, "vc1.example.com");
        assert_eq!(config.endpoint.port, 443);
        assert!(config.endpoint.insecure);
        assert_eq!(config.endpoint.round_tripper_count, 5);
        assert_eq!(config.endpoint.datacenter_paths, vec!["dc1", "/lab/dc2"]);
        match config.identity {
            Identity::Password { username, password } => {
                assert_eq!(username, "administrator@vsphere.local");
                assert_eq!(password.expose_secret(), "global-secret");
            }
            Identity::Certificate { .. } => panic!("expected password identity"),
        }
    }

    #[test]
    fn host_section_overrides_global() {
        let config = sample()
            .virtual_center_config(Some("vc2.example.com"))
            .unwrap();
        assert_eq!(config.endpoint.port, 8443);
        assert!(!config.endpoint.insecure);
        assert_eq!(
            config.endpoint.ca_file.as_deref(),
            Some(Path::new("/etc/ssl/vc2.pem"))
        );
        assert_eq!(config.endpoint.datacenter_paths, vec!["dc3"]);
        assert_eq!(config.identity.principal(), "svc-csi@vsphere.local");
    }

    #[test]
    fn host_is_required_when_ambiguous() {
        let err = sample().virtual_center_config(None).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousVirtualCenter(_)));

        let err = sample()
            .virtual_center_config(Some("vc9.example.com"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVirtualCenter(_)));
    }

    #[test]
    fn single_virtual_center_needs_no_host() {
        let config = CloudConfig::from_toml(
            Path::new("single.conf"),
            r#"
[VirtualCenter."vc.example.com"]
user = "admin"
password = "secret"
"#,
        )
        .unwrap();
        let config = config.virtual_center_config(None).unwrap();
        assert_eq!(config.endpoint.host, "vc.example.com");
        assert_eq!(config.endpoint.port, 0);
        assert!(config.endpoint.datacenter_paths.is_empty());
    }

    #[test]
    fn missing_user_is_an_error() {
        let config = CloudConfig::from_toml(
            Path::new("nouser.conf"),
            "[VirtualCenter.\"vc.example.com\"]\npassword = \"secret\"\n",
        )
        .unwrap();
        let err = config.virtual_center_config(None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials(_)));
    }

    #[test]
    fn debug_output_hides_credentials() {
        let debug = format!("{:?}", sample());
        assert!(!debug.contains("global-secret"));
        assert!(!debug.contains("vc2-secret"));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let err = CloudConfig::from_toml(Path::new("bad.conf"), "[Global\nuser=").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn config_path_comes_from_env() {
        temp_env::with_vars([(ENV_CLOUD_CONFIG, Some("/tmp/csi.conf"))], || {
            assert_eq!(config_path(), PathBuf::from("/tmp/csi.conf"));
        });
        temp_env::with_vars([(ENV_CLOUD_CONFIG, Some(""))], || {
            assert_eq!(config_path(), PathBuf::from(DEFAULT_CLOUD_CONFIG_PATH));
        });
        temp_env::with_vars([(ENV_CLOUD_CONFIG, None::<&str>)], || {
            assert_eq!(config_path(), PathBuf::from(DEFAULT_CLOUD_CONFIG_PATH));
        });
    }

    #[tokio::test]
    async fn file_source_reads_from_disk() {
        let path = std::env::temp_dir().join(format!("vcsession-config-{}", Uuid::new_v4()));
        tokio::fs::write(&path, SAMPLE).await.unwrap();

        let config = FileConfigSource.get_config(&path).await.unwrap();
        assert_eq!(
            config.hosts().collect::<Vec<_>>(),
            vec!["vc1.example.com", "vc2.example.com"]
        );

        let missing = path.with_extension("missing");
        let err = FileConfigSource.get_config(&missing).await.unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
