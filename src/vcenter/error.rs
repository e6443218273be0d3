use super::{client::ApiError, sts::KeyPairError};
use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid address for vCenter host {host:?}: {reason}")]
    Address { host: String, reason: String },
    #[error("failed to configure TLS trust for vCenter {host}: {reason}")]
    TlsConfig { host: String, reason: String },
    #[error("cannot log in to vCenter {host}: invalid credentials")]
    InvalidCredentials {
        host: String,
        #[source]
        source: ApiError,
    },
    #[error("cannot log in to vCenter {host}: {source}")]
    Authentication {
        host: String,
        #[source]
        source: ApiError,
    },
    #[error("invalid certificate/private key pair for vCenter {host}: {source}")]
    InvalidKeyPair {
        host: String,
        #[source]
        source: KeyPairError,
    },
    #[error("failed to issue security token for vCenter {host}: {source}")]
    TokenIssuance {
        host: String,
        #[source]
        source: ApiError,
    },
    #[error("cannot log in to vCenter {host} by token: {source}")]
    TokenLogin {
        host: String,
        #[source]
        source: ApiError,
    },
    #[error("{operation} on vCenter {host} failed: {source}")]
    Transport {
        host: String,
        operation: &'static str,
        #[source]
        source: ApiError,
    },
    #[error("failed to list datacenters on vCenter {host}: {source}")]
    Discovery {
        host: String,
        #[source]
        source: ApiError,
    },
    #[error("datacenter {path:?} not found on vCenter {host}")]
    DatacenterNotFound {
        host: String,
        path: String,
        #[source]
        source: Option<ApiError>,
    },
    #[error("cluster {cluster:?} not found on vCenter {host}: {source}")]
    ClusterNotFound {
        host: String,
        cluster: String,
        #[source]
        source: ApiError,
    },
    #[error("failed to log out of vCenter {host}: {source}")]
    Logout {
        host: String,
        #[source]
        source: ApiError,
    },
    #[error("vCenter {host} is not connected")]
    NotConnected { host: String },
    #[error("failed to load credentials for vCenter {host}: {source}")]
    Config {
        host: String,
        #[source]
        source: ConfigError,
    },
    #[error("failed to create {subsystem} client on vCenter {host}: {source}")]
    SubClient {
        host: String,
        subsystem: &'static str,
        #[source]
        source: ApiError,
    },
}

impl Error {
    /// Only this kind triggers the credential refresh.
    #[must_use]
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, Self::InvalidCredentials { .. })
    }

    /// A transient network error that outlived the transport retries.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidCredentials { source, .. }
            | Self::Authentication { source, .. }
            | Self::TokenIssuance { source, .. }
            | Self::TokenLogin { source, .. }
            | Self::Transport { source, .. }
            | Self::Discovery { source, .. }
            | Self::ClusterNotFound { source, .. }
            | Self::Logout { source, .. }
            | Self::SubClient { source, .. } => source.is_transient(),
            Self::DatacenterNotFound { source, .. } => {
                source.as_ref().is_some_and(ApiError::is_transient)
            }
            Self::Address { .. }
            | Self::TlsConfig { .. }
            | Self::InvalidKeyPair { .. }
            | Self::NotConnected { .. }
            | Self::Config { .. } => false,
        }
    }
}
