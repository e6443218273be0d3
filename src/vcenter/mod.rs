//! Session management for one vCenter endpoint.
//!
//! [`VirtualCenter`] owns at most one authenticated session and hands out
//! clients bound to it. Every connect, reconnect and disconnect of an endpoint
//! runs under that endpoint's connection lock; the credentials sit behind a
//! second lock that is only ever taken while the connection lock is held.
//!
//! Flow Overview:
//! - `ensure_connected` checks the current session with `currentSession` and
//!   keeps it when the server still knows it.
//! - A missing or expired session is replaced: new transport, login with the
//!   current identity, retry decorator around the result.
//! - When the server rejects the credentials, they are reloaded from the cloud
//!   config and the connect is attempted once more.

mod auth;
pub mod client;
mod endpoint;
mod error;
pub mod inventory;
mod refresh;
pub mod retry;
pub mod session;
pub mod sts;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ApiError, ManagedObjectReference, UserSession, VimClient};
pub use endpoint::{Endpoint, Identity, VirtualCenterConfig};
pub use error::Error;
pub use inventory::{Datacenter, HostSystem};
pub use session::{CnsClient, PbmClient, Session};

use crate::config::{ConfigSource, FileConfigSource};
use retry::RetryTransport;
use std::{fmt, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use transport::{create_transport, SharedTransport};

/// One vCenter endpoint and its session, if any.
///
/// Share it behind an `Arc`; all methods take `&self`.
pub struct VirtualCenter {
    endpoint: Endpoint,
    credentials: Mutex<Identity>,
    session: Mutex<Option<Session>>,
    config_source: Arc<dyn ConfigSource>,
}

impl VirtualCenter {
    /// Create a disconnected handle that reloads credentials from the cloud
    /// config file.
    #[must_use]
    pub fn new(config: VirtualCenterConfig) -> Self {
        Self::with_config_source(config, Arc::new(FileConfigSource))
    }

    #[must_use]
    pub fn with_config_source(
        config: VirtualCenterConfig,
        config_source: Arc<dyn ConfigSource>,
    ) -> Self {
        Self {
            endpoint: config.endpoint,
            credentials: Mutex::new(config.identity),
            session: Mutex::new(None),
            config_source,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.endpoint.host
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Make sure a live session exists, logging in again if needed.
    ///
    /// # Errors
    /// Returns the connect error. Invalid credentials are only returned after
    /// reloading them from the config source did not help.
    #[instrument(skip(self), fields(host = %self.endpoint.host))]
    pub async fn ensure_connected(&self) -> Result<(), Error> {
        let mut slot = self.session.lock().await;

        match self.connect(&mut slot).await {
            Err(err) if err.is_invalid_credentials() => {
                warn!("Invalid credentials for {}, reloading config", self.host());
                let identity =
                    refresh::reload_identity(self.config_source.as_ref(), self.host()).await?;
                *self.credentials.lock().await = identity;
                self.connect(&mut slot).await.inspect_err(|err| {
                    error!(
                        "Failed to connect to {} after refreshing credentials: {err}",
                        self.host()
                    );
                })
            }
            result => result,
        }
    }

    async fn connect(&self, slot: &mut Option<Session>) -> Result<(), Error> {
        if let Some(current) = slot.as_ref() {
            match current.client().current_session().await {
                Ok(Some(_)) => return Ok(()),
                Ok(None) => info!(
                    "Session for {} is no longer valid, creating a new one",
                    self.host()
                ),
                Err(source) => {
                    error!("Failed to check session of {}: {source}", self.host());
                    return Err(Error::Transport {
                        host: self.host().to_string(),
                        operation: "current session",
                        source,
                    });
                }
            }
        }

        let previous = slot.take();
        let mut fresh = self.new_session().await?;

        if previous.as_ref().is_some_and(|s| s.pbm.is_some()) {
            match PbmClient::new(fresh.client()).await {
                Ok(pbm) => fresh.pbm = Some(pbm),
                Err(source) => {
                    error!("Failed to recreate PBM client for {}: {source}", self.host());
                    if let Err(err) = fresh.client().logout().await {
                        warn!("Failed to log out of abandoned session on {}: {err}", self.host());
                    }
                    return Err(Error::SubClient {
                        host: self.host().to_string(),
                        subsystem: "pbm",
                        source,
                    });
                }
            }
        }
        if previous.as_ref().is_some_and(|s| s.cns.is_some()) {
            fresh.cns = Some(CnsClient::new(fresh.client()));
        }

        *slot = Some(fresh);
        Ok(())
    }

    async fn new_session(&self) -> Result<Session, Error> {
        let http = create_transport(&self.endpoint)?;
        let transport: SharedTransport = Arc::new(RetryTransport::new(
            Arc::new(http),
            self.endpoint.round_tripper_count,
        ));

        let login = {
            let identity = self.credentials.lock().await;
            auth::authenticate(&transport, self.host(), &identity).await?
        };

        let session = Session::new(
            VimClient::with_session(transport, login.key),
            login.user,
        );
        info!(
            "New session for {} as {}",
            self.host(),
            session.user().user_name
        );
        Ok(session)
    }

    /// Log out and drop the session. A no-op when not connected.
    ///
    /// # Errors
    /// Returns [`Error::Logout`] if the server rejects the logout. The session
    /// is dropped either way.
    #[instrument(skip(self), fields(host = %self.endpoint.host))]
    pub async fn disconnect(&self) -> Result<(), Error> {
        let mut slot = self.session.lock().await;
        let Some(session) = slot.take() else {
            debug!("{} is not connected", self.host());
            return Ok(());
        };

        session.client().logout().await.map_err(|source| {
            error!("Failed to log out of {}: {source}", self.host());
            Error::Logout {
                host: self.host().to_string(),
                source,
            }
        })
    }

    /// Replace the credentials used by the next login.
    ///
    /// The current session, if any, is kept.
    pub async fn update_credentials(
        &self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) {
        let identity = Identity::from_credentials(username, password);
        debug!(
            "updating credentials for {} to {}",
            self.host(),
            identity.principal()
        );
        *self.credentials.lock().await = identity;
    }

    /// Whether a session handle is held. The server may have expired it.
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Client bound to the current session.
    ///
    /// # Errors
    /// Returns [`Error::NotConnected`] without a session.
    pub async fn session(&self) -> Result<VimClient, Error> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.client().clone())
            .ok_or_else(|| self.not_connected())
    }

    /// Storage policy client of the current session, created on first use.
    ///
    /// # Errors
    /// Returns [`Error::NotConnected`] without a session, or
    /// [`Error::SubClient`] if the PBM service cannot be reached.
    pub async fn pbm_client(&self) -> Result<PbmClient, Error> {
        let mut slot = self.session.lock().await;
        let session = slot.as_mut().ok_or_else(|| self.not_connected())?;
        if let Some(pbm) = &session.pbm {
            return Ok(pbm.clone());
        }

        let pbm = PbmClient::new(session.client())
            .await
            .map_err(|source| {
                error!("Failed to create PBM client for {}: {source}", self.host());
                Error::SubClient {
                    host: self.host().to_string(),
                    subsystem: "pbm",
                    source,
                }
            })?;
        session.pbm = Some(pbm.clone());
        Ok(pbm)
    }

    /// Cloud native storage client of the current session, created on first use.
    ///
    /// # Errors
    /// Returns [`Error::NotConnected`] without a session.
    pub async fn cns_client(&self) -> Result<CnsClient, Error> {
        let mut slot = self.session.lock().await;
        let session = slot.as_mut().ok_or_else(|| self.not_connected())?;
        if let Some(cns) = &session.cns {
            return Ok(cns.clone());
        }

        let cns = CnsClient::new(session.client());
        session.cns = Some(cns.clone());
        Ok(cns)
    }

    /// Every datacenter of the endpoint.
    ///
    /// # Errors
    /// Returns [`Error::NotConnected`] or [`Error::Discovery`].
    #[instrument(skip(self), fields(host = %self.endpoint.host))]
    pub async fn list_datacenters(&self) -> Result<Vec<Datacenter>, Error> {
        let client = self.session().await?;
        inventory::list_datacenters(&client, self.host()).await
    }

    /// Datacenters at the given inventory paths, in order.
    ///
    /// # Errors
    /// Returns [`Error::DatacenterNotFound`] for the first path that does not resolve.
    #[instrument(skip(self), fields(host = %self.endpoint.host))]
    pub async fn get_datacenters_by_path(
        &self,
        paths: &[String],
    ) -> Result<Vec<Datacenter>, Error> {
        let client = self.session().await?;
        inventory::datacenters_by_path(&client, self.host(), paths).await
    }

    /// The configured datacenters, or all of them when none are configured.
    ///
    /// # Errors
    /// See [`Self::list_datacenters`] and [`Self::get_datacenters_by_path`].
    pub async fn get_datacenters(&self) -> Result<Vec<Datacenter>, Error> {
        if self.endpoint.datacenter_paths.is_empty() {
            self.list_datacenters().await
        } else {
            self.get_datacenters_by_path(&self.endpoint.datacenter_paths)
                .await
        }
    }

    /// Member hosts of the cluster with managed object id `cluster`.
    ///
    /// # Errors
    /// Returns [`Error::NotConnected`] or [`Error::ClusterNotFound`].
    #[instrument(skip(self), fields(host = %self.endpoint.host))]
    pub async fn get_hosts_by_cluster(&self, cluster: &str) -> Result<Vec<HostSystem>, Error> {
        let client = self.session().await?;
        inventory::hosts_by_cluster(&client, self.host(), cluster).await
    }

    fn not_connected(&self) -> Error {
        Error::NotConnected {
            host: self.host().to_string(),
        }
    }
}

impl fmt::Display for VirtualCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualCenter [{}]", self.endpoint)
    }
}

impl fmt::Debug for VirtualCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualCenter")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
