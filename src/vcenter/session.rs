use super::client::{decode, ApiError, ManagedObjectReference, UserSession, VimClient};
use super::transport::ApiRequest;
use serde::Deserialize;
use serde_json::Value;

const PBM_PREFIX: &str = "/pbm";
const CNS_PREFIX: &str = "/vsanHealth";

/// The live, authenticated connection of one vCenter.
///
/// Sub-clients share the session's transport and key. They are created on
/// first use and rebuilt whenever the session itself is replaced.
#[derive(Debug)]
pub struct Session {
    client: VimClient,
    user: UserSession,
    pub(crate) pbm: Option<PbmClient>,
    pub(crate) cns: Option<CnsClient>,
}

impl Session {
    #[must_use]
    pub(crate) fn new(client: VimClient, user: UserSession) -> Self {
        Self {
            client,
            user,
            pbm: None,
            cns: None,
        }
    }

    #[must_use]
    pub fn client(&self) -> &VimClient {
        &self.client
    }

    #[must_use]
    pub fn user(&self) -> &UserSession {
        &self.user
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PbmServiceContent {
    pub profile_manager: ManagedObjectReference,
    #[serde(default)]
    pub placement_solver: Option<ManagedObjectReference>,
}

/// Storage policy (PBM) endpoint, a view over the session transport.
#[derive(Debug, Clone)]
pub struct PbmClient {
    client: VimClient,
    content: PbmServiceContent,
}

impl PbmClient {
    /// Bind to the PBM service, fetching its service content.
    ///
    /// # Errors
    /// Returns an error if the service content cannot be retrieved.
    pub async fn new(client: &VimClient) -> Result<Self, ApiError> {
        let service_instance = ManagedObjectReference::new("PbmServiceInstance", "ServiceInstance");
        let request = ApiRequest::post(
            pbm_path(&service_instance, "PbmRetrieveServiceContent"),
            None,
        );
        let response = client.invoke(request).await?;
        let content = decode(&response.url, response.body)?;
        Ok(Self {
            client: client.clone(),
            content,
        })
    }

    #[must_use]
    pub fn content(&self) -> &PbmServiceContent {
        &self.content
    }

    /// # Errors
    /// Returns an error if the call fails or the service reports a fault.
    pub async fn call(
        &self,
        target: &ManagedObjectReference,
        method: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let response = self
            .client
            .invoke(ApiRequest::post(pbm_path(target, method), body))
            .await?;
        Ok(response.body)
    }
}

fn pbm_path(target: &ManagedObjectReference, method: &str) -> String {
    format!("{PBM_PREFIX}/{}/{}/{method}", target.kind, target.value)
}

/// Cloud native storage (CNS) endpoint, a view over the session transport.
#[derive(Debug, Clone)]
pub struct CnsClient {
    client: VimClient,
}

impl CnsClient {
    #[must_use]
    pub fn new(client: &VimClient) -> Self {
        Self {
            client: client.clone(),
        }
    }

    #[must_use]
    pub fn volume_manager() -> ManagedObjectReference {
        ManagedObjectReference::new("CnsVolumeManager", "cns-volume-manager")
    }

    /// Invoke a method on the CNS volume manager.
    ///
    /// # Errors
    /// Returns an error if the call fails or the service reports a fault.
    pub async fn call(&self, method: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let manager = Self::volume_manager();
        let path = format!("{CNS_PREFIX}/{}/{}/{method}", manager.kind, manager.value);
        let response = self.client.invoke(ApiRequest::post(path, body)).await?;
        Ok(response.body)
    }
}
