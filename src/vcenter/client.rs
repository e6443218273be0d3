//! Minimal vSphere API client over a [`RoundTrip`] transport.
//!
//! Calls use the JSON binding of the vSphere Web Services API:
//! `POST /sdk/vim25/{release}/{type}/{id}/{method}` for methods and
//! `GET /sdk/vim25/{release}/{type}/{id}/{property}` for properties. The session
//! key returned by `Login` travels in the `vmware-api-session-id` header.

use super::{
    sts::SecurityToken,
    transport::{ApiRequest, ApiResponse, SharedTransport, TransportError},
};
use reqwest::{
    header::{HeaderName, HeaderValue, AUTHORIZATION},
    StatusCode,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

pub const API_RELEASE: &str = "8.0.1.0";

pub const SESSION_HEADER: HeaderName = HeaderName::from_static("vmware-api-session-id");

const INVALID_LOGIN_FAULT: &str = "InvalidLogin";
const NOT_AUTHENTICATED_FAULT: &str = "NotAuthenticated";
const NOT_FOUND_FAULT: &str = "ManagedObjectNotFound";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedObjectReference {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl ManagedObjectReference {
    #[must_use]
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for ManagedObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub key: String,
    pub user_name: String,
    #[serde(default)]
    pub full_name: String,
}

/// Result of a successful login: the session key and who it belongs to.
pub struct Login {
    pub key: SecretString,
    pub user: UserSession,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{fault} ({status}): {message}")]
    Fault {
        fault: String,
        status: StatusCode,
        message: String,
    },
    #[error("unexpected response from {url}: {reason}")]
    Unexpected { url: String, reason: String },
}

impl ApiError {
    #[must_use]
    pub fn is_fault(&self, name: &str) -> bool {
        matches!(self, Self::Fault { fault, .. } if fault == name)
    }

    /// The remote rejected the user name/password or token.
    #[must_use]
    pub fn is_invalid_login(&self) -> bool {
        self.is_fault(INVALID_LOGIN_FAULT)
    }

    #[must_use]
    pub fn is_not_authenticated(&self) -> bool {
        self.is_fault(NOT_AUTHENTICATED_FAULT)
            || matches!(self, Self::Fault { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.is_fault(NOT_FOUND_FAULT)
            || matches!(self, Self::Fault { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_transient())
    }
}

fn unexpected(url: &str, reason: impl Into<String>) -> ApiError {
    ApiError::Unexpected {
        url: url.to_string(),
        reason: reason.into(),
    }
}

fn fault_from(response: ApiResponse) -> ApiError {
    let fault = response
        .body
        .get("_typeName")
        .and_then(Value::as_str)
        .map_or_else(|| "HttpError".to_string(), str::to_string);
    let message = response
        .body
        .get("faultstring")
        .or_else(|| response.body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    ApiError::Fault {
        fault,
        status: response.status,
        message,
    }
}

pub(crate) fn decode<T: for<'de> Deserialize<'de>>(url: &str, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| unexpected(url, e.to_string()))
}

/// Handle to the remote API, optionally bound to a session.
#[derive(Clone)]
pub struct VimClient {
    transport: SharedTransport,
    session: Option<SecretString>,
}

impl VimClient {
    #[must_use]
    pub fn new(transport: SharedTransport) -> Self {
        Self {
            transport,
            session: None,
        }
    }

    #[must_use]
    pub fn with_session(transport: SharedTransport, key: SecretString) -> Self {
        Self {
            transport,
            session: Some(key),
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn method_path(target: &ManagedObjectReference, name: &str) -> String {
        format!(
            "/sdk/vim25/{API_RELEASE}/{}/{}/{name}",
            target.kind, target.value
        )
    }

    /// Send a request with the session header attached and map faults.
    ///
    /// # Errors
    /// Returns the transport error, or the remote fault for non-success statuses.
    pub async fn invoke(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if let Some(key) = &self.session {
            let mut value = HeaderValue::from_str(key.expose_secret())
                .map_err(|e| unexpected(&request.path, format!("invalid session key: {e}")))?;
            value.set_sensitive(true);
            request.headers.insert(SESSION_HEADER, value);
        }

        let response = self.transport.round_trip(&request).await?;
        if response.status.is_success() {
            Ok(response)
        } else {
            Err(fault_from(response))
        }
    }

    /// Invoke a method on a managed object and return its JSON result.
    ///
    /// # Errors
    /// Returns an error if the call fails or the remote reports a fault.
    pub async fn call(
        &self,
        target: &ManagedObjectReference,
        method: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let request = ApiRequest::post(Self::method_path(target, method), body);
        Ok(self.invoke(request).await?.body)
    }

    /// Read a single property of a managed object.
    ///
    /// # Errors
    /// Returns an error if the call fails or the remote reports a fault.
    pub async fn property(
        &self,
        target: &ManagedObjectReference,
        name: &str,
    ) -> Result<Value, ApiError> {
        let request = ApiRequest::get(Self::method_path(target, name));
        Ok(self.invoke(request).await?.body)
    }

    /// Log in with a user name and password.
    ///
    /// # Errors
    /// Returns an `InvalidLogin` fault for bad credentials, or any transport error.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<Login, ApiError> {
        let body = json!({
            "userName": username,
            "password": password.expose_secret(),
        });
        let request = ApiRequest::post(Self::method_path(&session_manager(), "Login"), Some(body));
        self.finish_login(request).await
    }

    /// Log in presenting a security token issued by the STS.
    ///
    /// # Errors
    /// Returns an error if the token is rejected or the call fails.
    pub async fn login_by_token(&self, token: &SecurityToken) -> Result<Login, ApiError> {
        let mut value = HeaderValue::from_str(&format!("SAML token=\"{}\"", token.encoded()))
            .map_err(|e| unexpected("LoginByToken", format!("invalid token header: {e}")))?;
        value.set_sensitive(true);
        let request = ApiRequest::post(
            Self::method_path(&session_manager(), "LoginByToken"),
            Some(json!({})),
        )
        .with_header(AUTHORIZATION, value);
        self.finish_login(request).await
    }

    async fn finish_login(&self, request: ApiRequest) -> Result<Login, ApiError> {
        let response = self.invoke(request).await?;
        let key = response
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| unexpected(&response.url, "no session key in response"))?
            .to_string();
        let user = decode(&response.url, response.body)?;
        Ok(Login {
            key: SecretString::from(key),
            user,
        })
    }

    /// Liveness check: the current session, `None` if it expired or never existed.
    ///
    /// # Errors
    /// Returns an error if the remote cannot be queried.
    pub async fn current_session(&self) -> Result<Option<UserSession>, ApiError> {
        match self.property(&session_manager(), "currentSession").await {
            Ok(Value::Null) => Ok(None),
            Ok(value) => decode("currentSession", value).map(Some),
            Err(err) if err.is_not_authenticated() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// End the current session.
    ///
    /// # Errors
    /// Returns an error if the remote rejects the logout or cannot be reached.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.call(&session_manager(), "Logout", None).await?;
        Ok(())
    }
}

impl fmt::Debug for VimClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VimClient")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

fn session_manager() -> ManagedObjectReference {
    ManagedObjectReference::new("SessionManager", "SessionManager")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::vcenter::test_support::{
        can_bind_localhost, http_transport, invalid_login, login_path, session_json, VIM,
    };
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn login_returns_session_key_and_user() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(login_path()))
            .and(body_json(json!({ "userName": "admin", "password": "secret" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("vmware-api-session-id", "session-1")
                    .set_body_json(session_json("admin")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = VimClient::new(http_transport(&server));
        let login = client
            .login("admin", &SecretString::from("secret".to_string()))
            .await
            .unwrap();
        assert_eq!(login.key.expose_secret(), "session-1");
        assert_eq!(login.user.user_name, "admin");
    }

    #[tokio::test]
    async fn invalid_login_fault_is_classified() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(login_path()))
            .respond_with(invalid_login())
            .mount(&server)
            .await;

        let client = VimClient::new(http_transport(&server));
        let err = client
            .login("admin", &SecretString::from("wrong".to_string()))
            .await
            .err()
            .unwrap();
        assert!(err.is_invalid_login(), "{err:?}");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn login_without_session_header_is_unexpected() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(login_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("admin")))
            .mount(&server)
            .await;

        let client = VimClient::new(http_transport(&server));
        let err = client
            .login("admin", &SecretString::from("secret".to_string()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::Unexpected { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn current_session_sends_session_header() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{VIM}/SessionManager/SessionManager/currentSession")))
            .and(header("vmware-api-session-id", "session-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("admin")))
            .expect(1)
            .mount(&server)
            .await;

        let client = VimClient::with_session(
            http_transport(&server),
            SecretString::from("session-1".to_string()),
        );
        let session = client.current_session().await.unwrap();
        assert_eq!(session.map(|s| s.user_name), Some("admin".to_string()));
    }

    #[tokio::test]
    async fn expired_session_reads_as_none() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{VIM}/SessionManager/SessionManager/currentSession")))
            .and(header("vmware-api-session-id", "null-session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{VIM}/SessionManager/SessionManager/currentSession")))
            .and(header("vmware-api-session-id", "stale-session"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "_typeName": "NotAuthenticated",
            })))
            .mount(&server)
            .await;

        for key in ["null-session", "stale-session"] {
            let client = VimClient::with_session(
                http_transport(&server),
                SecretString::from(key.to_string()),
            );
            assert_eq!(client.current_session().await.unwrap(), None, "{key}");
        }
    }

    #[test]
    fn method_paths_follow_the_json_binding() {
        let target = ManagedObjectReference::new("Datacenter", "datacenter-3");
        assert_eq!(
            VimClient::method_path(&target, "name"),
            "/sdk/vim25/8.0.1.0/Datacenter/datacenter-3/name"
        );
    }
}
