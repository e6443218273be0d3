//! Fixtures shared by the vCenter unit tests.

#![allow(clippy::unwrap_used)]

use super::{
    client::API_RELEASE,
    endpoint::{Endpoint, Identity, VirtualCenterConfig},
    transport::{
        create_transport, ApiRequest, ApiResponse, RoundTrip, RoundTripFuture, SharedTransport,
        TransportError,
    },
};
use reqwest::{header::HeaderMap, StatusCode};
use serde_json::{json, Value};
use std::{
    collections::VecDeque,
    io,
    net::TcpListener,
    sync::{Arc, Mutex},
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const VIM: &str = "/sdk/vim25/8.0.1.0";

pub const PBM_CONTENT_PATH: &str =
    "/pbm/PbmServiceInstance/ServiceInstance/PbmRetrieveServiceContent";

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

pub fn login_path() -> String {
    format!("/sdk/vim25/{API_RELEASE}/SessionManager/SessionManager/Login")
}

pub fn login_by_token_path() -> String {
    format!("/sdk/vim25/{API_RELEASE}/SessionManager/SessionManager/LoginByToken")
}

pub fn current_session_path() -> String {
    format!("/sdk/vim25/{API_RELEASE}/SessionManager/SessionManager/currentSession")
}

pub fn logout_path() -> String {
    format!("/sdk/vim25/{API_RELEASE}/SessionManager/SessionManager/Logout")
}

pub fn session_json(user: &str) -> Value {
    json!({
        "key": format!("{user}-key"),
        "userName": user,
        "fullName": user.to_uppercase(),
    })
}

/// Successful `Login`/`LoginByToken` response for `user` with session `key`.
pub fn logged_in(user: &str, key: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("vmware-api-session-id", key)
        .set_body_json(session_json(user))
}

pub fn invalid_login() -> ResponseTemplate {
    ResponseTemplate::new(500).set_body_json(json!({
        "_typeName": "InvalidLogin",
        "faultstring": "Cannot complete login due to an incorrect user name or password."
    }))
}

/// Plain-HTTP endpoint pointing at the mock server.
pub fn endpoint(server: &MockServer) -> Endpoint {
    Endpoint {
        scheme: "http".to_string(),
        host: "127.0.0.1".to_string(),
        port: server.address().port(),
        ..Endpoint::default()
    }
}

pub fn virtual_center_config(
    server: &MockServer,
    user: &str,
    password: &str,
) -> VirtualCenterConfig {
    VirtualCenterConfig {
        endpoint: endpoint(server),
        identity: Identity::from_credentials(user, password),
    }
}

pub fn http_transport(server: &MockServer) -> SharedTransport {
    Arc::new(create_transport(&endpoint(server)).unwrap())
}

/// Datacenter tree `/dc1` and `/lab/dc2` below the root folder.
pub async fn mount_datacenter_tree(server: &MockServer) {
    let properties = [
        (
            "Folder/group-d1/childEntity",
            json!([
                { "type": "Datacenter", "value": "datacenter-3" },
                { "type": "Folder", "value": "group-lab" }
            ]),
        ),
        ("Datacenter/datacenter-3/name", json!("dc1")),
        ("Folder/group-lab/name", json!("lab")),
        (
            "Folder/group-lab/childEntity",
            json!([{ "type": "Datacenter", "value": "datacenter-7" }]),
        ),
        ("Datacenter/datacenter-7/name", json!("dc2")),
    ];
    for (property, body) in properties {
        Mock::given(method("GET"))
            .and(path(format!("{VIM}/{property}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

/// `FindByInventoryPath` for one path, answering with a datacenter or null.
pub async fn mount_find_by_path(
    server: &MockServer,
    inventory_path: &str,
    datacenter: Option<&str>,
    expected_calls: u64,
) {
    let body = datacenter.map_or(Value::Null, |value| {
        json!({ "type": "Datacenter", "value": value })
    });
    Mock::given(method("POST"))
        .and(path(format!("{VIM}/SearchIndex/SearchIndex/FindByInventoryPath")))
        .and(body_partial_json(json!({ "inventoryPath": inventory_path })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

type Outcome = Result<ApiResponse, TransportError>;

/// In-memory transport replaying a fixed list of outcomes.
///
/// Once the script is exhausted every further call succeeds.
pub struct ScriptedTransport {
    outcomes: Mutex<VecDeque<Outcome>>,
    paths: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            paths: Mutex::new(Vec::new()),
        }
    }

    pub fn ok() -> Outcome {
        Ok(ApiResponse {
            url: "scripted".to_string(),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Value::Null,
        })
    }

    pub fn transient() -> Outcome {
        Err(TransportError::Transient {
            url: "scripted".to_string(),
            source: Box::new(io::Error::from(io::ErrorKind::ConnectionReset)),
        })
    }

    pub fn permanent() -> Outcome {
        Err(TransportError::Request {
            url: "scripted".to_string(),
            source: Box::new(io::Error::from(io::ErrorKind::InvalidData)),
        })
    }

    pub fn calls(&self) -> usize {
        self.paths.lock().unwrap().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

impl RoundTrip for ScriptedTransport {
    fn round_trip<'a>(&'a self, request: &'a ApiRequest) -> RoundTripFuture<'a> {
        self.paths.lock().unwrap().push(request.path.clone());
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Self::ok);
        Box::pin(async move { outcome })
    }
}
