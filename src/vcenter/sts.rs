//! Certificate based token exchange with the vCenter security token service.
//!
//! The client proves possession of the private key by signing the token
//! request; the STS answers with a signed security token that
//! `SessionManager.LoginByToken` accepts in place of a password.

use super::{
    client::{decode, ApiError, VimClient},
    transport::{ApiRequest, SharedTransport},
};
use base64ct::{Base64, Encoding};
use rustls::{
    crypto::ring::sign::any_supported_type,
    pki_types::CertificateDer,
    sign::{CertifiedKey, Signer},
    InconsistentKeys, SignatureScheme,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tracing::debug;

pub const STS_ISSUE_PATH: &str = "/sts/issue";

/// Lifetime requested for issued tokens.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(600);

const SIGNATURE_SCHEMES: &[SignatureScheme] = &[
    SignatureScheme::ECDSA_NISTP256_SHA256,
    SignatureScheme::ECDSA_NISTP384_SHA384,
    SignatureScheme::ED25519,
    SignatureScheme::RSA_PSS_SHA256,
    SignatureScheme::RSA_PKCS1_SHA256,
];

#[derive(Debug, Error)]
#[error("{reason}")]
pub struct KeyPairError {
    reason: String,
}

impl KeyPairError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A certificate chain together with its matching private key.
pub struct KeyPair {
    inner: CertifiedKey,
}

impl KeyPair {
    /// Parse a PEM certificate chain and PEM private key.
    ///
    /// # Errors
    /// Returns an error if either side does not parse, the key type is not
    /// supported, or the key does not belong to the leaf certificate.
    pub fn from_pem(certificate: &str, private_key: &SecretString) -> Result<Self, KeyPairError> {
        let chain = rustls_pemfile::certs(&mut certificate.as_bytes())
            .collect::<Result<Vec<CertificateDer<'static>>, _>>()
            .map_err(|e| KeyPairError::new(format!("failed to read certificate: {e}")))?;
        if chain.is_empty() {
            return Err(KeyPairError::new("no certificate found"));
        }

        let key = rustls_pemfile::private_key(&mut private_key.expose_secret().as_bytes())
            .map_err(|e| KeyPairError::new(format!("failed to read private key: {e}")))?
            .ok_or_else(|| KeyPairError::new("no private key found"))?;
        let signing_key = any_supported_type(&key)
            .map_err(|e| KeyPairError::new(format!("unsupported private key: {e}")))?;

        let inner = CertifiedKey::new(chain, signing_key);
        // Keys whose public half cannot be derived are left for the STS to reject.
        if let Err(
            e @ (rustls::Error::InconsistentKeys(InconsistentKeys::KeyMismatch)
            | rustls::Error::InvalidCertificate(_)),
        ) = inner.keys_match()
        {
            return Err(KeyPairError::new(format!(
                "private key does not match certificate: {e}"
            )));
        }

        Ok(Self { inner })
    }

    fn leaf(&self) -> &CertificateDer<'static> {
        // CertifiedKey is only built from a non-empty chain.
        &self.inner.cert[0]
    }

    fn signer(&self) -> Result<Box<dyn Signer>, KeyPairError> {
        self.inner
            .key
            .choose_scheme(SIGNATURE_SCHEMES)
            .ok_or_else(|| KeyPairError::new("no supported signature scheme for private key"))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("chain_len", &self.inner.cert.len())
            .finish_non_exhaustive()
    }
}

/// Security token issued by the STS.
#[derive(Clone)]
pub struct SecurityToken(SecretString);

impl SecurityToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Token in the base64 form expected by `LoginByToken`.
    #[must_use]
    pub fn encoded(&self) -> String {
        Base64::encode_string(self.0.expose_secret().as_bytes())
    }
}

impl fmt::Debug for SecurityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecurityToken([REDACTED])")
    }
}

#[derive(Deserialize)]
struct IssueResponse {
    token: String,
}

/// Token exchange against the STS reachable through a session's transport.
pub struct StsClient {
    client: VimClient,
}

impl StsClient {
    #[must_use]
    pub fn new(transport: SharedTransport) -> Self {
        Self {
            client: VimClient::new(transport),
        }
    }

    /// Request a token for the certificate of `key_pair`.
    ///
    /// # Errors
    /// Returns an error if the request cannot be signed, the STS rejects it, or
    /// the response carries no token.
    pub async fn issue(&self, key_pair: &KeyPair) -> Result<SecurityToken, ApiError> {
        let signer = key_pair.signer().map_err(|e| ApiError::Unexpected {
            url: STS_ISSUE_PATH.to_string(),
            reason: e.to_string(),
        })?;

        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let expires = created + TOKEN_LIFETIME.as_secs();
        let certificate = Base64::encode_string(key_pair.leaf().as_ref());

        let payload = format!("{created}.{expires}.{certificate}");
        let signature = signer
            .sign(payload.as_bytes())
            .map_err(|e| ApiError::Unexpected {
                url: STS_ISSUE_PATH.to_string(),
                reason: format!("failed to sign token request: {e}"),
            })?;

        let body = json!({
            "certificate": certificate,
            "created": created,
            "expires": expires,
            "signatureAlgorithm": format!("{:?}", signer.scheme()),
            "signature": Base64::encode_string(&signature),
        });

        debug!("requesting security token, expires {}", expires);
        let response = self
            .client
            .invoke(ApiRequest::post(STS_ISSUE_PATH, Some(body)))
            .await?;
        let issued: IssueResponse = decode(&response.url, response.body)?;
        if issued.token.is_empty() {
            return Err(ApiError::Unexpected {
                url: response.url,
                reason: "empty token".to_string(),
            });
        }
        Ok(SecurityToken::new(issued.token))
    }
}
