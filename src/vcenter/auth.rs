use super::{
    client::{Login, VimClient},
    endpoint::Identity,
    sts::{KeyPair, StsClient},
    transport::SharedTransport,
    Error,
};
use tracing::{debug, error};

/// Log in over `transport` with whichever mechanism `identity` calls for.
///
/// The caller holds the credential lock for the duration, so the identity
/// cannot change half way through a token exchange.
pub(crate) async fn authenticate(
    transport: &SharedTransport,
    host: &str,
    identity: &Identity,
) -> Result<Login, Error> {
    let client = VimClient::new(transport.clone());

    match identity {
        Identity::Password { username, password } => {
            debug!("logging in to {host} as {username}");
            client.login(username, password).await.map_err(|source| {
                if source.is_invalid_login() {
                    Error::InvalidCredentials {
                        host: host.to_string(),
                        source,
                    }
                } else {
                    error!("Failed to log in to {host}: {source}");
                    Error::Authentication {
                        host: host.to_string(),
                        source,
                    }
                }
            })
        }
        Identity::Certificate {
            certificate,
            private_key,
        } => {
            let key_pair = KeyPair::from_pem(certificate, private_key).map_err(|source| {
                error!("Failed to load X509 key pair: {source}");
                Error::InvalidKeyPair {
                    host: host.to_string(),
                    source,
                }
            })?;

            debug!("logging in to {host} by token");
            let token = StsClient::new(transport.clone())
                .issue(&key_pair)
                .await
                .map_err(|source| {
                    error!("Failed to issue security token: {source}");
                    Error::TokenIssuance {
                        host: host.to_string(),
                        source,
                    }
                })?;

            client.login_by_token(&token).await.map_err(|source| {
                if source.is_invalid_login() {
                    Error::InvalidCredentials {
                        host: host.to_string(),
                        source,
                    }
                } else {
                    error!("Failed to log in to {host} by token: {source}");
                    Error::TokenLogin {
                        host: host.to_string(),
                        source,
                    }
                }
            })
        }
    }
}
