use super::transport::DEFAULT_SCHEME;
use secrecy::SecretString;
use std::{fmt, path::PathBuf};

/// Credentials used to log in to a vCenter.
///
/// The configuration slot for the user name doubles as a PEM certificate, in
/// which case the password slot holds its private key. The variant is decided
/// once, when the credentials are set, by [`Identity::from_credentials`].
#[derive(Clone)]
pub enum Identity {
    Password {
        username: String,
        password: SecretString,
    },
    Certificate {
        certificate: String,
        private_key: SecretString,
    },
}

impl Identity {
    #[must_use]
    pub fn from_credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        let username = username.into();
        let password = SecretString::from(password.into());
        if is_pem(&username) {
            Self::Certificate {
                certificate: username,
                private_key: password,
            }
        } else {
            Self::Password { username, password }
        }
    }

    #[must_use]
    pub fn is_certificate(&self) -> bool {
        matches!(self, Self::Certificate { .. })
    }

    /// Name safe to log: the user name, or a marker for certificate logins.
    #[must_use]
    pub fn principal(&self) -> &str {
        match self {
            Self::Password { username, .. } => username,
            Self::Certificate { .. } => "<certificate>",
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Certificate { .. } => f
                .debug_struct("Certificate")
                .field("certificate", &"[PEM]")
                .field("private_key", &"[REDACTED]")
                .finish(),
        }
    }
}

/// True if `material` starts a PEM section rustls knows how to read.
pub(crate) fn is_pem(material: &str) -> bool {
    matches!(
        rustls_pemfile::read_one(&mut material.as_bytes()),
        Ok(Some(_))
    )
}

/// Connection settings of one vCenter, everything but the credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    /// Connection scheme, `https` when empty.
    pub scheme: String,
    pub host: String,
    /// `0` selects the scheme's default port.
    pub port: u16,
    /// Skip server certificate verification.
    pub insecure: bool,
    /// PEM CA bundle used as the only trust root; ignored when `insecure` is set.
    pub ca_file: Option<PathBuf>,
    /// Total attempts per request for transient network errors (`0` means 3).
    pub round_tripper_count: u32,
    /// Datacenters to scope lookups to; empty means all of them.
    pub datacenter_paths: Vec<String>,
}

impl Endpoint {
    #[must_use]
    pub fn scheme(&self) -> &str {
        if self.scheme.is_empty() {
            DEFAULT_SCHEME
        } else {
            &self.scheme
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Endpoint [Scheme: {}, Host: {}, Port: {}, Insecure: {}, \
             RoundTripperCount: {}, DatacenterPaths: {:?}]",
            self.scheme(),
            self.host,
            self.port,
            self.insecure,
            self.round_tripper_count,
            self.datacenter_paths
        )
    }
}

/// Endpoint settings plus the credentials to log in with.
#[derive(Debug, Clone)]
pub struct VirtualCenterConfig {
    pub endpoint: Endpoint,
    pub identity: Identity,
}

impl VirtualCenterConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, identity: Identity) -> Self {
        Self {
            endpoint: Endpoint {
                host: host.into(),
                ..Endpoint::default()
            },
            identity,
        }
    }
}

impl fmt::Display for VirtualCenterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VirtualCenterConfig [{}, Username: {}, Password: [REDACTED]]",
            self.endpoint,
            self.identity.principal()
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn plain_username_selects_password_login() {
        let identity = Identity::from_credentials("administrator@vsphere.local", "secret");
        match identity {
            Identity::Password { username, password } => {
                assert_eq!(username, "administrator@vsphere.local");
                assert_eq!(password.expose_secret(), "secret");
            }
            Identity::Certificate { .. } => panic!("expected password identity"),
        }
    }

    #[test]
    fn pem_username_selects_certificate_login() {
        let cert = rcgen::generate_simple_self_signed(vec!["solution-user".to_string()]).unwrap();
        let identity =
            Identity::from_credentials(cert.cert.pem(), cert.signing_key.serialize_pem());
        assert!(identity.is_certificate());
        assert_eq!(identity.principal(), "<certificate>");
    }

    #[test]
    fn text_mentioning_begin_is_not_pem() {
        assert!(!is_pem("-----BEGIN nothing"));
        assert!(!is_pem("user-----BEGIN CERTIFICATE"));
        assert!(!is_pem(""));
    }

    #[test]
    fn debug_redacts_secrets() {
        let identity = Identity::from_credentials("admin", "hunter2");
        let debug = format!("{identity:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));

        let config = VirtualCenterConfig::new("vc.example.com", identity);
        let display = config.to_string();
        assert!(display.contains("vc.example.com"));
        assert!(!display.contains("hunter2"));
    }

    #[test]
    fn scheme_defaults_to_https() {
        let endpoint = Endpoint::default();
        assert_eq!(endpoint.scheme(), "https");
        let endpoint = Endpoint {
            scheme: "http".to_string(),
            ..Endpoint::default()
        };
        assert_eq!(endpoint.scheme(), "http");
    }
}
