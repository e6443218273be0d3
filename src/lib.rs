//! # vcsession
//!
//! `vcsession` keeps one authenticated, live session per vCenter endpoint.
//!
//! ## Sessions
//!
//! [`vcenter::VirtualCenter`] logs in lazily and checks the session with the
//! server before handing it out again. Expired sessions are replaced under a
//! per-endpoint lock, so concurrent callers never log in twice.
//!
//! ## Credentials
//!
//! A user name and password log in directly. When the user name holds a PEM
//! certificate, the password holds its private key and the login goes through
//! a security token issued by the endpoint's STS. Rejected credentials are
//! reloaded once from the cloud config (see [`config`]).
//!
//! ## Transport
//!
//! All calls of a session share one HTTPS client. Transient network errors
//! are retried immediately, up to the endpoint's round tripper count.

pub mod cli;
pub mod config;
pub mod vcenter;

pub use vcenter::{Error, VirtualCenter, VirtualCenterConfig};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
