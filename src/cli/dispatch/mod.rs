//! Maps validated CLI arguments to the action to run.

use crate::cli::{
    actions::Action,
    commands::{ARG_CLUSTER, ARG_CONFIG, ARG_HOST},
};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// # Errors
/// Returns an error if a required argument is missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Probe {
        config: matches
            .get_one::<PathBuf>(ARG_CONFIG)
            .cloned()
            .context("missing required argument: --config")?,
        host: matches.get_one::<String>(ARG_HOST).cloned(),
        cluster: matches.get_one::<String>(ARG_CLUSTER).cloned(),
    })
}
