pub mod logging;

use crate::config::{DEFAULT_CLOUD_CONFIG_PATH, ENV_CLOUD_CONFIG};
use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};
use std::path::PathBuf;

pub const ARG_CONFIG: &str = "config";
pub const ARG_HOST: &str = "host";
pub const ARG_CLUSTER: &str = "cluster";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("vcsession")
        .about("Connect to a vCenter and list its datacenters")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_CONFIG)
                .short('c')
                .long("config")
                .help("Path to the cloud config file")
                .default_value(DEFAULT_CLOUD_CONFIG_PATH)
                .env(ENV_CLOUD_CONFIG)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_HOST)
                .long("host")
                .help("vCenter to connect to, required when the config lists several")
                .env("VCSESSION_HOST"),
        )
        .arg(
            Arg::new(ARG_CLUSTER)
                .long("cluster")
                .help("Also list the hosts of this cluster (managed object id, e.g. domain-c8)")
                .env("VCSESSION_CLUSTER"),
        );

    logging::with_args(command)
}
