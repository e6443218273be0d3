pub mod probe;

use std::path::PathBuf;

#[derive(Debug)]
pub enum Action {
    Probe {
        config: PathBuf,
        host: Option<String>,
        cluster: Option<String>,
    },
}
