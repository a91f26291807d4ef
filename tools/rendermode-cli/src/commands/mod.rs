pub mod assess;
pub mod config;
pub mod decide;
pub mod render;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use rendermode_capability::{Assessor, ServerStatus, StaticServerProbe, SystemClientProbe};
use rendermode_common::config::AppConfig;
use rendermode_common::error::{RendermodeError, RendermodeResult};
use rendermode_project_model::VideoProject;

use crate::ServerArgs;

/// Load a project document, with a clear error for a missing file.
pub fn load_project(path: &Path) -> RendermodeResult<VideoProject> {
    if !path.exists() {
        return Err(RendermodeError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    VideoProject::load(path).map_err(|e| RendermodeError::project(e.to_string()))
}

/// The assessor for this host. A `--server-load` stands in for the render
/// server's status endpoint.
pub fn assessor(config: &AppConfig, server: &ServerArgs) -> RendermodeResult<Assessor> {
    let Some(load) = server.server_load else {
        return Ok(Assessor::from_config(&config.assessor));
    };
    if !(0.0..=1.0).contains(&load) {
        return Err(RendermodeError::config(format!(
            "--server-load must be within [0, 1], got {load}"
        )));
    }
    Ok(Assessor::new(
        Arc::new(SystemClientProbe::new(config.assessor.clone())),
        Arc::new(StaticServerProbe::new(ServerStatus {
            load,
            queue_depth: None,
            estimated_wait_secs: None,
        })),
        config.assessor.probe_timeout(),
    ))
}
