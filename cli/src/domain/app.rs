//! Application attribute translation between contexts.

use spacecopy_common::{AppParams, AppState};

/// Health check used when the source reports none.
pub const DEFAULT_HEALTH_CHECK: &str = "port";

/// Build creation params for the destination copy of an application.
///
/// Stack, buildpack url and docker image only make sense at the source and are
/// dropped. The copy is created stopped so payload can be uploaded first.
#[must_use]
pub fn destination_params(source: &AppParams, name: &str, dest_space_guid: &str) -> AppParams {
    let mut params = source.clone();
    params.name = Some(name.to_string());
    params.space_guid = Some(dest_space_guid.to_string());
    params.stack_guid = None;
    params.buildpack_url = None;
    params.docker_image = None;
    params.state = Some(AppState::Stopped);
    if params.health_check_type.as_deref().is_some_and(str::is_empty) {
        params.health_check_type = Some(DEFAULT_HEALTH_CHECK.to_string());
    }
    params
}
