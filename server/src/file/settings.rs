//! Settings endpoint. A workspace-scoped write key reads and merges the
//! workspace defaults; a file-scoped write key operates on that file's
//! settings. Effective behavior is file over workspace over built-ins.

use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};

use crate::prelude::*;
use crate::store_adapter::{DocSettings, DocSettingsPatch, KeyRecord, ScopeType};
use crate::types::ApiResponse;

fn validate(patch: &DocSettingsPatch) -> ApiResult<()> {
	if let Patch::Value(limit) = patch.wip_limit {
		if limit < 1 {
			return Err(Error::InvalidRequest("wipLimit must be at least 1".into()));
		}
	}
	if let Patch::Value(secs) = patch.claim_duration_seconds {
		if secs < crate::core::app::MIN_CLAIM_DURATION_SECS {
			return Err(Error::InvalidRequest(format!(
				"claimDurationSeconds must be at least {}",
				crate::core::app::MIN_CLAIM_DURATION_SECS
			)));
		}
	}
	Ok(())
}

async fn read_settings(app: &App, key: &KeyRecord) -> ApiResult<DocSettings> {
	match key.scope_type {
		ScopeType::File => {
			let file = app.store.read_file(key.ws, &key.scope_path).await?;
			Ok(file.settings)
		}
		_ => app.store.read_workspace_settings(key.ws).await,
	}
}

/// GET /w/:key/settings
pub async fn get_settings(app: &App, key: &KeyRecord) -> ApiResult<Response> {
	let settings = read_settings(app, key).await?;
	Ok((StatusCode::OK, Json(ApiResponse::new(settings))).into_response())
}

/// PATCH /w/:key/settings - partial merge
pub async fn patch_settings(
	app: &App,
	key: &KeyRecord,
	patch: &DocSettingsPatch,
) -> ApiResult<Response> {
	validate(patch)?;

	let settings = match key.scope_type {
		ScopeType::File => {
			app.store.update_file_settings(key.ws, &key.scope_path, patch).await?
		}
		_ => app.store.update_workspace_settings(key.ws, patch).await?,
	};
	info!("updated settings ({})", key.scope_type.as_str());

	Ok((StatusCode::OK, Json(ApiResponse::with_server_time(settings))).into_response())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn patch_bounds() {
		let bad_wip = DocSettingsPatch { wip_limit: Patch::Value(0), ..Default::default() };
		assert!(validate(&bad_wip).is_err());

		let bad_duration =
			DocSettingsPatch { claim_duration_seconds: Patch::Value(10), ..Default::default() };
		assert!(validate(&bad_duration).is_err());

		let ok = DocSettingsPatch {
			wip_limit: Patch::Value(2),
			claim_duration_seconds: Patch::Value(300),
			..Default::default()
		};
		assert!(validate(&ok).is_ok());
	}
}

// vim: ts=4
