// handlers/media.rs - /api/v1/media

use axum::extract::{Multipart, State};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::Valid;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::media::{StoredMedia, Upload};
use crate::state::AppState;

pub const DEFAULT_SUBFOLDER: &str = "default_subfolder";

#[derive(Debug, Serialize)]
pub struct Uploaded {
    pub images: Vec<StoredMedia>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RemoveRequest {
    #[validate(required, length(min = 1))]
    pub public_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Removed {
    pub result: String,
}

/// Files plus target subfolder read from the form, in whatever order the parts arrive.
struct UploadForm {
    files: Vec<Upload>,
    subfolder: String,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        tracing::debug!("Rejected multipart body: {}", e);
        ApiError::bad_request("Failed to parse form-data")
    };

    let mut form = UploadForm { files: vec![], subfolder: DEFAULT_SUBFOLDER.to_string() };
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("files") | Some("files[]") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(malformed)?;
                form.files.push(Upload { file_name, content_type, bytes: bytes.to_vec() });
            }
            Some("subfolder") => {
                let subfolder = field.text().await.map_err(malformed)?;
                if !subfolder.trim().is_empty() {
                    form.subfolder = subfolder.trim().to_string();
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

/// POST /api/v1/media/new - uploads every `files` part under `<root>/<subfolder>`
pub async fn upload_post(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Uploaded> {
    let form = read_form(multipart).await?;
    let folder = format!("{}/{}", state.config.media.root_folder, form.subfolder);

    let mut images = Vec::with_capacity(form.files.len());
    for file in form.files {
        images.push(state.media.upload(&folder, file).await?);
    }

    tracing::info!(folder = %folder, count = images.len(), "Media uploaded");
    Ok(ApiResponse::created(Uploaded { images }))
}

/// POST /api/v1/media/remove
pub async fn remove_post(State(state): State<AppState>, Valid(req): Valid<RemoveRequest>) -> ApiResult<Removed> {
    let public_id = req.public_id.unwrap_or_default();
    let result = state.media.delete(&public_id).await?;
    tracing::info!(public_id = %public_id, result = %result, "Media removed");
    Ok(ApiResponse::success(Removed { result }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remove_needs_public_id() {
        let req: RemoveRequest = serde_json::from_value(json!({})).unwrap();
        let err: ApiError = req.validate().unwrap_err().into();
        assert_eq!(err.to_json(), json!({ "validation_errors": { "public_id": ["'public_id' is required"] } }));
    }

    #[test]
    fn upload_body_lists_images() {
        let body = Uploaded {
            images: vec![StoredMedia { public_id: "loans/a1".into(), secure_url: "https://cdn.example.com/a1.jpg".into() }],
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({ "images": [{ "public_id": "loans/a1", "secure_url": "https://cdn.example.com/a1.jpg" }] })
        );
    }
}
