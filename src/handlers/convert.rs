//! Media conversion endpoint.
//!
//! - POST /convert - multipart upload, returns the converted file

use axum::{
    Extension,
    extract::{Multipart, State},
    http::header,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::api_key::Permissions,
    services::converter::DEFAULT_OUTPUT_FORMAT,
    state::AppState,
};

/// Convert an uploaded media file.
///
/// # Endpoint
///
/// `POST /convert`
///
/// # Form Fields
///
/// - `file` (required): the media file
/// - `output_format` (optional): target extension, defaults to `mp3`
///
/// # Response
///
/// - **Success (200)**: converted bytes as `application/octet-stream`
/// - **Error (400)**: missing file or unsupported format
/// - **Error (401/429)**: rejected by the auth middleware
/// - **Error (403)**: key lacks the `convert` permission
/// - **Error (500)**: transcoder failed
pub async fn convert_media(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permissions::CONVERT)?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut output_format = DEFAULT_OUTPUT_FORMAT.to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidRequest(e.body_text()))?;
                upload = Some((filename, data.to_vec()));
            }
            Some("output_format") => {
                output_format = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidRequest(e.body_text()))?
                    .trim()
                    .to_string();
            }
            _ => {}
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| AppError::InvalidRequest("Missing 'file' field".to_string()))?;

    let converted = state
        .converter
        .convert(&filename, &data, &output_format)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", converted.filename),
            ),
        ],
        converted.bytes,
    ))
}
