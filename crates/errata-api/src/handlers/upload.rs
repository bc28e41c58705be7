//! Homework photo upload and mistake extraction.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use errata_core::{is_image, upload_extension, ModelKind, QuotaResource};
use errata_inference::{resolve_model, suggest_subject_and_tags, VisionPipeline};

use crate::auth::RequireAuth;
use crate::middleware::try_charge;
use crate::{ApiError, AppState};

const IMAGE_QUOTA_EXHAUSTED: &str = "Image quota exhausted. Please wait for quota refresh.";

/// One uploaded image held in memory until it is stored.
struct UploadedImage {
    filename: String,
    data: Vec<u8>,
}

/// Stored name for an upload: random hex stem plus the normalized extension.
pub fn stored_name(original: &str) -> String {
    format!("{}{}", Uuid::new_v4().simple(), upload_extension(original))
}

/// Drop uploads whose bytes are not a recognized image.
fn usable_images(images: Vec<UploadedImage>, user_id: &Uuid) -> Vec<UploadedImage> {
    images
        .into_iter()
        .filter(|image| {
            let ok = is_image(&image.data);
            if !ok {
                warn!(
                    subsystem = "api",
                    component = "upload",
                    user_id = %user_id,
                    filename = %image.filename,
                    "Skipping upload that is not an image"
                );
            }
            ok
        })
        .collect()
}

/// Upload images and run the vision pipeline on them.
///
/// Multipart fields: one or more `images` files and an optional `model`.
///
/// # Returns
/// - 200 OK with `{mistakes, suggested_subject?, suggested_tags?, message?}`
/// - 400 Bad Request when no usable image was sent
/// - 429 Too Many Requests when the image quota runs out
/// - 500 with the pipeline body when detection fails
pub async fn upload_images(
    State(state): State<AppState>,
    auth: RequireAuth,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user = auth.user;
    let mut images: Vec<UploadedImage> = Vec::new();
    let mut requested_model: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "images" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {}", e)))?
                    .to_vec();
                if filename.is_empty() && data.is_empty() {
                    continue;
                }
                images.push(UploadedImage { filename, data });
            }
            "model" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read model: {}", e)))?;
                requested_model = Some(value.trim().to_string()).filter(|m| !m.is_empty());
            }
            _ => {}
        }
    }

    if images.is_empty() {
        return Err(ApiError::BadRequest("No images uploaded".to_string()));
    }

    let valid = usable_images(images, &user.id);
    if valid.is_empty() {
        return Err(ApiError::BadRequest("No valid images uploaded".to_string()));
    }

    // One charge for the whole batch, so a short quota stores nothing.
    if !try_charge(&state, &user, QuotaResource::Images, valid.len() as i32).await? {
        return Err(ApiError::TooManyRequests(IMAGE_QUOTA_EXHAUSTED.to_string()));
    }

    let mut stored: Vec<String> = Vec::with_capacity(valid.len());
    for image in valid {
        let name = stored_name(&image.filename);
        tokio::fs::write(state.config.upload_dir.join(&name), &image.data)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to store upload: {}", e)))?;
        stored.push(name);
    }

    let (client, own_key) = state.client_for(&user);
    let vision_model = resolve_model(ModelKind::Vision, own_key, requested_model.as_deref());
    let pipeline = VisionPipeline::new(client.as_ref(), &state.config.upload_dir, &vision_model);
    let outcome = pipeline.run(&stored).await;

    info!(
        subsystem = "api",
        component = "upload",
        user_id = %user.id,
        model = %vision_model,
        image_count = stored.len(),
        result_count = outcome.mistakes.len(),
        "Vision pipeline finished"
    );

    if outcome.is_error() && outcome.mistakes.is_empty() {
        let body = serde_json::to_value(&outcome)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        return Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)));
    }

    let suggestion = if outcome.mistakes.is_empty() {
        None
    } else {
        let chat_model = resolve_model(ModelKind::Chat, own_key, None);
        Some(suggest_subject_and_tags(client.as_ref(), &outcome.mistakes, &chat_model).await)
    };

    let mut body = serde_json::to_value(&outcome).map_err(|e| ApiError::Internal(e.to_string()))?;
    if let (Some(s), Some(map)) = (suggestion, body.as_object_mut()) {
        map.insert("suggested_subject".to_string(), json!(s.subject));
        map.insert("suggested_tags".to_string(), json!(s.tags));
    }
    Ok((StatusCode::OK, Json(body)))
}
