//! Image generation, editing, and retrieval endpoints.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{
    CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use axum::http::response::Builder;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose;
use chrono::Utc;
use futures_util::future::join_all;
use httpdate::{fmt_http_date, parse_http_date};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::constants::{IMAGE_CACHE_CONTROL, IMAGE_MODEL, MAX_PHOTOS_PER_PAGE};
use crate::error::ColorpageError;
use crate::openai::{
    EditParams, GenerateParams, ImageData, OutputFormat, UploadedImage, validate_output_format,
};
use crate::prompt::{PageType, canvas_size_for, generate_prompt};
use crate::storage::{ImageStore, content_type_for, is_safe_filename};
use crate::web::AppState;

/// Text fields an image request may carry; files are gathered separately.
#[derive(Debug, Default)]
pub(crate) struct ImageFormFields {
    pub(crate) mode: Option<String>,
    pub(crate) prompt: Option<String>,
    pub(crate) password_hash: Option<String>,
    pub(crate) n: Option<String>,
    pub(crate) size: Option<String>,
    pub(crate) quality: Option<String>,
    pub(crate) output_format: Option<String>,
    pub(crate) output_compression: Option<String>,
    pub(crate) background: Option<String>,
    pub(crate) moderation: Option<String>,
    pub(crate) coloring_page_type: Option<String>,
    pub(crate) name_or_message: Option<String>,
    pub(crate) scene_description: Option<String>,
    pub(crate) orientation: Option<String>,
    pub(crate) individual_names: Option<String>,
}

/// One image in the generation response.
#[derive(Debug, Serialize)]
pub(crate) struct SavedImage {
    pub(crate) filename: String,
    pub(crate) b64_json: String,
    pub(crate) output_format: String,
    #[serde(rename = "fileId", skip_serializing_if = "Option::is_none")]
    pub(crate) file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) path: Option<String>,
}

/// Body returned by the generation endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct GenerationResponse {
    pub(crate) images: Vec<SavedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) usage: Option<Value>,
}

fn internal(err: impl std::fmt::Display) -> ColorpageError {
    ColorpageError::InternalServerError(err.to_string())
}

/// Mirrors browser form semantics where an empty string means "not set".
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

/// Parses a requested image count, clamped to the vendor's [1, 10] range;
/// anything unparsable counts as 1.
pub(crate) fn clamped_count(raw: Option<&str>) -> u8 {
    let requested = raw.and_then(|value| value.parse::<i64>().ok()).unwrap_or(1);
    requested.clamp(1, i64::from(crate::constants::MAX_IMAGES_PER_REQUEST)) as u8
}

fn sniff_photo(filename: String, bytes: Vec<u8>) -> Result<UploadedImage, ColorpageError> {
    let format = image::guess_format(&bytes).map_err(|_| {
        ColorpageError::BadRequest(format!(
            "Attached file {} is not a recognized image",
            filename
        ))
    })?;
    let content_type = match format {
        image::ImageFormat::Png | image::ImageFormat::Jpeg | image::ImageFormat::WebP => {
            format.to_mime_type().to_string()
        }
        _ => {
            return Err(ColorpageError::BadRequest(format!(
                "Attached file {} must be a PNG, JPEG, or WebP image",
                filename
            )));
        }
    };
    Ok(UploadedImage {
        filename,
        content_type,
        bytes,
    })
}

async fn collect_form(
    mut multipart: Multipart,
) -> Result<(ImageFormFields, Vec<UploadedImage>, Option<UploadedImage>), ColorpageError> {
    let mut fields = ImageFormFields::default();
    let mut photos: Vec<UploadedImage> = Vec::new();
    let mut mask: Option<UploadedImage> = None;

    while let Some(field) = multipart.next_field().await.map_err(internal)? {
        let field_name = field.name().unwrap_or_default().to_string();
        if field_name.starts_with("image_") {
            let filename = field
                .file_name()
                .map(str::to_string)
                .unwrap_or_else(|| field_name.clone());
            let bytes = field.bytes().await.map_err(internal)?;
            photos.push(sniff_photo(filename, bytes.to_vec())?);
            continue;
        }
        match field_name.as_str() {
            "mask" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "mask.png".to_string());
                let bytes = field.bytes().await.map_err(internal)?;
                mask = Some(sniff_photo(filename, bytes.to_vec())?);
            }
            "mode" => fields.mode = Some(field.text().await.map_err(internal)?),
            "prompt" => fields.prompt = Some(field.text().await.map_err(internal)?),
            "passwordHash" => fields.password_hash = Some(field.text().await.map_err(internal)?),
            "n" => fields.n = Some(field.text().await.map_err(internal)?),
            "size" => fields.size = Some(field.text().await.map_err(internal)?),
            "quality" => fields.quality = Some(field.text().await.map_err(internal)?),
            "output_format" => {
                fields.output_format = Some(field.text().await.map_err(internal)?)
            }
            "output_compression" => {
                fields.output_compression = Some(field.text().await.map_err(internal)?)
            }
            "background" => fields.background = Some(field.text().await.map_err(internal)?),
            "moderation" => fields.moderation = Some(field.text().await.map_err(internal)?),
            "coloringPageType" => {
                fields.coloring_page_type = Some(field.text().await.map_err(internal)?)
            }
            "nameOrMessage" => {
                fields.name_or_message = Some(field.text().await.map_err(internal)?)
            }
            "sceneDescription" => {
                fields.scene_description = Some(field.text().await.map_err(internal)?)
            }
            "orientation" => fields.orientation = Some(field.text().await.map_err(internal)?),
            "individualNames" => {
                fields.individual_names = Some(field.text().await.map_err(internal)?)
            }
            _ => {}
        }
    }

    Ok((fields, photos, mask))
}

fn parse_individual_names(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = non_empty(raw) else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(names) => names,
        Err(err) => {
            warn!("Ignoring unparsable individualNames field: {}", err);
            Vec::new()
        }
    }
}

pub(crate) fn build_generate_params(prompt: String, fields: &ImageFormFields) -> GenerateParams {
    let output_format = validate_output_format(fields.output_format.as_deref());
    let output_compression = non_empty(fields.output_compression.as_deref())
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|compression| (0..=100).contains(compression))
        .map(|compression| compression as u8)
        .filter(|_| output_format.supports_compression());

    GenerateParams {
        model: IMAGE_MODEL,
        prompt,
        n: clamped_count(fields.n.as_deref()),
        size: non_empty(fields.size.as_deref())
            .unwrap_or("1024x1024")
            .to_string(),
        quality: non_empty(fields.quality.as_deref())
            .unwrap_or("medium")
            .to_string(),
        output_format: output_format.as_str().to_string(),
        output_compression,
        background: non_empty(fields.background.as_deref())
            .unwrap_or("auto")
            .to_string(),
        moderation: non_empty(fields.moderation.as_deref())
            .unwrap_or("auto")
            .to_string(),
    }
}

pub(crate) fn build_edit_params(
    prompt: String,
    fields: &ImageFormFields,
    photos: Vec<UploadedImage>,
    mask: Option<UploadedImage>,
) -> Result<EditParams, ColorpageError> {
    if photos.is_empty() {
        return Err(ColorpageError::BadRequest(
            "No image file provided for editing.".to_string(),
        ));
    }

    if let Some(page_type) = non_empty(fields.coloring_page_type.as_deref()) {
        if let Ok(parsed) = page_type.parse::<PageType>() {
            if parsed == PageType::StraightCopy && photos.len() != 1 {
                return Err(ColorpageError::BadRequest(
                    "A straight copy page takes exactly one photo".to_string(),
                ));
            }
            if photos.len() > MAX_PHOTOS_PER_PAGE {
                return Err(ColorpageError::BadRequest(format!(
                    "A coloring page takes at most {} photos",
                    MAX_PHOTOS_PER_PAGE
                )));
            }
        }

        let labels = parse_individual_names(fields.individual_names.as_deref());
        let prompt = generate_prompt(
            page_type,
            fields.name_or_message.as_deref().unwrap_or(""),
            &labels,
            non_empty(fields.background.as_deref()).unwrap_or("plain"),
            non_empty(fields.scene_description.as_deref()),
        );

        return Ok(EditParams {
            prompt,
            n: 1,
            size: Some(canvas_size_for(fields.orientation.as_deref()).to_string()),
            quality: Some("medium".to_string()),
            images: photos,
            mask,
        });
    }

    let size = match non_empty(fields.size.as_deref()).unwrap_or("auto") {
        "auto" => None,
        other => Some(other.to_string()),
    };
    let quality = match non_empty(fields.quality.as_deref()).unwrap_or("high") {
        "auto" => None,
        other => Some(other.to_string()),
    };

    Ok(EditParams {
        prompt,
        n: clamped_count(fields.n.as_deref()),
        size,
        quality,
        images: photos,
        mask,
    })
}

/// Decodes and persists every vendor image. Stores run concurrently and fail
/// independently: a failed store degrades that image to inline-only.
pub(crate) async fn persist_images(
    store: &ImageStore,
    data: Vec<ImageData>,
    format: OutputFormat,
) -> Result<Vec<SavedImage>, ColorpageError> {
    let timestamp = Utc::now().timestamp_millis();

    let saves = data.into_iter().enumerate().map(|(index, image)| async move {
        let b64_json = image.b64_json.ok_or_else(|| {
            ColorpageError::InternalServerError(format!(
                "Image data at index {} is missing base64 data",
                index
            ))
        })?;
        let bytes = general_purpose::STANDARD.decode(&b64_json).map_err(|err| {
            ColorpageError::InternalServerError(format!(
                "Image data at index {} is not valid base64: {}",
                index, err
            ))
        })?;

        let filename = format!("{}-{}.{}", timestamp, index, format.as_str());
        let stored = match store.store(&bytes, format.as_str()).await {
            Ok(stored) => stored,
            Err(err) => {
                error!(
                    "Failed to persist image {}, returning it inline: {:?}",
                    filename, err
                );
                None
            }
        };
        let (file_id, path) = match stored {
            Some(stored) => (Some(stored.file_id), Some(stored.path)),
            None => (None, None),
        };

        Ok(SavedImage {
            filename,
            b64_json,
            output_format: format.as_str().to_string(),
            file_id,
            path,
        })
    });

    join_all(saves).await.into_iter().collect()
}

/// `POST /api/images` — the generation/edit orchestrator.
pub(crate) async fn create_images_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<GenerationResponse>, ColorpageError> {
    let (fields, photos, mask) = collect_form(multipart).await?;

    if let Some(expected) = state.password_hash.as_deref() {
        match fields.password_hash.as_deref() {
            None => {
                return Err(ColorpageError::Unauthorized(
                    "Unauthorized: Missing password hash.".to_string(),
                ));
            }
            Some(supplied) if supplied != expected => {
                return Err(ColorpageError::Unauthorized(
                    "Unauthorized: Invalid password.".to_string(),
                ));
            }
            Some(_) => {}
        }
    }

    let (Some(mode), Some(prompt)) = (fields.mode.clone(), fields.prompt.clone()) else {
        return Err(ColorpageError::BadRequest(
            "Missing required parameters: mode and prompt".to_string(),
        ));
    };

    let output_format = validate_output_format(fields.output_format.as_deref());
    let result = match mode.as_str() {
        "generate" => {
            let params = build_generate_params(prompt, &fields);
            state.openai.generate(&params).await?
        }
        "edit" => {
            let params = build_edit_params(prompt, &fields, photos, mask)?;
            state.openai.edit(params).await?
        }
        _ => {
            return Err(ColorpageError::BadRequest(
                "Invalid mode specified".to_string(),
            ));
        }
    };

    if result.data.is_empty() {
        return Err(ColorpageError::InternalServerError(
            "Failed to retrieve image data from API.".to_string(),
        ));
    }

    let images = persist_images(&state.store, result.data, output_format).await?;

    Ok(Json(GenerationResponse {
        images,
        usage: result.usage,
    }))
}

/// `GET /api/image/{filename}` — serves a stored image with long-lived cache
/// headers. Traversal-shaped names are rejected before any storage lookup.
pub(crate) async fn get_image_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> Result<Response, ColorpageError> {
    if !is_safe_filename(&filename) {
        return Err(ColorpageError::BadRequest("Invalid filename".to_string()));
    }

    let (bytes, metadata) = state.store.read(&filename).await?;
    let cache = StoredImageCacheHeaders::from_metadata(&metadata);
    if is_not_modified(&headers, &cache) {
        return not_modified_response(&cache);
    }

    let builder = Response::builder().header(CONTENT_TYPE, content_type_for(&filename));
    let builder = apply_cache_headers(builder, &cache);
    builder
        .body(Body::from(bytes))
        .map_err(ColorpageError::from)
}

/// Cache headers derived from stored-image metadata.
#[derive(Clone, Debug)]
struct StoredImageCacheHeaders {
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
    modified_at: Option<SystemTime>,
}

impl StoredImageCacheHeaders {
    fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let modified_at = metadata.modified().ok();
        let etag = build_etag(metadata.len(), modified_at);
        let last_modified =
            modified_at.and_then(|modified| HeaderValue::from_str(&fmt_http_date(modified)).ok());
        Self {
            etag,
            last_modified,
            modified_at,
        }
    }
}

/// Applies the immutable-image cache headers to a response builder.
fn apply_cache_headers(mut builder: Builder, cache: &StoredImageCacheHeaders) -> Builder {
    builder = builder.header(CACHE_CONTROL, IMAGE_CACHE_CONTROL);
    if let Some(etag) = &cache.etag {
        builder = builder.header(ETAG, etag.clone());
    }
    if let Some(last_modified) = &cache.last_modified {
        builder = builder.header(LAST_MODIFIED, last_modified.clone());
    }
    builder
}

/// Returns true when the request's conditional headers match the stored file.
fn is_not_modified(headers: &HeaderMap, cache: &StoredImageCacheHeaders) -> bool {
    if let Some(if_none_match) = headers.get(IF_NONE_MATCH) {
        if let Ok(value) = if_none_match.to_str() {
            let value = value.trim();
            if value == "*" {
                return true;
            }
            if let Some(etag) = cache.etag.as_ref().and_then(|etag| etag.to_str().ok())
                && value.split(',').any(|candidate| candidate.trim() == etag)
            {
                return true;
            }
        }
        return false;
    }

    if let (Some(if_modified_since), Some(modified_at)) =
        (headers.get(IF_MODIFIED_SINCE), cache.modified_at)
        && let Ok(value) = if_modified_since.to_str()
        && let Ok(since) = parse_http_date(value)
        && modified_at <= since
    {
        return true;
    }

    false
}

/// Builds a 304 response that preserves the cache headers.
fn not_modified_response(cache: &StoredImageCacheHeaders) -> Result<Response, ColorpageError> {
    let builder = Response::builder().status(StatusCode::NOT_MODIFIED);
    let builder = apply_cache_headers(builder, cache);
    builder.body(Body::empty()).map_err(ColorpageError::from)
}

fn build_etag(size: u64, modified_at: Option<SystemTime>) -> Option<HeaderValue> {
    let suffix = match modified_at {
        Some(modified) => modified
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs().to_string())
            .unwrap_or_else(|_| "0".to_string()),
        None => "0".to_string(),
    };
    let value = format!("W/\"{}-{}\"", size, suffix);
    HeaderValue::from_str(&value).ok()
}
