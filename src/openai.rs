//! OpenAI Images API client.
//!
//! One reqwest client handles both endpoints the service uses:
//! `/images/generations` (JSON body) and `/images/edits` (multipart with the
//! attached photos). Vendor failures carry their reported status and message
//! back to the caller untouched.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::IMAGE_MODEL;
use crate::error::ColorpageError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Output formats the Images API can return.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputFormat {
    /// Lossless, the default
    Png,
    /// Accepts an output_compression value
    Jpeg,
    /// Accepts an output_compression value
    Webp,
}

impl OutputFormat {
    /// Wire name, doubling as the file extension.
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Webp => "webp",
        }
    }

    /// True when the format supports the compression knob.
    pub fn supports_compression(self) -> bool {
        matches!(self, OutputFormat::Jpeg | OutputFormat::Webp)
    }
}

impl FromStr for OutputFormat {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "png" => Ok(OutputFormat::Png),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "webp" => Ok(OutputFormat::Webp),
            _ => Err(()),
        }
    }
}

/// Normalizes a client-supplied output format: `jpg` maps to `jpeg`, unknown
/// or missing values fall back to `png`.
pub fn validate_output_format(raw: Option<&str>) -> OutputFormat {
    raw.map(|value| value.to_ascii_lowercase())
        .and_then(|value| value.parse().ok())
        .unwrap_or(OutputFormat::Png)
}

/// Request body for POST /v1/images/generations
#[derive(Debug, Serialize)]
pub struct GenerateParams {
    /// image model id
    pub model: &'static str,
    /// prompt text forwarded verbatim
    pub prompt: String,
    /// image count, already clamped by the caller
    pub n: u8,
    /// canvas size
    pub size: String,
    /// render quality tier
    pub quality: String,
    /// png/jpeg/webp
    pub output_format: String,
    /// only meaningful for jpeg/webp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_compression: Option<u8>,
    /// vendor background treatment
    pub background: String,
    /// vendor moderation level
    pub moderation: String,
}

/// One photo (or mask) forwarded to the edits endpoint.
#[derive(Clone, Debug)]
pub struct UploadedImage {
    /// original multipart filename
    pub filename: String,
    /// sniffed MIME type
    pub content_type: String,
    /// raw file bytes
    pub bytes: Vec<u8>,
}

/// Inputs for POST /v1/images/edits.
#[derive(Debug)]
pub struct EditParams {
    /// prompt text
    pub prompt: String,
    /// image count, already clamped by the caller
    pub n: u8,
    /// canvas size; `None` lets the vendor pick
    pub size: Option<String>,
    /// quality tier; `None` lets the vendor pick
    pub quality: Option<String>,
    /// attached photos, at least one
    pub images: Vec<UploadedImage>,
    /// optional inpainting mask
    pub mask: Option<UploadedImage>,
}

/// One image in a vendor response.
#[derive(Debug, Deserialize)]
pub struct ImageData {
    /// base64-encoded image payload
    pub b64_json: Option<String>,
}

/// Body of a successful vendor response.
#[derive(Debug, Deserialize)]
pub struct ImagesApiResponse {
    /// generated images
    #[serde(default)]
    pub data: Vec<ImageData>,
    /// token usage metadata, passed through to the caller verbatim
    #[serde(default)]
    pub usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Client for the OpenAI Images API.
#[derive(Clone, Debug)]
pub struct ImageClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ImageClient {
    /// Builds a client; `base_url` overrides the public API endpoint.
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }

    /// Calls /images/generations.
    pub async fn generate(
        &self,
        params: &GenerateParams,
    ) -> Result<ImagesApiResponse, ColorpageError> {
        let response = self
            .http
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(params)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Calls /images/edits with the attached photos.
    pub async fn edit(&self, params: EditParams) -> Result<ImagesApiResponse, ColorpageError> {
        let mut form = reqwest::multipart::Form::new()
            .text("model", IMAGE_MODEL)
            .text("prompt", params.prompt)
            .text("n", params.n.to_string());
        if let Some(size) = params.size {
            form = form.text("size", size);
        }
        if let Some(quality) = params.quality {
            form = form.text("quality", quality);
        }
        for photo in params.images {
            form = form.part("image[]", Self::file_part(photo)?);
        }
        if let Some(mask) = params.mask {
            form = form.part("mask", Self::file_part(mask)?);
        }

        let response = self
            .http
            .post(format!("{}/images/edits", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    fn file_part(image: UploadedImage) -> Result<reqwest::multipart::Part, ColorpageError> {
        reqwest::multipart::Part::bytes(image.bytes)
            .file_name(image.filename)
            .mime_str(&image.content_type)
            .map_err(ColorpageError::from)
    }

    async fn parse_response(
        response: reqwest::Response,
    ) -> Result<ImagesApiResponse, ColorpageError> {
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ApiErrorBody>(&bytes)
                .ok()
                .and_then(|body| body.error)
                .and_then(|detail| detail.message)
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).to_string());
            return Err(ColorpageError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&bytes).map_err(|err| {
            ColorpageError::InternalServerError(format!(
                "Failed to parse image API response: {}",
                err
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_normalizes_aliases() {
        assert_eq!(validate_output_format(Some("jpg")), OutputFormat::Jpeg);
        assert_eq!(validate_output_format(Some("JPEG")), OutputFormat::Jpeg);
        assert_eq!(validate_output_format(Some("webp")), OutputFormat::Webp);
        assert_eq!(validate_output_format(Some("tiff")), OutputFormat::Png);
        assert_eq!(validate_output_format(None), OutputFormat::Png);
    }

    #[test]
    fn compression_only_for_lossy_formats() {
        assert!(OutputFormat::Jpeg.supports_compression());
        assert!(OutputFormat::Webp.supports_compression());
        assert!(!OutputFormat::Png.supports_compression());
    }

    #[test]
    fn generate_params_skip_missing_compression() {
        let params = GenerateParams {
            model: IMAGE_MODEL,
            prompt: "a goat".to_string(),
            n: 1,
            size: "1024x1024".to_string(),
            quality: "medium".to_string(),
            output_format: "png".to_string(),
            output_compression: None,
            background: "auto".to_string(),
            moderation: "auto".to_string(),
        };
        let encoded = serde_json::to_value(&params).expect("serialize params");
        assert!(encoded.get("output_compression").is_none());
        assert_eq!(encoded["model"], IMAGE_MODEL);
    }
}
