//! Shared constants for things
//!

/// The image model every vendor call uses.
pub const IMAGE_MODEL: &str = "gpt-image-1.5";

/// Credits a fresh profile starts with.
pub const SIGNUP_CREDITS: i32 = 3;

/// Flat cost of one coloring-page request, regardless of photo count.
pub const CREDITS_PER_PAGE: i32 = 1;

/// Credits applied when a webhook session carries no usable metadata value.
pub const DEFAULT_WEBHOOK_CREDITS: i32 = 10;

/// Ceiling for the per-request image count.
pub const MAX_IMAGES_PER_REQUEST: u8 = 10;

/// Most photos a single coloring page may combine.
pub const MAX_PHOTOS_PER_PAGE: usize = 4;

/// Length of generated file and profile ids.
pub const OPAQUE_ID_LENGTH: usize = 20;

/// Cache-Control value for stored image responses.
pub const IMAGE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Upper bound on multipart request bodies (photos are forwarded verbatim).
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
