//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;
use std::path::PathBuf;

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "COLORPAGE_DEBUG")]
    /// Enable debug logging. Env: COLORPAGE_DEBUG
    pub debug: bool,

    #[clap(long, short, default_value = "9000", env = "COLORPAGE_PORT")]
    /// http listener port, defaults to `9000`.
    /// Env: COLORPAGE_PORT
    pub port: NonZeroU16,

    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "COLORPAGE_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: COLORPAGE_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, short, env = "COLORPAGE_DATABASE_PATH")]
    /// Path to the database file, eg `/data/colorpage.sqlite`.
    /// Env: COLORPAGE_DATABASE_PATH
    pub database_path: Option<String>,

    #[clap(long, default_value = "./images", env = "COLORPAGE_IMAGE_DIR")]
    /// Directory generated images are stored in when storage mode is `hosted`.
    /// Env: COLORPAGE_IMAGE_DIR
    pub image_dir: PathBuf,

    #[clap(long, default_value = "hosted", env = "COLORPAGE_STORAGE_MODE")]
    /// Image storage mode, `hosted` (server-side) or `local` (browser keeps
    /// the inline copy). Env: COLORPAGE_STORAGE_MODE
    pub storage_mode: String,

    #[clap(
        long,
        default_value = "http://localhost:9000",
        env = "COLORPAGE_PUBLIC_BASE_URL"
    )]
    /// Public base URL used for checkout redirect targets.
    /// Env: COLORPAGE_PUBLIC_BASE_URL
    pub public_base_url: String,

    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    /// OpenAI API key. Env: OPENAI_API_KEY
    pub openai_api_key: String,

    #[clap(long, env = "OPENAI_API_BASE_URL")]
    /// Override for the OpenAI API base URL. Env: OPENAI_API_BASE_URL
    pub openai_api_base_url: Option<String>,

    #[clap(long, env = "COLORPAGE_APP_PASSWORD", hide_env_values = true)]
    /// Shared password protecting the generation endpoint; unset disables the
    /// gate. Env: COLORPAGE_APP_PASSWORD
    pub app_password: Option<String>,

    #[clap(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    /// Stripe secret key; unset disables checkout. Env: STRIPE_SECRET_KEY
    pub stripe_secret_key: Option<String>,

    #[clap(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true)]
    /// Stripe webhook signing secret; unset disables the webhook.
    /// Env: STRIPE_WEBHOOK_SECRET
    pub stripe_webhook_secret: Option<String>,
}
