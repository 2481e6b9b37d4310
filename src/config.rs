//! CLI arguments and server configuration defaults.

use clap::Parser;
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const MAX_CHUNK_SIZE: u64 = 16 * 1024 * 1024;
pub const ARTIFACT_DIR: &str = "uploads";
pub const SCRATCH_DIR: &str = "scratch";
pub const DEFAULT_ARTIFACT_EXT: &str = "jpg";
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_PENDING_MAX: u64 = 64;
pub const DEFAULT_PENDING_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_LOCK_WAIT_TIMEOUT_SECS: u64 = 30;
pub const PENDING_SWEEP_INTERVAL_SECS: u64 = 900;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "pixdrop", version = VERSION_INFO, about = "PixDrop image upload server")]
pub struct Args {
    #[arg(
        short = 'd',
        long,
        env = "PIXDROP_DATA_DIR",
        default_value = ".pixdrop",
        help = "Data directory holding stored images and in-flight chunk buffers"
    )]
    pub data_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "PIXDROP_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "PIXDROP_PORT",
        default_value_t = 5000,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "PIXDROP_PUBLIC_BASE_URL",
        help = "External base URL used when building image links (e.g. https://img.example.com)"
    )]
    pub public_base_url: Option<String>,
    #[arg(long, env = "PIXDROP_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "PIXDROP_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload size in bytes (0 to disable)"
    )]
    pub upload_max_size: u64,
    #[arg(
        long,
        env = "PIXDROP_PENDING_MAX",
        default_value_t = DEFAULT_PENDING_MAX,
        help = "Max concurrent in-flight chunked uploads (0 to disable)"
    )]
    pub pending_max: u64,
    #[arg(
        long,
        env = "PIXDROP_PENDING_TTL_SECS",
        default_value_t = DEFAULT_PENDING_TTL_SECS,
        help = "Age after which abandoned chunk buffers are swept, in seconds (0 to disable)"
    )]
    pub pending_ttl_secs: u64,
}
