use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

const ENV_PREFIX: &str = "VIDEO_INGEST_";

/// Where published videos are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// An S3 (or S3-compatible) bucket.
    S3,
    /// A directory on this host, served back through signed local links.
    Local,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "local" => Ok(Self::Local),
            other => bail!("unknown storage backend `{}` (expected `s3` or `local`)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub temp_dir: PathBuf,
    pub backend: StorageBackend,
    pub storage_dir: PathBuf,
    pub public_base_url: String,
    pub bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_force_path_style: bool,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub tool_timeout: Duration,
    pub signed_url_ttl: Duration,
    pub jwt_secret: String,
    pub link_secret: String,
    pub max_upload_bytes: usize,
}

// Secrets stay out of the startup log line.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("temp_dir", &self.temp_dir)
            .field("backend", &self.backend)
            .field("storage_dir", &self.storage_dir)
            .field("public_base_url", &self.public_base_url)
            .field("bucket", &self.bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_force_path_style", &self.s3_force_path_style)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("ffprobe_path", &self.ffprobe_path)
            .field("tool_timeout", &self.tool_timeout)
            .field("signed_url_ttl", &self.signed_url_ttl)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish_non_exhaustive()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Video upload ingestion service")]
pub struct Args {
    /// Host to bind to (overrides VIDEO_INGEST_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VIDEO_INGEST_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides VIDEO_INGEST_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Scratch directory for uploads in flight (overrides VIDEO_INGEST_TEMP_DIR)
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Object storage backend (overrides VIDEO_INGEST_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<StorageBackend>,

    /// Directory for the local backend (overrides VIDEO_INGEST_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Base URL local playback links point at (overrides VIDEO_INGEST_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Destination bucket (overrides VIDEO_INGEST_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// S3 region (overrides VIDEO_INGEST_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Custom S3 endpoint, e.g. MinIO (overrides VIDEO_INGEST_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Use path-style S3 addressing (overrides VIDEO_INGEST_S3_FORCE_PATH_STYLE)
    #[arg(long)]
    pub s3_force_path_style: bool,

    /// ffmpeg executable (overrides VIDEO_INGEST_FFMPEG)
    #[arg(long)]
    pub ffmpeg: Option<String>,

    /// ffprobe executable (overrides VIDEO_INGEST_FFPROBE)
    #[arg(long)]
    pub ffprobe: Option<String>,

    /// Seconds an ffmpeg/ffprobe run may take (overrides VIDEO_INGEST_TOOL_TIMEOUT_SECS)
    #[arg(long)]
    pub tool_timeout_secs: Option<u64>,

    /// Lifetime of playback links in seconds (overrides VIDEO_INGEST_SIGNED_URL_TTL_SECS)
    #[arg(long)]
    pub signed_url_ttl_secs: Option<u64>,

    /// Largest accepted upload body (overrides VIDEO_INGEST_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge parsed flags over values from `lookup`, which receives full
    /// `VIDEO_INGEST_*` variable names.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let env_port = parse_var::<u16>(&var, "PORT")?.unwrap_or(8091);
        let env_backend = parse_var::<StorageBackend>(&var, "BACKEND")?;
        let env_tool_timeout = parse_var::<u64>(&var, "TOOL_TIMEOUT_SECS")?;
        let env_ttl = parse_var::<u64>(&var, "SIGNED_URL_TTL_SECS")?;
        let env_max_upload = parse_var::<usize>(&var, "MAX_UPLOAD_BYTES")?;
        let env_path_style = parse_var::<bool>(&var, "S3_FORCE_PATH_STYLE")?.unwrap_or(false);

        let host = args
            .host
            .or_else(|| var("HOST"))
            .unwrap_or_else(|| "0.0.0.0".into());
        let port = args.port.unwrap_or(env_port);

        let jwt_secret = var("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .context("VIDEO_INGEST_JWT_SECRET must be set")?;
        let link_secret = var("LINK_SECRET")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| jwt_secret.clone());

        let signed_url_ttl = Duration::from_secs(args.signed_url_ttl_secs.or(env_ttl).unwrap_or(300));
        if signed_url_ttl.is_zero() {
            bail!("signed URL lifetime must be positive");
        }
        let tool_timeout =
            Duration::from_secs(args.tool_timeout_secs.or(env_tool_timeout).unwrap_or(300));
        if tool_timeout.is_zero() {
            bail!("tool timeout must be positive");
        }

        Ok(Self {
            public_base_url: args
                .public_base_url
                .or_else(|| var("PUBLIC_BASE_URL"))
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            host,
            port,
            database_url: args
                .database_url
                .or_else(|| var("DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/meta/videos.db".into()),
            temp_dir: args
                .temp_dir
                .or_else(|| var("TEMP_DIR").map(PathBuf::from))
                .unwrap_or_else(env::temp_dir),
            backend: args.backend.or(env_backend).unwrap_or(StorageBackend::Local),
            storage_dir: args
                .storage_dir
                .or_else(|| var("STORAGE_DIR").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("./data/objects")),
            bucket: args
                .bucket
                .or_else(|| var("BUCKET"))
                .unwrap_or_else(|| "videos".into()),
            s3_region: args
                .s3_region
                .or_else(|| var("S3_REGION"))
                .unwrap_or_else(|| "us-east-1".into()),
            s3_endpoint: args.s3_endpoint.or_else(|| var("S3_ENDPOINT")),
            s3_force_path_style: args.s3_force_path_style || env_path_style,
            ffmpeg_path: args
                .ffmpeg
                .or_else(|| var("FFMPEG"))
                .unwrap_or_else(|| "ffmpeg".into()),
            ffprobe_path: args
                .ffprobe
                .or_else(|| var("FFPROBE"))
                .unwrap_or_else(|| "ffprobe".into()),
            tool_timeout,
            signed_url_ttl,
            jwt_secret,
            link_secret,
            max_upload_bytes: args
                .max_upload_bytes
                .or(env_max_upload)
                .unwrap_or(1 << 30),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match var(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("parsing {ENV_PREFIX}{name} value `{value}`: {err}")),
        None => Ok(None),
    }
}
