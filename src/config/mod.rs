use std::env;

/// Remote asset-repository configuration, passed into the content client at
/// construction instead of living as process-wide ambient state.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// REST API base URL (default: "https://api.github.com")
    pub api_base: String,

    /// Target repository as "owner/name"
    pub repository: String,

    /// Personal access token used for authenticated calls
    pub token: String,

    /// Branch used when the default branch cannot be resolved (default: "main")
    pub fallback_branch: String,

    /// Directory prefix inside the repository (default: "images")
    pub prefix: String,

    /// Per-call timeout for remote HTTP requests in seconds (default: 30)
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            repository: "example/image-assets".to_string(),
            token: String::new(),
            fallback_branch: "main".to_string(),
            prefix: "images".to_string(),
            timeout_secs: 30,
        }
    }
}

impl RemoteConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            api_base: env::var("GITHUB_API_BASE").unwrap_or(default.api_base),

            repository: env::var("GITHUB_REPO").unwrap_or(default.repository),

            token: env::var("GITHUB_TOKEN")
                .or_else(|_| env::var("GITHUB_PAT"))
                .unwrap_or(default.token),

            fallback_branch: env::var("GITHUB_BRANCH").unwrap_or(default.fallback_branch),

            prefix: env::var("REMOTE_PREFIX").unwrap_or(default.prefix),

            timeout_secs: env::var("REMOTE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.timeout_secs),
        }
    }
}

/// Application configuration loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Staging directory for validated uploads (default: "/tmp/images")
    pub staging_dir: String,

    /// Maximum request body size in bytes (default: 10 MB)
    pub max_upload_size: usize,

    /// Longest allowed image side in pixels; larger images are scaled down
    /// (default: 1024)
    pub max_dimension: u32,

    /// Re-encode quality for lossy formats (default: 85)
    pub jpeg_quality: u8,

    /// Interval between scheduled sync cycles in seconds (default: 600)
    pub sync_interval_secs: u64,

    /// Base URL under which pushed assets become publicly reachable; when
    /// unset, the raw-content URL of the configured repository is used
    pub asset_base_url: Option<String>,

    /// HTTP listen port (default: 3000)
    pub port: u16,

    pub remote: RemoteConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            staging_dir: "/tmp/images".to_string(),
            max_upload_size: 10 * 1024 * 1024, // 10 MB
            max_dimension: 1024,
            jpeg_quality: 85,
            sync_interval_secs: 600,
            asset_base_url: None,
            port: 3000,
            remote: RemoteConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            staging_dir: env::var("UPLOAD_DIR").unwrap_or(default.staging_dir),

            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),

            max_dimension: env::var("MAX_IMAGE_DIMENSION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_dimension),

            jpeg_quality: env::var("JPEG_QUALITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.jpeg_quality),

            sync_interval_secs: env::var("SYNC_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.sync_interval_secs),

            asset_base_url: env::var("ASSET_BASE_URL").ok(),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            remote: RemoteConfig::from_env(),
        }
    }

    /// Public URL a pushed asset ends up at. Deterministic per local name.
    pub fn asset_url(&self, local_name: &str) -> String {
        match &self.asset_base_url {
            Some(base) => format!(
                "{}/{}/{}",
                base.trim_end_matches('/'),
                self.remote.prefix,
                local_name
            ),
            None => format!(
                "https://raw.githubusercontent.com/{}/{}/{}/{}",
                self.remote.repository, self.remote.fallback_branch, self.remote.prefix, local_name
            ),
        }
    }
}
