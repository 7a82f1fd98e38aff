//! Process configuration loaded from environment variables.
//!
//! Everything has a development default except the credentials the service
//! cannot run without. Values are read through a lookup function so tests
//! can supply a map instead of mutating the process environment.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reelgen_backends::candidate::{
    default_candidates, load_candidates, BackendCandidate, CandidateError,
};
use reelgen_cloud::storage::{LinkMode, StorageSettings};
use reelgen_core::config::GenerationConfig;
use reelgen_core::error::CoreError;
use reelgen_core::generation::BackendKind;
use reelgen_worker::PoolConfig;

pub const DEFAULT_JOB_MODEL: &str = "cerspencer/stable-video-diffusion-img2vid-xt";
pub const DEFAULT_FRAME_API_BASE: &str = "https://image.pollinations.ai/prompt";
pub const DEFAULT_AWS_REGION: &str = "ap-south-1";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Failed to read candidates file {path}: {source}")]
    CandidatesFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Candidates(#[from] CandidateError),
}

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn parse<T>(&self, name: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(name)
            .map(|raw| {
                raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                    name,
                    value: raw.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn parse_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.parse(name)?.unwrap_or(default))
    }

    fn secs_or(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        match self.parse::<f64>(name)? {
            None => Ok(default),
            Some(secs) => Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::Invalid {
                name,
                value: secs.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Parse `#rrggbb` (leading `#` optional).
pub fn parse_hex_color(raw: &str) -> Option<[u8; 3]> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `10000`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight work (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10000,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// | Env Var                 | Default   |
    /// |-------------------------|-----------|
    /// | `HOST`                  | `0.0.0.0` |
    /// | `PORT`                  | `10000`   |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`      |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`      |
    fn from_vars<F: Fn(&str) -> Option<String>>(vars: &Vars<F>) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            host: vars.get("HOST").unwrap_or(d.host),
            port: vars.parse_or("PORT", d.port)?,
            request_timeout_secs: vars.parse_or("REQUEST_TIMEOUT_SECS", d.request_timeout_secs)?,
            shutdown_timeout_secs: vars
                .parse_or("SHUTDOWN_TIMEOUT_SECS", d.shutdown_timeout_secs)?,
        })
    }
}

// ---------------------------------------------------------------------------
// BackendSettings
// ---------------------------------------------------------------------------

/// Where the generation backends live and how to authenticate.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Root of the job API; required for job-based generation.
    pub job_api_base: Option<String>,
    pub job_api_token: Option<String>,
    pub job_model: String,
    /// JSON candidate list replacing the built-in one.
    pub candidates_file: Option<PathBuf>,
    pub frame_api_base: String,
}

impl BackendSettings {
    /// The ordered candidate list for the job path.
    pub fn candidates(&self) -> Result<Vec<BackendCandidate>, ConfigError> {
        let token = self.job_api_token.as_deref().unwrap_or_default();
        if let Some(path) = &self.candidates_file {
            let json =
                std::fs::read_to_string(path).map_err(|source| ConfigError::CandidatesFile {
                    path: path.clone(),
                    source,
                })?;
            return Ok(load_candidates(&json, token)?);
        }
        let base = self
            .job_api_base
            .as_deref()
            .ok_or(ConfigError::Missing("JOB_API_BASE"))?;
        Ok(default_candidates(base, token, &self.job_model))
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Everything the binary needs to wire the service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub pool: PoolConfig,
    pub backends: BackendSettings,
    pub storage: StorageSettings,
    pub slack_bot_token: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| map.get(name).cloned())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        let vars = Vars(lookup);

        let generation = generation_from_vars(&vars)?;
        generation.validate()?;

        let pool = PoolConfig {
            worker_count: vars.parse_or("WORKER_COUNT", PoolConfig::default().worker_count)?,
            queue_capacity: vars
                .parse_or("QUEUE_CAPACITY", PoolConfig::default().queue_capacity)?,
        };
        if pool.worker_count == 0 || pool.queue_capacity == 0 {
            return Err(CoreError::Validation(
                "WORKER_COUNT and QUEUE_CAPACITY must be at least 1".to_string(),
            )
            .into());
        }

        let backends = BackendSettings {
            job_api_base: vars.get("JOB_API_BASE"),
            job_api_token: vars.get("JOB_API_TOKEN"),
            job_model: vars
                .get("JOB_MODEL")
                .unwrap_or_else(|| DEFAULT_JOB_MODEL.to_string()),
            candidates_file: vars.get("JOB_CANDIDATES_FILE").map(PathBuf::from),
            frame_api_base: vars
                .get("FRAME_API_BASE")
                .unwrap_or_else(|| DEFAULT_FRAME_API_BASE.to_string()),
        };
        if generation.backend_kind == BackendKind::JobBased && backends.job_api_token.is_none() {
            return Err(ConfigError::Missing("JOB_API_TOKEN"));
        }

        let link_mode = match vars.parse::<u64>("S3_PRESIGN_TTL_SECS")? {
            Some(secs) => LinkMode::Presigned {
                ttl: Duration::from_secs(secs),
            },
            None => LinkMode::Public,
        };
        let storage = StorageSettings {
            bucket: vars.require("S3_BUCKET")?,
            region: vars
                .get("AWS_REGION")
                .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
            access_key_id: vars.get("AWS_ID"),
            secret_access_key: vars.get("AWS_KEY"),
            endpoint_url: vars.get("S3_ENDPOINT_URL"),
            link_mode,
        };

        Ok(Self {
            server: ServerConfig::from_vars(&vars)?,
            generation,
            pool,
            backends,
            storage,
            slack_bot_token: vars.require("SLACK_BOT_TOKEN")?,
        })
    }
}

/// | Env Var                   | Default   |
/// |---------------------------|-----------|
/// | `FRAME_WIDTH`             | `768`     |
/// | `FRAME_HEIGHT`            | `432`     |
/// | `PLACEHOLDER_COLOR`       | `#202020` |
/// | `MAX_ATTEMPTS`            | `4`       |
/// | `BACKOFF_BASE_SECS`       | `2`       |
/// | `ATTEMPT_TIMEOUT_SECS`    | `90`      |
/// | `POLL_INTERVAL_SECS`      | `4`       |
/// | `JOB_DEADLINE_SECS`       | `600`     |
/// | `CLIP_FPS`                | `24`      |
/// | `FRAME_COUNT`             | `6`       |
/// | `CLIP_DURATION_SECS`      | `3`       |
/// | `BACKEND_KIND`            | `frame`   |
/// | `FRAME_FETCH_CONCURRENCY` | `3`       |
fn generation_from_vars<F: Fn(&str) -> Option<String>>(
    vars: &Vars<F>,
) -> Result<GenerationConfig, ConfigError> {
    let d = GenerationConfig::default();

    let placeholder_color = match vars.get("PLACEHOLDER_COLOR") {
        None => d.placeholder_color,
        Some(raw) => parse_hex_color(&raw).ok_or_else(|| ConfigError::Invalid {
            name: "PLACEHOLDER_COLOR",
            value: raw.clone(),
            reason: "expected #rrggbb".to_string(),
        })?,
    };

    Ok(GenerationConfig {
        frame_width: vars.parse_or("FRAME_WIDTH", d.frame_width)?,
        frame_height: vars.parse_or("FRAME_HEIGHT", d.frame_height)?,
        placeholder_color,
        max_attempts: vars.parse_or("MAX_ATTEMPTS", d.max_attempts)?,
        backoff_base: vars.secs_or("BACKOFF_BASE_SECS", d.backoff_base)?,
        attempt_timeout: vars.secs_or("ATTEMPT_TIMEOUT_SECS", d.attempt_timeout)?,
        poll_interval: vars.secs_or("POLL_INTERVAL_SECS", d.poll_interval)?,
        job_deadline: vars.secs_or("JOB_DEADLINE_SECS", d.job_deadline)?,
        fps: vars.parse_or("CLIP_FPS", d.fps)?,
        frame_count: vars.parse_or("FRAME_COUNT", d.frame_count)?,
        total_duration: vars.secs_or("CLIP_DURATION_SECS", d.total_duration)?,
        backend_kind: vars.parse_or("BACKEND_KIND", d.backend_kind)?,
        frame_fetch_concurrency: vars
            .parse_or("FRAME_FETCH_CONCURRENCY", d.frame_fetch_concurrency)?,
    })
}
