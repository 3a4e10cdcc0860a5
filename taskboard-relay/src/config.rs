//! Configuration for the Taskboard relay.
//!
//! Values are layered, highest priority first:
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard-relay/config.toml`)
//! 4. Compiled defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use taskboard::board::{BoardPolicy, DEFAULT_ACCEPT_URL};
use taskboard::credentials::StaticCredentials;
use taskboard::identity::{Email, Principal};
use taskboard_proto::id::UserId;
use url::Url;

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The invitation accept link is not a valid URL.
    #[error("invalid accept_url {url:?}: {source}")]
    AcceptUrl {
        /// The configured value.
        url: String,
        /// Parser error.
        source: url::ParseError,
    },

    /// A `[[users]]` entry is malformed.
    #[error("invalid user entry #{index}: {reason}")]
    User {
        /// Zero-based position in the file.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RelayConfigFile {
    server: ServerFileConfig,
    invitations: InvitationFileConfig,
    logging: LoggingFileConfig,
    users: Vec<UserFileEntry>,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    max_payload_size: Option<usize>,
    require_membership: Option<bool>,
}

/// `[invitations]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct InvitationFileConfig {
    ttl_hours: Option<u64>,
    sweep_interval_secs: Option<u64>,
    accept_url: Option<String>,
}

/// `[logging]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LoggingFileConfig {
    file: Option<PathBuf>,
}

/// One `[[users]]` entry.
#[derive(Debug, serde::Deserialize)]
struct UserFileEntry {
    token: String,
    id: String,
    email: String,
    name: String,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the relay server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Taskboard realtime relay")]
pub struct RelayCliArgs {
    /// Address to bind the relay server to.
    #[arg(short, long, env = "TASKBOARD_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/taskboard-relay/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum encoded size of a published event, in bytes.
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// Require project membership to join a room (`true` or `false`).
    #[arg(long)]
    pub require_membership: Option<bool>,

    /// Lifetime of new invitations, in hours.
    #[arg(long)]
    pub invitation_ttl_hours: Option<u64>,

    /// Link invitees open to accept; the token is appended as `?token=`.
    #[arg(long, env = "TASKBOARD_ACCEPT_URL")]
    pub accept_url: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,

    /// Write logs to this file instead of stderr.
    #[arg(long, env = "TASKBOARD_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// A bearer token bound to a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    /// Token presented in `Authenticate`.
    pub token: String,
    /// Identity the token resolves to.
    pub principal: Principal,
}

/// Fully resolved relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:9100`).
    pub bind_addr: String,
    /// Maximum encoded size of a published event.
    pub max_payload_size: usize,
    /// Whether `JoinRoom` requires access to the room's project.
    pub require_membership: bool,
    /// Lifetime of new invitations.
    pub invitation_ttl: Duration,
    /// How often expired invitations are purged.
    pub sweep_interval: Duration,
    /// Base of the accept link.
    pub accept_url: Option<Url>,
    /// Static principals.
    pub users: Vec<UserEntry>,
    /// Log level filter string.
    pub log_level: String,
    /// Optional log file.
    pub log_file: Option<PathBuf>,
}

const DEFAULT_TTL_HOURS: u64 = 72;
const DEFAULT_SWEEP_SECS: u64 = 300;

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9100".to_string(),
            max_payload_size: 64 * 1024,
            require_membership: true,
            invitation_ttl: Duration::from_secs(DEFAULT_TTL_HOURS * 3600),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_SECS),
            accept_url: Url::parse(DEFAULT_ACCEPT_URL).ok(),
            users: Vec::new(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl RelayConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// Otherwise the default path is tried and a missing file counts as
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or if
    /// a value in it is invalid.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, file)
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &RelayCliArgs, file: RelayConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let accept_url = match cli.accept_url.clone().or(file.invitations.accept_url) {
            Some(raw) => Some(
                Url::parse(&raw).map_err(|source| ConfigError::AcceptUrl { url: raw, source })?,
            ),
            None => defaults.accept_url,
        };

        let users = file
            .users
            .into_iter()
            .enumerate()
            .map(|(index, entry)| resolve_user(index, entry))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            bind_addr: cli
                .bind
                .clone()
                .or(file.server.bind_addr)
                .unwrap_or(defaults.bind_addr),
            max_payload_size: cli
                .max_payload_size
                .or(file.server.max_payload_size)
                .unwrap_or(defaults.max_payload_size),
            require_membership: cli
                .require_membership
                .or(file.server.require_membership)
                .unwrap_or(defaults.require_membership),
            invitation_ttl: cli
                .invitation_ttl_hours
                .or(file.invitations.ttl_hours)
                .map_or(defaults.invitation_ttl, |h| {
                    Duration::from_secs(h.saturating_mul(3600))
                }),
            sweep_interval: file
                .invitations
                .sweep_interval_secs
                .filter(|s| *s > 0)
                .map_or(defaults.sweep_interval, Duration::from_secs),
            accept_url,
            users,
            log_level: cli.log_level.clone(),
            log_file: cli.log_file.clone().or(file.logging.file),
        })
    }

    /// Board tunables derived from this configuration.
    #[must_use]
    pub fn board_policy(&self) -> BoardPolicy {
        BoardPolicy {
            invitation_ttl: self.invitation_ttl,
            accept_url: self.accept_url.clone(),
            ..BoardPolicy::default()
        }
    }

    /// Token table for the configured users.
    #[must_use]
    pub fn credentials(&self) -> StaticCredentials {
        let mut creds = StaticCredentials::new();
        for user in &self.users {
            creds.insert(user.token.clone(), user.principal.clone());
        }
        creds
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn resolve_user(index: usize, entry: UserFileEntry) -> Result<UserEntry, ConfigError> {
    let invalid = |reason: String| ConfigError::User { index, reason };

    if entry.token.trim().is_empty() {
        return Err(invalid("token is empty".to_string()));
    }
    let id: UserId = entry
        .id
        .parse()
        .map_err(|e| invalid(format!("id {:?}: {e}", entry.id)))?;
    let email = Email::parse(&entry.email).map_err(|e| invalid(e.to_string()))?;

    Ok(UserEntry {
        token: entry.token,
        principal: Principal {
            id,
            email,
            name: entry.name,
        },
    })
}

fn load_config_file(explicit_path: Option<&Path>) -> Result<RelayConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(RelayConfigFile::default());
        };
        config_dir.join("taskboard-relay").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
