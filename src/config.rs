use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::capacity::DEFAULT_PER_FRIDGE;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub backend: BackendConfig,
    pub engine: EngineConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            backend: BackendConfig::from_env(),
            engine: EngineConfig::from_env(),
            session: SessionConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let host_value = env_string("FRIDGE_INVENTORY_API_HOST")
            .unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "Could not parse FRIDGE_INVENTORY_API_HOST ('{}'): {}. Using {}.",
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = match env_string("FRIDGE_INVENTORY_API_PORT") {
            Some(raw) => parse_port(&raw).unwrap_or_else(|| {
                warn!(
                    "FRIDGE_INVENTORY_API_PORT ('{}') is not a valid non-zero port. Using {}.",
                    raw,
                    Self::DEFAULT_PORT
                );
                Self::DEFAULT_PORT
            }),
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host: effective_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Where the inventory backend lives and how long to wait for it.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    base_url: String,
    http_timeout: Duration,
}

impl BackendConfig {
    const DEFAULT_BASE_URL: &'static str = "http://localhost:3000/api";
    const DEFAULT_TIMEOUT_SECS: u64 = 30;

    fn from_env() -> Self {
        let base_url = match env_string("FRIDGE_INVENTORY_BACKEND_URL") {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => url,
            Some(url) => {
                warn!(
                    "FRIDGE_INVENTORY_BACKEND_URL ('{}') must start with http:// or https://. Using {}.",
                    url,
                    Self::DEFAULT_BASE_URL
                );
                Self::DEFAULT_BASE_URL.to_string()
            }
            None => Self::DEFAULT_BASE_URL.to_string(),
        };

        let timeout_secs = load_u64_with_warning(
            "FRIDGE_INVENTORY_HTTP_TIMEOUT_SECS",
            Self::DEFAULT_TIMEOUT_SECS,
            |value| value > 0,
            "must be greater than 0",
        );

        Self {
            base_url,
            http_timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn new(base_url: impl Into<String>, http_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            http_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }
}

/// Tuning of the capacity engine and the background tasks.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    default_per_fridge: u32,
    autosave_debounce: Duration,
    status_poll_interval: Duration,
    status_poll_enabled: bool,
}

impl EngineConfig {
    pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 600;
    pub const DEFAULT_STATUS_POLL_SECS: u64 = 30;

    const DEFAULT_PER_FRIDGE_VAR: &'static str = "FRIDGE_INVENTORY_DEFAULT_PER_FRIDGE";
    const DEBOUNCE_VAR: &'static str = "FRIDGE_INVENTORY_AUTOSAVE_DEBOUNCE_MS";
    const POLL_SECS_VAR: &'static str = "FRIDGE_INVENTORY_STATUS_POLL_SECS";
    const POLL_ENABLED_VAR: &'static str = "FRIDGE_INVENTORY_STATUS_POLL_ENABLED";

    fn from_env() -> Self {
        let default_per_fridge = load_u64_with_warning(
            Self::DEFAULT_PER_FRIDGE_VAR,
            u64::from(DEFAULT_PER_FRIDGE),
            |value| value > 0 && value <= u64::from(u32::MAX),
            "must be a positive capacity",
        ) as u32;

        let debounce_ms = load_u64_with_warning(
            Self::DEBOUNCE_VAR,
            Self::DEFAULT_AUTOSAVE_DEBOUNCE_MS,
            |_| true,
            "must be a number of milliseconds",
        );

        let poll_secs = load_u64_with_warning(
            Self::POLL_SECS_VAR,
            Self::DEFAULT_STATUS_POLL_SECS,
            |value| value > 0,
            "must be greater than 0",
        );

        let status_poll_enabled = env_string(Self::POLL_ENABLED_VAR)
            .and_then(|raw| parse_bool(&raw, Self::POLL_ENABLED_VAR))
            .unwrap_or(true);

        if default_per_fridge != DEFAULT_PER_FRIDGE {
            info!(
                "Default capacity per fridge set to {} ({}).",
                default_per_fridge,
                Self::DEFAULT_PER_FRIDGE_VAR
            );
        }

        Self {
            default_per_fridge,
            autosave_debounce: Duration::from_millis(debounce_ms),
            status_poll_interval: Duration::from_secs(poll_secs),
            status_poll_enabled,
        }
    }

    /// Always greater than zero.
    pub fn default_per_fridge(&self) -> u32 {
        self.default_per_fridge
    }

    pub fn autosave_debounce(&self) -> Duration {
        self.autosave_debounce
    }

    pub fn status_poll_interval(&self) -> Duration {
        self.status_poll_interval
    }

    pub fn status_poll_enabled(&self) -> bool {
        self.status_poll_enabled
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_per_fridge: DEFAULT_PER_FRIDGE,
            autosave_debounce: Duration::from_millis(Self::DEFAULT_AUTOSAVE_DEBOUNCE_MS),
            status_poll_interval: Duration::from_secs(Self::DEFAULT_STATUS_POLL_SECS),
            status_poll_enabled: true,
        }
    }
}

/// Location of the persisted session file.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    path: PathBuf,
}

impl SessionConfig {
    const DEFAULT_PATH: &'static str = "session.json";

    fn from_env() -> Self {
        Self {
            path: env_string("FRIDGE_INVENTORY_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_PATH)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|port| *port != 0)
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn parse_u64_checked(raw: &str, validator: impl Fn(u64) -> bool) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|value| validator(*value))
}

fn load_u64_with_warning(
    var_name: &str,
    default: u64,
    validator: impl Fn(u64) -> bool,
    invalid_hint: &str,
) -> u64 {
    match env_string(var_name) {
        Some(raw) => match parse_u64_checked(&raw, validator) {
            Some(value) => value,
            None => {
                warn!(
                    "{} contains invalid value '{}': {}. Using {}.",
                    var_name, raw, invalid_hint, default
                );
                default
            }
        },
        None => default,
    }
}
