use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::session::DEFAULT_EXPIRATION_HOURS;
use crate::shared::AppError;

pub const DEFAULT_JWT_SECRET: &str = "openvoice-dev-secret-change-in-production";

/// Registry tuning: queue depth per connection and the bound on store calls
#[derive(Debug, Clone, PartialEq)]
pub struct HubSettings {
    pub outbound_queue_capacity: usize,
    pub store_timeout: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            store_timeout: Duration::from_secs(3),
        }
    }
}

/// Limits enforced on inbound frames
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolLimits {
    pub max_frame_bytes: usize,
    pub max_message_bytes: usize,
    pub history_limit: i64,
}

impl Default for ProtocolLimits {
    fn default() -> Self {
        Self {
            max_frame_bytes: 8 * 1024,
            max_message_bytes: 16 * 1024,
            history_limit: 50,
        }
    }
}

/// Transport deadlines for a single connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub write_wait: Duration,
    pub pong_wait: Duration,
    pub ping_period: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealtimeSettings {
    pub hub: HubSettings,
    pub protocol: ProtocolLimits,
    pub connection: ConnectionSettings,
}

/// Process configuration, read from environment variables with defaults
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub session_cookie_name: String,
    pub session_expiration_hours: i64,
    pub cors_allowed_origins: Vec<String>,
    pub default_channels: Vec<String>,
    pub realtime: RealtimeSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests don't touch the process env
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = EnvReader { lookup };

        let defaults = RealtimeSettings::default();
        let pong_wait = reader.millis("PONG_WAIT_MS", defaults.connection.pong_wait)?;
        let ping_period = reader.millis("PING_PERIOD_MS", pong_wait * 9 / 10)?;

        let realtime = RealtimeSettings {
            hub: HubSettings {
                outbound_queue_capacity: reader
                    .parsed("OUTBOUND_QUEUE_CAPACITY", defaults.hub.outbound_queue_capacity)?,
                store_timeout: reader.millis("STORE_TIMEOUT_MS", defaults.hub.store_timeout)?,
            },
            protocol: ProtocolLimits {
                max_frame_bytes: reader
                    .parsed("MAX_FRAME_BYTES", defaults.protocol.max_frame_bytes)?,
                max_message_bytes: reader
                    .parsed("MAX_MESSAGE_BYTES", defaults.protocol.max_message_bytes)?,
                history_limit: reader.parsed("HISTORY_LIMIT", defaults.protocol.history_limit)?,
            },
            connection: ConnectionSettings {
                write_wait: reader.millis("WRITE_WAIT_MS", defaults.connection.write_wait)?,
                pong_wait,
                ping_period,
            },
        };

        let config = Self {
            bind_addr: reader.string("BIND_ADDR", "0.0.0.0:8080"),
            database_url: reader.string("DATABASE_URL", "sqlite://data/openvoice.db"),
            jwt_secret: reader.string("JWT_SECRET", DEFAULT_JWT_SECRET),
            session_cookie_name: reader.string("SESSION_COOKIE_NAME", "openvoice_session"),
            session_expiration_hours: reader
                .parsed("SESSION_EXPIRATION_HOURS", DEFAULT_EXPIRATION_HOURS)?,
            cors_allowed_origins: reader.list(
                "CORS_ALLOWED_ORIGINS",
                "http://localhost:5173,http://127.0.0.1:5173",
            ),
            default_channels: reader.list("DEFAULT_CHANNELS", "general"),
            realtime,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.session_expiration_hours <= 0 {
            return Err(AppError::Configuration(
                "SESSION_EXPIRATION_HOURS must be greater than zero".to_string(),
            ));
        }
        let realtime = &self.realtime;
        if realtime.hub.outbound_queue_capacity == 0 {
            return Err(AppError::Configuration(
                "OUTBOUND_QUEUE_CAPACITY must be greater than zero".to_string(),
            ));
        }
        if realtime.protocol.max_frame_bytes == 0 || realtime.protocol.max_message_bytes == 0 {
            return Err(AppError::Configuration(
                "frame and message limits must be greater than zero".to_string(),
            ));
        }
        if realtime.protocol.history_limit <= 0 {
            return Err(AppError::Configuration(
                "HISTORY_LIMIT must be greater than zero".to_string(),
            ));
        }
        if realtime.connection.ping_period.is_zero()
            || realtime.connection.ping_period >= realtime.connection.pong_wait
        {
            return Err(AppError::Configuration(
                "PING_PERIOD_MS must be non-zero and shorter than PONG_WAIT_MS".to_string(),
            ));
        }
        Ok(())
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn list(&self, key: &str, default: &str) -> Vec<String> {
        self.string(key, default)
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.raw(key) {
            Some(value) => value
                .parse()
                .map_err(|e| AppError::Configuration(format!("{}: {}", key, e))),
            None => Ok(default),
        }
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, AppError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parsed(key, default_ms).map(Duration::from_millis)
    }
}
