use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub desktop_mode: bool,
    /// HS256 key for learner tokens. Without it every authenticated route
    /// answers 401 unless desktop mode is on.
    pub jwt_secret: Option<String>,
    pub database: DatabaseConfig,
    pub review: ReviewConfig,
}

#[derive(Debug, Clone)]
pub enum DatabaseTarget {
    Postgres { url: String },
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub target: DatabaseTarget,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub sqlite_busy_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ReviewConfig {
    /// Default number of due items handed out per session.
    pub session_limit: i64,
    /// Deadline applied to every store round trip.
    pub store_timeout: Duration,
    /// Compare-and-swap attempts per submission before giving up as transient.
    pub max_cas_attempts: u32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            session_limit: 20,
            store_timeout: Duration::from_millis(5000),
            max_cas_attempts: 8,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            host,
            port,
            log_level,
            desktop_mode: env_bool("DESKTOP_MODE").unwrap_or(false),
            jwt_secret: std::env::var("JWT_SECRET")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            database: DatabaseConfig::from_env(),
            review: ReviewConfig::from_env(),
        }
    }

    /// Local-only configuration backed by a SQLite file, used by the desktop
    /// shell and the integration tests.
    pub fn for_sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            log_level: "info".to_string(),
            desktop_mode: false,
            jwt_secret: None,
            database: DatabaseConfig::sqlite(path),
            review: ReviewConfig::default(),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        let target = match std::env::var("DATABASE_URL") {
            Ok(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {
                DatabaseTarget::Postgres { url }
            }
            _ => DatabaseTarget::Sqlite {
                path: std::env::var("SQLITE_PATH")
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(default_sqlite_path),
            },
        };

        Self {
            target,
            max_connections: env_u64("DB_MAX_CONNECTIONS", 10) as u32,
            acquire_timeout: Duration::from_millis(env_u64("DB_ACQUIRE_TIMEOUT_MS", 5000)),
            sqlite_busy_timeout: Duration::from_millis(env_u64("SQLITE_BUSY_TIMEOUT_MS", 5000)),
        }
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            target: DatabaseTarget::Sqlite { path: path.into() },
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            sqlite_busy_timeout: Duration::from_secs(5),
        }
    }
}

impl ReviewConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            session_limit: env_u64("REVIEW_SESSION_LIMIT", defaults.session_limit as u64).clamp(1, 100)
                as i64,
            store_timeout: Duration::from_millis(env_u64(
                "STORE_TIMEOUT_MS",
                defaults.store_timeout.as_millis() as u64,
            )),
            max_cas_attempts: env_u64("REVIEW_MAX_CAS_ATTEMPTS", defaults.max_cas_attempts as u64)
                .max(1) as u32,
        }
    }
}

pub fn default_sqlite_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("review-backend")
        .join("review.db")
}

pub fn env_bool(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    let normalized = value.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return None;
    }
    match normalized.as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
