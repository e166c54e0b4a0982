use crate::limiter::RateLimitRule;
use crate::lockout::LockoutPolicy;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Minimum HS256 secret length in bytes.
const MIN_JWT_SECRET_LEN: usize = 32;

/// Admin account seeded into the directory at startup.
#[derive(Clone)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub matric_no: u64,
    pub password: String,
}

#[derive(Clone)]
pub struct Config {
    // Redis
    pub redis_url: String,
    pub store_timeout_ms: u64,

    // Server
    pub bind_addr: SocketAddr,
    pub max_body_bytes: usize,

    // Tokens and sessions
    pub jwt_secret: String,
    pub jwt_ttl_secs: u64,
    pub session_ttl_secs: u64,
    pub otp_ttl_secs: u64,

    // Rate limiting
    pub rate_limit_global_max: u64,
    pub rate_limit_global_window_secs: u64,
    pub rate_limit_signup_max: u64,
    pub rate_limit_login_max: u64,
    pub rate_limit_auth_window_secs: u64,

    // Lockout
    pub login_lockout: LockoutPolicy,
    pub otp_lockout: LockoutPolicy,

    // Bootstrap
    pub admin: Option<AdminSeed>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("store_timeout_ms", &self.store_timeout_ms)
            .field("bind_addr", &self.bind_addr)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_ttl_secs", &self.jwt_ttl_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("otp_ttl_secs", &self.otp_ttl_secs)
            .field("rate_limit_global_max", &self.rate_limit_global_max)
            .field(
                "rate_limit_global_window_secs",
                &self.rate_limit_global_window_secs,
            )
            .field("rate_limit_signup_max", &self.rate_limit_signup_max)
            .field("rate_limit_login_max", &self.rate_limit_login_max)
            .field(
                "rate_limit_auth_window_secs",
                &self.rate_limit_auth_window_secs,
            )
            .field("login_lockout", &self.login_lockout)
            .field("otp_lockout", &self.otp_lockout)
            .field("admin", &self.admin.as_ref().map(|a| &a.email))
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        // Redis: required, no implicit localhost fallback
        let redis_url =
            env::var("REDIS_URL").map_err(|_| ConfigError::MissingVar("REDIS_URL".to_string()))?;
        let store_timeout_ms = parse_env_or_default("STORE_TIMEOUT_MS", 500)?;
        if store_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "STORE_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;
        let max_body_bytes = parse_env_or_default("MAX_BODY_BYTES", 10 * 1024 * 1024)?;

        // Tokens
        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| ConfigError::MissingVar("JWT_SECRET".to_string()))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::InvalidValue(
                "JWT_SECRET".to_string(),
                format!("must be at least {} bytes", MIN_JWT_SECRET_LEN),
            ));
        }
        let jwt_ttl_secs = parse_env_or_default("JWT_TTL_SECS", 3600)?;
        let session_ttl_secs = parse_env_or_default("SESSION_TTL_SECS", 3600)?;
        let otp_ttl_secs = parse_env_or_default("OTP_TTL_SECS", 300)?;

        // Rate limiting
        let rate_limit_global_max = parse_env_or_default("RATE_LIMIT_GLOBAL_MAX", 100)?;
        let rate_limit_global_window_secs =
            parse_env_or_default("RATE_LIMIT_GLOBAL_WINDOW_SECS", 60)?;
        let rate_limit_signup_max = parse_env_or_default("RATE_LIMIT_SIGNUP_MAX", 5)?;
        let rate_limit_login_max = parse_env_or_default("RATE_LIMIT_LOGIN_MAX", 5)?;
        let rate_limit_auth_window_secs = parse_env_or_default("RATE_LIMIT_AUTH_WINDOW_SECS", 60)?;

        for (name, value) in [
            ("RATE_LIMIT_GLOBAL_WINDOW_SECS", rate_limit_global_window_secs),
            ("RATE_LIMIT_AUTH_WINDOW_SECS", rate_limit_auth_window_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    "window must be at least one second".to_string(),
                ));
            }
        }

        // Lockout
        let defaults = LockoutPolicy::default();
        let login_lockout = LockoutPolicy {
            max_attempts: parse_env_or_default("LOGIN_MAX_ATTEMPTS", defaults.max_attempts)?,
            failure_window_secs: parse_env_or_default(
                "LOGIN_FAILURE_WINDOW_SECS",
                defaults.failure_window_secs,
            )?,
            lock_secs: parse_env_or_default("LOGIN_LOCK_SECS", defaults.lock_secs)?,
        };
        let otp_lockout = LockoutPolicy {
            max_attempts: parse_env_or_default("OTP_MAX_ATTEMPTS", defaults.max_attempts)?,
            failure_window_secs: parse_env_or_default(
                "OTP_FAILURE_WINDOW_SECS",
                defaults.failure_window_secs,
            )?,
            lock_secs: parse_env_or_default("OTP_LOCK_SECS", defaults.lock_secs)?,
        };
        for (name, policy) in [("LOGIN_MAX_ATTEMPTS", login_lockout), ("OTP_MAX_ATTEMPTS", otp_lockout)] {
            if policy.max_attempts == 0 {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    "must be at least 1".to_string(),
                ));
            }
        }

        // Bootstrap admin, all-or-nothing
        let admin = match env::var("ADMIN_EMAIL").ok().filter(|s| !s.is_empty()) {
            None => None,
            Some(email) => {
                let password = env::var("ADMIN_PASSWORD")
                    .map_err(|_| ConfigError::MissingVar("ADMIN_PASSWORD".to_string()))?;
                let matric_str = env::var("ADMIN_MATRIC_NO")
                    .map_err(|_| ConfigError::MissingVar("ADMIN_MATRIC_NO".to_string()))?;
                let matric_no = matric_str.parse::<u64>().map_err(|e| {
                    ConfigError::ParseError("ADMIN_MATRIC_NO".to_string(), e.to_string())
                })?;
                Some(AdminSeed {
                    name: env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string()),
                    email,
                    matric_no,
                    password,
                })
            }
        };

        Ok(Config {
            redis_url,
            store_timeout_ms,
            bind_addr,
            max_body_bytes,
            jwt_secret,
            jwt_ttl_secs,
            session_ttl_secs,
            otp_ttl_secs,
            rate_limit_global_max,
            rate_limit_global_window_secs,
            rate_limit_signup_max,
            rate_limit_login_max,
            rate_limit_auth_window_secs,
            login_lockout,
            otp_lockout,
            admin,
        })
    }

    /// Configuration with every optional setting at its default.
    ///
    /// `from_env` applies the same defaults; this is the entry point for
    /// embedding the router without touching the process environment.
    pub fn with_defaults(redis_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Config {
            redis_url: redis_url.into(),
            store_timeout_ms: 500,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_body_bytes: 10 * 1024 * 1024,
            jwt_secret: jwt_secret.into(),
            jwt_ttl_secs: 3600,
            session_ttl_secs: 3600,
            otp_ttl_secs: 300,
            rate_limit_global_max: 100,
            rate_limit_global_window_secs: 60,
            rate_limit_signup_max: 5,
            rate_limit_login_max: 5,
            rate_limit_auth_window_secs: 60,
            login_lockout: LockoutPolicy::default(),
            otp_lockout: LockoutPolicy::default(),
            admin: None,
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn global_rule(&self) -> RateLimitRule {
        RateLimitRule::new(
            "global",
            self.rate_limit_global_max,
            self.rate_limit_global_window_secs,
        )
    }

    pub fn signup_rule(&self) -> RateLimitRule {
        RateLimitRule::new(
            "signup",
            self.rate_limit_signup_max,
            self.rate_limit_auth_window_secs,
        )
    }

    pub fn login_rule(&self) -> RateLimitRule {
        RateLimitRule::new(
            "login",
            self.rate_limit_login_max,
            self.rate_limit_auth_window_secs,
        )
    }
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}
