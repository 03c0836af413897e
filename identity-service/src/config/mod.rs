use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

use crate::services::{IdentifierStrategy, RoutePolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub smtp: SmtpConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    /// Base URL used in credential links sent by email.
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_limit: u32,
    pub login_window_seconds: u64,
    pub register_limit: u32,
    pub register_window_seconds: u64,
    pub refresh_limit: u32,
    pub refresh_window_seconds: u64,
    pub password_reset_limit: u32,
    pub password_reset_window_seconds: u64,
    pub account_limit: u32,
    pub account_window_seconds: u64,
    pub account_strategy: IdentifierStrategy,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl RateLimitConfig {
    pub fn login_policy(&self) -> RoutePolicy {
        RoutePolicy {
            limit: self.login_limit,
            window_seconds: self.login_window_seconds,
            identifier_strategy: IdentifierStrategy::Ip,
        }
    }

    pub fn register_policy(&self) -> RoutePolicy {
        RoutePolicy {
            limit: self.register_limit,
            window_seconds: self.register_window_seconds,
            identifier_strategy: IdentifierStrategy::Ip,
        }
    }

    pub fn refresh_policy(&self) -> RoutePolicy {
        RoutePolicy {
            limit: self.refresh_limit,
            window_seconds: self.refresh_window_seconds,
            identifier_strategy: IdentifierStrategy::Ip,
        }
    }

    pub fn password_reset_policy(&self) -> RoutePolicy {
        RoutePolicy {
            limit: self.password_reset_limit,
            window_seconds: self.password_reset_window_seconds,
            identifier_strategy: IdentifierStrategy::Ip,
        }
    }

    pub fn account_policy(&self) -> RoutePolicy {
        RoutePolicy {
            limit: self.account_limit,
            window_seconds: self.account_window_seconds,
            identifier_strategy: self.account_strategy,
        }
    }

    pub fn global_ip_policy(&self) -> RoutePolicy {
        RoutePolicy {
            limit: self.global_ip_limit,
            window_seconds: self.global_ip_window_seconds,
            identifier_strategy: IdentifierStrategy::Ip,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    pub deletion_grace_days: i64,
    pub sweep_interval_seconds: u64,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
            },
            jwt: JwtConfig {
                secret: get_env(
                    "JWT_SECRET",
                    Some("dev-only-secret-change-me-in-prod!!"),
                    is_prod,
                )?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    "7",
                    is_prod,
                )?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                user: get_env("SMTP_USER", None, is_prod)?,
                password: get_env("SMTP_PASSWORD", None, is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                base_url: get_env("BASE_URL", Some("http://localhost:3000"), is_prod)?,
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit: RateLimitConfig {
                login_limit: parse_env("RATE_LIMIT_LOGIN_LIMIT", "5", is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", is_prod)?,
                register_limit: parse_env("RATE_LIMIT_REGISTER_LIMIT", "3", is_prod)?,
                register_window_seconds: parse_env(
                    "RATE_LIMIT_REGISTER_WINDOW_SECONDS",
                    "3600",
                    is_prod,
                )?,
                refresh_limit: parse_env("RATE_LIMIT_REFRESH_LIMIT", "30", is_prod)?,
                refresh_window_seconds: parse_env(
                    "RATE_LIMIT_REFRESH_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
                password_reset_limit: parse_env("RATE_LIMIT_PASSWORD_RESET_LIMIT", "3", is_prod)?,
                password_reset_window_seconds: parse_env(
                    "RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS",
                    "3600",
                    is_prod,
                )?,
                account_limit: parse_env("RATE_LIMIT_ACCOUNT_LIMIT", "10", is_prod)?,
                account_window_seconds: parse_env(
                    "RATE_LIMIT_ACCOUNT_WINDOW_SECONDS",
                    "3600",
                    is_prod,
                )?,
                account_strategy: parse_env("RATE_LIMIT_ACCOUNT_STRATEGY", "user", is_prod)?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100", is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
            },
            lifecycle: LifecycleConfig {
                deletion_grace_days: parse_env("DELETION_GRACE_DAYS", "30", is_prod)?,
                sweep_interval_seconds: parse_env("DELETION_SWEEP_INTERVAL_SECONDS", "3600", is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.lifecycle.deletion_grace_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DELETION_GRACE_DAYS must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.jwt.secret.len() < 32 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be at least 32 bytes in production"
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::error!(
                    "Swagger is publicly accessible in production - consider 'disabled'"
                );
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} is not valid: {}", key, e))
        })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}
