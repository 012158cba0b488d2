use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use secrecy::Secret;
use service_core::config::Config as CommonConfig;
use service_core::middleware::auth::parse_expiry;
use std::env;

pub const DEFAULT_RAZORPAY_API_BASE_URL: &str = "https://api.razorpay.com/v1";

#[derive(Clone, Debug)]
pub struct Config {
    pub server: CommonConfig,
    pub storage: StorageBackend,
    pub database: DatabaseConfig,
    pub razorpay: RazorpayConfig,
    pub jwt: JwtConfig,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Mongo,
    Memory,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Clone, Debug)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

impl Default for RazorpayConfig {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            key_secret: Secret::new(String::new()),
            webhook_secret: Secret::new(String::new()),
            api_base_url: DEFAULT_RAZORPAY_API_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub secret: Secret<String>,
    pub expires_in: chrono::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let server = CommonConfig::load().map_err(|e| anyhow!("{}", e))?;

        let storage = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "mongo".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "mongo" | "mongodb" => StorageBackend::Mongo,
            "memory" => StorageBackend::Memory,
            other => return Err(anyhow!("Unsupported STORAGE_BACKEND: {}", other)),
        };

        let db_url = match storage {
            StorageBackend::Mongo => {
                env::var("DATABASE_URL").context("DATABASE_URL must be set")?
            }
            StorageBackend::Memory => env::var("DATABASE_URL").unwrap_or_default(),
        };
        let db_name = env::var("DATABASE_NAME").unwrap_or_else(|_| "marketplace".to_string());

        let razorpay = RazorpayConfig {
            key_id: env::var("RAZORPAY_KEY_ID").unwrap_or_default(),
            key_secret: Secret::new(env::var("RAZORPAY_KEY_SECRET").unwrap_or_default()),
            webhook_secret: Secret::new(env::var("RAZORPAY_WEBHOOK_SECRET").unwrap_or_default()),
            api_base_url: env::var("RAZORPAY_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_RAZORPAY_API_BASE_URL.to_string()),
            timeout_secs: env::var("RAZORPAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        };

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let expires_in = env::var("JWT_EXPIRES_IN").unwrap_or_else(|_| "7d".to_string());
        let expires_in = parse_expiry(&expires_in)
            .ok_or_else(|| anyhow!("Invalid JWT_EXPIRES_IN: {}", expires_in))?;

        Ok(Self {
            server,
            storage,
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            razorpay,
            jwt: JwtConfig {
                secret: Secret::new(jwt_secret),
                expires_in,
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            service_name: "marketplace-service".to_string(),
        })
    }
}
