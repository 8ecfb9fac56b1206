use dotenv::dotenv;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::env;
use std::fmt;
use std::str::FromStr;

/// Administrator seeded at startup so the admin views are reachable on a fresh store.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub id: String,
    pub name: String,
    pub email: String,
}

pub struct Config {
    pub port: u16,
    pub log_level: String,
    pub jwt_secret: String,
    /// Percentage of the total budget a program may overrun before creation is blocked.
    pub over_budget_margin_percent: Decimal,
    pub max_files_per_slot: usize,
    pub files_public_base_url: String,
    pub request_timeout_secs: u64,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("jwt_secret", &"<redacted>")
            .field("over_budget_margin_percent", &self.over_budget_margin_percent)
            .field("max_files_per_slot", &self.max_files_per_slot)
            .field("files_public_base_url", &self.files_public_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .finish()
    }
}

impl Config {
    fn from_env() -> Self {
        dotenv().ok();

        let bootstrap_admin = match (env::var("ADMIN_ID"), env::var("ADMIN_EMAIL")) {
            (Ok(id), Ok(email)) => Some(BootstrapAdmin {
                id,
                email,
                name: env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string()),
            }),
            _ => None,
        };

        Self {
            port: env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(3000),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string()), // Must match the auth service
            over_budget_margin_percent: env::var("OVER_BUDGET_MARGIN_PERCENT")
                .ok()
                .and_then(|v| Decimal::from_str(v.trim()).ok())
                .filter(|v| !v.is_sign_negative())
                .unwrap_or(Decimal::ZERO),
            max_files_per_slot: env::var("MAX_FILES_PER_SLOT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(5),
            files_public_base_url: env::var("FILES_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000/files".to_string()),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            bootstrap_admin,
        }
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);
