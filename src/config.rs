use secrecy::Secret;
use serde::{de::DeserializeOwned, Deserialize};

use crate::services::approval::ApprovalLimits;
use crate::services::ledger::DepositLimits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub database_url: Option<Secret<String>>,
    pub host: String,
    pub port: u16,
    pub currency: String,

    // Amount bounds, all inclusive
    pub min_deposit_cents: i64,
    pub max_deposit_cents: i64,
    pub max_approved_amount_cents: i64,

    // Notification delivery (logged when no webhook is configured)
    pub notification_webhook_url: Option<String>,
    pub notification_webhook_secret: Option<Secret<String>>,

    /// Six-field cron expression; `None` disables the audit job
    pub ledger_audit_schedule: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Self::from_source(&config)
    }

    pub fn from_source(config: &config::Config) -> Result<Self, config::ConfigError> {
        let storage_backend = match config.get_string("storage_backend") {
            Ok(value) => match value.to_ascii_lowercase().as_str() {
                "postgres" => StorageBackend::Postgres,
                "memory" => StorageBackend::Memory,
                other => {
                    return Err(config::ConfigError::Message(format!(
                        "Unknown storage_backend '{}'",
                        other
                    )))
                }
            },
            Err(config::ConfigError::NotFound(_)) => StorageBackend::Postgres,
            Err(e) => return Err(e),
        };

        let settings = Self {
            storage_backend,
            database_url: get_opt::<String>(config, "database_url")?.map(Secret::new),
            host: get_or(config, "host", "127.0.0.1".to_string())?,
            port: get_or(config, "port", 8080)?,
            currency: get_or(config, "currency", "USD".to_string())?,

            min_deposit_cents: get_or(config, "min_deposit_cents", 100)?,
            max_deposit_cents: get_or(config, "max_deposit_cents", 100_000)?,
            max_approved_amount_cents: get_or(config, "max_approved_amount_cents", 50_000)?,

            notification_webhook_url: get_opt::<String>(config, "notification_webhook_url")?
                .filter(|url| !url.trim().is_empty()),
            notification_webhook_secret: get_opt::<String>(config, "notification_webhook_secret")?
                .map(Secret::new),

            ledger_audit_schedule: Some(get_or(
                config,
                "ledger_audit_schedule",
                "0 */15 * * * *".to_string(),
            )?)
            .filter(|schedule| !schedule.trim().is_empty()),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.storage_backend == StorageBackend::Postgres && self.database_url.is_none() {
            return Err(config::ConfigError::Message(
                "database_url is required for the postgres storage backend".to_string(),
            ));
        }

        if self.min_deposit_cents <= 0 || self.min_deposit_cents > self.max_deposit_cents {
            return Err(config::ConfigError::Message(format!(
                "Invalid deposit bounds: min {} max {}",
                self.min_deposit_cents, self.max_deposit_cents
            )));
        }

        if self.max_approved_amount_cents <= 0 {
            return Err(config::ConfigError::Message(
                "max_approved_amount_cents must be positive".to_string(),
            ));
        }

        if let Some(url) = &self.notification_webhook_url {
            url::Url::parse(url).map_err(|e| {
                config::ConfigError::Message(format!("Invalid notification_webhook_url: {}", e))
            })?;
        }

        Ok(())
    }

    pub fn deposit_limits(&self) -> DepositLimits {
        DepositLimits {
            min_cents: self.min_deposit_cents,
            max_cents: self.max_deposit_cents,
        }
    }

    pub fn approval_limits(&self) -> ApprovalLimits {
        ApprovalLimits {
            max_approved_amount_cents: self.max_approved_amount_cents,
            ..ApprovalLimits::default()
        }
    }
}

/// Falls back to `default` only when the key is absent; malformed values fail
fn get_or<T: DeserializeOwned>(
    config: &config::Config,
    key: &str,
    default: T,
) -> Result<T, config::ConfigError> {
    match config.get(key) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => Ok(default),
        Err(e) => Err(e),
    }
}

fn get_opt<T: DeserializeOwned>(
    config: &config::Config,
    key: &str,
) -> Result<Option<T>, config::ConfigError> {
    match config.get(key) {
        Ok(value) => Ok(Some(value)),
        Err(config::ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
