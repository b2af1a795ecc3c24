use std::env;
use std::str::FromStr;
use std::time::Duration;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/turnstile";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub api_prefix: String,
    /// Enables HSTS.
    pub production: bool,
    pub cors_allowed_origins: Vec<String>,
    pub orders: OrderPolicy,
    pub schedule: ScheduleConfig,
    pub payment: PaymentConfig,
    /// `None` disables the inbound-mail payment scanner.
    pub mailbox: Option<MailboxConfig>,
    /// `None` routes notifications to the log instead of SMTP.
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone)]
pub struct OrderPolicy {
    /// How long a pending order holds its seats.
    pub expiry_window: chrono::Duration,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            expiry_window: chrono::Duration::minutes(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub order_sweep_every: Duration,
    pub event_sweep_every: Duration,
    pub mailbox_scan_every: Duration,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
    pub payment_page_base_url: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            bank_name: "Bank Jago".to_string(),
            account_number: "1010101020".to_string(),
            account_name: "Turnstile Demo Account".to_string(),
            payment_page_base_url: "https://pay.turnstile.local/pay".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Matched against the From header of bank notifications.
    pub sender: String,
    pub lookback: chrono::Duration,
    /// Substring of the payment method of orders the bank's mails can settle.
    pub bank_tag: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
    pub frontend_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Malformed optional
    /// values fall back to their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let cors_allowed_origins = or("CORS_ALLOWED_ORIGINS", DEFAULT_ALLOWED_ORIGINS)
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let mailbox = match (get("IMAP_HOST"), get("IMAP_USER"), get("IMAP_PASS")) {
            (Some(host), Some(user), Some(password)) => Some(MailboxConfig {
                host,
                port: parse_or(&lookup, "IMAP_PORT", 993),
                user,
                password,
                sender: or("IMAP_SENDER", "jago.com"),
                lookback: chrono::Duration::hours(parse_or(&lookup, "IMAP_LOOKBACK_HOURS", 24)),
                bank_tag: or("TRANSFER_BANK_TAG", "JAGO"),
            }),
            _ => None,
        };

        let smtp = match (get("SMTP_HOST"), get("SMTP_USER")) {
            (Some(host), Some(user)) => Some(SmtpConfig {
                port: parse_or(&lookup, "SMTP_PORT", 587),
                from: or("SMTP_FROM", &user),
                password: or("SMTP_PASS", ""),
                frontend_url: or("FRONTEND_URL", "http://localhost:3000"),
                host,
                user,
            }),
            _ => None,
        };

        let defaults = PaymentConfig::default();
        let payment = PaymentConfig {
            bank_name: or("TRANSFER_BANK_NAME", &defaults.bank_name),
            account_number: or("TRANSFER_ACCOUNT_NUMBER", &defaults.account_number),
            account_name: or("TRANSFER_ACCOUNT_NAME", &defaults.account_name),
            payment_page_base_url: or("PAYMENT_PAGE_BASE_URL", &defaults.payment_page_base_url),
        };

        Self {
            database_url: or("DATABASE_URL", DEFAULT_DATABASE_URL),
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5),
            port: parse_or(&lookup, "PORT", 8000),
            api_prefix: or("API_PREFIX", "/api/v1"),
            production: get("RUST_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
            cors_allowed_origins,
            orders: OrderPolicy {
                expiry_window: chrono::Duration::minutes(parse_or(
                    &lookup,
                    "ORDER_EXPIRY_MINUTES",
                    30,
                )),
            },
            schedule: ScheduleConfig {
                order_sweep_every: Duration::from_secs(parse_or(
                    &lookup,
                    "ORDER_SWEEP_INTERVAL_SECS",
                    60,
                )),
                event_sweep_every: Duration::from_secs(parse_or(
                    &lookup,
                    "EVENT_SWEEP_INTERVAL_SECS",
                    600,
                )),
                mailbox_scan_every: Duration::from_secs(parse_or(
                    &lookup,
                    "MAILBOX_SCAN_INTERVAL_SECS",
                    120,
                )),
            },
            payment,
            mailbox,
            smtp,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Config: invalid value '{}' for {}, using default", raw, key);
                default
            }
        },
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.api_prefix, "/api/v1");
        assert_eq!(config.orders.expiry_window, chrono::Duration::minutes(30));
        assert_eq!(config.schedule.order_sweep_every, Duration::from_secs(60));
        assert_eq!(config.schedule.event_sweep_every, Duration::from_secs(600));
        assert_eq!(config.schedule.mailbox_scan_every, Duration::from_secs(120));
        assert_eq!(config.cors_allowed_origins.len(), 2);
        assert!(config.mailbox.is_none());
        assert!(config.smtp.is_none());
        assert!(!config.production);
    }

    #[test]
    fn test_mailbox_requires_host_user_and_password() {
        let partial = config_from(&[("IMAP_HOST", "imap.example.test"), ("IMAP_USER", "ops")]);
        assert!(partial.mailbox.is_none());

        let full = config_from(&[
            ("IMAP_HOST", "imap.example.test"),
            ("IMAP_USER", "ops"),
            ("IMAP_PASS", "secret"),
        ]);
        let mailbox = full.mailbox.unwrap();
        assert_eq!(mailbox.port, 993);
        assert_eq!(mailbox.sender, "jago.com");
        assert_eq!(mailbox.bank_tag, "JAGO");
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = config_from(&[("PORT", "eighty"), ("ORDER_EXPIRY_MINUTES", "45")]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.orders.expiry_window, chrono::Duration::minutes(45));
    }

    #[test]
    fn test_production_flag() {
        assert!(config_from(&[("RUST_ENV", "Production")]).production);
    }
}
