use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub telegram_api_base: String,
    pub notify: NotifySettings,
    /// Refuse confirmations that would drive stock below zero instead of
    /// clamping the counter.
    pub strict_stock: bool,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct NotifySettings {
    /// Upper bound on the whole fan-out as seen by the request.
    pub dispatch_timeout: Duration,
    /// Upper bound on a single delivery attempt on one channel.
    pub attempt_timeout: Duration,
    pub bot_max_attempts: u32,
    pub backoff: Duration,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            dispatch_timeout: Duration::from_millis(3000),
            attempt_timeout: Duration::from_millis(1500),
            bot_max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}: {e}")),
        Err(_) => Ok(default),
    }
}

/// Tokens are signed with this secret, so there is no fallback value.
fn required_secret(raw: Option<String>) -> anyhow::Result<String> {
    match raw.map(|s| s.trim().to_string()) {
        Some(secret) if !secret.is_empty() => Ok(secret),
        Some(_) => anyhow::bail!("JWT_SECRET is empty"),
        None => anyhow::bail!("JWT_SECRET must be set"),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let server_port = env::var("SERVER_PORT").unwrap_or_else(|_| "3000".into());
        let database_url = env::var("DATABASE_URL").ok();
        let jwt_secret = required_secret(env::var("JWT_SECRET").ok())?;
        let telegram_api_base =
            env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| "https://api.telegram.org".into());

        let defaults = NotifySettings::default();
        let notify = NotifySettings {
            dispatch_timeout: Duration::from_millis(parsed(
                "NOTIFY_TIMEOUT_MS",
                defaults.dispatch_timeout.as_millis() as u64,
            )?),
            attempt_timeout: Duration::from_millis(parsed(
                "NOTIFY_ATTEMPT_TIMEOUT_MS",
                defaults.attempt_timeout.as_millis() as u64,
            )?),
            bot_max_attempts: parsed("BOT_MAX_ATTEMPTS", defaults.bot_max_attempts)?.max(1),
            backoff: Duration::from_millis(parsed(
                "NOTIFY_BACKOFF_MS",
                defaults.backoff.as_millis() as u64,
            )?),
        };
        let strict_stock = parsed("STRICT_STOCK", false)?;

        Ok(Self {
            server_port,
            database_url,
            jwt_secret,
            telegram_api_base,
            notify,
            strict_stock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_secret_is_required() {
        let missing = required_secret(None).unwrap_err();
        assert!(missing.to_string().contains("must be set"));
        let blank = required_secret(Some("   ".into())).unwrap_err();
        assert!(blank.to_string().contains("empty"));
        assert_eq!(required_secret(Some(" s3cret\n".into())).unwrap(), "s3cret");
    }
}
