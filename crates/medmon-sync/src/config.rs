use std::time::Duration;

use medmon_ai::AiConfig;
use medmon_storage::{DatabaseConfig, HttpClientConfig, DEFAULT_USER_AGENT};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub http: HttpClientConfig,
    pub ai: AiConfig,
    pub schedulers_enabled: bool,
    pub scrape_interval: Duration,
    pub analysis_interval: Duration,
    pub analysis_warmup: Duration,
    pub web_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database: DatabaseConfig::from_env(),
            http: HttpClientConfig {
                timeout: Duration::from_secs(env_or("MEDMON_HTTP_TIMEOUT_SECS", 12)),
                user_agent: Some(
                    std::env::var("MEDMON_USER_AGENT")
                        .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
                ),
                ..Default::default()
            },
            ai: AiConfig::from_env(),
            schedulers_enabled: std::env::var("MEDMON_SCHEDULERS_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
            scrape_interval: Duration::from_secs(env_or("SCRAPE_INTERVAL_SECS", 300)),
            analysis_interval: Duration::from_secs(env_or("ANALYSIS_INTERVAL_SECS", 600)),
            analysis_warmup: Duration::from_secs(env_or("ANALYSIS_WARMUP_SECS", 5)),
            web_port: env_or("MEDMON_WEB_PORT", 8000),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes" | "on")
}
