use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub ws_url: String,
    pub cache_url: String,
    pub token: Option<String>,
    pub poll_interval: Duration,
    pub create_protection: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("TASKDECK_API_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            ws_url: env::var("TASKDECK_WS_URL")
                .unwrap_or_else(|_| "ws://localhost:3000/ws".to_string()),
            cache_url: env::var("TASKDECK_CACHE_URL")
                .unwrap_or_else(|_| "sqlite:./data/taskdeck-cache.db?mode=rwc".to_string()),
            token: env::var("TASKDECK_TOKEN").ok().filter(|t| !t.is_empty()),
            poll_interval: Duration::from_secs(parse_var("TASKDECK_POLL_INTERVAL_SECS", 10)),
            create_protection: Duration::from_secs(parse_var(
                "TASKDECK_CREATE_PROTECTION_SECS",
                10,
            )),
            reconnect_attempts: parse_var("TASKDECK_RECONNECT_ATTEMPTS", 5),
            reconnect_delay: Duration::from_millis(parse_var("TASKDECK_RECONNECT_DELAY_MS", 1000)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            ws_url: "ws://localhost:3000/ws".to_string(),
            cache_url: "sqlite::memory:".to_string(),
            token: None,
            poll_interval: Duration::from_secs(10),
            create_protection: Duration::from_secs(10),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(1000),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
