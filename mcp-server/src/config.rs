use anyhow::Result;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub report_path: String,
    pub relay_url: Option<String>,
    pub admin_token: Option<String>,
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn load() -> Result<Config> {
    let database_url =
        env::var("PRIZE_WHEEL_DB_PATH").unwrap_or_else(|_| "data/prize_wheel.db".to_string());
    let report_path =
        env::var("PRIZE_WHEEL_REPORT_PATH").unwrap_or_else(|_| "reports".to_string());

    Ok(Config {
        database_url,
        report_path,
        relay_url: optional_var("PRIZE_WHEEL_RELAY_URL"),
        admin_token: optional_var("PRIZE_WHEEL_ADMIN_TOKEN"),
    })
}
