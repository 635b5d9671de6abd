use std::str::FromStr;

use anyhow::{Context, Result};

use super::{
    config_model::{Database, DotEnvyConfig, Server},
    stage::Stage,
};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: required("SERVER_PORT")?,
        body_limit: optional("SERVER_BODY_LIMIT", 1)?,
        timeout: optional("SERVER_TIMEOUT", 10)?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").context("DATABASE_URL is invalid")?,
        max_connections: optional("DATABASE_MAX_CONNECTIONS", 10)?,
        connection_timeout: optional("DATABASE_CONNECTION_TIMEOUT", 2)?,
        statement_timeout: optional("DATABASE_STATEMENT_TIMEOUT", 5)?,
    };
    database.validate()?;

    Ok(DotEnvyConfig {
        stage: get_stage(),
        server,
        database,
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or("".to_string());
    Stage::try_from(&stage_str).unwrap_or_default()
}

fn required<T>(key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    std::env::var(key)
        .with_context(|| format!("{key} is invalid"))?
        .trim()
        .parse()
        .with_context(|| format!("{key} is invalid"))
}

fn optional<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} is invalid")),
        _ => Ok(default),
    }
}
