use anyhow::{Result, anyhow, ensure};

use super::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub stage: Stage,
    pub server: Server,
    pub database: Database,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    pub body_limit: u64, // MiB
    pub timeout: u64,    // seconds
}

impl Server {
    pub fn body_limit_bytes(&self) -> Result<usize> {
        let bytes = self
            .body_limit
            .checked_mul(1024 * 1024)
            .ok_or_else(|| anyhow!("SERVER_BODY_LIMIT is too large"))?;
        usize::try_from(bytes).map_err(|_| anyhow!("SERVER_BODY_LIMIT is too large"))
    }
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64, // seconds
    pub statement_timeout: u64,  // seconds
}

impl Database {
    /// A pool wait must end before the store call's deadline does.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.statement_timeout > 0,
            "DATABASE_STATEMENT_TIMEOUT must be positive"
        );
        ensure!(
            self.connection_timeout > 0 && self.connection_timeout < self.statement_timeout,
            "DATABASE_CONNECTION_TIMEOUT must be positive and shorter than DATABASE_STATEMENT_TIMEOUT"
        );
        Ok(())
    }
}
