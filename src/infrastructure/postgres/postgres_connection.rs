use std::time::Duration;

use anyhow::{Result, anyhow};
use diesel::{
    Connection, PgConnection,
    connection::{CacheSize, SimpleConnection},
    r2d2::{ConnectionManager, CustomizeConnection, Error as R2d2Error, Pool, PooledConnection},
};

use crate::{config::config_model::Database, domain::value_objects::store_context::StoreContext};

/// Applied to every connection the pool hands out.
#[derive(Debug)]
struct SessionSettings {
    statement_timeout: Duration,
}

impl CustomizeConnection<PgConnection, R2d2Error> for SessionSettings {
    fn on_acquire(&self, conn: &mut PgConnection) -> std::result::Result<(), R2d2Error> {
        conn.set_prepared_statement_cache_size(CacheSize::Disabled);
        // Abandoned statements are cancelled server side as well.
        conn.batch_execute(&format!(
            "SET statement_timeout = {}",
            self.statement_timeout.as_millis()
        ))
        .map_err(R2d2Error::QueryError)?;
        Ok(())
    }
}

pub type PgPoolSquad = Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

pub fn establish_connection(database: &Database) -> Result<PgPoolSquad> {
    let manager = ConnectionManager::<PgConnection>::new(&database.url);
    let pool = Pool::builder()
        .max_size(database.max_connections)
        .connection_timeout(Duration::from_secs(database.connection_timeout))
        .connection_customizer(Box::new(SessionSettings {
            statement_timeout: Duration::from_secs(database.statement_timeout),
        }))
        .build(manager)?;
    Ok(pool)
}

/// Takes a connection for one store call. Waits no longer than the call's
/// deadline and claims the call before handing the connection over, so a
/// caller that already gave up never sees its statement executed.
pub fn checkout(db_pool: &PgPoolSquad, ctx: &StoreContext) -> Result<PgPooledConnection> {
    let remaining = ctx
        .remaining()
        .ok_or_else(|| anyhow!("store deadline passed before a connection was requested"))?;
    let wait = remaining.min(db_pool.connection_timeout());

    let conn = db_pool.get_timeout(wait)?;
    ctx.begin()?;

    Ok(conn)
}
