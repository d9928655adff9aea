//! Pooled connections.
//!
//! A deadpool pool hands out raw clients; [`connect_pool`] checks one out and
//! wraps it in a [`Connection`] so builders, pagination and transactions see the
//! same policies and logging as a directly connected client. The wrapped client
//! returns to the pool when the `Connection` is dropped.
//!
//! ```ignore
//! let pool = querykit::create_pool(&database_url)?;
//! let conn = querykit::connect_pool(&pool, ConnectionConfig::new()).await?;
//! let total = table("products").count(&conn).await?;
//! ```

use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolBuilder, RecyclingMethod};
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::{NoTls, Socket};

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::{DbError, DbResult};

const DEFAULT_MAX_SIZE: usize = 16;

/// Pool of `DEFAULT_MAX_SIZE` plain-TCP clients.
pub fn create_pool(database_url: &str) -> DbResult<Pool> {
    create_pool_with_config(database_url, DEFAULT_MAX_SIZE)
}

pub fn create_pool_with_config(database_url: &str, max_size: usize) -> DbResult<Pool> {
    create_pool_with_manager_config(database_url, NoTls, fast_recycling(), |builder| {
        builder.max_size(max_size)
    })
}

pub fn create_pool_with_tls<T>(database_url: &str, tls: T) -> DbResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    create_pool_with_manager_config(database_url, tls, fast_recycling(), |builder| {
        builder.max_size(DEFAULT_MAX_SIZE)
    })
}

/// Full control over the manager and pool builder, for timeouts and recycling.
pub fn create_pool_with_manager_config<T>(
    database_url: &str,
    tls: T,
    manager_config: ManagerConfig,
    configure_pool: impl FnOnce(PoolBuilder) -> PoolBuilder,
) -> DbResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let manager = Manager::from_config(parse_url(database_url)?, tls, manager_config);
    configure_pool(Pool::builder(manager))
        .build()
        .map_err(|e| DbError::Pool(e.to_string()))
}

/// Check a client out of `pool` and wrap it in a [`Connection`].
///
/// Transaction depth lives on the returned `Connection`, so a transaction and
/// its savepoints stay on this one pooled client.
pub async fn connect_pool(
    pool: &Pool,
    config: ConnectionConfig,
) -> DbResult<Connection<deadpool_postgres::Client>> {
    let client = pool.get().await?;
    let status = pool.status();
    tracing::trace!(
        target: "querykit.conn",
        available = status.available,
        size = status.size,
        "checked out pooled client"
    );
    Ok(Connection::with_config(client, config))
}

fn parse_url(database_url: &str) -> DbResult<tokio_postgres::Config> {
    database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| DbError::Connection {
            message: "invalid database url".to_string(),
            source: Some(Box::new(e)),
        })
}

fn fast_recycling() -> ManagerConfig {
    ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    }
}
