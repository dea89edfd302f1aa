//! PostgreSQL destination over a single sqlx connection.
//!
//! The connection is driven by a private current-thread tokio runtime so the
//! loader can stay synchronous.

use super::schema::quote_identifier;
use super::{BulkDestination, DestinationError};
use crate::config::ConnectionConfig;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Connect options for a [`ConnectionConfig`].
pub fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .database(&config.database);
    if config.password.is_empty() {
        options
    } else {
        options.password(&config.password)
    }
}

/// `COPY` statement reading CSV from stdin, empty field = NULL.
pub fn copy_statement(table: &str, columns: &[String]) -> String {
    let columns: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, NULL '')",
        quote_identifier(table),
        columns.join(", ")
    )
}

/// Bulk destination backed by PostgreSQL's `COPY FROM STDIN`.
pub struct PostgresDestination {
    // Dropped before the runtime that drives it.
    conn: PgConnection,
    runtime: Runtime,
}

impl PostgresDestination {
    /// Open a connection.
    ///
    /// # Errors
    ///
    /// IO errors building the runtime and driver errors while connecting.
    pub fn connect(config: &ConnectionConfig) -> Result<Self, DestinationError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let options = connect_options(config);
        let conn = runtime.block_on(PgConnection::connect_with(&options))?;
        info!("Connected to {}", config);
        Ok(Self { conn, runtime })
    }

    /// Close the connection gracefully.
    pub fn close(self) -> Result<(), DestinationError> {
        let Self { conn, runtime } = self;
        runtime.block_on(conn.close())?;
        Ok(())
    }

    fn run_raw(&mut self, sql: &str) -> Result<(), DestinationError> {
        let conn = &mut self.conn;
        self.runtime.block_on(sqlx::raw_sql(sql).execute(conn))?;
        Ok(())
    }
}

impl BulkDestination for PostgresDestination {
    fn execute_ddl(&mut self, statement: &str) -> Result<(), DestinationError> {
        debug!("Executing: {}", statement);
        self.run_raw(statement)
    }

    fn begin(&mut self) -> Result<(), DestinationError> {
        self.run_raw("BEGIN")
    }

    fn copy_rows(
        &mut self,
        table: &str,
        columns: &[String],
        payload: &[u8],
    ) -> Result<u64, DestinationError> {
        let statement = copy_statement(table, columns);
        let conn = &mut self.conn;
        let rows = self.runtime.block_on(async {
            let mut copy = conn.copy_in_raw(&statement).await?;
            copy.send(payload).await?;
            copy.finish().await
        })?;
        Ok(rows)
    }

    fn commit(&mut self) -> Result<(), DestinationError> {
        self.run_raw("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), DestinationError> {
        self.run_raw("ROLLBACK")
    }
}
