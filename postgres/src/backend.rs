use crate::common::PostgresConfig;
use crate::wrapper::{PgDump, PgDumpOptions, PgRestore};
use crate::PostgresError;
use async_trait::async_trait;
use log::{debug, error, info};
use std::path::Path;
use tokio_postgres::{Client, NoTls};

/// Operations a site needs from its relational database.
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Writes a tar-format dump of the whole database to `dest`.
    async fn dump(&self, dest: &Path) -> Result<(), PostgresError>;

    /// Loads a dump produced by [`DatabaseBackend::dump`].
    async fn restore(&self, src: &Path) -> Result<(), PostgresError>;

    /// Drops every table in the public schema, cascading. Returns how many were dropped.
    async fn drop_all_tables(&self) -> Result<u64, PostgresError>;

    async fn is_reachable(&self) -> bool;

    /// First column of the first row of `sql`, if any.
    async fn query_text(&self, sql: &str) -> Result<Option<String>, PostgresError>;
}

pub struct Postgres {
    config: PostgresConfig,
}

impl Postgres {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    async fn connect(&self) -> Result<Client, PostgresError> {
        let conn_string = self.config.connection_string();
        let (client, connection) = tokio_postgres::connect(&conn_string, NoTls)
            .await
            .map_err(|e| PostgresError::ConnectionError(e.to_string()))?;

        // Spawn the connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Connection error: {e}");
            }
        });

        Ok(client)
    }
}

#[async_trait]
impl DatabaseBackend for Postgres {
    async fn dump(&self, dest: &Path) -> Result<(), PostgresError> {
        PgDump::new(self.config.clone())
            .run(&PgDumpOptions::tar(dest))
            .await
    }

    async fn restore(&self, src: &Path) -> Result<(), PostgresError> {
        PgRestore::new(self.config.clone()).restore(src).await
    }

    async fn drop_all_tables(&self) -> Result<u64, PostgresError> {
        let client = self.connect().await?;
        let rows = client
            .query(
                "SELECT tablename FROM pg_tables WHERE schemaname = 'public'",
                &[],
            )
            .await
            .map_err(|e| PostgresError::QueryError(e.to_string()))?;

        let mut dropped = 0;
        for row in rows {
            let table: String = row.get(0);
            debug!("Dropping table {table}");
            client
                .batch_execute(&format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(&table)))
                .await
                .map_err(|e| PostgresError::QueryError(format!("dropping {table}: {e}")))?;
            dropped += 1;
        }

        info!("Dropped {dropped} tables from {}", self.config.database);
        Ok(dropped)
    }

    async fn is_reachable(&self) -> bool {
        match self.connect().await {
            Ok(client) => client.simple_query("SELECT 1").await.is_ok(),
            Err(e) => {
                debug!("Database not reachable: {e}");
                false
            }
        }
    }

    async fn query_text(&self, sql: &str) -> Result<Option<String>, PostgresError> {
        let client = self.connect().await?;
        let rows = client
            .query(sql, &[])
            .await
            .map_err(|e| PostgresError::QueryError(e.to_string()))?;
        match rows.first() {
            Some(row) => row
                .try_get::<_, Option<String>>(0)
                .map_err(|e| PostgresError::QueryError(e.to_string())),
            None => Ok(None),
        }
    }
}

/// Quotes an identifier, doubling embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
