use log::debug;
use serde::{Deserialize, Serialize};

/// Connection parameters for a PostgreSQL database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
}

impl PostgresConfig {
    pub fn connection_string(&self) -> String {
        let mut conn_string = format!(
            "host={} port={} dbname={} user={}",
            self.host, self.port, self.database, self.user
        );
        debug!("Creating connection string for {conn_string}");

        if let Some(password) = &self.password {
            conn_string.push_str(&format!(" password={password}"));
        }

        conn_string
    }
}
