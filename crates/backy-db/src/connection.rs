//! Live MySQL connection management.

use backy_core::DatabaseConfig;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Row};
use tracing::info;

use crate::error::{DbError, Result};

/// An exclusive connection to the source (or target) database, held for the
/// lifetime of one backup or restore invocation.
pub struct MySqlSession {
    conn: MySqlConnection,
    version: String,
    db_name: String,
}

impl MySqlSession {
    /// Connect with the configured default schema selected.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Self::connect_inner(config, true).await
    }

    /// Connect without selecting a schema. Used by restore, where the
    /// schema may not exist until the payload's `CREATE DATABASE` runs.
    pub async fn connect_to_server(config: &DatabaseConfig) -> Result<Self> {
        Self::connect_inner(config, false).await
    }

    async fn connect_inner(config: &DatabaseConfig, with_db: bool) -> Result<Self> {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password);
        if with_db {
            options = options.database(&config.db_name);
        }

        let mut conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|err| DbError::ConnectionFailed(err.to_string()))?;

        let version: String = sqlx::query("SELECT VERSION()")
            .fetch_one(&mut conn)
            .await
            .map_err(|err| DbError::ConnectionFailed(err.to_string()))?
            .try_get(0)?;

        info!(db = %config.db_name, %version, "connected to MySQL");
        Ok(Self {
            conn,
            version,
            db_name: config.db_name.clone(),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn connection(&mut self) -> &mut MySqlConnection {
        &mut self.conn
    }

    /// Close the connection gracefully.
    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        info!("MySQL connection closed");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use backy_core::{BackupType, ConflictMode, DatabaseKind, FeatureToggles};

    /// Connection settings for the live-database tests, from
    /// `BACKY_TEST_DB_*` with local defaults.
    pub(crate) fn live_config() -> DatabaseConfig {
        let env = |key: &str, default: &str| {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        DatabaseConfig {
            host: env("BACKY_TEST_DB_HOST", "localhost"),
            port: env("BACKY_TEST_DB_PORT", "3306").parse().unwrap_or(3306),
            user: env("BACKY_TEST_DB_USER", "root"),
            password: env("BACKY_TEST_DB_PASSWORD", ""),
            db_name: env("BACKY_TEST_DB_NAME", "backy_test"),
            db_type: DatabaseKind::Mysql,
            backup_type: BackupType::Sql,
            multiple_files: false,
            features: FeatureToggles::default(),
            restore_mode: None,
            conflict_mode: ConflictMode::Skip,
        }
    }

    #[tokio::test]
    #[ignore = "needs a live MySQL instance (set BACKY_TEST_DB_*)"]
    async fn connect_reports_the_server_version() {
        let session = MySqlSession::connect(&live_config()).await.unwrap();
        assert!(!session.version().is_empty());
        session.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a live MySQL instance (set BACKY_TEST_DB_*)"]
    async fn bad_credentials_fail_with_connection_error() {
        let mut config = live_config();
        config.password = "definitely-wrong".to_string();
        assert!(matches!(
            MySqlSession::connect(&config).await,
            Err(DbError::ConnectionFailed(_))
        ));
    }
}
