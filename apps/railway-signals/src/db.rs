//! Shared PostgreSQL session for the railway stores.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};

/// One client behind a mutex; every store call takes the lock for its whole
/// transaction.
#[derive(Clone)]
pub struct RailwayDb {
    client: Arc<Mutex<Client>>,
}

impl RailwayDb {
    /// Connects to `database_url`, tagging the session with `application_name`
    /// so it is identifiable in `pg_stat_activity`.
    pub async fn connect(database_url: &str, application_name: &str) -> Result<Self> {
        let mut pg_config: tokio_postgres::Config = database_url
            .parse()
            .context("parse railway database url")?;
        pg_config.application_name(application_name);
        let (client, connection) = pg_config
            .connect(NoTls)
            .await
            .context("connect railway store to postgres")?;

        let session_name = application_name.to_string();
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::error!(
                    application_name = %session_name,
                    reason = %error,
                    "railway store lost its postgres connection"
                );
            }
        });
        tracing::info!(application_name, "railway store connected to postgres");

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
        })
    }

    pub fn client(&self) -> Arc<Mutex<Client>> {
        self.client.clone()
    }

    /// Used by `/readyz`.
    pub async fn ping(&self) -> Result<()> {
        let client = self.client.lock().await;
        client
            .simple_query("SELECT 1")
            .await
            .context("ping railway postgres")?;
        Ok(())
    }
}
