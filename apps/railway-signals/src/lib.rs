#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
    config::Config,
    db::RailwayDb,
    railway::{RailwayService, store},
    server::{AppState, build_router},
};

pub mod config;
pub mod db;
pub mod railway;
pub mod server;

pub async fn build_app_state(config: Config) -> Result<AppState> {
    let db = match config.db_url.clone() {
        Some(url) => Some(Arc::new(
            RailwayDb::connect(url.as_str(), config.service_name.as_str()).await?,
        )),
        None => None,
    };
    let stores = match db.clone() {
        Some(db) => store::postgres(db),
        None => {
            warn!("no DB_URL configured; railway records are kept in memory");
            store::memory()
        }
    };
    let service = RailwayService::from_stores(&stores);
    Ok(AppState::new(config, service, db, stores.driver))
}

pub async fn build_app(config: Config) -> Result<axum::Router> {
    Ok(build_router(build_app_state(config).await?))
}

pub async fn serve(config: Config) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(
        service = %config.service_name,
        bind_addr = %config.bind_addr,
        log_format = config.log_format.as_str(),
        "railway signals service listening"
    );
    axum::serve(listener, build_app(config).await?).await?;
    Ok(())
}
