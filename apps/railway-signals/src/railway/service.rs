use std::sync::Arc;

use crate::railway::loader::LoadError;
use crate::railway::normalize::NormalizeError;
use crate::railway::store::{MileageStore, RailwayStores, SignalStore, StoreError, TrackStore};
use crate::railway::types::{Mileage, Page, PageRequest, Signal, Track};

#[derive(Debug, thiserror::Error)]
pub enum RailwayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RailwayError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Load(_) => "load_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::InvalidRequest(message) | Self::Internal(message) => message.clone(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Load(error) => error.to_string(),
        }
    }
}

impl From<NormalizeError> for RailwayError {
    fn from(error: NormalizeError) -> Self {
        Self::InvalidRequest(error.to_string())
    }
}

/// CRUD entry points over the three storage capabilities.
#[derive(Clone)]
pub struct RailwayService {
    pub(crate) signals: Arc<dyn SignalStore>,
    pub(crate) tracks: Arc<dyn TrackStore>,
    pub(crate) mileages: Arc<dyn MileageStore>,
}

impl RailwayService {
    pub fn new(
        signals: Arc<dyn SignalStore>,
        tracks: Arc<dyn TrackStore>,
        mileages: Arc<dyn MileageStore>,
    ) -> Self {
        Self {
            signals,
            tracks,
            mileages,
        }
    }

    pub fn from_stores(stores: &RailwayStores) -> Self {
        Self::new(
            stores.signals.clone(),
            stores.tracks.clone(),
            stores.mileages.clone(),
        )
    }

    /// Stores the signal unless one with the same id exists, with the ELR
    /// fallback applied. Returns the stored record, which on a duplicate id is
    /// the earlier one rather than `signal`.
    pub async fn create_signal(&self, signal: Signal) -> Result<Signal, RailwayError> {
        let signal = signal.with_elr_fallback();
        self.signals
            .create_signal(&signal)
            .await
            .map_err(|error| map_store_error("create signal", error))
    }

    pub async fn get_signal(&self, signal_id: i64) -> Result<Signal, RailwayError> {
        self.signals
            .get_signal(signal_id)
            .await
            .map_err(|error| map_store_error("get signal", error))
    }

    pub async fn list_signals(&self, request: PageRequest) -> Result<Page<Signal>, RailwayError> {
        let (items, total) = self
            .signals
            .list_signals(request.limit, request.page)
            .await
            .map_err(|error| map_store_error("list signals", error))?;
        Ok(Page {
            items,
            total,
            next_page: request.next_page(total),
        })
    }

    pub async fn update_signal(&self, signal: Signal) -> Result<Signal, RailwayError> {
        let signal = signal.with_elr_fallback();
        self.signals
            .update_signal(&signal)
            .await
            .map_err(|error| map_store_error("update signal", error))?;
        Ok(signal)
    }

    pub async fn delete_signal(&self, signal_id: i64) -> Result<(), RailwayError> {
        self.signals
            .delete_signal(signal_id)
            .await
            .map_err(|error| map_store_error("delete signal", error))
    }

    pub async fn create_track(&self, track: Track) -> Result<Track, RailwayError> {
        self.tracks
            .create_track(&track)
            .await
            .map_err(|error| map_store_error("create track", error))
    }

    pub async fn get_track(&self, track_id: i64) -> Result<Track, RailwayError> {
        self.tracks
            .get_track(track_id)
            .await
            .map_err(|error| map_store_error("get track", error))
    }

    pub async fn list_tracks(&self, request: PageRequest) -> Result<Page<Track>, RailwayError> {
        let (items, total) = self
            .tracks
            .list_tracks(request.limit, request.page)
            .await
            .map_err(|error| map_store_error("list tracks", error))?;
        Ok(Page {
            items,
            total,
            next_page: request.next_page(total),
        })
    }

    pub async fn update_track(&self, track: Track) -> Result<Track, RailwayError> {
        self.tracks
            .update_track(&track)
            .await
            .map_err(|error| map_store_error("update track", error))?;
        Ok(track)
    }

    pub async fn delete_track(&self, track_id: i64) -> Result<(), RailwayError> {
        self.tracks
            .delete_track(track_id)
            .await
            .map_err(|error| map_store_error("delete track", error))
    }

    pub async fn list_signal_tracks(
        &self,
        signal_id: i64,
        request: PageRequest,
    ) -> Result<Page<Track>, RailwayError> {
        let (items, total) = self
            .tracks
            .list_signal_tracks(signal_id, request.limit, request.page)
            .await
            .map_err(|error| map_store_error("list signal tracks", error))?;
        Ok(Page {
            items,
            total,
            next_page: request.next_page(total),
        })
    }

    pub async fn add_mileage(&self, mileage: Mileage) -> Result<(), RailwayError> {
        self.mileages
            .add_mileage(&mileage)
            .await
            .map_err(|error| map_store_error("add mileage", error))
    }
}

fn map_store_error(operation: &'static str, error: StoreError) -> RailwayError {
    match error {
        StoreError::NotFound(what) => RailwayError::NotFound(what),
        StoreError::Db(message) => {
            tracing::error!(operation, reason = %message, "railway store operation failed");
            RailwayError::Internal(format!("{operation}: {message}"))
        }
    }
}
