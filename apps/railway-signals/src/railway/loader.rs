use std::fmt;

use crate::railway::normalize::normalize_json;
use crate::railway::service::{RailwayError, RailwayService};
use crate::railway::store::StoreError;
use crate::railway::types::{LoadSummary, TrackSignals};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStep {
    Track,
    Signal,
    Mileage,
}

impl LoadStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Signal => "signal",
            Self::Mileage => "mileage",
        }
    }
}

/// First failure of a bulk load. Rows written before it stay committed.
#[derive(Debug)]
pub struct LoadError {
    pub step: LoadStep,
    pub track_id: i64,
    pub signal_id: Option<i64>,
    pub source: StoreError,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.step, self.signal_id) {
            (LoadStep::Track, _) | (_, None) => {
                write!(f, "creating track {}: {}", self.track_id, self.source)
            }
            (LoadStep::Signal, Some(signal_id)) => write!(
                f,
                "creating signal {signal_id} for track {}: {}",
                self.track_id, self.source
            ),
            (LoadStep::Mileage, Some(signal_id)) => write!(
                f,
                "creating mileage for signal {signal_id} on track {}: {}",
                self.track_id, self.source
            ),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl RailwayService {
    /// Normalizes and decodes a raw bulk-load body, then loads it.
    pub async fn load_json(&self, body: &[u8]) -> Result<LoadSummary, RailwayError> {
        let cleaned = normalize_json(body)?;
        let records: Vec<TrackSignals> = serde_json::from_slice(&cleaned).map_err(|error| {
            RailwayError::InvalidRequest(format!("invalid track signals payload: {error}"))
        })?;
        Ok(self.load_track_signals(records).await?)
    }

    /// Writes each record as a track, then its signals and their mileage links.
    ///
    /// Records are processed in order and the first failure aborts the rest of
    /// the batch. Each write commits on its own, so everything stored before the
    /// failure remains in place.
    pub async fn load_track_signals(
        &self,
        records: Vec<TrackSignals>,
    ) -> Result<LoadSummary, LoadError> {
        let mut summary = LoadSummary::default();

        for record in &records {
            let track_id = record.track_id;
            if let Err(source) = self.tracks.create_track(&record.track()).await {
                return Err(load_failure(LoadStep::Track, track_id, None, source));
            }
            summary.tracks += 1;

            for embedded in &record.signals {
                let signal_id = Some(embedded.signal_id);
                if let Err(source) = self.signals.create_signal(&embedded.signal()).await {
                    return Err(load_failure(LoadStep::Signal, track_id, signal_id, source));
                }
                summary.signals += 1;

                let mileage = embedded.mileage_on(track_id);
                if let Err(source) = self.mileages.add_mileage(&mileage).await {
                    return Err(load_failure(LoadStep::Mileage, track_id, signal_id, source));
                }
                summary.mileages += 1;
            }
        }

        tracing::info!(
            tracks = summary.tracks,
            signals = summary.signals,
            mileages = summary.mileages,
            "track signals loaded"
        );
        Ok(summary)
    }
}

fn load_failure(
    step: LoadStep,
    track_id: i64,
    signal_id: Option<i64>,
    source: StoreError,
) -> LoadError {
    tracing::error!(
        step = step.as_str(),
        track_id,
        signal_id,
        reason = %source,
        "failed to store record while loading track signals"
    );
    LoadError {
        step,
        track_id,
        signal_id,
        source,
    }
}
