use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::railway::loader::LoadStep;
use crate::railway::service::{RailwayError, RailwayService};
use crate::railway::store::{self, SignalStore, StoreError};
use crate::railway::types::{
    ELR_SENTINEL, Mileage, PageRequest, Signal, SignalMileage, Track, TrackSignals,
};

/// Delegates to a real store but refuses to create one signal id.
struct FailingSignalStore {
    inner: Arc<dyn SignalStore>,
    fail_on: i64,
}

#[async_trait]
impl SignalStore for FailingSignalStore {
    async fn create_signal(&self, signal: &Signal) -> Result<Signal, StoreError> {
        if signal.id == self.fail_on {
            return Err(StoreError::Db("simulated insert failure".to_string()));
        }
        self.inner.create_signal(signal).await
    }

    async fn get_signal(&self, signal_id: i64) -> Result<Signal, StoreError> {
        self.inner.get_signal(signal_id).await
    }

    async fn list_signals(
        &self,
        limit: u32,
        page: u32,
    ) -> Result<(Vec<Signal>, u64), StoreError> {
        self.inner.list_signals(limit, page).await
    }

    async fn update_signal(&self, signal: &Signal) -> Result<(), StoreError> {
        self.inner.update_signal(signal).await
    }

    async fn delete_signal(&self, signal_id: i64) -> Result<(), StoreError> {
        self.inner.delete_signal(signal_id).await
    }
}

fn signal(id: i64, name: &str, elr: &str) -> Signal {
    Signal {
        id,
        name: Some(name.to_string()),
        elr: elr.to_string(),
    }
}

fn track(id: i64, source: &str, target: &str) -> Track {
    Track {
        id,
        source: source.to_string(),
        target: target.to_string(),
    }
}

fn track_signals(track_id: i64, signals: &[(i64, &str, Option<f64>)]) -> TrackSignals {
    TrackSignals {
        track_id,
        source: format!("S{track_id}"),
        target: format!("T{track_id}"),
        signals: signals
            .iter()
            .map(|(signal_id, elr, mileage)| SignalMileage {
                signal_id: *signal_id,
                signal_name: Some(format!("signal-{signal_id}")),
                elr: (*elr).to_string(),
                mileage: *mileage,
            })
            .collect(),
        mileage: None,
    }
}

#[tokio::test]
async fn signal_round_trip_returns_identical_record() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    let created = service.create_signal(signal(1, "signal", "asdf")).await?;
    let fetched = service.get_signal(1).await?;
    assert_eq!(created, fetched);
    assert_eq!(fetched, signal(1, "signal", "asdf"));
    Ok(())
}

#[tokio::test]
async fn duplicate_signal_create_keeps_first_record() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    service.create_signal(signal(5, "first", "ELR1")).await?;
    let returned = service.create_signal(signal(5, "second", "ELR2")).await?;
    assert_eq!(returned, signal(5, "first", "ELR1"));

    let stored = service.get_signal(5).await?;
    assert_eq!(stored.name.as_deref(), Some("first"));
    assert_eq!(stored.elr, "ELR1");
    Ok(())
}

#[tokio::test]
async fn missing_records_surface_not_found() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    match service.get_track(404).await {
        Err(RailwayError::NotFound(what)) => assert_eq!(what, "track 404"),
        other => return Err(anyhow!("expected not found, got {other:?}")),
    }
    match service.update_signal(signal(9, "ghost", "X")).await {
        Err(RailwayError::NotFound(_)) => {}
        other => return Err(anyhow!("expected not found on update, got {other:?}")),
    }
    Ok(())
}

#[tokio::test]
async fn deleting_absent_track_succeeds() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    service.delete_track(12345).await?;

    service.create_track(track(1, "A", "B")).await?;
    service.delete_track(1).await?;
    service.delete_track(1).await?;
    assert!(matches!(
        service.get_track(1).await,
        Err(RailwayError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn update_replaces_whole_track() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    service.create_track(track(3, "A", "B")).await?;
    service.update_track(track(3, "C", "D")).await?;
    assert_eq!(service.get_track(3).await?, track(3, "C", "D"));
    Ok(())
}

#[tokio::test]
async fn pagination_returns_expected_slices() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    for id in 1..=7 {
        service.create_signal(signal(id, "s", "E")).await?;
    }

    let expectations = [(0, 3, Some(1)), (1, 3, Some(2)), (2, 1, Some(3)), (3, 0, None)];
    for (page, expected_len, expected_next) in expectations {
        let result = service.list_signals(PageRequest::new(3, page)).await?;
        assert_eq!(result.items.len(), expected_len, "page {page}");
        assert_eq!(result.total, 7);
        assert_eq!(result.next_page, expected_next, "page {page}");
    }

    let first = service.list_signals(PageRequest::new(3, 0)).await?;
    let ids: Vec<i64> = first.items.iter().map(|signal| signal.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn signal_tracks_are_scoped_to_linked_tracks() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    for id in 1..=4 {
        service.create_track(track(id, "A", "B")).await?;
    }
    service.create_signal(signal(10, "s", "E")).await?;
    for track_id in [2, 4] {
        service
            .add_mileage(Mileage {
                signal_id: 10,
                track_id,
                mileage: Some(1.0),
            })
            .await?;
    }
    service
        .add_mileage(Mileage {
            signal_id: 10,
            track_id: 2,
            mileage: Some(2.0),
        })
        .await?;

    let page = service
        .list_signal_tracks(10, PageRequest::new(100, 0))
        .await?;
    let ids: Vec<i64> = page.items.iter().map(|track| track.id).collect();
    assert_eq!(ids, vec![2, 4]);
    assert_eq!(page.total, 2);

    let unlinked = service
        .list_signal_tracks(11, PageRequest::new(100, 0))
        .await?;
    assert!(unlinked.items.is_empty());
    assert_eq!(unlinked.next_page, None);
    Ok(())
}

#[tokio::test]
async fn mileage_must_reference_stored_signal_and_track() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    service.create_track(track(1, "A", "B")).await?;
    service.create_signal(signal(10, "s", "E")).await?;

    for (signal_id, track_id) in [(99, 1), (10, 99)] {
        match service
            .add_mileage(Mileage {
                signal_id,
                track_id,
                mileage: None,
            })
            .await
        {
            Err(RailwayError::Internal(message)) => {
                assert!(message.contains("mileage references missing"));
            }
            other => return Err(anyhow!("expected dangling link rejection, got {other:?}")),
        }
    }
    let page = service
        .list_signal_tracks(10, PageRequest::new(10, 0))
        .await?;
    assert_eq!(page.total, 0);
    Ok(())
}

#[tokio::test]
async fn deleting_a_track_drops_its_mileage_links() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    service
        .load_track_signals(vec![track_signals(1, &[(10, "E", Some(1.5))])])
        .await?;
    service.delete_track(1).await?;

    let page = service
        .list_signal_tracks(10, PageRequest::new(100, 0))
        .await?;
    assert_eq!(page.total, 0);
    Ok(())
}

#[tokio::test]
async fn loader_persists_track_signal_and_mileage() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    let summary = service
        .load_track_signals(vec![track_signals(1, &[(10, "", Some(1.5)), (11, "MLN", None)])])
        .await?;
    assert_eq!(summary.tracks, 1);
    assert_eq!(summary.signals, 2);
    assert_eq!(summary.mileages, 2);

    assert_eq!(service.get_track(1).await?, track(1, "S1", "T1"));
    assert_eq!(service.get_signal(10).await?.elr, ELR_SENTINEL);
    assert_eq!(service.get_signal(11).await?.elr, "MLN");

    let linked = service
        .list_signal_tracks(11, PageRequest::new(10, 0))
        .await?;
    assert_eq!(linked.items, vec![track(1, "S1", "T1")]);
    Ok(())
}

#[tokio::test]
async fn repeated_load_is_idempotent_for_tracks_and_signals() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    let batch = vec![track_signals(1, &[(10, "E", Some(1.5))])];
    service.load_track_signals(batch.clone()).await?;
    service.load_track_signals(batch).await?;

    assert_eq!(service.list_tracks(PageRequest::new(10, 0)).await?.total, 1);
    assert_eq!(service.list_signals(PageRequest::new(10, 0)).await?.total, 1);
    Ok(())
}

#[tokio::test]
async fn loader_stops_at_first_failure_and_names_the_step() -> Result<()> {
    let stores = store::memory();
    let service = RailwayService::new(
        Arc::new(FailingSignalStore {
            inner: stores.signals.clone(),
            fail_on: 21,
        }),
        stores.tracks.clone(),
        stores.mileages.clone(),
    );

    let batch = vec![
        track_signals(1, &[(10, "E", Some(0.5)), (11, "E", Some(0.75))]),
        track_signals(2, &[(20, "E", Some(1.0)), (21, "E", Some(2.0))]),
        track_signals(3, &[(30, "E", Some(3.0))]),
    ];
    let error = match service.load_track_signals(batch).await {
        Ok(summary) => return Err(anyhow!("expected failure, loaded {summary:?}")),
        Err(error) => error,
    };
    assert_eq!(error.step, LoadStep::Signal);
    assert_eq!(error.track_id, 2);
    assert_eq!(error.signal_id, Some(21));
    assert!(error.to_string().starts_with("creating signal 21 for track 2"));

    // Track A and its graph are committed.
    service.get_track(1).await?;
    service.get_signal(10).await?;
    service.get_signal(11).await?;
    let linked = service
        .list_signal_tracks(11, PageRequest::new(10, 0))
        .await?;
    assert_eq!(linked.total, 1);

    // Track B's row and first signal landed; the failing signal did not.
    service.get_track(2).await?;
    service.get_signal(20).await?;
    assert!(matches!(
        service.get_signal(21).await,
        Err(RailwayError::NotFound(_))
    ));

    // Nothing after the failure was attempted.
    assert!(matches!(
        service.get_track(3).await,
        Err(RailwayError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn load_json_normalizes_nan_before_decoding() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    let body = br#"[{"track_id":7,"source":"A","target":"B","mileage":NaN,
        "signals":[{"signal_id":70,"signal_name":null,"elr":"E","mileage":NaN}]}]"#;
    let summary = service.load_json(body).await?;
    assert_eq!(summary.mileages, 1);
    assert_eq!(service.get_signal(70).await?.name, None);
    Ok(())
}

#[tokio::test]
async fn load_json_accepts_nan_and_null_in_text_and_list_fields() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    let body = br#"[{"track_id":8,"source":"A","target":"B","signals":[{"signal_id":80,"signal_name":"S","elr":NaN,"mileage":2.0}]},
        {"track_id":9,"source":"C","target":"D","signals":null},
        {"track_id":10,"source":"E","target":"F","signals":NaN}]"#;
    let summary = service.load_json(body).await?;
    assert_eq!(summary.tracks, 3);
    assert_eq!(summary.signals, 1);
    assert_eq!(service.get_signal(80).await?.elr, ELR_SENTINEL);
    assert_eq!(service.get_track(9).await?, track(9, "C", "D"));
    assert_eq!(service.get_track(10).await?, track(10, "E", "F"));
    Ok(())
}

#[tokio::test]
async fn load_json_rejects_malformed_payloads() -> Result<()> {
    let service = RailwayService::from_stores(&store::memory());
    for body in [&b"[{"[..], &br#"{"track_id":1}"#[..]] {
        match service.load_json(body).await {
            Err(error @ RailwayError::InvalidRequest(_)) => {
                assert_eq!(error.code(), "invalid_request");
            }
            other => return Err(anyhow!("expected invalid request, got {other:?}")),
        }
    }
    Ok(())
}
