use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::IsolationLevel;

use crate::db::RailwayDb;
use crate::railway::types::{Mileage, Signal, Track};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("db error: {0}")]
    Db(String),
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Inserts the signal unless the id is taken, then returns the stored row.
    /// An existing row is left untouched and is what comes back.
    async fn create_signal(&self, signal: &Signal) -> Result<Signal, StoreError>;

    async fn get_signal(&self, signal_id: i64) -> Result<Signal, StoreError>;

    /// Returns one page ordered by id together with the total row count.
    async fn list_signals(&self, limit: u32, page: u32)
    -> Result<(Vec<Signal>, u64), StoreError>;

    async fn update_signal(&self, signal: &Signal) -> Result<(), StoreError>;

    /// Deleting an absent id succeeds.
    async fn delete_signal(&self, signal_id: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TrackStore: Send + Sync {
    async fn create_track(&self, track: &Track) -> Result<Track, StoreError>;

    async fn get_track(&self, track_id: i64) -> Result<Track, StoreError>;

    async fn list_tracks(&self, limit: u32, page: u32) -> Result<(Vec<Track>, u64), StoreError>;

    async fn update_track(&self, track: &Track) -> Result<(), StoreError>;

    async fn delete_track(&self, track_id: i64) -> Result<(), StoreError>;

    /// Tracks linked to `signal_id` through a mileage row. The count is scoped to
    /// the same linked set.
    async fn list_signal_tracks(
        &self,
        signal_id: i64,
        limit: u32,
        page: u32,
    ) -> Result<(Vec<Track>, u64), StoreError>;
}

#[async_trait]
pub trait MileageStore: Send + Sync {
    async fn add_mileage(&self, mileage: &Mileage) -> Result<(), StoreError>;
}

/// The three storage capabilities, each backed by the same adapter.
#[derive(Clone)]
pub struct RailwayStores {
    pub signals: Arc<dyn SignalStore>,
    pub tracks: Arc<dyn TrackStore>,
    pub mileages: Arc<dyn MileageStore>,
    pub driver: &'static str,
}

pub fn memory() -> RailwayStores {
    let store = Arc::new(MemoryRailwayStore::default());
    RailwayStores {
        signals: store.clone(),
        tracks: store.clone(),
        mileages: store,
        driver: "memory",
    }
}

pub fn postgres(db: Arc<RailwayDb>) -> RailwayStores {
    let store = Arc::new(PostgresRailwayStore { db });
    RailwayStores {
        signals: store.clone(),
        tracks: store.clone(),
        mileages: store,
        driver: "postgres",
    }
}

fn page_bounds(limit: u32, page: u32) -> (usize, usize) {
    let offset = u64::from(page) * u64::from(limit);
    (
        usize::try_from(offset).unwrap_or(usize::MAX),
        usize::try_from(limit).unwrap_or(usize::MAX),
    )
}

#[derive(Default)]
struct MemoryRailwayStore {
    inner: Mutex<MemoryRailwayStoreInner>,
}

#[derive(Default)]
struct MemoryRailwayStoreInner {
    signals: BTreeMap<i64, Signal>,
    tracks: BTreeMap<i64, Track>,
    mileages: Vec<Mileage>,
}

#[async_trait]
impl SignalStore for MemoryRailwayStore {
    async fn create_signal(&self, signal: &Signal) -> Result<Signal, StoreError> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .signals
            .entry(signal.id)
            .or_insert_with(|| signal.clone());
        Ok(stored.clone())
    }

    async fn get_signal(&self, signal_id: i64) -> Result<Signal, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .signals
            .get(&signal_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("signal {signal_id}")))
    }

    async fn list_signals(
        &self,
        limit: u32,
        page: u32,
    ) -> Result<(Vec<Signal>, u64), StoreError> {
        let inner = self.inner.lock().await;
        let (offset, take) = page_bounds(limit, page);
        let signals = inner
            .signals
            .values()
            .skip(offset)
            .take(take)
            .cloned()
            .collect();
        Ok((signals, inner.signals.len() as u64))
    }

    async fn update_signal(&self, signal: &Signal) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(existing) = inner.signals.get_mut(&signal.id) else {
            return Err(StoreError::NotFound(format!("signal {}", signal.id)));
        };
        *existing = signal.clone();
        Ok(())
    }

    async fn delete_signal(&self, signal_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.signals.remove(&signal_id).is_some() {
            inner
                .mileages
                .retain(|mileage| mileage.signal_id != signal_id);
        }
        Ok(())
    }
}

#[async_trait]
impl TrackStore for MemoryRailwayStore {
    async fn create_track(&self, track: &Track) -> Result<Track, StoreError> {
        let mut inner = self.inner.lock().await;
        let stored = inner.tracks.entry(track.id).or_insert_with(|| track.clone());
        Ok(stored.clone())
    }

    async fn get_track(&self, track_id: i64) -> Result<Track, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .tracks
            .get(&track_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("track {track_id}")))
    }

    async fn list_tracks(&self, limit: u32, page: u32) -> Result<(Vec<Track>, u64), StoreError> {
        let inner = self.inner.lock().await;
        let (offset, take) = page_bounds(limit, page);
        let tracks = inner
            .tracks
            .values()
            .skip(offset)
            .take(take)
            .cloned()
            .collect();
        Ok((tracks, inner.tracks.len() as u64))
    }

    async fn update_track(&self, track: &Track) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(existing) = inner.tracks.get_mut(&track.id) else {
            return Err(StoreError::NotFound(format!("track {}", track.id)));
        };
        *existing = track.clone();
        Ok(())
    }

    async fn delete_track(&self, track_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.tracks.remove(&track_id).is_some() {
            inner.mileages.retain(|mileage| mileage.track_id != track_id);
        }
        Ok(())
    }

    async fn list_signal_tracks(
        &self,
        signal_id: i64,
        limit: u32,
        page: u32,
    ) -> Result<(Vec<Track>, u64), StoreError> {
        let inner = self.inner.lock().await;
        let linked: BTreeSet<i64> = inner
            .mileages
            .iter()
            .filter(|mileage| mileage.signal_id == signal_id)
            .map(|mileage| mileage.track_id)
            .collect();
        let matching: Vec<&Track> = linked
            .iter()
            .filter_map(|track_id| inner.tracks.get(track_id))
            .collect();
        let (offset, take) = page_bounds(limit, page);
        let tracks = matching
            .iter()
            .skip(offset)
            .take(take)
            .map(|track| (*track).clone())
            .collect();
        Ok((tracks, matching.len() as u64))
    }
}

#[async_trait]
impl MileageStore for MemoryRailwayStore {
    async fn add_mileage(&self, mileage: &Mileage) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        // Same referential checks as the mileages foreign keys.
        if !inner.signals.contains_key(&mileage.signal_id) {
            return Err(StoreError::Db(format!(
                "mileage references missing signal {}",
                mileage.signal_id
            )));
        }
        if !inner.tracks.contains_key(&mileage.track_id) {
            return Err(StoreError::Db(format!(
                "mileage references missing track {}",
                mileage.track_id
            )));
        }
        inner.mileages.push(mileage.clone());
        Ok(())
    }
}

struct PostgresRailwayStore {
    db: Arc<RailwayDb>,
}

fn db_error(error: tokio_postgres::Error) -> StoreError {
    StoreError::Db(error.to_string())
}

fn sql_page(limit: u32, page: u32) -> Result<(i64, i64), StoreError> {
    let offset = i64::try_from(u64::from(page) * u64::from(limit))
        .map_err(|error| StoreError::Db(format!("page offset out of range: {error}")))?;
    Ok((i64::from(limit), offset))
}

fn sql_count(row: &tokio_postgres::Row) -> Result<u64, StoreError> {
    let total: i64 = row.try_get("total").map_err(db_error)?;
    u64::try_from(total).map_err(|error| StoreError::Db(error.to_string()))
}

#[async_trait]
impl SignalStore for PostgresRailwayStore {
    async fn create_signal(&self, signal: &Signal) -> Result<Signal, StoreError> {
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client.transaction().await.map_err(db_error)?;
        tx.execute(
            r#"
            INSERT INTO signals (signal_id, signal_name, elr)
            VALUES ($1, $2, $3)
            ON CONFLICT (signal_id) DO NOTHING
            "#,
            &[&signal.id, &signal.name, &signal.elr],
        )
        .await
        .map_err(db_error)?;
        let row = tx
            .query_one(
                "SELECT signal_id, signal_name, elr FROM signals WHERE signal_id = $1",
                &[&signal.id],
            )
            .await
            .map_err(db_error)?;
        let stored = map_signal_row(&row).map_err(StoreError::Db)?;
        tx.commit().await.map_err(db_error)?;
        Ok(stored)
    }

    async fn get_signal(&self, signal_id: i64) -> Result<Signal, StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        let row = client
            .query_opt(
                r#"
                SELECT signal_id, signal_name, elr
                  FROM signals
                 WHERE signal_id = $1
                "#,
                &[&signal_id],
            )
            .await
            .map_err(db_error)?
            .ok_or_else(|| StoreError::NotFound(format!("signal {signal_id}")))?;
        map_signal_row(&row).map_err(StoreError::Db)
    }

    async fn list_signals(
        &self,
        limit: u32,
        page: u32,
    ) -> Result<(Vec<Signal>, u64), StoreError> {
        let (limit, offset) = sql_page(limit, page)?;
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await
            .map_err(db_error)?;

        let rows = tx
            .query(
                r#"
                SELECT signal_id, signal_name, elr
                  FROM signals
                 ORDER BY signal_id
                 LIMIT $1 OFFSET $2
                "#,
                &[&limit, &offset],
            )
            .await
            .map_err(db_error)?;
        let total = tx
            .query_one("SELECT COUNT(*) AS total FROM signals", &[])
            .await
            .map_err(db_error)?;
        let total = sql_count(&total)?;
        tx.commit().await.map_err(db_error)?;

        let signals = rows
            .iter()
            .map(map_signal_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Db)?;
        Ok((signals, total))
    }

    async fn update_signal(&self, signal: &Signal) -> Result<(), StoreError> {
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client.transaction().await.map_err(db_error)?;
        let updated = tx
            .execute(
                r#"
                UPDATE signals
                   SET signal_name = $2, elr = $3
                 WHERE signal_id = $1
                "#,
                &[&signal.id, &signal.name, &signal.elr],
            )
            .await
            .map_err(db_error)?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("signal {}", signal.id)));
        }
        tx.commit().await.map_err(db_error)
    }

    async fn delete_signal(&self, signal_id: i64) -> Result<(), StoreError> {
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client.transaction().await.map_err(db_error)?;
        tx.execute("DELETE FROM signals WHERE signal_id = $1", &[&signal_id])
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)
    }
}

#[async_trait]
impl TrackStore for PostgresRailwayStore {
    async fn create_track(&self, track: &Track) -> Result<Track, StoreError> {
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client.transaction().await.map_err(db_error)?;
        tx.execute(
            r#"
            INSERT INTO tracks (track_id, source, target)
            VALUES ($1, $2, $3)
            ON CONFLICT (track_id) DO NOTHING
            "#,
            &[&track.id, &track.source, &track.target],
        )
        .await
        .map_err(db_error)?;
        let row = tx
            .query_one(
                "SELECT track_id, source, target FROM tracks WHERE track_id = $1",
                &[&track.id],
            )
            .await
            .map_err(db_error)?;
        let stored = map_track_row(&row).map_err(StoreError::Db)?;
        tx.commit().await.map_err(db_error)?;
        Ok(stored)
    }

    async fn get_track(&self, track_id: i64) -> Result<Track, StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        let row = client
            .query_opt(
                r#"
                SELECT track_id, source, target
                  FROM tracks
                 WHERE track_id = $1
                "#,
                &[&track_id],
            )
            .await
            .map_err(db_error)?
            .ok_or_else(|| StoreError::NotFound(format!("track {track_id}")))?;
        map_track_row(&row).map_err(StoreError::Db)
    }

    async fn list_tracks(&self, limit: u32, page: u32) -> Result<(Vec<Track>, u64), StoreError> {
        let (limit, offset) = sql_page(limit, page)?;
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await
            .map_err(db_error)?;

        let rows = tx
            .query(
                r#"
                SELECT track_id, source, target
                  FROM tracks
                 ORDER BY track_id
                 LIMIT $1 OFFSET $2
                "#,
                &[&limit, &offset],
            )
            .await
            .map_err(db_error)?;
        let total = tx
            .query_one("SELECT COUNT(*) AS total FROM tracks", &[])
            .await
            .map_err(db_error)?;
        let total = sql_count(&total)?;
        tx.commit().await.map_err(db_error)?;

        let tracks = rows
            .iter()
            .map(map_track_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Db)?;
        Ok((tracks, total))
    }

    async fn update_track(&self, track: &Track) -> Result<(), StoreError> {
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client.transaction().await.map_err(db_error)?;
        let updated = tx
            .execute(
                r#"
                UPDATE tracks
                   SET source = $2, target = $3
                 WHERE track_id = $1
                "#,
                &[&track.id, &track.source, &track.target],
            )
            .await
            .map_err(db_error)?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("track {}", track.id)));
        }
        tx.commit().await.map_err(db_error)
    }

    async fn delete_track(&self, track_id: i64) -> Result<(), StoreError> {
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client.transaction().await.map_err(db_error)?;
        tx.execute("DELETE FROM tracks WHERE track_id = $1", &[&track_id])
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)
    }

    async fn list_signal_tracks(
        &self,
        signal_id: i64,
        limit: u32,
        page: u32,
    ) -> Result<(Vec<Track>, u64), StoreError> {
        let (limit, offset) = sql_page(limit, page)?;
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await
            .map_err(db_error)?;

        let rows = tx
            .query(
                r#"
                SELECT t.track_id, t.source, t.target
                  FROM tracks t
                 WHERE t.track_id IN (
                       SELECT m.track_id FROM mileages m WHERE m.signal_id = $1
                 )
                 ORDER BY t.track_id
                 LIMIT $2 OFFSET $3
                "#,
                &[&signal_id, &limit, &offset],
            )
            .await
            .map_err(db_error)?;
        let total = tx
            .query_one(
                r#"
                SELECT COUNT(*) AS total
                  FROM tracks t
                 WHERE t.track_id IN (
                       SELECT m.track_id FROM mileages m WHERE m.signal_id = $1
                 )
                "#,
                &[&signal_id],
            )
            .await
            .map_err(db_error)?;
        let total = sql_count(&total)?;
        tx.commit().await.map_err(db_error)?;

        let tracks = rows
            .iter()
            .map(map_track_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Db)?;
        Ok((tracks, total))
    }
}

#[async_trait]
impl MileageStore for PostgresRailwayStore {
    async fn add_mileage(&self, mileage: &Mileage) -> Result<(), StoreError> {
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client.transaction().await.map_err(db_error)?;
        tx.execute(
            r#"
            INSERT INTO mileages (signal_id, track_id, mileage)
            VALUES ($1, $2, $3)
            "#,
            &[&mileage.signal_id, &mileage.track_id, &mileage.mileage],
        )
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)
    }
}

fn map_signal_row(row: &tokio_postgres::Row) -> Result<Signal, String> {
    Ok(Signal {
        id: row.try_get("signal_id").map_err(|e| e.to_string())?,
        name: row.try_get("signal_name").map_err(|e| e.to_string())?,
        elr: row.try_get("elr").map_err(|e| e.to_string())?,
    })
}

fn map_track_row(row: &tokio_postgres::Row) -> Result<Track, String> {
    Ok(Track {
        id: row.try_get("track_id").map_err(|e| e.to_string())?,
        source: row.try_get("source").map_err(|e| e.to_string())?,
        target: row.try_get("target").map_err(|e| e.to_string())?,
    })
}
