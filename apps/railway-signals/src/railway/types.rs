use serde::{Deserialize, Deserializer, Serialize};

/// Stored in place of an empty ELR; the `signals.elr` column is NOT NULL.
pub const ELR_SENTINEL: &str = "NULL";

/// Decodes an explicit `null` as the type's default. Exported datasets carry
/// `NaN` in text and list positions, which the normalizer turns into `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(rename = "signal_id")]
    pub id: i64,
    #[serde(rename = "signal_name", default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub elr: String,
}

impl Signal {
    /// Replaces an empty or blank ELR with [`ELR_SENTINEL`].
    #[must_use]
    pub fn with_elr_fallback(mut self) -> Self {
        if self.elr.trim().is_empty() {
            self.elr = ELR_SENTINEL.to_string();
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(rename = "track_id")]
    pub id: i64,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mileage {
    pub signal_id: i64,
    pub track_id: i64,
    pub mileage: Option<f64>,
}

/// One signal as embedded in a bulk-load record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMileage {
    pub signal_id: i64,
    #[serde(default)]
    pub signal_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub elr: String,
    #[serde(default)]
    pub mileage: Option<f64>,
}

impl SignalMileage {
    pub fn signal(&self) -> Signal {
        Signal {
            id: self.signal_id,
            name: self.signal_name.clone(),
            elr: self.elr.clone(),
        }
        .with_elr_fallback()
    }

    pub fn mileage_on(&self, track_id: i64) -> Mileage {
        Mileage {
            signal_id: self.signal_id,
            track_id,
            mileage: self.mileage,
        }
    }
}

/// Bulk-load shape: a track with its signals. Never stored as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSignals {
    pub track_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub target: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub signals: Vec<SignalMileage>,
    /// Accepted for compatibility with exported datasets; not persisted.
    #[serde(default)]
    pub mileage: Option<f64>,
}

impl TrackSignals {
    pub fn track(&self) -> Track {
        Track {
            id: self.track_id,
            source: self.source.clone(),
            target: self.target.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub page: u32,
}

impl PageRequest {
    pub fn new(limit: u32, page: u32) -> Self {
        Self { limit, page }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.limit)
    }

    /// `page + 1` whenever the requested offset is still inside the result set.
    pub fn next_page(&self, total: u64) -> Option<u32> {
        if self.offset() < total {
            self.page.checked_add(1)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub next_page: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub tracks: usize,
    pub signals: usize,
    pub mileages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_page_is_present_while_offset_is_inside_total() {
        assert_eq!(PageRequest::new(10, 0).next_page(25), Some(1));
        assert_eq!(PageRequest::new(10, 2).next_page(25), Some(3));
        assert_eq!(PageRequest::new(10, 3).next_page(25), None);
        assert_eq!(PageRequest::new(10, 0).next_page(0), None);
    }

    #[test]
    fn empty_elr_falls_back_to_sentinel() {
        let signal = Signal {
            id: 7,
            name: None,
            elr: "  ".to_string(),
        }
        .with_elr_fallback();
        assert_eq!(signal.elr, ELR_SENTINEL);

        let kept = Signal {
            id: 7,
            name: None,
            elr: "MLN1".to_string(),
        }
        .with_elr_fallback();
        assert_eq!(kept.elr, "MLN1");
    }

    #[test]
    fn track_signals_decode_with_optional_fields_missing() -> Result<(), serde_json::Error> {
        let decoded: Vec<TrackSignals> = serde_json::from_str(
            r#"[{"track_id":3,"source":"A","target":"B","signals":[{"signal_id":9,"mileage":null}]}]"#,
        )?;
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].signals[0].signal().elr, ELR_SENTINEL);
        assert_eq!(decoded[0].signals[0].mileage_on(3).mileage, None);
        Ok(())
    }

    #[test]
    fn explicit_nulls_decode_as_defaults() -> Result<(), serde_json::Error> {
        let decoded: Vec<TrackSignals> = serde_json::from_str(
            r#"[{"track_id":1,"source":null,"target":"B","signals":[{"signal_id":10,"signal_name":"S1","elr":null,"mileage":1.5}]},
                {"track_id":2,"source":"C","target":null,"signals":null}]"#,
        )?;
        assert_eq!(decoded[0].source, "");
        assert_eq!(decoded[0].signals[0].signal().elr, ELR_SENTINEL);
        assert_eq!(decoded[1].target, "");
        assert!(decoded[1].signals.is_empty());

        let signal: Signal =
            serde_json::from_str(r#"{"signal_id":4,"signal_name":null,"elr":null}"#)?;
        assert_eq!(signal.with_elr_fallback().elr, ELR_SENTINEL);
        Ok(())
    }
}
