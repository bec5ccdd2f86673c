pub mod loader;
pub mod normalize;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

pub use loader::{LoadError, LoadStep};
pub use normalize::{NormalizeError, normalize_json};
pub use service::{RailwayError, RailwayService};
pub use store::{MileageStore, RailwayStores, SignalStore, StoreError, TrackStore};
