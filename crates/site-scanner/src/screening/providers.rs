use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{DwellingType, Parcel, TriState};
use super::layers::{Layer, LayerObservation, SEWER_CONNECTED_ATTRIBUTE};
use super::market::{Comparable, DateRange};

/// Failure talking to an external data source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("lookup timed out after {0} ms")]
    Timeout(u64),
    #[error("rate limited by provider: {0}")]
    RateLimited(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("malformed provider response: {0}")]
    Malformed(String),
    #[error("{operation} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: String,
    },
}

/// Spatial layer queries against the parcel geometry.
#[async_trait]
pub trait SpatialAttributeProvider: Send + Sync {
    async fn query(&self, parcel: &Parcel, layer: Layer) -> Result<LayerObservation, LookupError>;
}

/// Read-only source of recorded sales.
#[async_trait]
pub trait ComparableStore: Send + Sync {
    async fn find(
        &self,
        suburb: &str,
        dwelling_type: DwellingType,
        range: DateRange,
    ) -> Result<Vec<Comparable>, LookupError>;
}

/// Sewer connection reading with the provider's confidence in it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SewerReading {
    pub connected: TriState,
    pub confidence: f64,
}

impl SewerReading {
    /// Readings below `floor` confidence are treated as unknown.
    pub fn status(&self, floor: f64) -> TriState {
        if self.confidence < floor {
            TriState::Unknown
        } else {
            self.connected
        }
    }
}

#[async_trait]
pub trait SewerConnectivityProvider: Send + Sync {
    async fn is_connected(&self, parcel: &Parcel) -> Result<SewerReading, LookupError>;
}

/// Infers sewer availability from mains near the parcel on the sewer network layer.
/// A main within reach is good evidence; its absence within a bounded search is weak.
pub struct NetworkProximitySewerProvider<S: ?Sized> {
    spatial: Arc<S>,
    search_radius_m: f64,
}

impl<S: ?Sized> NetworkProximitySewerProvider<S> {
    pub const NEARBY_CONFIDENCE: f64 = 0.9;
    pub const ABSENT_CONFIDENCE: f64 = 0.7;

    pub fn new(spatial: Arc<S>, search_radius_m: f64) -> Self {
        Self {
            spatial,
            search_radius_m,
        }
    }
}

#[async_trait]
impl<S> SewerConnectivityProvider for NetworkProximitySewerProvider<S>
where
    S: SpatialAttributeProvider + ?Sized,
{
    async fn is_connected(&self, parcel: &Parcel) -> Result<SewerReading, LookupError> {
        let observation = self.spatial.query(parcel, Layer::SewerNetwork).await?;

        if let Some(flag) = observation.attribute(SEWER_CONNECTED_ATTRIBUTE) {
            let connected = match flag.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => TriState::Yes,
                "false" | "no" | "0" => TriState::No,
                _ => TriState::Unknown,
            };
            return Ok(SewerReading {
                connected,
                confidence: 1.0,
            });
        }

        let nearby = observation.intersects
            || observation
                .nearest_distance_m
                .is_some_and(|distance| distance <= self.search_radius_m);
        Ok(if nearby {
            SewerReading {
                connected: TriState::Yes,
                confidence: Self::NEARBY_CONFIDENCE,
            }
        } else {
            SewerReading {
                connected: TriState::No,
                confidence: Self::ABSENT_CONFIDENCE,
            }
        })
    }
}
