//! Static geographic reference layers and the placement conditions linking
//! them to cable subsections.
//!
//! Layers describe the surroundings a cable is laid in: roads and rails it
//! runs along or under, water bodies, soil classes, and gridded weather
//! statistics. Like external events, a placement condition references its
//! layer through a discriminated `(kind, id)` pair.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::spatial::{Geometry, GeometryKind, SpatialAttribute, Srid};
use crate::{LayerId, PlacementConditionId, SubsectionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Road,
    Rail,
    WaterBody,
    SoilType,
    LocationWeather,
}

impl LayerKind {
    pub const ALL: [LayerKind; 5] = [
        LayerKind::Road,
        LayerKind::Rail,
        LayerKind::WaterBody,
        LayerKind::SoilType,
        LayerKind::LocationWeather,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Road => "road",
            LayerKind::Rail => "rail",
            LayerKind::WaterBody => "water_body",
            LayerKind::SoilType => "soil_type",
            LayerKind::LocationWeather => "location_weather",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            LayerKind::Road => "roads",
            LayerKind::Rail => "rails",
            LayerKind::WaterBody => "water_bodies",
            LayerKind::SoilType => "soil_type",
            LayerKind::LocationWeather => "location_weather",
        }
    }

    /// Declared geometry column for layers of this kind.
    pub fn geometry(&self) -> SpatialAttribute {
        match self {
            LayerKind::Road => {
                SpatialAttribute::new("road", GeometryKind::LineString, Some(Srid::WGS84))
            }
            LayerKind::Rail => {
                SpatialAttribute::new("rail", GeometryKind::LineString, Some(Srid::WGS84))
            }
            LayerKind::WaterBody => {
                SpatialAttribute::new("water body", GeometryKind::MultiPolygon, Some(Srid::WGS84))
            }
            LayerKind::SoilType => {
                SpatialAttribute::new("soil type", GeometryKind::MultiPolygon, Some(Srid::WGS84))
            }
            LayerKind::LocationWeather => SpatialAttribute::new(
                "location weather",
                GeometryKind::MultiPolygon,
                Some(Srid::WGS84),
            ),
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LayerKind {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LayerKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| GridError::Parse(format!("unknown layer kind '{}'", s)))
    }
}

/// Discriminated reference to a static layer feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerRef {
    pub kind: LayerKind,
    pub id: LayerId,
}

impl LayerRef {
    pub fn new(kind: LayerKind, id: LayerId) -> Self {
        Self { kind, id }
    }
}

impl std::fmt::Display for LayerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Aggregated weather statistics over one grid cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherStatistics {
    #[serde(default)]
    pub average_temperature: Option<f64>,
    #[serde(default)]
    pub max_temperature: Option<f64>,
    #[serde(default)]
    pub min_temperature: Option<f64>,
    #[serde(default)]
    pub average_wind_speed: Option<f64>,
    #[serde(default)]
    pub max_wind_speed: Option<f64>,
    #[serde(default)]
    pub average_humidity: Option<f64>,
    #[serde(default)]
    pub max_humidity: Option<f64>,
    #[serde(default)]
    pub average_precipitation: Option<f64>,
    #[serde(default)]
    pub max_precipitation: Option<f64>,
    #[serde(default)]
    pub calculated_from: Option<NaiveDate>,
    #[serde(default)]
    pub calculated_to: Option<NaiveDate>,
}

/// Variant-specific layer attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerAttributes {
    Road {
        #[serde(default)]
        road_type: Option<String>,
    },
    Rail {
        #[serde(default)]
        rail_type: Option<String>,
    },
    WaterBody {
        #[serde(default)]
        water_body_type: Option<String>,
    },
    SoilType {
        #[serde(default)]
        soil_type: Option<String>,
    },
    LocationWeather(WeatherStatistics),
}

impl LayerAttributes {
    pub fn kind(&self) -> LayerKind {
        match self {
            LayerAttributes::Road { .. } => LayerKind::Road,
            LayerAttributes::Rail { .. } => LayerKind::Rail,
            LayerAttributes::WaterBody { .. } => LayerKind::WaterBody,
            LayerAttributes::SoilType { .. } => LayerKind::SoilType,
            LayerAttributes::LocationWeather(_) => LayerKind::LocationWeather,
        }
    }
}

/// One feature of a static reference layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLayer {
    pub id: LayerId,
    #[serde(flatten)]
    pub attributes: LayerAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

impl GeoLayer {
    pub fn new(id: LayerId, attributes: LayerAttributes) -> Self {
        Self {
            id,
            attributes,
            geometry: None,
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn kind(&self) -> LayerKind {
        self.attributes.kind()
    }

    pub fn layer_ref(&self) -> LayerRef {
        LayerRef::new(self.kind(), self.id)
    }

    pub(crate) fn conform_geometry(&mut self) -> GridResult<()> {
        let declared = self.kind().geometry();
        match self.geometry.as_mut() {
            Some(geometry) => declared.conform(geometry),
            None => Ok(()),
        }
    }
}

/// "This subsection is laid in the surroundings described by this layer feature."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlacementCondition {
    pub id: PlacementConditionId,
    pub subsection: SubsectionId,
    pub layer: LayerRef,
}

impl PlacementCondition {
    pub fn new(id: PlacementConditionId, subsection: SubsectionId, layer: LayerRef) -> Self {
        Self {
            id,
            subsection,
            layer,
        }
    }
}
