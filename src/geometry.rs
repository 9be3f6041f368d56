//! GeoJSON areas of interest used for search filters and clip orders.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Roughly 30 meters at the equator.
pub const DEFAULT_SQUARE_SIZE: f64 = 0.0004;

pub type Position = Vec<f64>;
pub type Ring = Vec<Position>;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
}

impl Geometry {
    /// Drops interior rings, keeping only the outline of each polygon.
    fn outer_rings_only(self) -> Self {
        match self {
            Self::Polygon { mut coordinates } => {
                coordinates.truncate(1);
                Self::Polygon { coordinates }
            }
            Self::MultiPolygon { coordinates } => Self::MultiPolygon {
                coordinates: coordinates
                    .into_iter()
                    .map(|mut polygon| {
                        polygon.truncate(1);
                        polygon
                    })
                    .collect(),
            },
        }
    }
}

#[derive(Deserialize, Debug)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize, Debug)]
struct Feature {
    geometry: Option<Value>,
}

/// A square polygon whose upper-left corner is the given point.
pub fn point_square(lat: f64, lon: f64, size: f64) -> Geometry {
    Geometry::Polygon {
        coordinates: vec![vec![
            vec![lon, lat],
            vec![lon + size, lat],
            vec![lon + size, lat - size],
            vec![lon, lat - size],
            vec![lon, lat],
        ]],
    }
}

fn read_features<P: AsRef<Path>>(path: P) -> Result<Vec<Feature>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Unable to read GeoJSON file {}", path.display()))?;
    let collection: FeatureCollection = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a GeoJSON FeatureCollection", path.display()))?;
    Ok(collection.features)
}

pub fn feature_count<P: AsRef<Path>>(path: P) -> Result<usize> {
    Ok(read_features(path)?.len())
}

/// Geometry of the feature at `index` (zero based) in a FeatureCollection file.
pub fn feature_geometry<P: AsRef<Path>>(path: P, index: usize) -> Result<Geometry> {
    let features = read_features(path)?;
    let count = features.len();
    let feature = features
        .into_iter()
        .nth(index)
        .ok_or(anyhow!("Feature index {} out of range ({} features)", index, count))?;

    let value = feature
        .geometry
        .ok_or(anyhow!("Feature {} has no geometry", index))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_owned();
    let geometry: Geometry = serde_json::from_value(value).map_err(|e| {
        anyhow!(
            "Feature {} has unsupported geometry '{}' (expected Polygon or MultiPolygon): {}",
            index,
            kind,
            e
        )
    })?;

    Ok(geometry.outer_rings_only())
}
