//! Builders for the Data API's search filter objects.
//!
//! A search combines a geometry, an acquisition date range, a cloud-cover ceiling and
//! the required assets into a single `AndFilter`:
//!
//! ```json
//! {"type": "AndFilter", "config": [
//!     {"type": "GeometryFilter", "field_name": "geometry", "config": {...}},
//!     {"type": "DateRangeFilter", "field_name": "acquired", "config": {"gte": "...", "lte": "..."}},
//!     {"type": "RangeFilter", "field_name": "cloud_cover", "config": {"lte": 0.25}},
//!     {"type": "AndFilter", "config": [
//!         {"type": "AssetFilter", "config": ["analytic_sr"]},
//!         {"type": "AssetFilter", "config": ["analytic"]}]}
//! ]}
//! ```
use crate::geometry::Geometry;
use crate::item_type::ItemType;
use anyhow::{bail, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

pub const SURFACE_REFLECTANCE_ASSET: &str = "analytic_sr";
pub const ANALYTIC_ASSET: &str = "analytic";

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum Filter {
    GeometryFilter {
        field_name: String,
        config: Geometry,
    },
    DateRangeFilter {
        field_name: String,
        config: Range<String>,
    },
    RangeFilter {
        field_name: String,
        config: Range<f64>,
    },
    AssetFilter {
        config: Vec<String>,
    },
    AndFilter {
        config: Vec<Filter>,
    },
}

/// Inclusive bounds; unset bounds are left out of the JSON.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Range<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<T>,
}

pub fn geometry(aoi: Geometry) -> Filter {
    Filter::GeometryFilter {
        field_name: "geometry".to_string(),
        config: aoi,
    }
}

pub fn date_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Filter {
    Filter::DateRangeFilter {
        field_name: "acquired".to_string(),
        config: Range {
            gte: Some(format_timestamp(start)),
            lte: Some(format_timestamp(end)),
        },
    }
}

/// Scenes with cloud cover at or below `max` (a fraction between 0 and 1).
pub fn cloud_cover(max: f64) -> Filter {
    Filter::RangeFilter {
        field_name: "cloud_cover".to_string(),
        config: Range {
            gte: None,
            lte: Some(max),
        },
    }
}

/// Scenes that carry both assets.
pub fn asset_types(first: &str, second: &str) -> Filter {
    and(vec![
        Filter::AssetFilter {
            config: vec![first.to_string()],
        },
        Filter::AssetFilter {
            config: vec![second.to_string()],
        },
    ])
}

pub fn and(filters: Vec<Filter>) -> Filter {
    Filter::AndFilter { config: filters }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SearchRequest {
    pub item_types: Vec<ItemType>,
    pub filter: Filter,
}

#[derive(Clone, Debug)]
pub struct SearchParams {
    pub item_type: ItemType,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub aoi: Geometry,
    pub cloud_cover: f64,
    /// Only used to name the output file.
    pub search_name: String,
}

impl SearchParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.cloud_cover) {
            bail!(
                "Cloud cover must be a fraction between 0 and 1, got {}",
                self.cloud_cover
            );
        }
        if self.start > self.end {
            bail!(
                "Search start {} is after end {}",
                format_timestamp(self.start),
                format_timestamp(self.end)
            );
        }
        Ok(())
    }

    pub fn filter(&self) -> Filter {
        and(vec![
            geometry(self.aoi.clone()),
            date_range(self.start, self.end),
            cloud_cover(self.cloud_cover),
            asset_types(SURFACE_REFLECTANCE_ASSET, ANALYTIC_ASSET),
        ])
    }

    pub fn request(&self) -> Result<SearchRequest> {
        self.validate()?;
        Ok(SearchRequest {
            item_types: vec![self.item_type],
            filter: self.filter(),
        })
    }
}
