use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemType {
    PSScene4Band,
    PSOrthoTile,
    REOrthoTile,
}

const SCENE_COLUMNS: &[&str] = &[
    "id",
    "acquired",
    "cloud_cover",
    "origin_x",
    "origin_y",
    "view_angle",
    "sun_azimuth",
    "sun_elevation",
    "anomalous_pixels",
];

const ORTHO_TILE_COLUMNS: &[&str] = &[
    "id",
    "acquired",
    "cloud_cover",
    "origin_x",
    "origin_y",
    "view_angle",
    "sun_azimuth",
    "sun_elevation",
    "anomalous_pixels",
    "usable_data",
];

impl ItemType {
    pub fn key(&self) -> &'static str {
        match self {
            Self::PSScene4Band => "PSScene4Band",
            Self::PSOrthoTile => "PSOrthoTile",
            Self::REOrthoTile => "REOrthoTile",
        }
    }

    /// Metadata recorded for each scene of this type. `id` is always first.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::PSScene4Band => SCENE_COLUMNS,
            Self::PSOrthoTile | Self::REOrthoTile => ORTHO_TILE_COLUMNS,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ItemType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PSScene4Band" => Ok(Self::PSScene4Band),
            "PSOrthoTile" => Ok(Self::PSOrthoTile),
            "REOrthoTile" => Ok(Self::REOrthoTile),
            other => Err(anyhow!(
                "Unknown item type '{}'; expected PSScene4Band, PSOrthoTile or REOrthoTile",
                other
            )),
        }
    }
}
