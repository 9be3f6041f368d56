//! Clipping one selection of scenes against one or more areas of interest.
use crate::client::PlanetClient;
use crate::download_plan::DownloadSummary;
use crate::geometry::{self, Geometry};
use crate::image_selection::ImageSelection;
use crate::order;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Where the area of interest comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum AoiSource {
    /// A feature of a GeoJSON FeatureCollection file, by zero based index.
    GeoJson { path: PathBuf, feature_index: usize },
    /// A square with its upper-left corner at `lat`, `lon`.
    Square { lat: f64, lon: f64, size: f64 },
}

impl AoiSource {
    pub fn geometry(&self) -> Result<Geometry> {
        match self {
            Self::GeoJson {
                path,
                feature_index,
            } => geometry::feature_geometry(path, *feature_index),
            Self::Square { lat, lon, size } => Ok(geometry::point_square(*lat, *lon, *size)),
        }
    }

    fn geometry_at(&self, index: usize) -> Result<Geometry> {
        match self {
            Self::GeoJson { path, .. } => geometry::feature_geometry(path, index),
            Self::Square { .. } => self.geometry(),
        }
    }

    /// Feature names and the feature index each one is clipped to.
    ///
    /// With `all_features` every feature of a GeoJSON file becomes `<feature_name>_<index>`;
    /// otherwise there is a single target named `feature_name`.
    pub fn targets(&self, feature_name: &str, all_features: bool) -> Result<Vec<(String, usize)>> {
        match self {
            Self::GeoJson { path, .. } if all_features => Ok((0..geometry::feature_count(path)?)
                .map(|index| (format!("{}_{}", feature_name, index), index))
                .collect()),
            Self::GeoJson { feature_index, .. } => {
                Ok(vec![(feature_name.to_string(), *feature_index)])
            }
            Self::Square { .. } if all_features => {
                bail!("--all-features needs a GeoJSON area of interest")
            }
            Self::Square { .. } => Ok(vec![(feature_name.to_string(), 0)]),
        }
    }
}

/// Orders and downloads one clip per target.
///
/// A failing target is written to `dir/errors/` and the next one is tried. The totals of the
/// successful clips are returned only when every target succeeded.
pub async fn clip_all(
    client: &PlanetClient,
    selection: &ImageSelection,
    aoi: &AoiSource,
    all_features: bool,
    dir: &Path,
    overwrite: bool,
) -> Result<DownloadSummary> {
    let targets = aoi.targets(&selection.feature_name, all_features)?;
    let total = targets.len();
    let mut failures = 0;
    let mut totals = DownloadSummary::default();

    for (feature_name, index) in targets {
        let selection = selection.renamed(&feature_name);
        let result = match aoi.geometry_at(index) {
            Ok(geometry) => {
                order::download_clip(client, &selection, &geometry, dir, overwrite).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(summary) => {
                tracing::info!(
                    feature = %feature_name,
                    downloaded = summary.downloaded,
                    skipped = summary.skipped,
                    "Clip finished"
                );
                totals.downloaded += summary.downloaded;
                totals.skipped += summary.skipped;
            }
            Err(e) => {
                let e = e.context(format!("An error occurred for {}", feature_name));
                order::record_failure(dir, &feature_name, &e)?;
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!(
            "{} of {} clips failed; see {}",
            failures,
            total,
            dir.join("errors").display()
        );
    }
    Ok(totals)
}
