use crate::item_type::ItemType;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// The scenes to clip for one area of interest.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ImageSelection {
    pub feature_name: String,
    pub item_type: ItemType,
    ids_to_download: Vec<String>,
}

impl ImageSelection {
    pub fn new(feature_name: &str, item_type: ItemType, ids: Vec<String>) -> Self {
        Self {
            feature_name: feature_name.to_string(),
            item_type,
            ids_to_download: ids,
        }
    }

    /// The same scenes, ordered under another name.
    pub fn renamed(&self, feature_name: &str) -> Self {
        Self {
            feature_name: feature_name.to_string(),
            ..self.clone()
        }
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let selection: Self = toml::from_str(&content)?;
        Ok(selection)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Selects every scene listed in a CSV written by a search.
    pub fn from_search_csv<P: AsRef<Path>>(
        path: P,
        feature_name: &str,
        item_type: ItemType,
    ) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let id_column = reader
            .headers()?
            .iter()
            .position(|h| h == "id")
            .ok_or(anyhow!(
                "No 'id' column in {}",
                path.as_ref().display()
            ))?;

        let mut ids = vec![];
        for row in reader.records() {
            let row = row?;
            if let Some(id) = row.get(id_column).filter(|id| !id.is_empty()) {
                ids.push(id.to_string());
            }
        }
        Ok(Self::new(feature_name, item_type, ids))
    }

    /// Non-blank ids without duplicates, in first-seen order. `None` when nothing is left.
    pub fn ids_to_download(&self) -> Option<Vec<String>> {
        let mut seen = HashSet::new();
        let ids = self
            .ids_to_download
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && seen.insert(*id))
            .map(str::to_string)
            .collect::<Vec<_>>();
        if ids.is_empty() {
            return None;
        }
        Some(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection() -> ImageSelection {
        ImageSelection::new(
            "Reservoir_775",
            ItemType::PSOrthoTile,
            vec![
                "2242619_5548711_2019-07-01_0f28".to_string(),
                "2242619_5548711_2019-07-09_1054".to_string(),
                "2242619_5548711_2019-07-01_0f28".to_string(),
            ],
        )
    }

    #[test]
    fn test_ids_are_deduplicated_in_order() {
        assert_eq!(
            selection().ids_to_download().unwrap(),
            vec![
                "2242619_5548711_2019-07-01_0f28".to_string(),
                "2242619_5548711_2019-07-09_1054".to_string(),
            ]
        );
    }

    #[test]
    fn test_renamed_keeps_ids() {
        let renamed = selection().renamed("Reservoir_776");
        assert_eq!(renamed.feature_name, "Reservoir_776");
        assert_eq!(renamed.ids_to_download(), selection().ids_to_download());
    }

    #[test]
    fn test_empty_selection() {
        let selection = ImageSelection::new("empty", ItemType::PSScene4Band, vec![]);
        assert_eq!(selection.ids_to_download(), None);
    }

    #[test]
    fn test_blank_ids_are_dropped() {
        // what `--ids ",a1,, a1 ,"` parses into
        let ids = ["", "a1", "", " a1 ", ""].map(String::from).to_vec();
        let selection = ImageSelection::new("lake", ItemType::PSScene4Band, ids);
        assert_eq!(selection.ids_to_download().unwrap(), vec!["a1".to_string()]);

        let blank = ImageSelection::new("lake", ItemType::PSScene4Band, vec![String::new()]);
        assert_eq!(blank.ids_to_download(), None);
    }

    #[test]
    fn test_write_and_read_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selection.toml");
        selection().write(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("item_type = \"PSOrthoTile\""));

        let read = ImageSelection::read(&path).unwrap();
        assert_eq!(read, selection());
    }

    #[test]
    fn test_from_search_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PSOrthoTile_reg_search.csv");
        fs::write(
            &path,
            "id,acquired,cloud_cover\n\
             a1,2019-07-01T00:00:00Z,0\n\
             ,2019-07-02T00:00:00Z,0\n\
             b2,2019-07-03T00:00:00Z,0.1\n",
        )
        .unwrap();

        let selection =
            ImageSelection::from_search_csv(&path, "lake", ItemType::PSOrthoTile).unwrap();
        assert_eq!(selection.feature_name, "lake");
        assert_eq!(
            selection.ids_to_download().unwrap(),
            vec!["a1".to_string(), "b2".to_string()]
        );
    }

    #[test]
    fn test_csv_without_id_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "scene,acquired\na1,2019\n").unwrap();
        assert!(ImageSelection::from_search_csv(&path, "x", ItemType::PSScene4Band).is_err());
    }
}
