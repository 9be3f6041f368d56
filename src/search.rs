use crate::client::PlanetClient;
use crate::filter::SearchParams;
use crate::item_type::ItemType;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug)]
struct Page {
    #[serde(default)]
    features: Vec<Value>,
    #[serde(rename = "_links", default)]
    links: Links,
}

#[derive(Deserialize, Debug, Default)]
struct Links {
    #[serde(rename = "_first")]
    first: Option<String>,
    #[serde(rename = "_next")]
    next: Option<String>,
}

/// One row of search output, in the order of `ItemType::columns`.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneRecord {
    pub fields: Vec<String>,
}

impl SceneRecord {
    fn from_feature(feature: &Value, item_type: ItemType) -> Self {
        let fields = item_type
            .columns()
            .iter()
            .map(|&column| {
                let value = if column == "id" {
                    feature.get("id")
                } else {
                    feature.get("properties").and_then(|p| p.get(column))
                };
                cell(value)
            })
            .collect();
        Self { fields }
    }

    pub fn id(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or_default()
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn handle_page(page: &Page, item_type: ItemType, records: &mut Vec<SceneRecord>) {
    for feature in &page.features {
        let record = SceneRecord::from_feature(feature, item_type);
        let acquired = feature
            .pointer("/properties/acquired")
            .and_then(Value::as_str)
            .unwrap_or_default();
        tracing::debug!(id = record.id(), acquired, "Found scene");
        records.push(record);
    }
}

/// Runs a quick search and walks every result page.
pub async fn search(client: &PlanetClient, params: &SearchParams) -> Result<Vec<SceneRecord>> {
    let request = params.request()?;
    let url = client.quick_search_url();

    tracing::info!(item_type = %params.item_type, "Submitting quick search");
    let response: Page = client
        .post_json(&url, &request)
        .await
        .context("Quick search request failed")?;

    let (mut page, mut page_url) = match response.links.first.clone() {
        Some(first) => {
            let page: Page = client
                .get_json(&first)
                .await
                .with_context(|| format!("Unable to fetch search page {}", first))?;
            (page, first)
        }
        None => (response, url),
    };

    let mut records = vec![];
    let mut visited = HashSet::from([page_url.clone()]);
    loop {
        handle_page(&page, params.item_type, &mut records);

        let next = match page.links.next.take() {
            Some(next) if !visited.contains(&next) => next,
            Some(next) => {
                tracing::warn!(from = %page_url, to = %next, "Search pages form a cycle, stopping");
                break;
            }
            None => break,
        };

        page = client
            .get_json(&next)
            .await
            .with_context(|| format!("Unable to fetch search page {}", next))?;
        visited.insert(next.clone());
        page_url = next;
    }

    tracing::info!(
        pages = visited.len(),
        scenes = records.len(),
        "Search complete"
    );
    Ok(records)
}

pub fn csv_file_name(item_type: ItemType, search_name: &str) -> String {
    format!("{}_{}.csv", item_type, search_name)
}

/// Writes `<item_type>_<search_name>.csv` into `dir`, creating it if needed.
pub fn write_csv(
    dir: &Path,
    item_type: ItemType,
    search_name: &str,
    records: &[SceneRecord],
) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Unable to create output directory {}", dir.display()))?;
    let path = dir.join(csv_file_name(item_type, search_name));

    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(item_type.columns())?;
    for record in records {
        writer.write_record(&record.fields)?;
    }
    writer.flush()?;

    tracing::info!(path = %path.display(), rows = records.len(), "Search results saved");
    Ok(path)
}

pub async fn run_search(
    client: &PlanetClient,
    params: &SearchParams,
    dir: &Path,
) -> Result<PathBuf> {
    let records = search(client, params).await?;
    write_csv(dir, params.item_type, &params.search_name, &records)
}
