//! Clip orders: submit, poll until processed, then download the results.
use crate::client::PlanetClient;
use crate::config::PollConfig;
use crate::download_plan::{DownloadPlan, DownloadSummary, DownloadTask};
use crate::error::ApiError;
use crate::geometry::Geometry;
use crate::image_selection::ImageSelection;
use crate::item_type::ItemType;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Surface reflectance, falling back to analytic when a scene has no `analytic_sr`.
pub const PRODUCT_BUNDLE: &str = "analytic_sr,analytic";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub name: String,
    pub products: Vec<OrderProduct>,
    pub tools: Vec<Tool>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OrderProduct {
    pub item_ids: Vec<String>,
    pub item_type: ItemType,
    pub product_bundle: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum Tool {
    #[serde(rename = "clip")]
    Clip { aoi: Geometry },
}

impl OrderRequest {
    pub fn clip(name: &str, item_type: ItemType, item_ids: Vec<String>, aoi: Geometry) -> Result<Self> {
        if item_ids.is_empty() {
            bail!("Order '{}' has no item ids", name);
        }
        Ok(Self {
            name: name.to_string(),
            products: vec![OrderProduct {
                item_ids,
                item_type,
                product_bundle: PRODUCT_BUNDLE.to_string(),
            }],
            tools: vec![Tool::Clip { aoi }],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Queued,
    Running,
    Success,
    Partial,
    Failed,
    Cancelled,
    Unknown,
}

impl OrderState {
    fn parse(state: &str) -> Self {
        match state {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "success" => Self::Success,
            "partial" => Self::Partial,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::Partial)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        f.write_str(state)
    }
}

#[derive(Deserialize, Debug)]
struct OrderCreated {
    id: String,
}

#[derive(Deserialize, Debug)]
struct OrderResult {
    location: String,
    name: String,
}

/// Submits the order and returns the URL to poll.
///
/// Only rate limiting is retried; any other failure may have created the order already.
pub async fn place_order(client: &PlanetClient, request: &OrderRequest) -> Result<String> {
    let created: OrderCreated = client
        .submit_json(client.orders_url(), request)
        .await
        .with_context(|| format!("Order '{}' was rejected", request.name))?;

    let order_url = client.order_url(&created.id);
    tracing::info!(order_id = %created.id, name = %request.name, "Order placed");
    Ok(order_url)
}

/// Polls the order until it succeeds, fails, or the poll budget runs out.
pub async fn wait_for_order(
    client: &PlanetClient,
    order_url: &str,
    poll: &PollConfig,
) -> Result<OrderState> {
    let max_polls = poll.max_polls.max(1);

    for count in 1..=max_polls {
        let status: Value = client.get_json(order_url).await?;
        let raw_state = status
            .get("state")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let state = OrderState::parse(raw_state);
        tracing::info!(state = %raw_state, poll = count, max_polls, "Order status");

        if state.is_success() {
            return Ok(state);
        }
        if state.is_failure() {
            return Err(ApiError::OrderFailed {
                order_url: order_url.to_string(),
                state: raw_state.to_string(),
                body: status.to_string(),
            }
            .into());
        }
        if count < max_polls {
            tokio::time::sleep(poll.interval).await;
        }
    }

    Err(ApiError::PollTimeout {
        order_url: order_url.to_string(),
        polls: max_polls,
    }
    .into())
}

/// Downloads every result of a finished order into `dir/feature_name/`.
pub async fn download_order(
    client: &PlanetClient,
    order_url: &str,
    dir: &Path,
    feature_name: &str,
    overwrite: bool,
) -> Result<DownloadSummary> {
    let status: Value = client.get_json(order_url).await?;
    let results = status
        .pointer("/_links/results")
        .filter(|results| results.is_array())
        .cloned()
        .ok_or(ApiError::MissingLink {
            url: order_url.to_string(),
            link: "results",
        })?;
    let results: Vec<OrderResult> = serde_json::from_value(results)
        .with_context(|| format!("Malformed results in order {}", order_url))?;

    let feature_dir = dir.join(feature_name);
    let tasks = results
        .iter()
        .map(|result| -> Result<DownloadTask> {
            let file_name = Path::new(&result.name)
                .file_name()
                .ok_or(anyhow!("Result has no file name: {}", result.name))?;
            let output = feature_dir.join(file_name);
            let output = output
                .to_str()
                .ok_or(anyhow!("Non UTF-8 output path: {}", output.display()))?;
            Ok(DownloadTask::new(&result.name, &result.location, output))
        })
        .collect::<Result<Vec<_>>>()?;
    tracing::info!(order = order_url, items = tasks.len(), "Order results ready");

    fs::create_dir_all(&feature_dir)?;
    let plan = DownloadPlan::new(tasks);
    plan.write(feature_dir.join("download_plan.json"))?;

    plan.execute(client, overwrite).await
}

/// Clips the selected scenes to `aoi` and downloads the result.
pub async fn download_clip(
    client: &PlanetClient,
    selection: &ImageSelection,
    aoi: &Geometry,
    dir: &Path,
    overwrite: bool,
) -> Result<DownloadSummary> {
    let ids = selection
        .ids_to_download()
        .ok_or(anyhow!("No ids to download for '{}'", selection.feature_name))?;
    let request = OrderRequest::clip(&selection.feature_name, selection.item_type, ids, aoi.clone())?;

    let order_url = place_order(client, &request).await?;
    wait_for_order(client, &order_url, client.poll_config()).await?;
    download_order(client, &order_url, dir, &selection.feature_name, overwrite).await
}

/// Saves the error to `dir/errors/<feature_name>_error_message.txt`.
pub fn record_failure(dir: &Path, feature_name: &str, error: &anyhow::Error) -> Result<PathBuf> {
    tracing::error!(feature = feature_name, error = %format!("{:#}", error), "Clip failed");

    let errors_dir = dir.join("errors");
    fs::create_dir_all(&errors_dir)?;
    let path = errors_dir.join(format!("{}_error_message.txt", feature_name));
    fs::write(&path, format!("{:#}", error))?;
    Ok(path)
}
