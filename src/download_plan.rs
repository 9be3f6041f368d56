use crate::client::PlanetClient;
use crate::error::ApiError;
use crate::retry::with_retry;
use anyhow::{anyhow, Context, Result};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tokio::io::AsyncWriteExt;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DownloadTask {
    name: String,
    url: String,
    output: String,
}

impl DownloadTask {
    pub fn new(name: &str, url: &str, output: &str) -> Self {
        DownloadTask {
            name: name.to_string(),
            url: url.to_string(),
            output: output.to_string(),
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct DownloadPlan {
    tasks: Vec<DownloadTask>,
}

impl DownloadPlan {
    pub fn new(tasks: Vec<DownloadTask>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[DownloadTask] {
        &self.tasks
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&content)?;
        Ok(plan)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub async fn execute(&self, client: &PlanetClient, overwrite: bool) -> Result<DownloadSummary> {
        tracing::info!(items = self.tasks.len(), "Items to download");
        let mut summary = DownloadSummary::default();
        for task in self.tasks.iter() {
            if try_download(client, task, overwrite).await? {
                summary.downloaded += 1;
            } else {
                summary.skipped += 1;
            }
        }
        Ok(summary)
    }
}

/// Returns `false` when the output already exists and was left alone.
pub async fn try_download(
    client: &PlanetClient,
    task: &DownloadTask,
    overwrite: bool,
) -> Result<bool> {
    let dst = Path::new(&task.output);
    if dst.exists() && !overwrite {
        tracing::info!(name = %task.name, path = %dst.display(), "Already exists, skipping");
        return Ok(false);
    }

    // Make parent directories as necessary
    let parent_dir = dst
        .parent()
        .ok_or(anyhow!("Output path has no parent: {}", task.output))?;
    if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
        fs::create_dir_all(parent_dir)?;
    }

    tracing::info!(name = %task.name, path = %dst.display(), "Downloading");
    // Stream into a .partial file so an interrupted download never looks complete
    let partial = format!("{}.partial", task.output);
    let (url, partial_path) = (task.url.as_str(), partial.as_str());
    let fetched = with_retry(client.retry_policy(), move || {
        fetch_to_file(client, url, partial_path)
    })
    .await;
    let byte_count = match fetched {
        Ok(count) => count,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e).with_context(|| format!("Unable to download {}", task.name));
        }
    };

    tokio::fs::rename(&partial, dst).await?;
    tracing::debug!(name = %task.name, bytes = byte_count, "Download complete");

    Ok(true)
}

/// One attempt: request `url` and write the whole body to `path`, truncating it first.
async fn fetch_to_file(client: &PlanetClient, url: &str, path: &str) -> Result<u64, ApiError> {
    let response = client.download(url).await?;
    let mut file = tokio::fs::File::create(path).await?;
    let mut byte_count = 0_u64;
    let mut body = response.bytes_stream();
    while let Some(bytes) = body.next().await {
        let bytes = bytes?;
        file.write_all(&bytes).await?;
        byte_count += bytes.len() as u64;
    }
    file.flush().await?;
    Ok(byte_count)
}
