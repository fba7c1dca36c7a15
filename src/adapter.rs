//! Writes discovery snapshots to a Prometheus `file_sd` JSON file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::discovery::Snapshot;
use crate::health::HealthServer;
use crate::labels::{LabelSet, TargetGroup};

pub const SD_NAME: &str = "elasticache_sd";

/// One entry of a `file_sd` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSdGroup {
    pub targets: Vec<String>,
    pub labels: LabelSet,
}

/// Converts a snapshot into `file_sd` groups keyed by `<sd name>:<source>:<index>`.
pub fn file_sd_groups(snapshot: &[TargetGroup]) -> BTreeMap<String, FileSdGroup> {
    snapshot
        .iter()
        .enumerate()
        .map(|(i, group)| {
            let mut targets: Vec<String> = group
                .targets
                .iter()
                .flat_map(|target| target.values().cloned())
                .collect();
            targets.sort();

            let key = format!("{}:{}:{}", SD_NAME, group.source, i);
            (
                key,
                FileSdGroup {
                    targets,
                    labels: group.labels.clone(),
                },
            )
        })
        .collect()
}

pub struct FileSdAdapter {
    output: PathBuf,
    written: Option<BTreeMap<String, FileSdGroup>>,
    health: HealthServer,
}

impl FileSdAdapter {
    pub fn new(output: impl Into<PathBuf>, health: HealthServer) -> Self {
        Self {
            output: output.into(),
            written: None,
            health,
        }
    }

    /// Consumes snapshots until the channel closes or `cancel` fires.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Snapshot>, cancel: CancellationToken) {
        info!(output_file = %self.output.display(), "Starting file_sd writer");

        loop {
            let snapshot = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(snapshot) => snapshot,
                    None => break,
                },
            };

            if let Err(e) = self.apply(&snapshot) {
                error!(
                    output_file = %self.output.display(),
                    error = %e,
                    "Failed to write file_sd output"
                );
            }
        }

        info!("file_sd writer stopped");
    }

    /// Writes `snapshot` if it differs from the last written one.
    ///
    /// Returns whether the file was rewritten. A failed write is retried
    /// on the next snapshot.
    pub fn apply(&mut self, snapshot: &[TargetGroup]) -> Result<bool> {
        let groups = file_sd_groups(snapshot);

        if self.written.as_ref() == Some(&groups) {
            debug!(
                target_groups = groups.len(),
                "Snapshot unchanged, skipping file_sd write"
            );
            return Ok(false);
        }

        self.write_output(&groups)?;

        info!(
            output_file = %self.output.display(),
            target_groups = groups.len(),
            "Wrote file_sd output"
        );

        self.written = Some(groups);
        self.health.set_ready(true);
        Ok(true)
    }

    fn write_output(&self, groups: &BTreeMap<String, FileSdGroup>) -> Result<()> {
        let entries: Vec<&FileSdGroup> = groups.values().collect();
        let body =
            serde_json::to_vec_pretty(&entries).context("Failed to serialize file_sd groups")?;

        let dir = match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix("sd-adapter")
            .tempfile_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

        tmp.write_all(&body)
            .context("Failed to write temporary file_sd output")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to flush temporary file_sd output")?;

        tmp.persist(&self.output)
            .with_context(|| format!("Failed to replace {}", self.output.display()))?;

        Ok(())
    }
}
