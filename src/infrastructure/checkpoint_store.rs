//! File-backed checkpoint store
//!
//! A checkpoint is one JSON document (run state plus all results). When an
//! output table is configured it is rewritten on every persist, after the
//! checkpoint, so the table never gets ahead of what a resume would see.
//! Both files are replaced via temp-file + rename.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::application::checkpoint_manager::{Checkpoint, ProgressStore};
use crate::domain::{CheckpointError, ModelRecord};
use crate::infrastructure::tabular::{TabularRecord, write_atomic, write_table};

pub struct FileProgressStore<R> {
    checkpoint_path: PathBuf,
    output_path: Option<PathBuf>,
    _record: PhantomData<fn() -> R>,
}

impl<R> FileProgressStore<R> {
    pub fn new(checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            output_path: None,
            _record: PhantomData,
        }
    }

    /// Also rewrite this table on every persist.
    #[must_use]
    pub fn with_output(mut self, output_path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(output_path.into());
        self
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Default checkpoint location next to an output file.
    pub fn default_checkpoint_for(output: &Path) -> PathBuf {
        let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("harvest");
        output.with_file_name(format!("{stem}.checkpoint.json"))
    }
}

#[async_trait]
impl<R> ProgressStore<R> for FileProgressStore<R>
where
    R: ModelRecord + TabularRecord + Send + Sync,
{
    async fn load(&self) -> Result<Option<Checkpoint<R>>, CheckpointError> {
        let content = match fs::read_to_string(&self.checkpoint_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: self.checkpoint_path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| CheckpointError::Corrupt {
                path: self.checkpoint_path.clone(),
                reason: e.to_string(),
            })
    }

    async fn persist(&self, checkpoint: &Checkpoint<R>) -> Result<(), CheckpointError> {
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        write_atomic(&self.checkpoint_path, &bytes)
            .await
            .map_err(|source| CheckpointError::Write {
                path: self.checkpoint_path.clone(),
                source,
            })?;
        debug!("Checkpoint written to {:?}", self.checkpoint_path);

        if let Some(output) = &self.output_path {
            write_table(output, &checkpoint.results)
                .await
                .map_err(|source| CheckpointError::Write {
                    path: output.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}
