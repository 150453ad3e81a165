//! Prompt history kept across REPL sessions, one prompt per line.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub struct PromptHistory {
    path: PathBuf,
}

impl PromptHistory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `~/.tiller/prompt_history`, when a home directory exists.
    pub fn default_location() -> Option<Self> {
        tiller_core::utils::prompt_history_path().map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, prompt: &str) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}\n", prompt.trim_end()).as_bytes())
            .await?;
        file.flush().await?;

        debug!(path = %self.path.display(), "Prompt appended to history");
        Ok(())
    }
}
