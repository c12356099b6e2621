//! Per-judging working directory
//!
//! Each judging (or authoring dry run) gets its own directory holding the
//! source file and compiled binary. The directory is removed when the
//! `Workspace` is dropped, on every exit path.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::JudgeResult;
use crate::languages::LanguageConfig;

#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh directory, under `root` if given, else the system temp dir
    pub fn create(root: Option<&Path>, label: &str) -> JudgeResult<Self> {
        let prefix = format!("judge-{}-", label);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `code` to the language's source file and return its path
    pub async fn write_source(&self, language: &LanguageConfig, code: &str) -> JudgeResult<PathBuf> {
        let path = language.source_path(self.path());
        tokio::fs::write(&path, code).await?;
        Ok(path)
    }
}
