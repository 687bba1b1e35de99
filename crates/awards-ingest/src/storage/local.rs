//! Directory-tree object source
//!
//! Keys are `/`-separated paths relative to the root, so prefixes behave the
//! same as S3 prefixes (`Part1/awards_1990/awd_1990_00` matches every file
//! whose relative path starts with that string).

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use super::ObjectSource;

#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    fn list_blocking(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(key) = self.key_for(entry.path()) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl ObjectSource for LocalSource {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let source = self.clone();
        let prefix = prefix.to_string();
        let keys = tokio::task::spawn_blocking(move || source.list_blocking(&prefix))
            .await
            .context("Directory listing task failed")??;
        debug!("Listed {} keys under {}", keys.len(), self.root.display());
        Ok(keys)
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.root.join(key);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}
