use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Most recent distinct queries kept
pub const MAX_HISTORY: usize = 8;

/// Recent search queries, most recent first, persisted as JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchHistory {
    entries: Vec<String>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl SearchHistory {
    /// In-memory history that is never written to disk
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let mut history = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let mut history: SearchHistory = serde_json::from_str(&content)?;
            history.normalize();
            history
        } else {
            Self::default()
        };

        history.path = Some(path);
        Ok(history)
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a query at the front, moving it there if already present.
    /// Blank queries are ignored.
    pub fn insert(&mut self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            return;
        }
        self.entries.retain(|q| q != query);
        self.entries.insert(0, query.to_string());
        self.entries.truncate(MAX_HISTORY);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop blanks and duplicates from a hand-edited file
    fn normalize(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        for query in entries.iter().rev() {
            self.insert(query);
        }
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("coki").join("search_history.json"))
    }
}
