//! Newline-delimited JSON export of the mapping table.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{JobFilter, MappingSource};
use crate::errors::MappingError;
use crate::model::MappingRecord;

/// One JSON object per line. Blank lines are skipped.
#[derive(Debug, Clone)]
pub struct NdjsonMappings {
    path: PathBuf,
}

impl NdjsonMappings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn parse(content: &str) -> Result<Vec<MappingRecord>, MappingError> {
        let mut records = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: MappingRecord =
                serde_json::from_str(line).map_err(|e| MappingError::Malformed {
                    line: idx + 1,
                    message: e.to_string(),
                })?;
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait]
impl MappingSource for NdjsonMappings {
    async fn scan(&self, filter: &JobFilter) -> Result<Vec<MappingRecord>, MappingError> {
        let content =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| MappingError::Open {
                    path: self.path.display().to_string(),
                    message: e.to_string(),
                })?;
        let records = Self::parse(&content)?;
        Ok(records.into_iter().filter(|r| filter.matches(r)).collect())
    }
}
