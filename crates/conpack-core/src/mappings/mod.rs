//! Read-only access to the upstream control→rule mapping store.

mod ndjson;
mod sqlite;

use async_trait::async_trait;

use crate::errors::MappingError;
use crate::model::MappingRecord;

pub use ndjson::NdjsonMappings;
pub use sqlite::SqliteMappings;

/// Which mapping records to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFilter {
    All,
    Job(String),
}

impl JobFilter {
    pub fn matches(&self, record: &MappingRecord) -> bool {
        match self {
            Self::All => true,
            Self::Job(id) => record.job_id == *id,
        }
    }
}

/// A readable collection of mapping records. Implementations never write.
#[async_trait]
pub trait MappingSource: Send + Sync {
    async fn scan(&self, filter: &JobFilter) -> Result<Vec<MappingRecord>, MappingError>;
}

/// In-process mapping records.
#[derive(Debug, Clone, Default)]
pub struct MemoryMappings {
    records: Vec<MappingRecord>,
}

impl MemoryMappings {
    pub fn new(records: Vec<MappingRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl MappingSource for MemoryMappings {
    async fn scan(&self, filter: &JobFilter) -> Result<Vec<MappingRecord>, MappingError> {
        Ok(self
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(job: &str, rule: &str) -> MappingRecord {
        MappingRecord {
            mapping_id: format!("{job}-{rule}"),
            control_id: "ISM-0001".into(),
            control_description: String::new(),
            rule_identifier: rule.into(),
            relevance_explanation: String::new(),
            job_id: job.into(),
            timestamp: String::new(),
        }
    }

    #[tokio::test]
    async fn memory_source_filters_by_job() {
        let source = MemoryMappings::new(vec![record("a", "r1"), record("b", "r2")]);
        let only_a = source.scan(&JobFilter::Job("a".into())).await.unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].rule_identifier, "r1");

        let all = source.scan(&JobFilter::All).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
