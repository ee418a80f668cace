//! SQLite copy of the mapping table.

use std::path::PathBuf;

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};

use super::{JobFilter, MappingSource};
use crate::errors::MappingError;
use crate::model::MappingRecord;

const SELECT_COLUMNS: &str = "SELECT mapping_id, control_id, control_description, \
     config_rule_identifier, relevance_explanation, job_id, timestamp FROM config_mappings";

/// Reads the `config_mappings` table. The connection is opened read-only.
#[derive(Debug, Clone)]
pub struct SqliteMappings {
    path: PathBuf,
}

impl SqliteMappings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MappingRecord> {
        Ok(MappingRecord {
            mapping_id: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
            control_id: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            control_description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            rule_identifier: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            relevance_explanation: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            job_id: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            timestamp: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        })
    }

    fn scan_blocking(
        path: &std::path::Path,
        filter: &JobFilter,
    ) -> Result<Vec<MappingRecord>, MappingError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| MappingError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let records = match filter {
            JobFilter::All => {
                let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY rowid"))?;
                let rows = stmt.query_map([], Self::row_to_record)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            JobFilter::Job(job_id) => {
                let mut stmt =
                    conn.prepare(&format!("{SELECT_COLUMNS} WHERE job_id = ?1 ORDER BY rowid"))?;
                let rows = stmt.query_map(params![job_id], Self::row_to_record)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(records)
    }
}

#[async_trait]
impl MappingSource for SqliteMappings {
    async fn scan(&self, filter: &JobFilter) -> Result<Vec<MappingRecord>, MappingError> {
        let path = self.path.clone();
        let filter = filter.clone();
        tokio::task::spawn_blocking(move || Self::scan_blocking(&path, &filter))
            .await
            .map_err(|e| MappingError::Open {
                path: self.path.display().to_string(),
                message: format!("scan task failed: {e}"),
            })?
    }
}
