use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use conpack_core::mappings::{MappingSource, NdjsonMappings, SqliteMappings};
use conpack_core::{Assembly, ReferenceCorpus};
use conpack_store::{ArtifactStore, ObjectStoreArtifactStore};

use crate::cli::args::{CommonArgs, CorpusArgs};
use crate::cli::config::{self, Settings};

const CORPUS_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

pub fn settings(common: &CommonArgs) -> anyhow::Result<Settings> {
    config::resolve(common.config.as_deref(), common.limits.overrides())
}

pub async fn open_store(url: &str) -> anyhow::Result<Arc<dyn ArtifactStore>> {
    let store = ObjectStoreArtifactStore::from_url(url)
        .await
        .with_context(|| format!("failed to open artifact store {url}"))?;
    Ok(Arc::new(store))
}

/// SQLite for `.db`/`.sqlite`/`.sqlite3`, NDJSON for anything else.
pub fn open_mappings(path: &Path) -> anyhow::Result<Arc<dyn MappingSource>> {
    if !path.exists() {
        anyhow::bail!("mapping source {} does not exist", path.display());
    }
    let is_sqlite = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("db" | "sqlite" | "sqlite3")
    );
    Ok(if is_sqlite {
        Arc::new(SqliteMappings::new(path))
    } else {
        Arc::new(NdjsonMappings::new(path))
    })
}

pub async fn load_corpus(args: &CorpusArgs) -> anyhow::Result<ReferenceCorpus> {
    match (&args.corpus_url, &args.corpus_file) {
        (Some(url), _) => {
            let client = reqwest::Client::new();
            Ok(ReferenceCorpus::fetch(&client, url, CORPUS_FETCH_TIMEOUT).await?)
        }
        (None, Some(path)) => Ok(ReferenceCorpus::from_file(path).await?),
        (None, None) => anyhow::bail!("one of --corpus-url or --corpus-file is required"),
    }
}

pub fn print_assembly(assembly: &Assembly) {
    let report = &assembly.report;
    println!(
        "job {}: {} of {} rules packed into {} bundle(s)",
        report.job_id,
        report.succeeded,
        report.total_rules,
        report.bundles.len()
    );
    for bundle in &report.bundles {
        let flag = if bundle.oversized { " (oversized)" } else { "" };
        println!(
            "  {}  {} rules  {} bytes{}",
            bundle.key, bundle.rule_count, bundle.byte_size, flag
        );
    }
    if !report.failed.is_empty() {
        println!("  {} rule(s) failed", report.failed.len());
    }
    if !report.missing_batches.is_empty() {
        let ids: Vec<String> = report.missing_batches.iter().map(u32::to_string).collect();
        println!("  missing batches: {}", ids.join(", "));
    }
    println!("report: {}", assembly.report_key);
}
