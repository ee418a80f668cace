//! Job outcome and the user-facing notification derived from it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Final state of pack generation for one job.
///
/// `Generated` is only ever produced when every selected rule was enriched
/// and every planned batch reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Generated {
        bundles: usize,
    },
    PartiallyGenerated {
        bundles: usize,
        failed_rules: usize,
        missing_batches: Vec<u32>,
    },
    Unavailable {
        reason: String,
    },
}

impl GenerationOutcome {
    /// Classify a finished assembly.
    pub fn classify(
        total_rules: usize,
        succeeded: usize,
        failed_rules: usize,
        missing_batches: &[u32],
        bundles: usize,
    ) -> Self {
        if total_rules == 0 {
            return Self::Unavailable {
                reason: "no rule identifiers selected".to_string(),
            };
        }
        if succeeded == 0 || bundles == 0 {
            let reason = if failed_rules == 0 && !missing_batches.is_empty() {
                "no batch results available".to_string()
            } else {
                format!("no rules enriched successfully ({failed_rules} failed)")
            };
            return Self::Unavailable { reason };
        }
        if failed_rules > 0 || !missing_batches.is_empty() {
            return Self::PartiallyGenerated {
                bundles,
                failed_rules,
                missing_batches: missing_batches.to_vec(),
            };
        }
        Self::Generated { bundles }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated { .. })
    }

    pub fn notification(&self, job_id: &str) -> Notification {
        match self {
            Self::Generated { bundles } => Notification {
                subject: format!("Conformance packs generated for job {job_id}"),
                message: format!("{bundles} conformance pack(s) generated. All rules enriched."),
            },
            Self::PartiallyGenerated {
                bundles,
                failed_rules,
                missing_batches,
            } => {
                let mut message = format!(
                    "{bundles} conformance pack(s) partially generated, {failed_rules} rules failed"
                );
                if !missing_batches.is_empty() {
                    let ids: Vec<String> = missing_batches.iter().map(u32::to_string).collect();
                    message.push_str(&format!(", batches missing: {}", ids.join(", ")));
                }
                message.push_str(" (see GENERATION_REPORT.md).");
                Notification {
                    subject: format!("Conformance packs partially generated for job {job_id}"),
                    message,
                }
            }
            Self::Unavailable { reason } => Notification {
                subject: format!("Conformance pack generation unavailable for job {job_id}"),
                message: format!("Pack generation unavailable: {reason}."),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub message: String,
}

/// Delivery of the final notification. Failures are logged by the caller and
/// never affect the generated artifacts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, job_id: &str, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, job_id: &str, notification: &Notification) -> anyhow::Result<()> {
        info!(
            job_id,
            subject = %notification.subject,
            message = %notification.message,
            "notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_generated_with_failures_or_gaps() {
        assert_eq!(
            GenerationOutcome::classify(10, 10, 0, &[], 1),
            GenerationOutcome::Generated { bundles: 1 }
        );
        assert!(matches!(
            GenerationOutcome::classify(10, 9, 1, &[], 1),
            GenerationOutcome::PartiallyGenerated { failed_rules: 1, .. }
        ));
        assert!(matches!(
            GenerationOutcome::classify(10, 5, 0, &[2], 1),
            GenerationOutcome::PartiallyGenerated { ref missing_batches, .. } if missing_batches == &[2]
        ));
    }

    #[test]
    fn nothing_to_pack_is_unavailable() {
        assert_eq!(
            GenerationOutcome::classify(0, 0, 0, &[], 0),
            GenerationOutcome::Unavailable {
                reason: "no rule identifiers selected".into()
            }
        );
        assert!(matches!(
            GenerationOutcome::classify(5, 0, 5, &[], 0),
            GenerationOutcome::Unavailable { .. }
        ));
        assert_eq!(
            GenerationOutcome::classify(5, 0, 0, &[1], 0),
            GenerationOutcome::Unavailable {
                reason: "no batch results available".into()
            }
        );
    }

    #[test]
    fn notifications_are_distinguishable() {
        let generated = GenerationOutcome::Generated { bundles: 2 }.notification("job-1");
        let partial = GenerationOutcome::PartiallyGenerated {
            bundles: 1,
            failed_rules: 3,
            missing_batches: vec![2],
        }
        .notification("job-1");
        let unavailable = GenerationOutcome::Unavailable {
            reason: "x".into(),
        }
        .notification("job-1");

        assert!(generated.subject.starts_with("Conformance packs generated"));
        assert!(partial.subject.contains("partially generated"));
        assert!(partial.message.contains("3 rules failed"));
        assert!(partial.message.contains("batches missing: 2"));
        assert!(unavailable.subject.contains("unavailable"));
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(GenerationOutcome::Generated { bundles: 1 }).unwrap();
        assert_eq!(json["status"], "generated");
    }
}
