//! Run artifacts
//!
//! - `proposals.jsonl`: one paragraph analysis per line (audit log)
//! - `review_records.jsonl`: one review decision per line
//! - `enumdiff_summary.json`: counts, settings and error tallies

use crate::models::{Decision, ParagraphAnalysis, ReviewRecord};
use crate::workflow::{AggregationCounts, PipelineConfig, RunFailure, RunReport, RunStatus, StatisticsSnapshot};
use chrono::{DateTime, Utc};
use enumdiff_common::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const PROPOSALS_FILE: &str = "proposals.jsonl";
pub const REVIEW_RECORDS_FILE: &str = "review_records.jsonl";
pub const SUMMARY_FILE: &str = "enumdiff_summary.json";

/// Settings echoed into the summary
#[derive(Debug, Clone, Serialize)]
pub struct RunSettings {
    pub provider_mode: String,
    pub concurrency: usize,
    pub min_doc_count: usize,
    pub confidence_floor: f64,
    pub escalation_threshold: f64,
    pub similarity_threshold: f64,
    pub similarity_metric: String,
    pub max_retries: u32,
    pub force: bool,
    pub catalog_version: String,
    pub prompt_version: String,
}

impl RunSettings {
    pub fn new(config: &PipelineConfig, catalog_version: &str, prompt_version: &str) -> Self {
        Self {
            provider_mode: config.mode.to_string(),
            concurrency: config.scheduler.concurrency,
            min_doc_count: config.policy.min_doc_count,
            confidence_floor: config.policy.confidence_floor,
            escalation_threshold: config.policy.escalation_threshold,
            similarity_threshold: config.policy.similarity_threshold,
            similarity_metric: config.policy.similarity_metric.to_string(),
            max_retries: config.retry.max_retries,
            force: config.force,
            catalog_version: catalog_version.to_string(),
            prompt_version: prompt_version.to_string(),
        }
    }
}

/// Contents of `enumdiff_summary.json`
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub tool_version: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    pub settings: RunSettings,
    pub paragraphs: usize,
    pub escalated_paragraphs: usize,
    pub counts: AggregationCounts,
    pub decisions: BTreeMap<Decision, usize>,
    pub statistics: StatisticsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn from_report(report: &RunReport, settings: RunSettings) -> Self {
        let mut decisions: BTreeMap<Decision, usize> =
            Decision::ALL.iter().map(|d| (*d, 0)).collect();
        for record in &report.review_records {
            *decisions.entry(record.decision).or_default() += 1;
        }

        Self {
            run_id: report.run_id,
            status: report.status,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Some(report.started_at),
            finished_at: report.finished_at,
            settings,
            paragraphs: report.analyses.len(),
            escalated_paragraphs: report.analyses.iter().filter(|a| a.escalated).count(),
            counts: report.counts.clone(),
            decisions,
            statistics: report.statistics.clone(),
            error: None,
        }
    }

    pub fn from_failure(failure: &RunFailure, settings: RunSettings) -> Self {
        Self {
            run_id: failure.run_id,
            status: RunStatus::Aborted,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: None,
            finished_at: Utc::now(),
            settings,
            paragraphs: failure.completed,
            escalated_paragraphs: 0,
            counts: AggregationCounts::default(),
            decisions: BTreeMap::new(),
            statistics: failure.statistics.clone(),
            error: Some(failure.error.to_string()),
        }
    }
}

/// Paths of the written artifacts
#[derive(Debug, Clone)]
pub struct WrittenArtifacts {
    pub proposals: PathBuf,
    pub review_records: PathBuf,
    pub summary: PathBuf,
}

/// Write all three artifacts of a finished run into `dir`
pub fn write_report(dir: &Path, report: &RunReport, summary: &RunSummary) -> Result<WrittenArtifacts> {
    std::fs::create_dir_all(dir)?;

    let artifacts = WrittenArtifacts {
        proposals: dir.join(PROPOSALS_FILE),
        review_records: dir.join(REVIEW_RECORDS_FILE),
        summary: dir.join(SUMMARY_FILE),
    };

    write_jsonl(&artifacts.proposals, &report.analyses)?;
    write_jsonl(&artifacts.review_records, &report.review_records)?;
    write_summary(&artifacts.summary, summary)?;

    tracing::info!(
        dir = %dir.display(),
        analyses = report.analyses.len(),
        review_records = report.review_records.len(),
        "Wrote run artifacts"
    );

    Ok(artifacts)
}

/// Pretty-printed summary JSON
pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, content)?;
    Ok(())
}

fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read back `review_records.jsonl`
pub fn read_review_records(path: &Path) -> Result<Vec<ReviewRecord>> {
    read_jsonl(path)
}

/// Read back `proposals.jsonl`
pub fn read_analyses(path: &Path) -> Result<Vec<ParagraphAnalysis>> {
    read_jsonl(path)
}

fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelTier, VocabularyType};
    use tempfile::TempDir;

    fn report() -> RunReport {
        RunReport {
            run_id: Uuid::new_v4(),
            status: RunStatus::Completed,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            analyses: vec![ParagraphAnalysis {
                doc_id: "NSG-1".into(),
                locator: "§4 Abs. 2".into(),
                proposals: Vec::new(),
                attempts: vec![crate::models::TierAttempt {
                    tier: ModelTier::Chat,
                    source: crate::models::AttemptSource::ServiceCall,
                    retries: 0,
                    outcome: crate::models::AttemptOutcome::Valid { proposals: 0 },
                }],
                escalated: false,
            }],
            review_records: vec![ReviewRecord {
                vocabulary_type: VocabularyType::Activity,
                decision: Decision::AddNew,
                candidate: "Drohnenflug".into(),
                mapping_target: None,
                doc_count: 10,
                confidence_avg: 0.9,
                example_quote: "Drohnen".into(),
                justification: "neu".into(),
                variants: vec!["Drohnenflug".into()],
                rationale: "ok".into(),
            }],
            counts: AggregationCounts::default(),
            statistics: StatisticsSnapshot::default(),
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let report = report();
        let settings = RunSettings::new(&PipelineConfig::default(), "v1", "p1");
        let summary = RunSummary::from_report(&report, settings);

        let written = write_report(temp_dir.path(), &report, &summary).unwrap();

        assert_eq!(read_review_records(&written.review_records).unwrap(), report.review_records);
        assert_eq!(read_analyses(&written.proposals).unwrap(), report.analyses);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written.summary).unwrap()).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["decisions"]["ADD_NEW"], 1);
        assert_eq!(json["decisions"]["IGNORE"], 0);
        assert_eq!(json["settings"]["provider_mode"], "auto");
        assert!(json.get("error").is_none());
    }
}
