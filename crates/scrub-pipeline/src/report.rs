//! Run reporting: the tabular replacement summary and the change ledger.
//!
//! The summary lists every applied occurrence, duplicates included. The
//! ledger deduplicates its entry list by `(original_value, category)` and
//! additionally carries per-category counts, the run's warnings and the
//! skipped plans, so the whole run is auditable from one JSON file.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};

use scrub_core::{DetectionSource, ReplacementPlan, Result, ScrubError};
use scrub_docx::{ApplyReport, ApplyStatus};

/// Ledger schema version.
pub const LEDGER_VERSION: &str = "1.0";

// ---------------------------------------------------------------------------
// SummaryRow
// ---------------------------------------------------------------------------

/// One applied replacement occurrence, in block traversal then span order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRow {
    /// 1-based row number.
    pub index: usize,
    pub original_value: String,
    pub uuid: String,
    pub category: String,
    pub method: String,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// ChangeLedger
// ---------------------------------------------------------------------------

/// One deduplicated `(original_value, category)` binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub original_value: String,
    pub uuid: String,
    pub category: String,
    pub method: String,
    pub confidence: f64,
    pub source: DetectionSource,
}

/// A plan that could not be applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub block_id: String,
    pub original_value: String,
    pub reason: String,
}

/// Structured record of everything one run changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLedger {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub total_replacements: usize,
    /// Replacements made by the header/footer fallback sweep, on top of
    /// `total_replacements`.
    pub sweep_replacements: usize,
    /// Applied occurrence counts per category, sorted by category.
    pub category_counts: BTreeMap<String, usize>,
    pub entries: Vec<LedgerEntry>,
    pub warnings: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Summary rows for the applied plans, preserving plan order.
pub fn build_summary(plans: &[ReplacementPlan], report: &ApplyReport) -> Vec<SummaryRow> {
    let mut rows = Vec::new();
    for (plan, status) in plans.iter().zip(&report.statuses) {
        if !matches!(status, ApplyStatus::Applied) {
            continue;
        }
        rows.push(SummaryRow {
            index: rows.len() + 1,
            original_value: plan.detection.original_value.clone(),
            uuid: plan.uuid.clone(),
            category: plan.detection.category.clone(),
            method: plan.detection.method.clone(),
            confidence: plan.detection.confidence,
        });
    }
    rows
}

/// Assemble the ledger from the apply outcome and the run's warnings.
pub fn build_ledger(
    plans: &[ReplacementPlan],
    report: &ApplyReport,
    warnings: Vec<String>,
) -> ChangeLedger {
    let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut entries: Vec<LedgerEntry> = Vec::new();
    let mut skipped = Vec::new();
    let mut total = 0usize;

    for (plan, status) in plans.iter().zip(&report.statuses) {
        match status {
            ApplyStatus::Applied => {
                total += 1;
                *category_counts
                    .entry(plan.detection.category.clone())
                    .or_insert(0) += 1;
                let duplicate = entries.iter().any(|e: &LedgerEntry| {
                    e.original_value == plan.detection.original_value
                        && e.category == plan.detection.category
                });
                if !duplicate {
                    entries.push(LedgerEntry {
                        original_value: plan.detection.original_value.clone(),
                        uuid: plan.uuid.clone(),
                        category: plan.detection.category.clone(),
                        method: plan.detection.method.clone(),
                        confidence: plan.detection.confidence,
                        source: plan.detection.source,
                    });
                }
            }
            ApplyStatus::Skipped(reason) => skipped.push(SkippedEntry {
                block_id: plan.detection.block_id.clone(),
                original_value: plan.detection.original_value.clone(),
                reason: reason.to_string(),
            }),
        }
    }

    ChangeLedger {
        version: LEDGER_VERSION.to_string(),
        generated_at: Utc::now(),
        total_replacements: total,
        sweep_replacements: report.sweep_replacements,
        category_counts,
        entries,
        warnings,
        skipped,
    }
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Write the summary as a one-sheet workbook with a bold header row.
pub fn write_xlsx(rows: &[SummaryRow], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    let headers = [
        "index",
        "original_value",
        "uuid",
        "category",
        "method",
        "confidence",
    ];
    for (col, header) in headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, *header, &bold)
            .map_err(|e| ScrubError::Report(e.to_string()))?;
    }

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        worksheet
            .write_number(r, 0, row.index as f64)
            .and_then(|ws| ws.write_string(r, 1, &row.original_value))
            .and_then(|ws| ws.write_string(r, 2, &row.uuid))
            .and_then(|ws| ws.write_string(r, 3, &row.category))
            .and_then(|ws| ws.write_string(r, 4, &row.method))
            .and_then(|ws| ws.write_number(r, 5, row.confidence))
            .map_err(|e| ScrubError::Report(e.to_string()))?;
    }

    workbook
        .save(path)
        .map_err(|e| ScrubError::Report(e.to_string()))?;
    Ok(())
}

/// Write the ledger as pretty-printed JSON.
pub fn write_ledger(ledger: &ChangeLedger, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, ledger)?;
    Ok(())
}
