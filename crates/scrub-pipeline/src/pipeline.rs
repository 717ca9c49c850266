//! End-to-end orchestration of one anonymisation run.
//!
//! Components execute sequentially; only the per-block NLP fan-out is
//! parallel inside its own engine. The cancellation token is checked at
//! every component boundary. The source document is never written to; all
//! outputs land in the run's output directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use scrub_core::{CancelToken, Detection, Result, ScrubConfig, SurrogateMapper};
use scrub_detect::nlp::NlpWarningKind;
use scrub_detect::{
    detect_with_rules, merge_detections, EntityRecognizer, HttpRecognizer, NlpEngine,
    PatternStore, PatternWarning,
};
use scrub_docx::{build_blocks, Applier, DocxPackage};

use crate::report::{
    build_ledger, build_summary, write_ledger, write_xlsx, ChangeLedger, SummaryRow,
};

pub const OUTPUT_DOCUMENT: &str = "anonymized.docx";
pub const OUTPUT_REPORT: &str = "report.xlsx";
pub const OUTPUT_LEDGER: &str = "ledger.json";

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

/// Everything a caller learns about a finished run.
#[derive(Debug)]
pub struct RunOutcome {
    pub blocks: usize,
    pub detections: usize,
    /// Applied plan count (the sweep's extra replacements are separate).
    pub replacements: usize,
    pub skipped: usize,
    pub sweep_replacements: usize,
    pub warnings: Vec<String>,
    pub summary: Vec<SummaryRow>,
    pub ledger: ChangeLedger,
    pub elapsed_ms: u64,
    pub document_path: PathBuf,
    pub report_path: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// One configured pipeline instance, reusable across documents.
///
/// The surrogate mapper is shared state: processing several documents with
/// one pipeline keeps their surrogates mutually consistent.
pub struct Pipeline {
    config: ScrubConfig,
    patterns: PatternStore,
    pattern_warnings: Vec<PatternWarning>,
    mapper: Arc<SurrogateMapper>,
    recognizer: Option<Box<dyn EntityRecognizer>>,
}

impl Pipeline {
    /// Build a pipeline from configuration: load the pattern catalogue and,
    /// when an endpoint is configured, the HTTP recognizer.
    pub fn new(config: ScrubConfig) -> Result<Self> {
        let (patterns, pattern_warnings) = PatternStore::load(&config.patterns_path)?;
        let recognizer: Option<Box<dyn EntityRecognizer>> = config
            .nlp_endpoint
            .as_ref()
            .map(|url| {
                Box::new(HttpRecognizer::new(url.clone(), config.nlp_timeout_ms))
                    as Box<dyn EntityRecognizer>
            });
        Ok(Self {
            config,
            patterns,
            pattern_warnings,
            mapper: Arc::new(SurrogateMapper::new()),
            recognizer,
        })
    }

    /// Swap in a recognizer regardless of `nlp_endpoint` (tests, embedded
    /// recognisers).
    pub fn with_recognizer(mut self, recognizer: Box<dyn EntityRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Share a surrogate mapper across pipelines.
    pub fn with_mapper(mut self, mapper: Arc<SurrogateMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn mapper(&self) -> &SurrogateMapper {
        &self.mapper
    }

    pub fn run(&self, input: &Path, output_dir: &Path) -> Result<RunOutcome> {
        self.run_with_cancel(input, output_dir, &CancelToken::new())
    }

    /// Execute the full pipeline on one document.
    ///
    /// # Steps
    /// 1. Open the package (fatal on container/XML errors).
    /// 2. Flatten into blocks.
    /// 3. Rule detections, then the NLP fan-out when a recognizer is set.
    /// 4. Merge into plans, enriched with surrogates.
    /// 5. Apply plans and run the header/footer sweep.
    /// 6. Save the document, then write the configured reports; any output
    ///    error removes the partial files.
    pub fn run_with_cancel(
        &self,
        input: &Path,
        output_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        let started = Instant::now();
        let mut warnings: Vec<String> =
            self.pattern_warnings.iter().map(|w| w.to_string()).collect();

        cancel.check()?;
        let mut pkg = DocxPackage::open(input)?;

        cancel.check()?;
        let blocks = build_blocks(&pkg);
        debug!(blocks = blocks.len(), "blocks built");

        cancel.check()?;
        let mut detections: Vec<Detection> = detect_with_rules(&self.patterns, &blocks);

        if let Some(recognizer) = self.recognizer.as_deref() {
            cancel.check()?;
            let engine = NlpEngine::new(recognizer, self.config.nlp_concurrency);
            let (nlp_detections, nlp_warnings) = engine.detect(&blocks);
            detections.extend(nlp_detections);

            let failed_blocks = nlp_warnings
                .iter()
                .filter(|w| w.kind == NlpWarningKind::CallFailed)
                .count();
            if failed_blocks > 0 {
                warnings.push(format!(
                    "nlp endpoint {} failed for {failed_blocks} block(s)",
                    recognizer.endpoint()
                ));
            }
            for warning in nlp_warnings
                .iter()
                .filter(|w| w.kind == NlpWarningKind::DroppedDetection)
            {
                warnings.push(warning.to_string());
            }
        }
        let detection_count = detections.len();

        cancel.check()?;
        let plans = merge_detections(&blocks, detections, &self.mapper);

        cancel.check()?;
        let apply_report =
            Applier::new(&mut pkg, self.config.highlight_replacements).apply(&plans);
        for (index, reason) in apply_report.skips() {
            warnings.push(format!(
                "replacement skipped in block {}: {reason}",
                plans[index].detection.block_id
            ));
        }

        // Everything after this point writes outputs; cancellation no longer
        // applies, output failures clean up after themselves.
        cancel.check()?;
        std::fs::create_dir_all(output_dir)?;
        let document_path = output_dir.join(OUTPUT_DOCUMENT);
        let report_path = self
            .config
            .generate_excel_report
            .then(|| output_dir.join(OUTPUT_REPORT));
        let ledger_path = self
            .config
            .generate_json_ledger
            .then(|| output_dir.join(OUTPUT_LEDGER));

        let summary = build_summary(&plans, &apply_report);
        let ledger = build_ledger(&plans, &apply_report, warnings.clone());

        let written = self.write_outputs(
            &pkg,
            &document_path,
            report_path.as_deref(),
            ledger_path.as_deref(),
            &summary,
            &ledger,
        );
        if let Err(err) = written {
            for path in [Some(document_path.as_path()), report_path.as_deref(), ledger_path.as_deref()]
                .into_iter()
                .flatten()
            {
                let _ = std::fs::remove_file(path);
            }
            return Err(err);
        }

        let outcome = RunOutcome {
            blocks: blocks.len(),
            detections: detection_count,
            replacements: apply_report.applied(),
            skipped: apply_report.skips().len(),
            sweep_replacements: apply_report.sweep_replacements,
            warnings,
            summary,
            ledger,
            elapsed_ms: started.elapsed().as_millis() as u64,
            document_path,
            report_path,
            ledger_path,
        };
        info!(
            replacements = outcome.replacements,
            skipped = outcome.skipped,
            elapsed_ms = outcome.elapsed_ms,
            "run finished"
        );
        Ok(outcome)
    }

    fn write_outputs(
        &self,
        pkg: &DocxPackage,
        document_path: &Path,
        report_path: Option<&Path>,
        ledger_path: Option<&Path>,
        summary: &[SummaryRow],
        ledger: &ChangeLedger,
    ) -> Result<()> {
        pkg.save(document_path)?;
        if let Some(path) = report_path {
            write_xlsx(summary, path)?;
        }
        if let Some(path) = ledger_path {
            write_ledger(ledger, path)?;
        }
        Ok(())
    }
}
