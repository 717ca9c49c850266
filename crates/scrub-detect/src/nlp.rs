//! NLP entity detection: the per-block recognizer contract, the bundled
//! HTTP adapter, and the bounded parallel fan-out.
//!
//! The recogniser itself is an external collaborator; anything honouring the
//! per-block request/response contract plugs in through
//! [`EntityRecognizer`]. Per-block invocation keeps every returned span
//! local to one element, so no global text-to-element index is needed.
//! Every failure is per-block and soft: the block keeps its rule-only
//! detections and the run carries a warning.

use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use scrub_core::detection::Span;
use scrub_core::text::{char_len, char_slice};
use scrub_core::{Block, Detection, DetectionSource, Result, ScrubError};

// ---------------------------------------------------------------------------
// Wire protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct NlpBlock {
    pub content: String,
    pub block_id: String,
    pub block_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NlpRequest {
    pub blocks: Vec<NlpBlock>,
    pub options: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NlpPosition {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NlpEntity {
    pub category: String,
    #[serde(default)]
    pub original_value: String,
    pub confidence: f64,
    /// Zero-based half-open code-point interval over the submitted content.
    pub position: NlpPosition,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub block_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NlpResponse {
    pub success: bool,
    #[serde(default)]
    pub detections: Vec<NlpEntity>,
    #[serde(default)]
    pub total_detections: usize,
    #[serde(default)]
    pub blocks_processed: usize,
}

// ---------------------------------------------------------------------------
// EntityRecognizer
// ---------------------------------------------------------------------------

/// Per-block recognizer contract. Implementations must be callable from
/// worker threads.
pub trait EntityRecognizer: Send + Sync {
    /// Label used in warnings, normally the endpoint URL.
    fn endpoint(&self) -> &str;

    /// Recognise entities in one block's text.
    fn recognize(&self, request: &NlpRequest) -> Result<NlpResponse>;
}

/// Blocking JSON-over-HTTP adapter with a per-call timeout.
pub struct HttpRecognizer {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpRecognizer {
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .build();
        Self {
            endpoint: endpoint.into(),
            agent,
        }
    }
}

impl EntityRecognizer for HttpRecognizer {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn recognize(&self, request: &NlpRequest) -> Result<NlpResponse> {
        let response = self
            .agent
            .post(&self.endpoint)
            .send_json(request)
            .map_err(|e| ScrubError::Nlp(e.to_string()))?;
        response
            .into_json::<NlpResponse>()
            .map_err(|e| ScrubError::Nlp(format!("malformed response payload: {e}")))
    }
}

// ---------------------------------------------------------------------------
// NlpEngine
// ---------------------------------------------------------------------------

/// What went wrong for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NlpWarningKind {
    /// The recognizer call failed outright (transport, timeout, `success =
    /// false`); the block keeps rule-only detections.
    CallFailed,
    /// One returned detection was unusable and was dropped.
    DroppedDetection,
}

/// A soft failure while recognising one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NlpWarning {
    pub block_id: String,
    pub kind: NlpWarningKind,
    pub message: String,
}

impl std::fmt::Display for NlpWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block {}: {}", self.block_id, self.message)
    }
}

/// Bounded fan-out over blocks with per-task failure isolation.
pub struct NlpEngine<'a> {
    recognizer: &'a dyn EntityRecognizer,
    concurrency: usize,
}

impl<'a> NlpEngine<'a> {
    pub fn new(recognizer: &'a dyn EntityRecognizer, concurrency: usize) -> Self {
        Self {
            recognizer,
            concurrency: concurrency.max(1),
        }
    }

    /// Recognise every block, collecting detections in block order plus one
    /// warning per failed block. A failed block never cancels the others.
    pub fn detect(&self, blocks: &[Block]) -> (Vec<Detection>, Vec<NlpWarning>) {
        let run = || {
            blocks
                .par_iter()
                .map(|block| self.detect_block(block))
                .collect::<Vec<_>>()
        };
        let per_block = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .build()
        {
            Ok(pool) => pool.install(run),
            // Shared pool fallback when a dedicated pool cannot be built.
            Err(_) => run(),
        };

        let mut detections = Vec::new();
        let mut warnings = Vec::new();
        for (block_detections, block_warnings) in per_block {
            detections.extend(block_detections);
            warnings.extend(block_warnings);
        }
        debug!(
            detections = detections.len(),
            warnings = warnings.len(),
            "nlp fan-out finished"
        );
        (detections, warnings)
    }

    fn detect_block(&self, block: &Block) -> (Vec<Detection>, Vec<NlpWarning>) {
        let request = NlpRequest {
            blocks: vec![NlpBlock {
                content: block.text.clone(),
                block_id: block.id.clone(),
                block_type: block.kind.as_str().to_string(),
            }],
            options: serde_json::json!({}),
        };

        let response = match self.recognizer.recognize(&request) {
            Ok(response) => response,
            Err(err) => {
                let warning = NlpWarning {
                    block_id: block.id.clone(),
                    kind: NlpWarningKind::CallFailed,
                    message: format!("nlp endpoint {} failed: {err}", self.recognizer.endpoint()),
                };
                warn!(block = %block.id, %err, "nlp call failed");
                return (Vec::new(), vec![warning]);
            }
        };
        if !response.success {
            let warning = NlpWarning {
                block_id: block.id.clone(),
                kind: NlpWarningKind::CallFailed,
                message: format!(
                    "nlp endpoint {} reported failure",
                    self.recognizer.endpoint()
                ),
            };
            return (Vec::new(), vec![warning]);
        }

        let mut detections = Vec::new();
        let mut warnings = Vec::new();
        let text_len = char_len(&block.text);
        for entity in response.detections {
            let span = Span::new(entity.position.start, entity.position.end);
            if span.is_empty() || span.end > text_len {
                warnings.push(NlpWarning {
                    block_id: block.id.clone(),
                    kind: NlpWarningKind::DroppedDetection,
                    message: format!(
                        "dropped {} span [{}, {}): out of bounds",
                        entity.category, span.start, span.end
                    ),
                });
                continue;
            }
            let slice = char_slice(&block.text, span.start, span.end);
            // Span-fidelity guard: a detection whose span does not reproduce
            // its value cannot be applied safely.
            if !entity.original_value.is_empty() && entity.original_value != slice {
                warnings.push(NlpWarning {
                    block_id: block.id.clone(),
                    kind: NlpWarningKind::DroppedDetection,
                    message: format!(
                        "dropped {} detection: span text {:?} does not match value {:?}",
                        entity.category, slice, entity.original_value
                    ),
                });
                continue;
            }
            detections.push(Detection {
                block_id: block.id.clone(),
                category: entity.category,
                original_value: slice.to_string(),
                span,
                confidence: entity.confidence.clamp(0.0, 1.0),
                source: DetectionSource::Nlp,
                method: if entity.method.is_empty() {
                    "nlp".to_string()
                } else {
                    entity.method
                },
            });
        }
        (detections, warnings)
    }
}
