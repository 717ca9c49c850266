//! Regex detection over blocks.
//!
//! Every rule scans every block's text independently; overlapping matches
//! from different rules all survive here. Overlap resolution is the
//! merger's job.

use scrub_core::detection::Span;
use scrub_core::text::byte_to_char;
use scrub_core::{Block, Detection, DetectionSource};

use crate::patterns::PatternStore;

/// Scan `blocks` with every rule in `store`.
///
/// Regex matches come back byte-indexed; spans are published in code points
/// over the block's normalised text, as the rest of the pipeline expects.
pub fn detect_with_rules(store: &PatternStore, blocks: &[Block]) -> Vec<Detection> {
    let mut detections = Vec::new();
    for block in blocks {
        for rule in store.rules() {
            for found in rule.regex.find_iter(&block.text) {
                if found.as_str().is_empty() {
                    continue; // zero-width matches carry nothing to replace
                }
                let start = byte_to_char(&block.text, found.start());
                let end = start + found.as_str().chars().count();
                detections.push(Detection {
                    block_id: block.id.clone(),
                    category: rule.category.clone(),
                    original_value: found.as_str().to_string(),
                    span: Span::new(start, end),
                    confidence: rule.confidence,
                    source: DetectionSource::Rule,
                    method: "regex".to_string(),
                });
            }
        }
    }
    detections
}
