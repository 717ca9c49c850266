//! Detection merging: union rule and NLP outputs, resolve overlaps, and
//! enrich the survivors into replacement plans.
//!
//! Overlap policy: two detections overlap iff they share a block and their
//! spans intersect. NLP beats rule regardless of confidence; among equals
//! the tie-break is higher confidence, then wider span, then
//! lexicographically smaller method. The greedy sweep in that priority
//! order guarantees the surviving spans of a block are pairwise disjoint.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::warn;

use scrub_core::{Block, Detection, DetectionSource, ReplacementPlan, SurrogateMapper};

/// Merge per-block detections into an ordered plan list.
///
/// Output order is block traversal order, then span start within a block;
/// this is the order the report's summary shows.
pub fn merge_detections(
    blocks: &[Block],
    detections: Vec<Detection>,
    mapper: &SurrogateMapper,
) -> Vec<ReplacementPlan> {
    let index: HashMap<&str, usize> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id.as_str(), i))
        .collect();

    let mut by_block: HashMap<usize, Vec<Detection>> = HashMap::new();
    for detection in detections {
        match index.get(detection.block_id.as_str()) {
            Some(&i) => by_block.entry(i).or_default().push(detection),
            None => {
                warn!(block = %detection.block_id, "detection for unknown block dropped");
            }
        }
    }

    let mut plans = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        let Some(candidates) = by_block.remove(&i) else {
            continue;
        };
        let mut kept = resolve_overlaps(candidates);
        kept.sort_by_key(|d| d.span.start);
        for detection in kept {
            let uuid = mapper.uuid_for(&detection.original_value, &detection.category);
            plans.push(ReplacementPlan {
                uuid,
                element: block.element,
                detection,
            });
        }
    }
    plans
}

/// Greedy overlap resolution in priority order.
fn resolve_overlaps(mut candidates: Vec<Detection>) -> Vec<Detection> {
    candidates.sort_by(priority_order);
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| !k.span.overlaps(&candidate.span)) {
            kept.push(candidate);
        }
    }
    kept
}

fn priority_order(a: &Detection, b: &Detection) -> Ordering {
    source_rank(a.source)
        .cmp(&source_rank(b.source))
        .then(
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal),
        )
        .then(b.span.len().cmp(&a.span.len()))
        .then_with(|| a.method.cmp(&b.method))
}

fn source_rank(source: DetectionSource) -> u8 {
    match source {
        DetectionSource::Nlp => 0,
        DetectionSource::Rule => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrub_core::detection::Span;
    use scrub_core::{BlockKind, DocPart, ElementKind, ElementRef, NodeId};

    fn block(id: &str, text: &str) -> Block {
        Block::new(
            id,
            BlockKind::Paragraph,
            text,
            ElementRef {
                part: DocPart::Body,
                node: NodeId(0),
                kind: ElementKind::Paragraph,
            },
        )
    }

    fn detection(
        block_id: &str,
        value: &str,
        span: Span,
        confidence: f64,
        source: DetectionSource,
        method: &str,
    ) -> Detection {
        Detection {
            block_id: block_id.to_string(),
            category: "person_name".to_string(),
            original_value: value.to_string(),
            span,
            confidence,
            source,
            method: method.to_string(),
        }
    }

    #[test]
    fn overlapping_nlp_beats_higher_confidence_rule() {
        let blocks = vec![block("paragraph_0", "Иван Петров подписал")];
        let mapper = SurrogateMapper::new();
        let detections = vec![
            detection(
                "paragraph_0",
                "Иван Петров",
                Span::new(0, 11),
                0.9,
                DetectionSource::Rule,
                "regex",
            ),
            detection(
                "paragraph_0",
                "Иван Петров",
                Span::new(0, 11),
                0.8,
                DetectionSource::Nlp,
                "natasha",
            ),
        ];
        let plans = merge_detections(&blocks, detections, &mapper);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].detection.source, DetectionSource::Nlp);
    }

    #[test]
    fn non_overlapping_detections_from_both_sources_survive() {
        let blocks = vec![block("paragraph_0", "Иванов видел Петрова")];
        let mapper = SurrogateMapper::new();
        let detections = vec![
            detection(
                "paragraph_0",
                "Иванов",
                Span::new(0, 6),
                0.9,
                DetectionSource::Rule,
                "regex",
            ),
            detection(
                "paragraph_0",
                "Петрова",
                Span::new(13, 20),
                0.8,
                DetectionSource::Nlp,
                "natasha",
            ),
        ];
        let plans = merge_detections(&blocks, detections, &mapper);
        assert_eq!(plans.len(), 2);
        // Ordered by span start.
        assert_eq!(plans[0].detection.original_value, "Иванов");
        assert_eq!(plans[1].detection.original_value, "Петрова");
    }

    #[test]
    fn rule_rule_overlap_resolved_by_confidence_then_width() {
        let blocks = vec![block("paragraph_0", "12-34")];
        let mapper = SurrogateMapper::new();
        // Same confidence: the wider span wins.
        let detections = vec![
            detection("paragraph_0", "12", Span::new(0, 2), 0.5, DetectionSource::Rule, "regex"),
            detection("paragraph_0", "12-34", Span::new(0, 5), 0.5, DetectionSource::Rule, "regex"),
            detection("paragraph_0", "34", Span::new(3, 5), 0.5, DetectionSource::Rule, "regex"),
        ];
        let plans = merge_detections(&blocks, detections, &mapper);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].detection.original_value, "12-34");

        // Higher confidence beats width.
        let detections = vec![
            detection("paragraph_0", "12-34", Span::new(0, 5), 0.5, DetectionSource::Rule, "regex"),
            detection("paragraph_0", "12", Span::new(0, 2), 0.9, DetectionSource::Rule, "regex"),
        ];
        let plans = merge_detections(&blocks, detections, &mapper);
        assert_eq!(plans.len(), 2 - 1, "overlap keeps only the winner");
        assert_eq!(plans[0].detection.original_value, "12");
    }

    #[test]
    fn merged_spans_are_pairwise_disjoint() {
        let blocks = vec![block("paragraph_0", "abcdefghij")];
        let mapper = SurrogateMapper::new();
        let detections = vec![
            detection("paragraph_0", "abc", Span::new(0, 3), 0.6, DetectionSource::Rule, "a"),
            detection("paragraph_0", "bcd", Span::new(1, 4), 0.6, DetectionSource::Rule, "b"),
            detection("paragraph_0", "cde", Span::new(2, 5), 0.6, DetectionSource::Rule, "c"),
            detection("paragraph_0", "fgh", Span::new(5, 8), 0.6, DetectionSource::Rule, "d"),
        ];
        let plans = merge_detections(&blocks, detections, &mapper);
        for (i, a) in plans.iter().enumerate() {
            for b in &plans[i + 1..] {
                assert!(
                    !a.detection.span.overlaps(&b.detection.span),
                    "{:?} overlaps {:?}",
                    a.detection.span,
                    b.detection.span
                );
            }
        }
    }

    #[test]
    fn plans_inherit_element_and_surrogate() {
        let blocks = vec![block("paragraph_0", "Иванов")];
        let mapper = SurrogateMapper::new();
        let detections = vec![detection(
            "paragraph_0",
            "Иванов",
            Span::new(0, 6),
            0.9,
            DetectionSource::Rule,
            "regex",
        )];
        let plans = merge_detections(&blocks, detections, &mapper);
        assert_eq!(plans[0].element, blocks[0].element);
        assert_eq!(
            plans[0].uuid,
            mapper.uuid_for("Иванов", "person_name"),
            "surrogate comes from the shared mapper"
        );
    }

    #[test]
    fn output_follows_block_traversal_order() {
        let blocks = vec![block("paragraph_0", "x 1"), block("table_0", "y 2")];
        let mapper = SurrogateMapper::new();
        // Detections arrive in reverse block order.
        let detections = vec![
            detection("table_0", "2", Span::new(2, 3), 0.5, DetectionSource::Rule, "regex"),
            detection("paragraph_0", "1", Span::new(2, 3), 0.5, DetectionSource::Rule, "regex"),
        ];
        let plans = merge_detections(&blocks, detections, &mapper);
        assert_eq!(plans[0].detection.block_id, "paragraph_0");
        assert_eq!(plans[1].detection.block_id, "table_0");
    }

    #[test]
    fn unknown_block_detections_are_dropped() {
        let blocks = vec![block("paragraph_0", "текст")];
        let mapper = SurrogateMapper::new();
        let detections = vec![detection(
            "paragraph_99",
            "текст",
            Span::new(0, 5),
            0.9,
            DetectionSource::Rule,
            "regex",
        )];
        assert!(merge_detections(&blocks, detections, &mapper).is_empty());
    }

    #[test]
    fn method_breaks_full_ties_deterministically() {
        let blocks = vec![block("paragraph_0", "abc")];
        let mapper = SurrogateMapper::new();
        let detections = vec![
            detection("paragraph_0", "abc", Span::new(0, 3), 0.5, DetectionSource::Rule, "zeta"),
            detection("paragraph_0", "abc", Span::new(0, 3), 0.5, DetectionSource::Rule, "alpha"),
        ];
        let plans = merge_detections(&blocks, detections, &mapper);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].detection.method, "alpha");
    }
}
