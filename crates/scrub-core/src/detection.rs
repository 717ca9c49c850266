use serde::{Deserialize, Serialize};

use crate::block::ElementRef;

// ---------------------------------------------------------------------------
// Span
// ---------------------------------------------------------------------------

/// Half-open `[start, end)` code-point interval over a block's normalised
/// text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Two spans overlap iff their interiors intersect.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Which detector produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Rule,
    Nlp,
}

impl DetectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionSource::Rule => "rule",
            DetectionSource::Nlp => "nlp",
        }
    }
}

impl std::fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A located sensitive span within one block's text.
///
/// Invariant at merge time: `original_value` equals the block text slice at
/// `span` (code points).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub block_id: String,
    /// Free-form category tag, e.g. `person_name`, `organization`, `inn`.
    pub category: String,
    pub original_value: String,
    pub span: Span,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    pub source: DetectionSource,
    /// Tag of the matcher variant, e.g. `regex` or the NLP model's own label.
    pub method: String,
}

// ---------------------------------------------------------------------------
// ReplacementPlan
// ---------------------------------------------------------------------------

/// A detection enriched with its surrogate and the element handle inherited
/// from the block, ready for application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementPlan {
    pub detection: Detection,
    /// Canonical hyphenated v5 UUID that replaces the original value.
    pub uuid: String,
    pub element: ElementRef,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{DocPart, ElementKind, NodeId};

    #[test]
    fn span_overlap_cases() {
        let a = Span::new(0, 5);
        assert!(a.overlaps(&Span::new(4, 8)));
        assert!(a.overlaps(&Span::new(0, 5)));
        assert!(a.overlaps(&Span::new(2, 3)));
        assert!(!a.overlaps(&Span::new(5, 9)), "touching spans do not overlap");
        assert!(!a.overlaps(&Span::new(7, 9)));
    }

    #[test]
    fn span_len_and_empty() {
        assert_eq!(Span::new(3, 10).len(), 7);
        assert!(Span::new(4, 4).is_empty());
        assert!(!Span::new(4, 5).is_empty());
    }

    #[test]
    fn detection_source_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&DetectionSource::Rule).unwrap(),
            "\"rule\""
        );
        assert_eq!(
            serde_json::to_string(&DetectionSource::Nlp).unwrap(),
            "\"nlp\""
        );
    }

    #[test]
    fn plan_round_trips_json() {
        let plan = ReplacementPlan {
            detection: Detection {
                block_id: "paragraph_0".to_string(),
                category: "inn".to_string(),
                original_value: "7701234567".to_string(),
                span: Span::new(6, 16),
                confidence: 0.95,
                source: DetectionSource::Rule,
                method: "regex".to_string(),
            },
            uuid: "00000000-0000-0000-0000-000000000000".to_string(),
            element: ElementRef {
                part: DocPart::Body,
                node: NodeId(1),
                kind: ElementKind::Paragraph,
            },
        };
        let json = serde_json::to_string(&plan).expect("serialize");
        let restored: ReplacementPlan = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.detection.span, plan.detection.span);
        assert_eq!(restored.uuid, plan.uuid);
    }
}
