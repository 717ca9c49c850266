//! Formatting-preserving replacement of planned spans.
//!
//! Plans are grouped by block and applied in descending span order, so spans
//! to the left of a pending plan stay valid. Dispatch is static over the
//! element kind; all three shapes share one segment-splice helper operating
//! on `w:t` text nodes, which keeps run formatting untouched outside the
//! replaced stretch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use scrub_core::detection::Span;
use scrub_core::text::{byte_to_char, char_len, splice_chars};
use scrub_core::{DocPart, ElementKind, NodeId, ReplacementPlan};

use crate::builder::{paragraph_projection, paragraph_runs, table_cells};
use crate::package::DocxPackage;
use crate::project::{project_table, Projection};
use crate::xml::XmlTree;

// ---------------------------------------------------------------------------
// ApplyStatus / ApplyReport
// ---------------------------------------------------------------------------

/// Why a plan was not applied. Soft failures only; the run continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The element's current text no longer carries the original value.
    TextNotFound,
    /// The span straddles a `" | "` or row separator in a table projection.
    CrossCellSpan,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::TextNotFound => "text not found",
            SkipReason::CrossCellSpan => "span crosses cell boundary",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disposition of one plan after application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    Applied,
    Skipped(SkipReason),
}

/// Outcome of a full apply pass, index-parallel with the input plan list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    pub statuses: Vec<ApplyStatus>,
    /// Replacements made by the header/footer fallback sweep.
    pub sweep_replacements: usize,
}

impl ApplyReport {
    pub fn applied(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| matches!(s, ApplyStatus::Applied))
            .count()
    }

    /// `(plan index, reason)` for every skipped plan.
    pub fn skips(&self) -> Vec<(usize, SkipReason)> {
        self.statuses
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                ApplyStatus::Skipped(reason) => Some((i, *reason)),
                ApplyStatus::Applied => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Applier
// ---------------------------------------------------------------------------

/// Writes surrogates into the package. The package is the applier's to
/// mutate; nothing else touches it during a run.
pub struct Applier<'a> {
    pkg: &'a mut DocxPackage,
    highlight: bool,
}

impl<'a> Applier<'a> {
    pub fn new(pkg: &'a mut DocxPackage, highlight: bool) -> Self {
        Self { pkg, highlight }
    }

    /// Apply every plan, then run the header/footer fallback sweep.
    pub fn apply(&mut self, plans: &[ReplacementPlan]) -> ApplyReport {
        let mut statuses = vec![ApplyStatus::Applied; plans.len()];

        // Group plan indices by block, preserving first-appearance order.
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, plan) in plans.iter().enumerate() {
            let key = plan.detection.block_id.as_str();
            if !groups.contains_key(key) {
                order.push(key);
            }
            groups.entry(key).or_default().push(i);
        }

        for key in order {
            let mut indices = groups.remove(key).unwrap_or_default();
            // Right-to-left keeps still-pending spans valid.
            indices.sort_by(|a, b| {
                plans[*b]
                    .detection
                    .span
                    .start
                    .cmp(&plans[*a].detection.span.start)
            });
            for i in indices {
                let plan = &plans[i];
                let result = self.apply_one(plan);
                if let Err(reason) = result {
                    warn!(
                        block = %plan.detection.block_id,
                        original = %plan.detection.original_value,
                        reason = %reason,
                        "replacement skipped"
                    );
                    statuses[i] = ApplyStatus::Skipped(reason);
                }
            }
        }

        let sweep_replacements = self.sweep_headers_footers(plans);
        debug!(
            applied = statuses.iter().filter(|s| matches!(s, ApplyStatus::Applied)).count(),
            sweep = sweep_replacements,
            "apply pass finished"
        );

        ApplyReport {
            statuses,
            sweep_replacements,
        }
    }

    fn apply_one(&mut self, plan: &ReplacementPlan) -> Result<(), SkipReason> {
        let highlight = self.highlight;
        let tree = self.tree_mut(plan.element.part);
        let original = plan.detection.original_value.as_str();
        let span = plan.detection.span;
        let uuid = plan.uuid.as_str();

        match plan.element.kind {
            ElementKind::Paragraph => {
                replace_in_paragraph(tree, plan.element.node, original, uuid, Some(span), highlight)
            }
            ElementKind::Table => {
                replace_in_table(tree, plan.element.node, original, uuid, span, highlight)
            }
            ElementKind::Sdt => {
                replace_in_sdt(tree, plan.element.node, original, uuid, Some(span), highlight)
            }
        }
    }

    fn tree_mut(&mut self, part: DocPart) -> &mut XmlTree {
        match part {
            DocPart::Body => &mut self.pkg.document,
            DocPart::Header(i) => &mut self.pkg.headers[i].tree,
            DocPart::Footer(i) => &mut self.pkg.footers[i].tree,
        }
    }

    /// Replace remaining occurrences of every planned literal in every
    /// header/footer paragraph. The per-block pass only touches the element
    /// a block points at; the same literal may recur in surrounding
    /// paragraphs (repeated page fields and the like). Idempotent over
    /// already-replaced text because a surrogate never equals its original.
    fn sweep_headers_footers(&mut self, plans: &[ReplacementPlan]) -> usize {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for plan in plans {
            let pair = (
                plan.detection.original_value.clone(),
                plan.uuid.clone(),
            );
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        if pairs.is_empty() {
            return 0;
        }

        let highlight = self.highlight;
        let mut count = 0usize;
        let part_count = self.pkg.headers.len() + self.pkg.footers.len();
        for part_index in 0..part_count {
            let tree = if part_index < self.pkg.headers.len() {
                &mut self.pkg.headers[part_index].tree
            } else {
                &mut self.pkg.footers[part_index - self.pkg.headers.len()].tree
            };
            let root = tree.root();
            for p in tree.descendant_elements_named(root, "p") {
                for (original, uuid) in &pairs {
                    // Bounded by the occurrence count up front, in case the
                    // surrogate itself contains the literal.
                    let occurrences = paragraph_projection(tree, p)
                        .text
                        .matches(original.as_str())
                        .count();
                    for _ in 0..occurrences {
                        if replace_in_paragraph(tree, p, original, uuid, None, highlight).is_err() {
                            break;
                        }
                        count += 1;
                    }
                }
            }
        }
        count
    }
}

// ---------------------------------------------------------------------------
// Shape-specific replacement
// ---------------------------------------------------------------------------

/// Replace `original` within a paragraph. With `span`, offsets address the
/// paragraph's normalised projection; without, the first occurrence found in
/// the projection is used (value mode, for table cells and the sweep).
fn replace_in_paragraph(
    tree: &mut XmlTree,
    paragraph: NodeId,
    original: &str,
    uuid: &str,
    span: Option<Span>,
    highlight: bool,
) -> Result<(), SkipReason> {
    let mut nodes = Vec::new();
    for run in paragraph_runs(tree, paragraph) {
        nodes.extend(tree.child_elements_named(run, "t"));
    }
    replace_in_segments(tree, &nodes, original, uuid, span, highlight)
}

/// Replace `original` within an SDT subtree: the segments are its descendant
/// `w:t` nodes in document order.
fn replace_in_sdt(
    tree: &mut XmlTree,
    sdt: NodeId,
    original: &str,
    uuid: &str,
    span: Option<Span>,
    highlight: bool,
) -> Result<(), SkipReason> {
    let nodes = tree.descendant_elements_named(sdt, "t");
    replace_in_segments(tree, &nodes, original, uuid, span, highlight)
}

/// Locate the table cell owning `span.start` via the same projection the
/// block builder used, then run value-mode paragraph replacement inside it.
fn replace_in_table(
    tree: &mut XmlTree,
    table: NodeId,
    original: &str,
    uuid: &str,
    span: Span,
    highlight: bool,
) -> Result<(), SkipReason> {
    let rows = table_cells(tree, table);
    let (_, ranges) = project_table(&rows);

    let cell = ranges
        .iter()
        .find(|r| r.start <= span.start && span.start < r.end)
        .copied()
        .ok_or(SkipReason::CrossCellSpan)?;
    if span.end > cell.end {
        // Detections are per-cell by contract; a span that runs into the
        // separator cannot be mapped back to one element.
        return Err(SkipReason::CrossCellSpan);
    }

    let tr = tree.child_elements_named(table, "tr")[cell.row];
    let tc = tree.child_elements_named(tr, "tc")[cell.col];

    let mut replaced = false;
    for p in tree.descendant_elements_named(tc, "p") {
        if paragraph_projection(tree, p).text.contains(original)
            && replace_in_paragraph(tree, p, original, uuid, None, highlight).is_ok()
        {
            replaced = true;
        }
    }
    if replaced {
        Ok(())
    } else {
        Err(SkipReason::TextNotFound)
    }
}

// ---------------------------------------------------------------------------
// Segment splice core
// ---------------------------------------------------------------------------

/// Shared replacement core over an ordered list of `w:t` segments.
///
/// Fast path: a single segment contains the literal, so only that segment
/// is rewritten. Otherwise the normalised projection maps the span to per-segment
/// raw ranges; the first intersecting segment receives the surrogate, each
/// later one loses its intersecting portion. The surrogate is written once.
fn replace_in_segments(
    tree: &mut XmlTree,
    nodes: &[NodeId],
    original: &str,
    uuid: &str,
    span: Option<Span>,
    highlight: bool,
) -> Result<(), SkipReason> {
    let texts: Vec<String> = nodes.iter().map(|&t| tree.element_text(t)).collect();

    // Fast path: the literal sits inside one text node.
    if let Some(i) = texts.iter().position(|t| t.contains(original)) {
        let rewritten = texts[i].replacen(original, uuid, 1);
        tree.set_element_text(nodes[i], &rewritten);
        if highlight {
            highlight_segment(tree, nodes[i]);
        }
        return Ok(());
    }

    // Splice across segments via the shared projection.
    let proj = Projection::over_segments(&texts);
    let target = resolve_span(&proj, original, span).ok_or(SkipReason::TextNotFound)?;
    let ranges = proj.segment_ranges(target);
    if ranges.is_empty() {
        return Err(SkipReason::TextNotFound);
    }

    for (k, range) in ranges.iter().enumerate() {
        let replacement = if k == 0 { uuid } else { "" };
        let rewritten = splice_chars(&texts[range.segment], range.start, range.end, replacement);
        tree.set_element_text(nodes[range.segment], &rewritten);
        if k == 0 && highlight {
            highlight_segment(tree, nodes[range.segment]);
        }
    }
    Ok(())
}

/// Pick the span to splice: the planned one when it still matches the
/// current projection, else the literal's first occurrence in it.
fn resolve_span(proj: &Projection, original: &str, span: Option<Span>) -> Option<Span> {
    if let Some(span) = span {
        if proj.slice(span) == original {
            return Some(span);
        }
    }
    proj.text.find(original).map(|byte_pos| {
        let start = byte_to_char(&proj.text, byte_pos);
        Span::new(start, start + char_len(original))
    })
}

/// Mark the run owning `t_node` with a yellow highlight.
fn highlight_segment(tree: &mut XmlTree, t_node: NodeId) {
    let Some(run) = tree.ancestor_named(t_node, "r") else {
        return;
    };
    let rpr = match tree.child_elements_named(run, "rPr").first() {
        Some(&existing) => existing,
        None => {
            let created = tree.new_element("w:rPr");
            tree.insert_child(run, 0, created);
            created
        }
    };
    match tree.child_elements_named(rpr, "highlight").first() {
        Some(&existing) => tree.set_attr(existing, "w:val", "yellow"),
        None => {
            let created = tree.new_element("w:highlight");
            tree.set_attr(created, "w:val", "yellow");
            tree.insert_child(rpr, usize::MAX, created);
        }
    }
}
