//! Normalised text projection shared by the block builder and the applier.
//!
//! Normalisation rules: U+00A0 becomes an ordinary space, runs of whitespace
//! collapse to a single space, leading/trailing whitespace is stripped. The
//! projection additionally remembers, for every code point of the normalised
//! text, which input segment produced it and at which code-point offset, so
//! a detection span can be mapped back to raw run text exactly. Builder and
//! applier both go through this module; a second implementation would let
//! spans drift.

use scrub_core::detection::Span;

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Origin of one normalised code point: `segment` indexes the input slice,
/// `offset` is the code-point offset inside that segment's raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePos {
    pub segment: usize,
    pub offset: usize,
}

/// The raw code-point range a span occupies inside one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSlice {
    pub segment: usize,
    pub start: usize,
    pub end: usize,
}

/// Normalised text plus the per-code-point back-mapping.
#[derive(Debug, Clone)]
pub struct Projection {
    pub text: String,
    map: Vec<SourcePos>,
}

impl Projection {
    /// Project a sequence of raw segments (runs, text nodes) into one
    /// normalised string.
    pub fn over_segments<S: AsRef<str>>(segments: &[S]) -> Self {
        let mut text = String::new();
        let mut map = Vec::new();
        // First whitespace position of the run currently being collapsed.
        let mut pending: Option<SourcePos> = None;

        for (segment, raw) in segments.iter().enumerate() {
            for (offset, ch) in raw.as_ref().chars().enumerate() {
                let ch = if ch == '\u{00A0}' { ' ' } else { ch };
                if ch.is_whitespace() {
                    if pending.is_none() {
                        pending = Some(SourcePos { segment, offset });
                    }
                    continue;
                }
                if let Some(ws) = pending.take() {
                    if !text.is_empty() {
                        text.push(' ');
                        map.push(ws);
                    }
                }
                text.push(ch);
                map.push(SourcePos { segment, offset });
            }
        }
        // A dangling whitespace run is the trailing trim.

        Self { text, map }
    }

    pub fn over_text(raw: &str) -> Self {
        Self::over_segments(&[raw])
    }

    /// Map a span over the normalised text back to per-segment raw ranges,
    /// in segment order. Raw characters collapsed away between two mapped
    /// positions of the same segment are included, so deleting the returned
    /// ranges removes the whole matched stretch.
    pub fn segment_ranges(&self, span: Span) -> Vec<SegmentSlice> {
        let mut out: Vec<SegmentSlice> = Vec::new();
        for pos in &self.map[span.start.min(self.map.len())..span.end.min(self.map.len())] {
            match out.last_mut() {
                Some(last) if last.segment == pos.segment => {
                    last.start = last.start.min(pos.offset);
                    last.end = last.end.max(pos.offset + 1);
                }
                _ => out.push(SegmentSlice {
                    segment: pos.segment,
                    start: pos.offset,
                    end: pos.offset + 1,
                }),
            }
        }
        out
    }

    /// Normalised slice at `span`, in code points.
    pub fn slice(&self, span: Span) -> String {
        scrub_core::text::char_slice(&self.text, span.start, span.end).to_string()
    }

    /// Code-point length of the normalised text.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Normalise a single raw string (NBSP → space, collapse whitespace, trim).
pub fn normalize_text(raw: &str) -> String {
    Projection::over_text(raw).text
}

// ---------------------------------------------------------------------------
// Table projection
// ---------------------------------------------------------------------------

/// One cell's range inside a table block's projected text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub row: usize,
    pub col: usize,
    /// Code-point interval of the cell's text within the table projection.
    pub start: usize,
    pub end: usize,
}

/// Build the table text contract from per-cell normalised texts: cells of a
/// row joined with `" | "`, every row terminated by `"\n"`. Returns the
/// projected text and each cell's code-point range.
pub fn project_table(rows: &[Vec<String>]) -> (String, Vec<CellRange>) {
    let mut text = String::new();
    let mut ranges = Vec::new();
    let mut cursor = 0usize;

    for (row, cells) in rows.iter().enumerate() {
        for (col, cell) in cells.iter().enumerate() {
            if col > 0 {
                text.push_str(" | ");
                cursor += 3;
            }
            let len = cell.chars().count();
            ranges.push(CellRange {
                row,
                col,
                start: cursor,
                end: cursor + len,
            });
            text.push_str(cell);
            cursor += len;
        }
        text.push('\n');
        cursor += 1;
    }

    (text, ranges)
}
