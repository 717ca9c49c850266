use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BlockKind
// ---------------------------------------------------------------------------

/// Structural origin of a text block within the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Table,
    Header,
    Footer,
    HeaderSdt,
    FooterSdt,
}

impl BlockKind {
    /// Return the canonical snake_case string representation of this variant.
    ///
    /// This is also the `block_type` value sent over the NLP wire protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::Table => "table",
            BlockKind::Header => "header",
            BlockKind::Footer => "footer",
            BlockKind::HeaderSdt => "header_sdt",
            BlockKind::FooterSdt => "footer_sdt",
        }
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ElementRef
// ---------------------------------------------------------------------------

/// Index of a node inside one document part's XML arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Which package part owns a referenced element.
///
/// Header/footer indices address the package's part list in discovery order,
/// not the display section number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocPart {
    Body,
    Header(usize),
    Footer(usize),
}

/// Closed set of element shapes the applier dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Paragraph,
    Table,
    Sdt,
}

/// Opaque handle from a block back to the structural element that produced
/// it. Resolved against the owning part's arena by the applier; blocks never
/// borrow the document model directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    pub part: DocPart,
    pub node: NodeId,
    pub kind: ElementKind,
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A unit of extracted text together with its element handle.
///
/// `text` is the normalised plain-text projection of the element; all
/// detection spans are code-point offsets into it. One element produces at
/// most one block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Unique within a document; the format encodes the origin, e.g.
    /// `paragraph_3`, `table_0`, `header_1_0`, `footer_sdt_2_1`.
    pub id: String,
    pub kind: BlockKind,
    pub text: String,
    pub element: ElementRef,
}

impl Block {
    pub fn new(id: impl Into<String>, kind: BlockKind, text: impl Into<String>, element: ElementRef) -> Self {
        Self {
            id: id.into(),
            kind,
            text: text.into(),
            element,
        }
    }
}

/// Compose a block id from its kind, optional section number, and ordinal.
///
/// Body blocks (`paragraph_<i>`, `table_<i>`) carry no section; header and
/// footer blocks embed the section number between kind and ordinal.
pub fn block_id(kind: BlockKind, section: Option<usize>, ordinal: usize) -> String {
    match section {
        Some(sec) => format!("{}_{}_{}", kind.as_str(), sec, ordinal),
        None => format!("{}_{}", kind.as_str(), ordinal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_kind_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&BlockKind::HeaderSdt).unwrap(),
            "\"header_sdt\""
        );
        assert_eq!(
            serde_json::to_string(&BlockKind::Paragraph).unwrap(),
            "\"paragraph\""
        );
    }

    #[test]
    fn block_id_formats() {
        assert_eq!(block_id(BlockKind::Paragraph, None, 4), "paragraph_4");
        assert_eq!(block_id(BlockKind::Table, None, 0), "table_0");
        assert_eq!(block_id(BlockKind::Header, Some(1), 2), "header_1_2");
        assert_eq!(block_id(BlockKind::FooterSdt, Some(3), 0), "footer_sdt_3_0");
    }

    #[test]
    fn block_round_trips_json() {
        let b = Block::new(
            "paragraph_0",
            BlockKind::Paragraph,
            "Иванов И. И. подписал",
            ElementRef {
                part: DocPart::Body,
                node: NodeId(7),
                kind: ElementKind::Paragraph,
            },
        );
        let json = serde_json::to_string(&b).expect("serialize");
        let b2: Block = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(b2.id, "paragraph_0");
        assert_eq!(b2.element.node, NodeId(7));
        assert_eq!(b2.text, b.text);
    }

    #[test]
    fn element_ref_distinguishes_parts() {
        let body = ElementRef {
            part: DocPart::Body,
            node: NodeId(0),
            kind: ElementKind::Paragraph,
        };
        let hdr = ElementRef {
            part: DocPart::Header(0),
            node: NodeId(0),
            kind: ElementKind::Paragraph,
        };
        assert_ne!(body, hdr);
    }
}
