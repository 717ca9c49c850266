//! Block extraction: one reading-order traversal of the package producing a
//! flat, ordered list of addressable text blocks.
//!
//! Traversal order is stable: body paragraphs, body tables, then for each
//! header/footer part its paragraphs followed by its SDT subtrees. Every
//! block's text goes through [`crate::project`], the same projection the
//! applier re-runs, so detection spans always line up.

use tracing::debug;

use scrub_core::{block_id, Block, BlockKind, DocPart, ElementKind, ElementRef, NodeId};

use crate::package::DocxPackage;
use crate::project::{normalize_text, project_table, Projection};
use crate::xml::XmlTree;

/// Flatten `pkg` into blocks. Empty documents yield an empty list.
pub fn build_blocks(pkg: &DocxPackage) -> Vec<Block> {
    let mut blocks = Vec::new();

    let body = body_node(&pkg.document);

    // Body paragraphs.
    if let Some(body) = body {
        let mut ordinal = 0usize;
        for p in pkg.document.descendant_elements_named(body, "p") {
            if pkg.document.has_ancestor_named(p, "tbl") {
                continue; // table cell paragraphs belong to their table block
            }
            let text = paragraph_projection(&pkg.document, p).text;
            if text.is_empty() {
                continue;
            }
            blocks.push(Block::new(
                block_id(BlockKind::Paragraph, None, ordinal),
                BlockKind::Paragraph,
                text,
                ElementRef {
                    part: DocPart::Body,
                    node: p,
                    kind: ElementKind::Paragraph,
                },
            ));
            ordinal += 1;
        }

        // Body tables.
        let mut ordinal = 0usize;
        for tbl in pkg.document.descendant_elements_named(body, "tbl") {
            if pkg.document.has_ancestor_named(tbl, "tbl") {
                continue; // nested tables flatten into the outer block
            }
            let (text, _) = project_table(&table_cells(&pkg.document, tbl));
            if text.trim().is_empty() {
                continue;
            }
            blocks.push(Block::new(
                block_id(BlockKind::Table, None, ordinal),
                BlockKind::Table,
                text,
                ElementRef {
                    part: DocPart::Body,
                    node: tbl,
                    kind: ElementKind::Table,
                },
            ));
            ordinal += 1;
        }
    }

    // Headers and footers, per section.
    for (index, part) in pkg.headers.iter().enumerate() {
        collect_part_blocks(
            &mut blocks,
            &part.tree,
            DocPart::Header(index),
            BlockKind::Header,
            BlockKind::HeaderSdt,
            part.section,
        );
    }
    for (index, part) in pkg.footers.iter().enumerate() {
        collect_part_blocks(
            &mut blocks,
            &part.tree,
            DocPart::Footer(index),
            BlockKind::Footer,
            BlockKind::FooterSdt,
            part.section,
        );
    }

    debug!(blocks = blocks.len(), "document flattened");
    blocks
}

/// Paragraphs (outside SDTs) then SDT subtrees of one header/footer part.
fn collect_part_blocks(
    blocks: &mut Vec<Block>,
    tree: &XmlTree,
    part: DocPart,
    para_kind: BlockKind,
    sdt_kind: BlockKind,
    section: usize,
) {
    let root = tree.root();

    let mut ordinal = 0usize;
    for p in tree.descendant_elements_named(root, "p") {
        if tree.has_ancestor_named(p, "sdt") {
            continue; // emitted as part of the sdt block
        }
        let text = paragraph_projection(tree, p).text;
        if text.is_empty() {
            continue;
        }
        blocks.push(Block::new(
            block_id(para_kind, Some(section), ordinal),
            para_kind,
            text,
            ElementRef {
                part,
                node: p,
                kind: ElementKind::Paragraph,
            },
        ));
        ordinal += 1;
    }

    let mut ordinal = 0usize;
    for sdt in tree.descendant_elements_named(root, "sdt") {
        if tree.has_ancestor_named(sdt, "sdt") {
            continue; // nested tags flatten into the outermost block
        }
        let text = sdt_projection(tree, sdt).text;
        if text.is_empty() {
            continue;
        }
        blocks.push(Block::new(
            block_id(sdt_kind, Some(section), ordinal),
            sdt_kind,
            text,
            ElementRef {
                part,
                node: sdt,
                kind: ElementKind::Sdt,
            },
        ));
        ordinal += 1;
    }
}

// ---------------------------------------------------------------------------
// Element projections (shared with the applier)
// ---------------------------------------------------------------------------

/// The `w:body` element of the main document part.
pub fn body_node(tree: &XmlTree) -> Option<NodeId> {
    tree.child_elements_named(tree.root(), "body")
        .into_iter()
        .next()
}

/// Direct runs of a paragraph, in order.
pub fn paragraph_runs(tree: &XmlTree, paragraph: NodeId) -> Vec<NodeId> {
    tree.child_elements_named(paragraph, "r")
}

/// Raw (un-normalised) text of one run: its `w:t` children concatenated.
pub fn run_text(tree: &XmlTree, run: NodeId) -> String {
    let mut out = String::new();
    for t in tree.child_elements_named(run, "t") {
        out.push_str(&tree.element_text(t));
    }
    out
}

/// Normalised projection of a paragraph over its runs.
pub fn paragraph_projection(tree: &XmlTree, paragraph: NodeId) -> Projection {
    let texts: Vec<String> = paragraph_runs(tree, paragraph)
        .into_iter()
        .map(|r| run_text(tree, r))
        .collect();
    Projection::over_segments(&texts)
}

/// Normalised projection of an SDT subtree over its descendant `w:t` nodes.
pub fn sdt_projection(tree: &XmlTree, sdt: NodeId) -> Projection {
    let texts: Vec<String> = tree
        .descendant_elements_named(sdt, "t")
        .into_iter()
        .map(|t| tree.element_text(t))
        .collect();
    Projection::over_segments(&texts)
}

/// Per-row, per-cell normalised texts of a table. A cell with several
/// paragraphs joins their normalised texts with a single space.
pub fn table_cells(tree: &XmlTree, table: NodeId) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for tr in tree.child_elements_named(table, "tr") {
        let mut cells = Vec::new();
        for tc in tree.child_elements_named(tr, "tc") {
            let paragraphs: Vec<String> = tree
                .descendant_elements_named(tc, "p")
                .into_iter()
                .map(|p| paragraph_projection(tree, p).text)
                .filter(|t| !t.is_empty())
                .collect();
            cells.push(normalize_text(&paragraphs.join(" ")));
        }
        rows.push(cells);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::DOCUMENT_PART;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    fn docx(parts: &[(&str, String)]) -> DocxPackage {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in parts {
            writer.start_file(*name, options).expect("start file");
            writer.write_all(data.as_bytes()).expect("write");
        }
        let bytes = writer.finish().expect("finish").into_inner();
        DocxPackage::from_reader(Cursor::new(bytes)).expect("open")
    }

    fn document_xml(body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><w:document xmlns:w=\"{W_NS}\"><w:body>{body}</w:body></w:document>"
        )
    }

    fn para(runs: &[&str]) -> String {
        let runs: String = runs
            .iter()
            .map(|t| format!("<w:r><w:t>{t}</w:t></w:r>"))
            .collect();
        format!("<w:p>{runs}</w:p>")
    }

    #[test]
    fn body_paragraphs_in_order() {
        let body = format!("{}{}", para(&["Первый"]), para(&["Второй"]));
        let pkg = docx(&[(DOCUMENT_PART, document_xml(&body))]);
        let blocks = build_blocks(&pkg);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].id, "paragraph_0");
        assert_eq!(blocks[0].text, "Первый");
        assert_eq!(blocks[1].id, "paragraph_1");
        assert_eq!(blocks[1].text, "Второй");
    }

    #[test]
    fn empty_paragraphs_are_skipped() {
        let body = format!("{}<w:p/>{}", para(&["a"]), para(&["  "]));
        let pkg = docx(&[(DOCUMENT_PART, document_xml(&body))]);
        let blocks = build_blocks(&pkg);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, "paragraph_0");
    }

    #[test]
    fn multi_run_paragraph_concatenates() {
        let body = para(&["Мини", "стерство ", "связи"]);
        let pkg = docx(&[(DOCUMENT_PART, document_xml(&body))]);
        let blocks = build_blocks(&pkg);
        assert_eq!(blocks[0].text, "Министерство связи");
    }

    #[test]
    fn nbsp_and_runs_of_whitespace_normalise() {
        let body = para(&["ИНН:\u{00A0}\u{00A0}770", "1234567  "]);
        let pkg = docx(&[(DOCUMENT_PART, document_xml(&body))]);
        let blocks = build_blocks(&pkg);
        assert_eq!(blocks[0].text, "ИНН: 7701234567");
    }

    #[test]
    fn table_block_uses_cell_row_encoding() {
        let table = "<w:tbl>\
            <w:tr><w:tc><w:p><w:r><w:t>ИНН</w:t></w:r></w:p></w:tc>\
                  <w:tc><w:p><w:r><w:t>7701234567</w:t></w:r></w:p></w:tc></w:tr>\
            <w:tr><w:tc><w:p><w:r><w:t>КПП</w:t></w:r></w:p></w:tc>\
                  <w:tc><w:p><w:r><w:t>770101001</w:t></w:r></w:p></w:tc></w:tr>\
            </w:tbl>";
        let pkg = docx(&[(DOCUMENT_PART, document_xml(table))]);
        let blocks = build_blocks(&pkg);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, "table_0");
        assert_eq!(blocks[0].text, "ИНН | 7701234567\nКПП | 770101001\n");
    }

    #[test]
    fn table_cell_paragraphs_join_with_space() {
        let table = "<w:tbl><w:tr><w:tc>\
            <w:p><w:r><w:t>Общество</w:t></w:r></w:p>\
            <w:p><w:r><w:t>Ромашка</w:t></w:r></w:p>\
            </w:tc></w:tr></w:tbl>";
        let pkg = docx(&[(DOCUMENT_PART, document_xml(table))]);
        let blocks = build_blocks(&pkg);
        assert_eq!(blocks[0].text, "Общество Ромашка\n");
    }

    #[test]
    fn table_paragraphs_do_not_double_as_paragraph_blocks() {
        let body = format!(
            "{}<w:tbl><w:tr><w:tc><w:p><w:r><w:t>в таблице</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
            para(&["снаружи"])
        );
        let pkg = docx(&[(DOCUMENT_PART, document_xml(&body))]);
        let blocks = build_blocks(&pkg);
        let ids: Vec<&str> = blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["paragraph_0", "table_0"]);
        assert_eq!(blocks[0].text, "снаружи");
    }

    #[test]
    fn header_paragraphs_and_sdt_blocks() {
        let hdr = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><w:hdr xmlns:w=\"{W_NS}\">\
             {}\
             <w:sdt><w:sdtContent><w:r><w:t>ЕИСУФХД</w:t></w:r><w:r><w:t>.13/ОК-2023</w:t></w:r></w:sdtContent></w:sdt>\
             </w:hdr>",
            para(&["Шапка"])
        );
        let pkg = docx(&[
            (DOCUMENT_PART, document_xml(&para(&["тело"]))),
            ("word/header1.xml", hdr),
        ]);
        let blocks = build_blocks(&pkg);
        let ids: Vec<&str> = blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["paragraph_0", "header_1_0", "header_sdt_1_0"]);
        assert_eq!(blocks[2].text, "ЕИСУФХД.13/ОК-2023");
        assert_eq!(blocks[1].text, "Шапка");
    }

    #[test]
    fn sdt_paragraphs_do_not_double_as_header_blocks() {
        let hdr = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><w:hdr xmlns:w=\"{W_NS}\">\
             <w:sdt><w:sdtContent><w:p><w:r><w:t>внутри тега</w:t></w:r></w:p></w:sdtContent></w:sdt>\
             </w:hdr>"
        );
        let pkg = docx(&[
            (DOCUMENT_PART, document_xml(&para(&["тело"]))),
            ("word/header1.xml", hdr),
        ]);
        let blocks = build_blocks(&pkg);
        let ids: Vec<&str> = blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["paragraph_0", "header_sdt_1_0"]);
    }

    #[test]
    fn footer_blocks_use_footer_kinds() {
        let ftr = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><w:ftr xmlns:w=\"{W_NS}\">{}</w:ftr>",
            para(&["Подвал"])
        );
        let pkg = docx(&[
            (DOCUMENT_PART, document_xml(&para(&["тело"]))),
            ("word/footer2.xml", ftr),
        ]);
        let blocks = build_blocks(&pkg);
        assert_eq!(blocks[1].id, "footer_2_0");
        assert_eq!(blocks[1].kind, BlockKind::Footer);
    }

    #[test]
    fn empty_document_yields_no_blocks() {
        let pkg = docx(&[(DOCUMENT_PART, document_xml(""))]);
        assert!(build_blocks(&pkg).is_empty());
    }
}
