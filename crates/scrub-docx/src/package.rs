//! OOXML container IO.
//!
//! A package retains every archive entry as raw bytes in original order and
//! parses only the parts the pipeline touches: `word/document.xml` and every
//! `word/header*.xml` / `word/footer*.xml`. Saving re-serialises the parsed
//! parts and writes all entries back, so styles, numbering, relationships
//! and media round-trip untouched.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use tracing::debug;
use zip::write::SimpleFileOptions;

use scrub_core::{Result, ScrubError};

use crate::xml::XmlTree;

pub const DOCUMENT_PART: &str = "word/document.xml";

// ---------------------------------------------------------------------------
// DocPartFile
// ---------------------------------------------------------------------------

/// One parsed header or footer part.
#[derive(Debug, Clone)]
pub struct DocPartFile {
    /// Archive entry name, e.g. `word/header2.xml`.
    pub name: String,
    /// Section number: the numeric suffix of the file name when present
    /// (`header3.xml` → 3), else the 1-based discovery ordinal.
    pub section: usize,
    pub tree: XmlTree,
}

// ---------------------------------------------------------------------------
// DocxPackage
// ---------------------------------------------------------------------------

/// An opened word-processing container.
#[derive(Debug, Clone)]
pub struct DocxPackage {
    /// Entry names in original archive order.
    entry_order: Vec<String>,
    /// Raw bytes of every entry.
    entries: HashMap<String, Vec<u8>>,
    pub document: XmlTree,
    pub headers: Vec<DocPartFile>,
    pub footers: Vec<DocPartFile>,
}

impl DocxPackage {
    /// Open a package from a file path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Open a package from any seekable reader (in-memory buffers in tests).
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(reader)
            .map_err(|e| ScrubError::invalid_document("<archive>", e))?;

        let mut entry_order = Vec::new();
        let mut entries = HashMap::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| ScrubError::invalid_document("<archive>", e))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| ScrubError::invalid_document(name.clone(), e))?;
            entry_order.push(name.clone());
            entries.insert(name, data);
        }

        let document = parse_part(&entries, DOCUMENT_PART)?
            .ok_or_else(|| ScrubError::MissingPart(DOCUMENT_PART.to_string()))?;

        let headers = collect_parts(&entries, "word/header")?;
        let footers = collect_parts(&entries, "word/footer")?;
        debug!(
            parts = entry_order.len(),
            headers = headers.len(),
            footers = footers.len(),
            "package opened"
        );

        Ok(Self {
            entry_order,
            entries,
            document,
            headers,
            footers,
        })
    }

    /// Names of all entries in original order.
    pub fn part_names(&self) -> &[String] {
        &self.entry_order
    }

    /// Resolve a header/footer arena by list index.
    pub fn header(&self, index: usize) -> Option<&DocPartFile> {
        self.headers.get(index)
    }

    pub fn footer(&self, index: usize) -> Option<&DocPartFile> {
        self.footers.get(index)
    }

    /// Serialise the package to `path`, re-encoding the parsed parts and
    /// copying all other entries verbatim. A partially written file is
    /// removed on error; the source archive is never touched.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let result = self.save_inner(path);
        if result.is_err() {
            let _ = std::fs::remove_file(path);
        }
        result
    }

    fn save_inner(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for name in &self.entry_order {
            let data = self
                .serialized_part(name)
                .or_else(|| self.entries.get(name).cloned())
                .ok_or_else(|| ScrubError::Internal(format!("lost package entry {name}")))?;
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| ScrubError::Output(format!("cannot write {name}: {e}")))?;
            writer.write_all(&data)?;
        }
        writer
            .finish()
            .map_err(|e| ScrubError::Output(format!("cannot finalise archive: {e}")))?;
        Ok(())
    }

    /// Current XML bytes for a parsed part, `None` for pass-through entries.
    fn serialized_part(&self, name: &str) -> Option<Vec<u8>> {
        if name == DOCUMENT_PART {
            return Some(self.document.to_xml().into_bytes());
        }
        if let Some(part) = self.headers.iter().find(|p| p.name == name) {
            return Some(part.tree.to_xml().into_bytes());
        }
        if let Some(part) = self.footers.iter().find(|p| p.name == name) {
            return Some(part.tree.to_xml().into_bytes());
        }
        None
    }
}

fn parse_part(entries: &HashMap<String, Vec<u8>>, name: &str) -> Result<Option<XmlTree>> {
    let Some(data) = entries.get(name) else {
        return Ok(None);
    };
    let content = std::str::from_utf8(data)
        .map_err(|e| ScrubError::invalid_document(name.to_string(), e))?;
    Ok(Some(XmlTree::parse(content, name)?))
}

/// Parse every `word/header*.xml` (or footer) part, ordered by entry name.
fn collect_parts(entries: &HashMap<String, Vec<u8>>, prefix: &str) -> Result<Vec<DocPartFile>> {
    let mut names: Vec<&String> = entries
        .keys()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .collect();
    names.sort();

    let mut parts = Vec::new();
    for (ordinal, name) in names.into_iter().enumerate() {
        let tree = parse_part(entries, name)?
            .ok_or_else(|| ScrubError::MissingPart(name.clone()))?;
        let section = name
            .trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<usize>()
            .unwrap_or(ordinal + 1);
        parts.push(DocPartFile {
            name: name.clone(),
            section,
            tree,
        });
    }
    Ok(parts)
}
