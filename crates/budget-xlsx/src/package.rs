use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use thiserror::Error;
use zip::write::FileOptions;
use zip::ZipArchive;

use crate::openxml::resolve_relationship_target;
use crate::sheet_metadata::{parse_active_tab, parse_workbook_sheets, WorkbookSheetInfo};
use crate::worksheet::{read_worksheet_cells, SheetCells};
use crate::shared_strings::parse_shared_strings_xml;

/// Maximum uncompressed size permitted for any single part inflated into memory.
///
/// ZIP metadata is untrusted; a forged `uncompressed_size` must not drive allocation.
pub const MAX_PART_BYTES: u64 = 256 * 1024 * 1024;

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";
pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub(crate) const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml error: {0}")]
    RoXml(#[from] roxmltree::Error),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("missing required attribute: {0}")]
    MissingAttr(&'static str),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("unknown sheet name: {0}")]
    UnknownSheet(String),
    #[error("sheet already exists: {0}")]
    DuplicateSheet(String),
    #[error("xlsx package part is too large to load safely: {part} exceeds {max} bytes")]
    PartTooLarge { part: String, max: u64 },
    #[error("invalid sheetId value")]
    InvalidSheetId,
    #[error("invalid xlsx: {0}")]
    Invalid(String),
}

/// An in-memory XLSX package: every ZIP entry keyed by its part name.
///
/// Parts that are never touched are written back byte-for-byte, so charts, styles, defined
/// names and anything else this crate does not understand survive a round trip.
#[derive(Debug, Clone, Default)]
pub struct XlsxPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;

        let mut parts = BTreeMap::new();
        for i in 0..zip.len() {
            let file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }
            let name = file.name().to_string();
            let mut buf = Vec::new();
            file.take(MAX_PART_BYTES + 1).read_to_end(&mut buf)?;
            if buf.len() as u64 > MAX_PART_BYTES {
                return Err(XlsxError::PartTooLarge {
                    part: name,
                    max: MAX_PART_BYTES,
                });
            }
            parts.insert(name, buf);
        }

        if !parts.contains_key(WORKBOOK_PART) {
            return Err(XlsxError::MissingPart(WORKBOOK_PART.to_string()));
        }

        log::debug!("loaded xlsx package with {} parts", parts.len());
        Ok(Self { parts })
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        let name = name.strip_prefix('/').unwrap_or(name);
        self.parts.get(name).map(Vec::as_slice)
    }

    pub fn set_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.parts.insert(name.into(), bytes);
    }

    pub(crate) fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        self.parts.remove(name)
    }

    /// Parse the ordered list of workbook sheets from `xl/workbook.xml`.
    pub fn workbook_sheets(&self) -> Result<Vec<WorkbookSheetInfo>, XlsxError> {
        let workbook_xml = self
            .part(WORKBOOK_PART)
            .ok_or_else(|| XlsxError::MissingPart(WORKBOOK_PART.to_string()))?;
        parse_workbook_sheets(workbook_xml)
    }

    pub fn sheet_names(&self) -> Result<Vec<String>, XlsxError> {
        Ok(self
            .workbook_sheets()?
            .into_iter()
            .map(|sheet| sheet.name)
            .collect())
    }

    /// Name of the sheet selected when the workbook was last saved (`workbookView/@activeTab`).
    pub fn active_sheet_name(&self) -> Result<String, XlsxError> {
        let workbook_xml = self
            .part(WORKBOOK_PART)
            .ok_or_else(|| XlsxError::MissingPart(WORKBOOK_PART.to_string()))?;
        let sheets = parse_workbook_sheets(workbook_xml)?;
        let active = parse_active_tab(workbook_xml)?;
        sheets
            .get(active)
            .or_else(|| sheets.first())
            .map(|sheet| sheet.name.clone())
            .ok_or_else(|| XlsxError::Invalid("workbook has no sheets".to_string()))
    }

    /// Resolve a sheet (tab) name to the ZIP entry holding its worksheet XML.
    pub fn worksheet_part(&self, sheet_name: &str) -> Result<String, XlsxError> {
        let sheets = self.workbook_sheets()?;
        let sheet = sheets
            .iter()
            .find(|s| s.name == sheet_name)
            .ok_or_else(|| XlsxError::UnknownSheet(sheet_name.to_string()))?;
        resolve_relationship_target(self, WORKBOOK_PART, &sheet.rel_id)?.ok_or_else(|| {
            XlsxError::Invalid(format!("missing worksheet relationship for {sheet_name}"))
        })
    }

    /// Read every populated cell of a worksheet.
    pub fn read_sheet(&self, sheet_name: &str) -> Result<SheetCells, XlsxError> {
        let part = self.worksheet_part(sheet_name)?;
        let xml = self
            .part(&part)
            .ok_or_else(|| XlsxError::MissingPart(part.clone()))?;
        let shared_strings = match self.part(SHARED_STRINGS_PART) {
            Some(bytes) => parse_shared_strings_xml(bytes)?,
            None => Vec::new(),
        };
        read_worksheet_cells(xml, &shared_strings)
    }

    pub fn write_to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), XlsxError> {
        let cursor = Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(cursor);
        let options =
            FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

        // BTreeMap order puts `[Content_Types].xml` ahead of `_rels/` and the lowercase folders.
        for (name, bytes) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        let cursor = zip.finish()?;
        w.write_all(&cursor.into_inner())?;
        Ok(())
    }
}
