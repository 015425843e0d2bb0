//! Part-preserving cell edits.
//!
//! [`WorkbookCellPatches`] collects cell writes keyed by sheet name and applies them to an
//! existing [`XlsxPackage`] by stream-rewriting only the affected worksheet parts (plus
//! `sharedStrings.xml` and `workbook.xml` when needed). Rows and cells that are not patched are
//! copied through event by event, so styles, merged ranges and unknown markup survive.

use std::collections::BTreeMap;

use budget_model::{datetime_to_serial, CellRef, CellValue};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::openxml::{
    element_prefix, escape_attr, escape_text, local_name, parse_relationships, rels_part_name,
};
use crate::package::{CONTENT_TYPES_PART, SHARED_STRINGS_PART, WORKBOOK_PART};
use crate::shared_formula::detach_shared_formulas;
use crate::shared_strings::{needs_space_preserve, SharedStringsState};
use crate::{XlsxError, XlsxPackage};

const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

/// Cell edits to apply to an existing workbook package, keyed by worksheet (tab) name.
#[derive(Debug, Clone, Default)]
pub struct WorkbookCellPatches {
    sheets: BTreeMap<String, WorksheetCellPatches>,
}

impl WorkbookCellPatches {
    pub fn is_empty(&self) -> bool {
        self.sheets.values().all(WorksheetCellPatches::is_empty)
    }

    /// Total number of patched cells across all sheets.
    pub fn len(&self) -> usize {
        self.sheets.values().map(WorksheetCellPatches::len).sum()
    }

    pub fn sheet_mut(&mut self, sheet_name: impl Into<String>) -> &mut WorksheetCellPatches {
        self.sheets.entry(sheet_name.into()).or_default()
    }

    /// Insert or replace the patch for a single cell.
    pub fn set_cell(&mut self, sheet_name: impl Into<String>, cell: CellRef, patch: CellPatch) {
        self.sheet_mut(sheet_name).set_cell(cell, patch);
    }

    fn sheets(&self) -> impl Iterator<Item = (&str, &WorksheetCellPatches)> {
        self.sheets
            .iter()
            .map(|(name, patches)| (name.as_str(), patches))
    }
}

/// Cell edits within a single worksheet, ordered row-major.
#[derive(Debug, Clone, Default)]
pub struct WorksheetCellPatches {
    cells: BTreeMap<CellRef, CellPatch>,
}

impl WorksheetCellPatches {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn set_cell(&mut self, cell: CellRef, patch: CellPatch) {
        self.cells.insert(cell, patch);
    }

    pub fn get(&self, cell: CellRef) -> Option<&CellPatch> {
        self.cells.get(&cell)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellRef, &CellPatch)> {
        self.cells.iter().map(|(cell, patch)| (*cell, patch))
    }

    /// Patches grouped by 1-based row number, columns ascending.
    fn by_row(&self) -> BTreeMap<u32, Vec<(u32, &CellPatch)>> {
        let mut out: BTreeMap<u32, Vec<(u32, &CellPatch)>> = BTreeMap::new();
        for (cell, patch) in &self.cells {
            out.entry(cell.row + 1).or_default().push((cell.col, patch));
        }
        out
    }

    fn has_formula(&self) -> bool {
        self.cells.values().any(CellPatch::has_formula)
    }
}

/// A single cell write.
#[derive(Debug, Clone, PartialEq)]
pub enum CellPatch {
    Set {
        value: CellValue,
        /// Written as an `<f>` element; a leading `=` is stripped.
        formula: Option<String>,
    },
}

impl CellPatch {
    pub fn set_value(value: impl Into<CellValue>) -> Self {
        Self::Set {
            value: value.into(),
            formula: None,
        }
    }

    /// A formula cell without a cached value; the workbook is flagged for a full recalculation.
    pub fn set_formula(formula: impl Into<String>) -> Self {
        Self::Set {
            value: CellValue::Empty,
            formula: Some(formula.into()),
        }
    }

    pub fn has_formula(&self) -> bool {
        matches!(
            self,
            CellPatch::Set {
                formula: Some(_),
                ..
            }
        )
    }
}

impl XlsxPackage {
    /// Apply `patches` in place.
    ///
    /// When any formula is written or overwritten, `xl/calcChain.xml` is dropped and
    /// `fullCalcOnLoad` is set so the consuming application recomputes every formula. Shared
    /// formula groups that hold a patched cell are expanded into plain formulas first.
    pub fn apply_cell_patches(&mut self, patches: &WorkbookCellPatches) -> Result<(), XlsxError> {
        if patches.is_empty() {
            return Ok(());
        }

        let mut shared_strings = self
            .part(SHARED_STRINGS_PART)
            .map(SharedStringsState::from_part)
            .transpose()?;

        let mut any_formula_changed = false;
        for (sheet_name, sheet_patches) in patches.sheets() {
            if sheet_patches.is_empty() {
                continue;
            }
            let worksheet_part = self.worksheet_part(sheet_name)?;
            let original = self
                .part(&worksheet_part)
                .ok_or_else(|| XlsxError::MissingPart(worksheet_part.clone()))?;

            let detached =
                detach_shared_formulas(original, sheet_patches.iter().map(|(cell, _)| cell))?;
            let source = detached.as_deref().unwrap_or(original);

            let (updated, formula_changed) =
                patch_worksheet_xml(source, sheet_patches, shared_strings.as_mut())?;
            log::debug!(
                "patched {} cells in {worksheet_part} (sheet {sheet_name:?})",
                sheet_patches.len()
            );
            any_formula_changed |= formula_changed;
            self.set_part(worksheet_part, updated);
        }

        if let Some(updated) = shared_strings
            .as_ref()
            .map(SharedStringsState::write_if_dirty)
            .transpose()?
            .flatten()
        {
            self.set_part(SHARED_STRINGS_PART, updated);
        }

        if any_formula_changed {
            self.drop_calc_chain()?;
            ensure_workbook_full_calc_on_load(self)?;
        }

        Ok(())
    }

    /// Remove `xl/calcChain.xml` together with its relationship and content-type override.
    fn drop_calc_chain(&mut self) -> Result<(), XlsxError> {
        if self.remove_part(CALC_CHAIN_PART).is_none() {
            return Ok(());
        }
        log::debug!("dropped {CALC_CHAIN_PART} after formula edits");

        let rels_name = rels_part_name(WORKBOOK_PART);
        if let Some(rels) = self.part(&rels_name) {
            let calc_ids: Vec<String> = parse_relationships(rels)?
                .into_iter()
                .filter(|rel| rel.target.trim_start_matches('/').ends_with("calcChain.xml"))
                .map(|rel| rel.id)
                .collect();
            if !calc_ids.is_empty() {
                let updated = remove_elements(rels, b"Relationship", |attrs| {
                    attrs
                        .iter()
                        .any(|(k, v)| k == "Id" && calc_ids.iter().any(|id| id == v))
                })?;
                self.set_part(rels_name, updated);
            }
        }

        if let Some(ct) = self.part(CONTENT_TYPES_PART) {
            let updated = remove_elements(ct, b"Override", |attrs| {
                attrs
                    .iter()
                    .any(|(k, v)| k == "PartName" && v == "/xl/calcChain.xml")
            })?;
            self.set_part(CONTENT_TYPES_PART, updated);
        }
        Ok(())
    }
}

fn patch_worksheet_xml(
    original: &[u8],
    patches: &WorksheetCellPatches,
    mut shared_strings: Option<&mut SharedStringsState>,
) -> Result<(Vec<u8>, bool), XlsxError> {
    // Writing a formula is always a formula change; replacing one is detected per cell.
    let mut formula_changed = patches.has_formula();

    let row_patches = patches.by_row();
    let pending_rows: Vec<u32> = row_patches.keys().copied().collect();
    let mut next_pending = 0usize;

    let mut reader = Reader::from_reader(original);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + patches.len() * 64));

    let mut buf = Vec::new();
    let mut saw_sheet_data = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                writer.write_event(Event::Start(e.into_owned()))?;
                formula_changed |= patch_sheet_data(
                    &mut reader,
                    &mut writer,
                    &row_patches,
                    &pending_rows,
                    &mut next_pending,
                    &mut shared_strings,
                )?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                let end = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(e.into_owned()))?;
                for row in &pending_rows[next_pending..] {
                    write_new_row(&mut writer, *row, &row_patches[row], &mut shared_strings)?;
                }
                next_pending = pending_rows.len();
                writer.write_event(Event::End(BytesEnd::new(end)))?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"worksheet" => {
                if !saw_sheet_data {
                    writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
                    for row in &pending_rows[next_pending..] {
                        write_new_row(&mut writer, *row, &row_patches[row], &mut shared_strings)?;
                    }
                    next_pending = pending_rows.len();
                    writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok((writer.into_inner(), formula_changed))
}

fn flush_rows_before(
    writer: &mut Writer<Vec<u8>>,
    limit: u32,
    row_patches: &BTreeMap<u32, Vec<(u32, &CellPatch)>>,
    pending_rows: &[u32],
    next_pending: &mut usize,
    shared_strings: &mut Option<&mut SharedStringsState>,
) -> Result<(), XlsxError> {
    while *next_pending < pending_rows.len() && pending_rows[*next_pending] < limit {
        let row = pending_rows[*next_pending];
        write_new_row(writer, row, &row_patches[&row], shared_strings)?;
        *next_pending += 1;
    }
    Ok(())
}

fn patch_sheet_data<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    row_patches: &BTreeMap<u32, Vec<(u32, &CellPatch)>>,
    pending_rows: &[u32],
    next_pending: &mut usize,
    shared_strings: &mut Option<&mut SharedStringsState>,
) -> Result<bool, XlsxError> {
    let mut buf = Vec::new();
    let mut formula_changed = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"row" => {
                let row_start = e.into_owned();
                let Some(row_num) = parse_row_r(&row_start)? else {
                    writer.write_event(Event::Start(row_start))?;
                    buf.clear();
                    continue;
                };
                flush_rows_before(
                    writer,
                    row_num,
                    row_patches,
                    pending_rows,
                    next_pending,
                    shared_strings,
                )?;

                writer.write_event(Event::Start(row_start))?;
                if let Some(cells) = row_patches.get(&row_num) {
                    if pending_rows.get(*next_pending) == Some(&row_num) {
                        *next_pending += 1;
                    }
                    formula_changed |= patch_row(reader, writer, row_num, cells, shared_strings)?;
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                let row_empty = e.into_owned();
                let Some(row_num) = parse_row_r(&row_empty)? else {
                    writer.write_event(Event::Empty(row_empty))?;
                    buf.clear();
                    continue;
                };
                flush_rows_before(
                    writer,
                    row_num,
                    row_patches,
                    pending_rows,
                    next_pending,
                    shared_strings,
                )?;

                match row_patches.get(&row_num) {
                    Some(cells) => {
                        if pending_rows.get(*next_pending) == Some(&row_num) {
                            *next_pending += 1;
                        }
                        let end = String::from_utf8_lossy(row_empty.name().as_ref()).into_owned();
                        writer.write_event(Event::Start(row_empty))?;
                        for (col, patch) in cells {
                            write_cell_patch(writer, row_num, *col, patch, None, None, shared_strings)?;
                        }
                        writer.write_event(Event::End(BytesEnd::new(end)))?;
                    }
                    None => writer.write_event(Event::Empty(row_empty))?,
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                flush_rows_before(
                    writer,
                    u32::MAX,
                    row_patches,
                    pending_rows,
                    next_pending,
                    shared_strings,
                )?;
                writer.write_event(Event::End(e.into_owned()))?;
                break;
            }
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected EOF while patching sheetData".to_string(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(formula_changed)
}

/// Rewrite the cells of one `<row>` whose start tag has already been written. Consumes up to and
/// including the row end tag.
fn patch_row<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    patches: &[(u32, &CellPatch)],
    shared_strings: &mut Option<&mut SharedStringsState>,
) -> Result<bool, XlsxError> {
    let mut buf = Vec::new();
    let mut next = 0usize;
    let mut formula_changed = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        let (cell, is_empty) = match event {
            Event::Start(e) if local_name(e.name().as_ref()) == b"c" => (e.into_owned(), false),
            Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => (e.into_owned(), true),
            Event::End(e) if local_name(e.name().as_ref()) == b"row" => {
                for (col, patch) in &patches[next..] {
                    write_cell_patch(writer, row_num, *col, patch, None, None, shared_strings)?;
                }
                writer.write_event(Event::End(e.into_owned()))?;
                break;
            }
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected EOF while patching row".to_string(),
                ))
            }
            ev => {
                writer.write_event(ev.into_owned())?;
                buf.clear();
                continue;
            }
        };
        buf.clear();

        let attrs = parse_cell_addr_and_attrs(&cell)?;
        let Some((cell_ref, existing_t, existing_s)) =
            attrs.filter(|(cell_ref, _, _)| cell_ref.row + 1 == row_num)
        else {
            // Cells without a usable address are copied through unchanged.
            if is_empty {
                writer.write_event(Event::Empty(cell))?;
            } else {
                writer.write_event(Event::Start(cell))?;
            }
            continue;
        };

        while next < patches.len() && patches[next].0 < cell_ref.col {
            let (col, patch) = patches[next];
            write_cell_patch(writer, row_num, col, patch, None, None, shared_strings)?;
            next += 1;
        }

        if next < patches.len() && patches[next].0 == cell_ref.col {
            let patch = patches[next].1;
            next += 1;
            let had_formula = !is_empty && skip_cell_body(reader)?;
            formula_changed |= had_formula;
            write_cell_patch(
                writer,
                row_num,
                cell_ref.col,
                patch,
                existing_t.as_deref(),
                existing_s.as_deref(),
                shared_strings,
            )?;
        } else if is_empty {
            writer.write_event(Event::Empty(cell))?;
        } else {
            writer.write_event(Event::Start(cell))?;
        }
    }

    Ok(formula_changed)
}

/// Consume the children of a `<c>` element through its end tag; returns whether it held an `<f>`.
fn skip_cell_body<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<bool, XlsxError> {
    let mut buf = Vec::new();
    let mut had_formula = false;
    let mut depth = 1usize;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(inner) => {
                if depth == 1 && local_name(inner.name().as_ref()) == b"f" {
                    had_formula = true;
                }
                depth += 1;
            }
            Event::Empty(inner) => {
                if depth == 1 && local_name(inner.name().as_ref()) == b"f" {
                    had_formula = true;
                }
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected EOF while skipping patched cell".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(had_formula)
}

fn write_new_row(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    patches: &[(u32, &CellPatch)],
    shared_strings: &mut Option<&mut SharedStringsState>,
) -> Result<(), XlsxError> {
    let mut row = BytesStart::new("row");
    row.push_attribute(("r", row_num.to_string().as_str()));
    writer.write_event(Event::Start(row))?;
    for (col, patch) in patches {
        write_cell_patch(writer, row_num, *col, patch, None, None, shared_strings)?;
    }
    writer.write_event(Event::End(BytesEnd::new("row")))?;
    Ok(())
}

fn write_cell_patch(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    col: u32,
    patch: &CellPatch,
    existing_t: Option<&str>,
    existing_s: Option<&str>,
    shared_strings: &mut Option<&mut SharedStringsState>,
) -> Result<(), XlsxError> {
    let CellPatch::Set { value, formula } = patch;
    let a1 = CellRef::new(row_num - 1, col).to_a1();

    // The existing cell style is kept.
    let style_index = existing_s.and_then(|s| s.trim().parse::<u32>().ok());

    let mut cell = format!(r#"<c r="{a1}""#);
    if let Some(s) = style_index.filter(|s| *s != 0) {
        cell.push_str(&format!(r#" s="{s}""#));
    }

    let mut ty: Option<&'static str> = None;
    let mut body = String::new();

    if let Some(formula) = formula {
        let formula = formula.strip_prefix('=').unwrap_or(formula);
        body.push_str("<f>");
        body.push_str(&escape_text(formula));
        body.push_str("</f>");
    }

    match value {
        CellValue::Empty => {}
        CellValue::Number(n) => push_v(&mut body, &n.to_string()),
        CellValue::DateTime(dt) => push_v(&mut body, &datetime_to_serial(*dt).to_string()),
        CellValue::Boolean(b) => {
            ty = Some("b");
            push_v(&mut body, if *b { "1" } else { "0" });
        }
        CellValue::Error(e) => {
            ty = Some("e");
            push_v(&mut body, &escape_text(e));
        }
        CellValue::String(s) if formula.is_some() || existing_t == Some("str") => {
            ty = Some("str");
            push_v(&mut body, &escape_text(s));
        }
        CellValue::String(s) => match shared_strings.as_deref_mut() {
            Some(ss) if existing_t != Some("inlineStr") => {
                ty = Some("s");
                push_v(&mut body, &ss.get_or_insert(s).to_string());
            }
            _ => {
                ty = Some("inlineStr");
                body.push_str("<is><t");
                if needs_space_preserve(s) {
                    body.push_str(r#" xml:space="preserve""#);
                }
                body.push('>');
                body.push_str(&escape_text(s));
                body.push_str("</t></is>");
            }
        },
    }

    if let Some(t) = ty {
        cell.push_str(&format!(r#" t="{t}""#));
    }
    if body.is_empty() {
        cell.push_str("/>");
    } else {
        cell.push('>');
        cell.push_str(&body);
        cell.push_str("</c>");
    }

    writer.get_mut().extend_from_slice(cell.as_bytes());
    Ok(())
}

fn push_v(body: &mut String, text: &str) {
    body.push_str("<v>");
    body.push_str(text);
    body.push_str("</v>");
}

fn parse_row_r(row: &BytesStart<'_>) -> Result<Option<u32>, XlsxError> {
    for attr in row.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == b"r" {
            return Ok(attr.unescape_value()?.trim().parse::<u32>().ok());
        }
    }
    Ok(None)
}

type CellAttrs = (CellRef, Option<String>, Option<String>);

fn parse_cell_addr_and_attrs(cell: &BytesStart<'_>) -> Result<Option<CellAttrs>, XlsxError> {
    let mut r = None;
    let mut t = None;
    let mut s = None;
    for attr in cell.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?.into_owned();
        match local_name(attr.key.as_ref()) {
            b"r" => r = Some(value),
            b"t" => t = Some(value),
            b"s" => s = Some(value),
            _ => {}
        }
    }
    Ok(r
        .and_then(|r| CellRef::from_a1(&r).ok())
        .map(|cell_ref| (cell_ref, t, s)))
}

/// Drop every element named `local` (start/end pair or empty form) whose attributes match.
fn remove_elements(
    xml: &[u8],
    local: &[u8],
    matches: impl Fn(&[(String, String)]) -> bool,
) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
            continue;
        }
        match event {
            Event::Empty(e) if local_name(e.name().as_ref()) == local => {
                if !matches(&attribute_pairs(&e)?) {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                }
            }
            Event::Start(e) if local_name(e.name().as_ref()) == local => {
                if matches(&attribute_pairs(&e)?) {
                    skip_depth = 1;
                } else {
                    writer.write_event(Event::Start(e.into_owned()))?;
                }
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

fn attribute_pairs(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, XlsxError> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        out.push((
            String::from_utf8_lossy(local_name(attr.key.as_ref())).into_owned(),
            attr.unescape_value()?.into_owned(),
        ));
    }
    Ok(out)
}

fn ensure_workbook_full_calc_on_load(pkg: &mut XlsxPackage) -> Result<(), XlsxError> {
    let Some(bytes) = pkg.part(WORKBOOK_PART) else {
        return Ok(());
    };

    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(bytes.len() + 32));
    let mut buf = Vec::new();
    let mut saw_calc_pr = false;
    let mut skipping_calc_pr = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                skipping_calc_pr = true;
                let rendered = render_calc_pr(&e)?;
                writer.get_mut().extend_from_slice(&rendered);
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                let rendered = render_calc_pr(&e)?;
                writer.get_mut().extend_from_slice(&rendered);
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"calcPr" => {
                skipping_calc_pr = false;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"workbook" => {
                if !saw_calc_pr {
                    let prefix = element_prefix(e.name().as_ref());
                    writer
                        .get_mut()
                        .extend_from_slice(format!(r#"<{prefix}calcPr fullCalcOnLoad="1"/>"#).as_bytes());
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            _ if skipping_calc_pr => {}
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    pkg.set_part(WORKBOOK_PART, writer.into_inner());
    Ok(())
}

/// `<calcPr .../>` with `fullCalcOnLoad="1"`, keeping every other attribute.
fn render_calc_pr(start: &BytesStart<'_>) -> Result<Vec<u8>, XlsxError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut out = format!("<{name}");
    for attr in start.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == b"fullCalcOnLoad" {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?;
        out.push_str(&format!(r#" {key}="{}""#, escape_attr(&value)));
    }
    out.push_str(r#" fullCalcOnLoad="1"/>"#);
    Ok(out.into_bytes())
}
