//! Shared formulas (`<f t="shared">`).
//!
//! A group stores its text once, on the anchor cell, together with the `ref` range it covers;
//! the other cells of the group carry only the `si` index. Each of them means the anchor text
//! with its relative references moved by the cell's offset from the anchor.
//!
//! Patching a cell inside a group would orphan the rest of it (overwriting the anchor drops the
//! only copy of the text), so [`detach_shared_formulas`] first rewrites every touched group into
//! plain per-cell `<f>` elements.

use std::collections::HashMap;

use budget_model::{name_to_col, CellRef, MAX_COLS, MAX_ROWS};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use roxmltree::{Document, Node};

use crate::openxml::local_name;
use crate::worksheet::visit_cells;
use crate::XlsxError;

/// The anchor of one shared formula group.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SharedFormula {
    anchor: CellRef,
    first: CellRef,
    last: CellRef,
    text: String,
}

impl SharedFormula {
    fn contains(&self, cell: CellRef) -> bool {
        cell == self.anchor
            || (self.first.row..=self.last.row).contains(&cell.row)
                && (self.first.col..=self.last.col).contains(&cell.col)
    }

    /// Formula text of the group member at `cell`.
    pub(crate) fn text_at(&self, cell: CellRef) -> String {
        shift_formula(
            &self.text,
            i64::from(cell.row) - i64::from(self.anchor.row),
            i64::from(cell.col) - i64::from(self.anchor.col),
        )
    }
}

/// How a cell's `<f>` takes part in a shared formula group.
pub(crate) enum SharedRole {
    Anchor { si: u32, group: SharedFormula },
    Member { si: u32 },
}

pub(crate) fn shared_role(cell: CellRef, f: &Node<'_, '_>) -> Option<SharedRole> {
    if f.attribute("t") != Some("shared") {
        return None;
    }
    let si = f.attribute("si")?.trim().parse::<u32>().ok()?;
    let text = f.text().unwrap_or_default();
    if text.trim().is_empty() {
        return Some(SharedRole::Member { si });
    }
    let (first, last) = parse_range(f.attribute("ref")?)?;
    Some(SharedRole::Anchor {
        si,
        group: SharedFormula {
            anchor: cell,
            first,
            last,
            text: text.to_string(),
        },
    })
}

fn parse_range(range: &str) -> Option<(CellRef, CellRef)> {
    let (a, b) = range.split_once(':').unwrap_or((range, range));
    let a = CellRef::from_a1(a).ok()?;
    let b = CellRef::from_a1(b).ok()?;
    Some((
        CellRef::new(a.row.min(b.row), a.col.min(b.col)),
        CellRef::new(a.row.max(b.row), a.col.max(b.col)),
    ))
}

/// Shared formula anchors of a worksheet part, keyed by `si`.
pub(crate) fn shared_formula_groups(xml: &[u8]) -> Result<HashMap<u32, SharedFormula>, XlsxError> {
    let doc = Document::parse(std::str::from_utf8(xml)?)?;
    let mut groups = HashMap::new();
    visit_cells(&doc, |cell, c| {
        let role = c
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "f")
            .and_then(|f| shared_role(cell, &f));
        if let Some(SharedRole::Anchor { si, group }) = role {
            groups.entry(si).or_insert(group);
        }
        Ok(())
    })?;
    Ok(groups)
}

/// Rewrite every shared formula group whose range holds one of `cells` into plain formulas.
///
/// Returns `None` when no group is touched and the part can be patched as is.
pub(crate) fn detach_shared_formulas(
    xml: &[u8],
    cells: impl IntoIterator<Item = CellRef>,
) -> Result<Option<Vec<u8>>, XlsxError> {
    if !xml.windows(6).any(|w| w == b"shared") {
        return Ok(None);
    }
    let mut groups = shared_formula_groups(xml)?;
    let cells: Vec<CellRef> = cells.into_iter().collect();
    groups.retain(|_, group| cells.iter().any(|cell| group.contains(*cell)));
    if groups.is_empty() {
        return Ok(None);
    }
    log::debug!("expanding {} shared formula groups before patching", groups.len());
    rewrite_groups(xml, &groups).map(Some)
}

/// Position of the element being streamed; rows and cells without `r` continue from the
/// previous one.
#[derive(Default)]
struct CellCursor {
    next_row: u32,
    row: u32,
    next_col: u32,
    cell: Option<CellRef>,
}

impl CellCursor {
    fn track(&mut self, e: &BytesStart<'_>) -> Result<(), XlsxError> {
        match local_name(e.name().as_ref()) {
            b"row" => self.enter_row(e),
            b"c" => self.enter_cell(e),
            _ => Ok(()),
        }
    }

    fn enter_row(&mut self, row: &BytesStart<'_>) -> Result<(), XlsxError> {
        self.row = attr_value(row, b"r")?
            .and_then(|r| r.trim().parse::<u32>().ok())
            .and_then(|r| r.checked_sub(1))
            .unwrap_or(self.next_row);
        self.next_row = self.row + 1;
        self.next_col = 0;
        self.cell = None;
        Ok(())
    }

    fn enter_cell(&mut self, c: &BytesStart<'_>) -> Result<(), XlsxError> {
        let cell = attr_value(c, b"r")?
            .and_then(|r| CellRef::from_a1(&r).ok())
            .unwrap_or(CellRef::new(self.row, self.next_col));
        self.next_col = cell.col + 1;
        self.cell = Some(cell);
        Ok(())
    }
}

fn rewrite_groups(xml: &[u8], groups: &HashMap<u32, SharedFormula>) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + groups.len() * 64));
    let mut cursor = CellCursor::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                cursor.track(&e)?;
                if local_name(e.name().as_ref()) == b"f" {
                    let f = e.into_owned();
                    match touched_group(&f, groups, &cursor)? {
                        Some((group, cell)) => {
                            let own = read_formula_text(&mut reader)?;
                            let text = if own.trim().is_empty() {
                                group.text_at(cell)
                            } else {
                                own
                            };
                            write_plain_formula(&mut writer, &f, &text)?;
                        }
                        None => writer.write_event(Event::Start(f))?,
                    }
                } else {
                    writer.write_event(Event::Start(e.into_owned()))?;
                }
            }
            Event::Empty(e) => {
                cursor.track(&e)?;
                let group = if local_name(e.name().as_ref()) == b"f" {
                    touched_group(&e, groups, &cursor)?
                } else {
                    None
                };
                match group {
                    Some((group, cell)) => write_plain_formula(&mut writer, &e, &group.text_at(cell))?,
                    None => writer.write_event(Event::Empty(e.into_owned()))?,
                }
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn touched_group<'g>(
    f: &BytesStart<'_>,
    groups: &'g HashMap<u32, SharedFormula>,
    cursor: &CellCursor,
) -> Result<Option<(&'g SharedFormula, CellRef)>, XlsxError> {
    if attr_value(f, b"t")?.as_deref() != Some("shared") {
        return Ok(None);
    }
    let Some(si) = attr_value(f, b"si")?.and_then(|si| si.trim().parse::<u32>().ok()) else {
        return Ok(None);
    };
    Ok(groups.get(&si).zip(cursor.cell))
}

/// Collect the text of an `<f>` whose start tag was just read, through its end tag.
fn read_formula_text(reader: &mut Reader<&[u8]>) -> Result<String, XlsxError> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::CData(t) => text.push_str(&String::from_utf8_lossy(&t.into_inner())),
            Event::End(_) => break,
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected EOF inside a formula".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

/// `<f>` with the group attributes (`t`, `ref`, `si`) dropped and the others kept.
fn write_plain_formula(
    writer: &mut Writer<Vec<u8>>,
    f: &BytesStart<'_>,
    text: &str,
) -> Result<(), XlsxError> {
    let name = String::from_utf8_lossy(f.name().as_ref()).into_owned();
    let mut start = BytesStart::new(name.as_str());
    for attr in f.attributes() {
        let attr = attr?;
        if !matches!(local_name(attr.key.as_ref()), b"t" | b"ref" | b"si") {
            start.push_attribute(attr);
        }
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Move the relative references of `formula` by `delta_row` rows and `delta_col` columns.
///
/// `$`-anchored parts stay put and a reference pushed off the grid becomes `#REF!`. String
/// literals, quoted sheet names, structured references, function names and defined names are
/// copied unchanged.
pub fn shift_formula(formula: &str, delta_row: i64, delta_col: i64) -> String {
    if delta_row == 0 && delta_col == 0 {
        return formula.to_string();
    }
    let chars: Vec<char> = formula.chars().collect();
    let mut out = String::with_capacity(formula.len() + 8);
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        let end = match c {
            '"' | '\'' => quoted_end(&chars, i),
            '[' => bracket_end(&chars, i),
            c if is_token_char(c) => {
                let start = i;
                while i < chars.len() && is_token_char(chars[i]) {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();
                let prev = start.checked_sub(1).map(|p| chars[p]);
                out.push_str(&shift_token(
                    &token,
                    prev,
                    chars.get(i).copied(),
                    delta_row,
                    delta_col,
                ));
                continue;
            }
            _ => i + 1,
        };
        out.extend(&chars[i..end]);
        i = end;
    }
    out
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '.')
}

/// End (exclusive) of the literal opened at `start`; a doubled quote is an escaped one.
fn quoted_end(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut j = start + 1;
    while j < chars.len() {
        if chars[j] == quote {
            if chars.get(j + 1) == Some(&quote) {
                j += 2;
                continue;
            }
            return j + 1;
        }
        j += 1;
    }
    chars.len()
}

fn bracket_end(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    for (j, c) in chars.iter().enumerate().skip(start) {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return j + 1;
                }
            }
            _ => {}
        }
    }
    chars.len()
}

enum RefToken {
    Cell {
        col_abs: bool,
        col: u32,
        row_abs: bool,
        row: u32,
    },
    Column { abs: bool, col: u32 },
    Row { abs: bool, row: u32 },
}

fn parse_ref_token(token: &str) -> Option<RefToken> {
    let (col_abs, rest) = strip_dollar(token);
    let split = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    let (letters, rest) = rest.split_at(split);
    let (row_abs, digits) = strip_dollar(rest);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let col = match letters {
        "" => None,
        letters => Some(column_index(letters)?),
    };
    let row = match digits {
        "" => None,
        digits => Some(row_index(digits)?),
    };
    match (col, row) {
        (Some(col), Some(row)) => Some(RefToken::Cell {
            col_abs,
            col,
            row_abs,
            row,
        }),
        (Some(col), None) if !row_abs => Some(RefToken::Column { abs: col_abs, col }),
        (None, Some(row)) if !(col_abs && row_abs) => Some(RefToken::Row {
            abs: col_abs || row_abs,
            row,
        }),
        _ => None,
    }
}

fn strip_dollar(s: &str) -> (bool, &str) {
    match s.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, s),
    }
}

fn column_index(letters: &str) -> Option<u32> {
    if letters.len() > 3 {
        return None;
    }
    name_to_col(letters).ok().filter(|col| *col < MAX_COLS)
}

fn row_index(digits: &str) -> Option<u32> {
    if digits.len() > 7 {
        return None;
    }
    digits
        .parse::<u32>()
        .ok()
        .filter(|row| (1..=MAX_ROWS).contains(row))
        .map(|row| row - 1)
}

fn shift_index(index: u32, delta: i64, limit: u32) -> Option<u32> {
    u32::try_from(i64::from(index) + delta)
        .ok()
        .filter(|moved| *moved < limit)
}

fn dollar(abs: bool) -> &'static str {
    if abs {
        "$"
    } else {
        ""
    }
}

fn shift_token(
    token: &str,
    prev: Option<char>,
    next: Option<char>,
    delta_row: i64,
    delta_col: i64,
) -> String {
    // Function names, sheet names and table names.
    if matches!(next, Some('(' | '!' | '[')) {
        return token.to_string();
    }
    let in_range = prev == Some(':') || next == Some(':');
    let moved = match parse_ref_token(token) {
        Some(RefToken::Cell {
            col_abs,
            col,
            row_abs,
            row,
        }) => {
            let col = if col_abs { Some(col) } else { shift_index(col, delta_col, MAX_COLS) };
            let row = if row_abs { Some(row) } else { shift_index(row, delta_row, MAX_ROWS) };
            col.zip(row).map(|(col, row)| {
                format!(
                    "{}{}{}{}",
                    dollar(col_abs),
                    budget_model::col_to_name(col),
                    dollar(row_abs),
                    row + 1
                )
            })
        }
        Some(RefToken::Column { abs, col }) if in_range => {
            let col = if abs { Some(col) } else { shift_index(col, delta_col, MAX_COLS) };
            col.map(|col| format!("{}{}", dollar(abs), budget_model::col_to_name(col)))
        }
        Some(RefToken::Row { abs, row }) if in_range => {
            let row = if abs { Some(row) } else { shift_index(row, delta_row, MAX_ROWS) };
            row.map(|row| format!("{}{}", dollar(abs), row + 1))
        }
        _ => return token.to_string(),
    };
    moved.unwrap_or_else(|| "#REF!".to_string())
}
