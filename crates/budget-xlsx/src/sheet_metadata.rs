use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::openxml::local_name;
use crate::XlsxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbookSheetInfo {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
}

pub fn parse_workbook_sheets(workbook_xml: &[u8]) -> Result<Vec<WorkbookSheetInfo>, XlsxError> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"sheet" => {
                sheets.push(parse_sheet_element(&e)?);
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

/// 0-based index of the active tab (`<workbookView activeTab="n"/>`), defaulting to 0.
pub fn parse_active_tab(workbook_xml: &[u8]) -> Result<usize, XlsxError> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"workbookView" => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"activeTab" {
                        return Ok(attr.unescape_value()?.trim().parse().unwrap_or(0));
                    }
                }
                return Ok(0);
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(0)
}

fn parse_sheet_element(e: &BytesStart<'_>) -> Result<WorkbookSheetInfo, XlsxError> {
    let mut name: Option<String> = None;
    let mut sheet_id: Option<u32> = None;
    let mut rel_id: Option<String> = None;

    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        match key {
            b"name" => name = Some(attr.unescape_value()?.to_string()),
            b"sheetId" => {
                let v = attr.unescape_value()?;
                sheet_id = Some(v.parse::<u32>().map_err(|_| XlsxError::InvalidSheetId)?);
            }
            _ if local_name(key) == b"id" => rel_id = Some(attr.unescape_value()?.to_string()),
            _ => {}
        }
    }

    Ok(WorkbookSheetInfo {
        name: name.ok_or(XlsxError::MissingAttr("name"))?,
        sheet_id: sheet_id.ok_or(XlsxError::MissingAttr("sheetId"))?,
        rel_id: rel_id.ok_or(XlsxError::MissingAttr("r:id"))?,
    })
}
