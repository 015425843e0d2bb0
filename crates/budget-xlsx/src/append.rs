use quick_xml::events::{BytesEnd, Event};
use quick_xml::{Reader, Writer};

use crate::openxml::{
    element_prefix, escape_attr, local_name, next_relationship_id, parse_relationships, rels_part_name,
    CONTENT_TYPE_WORKSHEET, NS_RELATIONSHIPS, NS_SPREADSHEETML, REL_TYPE_WORKSHEET,
};
use crate::package::{CONTENT_TYPES_PART, WORKBOOK_PART};
use crate::{XlsxError, XlsxPackage};

impl XlsxPackage {
    /// Append an empty worksheet named `name` after the existing tabs.
    ///
    /// Registers the new part in the workbook, its relationships and `[Content_Types].xml`,
    /// and returns the new part name.
    pub fn add_worksheet(&mut self, name: &str) -> Result<String, XlsxError> {
        let sheets = self.workbook_sheets()?;
        if sheets.iter().any(|s| s.name == name) {
            return Err(XlsxError::DuplicateSheet(name.to_string()));
        }
        validate_sheet_name(name)?;

        let part_name = (1u32..)
            .map(|n| format!("xl/worksheets/sheet{n}.xml"))
            .find(|candidate| self.part(candidate).is_none())
            .ok_or_else(|| XlsxError::Invalid("no free worksheet part name".to_string()))?;
        let target = part_name.trim_start_matches("xl/").to_string();

        let rels_name = rels_part_name(WORKBOOK_PART);
        let rels_xml = self
            .part(&rels_name)
            .ok_or_else(|| XlsxError::MissingPart(rels_name.clone()))?;
        let rel_id = next_relationship_id(&parse_relationships(rels_xml)?);
        let updated_rels = insert_before_end(rels_xml, b"Relationships", |prefix| {
            format!(
                r#"<{prefix}Relationship Id="{rel_id}" Type="{REL_TYPE_WORKSHEET}" Target="{target}"/>"#
            )
        })?;

        let content_types = self
            .part(CONTENT_TYPES_PART)
            .ok_or_else(|| XlsxError::MissingPart(CONTENT_TYPES_PART.to_string()))?;
        let updated_content_types = insert_before_end(content_types, b"Types", |prefix| {
            format!(
                r#"<{prefix}Override PartName="/{part_name}" ContentType="{CONTENT_TYPE_WORKSHEET}"/>"#
            )
        })?;

        let workbook_xml = self
            .part(WORKBOOK_PART)
            .ok_or_else(|| XlsxError::MissingPart(WORKBOOK_PART.to_string()))?;
        let sheet_id = sheets.iter().map(|s| s.sheet_id).max().unwrap_or(0) + 1;
        let declares_r = std::str::from_utf8(workbook_xml)?
            .contains(&format!(r#"xmlns:r="{NS_RELATIONSHIPS}""#));
        let updated_workbook = insert_before_end(workbook_xml, b"sheets", |prefix| {
            let ns = if declares_r {
                String::new()
            } else {
                format!(r#" xmlns:r="{NS_RELATIONSHIPS}""#)
            };
            format!(
                r#"<{prefix}sheet name="{}" sheetId="{sheet_id}"{ns} r:id="{rel_id}"/>"#,
                escape_attr(name)
            )
        })?;

        let worksheet_xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{NS_SPREADSHEETML}" xmlns:r="{NS_RELATIONSHIPS}"><sheetData/></worksheet>"#
        );

        self.set_part(rels_name, updated_rels);
        self.set_part(CONTENT_TYPES_PART, updated_content_types);
        self.set_part(WORKBOOK_PART, updated_workbook);
        self.set_part(part_name.clone(), worksheet_xml.into_bytes());
        log::debug!("added worksheet {name:?} as {part_name} ({rel_id})");
        Ok(part_name)
    }
}

/// Excel rejects tab names that are empty, longer than 31 characters or contain `[]:*?/\`.
fn validate_sheet_name(name: &str) -> Result<(), XlsxError> {
    let invalid = name.trim().is_empty()
        || name.chars().count() > 31
        || name.contains(['[', ']', ':', '*', '?', '/', '\\'])
        || name.starts_with('\'')
        || name.ends_with('\'');
    if invalid {
        return Err(XlsxError::Invalid(format!("invalid sheet name: {name:?}")));
    }
    Ok(())
}

/// Insert the fragment produced by `fragment(prefix)` right before the closing tag of the first
/// element named `local`. An empty element (`<sheets/>`) is expanded into a start/end pair.
fn insert_before_end(
    xml: &[u8],
    local: &[u8],
    fragment: impl Fn(&str) -> String,
) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));
    let mut buf = Vec::new();
    let mut inserted = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::End(e) if !inserted && local_name(e.name().as_ref()) == local => {
                let prefix = element_prefix(e.name().as_ref());
                writer.get_mut().extend_from_slice(fragment(&prefix).as_bytes());
                writer.write_event(Event::End(e.into_owned()))?;
                inserted = true;
            }
            Event::Empty(e) if !inserted && local_name(e.name().as_ref()) == local => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let prefix = element_prefix(e.name().as_ref());
                writer.write_event(Event::Start(e.into_owned()))?;
                writer.get_mut().extend_from_slice(fragment(&prefix).as_bytes());
                writer.write_event(Event::End(BytesEnd::new(name)))?;
                inserted = true;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    if !inserted {
        return Err(XlsxError::Invalid(format!(
            "missing <{}> element",
            String::from_utf8_lossy(local)
        )));
    }
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn inserts_with_element_prefix() {
        let xml = br#"<x:workbook xmlns:x="ns"><x:sheets><x:sheet name="A"/></x:sheets></x:workbook>"#;
        let out = insert_before_end(xml, b"sheets", |p| format!("<{p}sheet name=\"B\"/>")).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<x:workbook xmlns:x="ns"><x:sheets><x:sheet name="A"/><x:sheet name="B"/></x:sheets></x:workbook>"#
        );
    }

    #[test]
    fn expands_empty_container() {
        let out = insert_before_end(br#"<Relationships/>"#, b"Relationships", |_| "<R/>".into())
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "<Relationships><R/></Relationships>");
    }

    #[test]
    fn rejects_invalid_sheet_names() {
        assert!(validate_sheet_name("Log de Alterações").is_ok());
        assert!(validate_sheet_name("a/b").is_err());
        assert!(validate_sheet_name("").is_err());
        assert!(validate_sheet_name(&"x".repeat(32)).is_err());
    }
}
