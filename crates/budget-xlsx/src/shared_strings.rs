use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use roxmltree::{Document, Node};

use crate::openxml::{element_prefix, escape_text, local_name};
use crate::XlsxError;

/// Parse `xl/sharedStrings.xml` into the plain text of every `<si>` item.
///
/// Rich-text runs are concatenated; phonetic (`<rPh>`) runs are not part of the displayed
/// string and are skipped.
pub fn parse_shared_strings_xml(xml: &[u8]) -> Result<Vec<String>, XlsxError> {
    let xml = std::str::from_utf8(xml)?;
    let doc = Document::parse(xml)?;
    Ok(doc
        .root_element()
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "si")
        .map(|si| string_item_text(&si))
        .collect())
}

/// Visible text of an `<si>` or `<is>` element.
pub(crate) fn string_item_text(item: &Node<'_, '_>) -> String {
    let mut out = String::new();
    for child in item.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "t" => out.push_str(child.text().unwrap_or_default()),
            "r" => {
                for t in child
                    .children()
                    .filter(|n| n.is_element() && n.tag_name().name() == "t")
                {
                    out.push_str(t.text().unwrap_or_default());
                }
            }
            _ => {}
        }
    }
    out
}

/// Shared string table used while patching: existing items are looked up by text and new items
/// are appended to the end of the original part, leaving existing `<si>` markup untouched.
#[derive(Debug)]
pub(crate) struct SharedStringsState {
    original: Vec<u8>,
    index: HashMap<String, u32>,
    len: u32,
    appended: Vec<String>,
}

impl SharedStringsState {
    /// Only plain `<si><t>..</t></si>` items are reusable; a rich item with the same flattened
    /// text would carry its run formatting into the patched cell.
    pub(crate) fn from_part(bytes: &[u8]) -> Result<Self, XlsxError> {
        let xml = std::str::from_utf8(bytes)?;
        let doc = Document::parse(xml)?;
        let mut index = HashMap::new();
        let mut len = 0u32;
        for si in doc
            .root_element()
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "si")
        {
            if let Some(text) = plain_item_text(&si) {
                index.entry(text).or_insert(len);
            }
            len += 1;
        }
        Ok(Self {
            original: bytes.to_vec(),
            index,
            len,
            appended: Vec::new(),
        })
    }

    pub(crate) fn get_or_insert(&mut self, text: &str) -> u32 {
        if let Some(idx) = self.index.get(text).copied() {
            return idx;
        }
        let idx = self.len;
        self.len += 1;
        self.appended.push(text.to_string());
        self.index.insert(text.to_string(), idx);
        idx
    }

    /// Serialize the updated table, or `None` when nothing was appended.
    pub(crate) fn write_if_dirty(&self) -> Result<Option<Vec<u8>>, XlsxError> {
        if self.appended.is_empty() {
            return Ok(None);
        }

        let mut reader = Reader::from_reader(self.original.as_slice());
        reader.config_mut().trim_text(false);
        let mut writer = Writer::new(Vec::with_capacity(
            self.original.len() + self.appended.len() * 32,
        ));
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if local_name(e.name().as_ref()) == b"sst" => {
                    writer.write_event(Event::Start(self.with_counts(&e)?))?;
                }
                Event::Empty(e) if local_name(e.name().as_ref()) == b"sst" => {
                    let prefix = element_prefix(e.name().as_ref());
                    writer.write_event(Event::Start(self.with_counts(&e)?))?;
                    self.write_appended(&mut writer, &prefix);
                    let end = format!("{prefix}sst");
                    writer.write_event(Event::End(BytesEnd::new(end.as_str())))?;
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"sst" => {
                    let prefix = element_prefix(e.name().as_ref());
                    self.write_appended(&mut writer, &prefix);
                    writer.write_event(Event::End(e.into_owned()))?;
                }
                Event::Eof => break,
                ev => writer.write_event(ev.into_owned())?,
            }
            buf.clear();
        }

        Ok(Some(writer.into_inner()))
    }

    fn with_counts(&self, start: &BytesStart<'_>) -> Result<BytesStart<'static>, XlsxError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut out = BytesStart::new(name);
        let mut ref_count = None;
        for attr in start.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"uniqueCount" => {}
                b"count" => {
                    ref_count = attr.unescape_value()?.trim().parse::<u64>().ok();
                }
                _ => out.push_attribute(attr),
            }
        }
        // `count` is the number of cell references; every appended item gains one.
        let count = ref_count.unwrap_or(u64::from(self.len) - self.appended.len() as u64)
            + self.appended.len() as u64;
        out.push_attribute(("count", count.to_string().as_str()));
        out.push_attribute(("uniqueCount", self.len.to_string().as_str()));
        Ok(out)
    }

    fn write_appended(&self, writer: &mut Writer<Vec<u8>>, prefix: &str) {
        let out = writer.get_mut();
        for text in &self.appended {
            let space = if needs_space_preserve(text) {
                r#" xml:space="preserve""#
            } else {
                ""
            };
            out.extend_from_slice(
                format!(
                    "<{prefix}si><{prefix}t{space}>{}</{prefix}t></{prefix}si>",
                    escape_text(text)
                )
                .as_bytes(),
            );
        }
    }
}

/// Text of an item made of a single unformatted `<t>`, or `None` for rich items.
fn plain_item_text(item: &Node<'_, '_>) -> Option<String> {
    let mut children = item.children().filter(Node::is_element);
    let t = children.next()?;
    if t.tag_name().name() != "t" || children.next().is_some() {
        return None;
    }
    Some(t.text().unwrap_or_default().to_string())
}

pub(crate) fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}
