use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::compression::Scratch;
use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::record::{tag_str, Entry, Record, Tag, Walk};

/// Tag of the plugin header record.
pub const TES4: Tag = *b"TES4";
/// Header subrecord naming one master file.
pub const MAST: Tag = *b"MAST";

/// Which header layout to parse with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatChoice {
    /// Detect from the header record.
    #[default]
    Auto,
    Force(Format),
}

/// Options controlling how a plugin is read.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Stop after the header record (enough for masters and description).
    pub header_only: bool,
    pub format: FormatChoice,
}

impl LoadOptions {
    pub fn header_only() -> Self {
        Self {
            header_only: true,
            ..Self::default()
        }
    }
}

/// A parsed plugin: the header record followed by top-level groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Plugin {
    pub format: Format,
    pub entries: Vec<Entry>,
}

impl Plugin {
    /// An empty plugin holding just a header record.
    pub fn new(format: Format) -> Self {
        let mut header = Record::new(TES4, 0);
        // HEDR: version, record count, next object id.
        let mut hedr = Writer::new();
        hedr.write_f32(if format == Format::Legacy { 1.0 } else { 0.94 });
        hedr.write_i32(0);
        hedr.write_u32(0x800);
        header
            .subrecords
            .push(crate::record::Subrecord::new(*b"HEDR", hedr.into_bytes()));
        Self {
            format,
            entries: vec![Entry::Record(header)],
        }
    }

    /// Parse a whole plugin from its file contents.
    pub fn parse(data: &[u8], options: &LoadOptions) -> Result<Self> {
        let format = match options.format {
            FormatChoice::Force(format) => format,
            FormatChoice::Auto => Format::detect(data).ok_or_else(|| {
                let tag = data.get(..4).map(String::from_utf8_lossy).unwrap_or_default();
                Error::UnsupportedHeader(format!(
                    "expected a TES4 header record followed by HEDR, found {tag:?}"
                ))
            })?,
        };
        debug!(%format, header_only = options.header_only, "parsing plugin");

        let mut cursor = Cursor::new(data);
        let mut scratch = Scratch::new();

        let header = Entry::parse(&mut cursor, format, &mut scratch)?;
        match &header {
            Entry::Record(r) if r.tag == TES4 => {}
            Entry::Record(r) => {
                return Err(Error::UnsupportedHeader(format!(
                    "first record is {}, not TES4",
                    tag_str(&r.tag)
                )))
            }
            Entry::Group(_) => {
                return Err(Error::UnsupportedHeader("file starts with a group".into()))
            }
        }

        let mut entries = vec![header];
        if !options.header_only {
            while !cursor.is_empty() {
                entries.push(Entry::parse(&mut cursor, format, &mut scratch)?);
            }
        }
        Ok(Self { format, entries })
    }

    /// Read and parse a plugin file.
    pub fn read(path: &Path, options: &LoadOptions) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::parse(&data, options)
    }

    /// Serialize the plugin back into file bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = Writer::new();
        for entry in &self.entries {
            entry.write(&mut w, self.format)?;
        }
        Ok(w.into_bytes())
    }

    /// The `TES4` header record.
    pub fn header(&self) -> Option<&Record> {
        self.entries
            .iter()
            .filter_map(Entry::as_record)
            .find(|r| r.tag == TES4)
    }

    fn header_mut(&mut self) -> Option<&mut Record> {
        self.entries.iter_mut().find_map(|e| match e {
            Entry::Record(r) if r.tag == TES4 => Some(r),
            _ => None,
        })
    }

    /// Master file names declared in the header, in load order.
    pub fn masters(&self) -> Vec<String> {
        self.header()
            .map(|h| h.subrecords_with(&MAST).map(|s| s.as_str().into_owned()).collect())
            .unwrap_or_default()
    }

    /// Append a master declaration. Each `MAST` is followed by an 8-byte `DATA`.
    pub fn add_master(&mut self, name: &str) {
        if let Some(header) = self.header_mut() {
            let insert_at = header
                .subrecords
                .iter()
                .rposition(|s| s.tag == MAST)
                .map(|i| i + 2)
                .unwrap_or_else(|| header.subrecords.len().min(1));
            let insert_at = insert_at.min(header.subrecords.len());
            header
                .subrecords
                .insert(insert_at, crate::record::Subrecord::from_zstring(MAST, name));
            header
                .subrecords
                .insert(insert_at + 1, crate::record::Subrecord::new(*b"DATA", vec![0; 8]));
        }
    }

    /// Depth-first walk over every node.
    pub fn walk(&self) -> Walk<'_> {
        Walk::over(&self.entries)
    }

    /// Every record in file order, the header included.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.walk().records()
    }

    pub fn find_form(&self, form_id: u32) -> Option<&Record> {
        self.records().find(|r| r.form_id == form_id && r.tag != TES4)
    }

    pub fn find_editor_id(&self, edid: &str) -> Option<&Record> {
        self.records()
            .find(|r| r.editor_id().is_some_and(|e| e.eq_ignore_ascii_case(edid)))
    }

    /// Mutable access to a record by form-id.
    pub fn find_form_mut(&mut self, form_id: u32) -> Option<&mut Record> {
        fn search(entries: &mut [Entry], form_id: u32) -> Option<&mut Record> {
            for entry in entries {
                match entry {
                    Entry::Record(r) if r.form_id == form_id && r.tag != TES4 => return Some(r),
                    Entry::Record(_) => {}
                    Entry::Group(g) => {
                        if let Some(r) = search(&mut g.children, form_id) {
                            return Some(r);
                        }
                    }
                }
            }
            None
        }
        search(&mut self.entries, form_id)
    }

    /// Number of records of each type, header excluded.
    pub fn stats(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records().filter(|r| r.tag != TES4) {
            *counts.entry(tag_str(&record.tag)).or_insert(0) += 1;
        }
        counts
    }

    /// Author and description strings from the header (`CNAM`, `SNAM`).
    pub fn author_and_description(&self) -> (Option<Cow<'_, str>>, Option<Cow<'_, str>>) {
        match self.header() {
            Some(h) => (
                h.subrecord(b"CNAM").map(|s| s.as_str()),
                h.subrecord(b"SNAM").map(|s| s.as_str()),
            ),
            None => (None, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_plugin_round_trips_in_both_formats() {
        for format in [Format::Legacy, Format::Modern] {
            let plugin = Plugin::new(format);
            let bytes = plugin.to_bytes().unwrap();
            assert_eq!(Format::detect(&bytes), Some(format));
            let back = Plugin::parse(&bytes, &LoadOptions::default()).unwrap();
            assert_eq!(back, plugin);
        }
    }

    #[test]
    fn masters_follow_header_order() {
        let mut plugin = Plugin::new(Format::Legacy);
        plugin.add_master("Oblivion.esm");
        plugin.add_master("Knights.esp");
        assert_eq!(plugin.masters(), ["Oblivion.esm", "Knights.esp"]);

        let header = plugin.header().unwrap();
        let tags: Vec<String> = header.subrecords.iter().map(|s| tag_str(&s.tag)).collect();
        assert_eq!(tags, ["HEDR", "MAST", "DATA", "MAST", "DATA"]);
    }

    #[test]
    fn rejects_non_plugin_data() {
        let err = Plugin::parse(b"FORM\0\0\0\0", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedHeader(_)));
    }
}
