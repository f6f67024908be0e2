//! The record tree: groups, records and subrecords.
//!
//! Every container carries a declared size in its header. Parsing checks the
//! declared size against the bytes actually consumed by its children and
//! fails the whole parse on any disagreement.

use std::borrow::Cow;

use crate::compression::{self, InflateFailure, Scratch};
use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};
use crate::format::Format;

/// A 4-byte ASCII type tag.
pub type Tag = [u8; 4];

pub const GRUP: Tag = *b"GRUP";
/// Marker subrecord announcing that the next subrecord is larger than 65535 bytes.
pub const XXXX: Tag = *b"XXXX";
pub const EDID: Tag = *b"EDID";

/// Record flag: the payload is zlib-compressed.
pub const COMPRESSED_FLAG: u32 = 0x0004_0000;

/// Size of a subrecord header (tag + u16 size).
const SUBRECORD_HEADER_LEN: usize = 6;
/// Extra bytes taken by the `XXXX` prefix (its own header + u32 size).
const EXTENDED_PREFIX_LEN: usize = SUBRECORD_HEADER_LEN + 4;

/// Tag as a string (for display).
pub fn tag_str(tag: &Tag) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

/// Parse a 4-character string into a tag.
pub fn parse_tag(s: &str) -> Option<Tag> {
    s.as_bytes().try_into().ok()
}

/// A tagged, length-prefixed field of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Subrecord {
    pub tag: Tag,
    pub data: Vec<u8>,
}

impl Subrecord {
    pub fn new(tag: Tag, data: Vec<u8>) -> Self {
        Self { tag, data }
    }

    /// A subrecord holding a null-terminated string.
    pub fn from_zstring(tag: Tag, s: &str) -> Self {
        let mut data = Vec::with_capacity(s.len() + 1);
        data.extend_from_slice(s.as_bytes());
        data.push(0);
        Self { tag, data }
    }

    pub fn from_u32(tag: Tag, v: u32) -> Self {
        Self {
            tag,
            data: v.to_le_bytes().to_vec(),
        }
    }

    /// Payload up to the first NUL, decoded leniently.
    pub fn as_str(&self) -> Cow<'_, str> {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data.len());
        String::from_utf8_lossy(&self.data[..end])
    }

    /// First four payload bytes as a u32, if present.
    pub fn as_u32(&self) -> Option<u32> {
        crate::codec::take4(&self.data).map(crate::codec::to_u32)
    }

    /// Whether this subrecord needs the `XXXX` extended form.
    pub fn is_extended(&self) -> bool {
        self.data.len() > u16::MAX as usize
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        let base = SUBRECORD_HEADER_LEN + self.data.len();
        if self.is_extended() {
            base + EXTENDED_PREFIX_LEN
        } else {
            base
        }
    }

    fn write(&self, w: &mut Writer) {
        if self.is_extended() {
            w.write_tag(&XXXX);
            w.write_u16(4);
            w.write_u32(self.data.len() as u32);
            w.write_tag(&self.tag);
            w.write_u16(0);
        } else {
            w.write_tag(&self.tag);
            w.write_u16(self.data.len() as u16);
        }
        w.write_bytes(&self.data);
    }
}

/// A game object: type tag, flags, form-id and its subrecords.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub tag: Tag,
    pub flags: u32,
    /// Top byte is the load index of the owning master.
    pub form_id: u32,
    pub flags2: u32,
    /// Only present in the modern header layout; zero otherwise.
    pub flags3: u32,
    pub subrecords: Vec<Subrecord>,
}

impl Record {
    pub fn new(tag: Tag, form_id: u32) -> Self {
        Self {
            tag,
            flags: 0,
            form_id,
            flags2: 0,
            flags3: 0,
            subrecords: Vec::new(),
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & COMPRESSED_FLAG != 0
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        if compressed {
            self.flags |= COMPRESSED_FLAG;
        } else {
            self.flags &= !COMPRESSED_FLAG;
        }
    }

    /// First subrecord with the given tag.
    pub fn subrecord(&self, tag: &Tag) -> Option<&Subrecord> {
        self.subrecords.iter().find(|s| &s.tag == tag)
    }

    /// All subrecords with the given tag, in order.
    pub fn subrecords_with<'a>(&'a self, tag: &'a Tag) -> impl Iterator<Item = &'a Subrecord> + 'a {
        self.subrecords.iter().filter(move |s| &s.tag == tag)
    }

    /// The `EDID` subrecord's string, if any.
    pub fn editor_id(&self) -> Option<Cow<'_, str>> {
        self.subrecord(&EDID).map(Subrecord::as_str)
    }

    /// Size of the uncompressed subrecord payload.
    pub fn payload_size(&self) -> usize {
        self.subrecords.iter().map(Subrecord::size).sum()
    }

    /// Serialized size including the header. For compressed records this
    /// is the size before deflating.
    pub fn size(&self, format: Format) -> usize {
        format.record_header_len() + self.payload_size()
    }

    fn parse_body(
        c: &mut Cursor<'_>,
        start: usize,
        tag: Tag,
        size: usize,
        format: Format,
        scratch: &mut Scratch,
    ) -> Result<Self> {
        let flags = c.read_u32()?;
        let form_id = c.read_u32()?;
        let flags2 = c.read_u32()?;
        let flags3 = if format.has_extended_header() {
            c.read_u32()?
        } else {
            0
        };
        let payload_offset = c.offset();
        let payload = c.read_bytes(size)?;

        let subrecords = if flags & COMPRESSED_FLAG != 0 {
            if size < 4 {
                return Err(Error::SizeMismatch {
                    kind: "compressed record",
                    tag: tag_str(&tag),
                    offset: start,
                    declared: size,
                    consumed: 4,
                });
            }
            let declared = crate::codec::to_u32([payload[0], payload[1], payload[2], payload[3]]) as usize;
            let inflated = match compression::inflate(&payload[4..], declared, scratch) {
                Ok((bytes, _)) => bytes,
                Err(InflateFailure::Corrupt(message)) => {
                    return Err(Error::Inflate {
                        tag,
                        form_id,
                        message,
                    })
                }
                Err(InflateFailure::Length { actual }) => {
                    return Err(Error::InflatedSize {
                        tag,
                        form_id,
                        declared,
                        actual,
                    })
                }
            };
            parse_subrecords(Cursor::with_base(inflated, payload_offset + 4), &tag, start)?
        } else {
            parse_subrecords(Cursor::with_base(payload, payload_offset), &tag, start)?
        };

        Ok(Self {
            tag,
            flags,
            form_id,
            flags2,
            flags3,
            subrecords,
        })
    }

    /// Serialize this record, compressing the payload if the flag is set.
    pub fn write(&self, w: &mut Writer, format: Format) -> Result<()> {
        let mut payload = Writer::with_capacity(self.payload_size());
        for sub in &self.subrecords {
            sub.write(&mut payload);
        }
        let payload = payload.into_bytes();

        w.write_tag(&self.tag);
        if self.is_compressed() {
            let packed = compression::deflate(&payload).map_err(|source| Error::Deflate {
                tag: self.tag,
                form_id: self.form_id,
                source,
            })?;
            w.write_u32((packed.len() + 4) as u32);
            self.write_header_words(w, format);
            w.write_u32(payload.len() as u32);
            w.write_bytes(&packed);
        } else {
            w.write_u32(payload.len() as u32);
            self.write_header_words(w, format);
            w.write_bytes(&payload);
        }
        Ok(())
    }

    fn write_header_words(&self, w: &mut Writer, format: Format) {
        w.write_u32(self.flags);
        w.write_u32(self.form_id);
        w.write_u32(self.flags2);
        if format.has_extended_header() {
            w.write_u32(self.flags3);
        }
    }
}

/// Read subrecords until the cursor's data (the record payload) is used up.
fn parse_subrecords(mut c: Cursor<'_>, record_tag: &Tag, record_offset: usize) -> Result<Vec<Subrecord>> {
    let declared = c.remaining();
    let overrun = |consumed: usize| Error::SizeMismatch {
        kind: "record",
        tag: tag_str(record_tag),
        offset: record_offset,
        declared,
        consumed,
    };

    let mut subrecords = Vec::new();
    while !c.is_empty() {
        let start = c.position();
        if c.remaining() < SUBRECORD_HEADER_LEN {
            return Err(overrun(start + SUBRECORD_HEADER_LEN));
        }
        let mut tag = c.read_tag()?;
        let mut size = c.read_u16()? as usize;
        if tag == XXXX {
            if c.remaining() < 4 + SUBRECORD_HEADER_LEN {
                return Err(overrun(c.position() + 4 + SUBRECORD_HEADER_LEN));
            }
            size = c.read_u32()? as usize;
            tag = c.read_tag()?;
            // The real header's own size field is meaningless here.
            c.skip(2)?;
        }
        if size > c.remaining() {
            return Err(overrun(c.position() + size));
        }
        let data = c.read_bytes(size)?.to_vec();
        subrecords.push(Subrecord { tag, data });
    }
    Ok(subrecords)
}

/// How a group's label is to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// Label is a record type tag.
    Top,
    /// Label is a worldspace form-id.
    WorldChildren,
    /// Label is a block number.
    InteriorCellBlock,
    InteriorCellSubBlock,
    /// Label is a grid coordinate pair (y, x).
    ExteriorCellBlock,
    ExteriorCellSubBlock,
    /// Label is a cell form-id.
    CellChildren,
    /// Label is a dialogue topic form-id.
    TopicChildren,
    CellPersistentChildren,
    CellTemporaryChildren,
    CellVisibleDistantChildren,
    Other(i32),
}

impl GroupKind {
    pub fn from_i32(v: i32) -> Self {
        match v {
            0 => Self::Top,
            1 => Self::WorldChildren,
            2 => Self::InteriorCellBlock,
            3 => Self::InteriorCellSubBlock,
            4 => Self::ExteriorCellBlock,
            5 => Self::ExteriorCellSubBlock,
            6 => Self::CellChildren,
            7 => Self::TopicChildren,
            8 => Self::CellPersistentChildren,
            9 => Self::CellTemporaryChildren,
            10 => Self::CellVisibleDistantChildren,
            other => Self::Other(other),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Self::Top => 0,
            Self::WorldChildren => 1,
            Self::InteriorCellBlock => 2,
            Self::InteriorCellSubBlock => 3,
            Self::ExteriorCellBlock => 4,
            Self::ExteriorCellSubBlock => 5,
            Self::CellChildren => 6,
            Self::TopicChildren => 7,
            Self::CellPersistentChildren => 8,
            Self::CellTemporaryChildren => 9,
            Self::CellVisibleDistantChildren => 10,
            Self::Other(v) => v,
        }
    }
}

/// A container of records and nested groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub label: [u8; 4],
    pub kind: GroupKind,
    pub timestamp: u32,
    /// Only present in the modern header layout; zero otherwise.
    pub flags: u32,
    pub children: Vec<Entry>,
}

impl Group {
    /// A top-level group holding records of type `tag`.
    pub fn top(tag: Tag) -> Self {
        Self {
            label: tag,
            kind: GroupKind::Top,
            timestamp: 0,
            flags: 0,
            children: Vec::new(),
        }
    }

    /// Human-readable label according to the group kind.
    pub fn label_desc(&self) -> String {
        let as_u32 = u32::from_le_bytes(self.label);
        match self.kind {
            GroupKind::Top => tag_str(&self.label),
            GroupKind::InteriorCellBlock | GroupKind::InteriorCellSubBlock => {
                format!("block {}", i32::from_le_bytes(self.label))
            }
            GroupKind::ExteriorCellBlock | GroupKind::ExteriorCellSubBlock => {
                let y = i16::from_le_bytes([self.label[0], self.label[1]]);
                let x = i16::from_le_bytes([self.label[2], self.label[3]]);
                format!("grid {x}, {y}")
            }
            _ => format!("{as_u32:08X}"),
        }
    }

    /// Serialized size including the header, with compressed children
    /// counted before deflating.
    pub fn size(&self, format: Format) -> usize {
        format.group_header_len() + self.children.iter().map(|c| c.size(format)).sum::<usize>()
    }

    fn parse_body(
        c: &mut Cursor<'_>,
        start: usize,
        size: usize,
        format: Format,
        scratch: &mut Scratch,
    ) -> Result<Self> {
        let header_len = format.group_header_len();
        if size < header_len {
            return Err(Error::SizeMismatch {
                kind: "group",
                tag: "GRUP".into(),
                offset: start,
                declared: size,
                consumed: header_len,
            });
        }
        let label = c.read_tag()?;
        let kind = GroupKind::from_i32(c.read_i32()?);
        let timestamp = c.read_u32()?;
        let flags = if format.has_extended_header() {
            c.read_u32()?
        } else {
            0
        };

        let mut consumed = header_len;
        let mut children = Vec::new();
        while consumed < size {
            let before = c.position();
            children.push(Entry::parse(c, format, scratch)?);
            consumed += c.position() - before;
            if consumed > size {
                return Err(Error::SizeMismatch {
                    kind: "group",
                    tag: format!("{} ({})", tag_str(&label), kind.as_i32()),
                    offset: start,
                    declared: size,
                    consumed,
                });
            }
        }

        Ok(Self {
            label,
            kind,
            timestamp,
            flags,
            children,
        })
    }

    /// Serialize the group; its size field is backpatched after the children.
    pub fn write(&self, w: &mut Writer, format: Format) -> Result<()> {
        let start = w.position();
        w.write_tag(&GRUP);
        let size_pos = w.position();
        w.write_u32(0);
        w.write_tag(&self.label);
        w.write_i32(self.kind.as_i32());
        w.write_u32(self.timestamp);
        if format.has_extended_header() {
            w.write_u32(self.flags);
        }
        for child in &self.children {
            child.write(w, format)?;
        }
        let size = w.position() - start;
        w.patch_u32(size_pos, size as u32);
        Ok(())
    }
}

/// One node of a plugin's top-level list or of a group's children.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Group(Group),
    Record(Record),
}

impl Entry {
    /// Parse one group or record at the cursor.
    pub fn parse(c: &mut Cursor<'_>, format: Format, scratch: &mut Scratch) -> Result<Self> {
        let start = c.offset();
        let tag = c.read_tag()?;
        let size = c.read_u32()? as usize;
        if tag == GRUP {
            Group::parse_body(c, start, size, format, scratch).map(Entry::Group)
        } else {
            Record::parse_body(c, start, tag, size, format, scratch).map(Entry::Record)
        }
    }

    pub fn write(&self, w: &mut Writer, format: Format) -> Result<()> {
        match self {
            Entry::Group(g) => g.write(w, format),
            Entry::Record(r) => r.write(w, format),
        }
    }

    pub fn size(&self, format: Format) -> usize {
        match self {
            Entry::Group(g) => g.size(format),
            Entry::Record(r) => r.size(format),
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Entry::Record(r) => Some(r),
            Entry::Group(_) => None,
        }
    }

    /// Depth-first, pre-order walk over this entry and everything below it.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![Node::from(self)],
        }
    }
}

/// Borrowed view of any node in the tree.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Group(&'a Group),
    Record(&'a Record),
    Subrecord(&'a Subrecord),
}

impl<'a> From<&'a Entry> for Node<'a> {
    fn from(entry: &'a Entry) -> Self {
        match entry {
            Entry::Group(g) => Node::Group(g),
            Entry::Record(r) => Node::Record(r),
        }
    }
}

/// Iterator returned by [`Entry::walk`] and [`crate::Plugin::walk`].
pub struct Walk<'a> {
    stack: Vec<Node<'a>>,
}

impl<'a> Walk<'a> {
    pub(crate) fn over(entries: &'a [Entry]) -> Self {
        Self {
            stack: entries.iter().rev().map(Node::from).collect(),
        }
    }

    /// Only the records encountered by the walk.
    pub fn records(self) -> impl Iterator<Item = &'a Record> {
        self.filter_map(|node| match node {
            Node::Record(r) => Some(r),
            Node::Group(_) | Node::Subrecord(_) => None,
        })
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        let node = self.stack.pop()?;
        match node {
            Node::Group(g) => self.stack.extend(g.children.iter().rev().map(Node::from)),
            Node::Record(r) => self
                .stack
                .extend(r.subrecords.iter().rev().map(Node::Subrecord)),
            Node::Subrecord(_) => {}
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(bytes: &[u8], format: Format) -> Result<Entry> {
        let mut c = Cursor::new(bytes);
        Entry::parse(&mut c, format, &mut Scratch::new())
    }

    #[test]
    fn subrecord_size_switches_to_extended_form() {
        let small = Subrecord::new(*b"DATA", vec![0; 65535]);
        let big = Subrecord::new(*b"DATA", vec![0; 65536]);
        assert_eq!(small.size(), 6 + 65535);
        assert_eq!(big.size(), 16 + 65536);
    }

    #[test]
    fn record_overrun_is_structural_error() {
        // Record declares 8 payload bytes, subrecord claims 10.
        let mut w = Writer::new();
        w.write_tag(b"GLOB");
        w.write_u32(8);
        w.write_u32(0);
        w.write_u32(0x0100_0ABC);
        w.write_u32(0);
        w.write_tag(b"EDID");
        w.write_u16(10);
        w.write_bytes(&[b'a', 0]);
        let err = parse_one(w.as_slice(), Format::Legacy).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { kind: "record", .. }), "{err}");
    }

    #[test]
    fn group_overrun_is_structural_error() {
        let mut record = Writer::new();
        Record::new(*b"GLOB", 1).write(&mut record, Format::Legacy).unwrap();
        let record = record.into_bytes();

        let mut w = Writer::new();
        w.write_tag(&GRUP);
        // One byte short of holding the child record.
        w.write_u32((20 + record.len() - 1) as u32);
        w.write_tag(b"GLOB");
        w.write_i32(0);
        w.write_u32(0);
        w.write_bytes(&record);
        let err = parse_one(w.as_slice(), Format::Legacy).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { kind: "group", .. }), "{err}");
    }

    #[test]
    fn walk_visits_in_preorder() {
        let mut rec = Record::new(*b"GLOB", 1);
        rec.subrecords.push(Subrecord::from_zstring(EDID, "Foo"));
        let mut inner = Group::top(*b"GLOB");
        inner.children.push(Entry::Record(rec));
        let mut outer = Group::top(*b"WRLD");
        outer.children.push(Entry::Group(inner));
        let entry = Entry::Group(outer);

        let kinds: Vec<&str> = entry
            .walk()
            .map(|n| match n {
                Node::Group(_) => "group",
                Node::Record(_) => "record",
                Node::Subrecord(_) => "subrecord",
            })
            .collect();
        assert_eq!(kinds, ["group", "group", "record", "subrecord"]);
        assert_eq!(entry.walk().records().count(), 1);
    }

    #[test]
    fn sizes_match_serialized_length() {
        let mut rec = Record::new(*b"GLOB", 1);
        rec.subrecords.push(Subrecord::from_zstring(EDID, "Foo"));
        let mut group = Group::top(*b"GLOB");
        group.children.push(Entry::Record(rec));
        for format in [Format::Legacy, Format::Modern] {
            let mut w = Writer::new();
            group.write(&mut w, format).unwrap();
            assert_eq!(group.size(format), w.position());
        }
    }

    #[test]
    fn exterior_label_reads_grid() {
        let mut g = Group::top(*b"CELL");
        g.kind = GroupKind::ExteriorCellBlock;
        g.label = [0xFF, 0xFF, 0x02, 0x00];
        assert_eq!(g.label_desc(), "grid 2, -1");
    }
}
