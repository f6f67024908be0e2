use tesplugin::cursor::Writer;
use tesplugin::record::EDID;
use tesplugin::{Entry, Error, Format, Group, GroupKind, LoadOptions, Plugin, Record, Subrecord};

fn glob(form_id: u32, edid: &str, value: f32) -> Record {
    let mut rec = Record::new(*b"GLOB", form_id);
    rec.subrecords.push(Subrecord::from_zstring(EDID, edid));
    rec.subrecords.push(Subrecord::new(*b"FNAM", vec![b'f']));
    rec.subrecords
        .push(Subrecord::new(*b"FLTV", value.to_le_bytes().to_vec()));
    rec
}

fn round_trip(plugin: &Plugin) -> Plugin {
    let bytes = plugin.to_bytes().expect("serialize");
    let back = Plugin::parse(&bytes, &LoadOptions::default()).expect("parse");
    assert_eq!(back.to_bytes().expect("reserialize"), bytes);
    back
}

#[test]
fn ordinary_records_round_trip() {
    for format in [Format::Legacy, Format::Modern] {
        let mut plugin = Plugin::new(format);
        plugin.add_master("Oblivion.esm");
        let mut group = Group::top(*b"GLOB");
        group.timestamp = 0x1234;
        group.children.push(Entry::Record(glob(0x0100_0800, "TimeScale", 30.0)));
        group.children.push(Entry::Record(glob(0x0100_0801, "GameHour", 9.5)));
        plugin.entries.push(Entry::Group(group));

        let back = round_trip(&plugin);
        assert_eq!(back, plugin);
        assert_eq!(back.format, format);
        assert_eq!(back.masters(), ["Oblivion.esm"]);
        assert_eq!(
            back.find_editor_id("gamehour").map(|r| r.form_id),
            Some(0x0100_0801)
        );
    }
}

#[test]
fn extended_subrecord_round_trips() {
    let mut plugin = Plugin::new(Format::Modern);
    let mut rec = Record::new(*b"SCPT", 0x0100_0900);
    rec.subrecords.push(Subrecord::from_zstring(EDID, "BigScript"));
    let big: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
    rec.subrecords.push(Subrecord::new(*b"SCTX", big.clone()));
    rec.subrecords.push(Subrecord::new(*b"SCDA", vec![1, 2, 3]));
    let mut group = Group::top(*b"SCPT");
    group.children.push(Entry::Record(rec));
    plugin.entries.push(Entry::Group(group));

    let bytes = plugin.to_bytes().unwrap();
    // XXXX marker precedes the oversized subrecord.
    assert!(bytes.windows(4).any(|w| w == b"XXXX"));

    let back = round_trip(&plugin);
    let sctx = back
        .find_form(0x0100_0900)
        .and_then(|r| r.subrecord(b"SCTX"))
        .unwrap();
    assert_eq!(sctx.data, big);
    assert_eq!(back, plugin);
}

#[test]
fn nested_groups_round_trip() {
    let mut plugin = Plugin::new(Format::Legacy);

    let mut cell = Record::new(*b"CELL", 0x0000_1000);
    cell.subrecords.push(Subrecord::from_zstring(EDID, "TestCell"));
    cell.subrecords.push(Subrecord::new(*b"DATA", vec![1]));

    let mut refr = Record::new(*b"REFR", 0x0000_1001);
    refr.subrecords.push(Subrecord::from_u32(*b"NAME", 0x0000_2000));
    refr.subrecords.push(Subrecord::new(*b"DATA", vec![0; 24]));

    let mut temporary = Group::top(*b"CELL");
    temporary.kind = GroupKind::CellTemporaryChildren;
    temporary.label = 0x0000_1000u32.to_le_bytes();
    temporary.children.push(Entry::Record(refr));

    let mut children = Group::top(*b"CELL");
    children.kind = GroupKind::CellChildren;
    children.label = 0x0000_1000u32.to_le_bytes();
    children.children.push(Entry::Group(temporary));

    let mut sub_block = Group::top(*b"CELL");
    sub_block.kind = GroupKind::InteriorCellSubBlock;
    sub_block.label = 3i32.to_le_bytes();
    sub_block.children.push(Entry::Record(cell));
    sub_block.children.push(Entry::Group(children));

    let mut block = Group::top(*b"CELL");
    block.kind = GroupKind::InteriorCellBlock;
    block.label = 0i32.to_le_bytes();
    block.children.push(Entry::Group(sub_block));

    let mut top = Group::top(*b"CELL");
    top.children.push(Entry::Group(block));
    plugin.entries.push(Entry::Group(top));

    let back = round_trip(&plugin);
    assert_eq!(back, plugin);
    assert_eq!(back.stats().get("REFR"), Some(&1));
    assert_eq!(back.stats().get("CELL"), Some(&1));
    assert_eq!(back.find_form(0x0000_1001).map(|r| r.tag), Some(*b"REFR"));
}

#[test]
fn compressed_records_round_trip() {
    let mut plugin = Plugin::new(Format::Modern);
    let mut rec = glob(0x0100_0A00, "Packed", 1.0);
    rec.subrecords
        .push(Subrecord::new(*b"DATA", b"padding ".repeat(64)));
    rec.set_compressed(true);
    let mut group = Group::top(*b"GLOB");
    group.children.push(Entry::Record(rec.clone()));
    plugin.entries.push(Entry::Group(group));

    let bytes = plugin.to_bytes().unwrap();
    let mut raw = plugin.clone();
    if let Some(r) = raw.find_form_mut(0x0100_0A00) {
        r.set_compressed(false);
    }
    assert!(bytes.len() < raw.to_bytes().unwrap().len());

    let back = round_trip(&plugin);
    let parsed = back.find_form(0x0100_0A00).unwrap();
    assert!(parsed.is_compressed());
    assert_eq!(parsed, &rec);
}

#[test]
fn bad_checksum_is_tolerated() {
    let mut plugin = Plugin::new(Format::Legacy);
    let mut rec = glob(0x0100_0B00, "Tolerant", 2.0);
    rec.set_compressed(true);
    plugin.entries.push(Entry::Record(rec.clone()));

    let mut bytes = plugin.to_bytes().unwrap();
    // The compressed record is last, so its Adler-32 trailer ends the file.
    let n = bytes.len();
    bytes[n - 1] ^= 0x55;

    let back = Plugin::parse(&bytes, &LoadOptions::default()).unwrap();
    assert_eq!(back.find_form(0x0100_0B00), Some(&rec));
}

#[test]
fn corrupt_compressed_payload_is_fatal() {
    let mut w = Writer::new();
    Plugin::new(Format::Legacy)
        .entries
        .iter()
        .try_for_each(|e| e.write(&mut w, Format::Legacy))
        .unwrap();
    w.write_tag(b"GLOB");
    w.write_u32(10);
    w.write_u32(tesplugin::record::COMPRESSED_FLAG);
    w.write_u32(0x0100_0C00);
    w.write_u32(0);
    w.write_u32(32);
    w.write_bytes(&[0x78, 0x9C, 0xFF, 0xFF, 0xFF, 0xFF]);

    let err = Plugin::parse(w.as_slice(), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Inflate { form_id: 0x0100_0C00, .. }), "{err}");
}

#[test]
fn oversized_declared_length_is_an_error() {
    let packed = tesplugin::compression::deflate(b"tiny payload").unwrap();
    let mut w = Writer::new();
    Plugin::new(Format::Legacy)
        .entries
        .iter()
        .try_for_each(|e| e.write(&mut w, Format::Legacy))
        .unwrap();
    w.write_tag(b"GLOB");
    w.write_u32(4 + packed.len() as u32);
    w.write_u32(tesplugin::record::COMPRESSED_FLAG);
    w.write_u32(0x0100_0D00);
    w.write_u32(0);
    w.write_u32(u32::MAX);
    w.write_bytes(&packed);

    let err = Plugin::parse(w.as_slice(), &LoadOptions::default()).unwrap_err();
    assert!(
        matches!(
            err,
            Error::InflatedSize {
                form_id: 0x0100_0D00,
                actual: 12,
                ..
            }
        ),
        "{err}"
    );
}

#[test]
fn header_only_stops_after_tes4() {
    for format in [Format::Legacy, Format::Modern] {
        let mut plugin = Plugin::new(format);
        plugin.add_master("Fallout3.esm");
        let mut group = Group::top(*b"GLOB");
        group.children.push(Entry::Record(glob(0x0100_0800, "X", 0.0)));
        plugin.entries.push(Entry::Group(group));
        let bytes = plugin.to_bytes().unwrap();

        let header = Plugin::parse(&bytes, &LoadOptions::header_only()).unwrap();
        assert_eq!(header.entries.len(), 1);
        assert_eq!(header.masters(), ["Fallout3.esm"]);
    }
}

#[test]
fn parse_local_plugin() {
    let Some(path) = std::env::var_os("TESFORGE_PLUGIN") else {
        eprintln!("skipping: TESFORGE_PLUGIN not set");
        return;
    };
    let data = std::fs::read(&path).expect("failed to read plugin");
    let plugin = Plugin::parse(&data, &LoadOptions::default()).expect("failed to parse plugin");
    assert!(plugin.header().is_some());
    // Recompressed payloads may differ byte-wise, so compare trees.
    let bytes = plugin.to_bytes().expect("failed to serialize plugin");
    let back = Plugin::parse(&bytes, &LoadOptions::default()).expect("failed to reparse plugin");
    assert_eq!(back, plugin);
}
