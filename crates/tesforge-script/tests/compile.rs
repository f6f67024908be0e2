use std::sync::Arc;

use tesforge_script::emit::split_statements;
use tesforge_script::symbols::{FormInfo, SCRI};
use tesforge_script::{
    compile_result_script, compile_script, compile_source, Catalog, CompileContext, CompileError, CompileOptions,
    Reference, ScriptType, VarKind,
};
use tesplugin::record::EDID;
use tesplugin::schema::Schema;
use tesplugin::{Entry, Format, Group, LoadOptions, Plugin, Record, Subrecord};

fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::embedded().unwrap())
}

fn record(tag: &[u8; 4], form_id: u32, edid: &str) -> Record {
    let mut r = Record::new(*tag, form_id);
    r.subrecords.push(Subrecord::from_zstring(EDID, edid));
    r
}

fn script_record(form_id: u32, script_type: u32, source: &str) -> Record {
    let mut r = Record::new(*b"SCPT", form_id);
    let mut schr = vec![0u8; 20];
    schr[16..].copy_from_slice(&script_type.to_le_bytes());
    r.subrecords.push(Subrecord::new(*b"SCHR", schr));
    r.subrecords.push(Subrecord::new(*b"SCTX", source.as_bytes().to_vec()));
    r
}

fn push_group(plugin: &mut Plugin, record: Record) {
    let mut group = Group::top(record.tag);
    group.children.push(Entry::Record(record));
    plugin.entries.push(Entry::Group(group));
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn u32_at(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

/// `Base.esm` defines a quest whose script has a `counter` variable.
fn base_master() -> Plugin {
    let mut plugin = Plugin::new(Format::Legacy);
    let mut script = record(b"SCPT", 0x0000_0A00, "MyQuestScript");
    let mut slsd = vec![0u8; 24];
    slsd[0] = 1;
    slsd[16] = 1;
    script.subrecords.push(Subrecord::new(*b"SLSD", slsd));
    script.subrecords.push(Subrecord::from_zstring(*b"SCVR", "counter"));
    push_group(&mut plugin, script);

    let mut quest = record(b"QUST", 0x0000_0B00, "MyQuest");
    quest.subrecords.push(Subrecord::from_u32(SCRI, 0x0000_0A00));
    push_group(&mut plugin, quest);
    plugin
}

#[test]
fn minimal_script_record() {
    let ctx = CompileContext::new(catalog());
    let mut rec = script_record(0x0100_0900, 1, "ScriptName Test\nbegin GameMode\nend\n");
    let compiled = compile_script(&ctx, &mut rec).unwrap();

    assert_eq!(compiled.script_type, ScriptType::Quest);
    assert_eq!(rec.editor_id().as_deref(), Some("Test"));
    let schr = rec.subrecord(b"SCHR").unwrap();
    assert_eq!(u32_at(&schr.data, 4), 0);
    assert_eq!(u32_at(&schr.data, 8), 14);
    assert_eq!(u32_at(&schr.data, 12), 0);
    assert_eq!(u32_at(&schr.data, 16), 1);
    assert_eq!(
        rec.subrecord(b"SCDA").unwrap().data,
        [0x10, 0, 6, 0, 0, 0, 4, 0, 0, 0, 0x11, 0, 0, 0]
    );
    assert_eq!(rec.subrecord(b"SCTX").unwrap().as_str(), "ScriptName Test\nbegin GameMode\nend\n");
}

#[test]
fn failed_compile_leaves_record_alone() {
    let ctx = CompileContext::new(catalog());
    let mut rec = script_record(0x0100_0900, 0, "scn Broken\nbegin GameMode\nendif\nend");
    let before = rec.clone();
    assert!(compile_script(&ctx, &mut rec).is_err());
    assert_eq!(rec, before);

    let mut no_source = Record::new(*b"SCPT", 1);
    assert!(matches!(
        compile_script(&ctx, &mut no_source),
        Err(CompileError::Structural { .. })
    ));
}

#[test]
fn precedence_in_emitted_bytecode() {
    let ctx = CompileContext::new(catalog());
    let script = compile_result_script(&ctx, "short x\nset x to 2 + 3 * 4").unwrap();
    assert_eq!(script.editor_id, None);
    assert_eq!(script.script_type, ScriptType::Result);
    let star = script.bytecode.windows(2).position(|w| w == b" *").unwrap();
    let plus = script.bytecode.windows(2).position(|w| w == b" +").unwrap();
    assert!(star < plus);
    // Result scripts have no begin statement.
    assert_eq!(split_statements(&script.bytecode).unwrap()[0].opcode, 0x15);
}

#[test]
fn result_script_rejects_blocks() {
    let ctx = CompileContext::new(catalog());
    let err = compile_result_script(&ctx, "short x\nset x to 1\nend").unwrap_err();
    let diagnostics = err.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].line, 3);
    assert!(diagnostics[0].message.contains("result script"));
}

#[test]
fn elseif_without_if() {
    let ctx = CompileContext::new(catalog());
    let err = compile_source(&ctx, "scn T\nbegin GameMode\nelseif 1\nend", ScriptType::Object).unwrap_err();
    assert!(err.to_string().contains("without matching if"), "{err}");
}

#[test]
fn undeclared_identifier_is_fatal_by_default() {
    let source = "scn T\nbegin GameMode\nset nothing to 1\nset other to 2\nend";
    let ctx = CompileContext::new(catalog());
    let err = compile_source(&ctx, source, ScriptType::Object).unwrap_err();
    assert!(
        matches!(&err, CompileError::Structural { line: 3, message } if message.contains("nothing")),
        "{err}"
    );

    // Relaxed: every unknown name is reported.
    let ctx = CompileContext::new(catalog()).with_options(CompileOptions::relaxed(&["undeclared"]));
    let err = compile_source(&ctx, source, ScriptType::Object).unwrap_err();
    assert_eq!(err.diagnostics().len(), 2);
}

#[test]
fn locals_and_reference_list() {
    let mut ctx = CompileContext::new(catalog());
    ctx.symbols.insert_editor_id(
        "Gold001",
        FormInfo {
            form_id: 0x0000_000F,
            tag: *b"MISC",
        },
    );
    let source = "scn Chest\nfloat timer\nref opener\nshort count\nref other\n\
        begin OnActivate\n\
        set opener to GetActionRef\n\
        opener.AddItem Gold001 10\n\
        set count to count + 1\n\
        set timer to 2.5\n\
        end";
    let script = compile_source(&ctx, source, ScriptType::Object).unwrap();

    let kinds: Vec<(u16, VarKind)> = script.locals.iter().map(|l| (l.slot, l.kind)).collect();
    assert_eq!(
        kinds,
        [(1, VarKind::Float), (2, VarKind::Ref), (3, VarKind::Int), (4, VarKind::Ref)]
    );
    // Ref locals first, then forms in order of use.
    assert_eq!(
        script.references,
        [Reference::Local(2), Reference::Local(4), Reference::Form(0x0F)]
    );
    // opener.AddItem: reference-call prefix naming reference 1.
    assert!(contains(&script.bytecode, &[0x1C, 0, 1, 0, 0x02, 0x10]));
    // Float local assignment.
    assert!(contains(&script.bytecode, &[b'f', 1, 0]));

    let subrecords = script.subrecords();
    let tags: Vec<String> = subrecords.iter().map(|s| String::from_utf8_lossy(&s.tag).into_owned()).collect();
    assert_eq!(
        tags,
        [
            "EDID", "SCHR", "SCDA", "SCTX", "SLSD", "SCVR", "SLSD", "SCVR", "SLSD", "SCVR", "SLSD", "SCVR", "SCRV",
            "SCRV", "SCRO",
        ]
    );
    // Float locals carry a zero type flag.
    assert_eq!(subrecords[4].data[16], 0);
    assert_eq!(subrecords[6].data[16], 1);
}

#[test]
fn setup_resolves_master_symbols() {
    let master = base_master();
    let mut active = Plugin::new(Format::Legacy);
    active.add_master("Base.esm");
    push_group(&mut active, record(b"MESG", 0x0100_0800, "HelloMsg"));
    let source = "scn QuestWatcher\nshort count\nref target\n\
        begin GameMode\n\
        set target to player\n\
        if GetStage MyQuest >= 10 && MyQuest.counter < 3\n\
        set MyQuest.counter to MyQuest.counter + 1\n\
        ShowMessage HelloMsg count\n\
        endif\n\
        target.Disable\n\
        end";
    push_group(&mut active, script_record(0x0100_0900, 0, source));

    let ctx = CompileContext::setup(catalog(), &active, &[("Base.esm", &master)]);
    let mut rec = active.find_form(0x0100_0900).unwrap().clone();
    let script = compile_script(&ctx, &mut rec).unwrap();

    assert_eq!(
        script.references,
        [
            Reference::Local(2),
            Reference::Form(0x0000_0014),
            Reference::Form(0x0000_0B00),
            Reference::Form(0x0100_0800),
        ]
    );
    let opcodes: Vec<u16> = split_statements(&script.bytecode).unwrap().iter().map(|s| s.opcode).collect();
    assert_eq!(opcodes, [0x10, 0x15, 0x16, 0x15, 0x1185, 0x19, 0x1C, 0x1022, 0x11]);

    // MyQuest.counter as an assignment target.
    assert!(contains(&script.bytecode, &[b'r', 3, 0, b's', 1, 0]));
    // ShowMessage: message reference, then the local as an extra argument.
    assert!(contains(&script.bytecode, &[0x85, 0x11, 8, 0, 2, 0, b'r', 4, 0, b's', 1, 0]));

    // The rewritten record is well-formed.
    let text = Schema::embedded().unwrap().describe(&rec);
    assert!(!text.contains("Warning"), "{text}");
    push_group(&mut active, rec);
    let bytes = active.to_bytes().unwrap();
    let reparsed = Plugin::parse(&bytes, &LoadOptions::default()).unwrap();
    assert!(reparsed.find_editor_id("QuestWatcher").is_some());
}

#[test]
fn message_box_takes_a_string_and_variables() {
    let ctx = CompileContext::new(catalog());
    let script = compile_result_script(&ctx, "short gold\nMessageBox \"You have %g gold\" gold").unwrap();
    let text = b"You have %g gold";
    let mut expected = vec![0x57, 0x10];
    let param_len = (2 + 2 + text.len() + 3) as u16;
    expected.extend_from_slice(&param_len.to_le_bytes());
    expected.extend_from_slice(&[2, 0]);
    expected.extend_from_slice(&(text.len() as u16).to_le_bytes());
    expected.extend_from_slice(text);
    expected.extend_from_slice(&[b's', 1, 0]);
    assert_eq!(script.bytecode, expected);
}

#[test]
fn functions_without_a_result_are_rejected_as_values() {
    let ctx = CompileContext::new(catalog());
    let source = "scn T\nshort x\nbegin GameMode\nset x to Disable\nif Enable\nendif\nend";
    let err = compile_source(&ctx, source, ScriptType::Object).unwrap_err();
    let diagnostics = err.diagnostics();
    let lines: Vec<usize> = diagnostics.iter().map(|d| d.line).collect();
    assert_eq!(lines, [4, 5]);
    assert!(diagnostics[0].message.contains("'Disable' does not return a value"));
    assert!(diagnostics[1].message.contains("'Enable' does not return a value"));

    // As statements they are fine.
    let script = compile_source(&ctx, "scn T\nbegin GameMode\nDisable\nend", ScriptType::Object).unwrap();
    assert!(contains(&script.bytecode, &[0x22, 0x10]));
}

#[test]
fn string_argument_longer_than_a_length_field_is_rejected() {
    let ctx = CompileContext::new(catalog());
    let source = format!("MessageBox \"{}\"", "a".repeat(70_000));
    let err = compile_result_script(&ctx, &source).unwrap_err();
    let diagnostics = err.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.contains("string argument too long"), "{err}");
}

#[test]
fn int_parameters_take_whole_numbers_only() {
    let mut ctx = CompileContext::new(catalog());
    ctx.symbols.insert_editor_id(
        "Gold001",
        FormInfo {
            form_id: 0x0000_000F,
            tag: *b"MISC",
        },
    );
    let err = compile_source(&ctx, "scn T\nbegin GameMode\nAddItem Gold001 2.7\nend", ScriptType::Object).unwrap_err();
    assert!(err.to_string().contains("whole number"), "{err}");

    let script = compile_source(&ctx, "scn T\nbegin GameMode\nAddItem Gold001 3.0\nend", ScriptType::Object).unwrap();
    assert!(contains(&script.bytecode, &[b'n', 3, 0, 0, 0]));
}
