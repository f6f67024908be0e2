//! Render parsed records as human-readable text using their schema layout.

use std::fmt::Write as _;

use super::{CompareOp, Condition, ElementDef, ElementKind, Operand, RecordDef, Schema, SubrecordRule};
use crate::cursor::Cursor;
use crate::record::{tag_str, Record, Subrecord, Tag};

const MISMATCH_WARNING: &str = "Warning: Subrecord doesn't seem to match the expected structure";

/// An element value decoded while rendering, kept for display conditions.
#[derive(Debug, Clone)]
enum Value {
    Number(f64),
    Text(String),
    Bytes,
}

/// The subrecord bytes did not fit the rule's element layout.
struct Mismatch;

impl Schema {
    /// Multi-line description of a record: a header line, then each
    /// subrecord with its decoded elements.
    pub fn describe(&self, record: &Record) -> String {
        let mut out = String::new();
        let def = self.record(&record.tag);
        let _ = writeln!(
            out,
            "{} {:08X}{}",
            tag_str(&record.tag),
            record.form_id,
            def.map(|d| format!(" ({})", d.desc)).unwrap_or_default()
        );
        let _ = writeln!(out, "Flags: {:08X}", record.flags);
        if let Some(edid) = record.editor_id() {
            let _ = writeln!(out, "Editor ID: {edid}");
        }

        let Some(def) = def else {
            let _ = writeln!(out, "No structure information for record type {}", tag_str(&record.tag));
            for sub in &record.subrecords {
                render_unknown(&mut out, sub);
            }
            return out;
        };

        let mut values = Vec::new();
        let mut pos = 0;
        for sub in &record.subrecords {
            match match_rule(def, pos, sub, &values) {
                Some(index) => {
                    let rule = &def.rules[index];
                    render_rule(&mut out, rule, sub, &mut values);
                    pos = next_position(def, index);
                }
                None => render_unknown(&mut out, sub),
            }
        }
        out
    }

    /// Render one subrecord on its own (`GetFormattedData`).
    ///
    /// Without the rest of the record there are no values to test display
    /// conditions against, so the first rule with a matching tag is used.
    pub fn format_subrecord(&self, record_tag: &Tag, sub: &Subrecord) -> String {
        let mut out = String::new();
        let rule = self
            .record(record_tag)
            .and_then(|def| def.rules.iter().find(|r| r.name == sub.tag));
        match rule {
            Some(rule) => render_rule(&mut out, rule, sub, &mut Vec::new()),
            None => render_unknown(&mut out, sub),
        }
        out
    }
}

/// Find the rule for `sub`, scanning forward from `pos` first and wrapping
/// to the start if nothing ahead matches.
fn match_rule(def: &RecordDef, pos: usize, sub: &Subrecord, values: &[Value]) -> Option<usize> {
    let fits = |i: &usize| {
        let rule = &def.rules[*i];
        rule.name == sub.tag && rule.condition.as_ref().is_none_or(|c| condition_holds(c, values))
    };
    (pos..def.rules.len()).find(fits).or_else(|| (0..pos.min(def.rules.len())).find(fits))
}

/// Where matching resumes after rule `index`: back at the start of the
/// innermost repeat span that `index` closes, else just past it.
fn next_position(def: &RecordDef, index: usize) -> usize {
    (0..=index)
        .rev()
        .find(|&s| def.rules[s].repeat > 0 && s + def.rules[s].repeat == index + 1)
        .unwrap_or(index + 1)
}

fn condition_holds(condition: &Condition, values: &[Value]) -> bool {
    let Some(value) = values.get(condition.target) else {
        return false;
    };
    match (value, &condition.operand) {
        (Value::Number(v), Operand::Number(x)) => {
            let (v, x) = (*v, *x);
            match condition.op {
                CompareOp::Equal => v == x,
                CompareOp::NotEqual => v != x,
                CompareOp::Greater => v > x,
                CompareOp::Less => v < x,
                CompareOp::GreaterEqual => v >= x,
                CompareOp::LessEqual => v <= x,
                CompareOp::Mask => (v as i64) & (x as i64) != 0,
                CompareOp::StartsWith => false,
            }
        }
        (Value::Text(v), Operand::Text(x)) => match condition.op {
            CompareOp::Equal => v.eq_ignore_ascii_case(x),
            CompareOp::NotEqual => !v.eq_ignore_ascii_case(x),
            CompareOp::StartsWith => v.to_ascii_lowercase().starts_with(&x.to_ascii_lowercase()),
            _ => false,
        },
        _ => false,
    }
}

fn render_rule(out: &mut String, rule: &SubrecordRule, sub: &Subrecord, values: &mut Vec<Value>) {
    if rule.desc.is_empty() {
        let _ = writeln!(out, "[{}]", tag_str(&sub.tag));
    } else {
        let _ = writeln!(out, "[{}] {}", tag_str(&sub.tag), rule.desc);
    }
    // Values from a subrecord that fails to decode are not kept.
    let mut decoded = Vec::new();
    let mut lines = String::new();
    match render_elements(&mut lines, &rule.elements, &sub.data, &mut decoded) {
        Ok(()) => {
            out.push_str(&lines);
            values.extend(decoded);
        }
        Err(Mismatch) => {
            let _ = writeln!(out, "  {MISMATCH_WARNING}");
            render_hex(out, &sub.data);
        }
    }
}

fn render_elements(
    out: &mut String,
    elements: &[ElementDef],
    data: &[u8],
    values: &mut Vec<Value>,
) -> Result<(), Mismatch> {
    let n = elements.len();
    if n == 0 {
        if !data.is_empty() {
            render_hex(out, data);
        }
        return Ok(());
    }
    let last = &elements[n - 1];
    let repeat_start = (last.repeat > 0).then(|| n - last.repeat);
    let optional_start = (last.optional > 0).then(|| n - last.optional);

    let mut c = Cursor::new(data);
    let mut i = 0;
    loop {
        if i == n {
            match repeat_start {
                Some(start) if !c.is_empty() => {
                    i = start;
                    continue;
                }
                _ => break,
            }
        }
        if c.is_empty() && !elements[i].kind.is_whole_subrecord() {
            if optional_start.is_some_and(|s| i >= s) {
                break;
            }
            return Err(Mismatch);
        }
        let element = &elements[i];
        let value = read_value(&mut c, element.kind)?;
        render_value(out, element, &value, &mut c);
        values.push(value);
        i += 1;
    }
    if !c.is_empty() {
        return Err(Mismatch);
    }
    Ok(())
}

fn read_value(c: &mut Cursor<'_>, kind: ElementKind) -> Result<Value, Mismatch> {
    let value = match kind {
        ElementKind::Int => c.read_i32().map(|v| Value::Number(f64::from(v))),
        ElementKind::Float => c.read_f32().map(|v| Value::Number(f64::from(v))),
        ElementKind::Short => c.read_i16().map(|v| Value::Number(f64::from(v))),
        ElementKind::Byte => c.read_u8().map(|v| Value::Number(f64::from(v))),
        ElementKind::FormId => c.read_u32().map(|v| Value::Number(f64::from(v))),
        ElementKind::String => {
            let rest = c.peek_bytes(c.remaining()).map_err(|_| Mismatch)?;
            let end = rest.iter().position(|&b| b == 0).ok_or(Mismatch)?;
            let text = String::from_utf8_lossy(&rest[..end]).into_owned();
            c.skip(end + 1).map(|_| Value::Text(text))
        }
        ElementKind::FString => c
            .read_bytes(c.remaining())
            .map(|b| Value::Text(String::from_utf8_lossy(b).trim_end_matches('\0').to_string())),
        ElementKind::Blob => c.read_bytes(0).map(|_| Value::Bytes),
    };
    value.map_err(|_| Mismatch)
}

fn render_value(out: &mut String, element: &ElementDef, value: &Value, c: &mut Cursor<'_>) {
    let _ = write!(out, "  {}: ", element.name);
    match (element.kind, value) {
        (ElementKind::FormId, Value::Number(v)) => {
            let _ = write!(out, "0x{:08X}", *v as u32);
        }
        (ElementKind::Float, Value::Number(v)) => {
            let _ = write!(out, "{}", *v as f32);
        }
        (_, Value::Number(v)) => {
            let n = *v as i64;
            let _ = write!(out, "{n}");
            if let Some((_, name)) = element.options.iter().find(|(value, _)| *value == n) {
                let _ = write!(out, " ({name})");
            }
            if !element.flags.is_empty() {
                let set: Vec<&str> = element
                    .flags
                    .iter()
                    .enumerate()
                    .filter(|(bit, name)| !name.is_empty() && n & (1i64 << bit) != 0)
                    .map(|(_, name)| name.as_str())
                    .collect();
                let _ = write!(out, " {{{}}}", set.join(", "));
            }
        }
        (_, Value::Text(s)) => {
            let _ = write!(out, "{s}");
        }
        (_, Value::Bytes) => {
            // Blobs take the rest of the subrecord.
            let rest = c.read_bytes(c.remaining()).unwrap_or_default();
            let _ = write!(out, "{} bytes", rest.len());
            let _ = writeln!(out);
            render_hex(out, rest);
            return;
        }
    }
    let _ = writeln!(out);
}

fn render_unknown(out: &mut String, sub: &Subrecord) {
    let _ = writeln!(out, "[{}] ({} bytes)", tag_str(&sub.tag), sub.data.len());
    render_hex(out, &sub.data);
}

fn render_hex(out: &mut String, data: &[u8]) {
    for line in data.chunks(16) {
        let hex: Vec<String> = line.iter().map(|b| format!("{b:02X}")).collect();
        let _ = writeln!(out, "    {}", hex.join(" "));
    }
}
