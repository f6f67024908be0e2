//! Declarative record layouts.
//!
//! The schema says which subrecords a record type is expected to carry and
//! how each subrecord's bytes split into typed elements. It is purely an
//! interpretive layer: parsing and serialization never consult it.
//!
//! A process-wide schema is loaded from the embedded document on first use
//! and can be swapped out with [`reload`].

mod describe;
pub mod document;
mod load;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::info;

use crate::record::Tag;

/// The schema document shipped with the crate.
pub const EMBEDDED: &str = include_str!("records.json");

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("malformed schema document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{definition}: {message}")]
    Invalid { definition: String, message: String },
}

/// Semantic type of one element inside a subrecord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// 32-bit signed integer.
    Int,
    /// 32-bit IEEE float.
    Float,
    /// 16-bit signed integer.
    Short,
    /// Unsigned byte.
    Byte,
    /// 32-bit form-id reference.
    FormId,
    /// Null-terminated string.
    String,
    /// String filling the whole subrecord.
    FString,
    /// Opaque bytes filling the whole subrecord.
    Blob,
}

impl ElementKind {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "int" => Self::Int,
            "float" => Self::Float,
            "short" => Self::Short,
            "byte" => Self::Byte,
            "formid" => Self::FormId,
            "string" => Self::String,
            "fstring" => Self::FString,
            "blob" => Self::Blob,
            _ => return None,
        })
    }

    /// Whether this kind consumes the whole subrecord.
    pub fn is_whole_subrecord(self) -> bool {
        matches!(self, Self::FString | Self::Blob)
    }
}

#[derive(Debug, Clone)]
pub struct ElementDef {
    pub name: String,
    pub kind: ElementKind,
    pub repeat: usize,
    pub optional: usize,
    pub options: Vec<(i64, String)>,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    /// Bitwise AND with the operand is non-zero.
    Mask,
    /// String value starts with the operand.
    StartsWith,
}

impl CompareOp {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "eq" | "==" => Self::Equal,
            "ne" | "!=" => Self::NotEqual,
            "gt" | ">" => Self::Greater,
            "lt" | "<" => Self::Less,
            "ge" | ">=" => Self::GreaterEqual,
            "le" | "<=" => Self::LessEqual,
            "mask" | "&" => Self::Mask,
            "startswith" => Self::StartsWith,
            _ => return None,
        })
    }
}

pub use document::OperandDoc as Operand;

/// Display condition on a subrecord rule: the rule only applies when an
/// already-decoded element of the record compares true against `operand`.
#[derive(Debug, Clone)]
pub struct Condition {
    pub op: CompareOp,
    /// Flat index into the elements decoded so far in the record.
    pub target: usize,
    pub operand: Operand,
}

#[derive(Debug, Clone)]
pub struct SubrecordRule {
    pub name: Tag,
    pub desc: String,
    /// This rule and the following `repeat - 1` rules repeat as a unit.
    pub repeat: usize,
    /// This rule and the following `optional - 1` rules may be absent.
    pub optional: usize,
    pub condition: Option<Condition>,
    pub elements: Vec<ElementDef>,
}

impl SubrecordRule {
    /// Number of rules covered by this rule's repeat/optional span.
    pub fn span(&self) -> usize {
        self.repeat.max(self.optional)
    }
}

#[derive(Debug, Clone)]
pub struct RecordDef {
    pub name: Tag,
    pub desc: String,
    pub rules: Vec<SubrecordRule>,
}

/// Validated schema: record type → layout.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    records: HashMap<Tag, RecordDef>,
}

impl Schema {
    /// Parse and validate a schema document.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let doc: document::Document = serde_json::from_str(text)?;
        load::build(doc)
    }

    /// The schema shipped with the crate.
    pub fn embedded() -> Result<Self, SchemaError> {
        Self::from_json(EMBEDDED)
    }

    pub fn record(&self, tag: &Tag) -> Option<&RecordDef> {
        self.records.get(tag)
    }

    /// Description of a record type (`GetDesc`).
    pub fn record_desc(&self, tag: &Tag) -> Option<&str> {
        self.records.get(tag).map(|d| d.desc.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

static GLOBAL: RwLock<Option<Arc<Schema>>> = RwLock::new(None);

/// The process-wide schema, loading the embedded document on first use.
pub fn global() -> Result<Arc<Schema>, SchemaError> {
    if let Some(schema) = GLOBAL.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        return Ok(Arc::clone(schema));
    }
    let mut slot = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(schema) = slot.as_ref() {
        return Ok(Arc::clone(schema));
    }
    let schema = Arc::new(Schema::embedded()?);
    info!(records = schema.len(), "loaded embedded record schema");
    *slot = Some(Arc::clone(&schema));
    Ok(schema)
}

/// Replace the process-wide schema. Holders of the old `Arc` keep their copy.
pub fn reload(schema: Schema) {
    info!(records = schema.len(), "record schema reloaded");
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(schema));
}

/// Drop the process-wide schema; the next [`global`] call reloads the embedded one.
pub fn reset() {
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_and_reset_swap_the_global_schema() {
        let embedded = global().unwrap();
        assert!(embedded.record(b"GLOB").is_some());

        reload(Schema::from_json(r#"{"records":[{"name":"ZZZZ","desc":"Test","subrecords":[]}]}"#).unwrap());
        let custom = global().unwrap();
        assert_eq!(custom.record_desc(b"ZZZZ"), Some("Test"));
        assert!(custom.record(b"GLOB").is_none());
        // The earlier handle is unaffected.
        assert!(embedded.record(b"GLOB").is_some());

        reset();
        assert!(global().unwrap().record(b"GLOB").is_some());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Schema::from_json(r#"{"records":[{"name":"GLOB","subrecords":[],"bogus":1}]}"#).unwrap_err();
        assert!(matches!(err, SchemaError::Json(_)));
    }
}
