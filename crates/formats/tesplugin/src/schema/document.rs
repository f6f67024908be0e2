//! Serde mirror of the schema document as authored on disk.
//!
//! These types only describe shape. Validation and group splicing happen in
//! [`super::load`], which turns a `Document` into a [`super::Schema`].

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    #[serde(default)]
    pub version: u32,
    /// Reusable subrecord-rule fragments, spliced into records by name.
    #[serde(default)]
    pub groups: Vec<GroupDoc>,
    pub records: Vec<RecordDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupDoc {
    pub name: String,
    pub subrecords: Vec<RuleOrGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordDoc {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub subrecords: Vec<RuleOrGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RuleOrGroup {
    Group { group: String },
    Rule(RuleDoc),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDoc {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub repeat: usize,
    #[serde(default)]
    pub optional: usize,
    #[serde(default)]
    pub condition: Option<ConditionDoc>,
    #[serde(default)]
    pub elements: Vec<ElementDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionDoc {
    pub op: String,
    /// Index of an earlier decoded element in the same record.
    pub target: usize,
    pub value: OperandDoc,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OperandDoc {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub repeat: usize,
    #[serde(default)]
    pub optional: usize,
    /// `[value, display name]` pairs.
    #[serde(default)]
    pub options: Vec<(i64, String)>,
    /// Bit names, least significant bit first.
    #[serde(default)]
    pub flags: Vec<String>,
}
