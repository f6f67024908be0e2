//! Turn a schema document into a validated [`Schema`].
//!
//! Rules enforced here:
//! - repeat and optional counts agree whenever both are non-zero;
//! - a blob or fixed-length string is the only element of its subrecord;
//! - element repeat/optional only appears on a subrecord's final element;
//! - a subrecord-rule span never runs past the record's final rule, and
//!   spans inside one record nest rather than partially overlap.

use std::collections::HashMap;

use super::document::{ConditionDoc, Document, ElementDoc, RuleDoc, RuleOrGroup};
use super::{CompareOp, Condition, ElementDef, ElementKind, RecordDef, Schema, SchemaError, SubrecordRule};
use crate::record::{parse_tag, tag_str};

pub(super) fn build(doc: Document) -> Result<Schema, SchemaError> {
    let mut groups: HashMap<String, Vec<SubrecordRule>> = HashMap::new();
    for group in doc.groups {
        let definition = format!("group \"{}\"", group.name);
        let rules = resolve_rules(&group.subrecords, &groups, &definition)?;
        if groups.insert(group.name.clone(), rules).is_some() {
            return Err(invalid(&definition, "defined more than once"));
        }
    }

    let mut records = HashMap::new();
    for record in doc.records {
        let definition = format!("record \"{}\"", record.name);
        let name = parse_tag(&record.name)
            .ok_or_else(|| invalid(&definition, "record name must be exactly 4 characters"))?;
        let rules = resolve_rules(&record.subrecords, &groups, &definition)?;
        check_spans(&rules, &definition)?;
        let def = RecordDef {
            name,
            desc: record.desc,
            rules,
        };
        if records.insert(name, def).is_some() {
            return Err(invalid(&definition, "defined more than once"));
        }
    }

    Ok(Schema { records })
}

fn invalid(definition: &str, message: impl Into<String>) -> SchemaError {
    SchemaError::Invalid {
        definition: definition.to_string(),
        message: message.into(),
    }
}

fn resolve_rules(
    items: &[RuleOrGroup],
    groups: &HashMap<String, Vec<SubrecordRule>>,
    definition: &str,
) -> Result<Vec<SubrecordRule>, SchemaError> {
    let mut rules = Vec::new();
    for item in items {
        match item {
            RuleOrGroup::Group { group } => {
                let spliced = groups
                    .get(group)
                    .ok_or_else(|| invalid(definition, format!("unknown group \"{group}\"")))?;
                rules.extend(spliced.iter().cloned());
            }
            RuleOrGroup::Rule(rule) => rules.push(build_rule(rule, definition)?),
        }
    }
    Ok(rules)
}

fn build_rule(rule: &RuleDoc, definition: &str) -> Result<SubrecordRule, SchemaError> {
    let name = parse_tag(&rule.name).ok_or_else(|| {
        invalid(
            definition,
            format!("subrecord name \"{}\" must be exactly 4 characters", rule.name),
        )
    })?;
    check_counts(rule.repeat, rule.optional, definition, || format!("subrecord {}", rule.name))?;

    let elements = rule
        .elements
        .iter()
        .map(|e| build_element(e, definition, &rule.name))
        .collect::<Result<Vec<_>, _>>()?;

    let last = elements.len().saturating_sub(1);
    for (i, element) in elements.iter().enumerate() {
        if element.kind.is_whole_subrecord() && elements.len() > 1 {
            return Err(invalid(
                definition,
                format!(
                    "element \"{}\" of subrecord {} is a blob or fixed-length string and must be the only element",
                    element.name, rule.name
                ),
            ));
        }
        let span = element.repeat.max(element.optional);
        if span > 0 && i != last {
            return Err(invalid(
                definition,
                format!(
                    "repeat/optional on element \"{}\" of subrecord {} is only allowed on the final element",
                    element.name, rule.name
                ),
            ));
        }
        if span > elements.len() {
            return Err(invalid(
                definition,
                format!(
                    "element \"{}\" of subrecord {} spans {span} elements but the subrecord has {}",
                    element.name,
                    rule.name,
                    elements.len()
                ),
            ));
        }
    }

    let condition = rule
        .condition
        .as_ref()
        .map(|c| build_condition(c, definition, &rule.name))
        .transpose()?;

    Ok(SubrecordRule {
        name,
        desc: rule.desc.clone(),
        repeat: rule.repeat,
        optional: rule.optional,
        condition,
        elements,
    })
}

fn build_element(element: &ElementDoc, definition: &str, subrecord: &str) -> Result<ElementDef, SchemaError> {
    let kind = ElementKind::parse(&element.kind).ok_or_else(|| {
        invalid(
            definition,
            format!(
                "element \"{}\" of subrecord {subrecord} has unknown type \"{}\"",
                element.name, element.kind
            ),
        )
    })?;
    check_counts(element.repeat, element.optional, definition, || {
        format!("element \"{}\" of subrecord {subrecord}", element.name)
    })?;
    Ok(ElementDef {
        name: element.name.clone(),
        kind,
        repeat: element.repeat,
        optional: element.optional,
        options: element.options.clone(),
        flags: element.flags.clone(),
    })
}

fn build_condition(condition: &ConditionDoc, definition: &str, subrecord: &str) -> Result<Condition, SchemaError> {
    let op = CompareOp::parse(&condition.op).ok_or_else(|| {
        invalid(
            definition,
            format!("subrecord {subrecord} has unknown condition operator \"{}\"", condition.op),
        )
    })?;
    Ok(Condition {
        op,
        target: condition.target,
        operand: condition.value.clone(),
    })
}

fn check_counts(
    repeat: usize,
    optional: usize,
    definition: &str,
    what: impl FnOnce() -> String,
) -> Result<(), SchemaError> {
    if repeat != 0 && optional != 0 && repeat != optional {
        return Err(invalid(
            definition,
            format!("{}: repeat ({repeat}) and optional ({optional}) disagree", what()),
        ));
    }
    Ok(())
}

/// Stack-based interval scan over the rules in declaration order.
///
/// Each rule with a non-zero span opens the interval `[i, i + span)`. An
/// interval must end inside every interval still open when it starts.
fn check_spans(rules: &[SubrecordRule], definition: &str) -> Result<(), SchemaError> {
    let mut open: Vec<(usize, usize)> = Vec::new();
    for (i, rule) in rules.iter().enumerate() {
        while open.last().is_some_and(|&(_, end)| end <= i) {
            open.pop();
        }
        let span = rule.span();
        if span == 0 {
            continue;
        }
        let end = i + span;
        if end > rules.len() {
            return Err(invalid(
                definition,
                format!(
                    "repeat/optional span of {span} on subrecord {} runs past the final subrecord",
                    tag_str(&rule.name)
                ),
            ));
        }
        if let Some(&(outer_start, outer_end)) = open.last() {
            if end > outer_end {
                return Err(invalid(
                    definition,
                    format!(
                        "repeat/optional span starting at subrecord {} overlaps the span starting at subrecord {}",
                        tag_str(&rule.name),
                        tag_str(&rules[outer_start].name)
                    ),
                ));
            }
        }
        open.push((i, end));
    }
    Ok(())
}
