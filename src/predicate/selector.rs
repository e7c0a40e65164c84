use std::collections::BTreeMap;

use crate::Object;
use crate::Result;
use crate::WatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// One clause of a label selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub op: Operator,
    pub values: Vec<String>,
}

impl Requirement {
    fn matches(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> bool {
        let value = labels.get(&self.key);
        match self.op {
            Operator::Equals | Operator::In => value.is_some_and(|v| self.values.contains(v)),
            // Absent keys satisfy negative requirements
            Operator::NotEquals | Operator::NotIn => !value.is_some_and(|v| self.values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

/// Conjunction of label requirements. Empty selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Parses `a=b,c!=d,e in (x,y),f notin (z),g,!h`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut requirements = Vec::new();
        for clause in split_top_level(input)? {
            requirements.push(parse_label_clause(clause)?);
        }
        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn matches(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

/// Fields addressable by a field selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Namespace,
}

impl Field {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "metadata.name" => Ok(Field::Name),
            "metadata.namespace" => Ok(Field::Namespace),
            other => Err(predicate_error(format!("field {other:?} is not supported"))),
        }
    }

    fn value<'a>(
        &self,
        obj: &'a Object,
    ) -> &'a str {
        match self {
            Field::Name => obj.name(),
            Field::Namespace => obj.namespace(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequirement {
    pub field: Field,
    pub negated: bool,
    pub value: String,
}

/// Conjunction of `field=value` / `field!=value` clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
}

impl FieldSelector {
    pub fn parse(input: &str) -> Result<Self> {
        let mut requirements = Vec::new();
        for clause in split_top_level(input)? {
            let (field, negated, value) = if let Some((f, v)) = clause.split_once("!=") {
                (f, true, v)
            } else if let Some((f, v)) = clause.split_once("==") {
                (f, false, v)
            } else if let Some((f, v)) = clause.split_once('=') {
                (f, false, v)
            } else {
                return Err(predicate_error(format!("invalid field selector clause {clause:?}")));
            };
            requirements.push(FieldRequirement {
                field: Field::parse(field.trim())?,
                negated,
                value: value.trim().to_string(),
            });
        }
        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(
        &self,
        obj: &Object,
    ) -> bool {
        self.requirements
            .iter()
            .all(|r| (r.field.value(obj) == r.value) != r.negated)
    }
}

fn parse_label_clause(clause: &str) -> Result<Requirement> {
    if let Some(key) = clause.strip_prefix('!') {
        return Ok(Requirement {
            key: validate_key(key.trim())?,
            op: Operator::DoesNotExist,
            values: vec![],
        });
    }
    if let Some((key, value)) = clause.split_once("!=") {
        return Ok(Requirement {
            key: validate_key(key.trim())?,
            op: Operator::NotEquals,
            values: vec![value.trim().to_string()],
        });
    }
    if let Some((key, value)) = clause.split_once("==").or_else(|| clause.split_once('=')) {
        return Ok(Requirement {
            key: validate_key(key.trim())?,
            op: Operator::Equals,
            values: vec![value.trim().to_string()],
        });
    }
    if let Some(open) = clause.find('(') {
        let head = clause[..open].trim();
        let body = clause[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| predicate_error(format!("unterminated value set in {clause:?}")))?;
        let (key, op) = if let Some(key) = head.strip_suffix(" notin") {
            (key, Operator::NotIn)
        } else if let Some(key) = head.strip_suffix(" in") {
            (key, Operator::In)
        } else {
            return Err(predicate_error(format!("unknown set operator in {clause:?}")));
        };
        let values = body
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        return Ok(Requirement {
            key: validate_key(key.trim())?,
            op,
            values,
        });
    }
    Ok(Requirement {
        key: validate_key(clause)?,
        op: Operator::Exists,
        values: vec![],
    })
}

fn validate_key(key: &str) -> Result<String> {
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(predicate_error(format!("invalid label key {key:?}")));
    }
    Ok(key.to_string())
}

/// Splits on commas outside parentheses, dropping empty clauses.
fn split_top_level(input: &str) -> Result<Vec<&str>> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| predicate_error(format!("unbalanced ')' in {input:?}")))?;
            }
            ',' if depth == 0 => {
                clauses.push(input[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(predicate_error(format!("unbalanced '(' in {input:?}")));
    }
    clauses.push(input[start..].trim());
    Ok(clauses.into_iter().filter(|c| !c.is_empty()).collect())
}

fn predicate_error(msg: String) -> crate::Error {
    WatchError::Predicate(msg).into()
}
