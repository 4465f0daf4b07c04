// Declarative field rules evaluated against the JSON form of parameters

use crate::errors::ValidationError;
use regex::Regex;
use serde_json::Value;

/// A single constraint on a field
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Present and not a zero value (`""`, `0`, `false`, `[]`)
    Required,
    /// Minimum length of a string (in chars) or an array
    MinLen(usize),
    /// Maximum length of a string (in chars) or an array
    MaxLen(usize),
    /// Inclusive numeric lower bound
    Min(f64),
    /// Inclusive numeric upper bound
    Max(f64),
    /// Value must be one of the listed strings
    OneOf(&'static [&'static str]),
    /// String must match the regular expression
    Pattern(&'static str),
    /// Apply the nested rules to every element of an array
    Each(Vec<Rule>),
}

impl Rule {
    /// Short tag reported to operators, e.g. `min_len=1`
    pub fn tag(&self) -> String {
        match self {
            Rule::Required => "required".to_string(),
            Rule::MinLen(n) => format!("min_len={}", n),
            Rule::MaxLen(n) => format!("max_len={}", n),
            Rule::Min(n) => format!("min={}", n),
            Rule::Max(n) => format!("max={}", n),
            Rule::OneOf(options) => format!("oneof={}", options.join(" ")),
            Rule::Pattern(pattern) => format!("pattern={}", pattern),
            Rule::Each(_) => "each".to_string(),
        }
    }

    fn check(&self, path: &str, value: Option<&Value>) -> Result<(), ValidationError> {
        let fail = || Err(ValidationError::field(path, self.tag()));

        let value = match value {
            Some(v) if !v.is_null() => v,
            // Absent values only fail the required rule
            _ if *self == Rule::Required => return fail(),
            _ => return Ok(()),
        };

        let ok = match self {
            Rule::Required => !is_zero(value),
            Rule::MinLen(n) => length(value).is_some_and(|len| len >= *n),
            Rule::MaxLen(n) => length(value).is_some_and(|len| len <= *n),
            Rule::Min(n) => value.as_f64().is_some_and(|v| v >= *n),
            Rule::Max(n) => value.as_f64().is_some_and(|v| v <= *n),
            Rule::OneOf(options) => match value {
                Value::String(s) => options.contains(&s.as_str()),
                Value::Number(n) => options.contains(&n.to_string().as_str()),
                _ => false,
            },
            Rule::Pattern(pattern) => match (value, Regex::new(pattern)) {
                (Value::String(s), Ok(re)) => re.is_match(s),
                _ => false,
            },
            Rule::Each(rules) => {
                let Some(items) = value.as_array() else {
                    return fail();
                };
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, index);
                    for rule in rules {
                        rule.check(&item_path, Some(item))?;
                    }
                }
                true
            }
        };

        if ok {
            Ok(())
        } else {
            fail()
        }
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Look up a dotted path in a JSON document
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(doc, |current, segment| current.get(segment))
}

/// Rules attached to one field path
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub path: String,
    pub rules: Vec<Rule>,
}

/// Ordered list of field rules; the first violation wins
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<FieldRule>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add rules for a field path
    pub fn field(mut self, path: impl Into<String>, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.fields.push(FieldRule {
            path: path.into(),
            rules: rules.into_iter().collect(),
        });
        self
    }

    /// Nest every path under `prefix`
    pub fn prefixed(self, prefix: &str) -> Self {
        Self {
            fields: self
                .fields
                .into_iter()
                .map(|f| FieldRule {
                    path: format!("{}.{}", prefix, f.path),
                    rules: f.rules,
                })
                .collect(),
        }
    }

    /// Append the rules of another schema
    pub fn merge(mut self, other: Schema) -> Self {
        self.fields.extend(other.fields);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    /// Validate a document, reporting the first violated field rule
    pub fn validate(&self, doc: &Value) -> Result<(), ValidationError> {
        for field in &self.fields {
            let value = lookup(doc, &field.path);
            for rule in &field.rules {
                rule.check(&field.path, value)?;
            }
        }
        Ok(())
    }
}
