//! Schema validation of candidate stage artifacts.
//!
//! Generated output is untrusted. Each stage's candidate is walked as a raw
//! [`serde_json::Value`] (or, for the review stage, Markdown text) so that
//! every problem can be reported with its location, not just the first one
//! serde would trip on. A candidate with any violation is rejected whole;
//! nothing is coerced to fit.
//!
//! | Stage  | Checks |
//! |--------|--------|
//! | intake | plan context, project context types, requirement fields, REQ sequence |
//! | risk   | one entry per requirement, joint-null risk, closed enums, TC sequence, derivation gates, reviewer locks |
//! | review | fixed headings and decision fields, no blank values, exact REQ/TC reference set |

mod intake;
mod review;
mod risk;

pub use intake::validate_intake;
pub use review::{REQUIRED_HEADINGS, REVIEW_FIELDS, validate_review};
pub use risk::validate_risk;

use serde_json::{Map, Value};
use std::str::FromStr;

use crate::errors::Violation;
use crate::generate::strip_code_fence;
use crate::ids::ParseIdError;
use crate::pipeline::state::Stage;
use crate::plan::{InvalidEnumValue, Run, StageArtifact};

/// Validate a raw generator candidate for `stage` against the run it would
/// be committed to.
pub fn validate(stage: Stage, raw: &str, run: &Run) -> Result<StageArtifact, Vec<Violation>> {
    match stage {
        Stage::Intake => validate_intake(raw, run).map(StageArtifact::Intake),
        Stage::Risk => validate_risk(raw, run).map(StageArtifact::Risk),
        Stage::Review => validate_review(raw, run).map(StageArtifact::Review),
    }
}

/// Parse generator output as JSON after removing a surrounding code fence.
pub fn decode_json(raw: &str) -> Result<Value, Vec<Violation>> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(vec![Violation::schema("$", "output is empty")]);
    }
    serde_json::from_str(body)
        .map_err(|e| vec![Violation::schema("$", format!("output is not valid JSON: {}", e))])
}

/// Join a parent path and a key: `risk_entries[0]` + `req_id`.
pub(crate) fn at(path: &str, key: &str) -> String {
    if path.is_empty() || path == "$" {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

pub(crate) fn index(path: &str, i: usize) -> String {
    format!("{}[{}]", path, i)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Accumulates violations while reading typed fields out of raw JSON.
///
/// Every accessor returns `None` after recording a violation, so callers can
/// keep walking the document and report everything in one pass.
#[derive(Debug, Default)]
pub(crate) struct Checker {
    violations: Vec<Violation>,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn extend(&mut self, violations: impl IntoIterator<Item = Violation>) {
        self.violations.extend(violations);
    }

    pub fn schema(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(Violation::schema(path, message));
    }

    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }

    /// `Ok(value)` when nothing was recorded.
    pub fn finish<T>(self, value: T) -> Result<T, Vec<Violation>> {
        if self.violations.is_empty() {
            Ok(value)
        } else {
            Err(self.violations)
        }
    }

    pub fn object<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a Map<String, Value>> {
        match value {
            Value::Object(map) => Some(map),
            other => {
                self.schema(path, format!("expected an object, found {}", type_name(other)));
                None
            }
        }
    }

    /// A field that must be present (it may still be null).
    pub fn field<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Option<&'a Value> {
        let value = obj.get(key);
        if value.is_none() {
            self.schema(at(path, key), format!("missing required field '{}'", key));
        }
        value
    }

    pub fn string(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Option<String> {
        match self.field(obj, key, path)? {
            Value::String(s) => Some(s.clone()),
            other => {
                self.schema(
                    at(path, key),
                    format!("expected a string, found {}", type_name(other)),
                );
                None
            }
        }
    }

    /// A field that must be present and is either a string or null.
    pub fn nullable_string(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Option<Option<String>> {
        match self.field(obj, key, path)? {
            Value::Null => Some(None),
            Value::String(s) => Some(Some(s.clone())),
            other => {
                self.schema(
                    at(path, key),
                    format!("expected a string or null, found {}", type_name(other)),
                );
                None
            }
        }
    }

    pub fn boolean(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Option<bool> {
        match self.field(obj, key, path)? {
            Value::Bool(b) => Some(*b),
            other => {
                self.schema(
                    at(path, key),
                    format!("expected a boolean, found {}", type_name(other)),
                );
                None
            }
        }
    }

    /// A boolean that may be omitted, defaulting to `false`.
    pub fn optional_flag(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Option<bool> {
        match obj.get(key) {
            None | Some(Value::Null) => Some(false),
            Some(_) => self.boolean(obj, key, path),
        }
    }

    pub fn array<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Option<&'a Vec<Value>> {
        match self.field(obj, key, path)? {
            Value::Array(items) => Some(items),
            other => {
                self.schema(
                    at(path, key),
                    format!("expected an array, found {}", type_name(other)),
                );
                None
            }
        }
    }

    pub fn string_list(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Option<Vec<String>> {
        let items = self.array(obj, key, path)?;
        self.strings(items, &at(path, key))
    }

    /// A field that may be absent or null; when present it must be a list of strings.
    pub fn optional_string_list(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Option<Option<Vec<String>>> {
        match obj.get(key) {
            None | Some(Value::Null) => Some(None),
            Some(_) => self.string_list(obj, key, path).map(Some),
        }
    }

    fn strings(&mut self, items: &[Value], path: &str) -> Option<Vec<String>> {
        let mut out = Vec::with_capacity(items.len());
        let mut ok = true;
        for (i, item) in items.iter().enumerate() {
            match item {
                Value::String(s) => out.push(s.clone()),
                other => {
                    self.schema(
                        index(path, i),
                        format!("expected a string, found {}", type_name(other)),
                    );
                    ok = false;
                }
            }
        }
        ok.then_some(out)
    }

    /// A canonical `REQ-###` / `TC-###` identifier. Malformed IDs are sequence violations.
    pub fn id<T>(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Option<T>
    where
        T: FromStr<Err = ParseIdError>,
    {
        let raw = self.string(obj, key, path)?;
        match raw.parse::<T>() {
            Ok(id) => Some(id),
            Err(e) => {
                self.push(Violation::sequence(at(path, key), e.to_string()));
                None
            }
        }
    }

    /// A value from one of the closed enums. Never coerced.
    pub fn enum_value<T>(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Option<T>
    where
        T: FromStr<Err = InvalidEnumValue>,
    {
        let raw = self.string(obj, key, path)?;
        match raw.parse::<T>() {
            Ok(v) => Some(v),
            Err(e) => {
                self.schema(at(path, key), e.to_string());
                None
            }
        }
    }

    pub fn nullable_enum<T>(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Option<Option<T>>
    where
        T: FromStr<Err = InvalidEnumValue>,
    {
        match self.field(obj, key, path)? {
            Value::Null => Some(None),
            _ => self.enum_value(obj, key, path).map(Some),
        }
    }
}
