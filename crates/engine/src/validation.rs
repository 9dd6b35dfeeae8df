// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output validation (spec §4.7): coerce and check the raw key-value
//! outputs an agent reports via `step_done` against a step's declared
//! `OutputSpec` map. Pure and side-effect-free — same inputs always
//! produce the same result.

use meow_core::{OutputSpec, OutputType};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Knows the universe of valid `bead_id`s, so the edit-distance suggestion
/// routine is independent of where that universe actually comes from.
pub trait BeadIdChecker: Send + Sync {
    fn exists(&self, id: &str) -> bool;
    fn all_ids(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    pub missing: Vec<String>,
    pub invalid: HashMap<String, String>,
}

impl ValidationError {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.missing.is_empty() {
            write!(f, "missing: {}", self.missing.join(", "))?;
        }
        if !self.invalid.is_empty() {
            if !self.missing.is_empty() {
                write!(f, "; ")?;
            }
            let parts: Vec<String> = self
                .invalid
                .iter()
                .map(|(name, msg)| format!("{name}: {msg}"))
                .collect();
            write!(f, "invalid: {}", parts.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Validate and coerce `raw` against `specs`. Declared-but-absent required
/// outputs are collected into `missing`; present-but-malformed outputs are
/// collected into `invalid`. Outputs not named in `specs` pass through
/// untouched. `workdir` resolves relative `file_path` outputs.
pub fn validate(
    specs: &HashMap<String, OutputSpec>,
    raw: &HashMap<String, Value>,
    workdir: &Path,
    checker: Option<&dyn BeadIdChecker>,
) -> Result<HashMap<String, Value>, ValidationError> {
    let mut missing = Vec::new();
    let mut invalid = HashMap::new();
    let mut out = HashMap::new();

    for (name, spec) in specs {
        match raw.get(name) {
            None => {
                if spec.required {
                    missing.push(name.clone());
                }
            }
            Some(value) => match coerce(spec.output_type, value, workdir, checker) {
                Ok(coerced) => {
                    out.insert(name.clone(), coerced);
                }
                Err(msg) => {
                    invalid.insert(name.clone(), msg);
                }
            },
        }
    }

    for (name, value) in raw {
        if !specs.contains_key(name) {
            out.insert(name.clone(), value.clone());
        }
    }

    if missing.is_empty() && invalid.is_empty() {
        Ok(out)
    } else {
        Err(ValidationError { missing, invalid })
    }
}

fn coerce(
    output_type: OutputType,
    value: &Value,
    workdir: &Path,
    checker: Option<&dyn BeadIdChecker>,
) -> Result<Value, String> {
    match output_type {
        OutputType::String => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            other => Ok(Value::String(other.to_string())),
        },
        OutputType::Number => coerce_number(value),
        OutputType::Boolean => coerce_boolean(value),
        OutputType::Json => coerce_json(value),
        OutputType::StringArray => coerce_string_array(value).map(|v| Value::Array(v.into_iter().map(Value::String).collect())),
        OutputType::BeadId => coerce_bead_id(value, checker).map(Value::String),
        OutputType::BeadIdArray => {
            let ids = coerce_string_array(value)?;
            let mut validated = Vec::with_capacity(ids.len());
            for id in ids {
                let checked = coerce_bead_id(&Value::String(id), checker)?;
                validated.push(Value::String(checked));
            }
            Ok(Value::Array(validated))
        }
        OutputType::FilePath => coerce_file_path(value, workdir),
    }
}

fn coerce_number(value: &Value) -> Result<Value, String> {
    if let Value::Number(_) = value {
        return Ok(value.clone());
    }
    let s = match value {
        Value::String(s) => s.as_str(),
        other => return Err(format!("expected a number, got {other}")),
    };
    if let Ok(i) = s.parse::<i64>() {
        return Ok(Value::from(i));
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| format!("not a finite number: {s}")),
        _ => Err(format!("not a number: {s}")),
    }
}

fn coerce_boolean(value: &Value) -> Result<Value, String> {
    if let Value::Bool(b) = value {
        return Ok(Value::Bool(*b));
    }
    let s = match value {
        Value::String(s) => s.as_str(),
        other => return Err(format!("expected a boolean, got {other}")),
    };
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(Value::Bool(true)),
        "false" | "no" | "0" => Ok(Value::Bool(false)),
        other => Err(format!("not a boolean: {other}")),
    }
}

fn coerce_json(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => {
            serde_json::from_str(s).map_err(|e| format!("invalid json: {e}"))
        }
        other => Ok(other.clone()),
    }
}

fn coerce_string_array(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Ok(other.to_string()),
            })
            .collect(),
        Value::String(s) => {
            if let Ok(parsed) = serde_json::from_str::<Vec<String>>(s) {
                return Ok(parsed);
            }
            Ok(s.split(',').map(|part| part.trim().to_string()).collect())
        }
        other => Err(format!("expected a string array, got {other}")),
    }
}

fn coerce_bead_id(value: &Value, checker: Option<&dyn BeadIdChecker>) -> Result<String, String> {
    let id = match value {
        Value::String(s) => s.clone(),
        other => return Err(format!("expected a bead_id, got {other}")),
    };
    if !is_bead_id_format(&id) {
        return Err(format!("malformed bead_id: {id}"));
    }
    if let Some(checker) = checker {
        if !checker.exists(&id) {
            let suggestions = suggest(&id, checker.all_ids());
            if suggestions.is_empty() {
                return Err(format!("unknown bead_id: {id}"));
            }
            return Err(format!(
                "unknown bead_id: {id} (did you mean: {}?)",
                suggestions.join(", ")
            ));
        }
    }
    Ok(id)
}

fn coerce_file_path(value: &Value, workdir: &Path) -> Result<Value, String> {
    let raw_path = match value {
        Value::String(s) => s.clone(),
        other => return Err(format!("expected a file_path, got {other}")),
    };
    let path = Path::new(&raw_path);
    let resolved = if path.is_relative() {
        workdir.join(path)
    } else {
        path.to_path_buf()
    };
    if resolved.exists() {
        Ok(Value::String(raw_path))
    } else {
        Err(format!("file does not exist: {}", resolved.display()))
    }
}

/// `<alnum-prefix>-<suffix>`: a non-empty alphanumeric prefix, a literal
/// dash, and a non-empty suffix of alphanumerics/dashes.
fn is_bead_id_format(s: &str) -> bool {
    let Some((prefix, suffix)) = s.split_once('-') else {
        return false;
    };
    !prefix.is_empty()
        && !suffix.is_empty()
        && prefix.chars().all(|c| c.is_ascii_alphanumeric())
        && suffix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Candidates are only useful relative to how long the typo'd id is — a
/// fixed small cutoff (e.g. 5) throws away real near-misses on longer ids
/// (`bd-missing` vs `bd-real` is already 7 edits apart on the `bd-`
/// prefix's own suffix). Scale the cutoff with the longer of the two
/// strings instead, then take up to three candidates within it, ascending
/// by distance then lexicographically.
fn suggest(target: &str, universe: Vec<String>) -> Vec<String> {
    let mut scored: Vec<(usize, String)> = universe
        .into_iter()
        .map(|candidate| (levenshtein(target, &candidate), candidate))
        .filter(|(dist, candidate)| *dist <= max_distance(target, candidate))
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    scored.into_iter().take(3).map(|(_, s)| s).collect()
}

/// At least 5 edits, or 70% of the longer string's length, whichever is
/// larger — keeps short-id typos tight while still surfacing a plausible
/// match on longer ids.
fn max_distance(a: &str, b: &str) -> usize {
    let longer = a.chars().count().max(b.chars().count());
    (longer * 7 / 10).max(5)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for i in 1..=a.len() {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let tmp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j - 1])
            };
            prev = tmp;
        }
    }

    row[b.len()]
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
