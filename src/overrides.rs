//! Extraction of feature-gate overrides from a component configuration
//! entry.
//!
//! Extraction is best-effort: every well-formed `name -> bool` pair is kept
//! and malformed pairs are reported back instead of failing the request.
//! Two shapes are understood:
//!
//! ```text
//! featureGates:
//!   AntreaPolicy: false
//!   Egress: true
//! ```
//!
//! and the flat `AntreaPolicy=false,Egress=true` form, either as the value
//! of `featureGates` or on lines of its own.

use crate::resolver::OverrideMap;
use serde::Serialize;
use serde_yaml::Value;

const FEATURE_GATES_KEY: &str = "featureGates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    InvalidName,
    NotBoolean,
    NotAMapping,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InvalidName => "invalid_name",
            SkipReason::NotBoolean => "not_boolean",
            SkipReason::NotAMapping => "not_a_mapping",
        }
    }
}

/// A pair that looked like an override but could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedOverride {
    pub text: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideExtraction {
    pub overrides: OverrideMap,
    pub skipped: Vec<SkippedOverride>,
}

impl OverrideExtraction {
    fn keep(&mut self, name: &str, enabled: bool) {
        self.overrides.insert(name.to_string(), enabled);
    }

    fn skip(&mut self, text: impl Into<String>, reason: SkipReason) {
        self.skipped.push(SkippedOverride {
            text: text.into(),
            reason,
        });
    }
}

pub fn extract_feature_gates(text: &str) -> OverrideExtraction {
    match serde_yaml::from_str::<Value>(text) {
        Ok(Value::Null) => OverrideExtraction::default(),
        Ok(Value::Mapping(document)) => from_document(&document),
        // Scalars such as `AntreaPolicy=false` and broken YAML both go
        // through the line scanner.
        Ok(_) | Err(_) => scan_lines(text),
    }
}

fn from_document(document: &serde_yaml::Mapping) -> OverrideExtraction {
    let mut extraction = OverrideExtraction::default();
    let section = match document.get(FEATURE_GATES_KEY) {
        None | Some(Value::Null) => return extraction,
        Some(Value::Mapping(section)) => section,
        // `featureGates: AntreaPolicy=false,Egress=true`
        Some(Value::String(flat)) if flat.contains('=') => {
            for token in flat.split(',') {
                scan_flat_pair(token.trim(), true, &mut extraction);
            }
            return extraction;
        }
        Some(other) => {
            extraction.skip(
                format!("{FEATURE_GATES_KEY}: {}", render_scalar(other)),
                SkipReason::NotAMapping,
            );
            return extraction;
        }
    };
    for (key, value) in section {
        let name = match key.as_str() {
            Some(name) if is_gate_name(name) => name,
            _ => {
                extraction.skip(render_scalar(key), SkipReason::InvalidName);
                continue;
            }
        };
        match value.as_bool() {
            Some(enabled) => extraction.keep(name, enabled),
            None => extraction.skip(
                format!("{name}: {}", render_scalar(value)),
                SkipReason::NotBoolean,
            ),
        }
    }
    extraction
}

fn scan_lines(text: &str) -> OverrideExtraction {
    let mut extraction = OverrideExtraction::default();
    let mut in_section = false;
    for raw in text.lines() {
        let line = strip_comment(raw).trim_end();
        if line.trim().is_empty() {
            continue;
        }
        let indented = line.starts_with(' ') || line.starts_with('\t');
        let trimmed = line.trim();
        if !indented {
            if let Some(rest) = trimmed.strip_prefix(FEATURE_GATES_KEY) {
                if rest.trim() == ":" {
                    in_section = true;
                    continue;
                }
            }
            in_section = false;
        }
        if trimmed.contains('=') {
            for token in trimmed.split(',') {
                scan_flat_pair(token.trim(), in_section, &mut extraction);
            }
            continue;
        }
        if in_section && indented {
            match trimmed.split_once(':') {
                Some((name, value)) => keep_pair(name, value, trimmed, &mut extraction),
                None => extraction.skip(trimmed, SkipReason::NotBoolean),
            }
        }
    }
    extraction
}

fn scan_flat_pair(token: &str, in_section: bool, extraction: &mut OverrideExtraction) {
    if token.is_empty() {
        return;
    }
    let Some((name, value)) = token.split_once('=') else {
        if in_section {
            extraction.skip(token, SkipReason::NotBoolean);
        }
        return;
    };
    let name = unquote(name.trim());
    if !is_gate_name(name) {
        // Outside the section a `key=value` token is likely unrelated
        // configuration; only complain about it inside.
        if in_section {
            extraction.skip(token, SkipReason::InvalidName);
        }
        return;
    }
    keep_pair(name, value, token, extraction);
}

fn keep_pair(name: &str, value: &str, text: &str, extraction: &mut OverrideExtraction) {
    let name = unquote(name.trim());
    if !is_gate_name(name) {
        extraction.skip(text, SkipReason::InvalidName);
        return;
    }
    match parse_bool(unquote(value.trim())) {
        Some(enabled) => extraction.keep(name, enabled),
        None => extraction.skip(text, SkipReason::NotBoolean),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn is_gate_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .or_else(|| {
            value
                .strip_prefix('\'')
                .and_then(|inner| inner.strip_suffix('\''))
        })
        .unwrap_or(value)
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_yaml::to_string(value)
            .map(|rendered| rendered.trim().to_string())
            .unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}
