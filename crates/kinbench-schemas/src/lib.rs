//! Schema validation for test-matrix and platform specification files.
//!
//! The YAML specifications are converted to JSON values and checked against
//! JSON Schemas embedded in the binary at compile time.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use include_dir::{include_dir, Dir};
use jsonschema::JSONSchema;
use serde_json::Value;

static SCHEMA_DIR: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/schemas");

/// Names of the schemas shipped with the crate.
pub fn schema_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = SCHEMA_DIR
        .files()
        .filter_map(|f| f.path().to_str())
        .collect();
    names.sort_unstable();
    names
}

fn load_schema(name: &str) -> Result<Value> {
    let file = SCHEMA_DIR
        .get_file(name)
        .ok_or_else(|| anyhow!("unknown schema: {name}"))?;
    let text = file
        .contents_utf8()
        .ok_or_else(|| anyhow!("schema {name} is not valid utf-8"))?;
    serde_json::from_str(text).with_context(|| format!("parsing schema {name}"))
}

/// Loads a YAML document and re-expresses it as a JSON value.
pub fn yaml_to_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Validates the YAML document at `source` against the named embedded schema
/// and returns the parsed document on success.
pub fn build_and_validate(schema_name: &str, source: &Path) -> Result<Value> {
    let schema = load_schema(schema_name)?;
    let compiled = JSONSchema::compile(&schema)
        .map_err(|e| anyhow!("schema {schema_name} does not compile: {e}"))?;
    let doc = yaml_to_json(source)?;
    let errors: Vec<String> = match compiled.validate(&doc) {
        Ok(()) => Vec::new(),
        Err(iter) => iter
            .map(|e| format!("{} (at {})", e, e.instance_path))
            .collect(),
    };
    if !errors.is_empty() {
        bail!(
            "{} does not satisfy {schema_name}:\n  {}",
            source.display(),
            errors.join("\n  ")
        );
    }
    Ok(doc)
}
