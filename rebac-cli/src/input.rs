//! Loading schemas, tuple fixtures and request context from the command line

use anyhow::{Context, Result};
use rebac_engine::{
    CompiledSchema, ObjectRef, RequestContext, SchemaDefinition, SubjectRef, Tuple,
    TupleCondition,
};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// How a schema file is written, decided by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    Dsl,
    Yaml,
    Json,
}

impl SchemaFormat {
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("yaml") | Some("yml") => SchemaFormat::Yaml,
            Some("json") => SchemaFormat::Json,
            _ => SchemaFormat::Dsl,
        }
    }
}

pub fn parse_schema(source: &str, format: SchemaFormat) -> Result<CompiledSchema> {
    let definition = match format {
        SchemaFormat::Dsl => SchemaDefinition::parse(source)?,
        SchemaFormat::Yaml => SchemaDefinition::from_yaml(source)?,
        SchemaFormat::Json => SchemaDefinition::from_json(source)?,
    };
    Ok(definition.compile()?)
}

/// The schema at `path`, or the built-in dashboard schema
pub fn load_schema(path: Option<&Path>) -> Result<CompiledSchema> {
    let Some(path) = path else {
        return Ok(CompiledSchema::dashboard()?);
    };

    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read schema {}", path.display()))?;
    parse_schema(&source, SchemaFormat::from_path(path))
        .with_context(|| format!("schema {} is invalid", path.display()))
}

/// One tuple as written in a fixture file:
///
/// ```yaml
/// - object: dashboard:d1
///   relation: view
///   subject: team:ops#member
/// - object: resource:r1
///   relation: view
///   subject: user:alice
///   condition:
///     name: group_filter
///     context:
///       resource_group: teamA
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TupleRecord {
    object: String,
    relation: String,
    subject: String,
    #[serde(default)]
    condition: Option<TupleCondition>,
}

impl TupleRecord {
    fn into_tuple(self) -> Result<Tuple> {
        let object: ObjectRef = self.object.parse()?;
        let subject: SubjectRef = self.subject.parse()?;
        let tuple = Tuple::new(object, &self.relation, subject);
        Ok(match self.condition {
            Some(condition) => tuple.with_condition(condition),
            None => tuple,
        })
    }
}

pub fn parse_tuples(source: &str) -> Result<Vec<Tuple>> {
    if source.trim().is_empty() {
        return Ok(Vec::new());
    }

    let records: Vec<TupleRecord> =
        serde_yaml::from_str(source).context("tuple file must be a YAML list of tuples")?;

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            record
                .into_tuple()
                .with_context(|| format!("tuple #{} is malformed", index + 1))
        })
        .collect()
}

pub fn load_tuples(path: Option<&Path>) -> Result<Vec<Tuple>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read tuples {}", path.display()))?;
    parse_tuples(&source).with_context(|| format!("in {}", path.display()))
}

/// Request context given as a JSON object on the command line
pub fn parse_context(raw: Option<&str>) -> Result<RequestContext> {
    let Some(raw) = raw else {
        return Ok(RequestContext::default());
    };

    let value: serde_json::Value =
        serde_json::from_str(raw).context("--context must be valid JSON")?;
    Ok(RequestContext::try_from(value)?)
}
