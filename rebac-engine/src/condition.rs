//! Named, parameterized predicates that gate conditional tuples.
//!
//! A condition is declared once in the schema:
//!
//! ```text
//! condition group_filter(requested_group: string, resource_group: string) {
//!   requested_group == resource_group
//! }
//! ```
//!
//! and evaluated per tuple with the tuple's stored values merged with the
//! request context. Stored values win over request values so a caller cannot
//! widen a grant by supplying its own copy of a stored parameter.
//!
//! Predicates are either CEL programs compiled at schema load time or native
//! Rust closures registered by the embedding service. Evaluation is a pure
//! function of its inputs, which is what lets the checker memoize results.

use crate::error::{ConditionError, SchemaError};
use crate::models::RequestContext;
use cel_interpreter::objects::Key;
use cel_interpreter::{Context, Program, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic;
use std::sync::Arc;

pub type ConditionParams = BTreeMap<String, serde_json::Value>;

/// Native predicate over the merged, type-checked parameter set
pub type NativePredicate =
    Arc<dyn Fn(&ConditionParams) -> Result<bool, ConditionError> + Send + Sync>;

/// Declared type of a condition parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ParamType {
    String,
    Int,
    Uint,
    Double,
    Bool,
    Timestamp,
    List,
    Map,
    Any,
}

impl ParamType {
    pub fn parse(value: &str) -> Option<Self> {
        // Generic arguments (`list<string>`) are accepted but not enforced
        let base = value.split('<').next().unwrap_or(value).trim();
        let parsed = match base {
            "string" => ParamType::String,
            "int" => ParamType::Int,
            "uint" => ParamType::Uint,
            "double" => ParamType::Double,
            "bool" => ParamType::Bool,
            "timestamp" => ParamType::Timestamp,
            "list" => ParamType::List,
            "map" => ParamType::Map,
            "any" => ParamType::Any,
            _ => return None,
        };
        Some(parsed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Int => "int",
            ParamType::Uint => "uint",
            ParamType::Double => "double",
            ParamType::Bool => "bool",
            ParamType::Timestamp => "timestamp",
            ParamType::List => "list",
            ParamType::Map => "map",
            ParamType::Any => "any",
        }
    }

    /// Convert a JSON value into the CEL value for this type
    fn to_cel(&self, value: &serde_json::Value) -> Option<Value> {
        use serde_json::Value as Json;

        match (self, value) {
            (ParamType::String, Json::String(s)) => Some(Value::String(s.clone().into())),
            (ParamType::Int, Json::Number(n)) => n.as_i64().map(Value::Int),
            (ParamType::Uint, Json::Number(n)) => n.as_u64().map(Value::UInt),
            (ParamType::Double, Json::Number(n)) => n.as_f64().map(Value::Float),
            (ParamType::Bool, Json::Bool(b)) => Some(Value::Bool(*b)),
            (ParamType::Timestamp, Json::String(s)) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(Value::Timestamp),
            (ParamType::List, Json::Array(_))
            | (ParamType::Map, Json::Object(_))
            | (ParamType::Any, _) => Some(json_to_cel(value)),
            _ => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for ParamType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ParamType::parse(&value).ok_or_else(|| format!("unknown parameter type '{}'", value))
    }
}

impl From<ParamType> for String {
    fn from(value: ParamType) -> Self {
        value.as_str().to_string()
    }
}

fn json_to_cel(value: &serde_json::Value) -> Value {
    use serde_json::Value as Json;

    match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        }
        Json::String(s) => Value::String(s.clone().into()),
        Json::Array(items) => Value::List(items.iter().map(json_to_cel).collect::<Vec<_>>().into()),
        Json::Object(entries) => {
            let converted: HashMap<Key, Value> = entries
                .iter()
                .map(|(k, v)| (Key::String(k.clone().into()), json_to_cel(v)))
                .collect();
            Value::Map(converted.into())
        }
    }
}

#[derive(Clone)]
enum Predicate {
    Cel { source: String, program: Arc<Program> },
    Native(NativePredicate),
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Cel { source, .. } => f.debug_tuple("Cel").field(source).finish(),
            Predicate::Native(_) => f.write_str("Native"),
        }
    }
}

/// A registered condition: its declared parameters and its predicate
#[derive(Debug, Clone)]
pub struct ConditionDefinition {
    name: String,
    parameters: BTreeMap<String, ParamType>,
    predicate: Predicate,
}

impl ConditionDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParamType> {
        &self.parameters
    }

    /// CEL source, if the predicate is a CEL expression
    pub fn expression(&self) -> Option<&str> {
        match self.predicate {
            Predicate::Cel { ref source, .. } => Some(source),
            Predicate::Native(_) => None,
        }
    }

    /// Stored tuple values must only name declared parameters, and each must
    /// already carry the declared type.
    pub fn validate_stored(
        &self,
        stored: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ConditionError> {
        for (key, value) in stored {
            let param_type =
                self.parameters
                    .get(key)
                    .ok_or_else(|| ConditionError::UnknownParameter {
                        condition: self.name.clone(),
                        parameter: key.clone(),
                    })?;
            self.typed(key, *param_type, value)?;
        }
        Ok(())
    }

    fn typed(
        &self,
        parameter: &str,
        param_type: ParamType,
        value: &serde_json::Value,
    ) -> Result<Value, ConditionError> {
        param_type
            .to_cel(value)
            .ok_or_else(|| ConditionError::TypeMismatch {
                condition: self.name.clone(),
                parameter: parameter.to_string(),
                expected: param_type.to_string(),
            })
    }

    /// Evaluate with stored tuple values taking precedence over request values
    pub fn evaluate(
        &self,
        stored: Option<&serde_json::Map<String, serde_json::Value>>,
        request: &RequestContext,
    ) -> Result<bool, ConditionError> {
        if let Some(stored) = stored {
            self.validate_stored(stored)?;
        }

        let mut bound = ConditionParams::new();
        let mut cel_values = Vec::with_capacity(self.parameters.len());
        for (parameter, param_type) in &self.parameters {
            let value = stored
                .and_then(|values| values.get(parameter))
                .or_else(|| request.values().get(parameter))
                .ok_or_else(|| ConditionError::MissingParameter {
                    condition: self.name.clone(),
                    parameter: parameter.clone(),
                })?;
            cel_values.push((parameter.clone(), self.typed(parameter, *param_type, value)?));
            bound.insert(parameter.clone(), value.clone());
        }

        match self.predicate {
            Predicate::Native(ref predicate) => predicate(&bound),
            Predicate::Cel { ref program, .. } => {
                let mut context = Context::default();
                for (name, value) in cel_values {
                    context.add_variable_from_value(name, value);
                }
                match program.execute(&context) {
                    Ok(Value::Bool(result)) => Ok(result),
                    Ok(_) => Err(ConditionError::NonBoolean {
                        condition: self.name.clone(),
                    }),
                    Err(err) => Err(ConditionError::Evaluation {
                        condition: self.name.clone(),
                        message: err.to_string(),
                    }),
                }
            }
        }
    }
}

/// Registry mapping condition names to predicates
#[derive(Debug, Clone, Default)]
pub struct ConditionRegistry {
    conditions: HashMap<String, Arc<ConditionDefinition>>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register a CEL condition. The expression may only reference
    /// declared parameters.
    pub fn register_cel(
        &mut self,
        name: &str,
        parameters: BTreeMap<String, ParamType>,
        expression: &str,
    ) -> Result<(), SchemaError> {
        let program = compile_cel(name, expression)?;

        let references = program.references();
        let mut undeclared: Vec<&str> = references
            .variables()
            .into_iter()
            .filter(|variable| !parameters.contains_key(*variable))
            .collect();
        undeclared.sort_unstable();
        if !undeclared.is_empty() {
            return Err(SchemaError::InvalidCondition {
                name: name.to_string(),
                message: format!("expression references undeclared parameters {:?}", undeclared),
            });
        }

        self.insert(ConditionDefinition {
            name: name.to_string(),
            parameters,
            predicate: Predicate::Cel {
                source: expression.trim().to_string(),
                program: Arc::new(program),
            },
        })
    }

    /// Register a predicate implemented in Rust
    pub fn register_native<F>(
        &mut self,
        name: &str,
        parameters: BTreeMap<String, ParamType>,
        predicate: F,
    ) -> Result<(), SchemaError>
    where
        F: Fn(&ConditionParams) -> Result<bool, ConditionError> + Send + Sync + 'static,
    {
        self.insert(ConditionDefinition {
            name: name.to_string(),
            parameters,
            predicate: Predicate::Native(Arc::new(predicate)),
        })
    }

    fn insert(&mut self, definition: ConditionDefinition) -> Result<(), SchemaError> {
        if self.conditions.contains_key(&definition.name) {
            return Err(SchemaError::DuplicateCondition(definition.name));
        }
        self.conditions
            .insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ConditionDefinition> {
        self.conditions.get(name).map(Arc::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.conditions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Evaluate a named condition against stored and request-supplied values
    pub fn evaluate(
        &self,
        name: &str,
        stored: Option<&serde_json::Map<String, serde_json::Value>>,
        request: &RequestContext,
    ) -> Result<bool, ConditionError> {
        self.get(name)
            .ok_or_else(|| ConditionError::NotFound(name.to_string()))?
            .evaluate(stored, request)
    }
}

fn compile_cel(name: &str, expression: &str) -> Result<Program, SchemaError> {
    // The CEL parser can panic on some malformed input
    let compiled = panic::catch_unwind(panic::AssertUnwindSafe(|| Program::compile(expression)));
    match compiled {
        Ok(Ok(program)) => Ok(program),
        Ok(Err(err)) => Err(SchemaError::InvalidCondition {
            name: name.to_string(),
            message: err.to_string(),
        }),
        Err(_) => Err(SchemaError::InvalidCondition {
            name: name.to_string(),
            message: "expression could not be parsed".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn group_filter() -> ConditionRegistry {
        let mut registry = ConditionRegistry::new();
        let params = BTreeMap::from([
            ("requested_group".to_string(), ParamType::String),
            ("resource_group".to_string(), ParamType::String),
        ]);
        registry
            .register_cel("group_filter", params, "requested_group == resource_group")
            .unwrap();
        registry
    }

    fn stored(group: &str) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("resource_group".to_string(), json!(group));
        map
    }

    #[test]
    fn test_group_filter_gating() {
        let registry = group_filter();
        let team_a = RequestContext::new().with_value("requested_group", "teamA");
        let team_b = RequestContext::new().with_value("requested_group", "teamB");

        assert!(registry
            .evaluate("group_filter", Some(&stored("teamA")), &team_a)
            .unwrap());
        assert!(!registry
            .evaluate("group_filter", Some(&stored("teamA")), &team_b)
            .unwrap());
    }

    #[test]
    fn test_stored_values_take_precedence() {
        let registry = group_filter();
        let forged = RequestContext::new()
            .with_value("requested_group", "teamB")
            .with_value("resource_group", "teamB");
        assert!(!registry
            .evaluate("group_filter", Some(&stored("teamA")), &forged)
            .unwrap());
    }

    #[test]
    fn test_missing_parameter() {
        let registry = group_filter();
        let err = registry
            .evaluate("group_filter", Some(&stored("teamA")), &RequestContext::new())
            .unwrap_err();
        assert_eq!(
            err,
            ConditionError::MissingParameter {
                condition: "group_filter".to_string(),
                parameter: "requested_group".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_condition() {
        let registry = ConditionRegistry::new();
        let err = registry
            .evaluate("nope", None, &RequestContext::new())
            .unwrap_err();
        assert_eq!(err, ConditionError::NotFound("nope".to_string()));
    }

    #[test]
    fn test_undeclared_stored_parameter() {
        let registry = group_filter();
        let mut values = stored("teamA");
        values.insert("extra".to_string(), json!(1));
        assert!(matches!(
            registry.get("group_filter").unwrap().validate_stored(&values),
            Err(ConditionError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let registry = group_filter();
        let context = RequestContext::new().with_value("requested_group", 42);
        assert!(matches!(
            registry.evaluate("group_filter", Some(&stored("teamA")), &context),
            Err(ConditionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_expression_must_use_declared_parameters() {
        let mut registry = ConditionRegistry::new();
        let params = BTreeMap::from([("a".to_string(), ParamType::Int)]);
        let err = registry.register_cel("bad", params, "a == b").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidCondition { .. }));
    }

    #[test]
    fn test_numeric_and_timestamp_parameters() {
        let mut registry = ConditionRegistry::new();
        let params = BTreeMap::from([
            ("now".to_string(), ParamType::Timestamp),
            ("expires_at".to_string(), ParamType::Timestamp),
        ]);
        registry
            .register_cel("not_expired", params, "now < expires_at")
            .unwrap();

        let mut values = serde_json::Map::new();
        values.insert("expires_at".to_string(), json!("2030-01-01T00:00:00Z"));
        let before = RequestContext::new().with_value("now", "2026-10-18T00:00:00Z");
        let after = RequestContext::new().with_value("now", "2031-01-01T00:00:00Z");

        assert!(registry.evaluate("not_expired", Some(&values), &before).unwrap());
        assert!(!registry.evaluate("not_expired", Some(&values), &after).unwrap());
    }

    #[test]
    fn test_native_predicate() {
        let mut registry = ConditionRegistry::new();
        let params = BTreeMap::from([("max".to_string(), ParamType::Int), ("amount".to_string(), ParamType::Int)]);
        registry
            .register_native("under_limit", params, |values| {
                let amount = values.get("amount").and_then(|v| v.as_i64()).unwrap_or(i64::MAX);
                let max = values.get("max").and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(amount <= max)
            })
            .unwrap();

        let mut values = serde_json::Map::new();
        values.insert("max".to_string(), json!(100));
        let small = RequestContext::new().with_value("amount", 10);
        let large = RequestContext::new().with_value("amount", 1000);
        assert!(registry.evaluate("under_limit", Some(&values), &small).unwrap());
        assert!(!registry.evaluate("under_limit", Some(&values), &large).unwrap());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = group_filter();
        let err = registry
            .register_cel("group_filter", BTreeMap::new(), "true")
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateCondition("group_filter".to_string()));
    }

    #[test]
    fn test_param_type_parse() {
        assert_eq!(ParamType::parse("list<string>"), Some(ParamType::List));
        assert_eq!(ParamType::parse("string"), Some(ParamType::String));
        assert_eq!(ParamType::parse("blob"), None);
    }
}
