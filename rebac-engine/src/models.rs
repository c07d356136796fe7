use crate::error::AuthzError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A protected resource, written `type:id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_type: String,
    pub object_id: String,
}

impl ObjectRef {
    pub fn new(object_type: &str, object_id: &str) -> Self {
        Self {
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

impl FromStr for ObjectRef {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (object_type, object_id) = split_type_id(value)?;
        if object_id.contains('#') {
            return Err(AuthzError::InvalidRequest(format!(
                "object '{}' must not carry a relation",
                value
            )));
        }
        Ok(Self::new(object_type, object_id))
    }
}

/// The subject of a relationship: either a concrete principal (`user:42`) or a
/// userset (`team:7#member`, "every member of team 7").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectRef {
    pub subject_type: String,
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

impl SubjectRef {
    pub fn new(subject_type: &str, subject_id: &str) -> Self {
        Self {
            subject_type: subject_type.to_string(),
            subject_id: subject_id.to_string(),
            relation: None,
        }
    }

    pub fn user(user_id: &str) -> Self {
        Self::new("user", user_id)
    }

    pub fn userset(subject_type: &str, subject_id: &str, relation: &str) -> Self {
        Self {
            subject_type: subject_type.to_string(),
            subject_id: subject_id.to_string(),
            relation: Some(relation.to_string()),
        }
    }

    /// All members of a team
    pub fn team_members(team_id: &str) -> Self {
        Self::userset("team", team_id, "member")
    }

    /// All assignees of a role
    pub fn role_assignees(role: &str) -> Self {
        Self::userset("role", role, "assignee")
    }

    pub fn is_userset(&self) -> bool {
        self.relation.is_some()
    }

    /// The object a userset subject points at (`team:7` for `team:7#member`)
    pub fn as_object(&self) -> ObjectRef {
        ObjectRef::new(&self.subject_type, &self.subject_id)
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.relation {
            Some(ref relation) => write!(
                f,
                "{}:{}#{}",
                self.subject_type, self.subject_id, relation
            ),
            None => write!(f, "{}:{}", self.subject_type, self.subject_id),
        }
    }
}

impl FromStr for SubjectRef {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (subject_type, rest) = split_type_id(value)?;
        match rest.split_once('#') {
            Some((subject_id, relation)) => {
                if subject_id.is_empty() || relation.is_empty() {
                    return Err(AuthzError::InvalidRequest(format!(
                        "userset '{}' must be in 'type:id#relation' format",
                        value
                    )));
                }
                Ok(Self::userset(subject_type, subject_id, relation))
            }
            None => Ok(Self::new(subject_type, rest)),
        }
    }
}

fn split_type_id(value: &str) -> Result<(&str, &str), AuthzError> {
    match value.split_once(':') {
        Some((object_type, object_id)) if !object_type.is_empty() && !object_id.is_empty() => {
            Ok((object_type, object_id))
        }
        _ => Err(AuthzError::InvalidRequest(format!(
            "'{}' must be in 'type:id' format",
            value
        ))),
    }
}

/// A named condition attached to a tuple, with the parameter values stored
/// alongside the grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleCondition {
    pub name: String,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl TupleCondition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            context: serde_json::Map::new(),
        }
    }

    pub fn with_value(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

/// Represents a relationship fact: subject has relation to object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuple {
    pub object: ObjectRef,
    pub relation: String,
    pub subject: SubjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<TupleCondition>,
}

impl Tuple {
    pub fn new(object: ObjectRef, relation: &str, subject: SubjectRef) -> Self {
        Self {
            object,
            relation: relation.to_string(),
            subject,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: TupleCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Two tuples with the same key describe the same grant; writing one
    /// replaces the other.
    pub fn key(&self) -> TupleKey {
        TupleKey {
            object: self.object.clone(),
            relation: self.relation.clone(),
            subject: self.subject.clone(),
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.object, self.relation, self.subject)?;
        if let Some(ref condition) = self.condition {
            write!(f, "[{}]", condition.name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TupleKey {
    pub object: ObjectRef,
    pub relation: String,
    pub subject: SubjectRef,
}

/// Values supplied with a request for condition evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestContext(serde_json::Map<String, serde_json::Value>);

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn values(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical rendering used in memoization keys. `serde_json::Map` keeps
    /// keys sorted, so equal contexts always render identically.
    pub fn signature(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        serde_json::Value::Object(self.0.clone()).to_string()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for RequestContext {
    fn from(values: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(values)
    }
}

impl TryFrom<serde_json::Value> for RequestContext {
    type Error = AuthzError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Object(values) => Ok(Self(values)),
            serde_json::Value::Null => Ok(Self::default()),
            other => Err(AuthzError::InvalidRequest(format!(
                "context must be a JSON object, got {}",
                other
            ))),
        }
    }
}

/// Authorization check request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub object: ObjectRef,
    pub relation: String,
    pub subject: SubjectRef,
    #[serde(default)]
    pub context: RequestContext,
}

impl CheckRequest {
    pub fn new(object: ObjectRef, relation: &str, subject: SubjectRef) -> Self {
        Self {
            object,
            relation: relation.to_string(),
            subject,
            context: RequestContext::default(),
        }
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}

impl fmt::Display for CheckRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.object, self.relation, self.subject)
    }
}

/// Authorization check response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    /// Number of distinct sub-problems the evaluation resolved
    pub resolved_nodes: usize,
}

/// Request to enumerate every subject holding a relation on an object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandRequest {
    pub object: ObjectRef,
    pub relation: String,
    #[serde(default)]
    pub context: RequestContext,
}

/// Structured expansion of a relation, mirroring the schema expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubjectTree {
    /// Concrete subjects granted directly, plus nested userset expansions
    Leaf {
        object: ObjectRef,
        relation: String,
        subjects: Vec<SubjectRef>,
        usersets: Vec<SubjectTree>,
    },
    /// Any child grants the relation
    Union {
        object: ObjectRef,
        relation: String,
        children: Vec<SubjectTree>,
    },
    /// The relation is granted through a related object
    TupleToUserset {
        object: ObjectRef,
        tupleset: String,
        children: Vec<SubjectTree>,
    },
    /// The node was already being expanded higher up the path
    Cycle { object: ObjectRef, relation: String },
    /// Expansion stopped at the depth limit; subjects below are missing
    Truncated { object: ObjectRef, relation: String },
}

/// Batch write request for multiple tuples
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteRequest {
    #[serde(default)]
    pub writes: Vec<Tuple>,
    #[serde(default)]
    pub deletes: Vec<Tuple>,
}

/// Filter for tuple reads. `None` fields act as wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TupleFilter {
    pub object_type: Option<String>,
    pub object_id: Option<String>,
    pub relation: Option<String>,
    pub subject_type: Option<String>,
}

impl TupleFilter {
    pub fn for_object(object: &ObjectRef) -> Self {
        Self {
            object_type: Some(object.object_type.clone()),
            object_id: Some(object.object_id.clone()),
            ..Self::default()
        }
    }

    pub fn for_relation(object: &ObjectRef, relation: &str) -> Self {
        Self {
            relation: Some(relation.to_string()),
            ..Self::for_object(object)
        }
    }

    pub fn with_subject_type(mut self, subject_type: &str) -> Self {
        self.subject_type = Some(subject_type.to_string());
        self
    }

    pub fn matches(&self, tuple: &Tuple) -> bool {
        fn field_matches(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().map_or(true, |expected| expected == value)
        }

        field_matches(&self.object_type, &tuple.object.object_type)
            && field_matches(&self.object_id, &tuple.object.object_id)
            && field_matches(&self.relation, &tuple.relation)
            && field_matches(&self.subject_type, &tuple.subject.subject_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_parse_and_display() {
        let user: SubjectRef = "user:alice".parse().unwrap();
        assert_eq!(user, SubjectRef::user("alice"));
        assert_eq!(user.to_string(), "user:alice");

        let team: SubjectRef = "team:7#member".parse().unwrap();
        assert_eq!(team, SubjectRef::team_members("7"));
        assert!(team.is_userset());
        assert_eq!(team.as_object(), ObjectRef::new("team", "7"));

        assert!("alice".parse::<SubjectRef>().is_err());
        assert!("team:7#".parse::<SubjectRef>().is_err());
    }

    #[test]
    fn test_object_parse() {
        let object: ObjectRef = "folder2:f1".parse().unwrap();
        assert_eq!(object.object_type, "folder2");
        assert_eq!(object.object_id, "f1");
        assert!(":f1".parse::<ObjectRef>().is_err());
        assert!("folder2:".parse::<ObjectRef>().is_err());
        assert!("team:1#member".parse::<ObjectRef>().is_err());
    }

    #[test]
    fn test_context_signature_is_canonical() {
        let a = RequestContext::new()
            .with_value("b", 2)
            .with_value("a", "x");
        let b = RequestContext::new()
            .with_value("a", "x")
            .with_value("b", 2);
        assert_eq!(a.signature(), b.signature());
        assert_eq!(RequestContext::new().signature(), "");
    }

    #[test]
    fn test_filter_matches() {
        let tuple = Tuple::new(
            ObjectRef::new("namespace", "n1"),
            "admin",
            SubjectRef::team_members("7"),
        );
        let object = ObjectRef::new("namespace", "n1");
        assert!(TupleFilter::for_object(&object).matches(&tuple));
        assert!(TupleFilter::for_relation(&object, "admin").matches(&tuple));
        assert!(!TupleFilter::for_relation(&object, "edit").matches(&tuple));
        assert!(TupleFilter::for_relation(&object, "admin")
            .with_subject_type("team")
            .matches(&tuple));
        assert!(!TupleFilter::for_relation(&object, "admin")
            .with_subject_type("user")
            .matches(&tuple));
    }

    #[test]
    fn test_tuple_display() {
        let tuple = Tuple::new(
            ObjectRef::new("resource", "r1"),
            "view",
            SubjectRef::user("u1"),
        )
        .with_condition(TupleCondition::new("group_filter").with_value("resource_group", "teamA"));
        assert_eq!(tuple.to_string(), "resource:r1#view@user:u1[group_filter]");
    }
}
