//! Schema model: object types, their relations and the expressions that
//! derive each relation.
//!
//! A schema is authored either in the DSL (see [`parser`]) or in a structured
//! YAML/JSON form, and compiled once into an immutable [`CompiledSchema`].
//! Compilation rejects dangling references, malformed hierarchies and
//! relation groups that could only ever be satisfied by themselves.

mod dashboard;
pub mod parser;

use crate::condition::{ConditionRegistry, ParamType};
use crate::error::{AuthzError, SchemaError};
use crate::models::Tuple;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

pub use dashboard::DASHBOARD_SCHEMA;

/// One allowed subject shape in a direct assignment: `user`, `team#member`,
/// `user with group_filter`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectSpec {
    pub subject_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl SubjectSpec {
    pub fn new(subject_type: &str) -> Self {
        Self {
            subject_type: subject_type.to_string(),
            relation: None,
            condition: None,
        }
    }

    pub fn userset(subject_type: &str, relation: &str) -> Self {
        Self {
            relation: Some(relation.to_string()),
            ..Self::new(subject_type)
        }
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    /// Whether a stored tuple has this subject shape and condition
    pub fn accepts(&self, tuple: &Tuple) -> bool {
        self.subject_type == tuple.subject.subject_type
            && self.relation == tuple.subject.relation
            && self.condition.as_deref() == tuple.condition.as_ref().map(|c| c.name.as_str())
    }
}

impl fmt::Display for SubjectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subject_type)?;
        if let Some(ref relation) = self.relation {
            write!(f, "#{}", relation)?;
        }
        if let Some(ref condition) = self.condition {
            write!(f, " with {}", condition)?;
        }
        Ok(())
    }
}

/// How a relation is derived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationExpr {
    /// Subjects granted by stored tuples on this object
    Direct { subjects: Vec<SubjectSpec> },
    /// Another relation on the same object
    Computed { relation: String },
    /// Any child expression holds
    Union { children: Vec<RelationExpr> },
    /// `computed` holds on an object reached through the `tupleset` relation
    TupleToUserset { tupleset: String, computed: String },
}

impl RelationExpr {
    pub fn direct(subjects: Vec<SubjectSpec>) -> Self {
        RelationExpr::Direct { subjects }
    }

    pub fn computed(relation: &str) -> Self {
        RelationExpr::Computed {
            relation: relation.to_string(),
        }
    }

    pub fn union(children: Vec<RelationExpr>) -> Self {
        RelationExpr::Union { children }
    }

    pub fn tuple_to_userset(tupleset: &str, computed: &str) -> Self {
        RelationExpr::TupleToUserset {
            tupleset: tupleset.to_string(),
            computed: computed.to_string(),
        }
    }

    /// Direct subject specs at the top of this expression (through unions only)
    pub fn direct_subjects(&self) -> Vec<&SubjectSpec> {
        match self {
            RelationExpr::Direct { subjects } => subjects.iter().collect(),
            RelationExpr::Union { children } => children
                .iter()
                .flat_map(RelationExpr::direct_subjects)
                .collect(),
            RelationExpr::Computed { .. } | RelationExpr::TupleToUserset { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for RelationExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationExpr::Direct { subjects } => {
                let specs: Vec<String> = subjects.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", specs.join(", "))
            }
            RelationExpr::Computed { relation } => write!(f, "{}", relation),
            RelationExpr::Union { children } => {
                let parts: Vec<String> = children.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(" or "))
            }
            RelationExpr::TupleToUserset { tupleset, computed } => {
                write!(f, "{} from {}", computed, tupleset)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub name: String,
    pub expression: RelationExpr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionDeclaration {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamType>,
    pub expression: String,
}

/// Uncompiled schema, as authored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub types: Vec<TypeDefinition>,
    #[serde(default)]
    pub conditions: Vec<ConditionDeclaration>,
}

impl SchemaDefinition {
    /// Parse the schema DSL
    pub fn parse(source: &str) -> Result<Self, SchemaError> {
        parser::parse_schema(source)
    }

    pub fn from_yaml(source: &str) -> Result<Self, SchemaError> {
        serde_yaml::from_str(source).map_err(|err| {
            let (line, column) = err
                .location()
                .map_or((0, 0), |location| (location.line(), location.column()));
            SchemaError::Parse {
                line,
                column,
                message: err.to_string(),
            }
        })
    }

    pub fn from_json(source: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(source).map_err(|err| SchemaError::Parse {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        })
    }

    pub fn compile(self) -> Result<CompiledSchema, SchemaError> {
        self.compile_with(ConditionRegistry::new())
    }

    /// Compile against a registry that may already hold native conditions
    pub fn compile_with(self, mut conditions: ConditionRegistry) -> Result<CompiledSchema, SchemaError> {
        for declaration in &self.conditions {
            conditions.register_cel(
                &declaration.name,
                declaration.parameters.clone(),
                &declaration.expression,
            )?;
        }

        let mut types: HashMap<String, ObjectType> = HashMap::new();
        for definition in self.types {
            if types.contains_key(&definition.name) {
                return Err(SchemaError::DuplicateType(definition.name));
            }

            let mut relations = BTreeMap::new();
            for relation in definition.relations {
                if relations.contains_key(&relation.name) {
                    return Err(SchemaError::DuplicateRelation {
                        object_type: definition.name,
                        relation: relation.name,
                    });
                }
                relations.insert(relation.name, relation.expression);
            }

            types.insert(
                definition.name.clone(),
                ObjectType {
                    name: definition.name,
                    relations,
                    hierarchy: Vec::new(),
                },
            );
        }

        let schema = CompiledSchema { types, conditions };
        schema.check_references()?;
        schema.check_grounded()?;
        Ok(schema.with_hierarchies())
    }
}

/// A compiled object type
#[derive(Debug, Clone)]
pub struct ObjectType {
    name: String,
    relations: BTreeMap<String, RelationExpr>,
    hierarchy: Vec<String>,
}

impl ObjectType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relation(&self, name: &str) -> Option<&RelationExpr> {
        self.relations.get(name)
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    /// Relations used to reach related objects (`parent`, `folder`)
    pub fn hierarchy_relations(&self) -> &[String] {
        &self.hierarchy
    }
}

/// Immutable, validated schema shared by every evaluation
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    types: HashMap<String, ObjectType>,
    conditions: ConditionRegistry,
}

impl CompiledSchema {
    /// Parse and compile the schema DSL in one step
    pub fn from_dsl(source: &str) -> Result<Self, SchemaError> {
        SchemaDefinition::parse(source)?.compile()
    }

    /// The schema used by the dashboard permission service
    pub fn dashboard() -> Result<Self, SchemaError> {
        Self::from_dsl(DASHBOARD_SCHEMA)
    }

    pub fn object_type(&self, name: &str) -> Result<&ObjectType, AuthzError> {
        self.types
            .get(name)
            .ok_or_else(|| AuthzError::UnknownObjectType(name.to_string()))
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Expression for (type, relation)
    pub fn relation(&self, object_type: &str, relation: &str) -> Result<&RelationExpr, AuthzError> {
        self.object_type(object_type)?
            .relation(relation)
            .ok_or_else(|| AuthzError::UnknownRelation {
                object_type: object_type.to_string(),
                relation: relation.to_string(),
            })
    }

    pub fn hierarchy_relations(&self, object_type: &str) -> Result<&[String], AuthzError> {
        Ok(self.object_type(object_type)?.hierarchy_relations())
    }

    pub fn conditions(&self) -> &ConditionRegistry {
        &self.conditions
    }

    /// Check that a tuple is writable under this schema: the relation accepts
    /// direct grants of this subject shape, and any stored condition values
    /// are declared by the condition.
    pub fn validate_tuple(&self, tuple: &Tuple) -> Result<(), AuthzError> {
        if tuple.object.object_id.is_empty() || tuple.subject.subject_id.is_empty() {
            return Err(AuthzError::InvalidTuple(format!(
                "tuple '{}' has an empty identifier",
                tuple
            )));
        }

        let expression = self.relation(&tuple.object.object_type, &tuple.relation)?;
        let allowed = expression.direct_subjects();
        if allowed.is_empty() {
            return Err(AuthzError::InvalidTuple(format!(
                "relation '{}#{}' does not accept direct grants",
                tuple.object.object_type, tuple.relation
            )));
        }

        if !allowed.iter().any(|spec| spec.accepts(tuple)) {
            let shapes: Vec<String> = allowed.iter().map(ToString::to_string).collect();
            return Err(AuthzError::InvalidTuple(format!(
                "subject '{}' is not allowed on '{}#{}' (allowed: {})",
                tuple.subject,
                tuple.object.object_type,
                tuple.relation,
                shapes.join(", ")
            )));
        }

        if let Some(ref condition) = tuple.condition {
            let definition = self.conditions.get(&condition.name).ok_or_else(|| {
                AuthzError::InvalidTuple(format!("unknown condition '{}'", condition.name))
            })?;
            definition
                .validate_stored(&condition.context)
                .map_err(|err| AuthzError::InvalidTuple(err.to_string()))?;
        }

        Ok(())
    }

    fn check_references(&self) -> Result<(), SchemaError> {
        for object_type in self.types.values() {
            for (relation, expression) in &object_type.relations {
                self.check_expression(object_type, relation, expression)?;
            }
        }
        Ok(())
    }

    fn check_expression(
        &self,
        object_type: &ObjectType,
        relation: &str,
        expression: &RelationExpr,
    ) -> Result<(), SchemaError> {
        let unknown_relation = |referenced: &str| SchemaError::UnknownRelation {
            object_type: object_type.name.clone(),
            relation: relation.to_string(),
            referenced: referenced.to_string(),
        };

        match expression {
            RelationExpr::Direct { subjects } => {
                if subjects.is_empty() {
                    return Err(SchemaError::EmptyExpression {
                        object_type: object_type.name.clone(),
                        relation: relation.to_string(),
                    });
                }
                for spec in subjects {
                    let subject_type = self.types.get(&spec.subject_type).ok_or_else(|| {
                        SchemaError::UnknownType {
                            object_type: object_type.name.clone(),
                            relation: relation.to_string(),
                            referenced: spec.subject_type.clone(),
                        }
                    })?;
                    if let Some(ref userset) = spec.relation {
                        if subject_type.relation(userset).is_none() {
                            return Err(unknown_relation(&format!(
                                "{}#{}",
                                spec.subject_type, userset
                            )));
                        }
                    }
                    if let Some(ref condition) = spec.condition {
                        if !self.conditions.contains(condition) {
                            return Err(SchemaError::UnknownCondition {
                                object_type: object_type.name.clone(),
                                relation: relation.to_string(),
                                condition: condition.clone(),
                            });
                        }
                    }
                }
                Ok(())
            }
            RelationExpr::Computed { relation: target } => {
                if object_type.relation(target).is_none() {
                    return Err(unknown_relation(target));
                }
                Ok(())
            }
            RelationExpr::Union { children } => {
                if children.is_empty() {
                    return Err(SchemaError::EmptyExpression {
                        object_type: object_type.name.clone(),
                        relation: relation.to_string(),
                    });
                }
                for child in children {
                    self.check_expression(object_type, relation, child)?;
                }
                Ok(())
            }
            RelationExpr::TupleToUserset { tupleset, computed } => {
                let invalid = |message: String| SchemaError::InvalidHierarchy {
                    object_type: object_type.name.clone(),
                    relation: relation.to_string(),
                    message,
                };

                let tupleset_expr = object_type
                    .relation(tupleset)
                    .ok_or_else(|| unknown_relation(tupleset))?;
                let targets = match tupleset_expr {
                    RelationExpr::Direct { subjects } => subjects,
                    _ => {
                        return Err(invalid(format!(
                            "hierarchy relation '{}' must be a direct assignment",
                            tupleset
                        )))
                    }
                };

                for target in targets {
                    if target.relation.is_some() || target.condition.is_some() {
                        return Err(invalid(format!(
                            "hierarchy relation '{}' may only assign plain objects, found '{}'",
                            tupleset, target
                        )));
                    }
                    // Subject types were already resolved by the Direct arm for
                    // the tupleset relation itself.
                    let defines = self
                        .types
                        .get(&target.subject_type)
                        .map_or(false, |t| t.relation(computed).is_some());
                    if !defines {
                        return Err(invalid(format!(
                            "type '{}' reached via '{}' does not define '{}'",
                            target.subject_type, tupleset, computed
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    /// Reject relation groups whose every derivation leads back into the
    /// group, such as `define read: read from parent` on its own.
    fn check_grounded(&self) -> Result<(), SchemaError> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut nodes: HashMap<(String, String), NodeIndex> = HashMap::new();
        let mut grounded: HashSet<NodeIndex> = HashSet::new();

        for object_type in self.types.values() {
            for relation in object_type.relations.keys() {
                let index = graph.add_node(format!("{}#{}", object_type.name, relation));
                nodes.insert((object_type.name.clone(), relation.clone()), index);
            }
        }

        for object_type in self.types.values() {
            for (relation, expression) in &object_type.relations {
                let key = (object_type.name.clone(), relation.clone());
                let Some(&from) = nodes.get(&key) else { continue };

                let mut edges = Vec::new();
                if self.collect_dependencies(object_type, expression, &mut edges) {
                    grounded.insert(from);
                }
                for dependency in edges {
                    if let Some(&to) = nodes.get(&dependency) {
                        graph.update_edge(from, to, ());
                    }
                }
            }
        }

        for component in tarjan_scc(&graph) {
            let cyclic = match component.as_slice() {
                [single] => graph.contains_edge(*single, *single),
                _ => true,
            };
            if !cyclic {
                continue;
            }

            let members: HashSet<NodeIndex> = component.iter().copied().collect();
            let escapes = component.iter().any(|node| {
                grounded.contains(node)
                    || graph.neighbors(*node).any(|next| !members.contains(&next))
            });
            if !escapes {
                let relations: BTreeSet<String> = component
                    .iter()
                    .filter_map(|node| graph.node_weight(*node).cloned())
                    .collect();
                return Err(SchemaError::UngroundedCycle {
                    relations: relations.into_iter().collect(),
                });
            }
        }

        Ok(())
    }

    /// Push every (type, relation) this expression depends on; returns true if
    /// the expression can be satisfied by a concrete direct grant.
    fn collect_dependencies(
        &self,
        object_type: &ObjectType,
        expression: &RelationExpr,
        edges: &mut Vec<(String, String)>,
    ) -> bool {
        match expression {
            RelationExpr::Direct { subjects } => {
                let mut has_concrete = false;
                for spec in subjects {
                    match spec.relation {
                        Some(ref userset) => {
                            edges.push((spec.subject_type.clone(), userset.clone()))
                        }
                        None => has_concrete = true,
                    }
                }
                has_concrete
            }
            RelationExpr::Computed { relation } => {
                edges.push((object_type.name.clone(), relation.clone()));
                false
            }
            RelationExpr::Union { children } => {
                let mut grounded = false;
                for child in children {
                    grounded |= self.collect_dependencies(object_type, child, edges);
                }
                grounded
            }
            RelationExpr::TupleToUserset { tupleset, computed } => {
                if let Some(RelationExpr::Direct { subjects }) = object_type.relation(tupleset) {
                    for target in subjects {
                        edges.push((target.subject_type.clone(), computed.clone()));
                    }
                }
                false
            }
        }
    }

    fn with_hierarchies(mut self) -> Self {
        for object_type in self.types.values_mut() {
            let mut hierarchy = BTreeSet::new();
            for expression in object_type.relations.values() {
                collect_tuplesets(expression, &mut hierarchy);
            }
            object_type.hierarchy = hierarchy.into_iter().collect();
        }
        self
    }
}

fn collect_tuplesets(expression: &RelationExpr, out: &mut BTreeSet<String>) {
    match expression {
        RelationExpr::TupleToUserset { tupleset, .. } => {
            out.insert(tupleset.clone());
        }
        RelationExpr::Union { children } => {
            for child in children {
                collect_tuplesets(child, out);
            }
        }
        RelationExpr::Direct { .. } | RelationExpr::Computed { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ObjectRef, SubjectRef, TupleCondition};

    fn compile(source: &str) -> Result<CompiledSchema, SchemaError> {
        CompiledSchema::from_dsl(source)
    }

    #[test]
    fn test_dashboard_schema_compiles() {
        let schema = CompiledSchema::dashboard().unwrap();
        for name in ["user", "team", "role", "namespace", "folder2", "dashboard", "resource"] {
            assert!(schema.object_type(name).is_ok(), "missing type {}", name);
        }
        assert_eq!(
            schema.hierarchy_relations("folder2").unwrap(),
            &["parent".to_string()]
        );
        assert_eq!(
            schema.hierarchy_relations("dashboard").unwrap(),
            &["folder".to_string()]
        );
        assert!(schema.hierarchy_relations("namespace").unwrap().is_empty());
        assert!(schema.conditions().contains("group_filter"));
    }

    #[test]
    fn test_relation_lookup_errors() {
        let schema = CompiledSchema::dashboard().unwrap();
        assert!(matches!(
            schema.relation("namespace", "share"),
            Err(AuthzError::UnknownRelation { .. })
        ));
        assert!(matches!(
            schema.relation("widget", "view"),
            Err(AuthzError::UnknownObjectType(_))
        ));
        assert_eq!(
            schema.relation("namespace", "admin").unwrap().to_string(),
            "[user, team#member, role#assignee]"
        );
    }

    #[test]
    fn test_unknown_references_rejected() {
        let err = compile("type doc\n  relations\n    define view: [person]\n").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownType { .. }));

        let err = compile("type user\ntype doc\n  relations\n    define view: [user] or edit\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownRelation { .. }));

        let err = compile("type user\ntype doc\n  relations\n    define view: [user with missing]\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownCondition { .. }));

        let err = compile("type user\ntype doc\n  relations\n    define view: [user#member]\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownRelation { .. }));
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = compile("type user\ntype user\n").unwrap_err();
        assert_eq!(err, SchemaError::DuplicateType("user".to_string()));

        let err = compile(
            "type user\ntype doc\n  relations\n    define view: [user]\n    define view: [user]\n",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateRelation { .. }));
    }

    #[test]
    fn test_hierarchy_target_must_define_relation() {
        let source = "
type user
type org
  relations
    define member: [user]
type folder
  relations
    define parent: [org]
    define read: [user] or read from parent
";
        let err = compile(source).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidHierarchy { .. }));
    }

    #[test]
    fn test_hierarchy_relation_must_be_plain_direct() {
        let source = "
type user
type folder
  relations
    define owner: [user]
    define parent: [folder] or owner
    define read: [user] or read from parent
";
        let err = compile(source).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidHierarchy { .. }));
    }

    #[test]
    fn test_ungrounded_cycles_rejected() {
        let err = compile(
            "type user\ntype folder\n  relations\n    define parent: [folder]\n    define read: read from parent\n",
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UngroundedCycle {
                relations: vec!["folder#read".to_string()]
            }
        );

        let err = compile(
            "type user\ntype doc\n  relations\n    define view: edit\n    define edit: view\n",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UngroundedCycle { .. }));

        // A recursive hierarchy with a base case is fine
        assert!(compile(
            "type user\ntype folder\n  relations\n    define parent: [folder]\n    define read: [user] or read from parent\n",
        )
        .is_ok());
    }

    #[test]
    fn test_validate_tuple() {
        let schema = CompiledSchema::dashboard().unwrap();
        let n1 = ObjectRef::new("namespace", "n1");

        let ok = Tuple::new(n1.clone(), "admin", SubjectRef::user("u1"));
        assert!(schema.validate_tuple(&ok).is_ok());

        let team = Tuple::new(n1.clone(), "view", SubjectRef::team_members("t1"));
        assert!(schema.validate_tuple(&team).is_ok());

        let wrong_shape = Tuple::new(n1.clone(), "view", SubjectRef::new("team", "t1"));
        assert!(matches!(
            schema.validate_tuple(&wrong_shape),
            Err(AuthzError::InvalidTuple(_))
        ));

        let unknown = Tuple::new(n1, "share", SubjectRef::user("u1"));
        assert!(matches!(
            schema.validate_tuple(&unknown),
            Err(AuthzError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_validate_conditional_tuple() {
        let schema = CompiledSchema::dashboard().unwrap();
        let r1 = ObjectRef::new("resource", "r1");

        let unconditioned = Tuple::new(r1.clone(), "view", SubjectRef::user("u1"));
        assert!(schema.validate_tuple(&unconditioned).is_err());

        let conditioned = Tuple::new(r1.clone(), "view", SubjectRef::user("u1")).with_condition(
            TupleCondition::new("group_filter").with_value("resource_group", "teamA"),
        );
        assert!(schema.validate_tuple(&conditioned).is_ok());

        let undeclared = Tuple::new(r1, "view", SubjectRef::user("u1"))
            .with_condition(TupleCondition::new("group_filter").with_value("colour", "red"));
        assert!(matches!(
            schema.validate_tuple(&undeclared),
            Err(AuthzError::InvalidTuple(_))
        ));
    }

    #[test]
    fn test_structured_schema() {
        let json = r#"{
            "types": [
                { "name": "user" },
                { "name": "doc", "relations": [
                    { "name": "owner", "expression": { "kind": "direct", "subjects": [ { "subject_type": "user" } ] } },
                    { "name": "view", "expression": { "kind": "union", "children": [
                        { "kind": "direct", "subjects": [ { "subject_type": "user" } ] },
                        { "kind": "computed", "relation": "owner" }
                    ] } }
                ] }
            ]
        }"#;
        let schema = SchemaDefinition::from_json(json).unwrap().compile().unwrap();
        assert_eq!(schema.relation("doc", "view").unwrap().to_string(), "[user] or owner");

        let yaml = "
types:
  - name: user
  - name: doc
    relations:
      - name: owner
        expression:
          kind: direct
          subjects:
            - subject_type: user
";
        let schema = SchemaDefinition::from_yaml(yaml).unwrap().compile().unwrap();
        assert!(schema.relation("doc", "owner").is_ok());
    }
}
