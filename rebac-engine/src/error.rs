use error_common::{codes, Classify, ErrorClass};
use thiserror::Error;

/// Failures raised while compiling a schema. These are fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Schema parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Duplicate object type '{0}'")]
    DuplicateType(String),

    #[error("Duplicate relation '{relation}' on type '{object_type}'")]
    DuplicateRelation {
        object_type: String,
        relation: String,
    },

    #[error("Duplicate condition '{0}'")]
    DuplicateCondition(String),

    #[error("Relation '{object_type}#{relation}' references unknown type '{referenced}'")]
    UnknownType {
        object_type: String,
        relation: String,
        referenced: String,
    },

    #[error("Relation '{object_type}#{relation}' references unknown relation '{referenced}'")]
    UnknownRelation {
        object_type: String,
        relation: String,
        referenced: String,
    },

    #[error("Relation '{object_type}#{relation}' references unknown condition '{condition}'")]
    UnknownCondition {
        object_type: String,
        relation: String,
        condition: String,
    },

    #[error("Relation '{object_type}#{relation}' has an empty subject set or union")]
    EmptyExpression {
        object_type: String,
        relation: String,
    },

    #[error("Invalid hierarchy in '{object_type}#{relation}': {message}")]
    InvalidHierarchy {
        object_type: String,
        relation: String,
        message: String,
    },

    #[error("Relations {relations:?} only reference each other and can never be satisfied")]
    UngroundedCycle { relations: Vec<String> },

    #[error("Invalid condition '{name}': {message}")]
    InvalidCondition { name: String, message: String },
}

/// Failures evaluating a single condition. The checker treats every variant as
/// "this tuple does not grant access" and keeps evaluating other branches.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    #[error("Condition not found: {0}")]
    NotFound(String),

    #[error("Condition '{condition}' is missing parameter '{parameter}'")]
    MissingParameter {
        condition: String,
        parameter: String,
    },

    #[error("Condition '{condition}' does not declare parameter '{parameter}'")]
    UnknownParameter {
        condition: String,
        parameter: String,
    },

    #[error("Condition '{condition}' parameter '{parameter}' expected {expected}")]
    TypeMismatch {
        condition: String,
        parameter: String,
        expected: String,
    },

    #[error("Condition '{condition}' failed to evaluate: {message}")]
    Evaluation { condition: String, message: String },

    #[error("Condition '{condition}' evaluated to a non-boolean value")]
    NonBoolean { condition: String },
}

impl ConditionError {
    /// True for the parameter family (missing, undeclared or mistyped values)
    pub fn is_parameter_error(&self) -> bool {
        matches!(
            self,
            ConditionError::MissingParameter { .. }
                | ConditionError::UnknownParameter { .. }
                | ConditionError::TypeMismatch { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum AuthzError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error("Object type not found: {0}")]
    UnknownObjectType(String),

    #[error("Relation '{relation}' is not defined on type '{object_type}'")]
    UnknownRelation {
        object_type: String,
        relation: String,
    },

    #[error("Invalid tuple: {0}")]
    InvalidTuple(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid permission entry: {0}")]
    InvalidPermissionEntry(String),

    #[error("Permission denied: {subject} lacks '{relation}' on {object}")]
    PermissionDenied {
        subject: String,
        relation: String,
        object: String,
    },

    #[error("Evaluation timed out after {0} ms")]
    Timeout(u64),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Classify for AuthzError {
    fn class(&self) -> ErrorClass {
        match self {
            AuthzError::UnknownObjectType(_)
            | AuthzError::UnknownRelation { .. }
            | AuthzError::InvalidTuple(_)
            | AuthzError::InvalidRequest(_)
            | AuthzError::InvalidPermissionEntry(_) => ErrorClass::BadRequest,
            AuthzError::PermissionDenied { .. } => ErrorClass::PermissionDenied,
            AuthzError::Timeout(_) => ErrorClass::Unavailable,
            // A condition error reaching a caller means the schema and the
            // registry disagree, which is a deployment fault.
            AuthzError::Schema(_)
            | AuthzError::Condition(_)
            | AuthzError::Repository(_)
            | AuthzError::Config(_)
            | AuthzError::Internal(_) => ErrorClass::Internal,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AuthzError::Schema(err) => match err {
                SchemaError::Parse { .. } => codes::schema::PARSE_FAILED,
                SchemaError::DuplicateType(_)
                | SchemaError::DuplicateRelation { .. }
                | SchemaError::DuplicateCondition(_) => codes::schema::DUPLICATE_DEFINITION,
                SchemaError::UnknownType { .. }
                | SchemaError::UnknownRelation { .. }
                | SchemaError::UnknownCondition { .. }
                | SchemaError::EmptyExpression { .. } => codes::schema::UNKNOWN_REFERENCE,
                SchemaError::InvalidHierarchy { .. } => codes::schema::INVALID_HIERARCHY,
                SchemaError::UngroundedCycle { .. } => codes::schema::UNGROUNDED_CYCLE,
                SchemaError::InvalidCondition { .. } => codes::schema::INVALID_CONDITION,
            },
            AuthzError::Condition(err) => match err {
                ConditionError::NotFound(_) => codes::condition::NOT_FOUND,
                ConditionError::Evaluation { .. } | ConditionError::NonBoolean { .. } => {
                    codes::condition::EVALUATION
                }
                _ => codes::condition::PARAMETER,
            },
            AuthzError::UnknownObjectType(_) => codes::request::UNKNOWN_OBJECT_TYPE,
            AuthzError::UnknownRelation { .. } => codes::request::UNKNOWN_RELATION,
            AuthzError::InvalidTuple(_) => codes::request::INVALID_TUPLE,
            AuthzError::InvalidRequest(_) => codes::request::INVALID_REQUEST,
            AuthzError::InvalidPermissionEntry(_) => codes::request::INVALID_PERMISSION_ENTRY,
            AuthzError::PermissionDenied { .. } => codes::authorization::ACCESS_DENIED,
            AuthzError::Timeout(_) => codes::store::TIMEOUT,
            AuthzError::Repository(_) => codes::store::READ_FAILED,
            AuthzError::Config(_) | AuthzError::Internal(_) => codes::store::INTERNAL,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthzError>;
