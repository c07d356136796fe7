//! Relationship-based authorization engine
//!
//! This crate answers "may subject S exercise relation R on object O?" by
//! walking a compiled schema against stored relationship tuples:
//! - Typed schema with direct grants, computed relations, unions and
//!   inheritance through hierarchy relations (`read from parent`)
//! - Userset subjects such as "members of team 7" or "assignees of role Editor"
//! - Conditional grants gated by CEL predicates over stored and request values
//! - Cycle-safe, memoized checks and subject expansion for ACL listings
//!
//! # Core Concepts
//!
//! - **Object**: A protected resource, written `type:id` (`dashboard:d1`)
//! - **Subject**: A principal (`user:42`) or a userset (`team:7#member`)
//! - **Relation**: A named capability on an object type (`view`, `edit`, `admin`)
//! - **Tuple**: A stored fact: "subject has relation on object"
//!
//! # Example
//!
//! ```rust
//! use rebac_engine::{
//!     AuthorizationEngine, EngineConfig, InMemoryTupleRepository, ObjectRef, SubjectRef, Tuple,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = Arc::new(InMemoryTupleRepository::new());
//!     let engine = AuthorizationEngine::dashboard(repo, EngineConfig::default())?;
//!
//!     let n1 = ObjectRef::new("namespace", "n1");
//!     let alice = SubjectRef::user("alice");
//!
//!     // Admins can also edit and view
//!     engine.write_tuple(Tuple::new(n1.clone(), "admin", alice.clone())).await?;
//!
//!     assert!(engine.check(&n1, "view", &alice).await?);
//!     Ok(())
//! }
//! ```

pub mod acl;
pub mod check;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod expand;
pub mod models;
pub mod repository;
pub mod schema;

pub use acl::{AclService, Permission, PermissionEntry};
pub use condition::{ConditionRegistry, ParamType};
pub use config::EngineConfig;
pub use engine::*;
pub use error::*;
pub use models::*;
pub use repository::{InMemoryTupleRepository, TupleRepository};
pub use schema::{CompiledSchema, RelationExpr, SchemaDefinition, SubjectSpec};
