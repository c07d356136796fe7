//! Access-control list management for dashboards, folders and namespaces.
//!
//! This is the consumer-facing side of the engine: listing who holds a managed
//! permission on an object and replacing that list. Reading the list requires
//! `permissions_read` on the object and replacing it requires
//! `permissions_write`. Configured hidden subjects never appear in a listing
//! and survive every update untouched.

use crate::{
    engine::AuthorizationEngine,
    error::{AuthzError, Result},
    models::*,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Permission levels an ACL entry can grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    View,
    Edit,
    Admin,
}

impl Permission {
    pub const ALL: [Permission; 3] = [Permission::View, Permission::Edit, Permission::Admin];

    /// The schema relation this permission is stored as
    pub fn relation(&self) -> &'static str {
        match self {
            Permission::View => "view",
            Permission::Edit => "edit",
            Permission::Admin => "admin",
        }
    }

    fn from_relation(relation: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|permission| permission.relation() == relation)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.relation())
    }
}

impl FromStr for Permission {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self> {
        Self::from_relation(&value.to_ascii_lowercase()).ok_or_else(|| {
            AuthzError::InvalidPermissionEntry(format!(
                "unknown permission '{}', expected one of view, edit, admin",
                value
            ))
        })
    }
}

/// One ACL item. Exactly one of `user_id`, `team_id` and `role` names the
/// grantee.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub permission: Permission,
}

impl PermissionEntry {
    pub fn user(user_id: &str, permission: Permission) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            team_id: None,
            role: None,
            permission,
        }
    }

    pub fn team(team_id: &str, permission: Permission) -> Self {
        Self {
            user_id: None,
            team_id: Some(team_id.to_string()),
            role: None,
            permission,
        }
    }

    pub fn role(role: &str, permission: Permission) -> Self {
        Self {
            user_id: None,
            team_id: None,
            role: Some(role.to_string()),
            permission,
        }
    }

    /// The subject this entry grants to
    pub fn subject(&self) -> Result<SubjectRef> {
        let subject = match (&self.user_id, &self.team_id, &self.role) {
            (Some(user_id), None, None) => SubjectRef::user(user_id),
            (None, Some(team_id), None) => SubjectRef::team_members(team_id),
            (None, None, Some(role)) => SubjectRef::role_assignees(role),
            (None, None, None) => {
                return Err(AuthzError::InvalidPermissionEntry(
                    "entry must name a user, a team or a role".to_string(),
                ))
            }
            _ => {
                return Err(AuthzError::InvalidPermissionEntry(
                    "entry may name only one of user, team and role".to_string(),
                ))
            }
        };

        if subject.subject_id.is_empty() {
            return Err(AuthzError::InvalidPermissionEntry(
                "entry has an empty grantee".to_string(),
            ));
        }
        Ok(subject)
    }

    /// The tuple storing this grant on an object
    pub fn to_tuple(&self, object: &ObjectRef) -> Result<Tuple> {
        Ok(Tuple::new(
            object.clone(),
            self.permission.relation(),
            self.subject()?,
        ))
    }

    /// Reverse of `to_tuple` for the subject shapes ACL entries can express
    fn from_tuple(tuple: &Tuple) -> Option<Self> {
        let permission = Permission::from_relation(&tuple.relation)?;
        let subject = &tuple.subject;
        match (subject.subject_type.as_str(), subject.relation.as_deref()) {
            ("user", None) => Some(Self::user(&subject.subject_id, permission)),
            ("team", Some("member")) => Some(Self::team(&subject.subject_id, permission)),
            ("role", Some("assignee")) => Some(Self::role(&subject.subject_id, permission)),
            _ => None,
        }
    }
}

/// Lists and replaces the managed grants on an object
pub struct AclService {
    engine: Arc<AuthorizationEngine>,
}

impl AclService {
    pub fn new(engine: Arc<AuthorizationEngine>) -> Self {
        Self { engine }
    }

    /// Direct managed grants on the object, without hidden subjects
    pub async fn list(&self, object: &ObjectRef, caller: &SubjectRef) -> Result<Vec<PermissionEntry>> {
        self.engine
            .ensure_allowed(&CheckRequest::new(object.clone(), "permissions_read", caller.clone()))
            .await?;

        let config = self.engine.config();
        let mut entries: Vec<PermissionEntry> = self
            .managed_tuples(object)
            .await?
            .iter()
            .filter(|tuple| !config.is_hidden(&tuple.subject))
            .filter_map(PermissionEntry::from_tuple)
            .collect();
        entries.sort();
        Ok(entries)
    }

    /// Replace the managed grants on the object. Every entry is validated
    /// before anything is written.
    pub async fn update(
        &self,
        object: &ObjectRef,
        caller: &SubjectRef,
        entries: Vec<PermissionEntry>,
    ) -> Result<()> {
        self.engine
            .ensure_allowed(&CheckRequest::new(object.clone(), "permissions_write", caller.clone()))
            .await?;

        let writes = entries
            .iter()
            .map(|entry| entry.to_tuple(object))
            .collect::<Result<Vec<_>>>()?;

        let config = self.engine.config();
        let deletes: Vec<Tuple> = self
            .managed_tuples(object)
            .await?
            .into_iter()
            .filter(|tuple| !config.is_hidden(&tuple.subject))
            .collect();

        info!(
            "Updating ACL on {}: {} grants replace {}",
            object,
            writes.len(),
            deletes.len()
        );
        self.engine
            .batch_write(WriteRequest { writes, deletes })
            .await
    }

    async fn managed_tuples(&self, object: &ObjectRef) -> Result<Vec<Tuple>> {
        Ok(self
            .engine
            .read_tuples(&TupleFilter::for_object(object))
            .await?
            .into_iter()
            .filter(|tuple| Permission::from_relation(&tuple.relation).is_some())
            .collect())
    }
}
