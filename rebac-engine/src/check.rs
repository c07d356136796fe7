use crate::{
    config::EngineConfig,
    error::{AuthzError, Result},
    models::*,
    repository::TupleRepository,
    schema::{CompiledSchema, RelationExpr, SubjectSpec},
};
use ahash::AHashSet;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of resolving one node.
///
/// `path_dependent` marks a negative answer that relied on a cycle or depth
/// cut-off somewhere below. Such answers are only valid for the current call
/// path and must not be memoized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Outcome {
    pub allowed: bool,
    pub path_dependent: bool,
}

impl Outcome {
    pub const GRANTED: Outcome = Outcome {
        allowed: true,
        path_dependent: false,
    };
    pub const DENIED: Outcome = Outcome {
        allowed: false,
        path_dependent: false,
    };
    pub const CUT_OFF: Outcome = Outcome {
        allowed: false,
        path_dependent: true,
    };
}

/// Nodes on the current call path. Extending copies the set so sibling
/// branches never see each other's entries.
#[derive(Debug, Clone, Default)]
pub(crate) struct VisitedPath(Arc<AHashSet<String>>);

impl VisitedPath {
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn with(&self, key: &str) -> Self {
        let mut visited = (*self.0).clone();
        visited.insert(key.to_string());
        Self(Arc::new(visited))
    }
}

/// State owned by a single top-level check and dropped with it
struct ResolutionState {
    context: RequestContext,
    signature: String,
    memo: DashMap<String, bool>,
    resolved: AtomicUsize,
}

impl ResolutionState {
    fn new(context: RequestContext) -> Self {
        Self {
            signature: context.signature(),
            context,
            memo: DashMap::new(),
            resolved: AtomicUsize::new(0),
        }
    }

    fn memo_key(&self, node: &str) -> String {
        format!("{}|{}", node, self.signature)
    }
}

fn node_key(object: &ObjectRef, relation: &str, subject: &SubjectRef) -> String {
    format!("{}#{}@{}", object, relation, subject)
}

/// Permission checker performs authorization checks with support for:
/// - Direct grants, optionally gated by a condition
/// - Computed relations (`view` implied by `edit`)
/// - Userset subjects (`team:7#member`)
/// - Inheritance through hierarchy relations (`read from parent`)
pub struct PermissionChecker {
    repository: Arc<dyn TupleRepository>,
    schema: Arc<CompiledSchema>,
    max_depth: u32,
}

impl PermissionChecker {
    pub fn new(
        repository: Arc<dyn TupleRepository>,
        schema: Arc<CompiledSchema>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            repository,
            schema,
            max_depth: config.max_depth,
        }
    }

    /// Check if the subject holds the relation on the object
    pub async fn check(&self, request: &CheckRequest) -> Result<bool> {
        Ok(self.resolve(request).await?.allowed)
    }

    /// Check and report how much of the graph was resolved
    pub async fn resolve(&self, request: &CheckRequest) -> Result<CheckResponse> {
        self.validate_request(request)?;

        let state = ResolutionState::new(request.context.clone());
        let outcome = self
            .check_relation(
                &state,
                request.object.clone(),
                request.relation.clone(),
                &request.subject,
                VisitedPath::default(),
                0,
            )
            .await?;

        let resolved_nodes = state.resolved.load(Ordering::Relaxed);
        debug!(
            "Check {} -> {} ({} nodes)",
            request, outcome.allowed, resolved_nodes
        );
        Ok(CheckResponse {
            allowed: outcome.allowed,
            resolved_nodes,
        })
    }

    fn validate_request(&self, request: &CheckRequest) -> Result<()> {
        if request.object.object_id.is_empty() || request.subject.subject_id.is_empty() {
            return Err(AuthzError::InvalidRequest(format!(
                "check '{}' has an empty identifier",
                request
            )));
        }

        self.schema
            .relation(&request.object.object_type, &request.relation)?;

        let subject_type = self.schema.object_type(&request.subject.subject_type)?;
        if let Some(ref relation) = request.subject.relation {
            if subject_type.relation(relation).is_none() {
                return Err(AuthzError::UnknownRelation {
                    object_type: request.subject.subject_type.clone(),
                    relation: relation.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_relation<'a>(
        &'a self,
        state: &'a ResolutionState,
        object: ObjectRef,
        relation: String,
        subject: &'a SubjectRef,
        path: VisitedPath,
        depth: u32,
    ) -> BoxFuture<'a, Result<Outcome>> {
        async move {
            let node = node_key(&object, &relation, subject);
            let memo_key = state.memo_key(&node);

            if let Some(allowed) = state.memo.get(&memo_key).map(|entry| *entry.value()) {
                return Ok(Outcome {
                    allowed,
                    path_dependent: false,
                });
            }

            if path.contains(&node) {
                debug!("Cycle at {}, resolving branch as false", node);
                return Ok(Outcome::CUT_OFF);
            }

            if depth >= self.max_depth {
                warn!(
                    "Depth limit {} reached at {}, resolving branch as false",
                    self.max_depth, node
                );
                return Ok(Outcome::CUT_OFF);
            }

            // A userset subject trivially holds its own relation
            if subject.relation.as_deref() == Some(relation.as_str())
                && subject.subject_type == object.object_type
                && subject.subject_id == object.object_id
            {
                return Ok(Outcome::GRANTED);
            }

            let expression = self.schema.relation(&object.object_type, &relation)?;
            state.resolved.fetch_add(1, Ordering::Relaxed);
            debug!("Checking: {} = {}", node, expression);

            let path = path.with(&node);
            let outcome = self
                .evaluate(state, &object, &relation, expression, subject, &path, depth)
                .await?;

            if outcome.allowed || !outcome.path_dependent {
                state.memo.insert(memo_key, outcome.allowed);
            }
            Ok(outcome)
        }
        .boxed()
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate<'a>(
        &'a self,
        state: &'a ResolutionState,
        object: &'a ObjectRef,
        relation: &'a str,
        expression: &'a RelationExpr,
        subject: &'a SubjectRef,
        path: &'a VisitedPath,
        depth: u32,
    ) -> BoxFuture<'a, Result<Outcome>> {
        async move {
            match expression {
                RelationExpr::Direct { subjects } => {
                    self.check_direct(state, object, relation, subjects, subject, path, depth)
                        .await
                }
                RelationExpr::Computed { relation: target } => {
                    self.check_relation(
                        state,
                        object.clone(),
                        target.clone(),
                        subject,
                        path.clone(),
                        depth + 1,
                    )
                    .await
                }
                RelationExpr::Union { children } => {
                    let mut path_dependent = false;
                    for child in children {
                        let outcome = self
                            .evaluate(state, object, relation, child, subject, path, depth)
                            .await?;
                        if outcome.allowed {
                            return Ok(Outcome::GRANTED);
                        }
                        path_dependent |= outcome.path_dependent;
                    }
                    Ok(Outcome {
                        allowed: false,
                        path_dependent,
                    })
                }
                RelationExpr::TupleToUserset { tupleset, computed } => {
                    self.check_tuple_to_userset(state, object, tupleset, computed, subject, path, depth)
                        .await
                }
            }
        }
        .boxed()
    }

    #[allow(clippy::too_many_arguments)]
    async fn check_direct(
        &self,
        state: &ResolutionState,
        object: &ObjectRef,
        relation: &str,
        specs: &[SubjectSpec],
        subject: &SubjectRef,
        path: &VisitedPath,
        depth: u32,
    ) -> Result<Outcome> {
        // 1. A tuple naming the subject itself
        if specs.iter().any(|spec| spec.subject_type == subject.subject_type) {
            let candidates = self
                .repository
                .read_tuples(
                    &TupleFilter::for_relation(object, relation)
                        .with_subject_type(&subject.subject_type),
                )
                .await?;

            for tuple in candidates.iter().filter(|tuple| tuple.subject == *subject) {
                if !specs.iter().any(|spec| spec.accepts(tuple)) {
                    debug!("Ignoring tuple {} not allowed by the schema", tuple);
                    continue;
                }
                if self.condition_holds(state, tuple) {
                    debug!("Direct grant found: {}", tuple);
                    return Ok(Outcome::GRANTED);
                }
            }
        }

        // 2. Usersets whose members may include the subject
        let userset_types: BTreeSet<&str> = specs
            .iter()
            .filter(|spec| spec.relation.is_some())
            .map(|spec| spec.subject_type.as_str())
            .collect();

        let mut path_dependent = false;
        for subject_type in userset_types {
            let usersets = self
                .repository
                .read_tuples(
                    &TupleFilter::for_relation(object, relation).with_subject_type(subject_type),
                )
                .await?;

            for tuple in usersets {
                let Some(ref userset_relation) = tuple.subject.relation else {
                    continue;
                };
                if !specs.iter().any(|spec| spec.accepts(&tuple)) {
                    continue;
                }
                if !self.condition_holds(state, &tuple) {
                    continue;
                }

                let outcome = self
                    .check_relation(
                        state,
                        tuple.subject.as_object(),
                        userset_relation.clone(),
                        subject,
                        path.clone(),
                        depth + 1,
                    )
                    .await?;
                if outcome.allowed {
                    debug!("Granted through userset {}", tuple.subject);
                    return Ok(Outcome::GRANTED);
                }
                path_dependent |= outcome.path_dependent;
            }
        }

        Ok(Outcome {
            allowed: false,
            path_dependent,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn check_tuple_to_userset(
        &self,
        state: &ResolutionState,
        object: &ObjectRef,
        tupleset: &str,
        computed: &str,
        subject: &SubjectRef,
        path: &VisitedPath,
        depth: u32,
    ) -> Result<Outcome> {
        let targets: Vec<ObjectRef> = self
            .repository
            .list_relation_tuples(object, tupleset)
            .await?
            .into_iter()
            .filter(|tuple| !tuple.subject.is_userset())
            .map(|tuple| tuple.subject.as_object())
            .collect();

        if targets.is_empty() {
            return Ok(Outcome::DENIED);
        }

        let mut pending: FuturesUnordered<_> = targets
            .into_iter()
            .map(|target| {
                self.check_relation(
                    state,
                    target,
                    computed.to_string(),
                    subject,
                    path.clone(),
                    depth + 1,
                )
            })
            .collect();

        let mut path_dependent = false;
        while let Some(result) = pending.next().await {
            let outcome = result?;
            if outcome.allowed {
                return Ok(Outcome::GRANTED);
            }
            path_dependent |= outcome.path_dependent;
        }

        Ok(Outcome {
            allowed: false,
            path_dependent,
        })
    }

    /// Conditions fail closed: any evaluation error denies this tuple only
    fn condition_holds(&self, state: &ResolutionState, tuple: &Tuple) -> bool {
        let Some(ref condition) = tuple.condition else {
            return true;
        };

        match self
            .schema
            .conditions()
            .evaluate(&condition.name, Some(&condition.context), &state.context)
        {
            Ok(result) => result,
            Err(err) => {
                warn!("Condition on {} failed, treating as false: {}", tuple, err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryTupleRepository;

    fn checker(repo: Arc<InMemoryTupleRepository>) -> PermissionChecker {
        let schema = Arc::new(CompiledSchema::dashboard().unwrap());
        PermissionChecker::new(repo, schema, &EngineConfig::default())
    }

    #[tokio::test]
    async fn test_direct_permission() {
        let repo = Arc::new(InMemoryTupleRepository::new());
        let checker = checker(repo.clone());

        let alice = SubjectRef::user("alice");
        let n1 = ObjectRef::new("namespace", "n1");
        let request = CheckRequest::new(n1.clone(), "admin", alice.clone());

        // No permission initially
        assert!(!checker.check(&request).await.unwrap());

        // Grant permission
        repo.write_tuple(Tuple::new(n1, "admin", alice)).await.unwrap();

        // Now has permission
        assert!(checker.check(&request).await.unwrap());
    }

    #[tokio::test]
    async fn test_computed_permission() {
        let repo = Arc::new(InMemoryTupleRepository::new());
        let checker = checker(repo.clone());

        let alice = SubjectRef::user("alice");
        let n1 = ObjectRef::new("namespace", "n1");
        repo.write_tuple(Tuple::new(n1.clone(), "edit", alice.clone()))
            .await
            .unwrap();

        // edit implies view and read, but not admin
        for relation in ["edit", "view", "read", "create", "write", "delete"] {
            let request = CheckRequest::new(n1.clone(), relation, alice.clone());
            assert!(checker.check(&request).await.unwrap(), "{}", relation);
        }
        let admin = CheckRequest::new(n1, "admin", alice);
        assert!(!checker.check(&admin).await.unwrap());
    }

    #[tokio::test]
    async fn test_team_and_role_usersets() {
        let n1 = ObjectRef::new("namespace", "n1");
        let repo = Arc::new(InMemoryTupleRepository::with_tuples(vec![
            Tuple::new(n1.clone(), "view", SubjectRef::team_members("t1")),
            Tuple::new(n1.clone(), "edit", SubjectRef::role_assignees("editor")),
            Tuple::new(ObjectRef::new("team", "t1"), "member", SubjectRef::user("bob")),
            Tuple::new(ObjectRef::new("team", "t2"), "admin", SubjectRef::user("carol")),
            Tuple::new(ObjectRef::new("role", "editor"), "assignee", SubjectRef::team_members("t2")),
        ]));
        let checker = checker(repo);

        let bob_view = CheckRequest::new(n1.clone(), "view", SubjectRef::user("bob"));
        assert!(checker.check(&bob_view).await.unwrap());
        let bob_edit = CheckRequest::new(n1.clone(), "edit", SubjectRef::user("bob"));
        assert!(!checker.check(&bob_edit).await.unwrap());

        // carol is a team admin, so a member, so a role assignee, so an editor
        let carol_edit = CheckRequest::new(n1.clone(), "edit", SubjectRef::user("carol"));
        assert!(checker.check(&carol_edit).await.unwrap());

        // The userset itself holds the relation it was granted
        let team_view = CheckRequest::new(n1, "view", SubjectRef::team_members("t1"));
        assert!(checker.check(&team_view).await.unwrap());
    }

    #[tokio::test]
    async fn test_hierarchy_inheritance() {
        let root = ObjectRef::new("folder2", "root");
        let child = ObjectRef::new("folder2", "child");
        let repo = Arc::new(InMemoryTupleRepository::with_tuples(vec![
            Tuple::new(child.clone(), "parent", SubjectRef::new("folder2", "root")),
            Tuple::new(root.clone(), "read", SubjectRef::user("alice")),
        ]));
        let checker = checker(repo);

        let inherited = CheckRequest::new(child, "read", SubjectRef::user("alice"));
        assert!(checker.check(&inherited).await.unwrap());

        let unrelated = CheckRequest::new(root, "view", SubjectRef::user("alice"));
        assert!(!checker.check(&unrelated).await.unwrap());
    }

    #[tokio::test]
    async fn test_parent_cycle_terminates() {
        let a = ObjectRef::new("folder2", "a");
        let b = ObjectRef::new("folder2", "b");
        let repo = Arc::new(InMemoryTupleRepository::with_tuples(vec![
            Tuple::new(a.clone(), "parent", SubjectRef::new("folder2", "b")),
            Tuple::new(b.clone(), "parent", SubjectRef::new("folder2", "a")),
        ]));
        let checker = checker(repo.clone());

        let request = CheckRequest::new(a.clone(), "read", SubjectRef::user("alice"));
        assert!(!checker.check(&request).await.unwrap());

        // Granting on either side of the loop is seen from the other
        repo.write_tuple(Tuple::new(b, "admin", SubjectRef::user("alice")))
            .await
            .unwrap();
        assert!(checker.check(&request).await.unwrap());
    }

    #[tokio::test]
    async fn test_condition_gating() {
        let r1 = ObjectRef::new("resource", "r1");
        let repo = Arc::new(InMemoryTupleRepository::with_tuples(vec![Tuple::new(
            r1.clone(),
            "view",
            SubjectRef::user("u1"),
        )
        .with_condition(
            TupleCondition::new("group_filter").with_value("resource_group", "teamA"),
        )]));
        let checker = checker(repo);

        let matching = CheckRequest::new(r1.clone(), "view", SubjectRef::user("u1"))
            .with_context(RequestContext::new().with_value("requested_group", "teamA"));
        assert!(checker.check(&matching).await.unwrap());

        let other = CheckRequest::new(r1.clone(), "view", SubjectRef::user("u1"))
            .with_context(RequestContext::new().with_value("requested_group", "teamB"));
        assert!(!checker.check(&other).await.unwrap());

        // Missing context fails closed instead of erroring
        let missing = CheckRequest::new(r1, "view", SubjectRef::user("u1"));
        assert!(!checker.check(&missing).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_relation_rejected() {
        let checker = checker(Arc::new(InMemoryTupleRepository::new()));

        let request = CheckRequest::new(
            ObjectRef::new("namespace", "n1"),
            "share",
            SubjectRef::user("alice"),
        );
        assert!(matches!(
            checker.check(&request).await,
            Err(AuthzError::UnknownRelation { .. })
        ));

        let request = CheckRequest::new(
            ObjectRef::new("widget", "w1"),
            "view",
            SubjectRef::user("alice"),
        );
        assert!(matches!(
            checker.check(&request).await,
            Err(AuthzError::UnknownObjectType(_))
        ));
    }

    #[tokio::test]
    async fn test_depth_limit_denies() {
        let repo = Arc::new(InMemoryTupleRepository::with_tuples(vec![
            Tuple::new(ObjectRef::new("folder2", "f1"), "parent", SubjectRef::new("folder2", "f2")),
            Tuple::new(ObjectRef::new("folder2", "f2"), "parent", SubjectRef::new("folder2", "f3")),
            Tuple::new(ObjectRef::new("folder2", "f3"), "admin", SubjectRef::user("alice")),
        ]));
        let schema = Arc::new(CompiledSchema::dashboard().unwrap());
        let request = CheckRequest::new(
            ObjectRef::new("folder2", "f1"),
            "admin",
            SubjectRef::user("alice"),
        );

        let shallow = PermissionChecker::new(
            repo.clone(),
            schema.clone(),
            &EngineConfig {
                max_depth: 2,
                ..EngineConfig::default()
            },
        );
        assert!(!shallow.check(&request).await.unwrap());

        let deep = PermissionChecker::new(repo, schema, &EngineConfig::default());
        let response = deep.resolve(&request).await.unwrap();
        assert!(response.allowed);
        assert!(response.resolved_nodes >= 3);
    }

    #[tokio::test]
    async fn test_cut_off_denial_is_not_memoized() {
        // Reached through `d`, node `b` sits right at the depth limit and is
        // cut off. Reached directly from `view` it is shallow enough to grant.
        let schema = CompiledSchema::from_dsl(
            r#"
type user
type doc
  relations
    define owner: [user]
    define a: owner
    define b: a
    define c: b
    define d: c
    define view: d or b
"#,
        )
        .unwrap();
        let repo = Arc::new(InMemoryTupleRepository::with_tuples(vec![Tuple::new(
            ObjectRef::new("doc", "d"),
            "owner",
            SubjectRef::user("u"),
        )]));
        let checker = PermissionChecker::new(
            repo,
            Arc::new(schema),
            &EngineConfig {
                max_depth: 4,
                ..EngineConfig::default()
            },
        );

        let view = CheckRequest::new(ObjectRef::new("doc", "d"), "view", SubjectRef::user("u"));
        assert!(
            checker.check(&view).await.unwrap(),
            "a cut-off denial of b must not be reused for the shallow branch"
        );

        // On its own, `d` needs more hops than the limit allows
        let through_d = CheckRequest::new(ObjectRef::new("doc", "d"), "d", SubjectRef::user("u"));
        assert!(!checker.check(&through_d).await.unwrap());
    }

    #[test]
    fn test_visited_path_is_per_branch() {
        let root = VisitedPath::default().with("a");
        let left = root.with("b");
        let right = root.with("c");

        assert!(left.contains("a") && left.contains("b"));
        assert!(!left.contains("c"));
        assert!(!right.contains("b"));
        assert!(!root.contains("b"));
    }
}
