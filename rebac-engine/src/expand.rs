use crate::{
    check::VisitedPath,
    config::EngineConfig,
    error::{AuthzError, Result},
    models::*,
    repository::TupleRepository,
    schema::{CompiledSchema, RelationExpr, SubjectSpec},
};
use dashmap::DashSet;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// State shared by every branch of one expansion
struct ExpansionState<'a> {
    context: &'a RequestContext,
    root: String,
    seen: DashSet<SubjectRef>,
    max_subjects: usize,
}

impl<'a> ExpansionState<'a> {
    fn new(
        context: &'a RequestContext,
        object: &ObjectRef,
        relation: &str,
        max_subjects: usize,
    ) -> Self {
        Self {
            context,
            root: format!("{}#{}", object, relation),
            seen: DashSet::new(),
            max_subjects,
        }
    }

    /// Count a concrete subject, failing as soon as the distinct total
    /// passes the limit
    fn admit(&self, subject: &SubjectRef) -> Result<()> {
        self.seen.insert(subject.clone());
        if self.seen.len() > self.max_subjects {
            return Err(AuthzError::InvalidRequest(format!(
                "expansion of {} yields more than {} subjects",
                self.root, self.max_subjects
            )));
        }
        Ok(())
    }
}

/// Subject expander finds all subjects with a given relation to an object.
///
/// Expansion walks the same relation expressions as the checker, but collects
/// every subject instead of testing one.
pub struct SubjectExpander {
    repository: Arc<dyn TupleRepository>,
    schema: Arc<CompiledSchema>,
    max_depth: u32,
    max_subjects: usize,
}

impl SubjectExpander {
    pub fn new(
        repository: Arc<dyn TupleRepository>,
        schema: Arc<CompiledSchema>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            repository,
            schema,
            max_depth: config.max_depth,
            max_subjects: config.expand_max_subjects,
        }
    }

    /// Every concrete subject holding the relation, deduplicated
    pub async fn expand(
        &self,
        object: &ObjectRef,
        relation: &str,
        context: &RequestContext,
    ) -> Result<BTreeSet<SubjectRef>> {
        let tree = self.expand_tree(object, relation, context).await?;

        let mut subjects = BTreeSet::new();
        if collect_subjects(&tree, &mut subjects) {
            warn!(
                "Expansion of {}#{} hit the depth limit, listing may be incomplete",
                object, relation
            );
        }

        debug!("Expanded {}#{} to {} subjects", object, relation, subjects.len());
        Ok(subjects)
    }

    /// Structured expansion mirroring the relation expressions
    pub async fn expand_tree(
        &self,
        object: &ObjectRef,
        relation: &str,
        context: &RequestContext,
    ) -> Result<SubjectTree> {
        self.schema.relation(&object.object_type, relation)?;
        let state = ExpansionState::new(context, object, relation, self.max_subjects);
        self.expand_relation(
            &state,
            object.clone(),
            relation.to_string(),
            VisitedPath::default(),
            0,
        )
        .await
    }

    fn expand_relation<'a>(
        &'a self,
        state: &'a ExpansionState<'a>,
        object: ObjectRef,
        relation: String,
        path: VisitedPath,
        depth: u32,
    ) -> BoxFuture<'a, Result<SubjectTree>> {
        async move {
            let node = format!("{}#{}", object, relation);
            if path.contains(&node) {
                debug!("Cycle at {}, not expanding again", node);
                return Ok(SubjectTree::Cycle { object, relation });
            }

            if depth >= self.max_depth {
                warn!("Depth limit {} reached expanding {}", self.max_depth, node);
                return Ok(SubjectTree::Truncated { object, relation });
            }

            debug!("Expanding: {}", node);
            let expression = self.schema.relation(&object.object_type, &relation)?;
            let path = path.with(&node);
            self.expand_expression(state, &object, &relation, expression, &path, depth)
                .await
        }
        .boxed()
    }

    fn expand_expression<'a>(
        &'a self,
        state: &'a ExpansionState<'a>,
        object: &'a ObjectRef,
        relation: &'a str,
        expression: &'a RelationExpr,
        path: &'a VisitedPath,
        depth: u32,
    ) -> BoxFuture<'a, Result<SubjectTree>> {
        async move {
            match expression {
                RelationExpr::Direct { subjects } => {
                    self.expand_direct(state, object, relation, subjects, path, depth)
                        .await
                }
                RelationExpr::Computed { relation: target } => {
                    self.expand_relation(state, object.clone(), target.clone(), path.clone(), depth + 1)
                        .await
                }
                RelationExpr::Union { children } => {
                    let mut expanded = Vec::with_capacity(children.len());
                    for child in children {
                        expanded.push(
                            self.expand_expression(state, object, relation, child, path, depth)
                                .await?,
                        );
                    }
                    Ok(SubjectTree::Union {
                        object: object.clone(),
                        relation: relation.to_string(),
                        children: expanded,
                    })
                }
                RelationExpr::TupleToUserset { tupleset, computed } => {
                    let parents = self
                        .repository
                        .list_relation_tuples(object, tupleset)
                        .await?
                        .into_iter()
                        .filter(|tuple| !tuple.subject.is_userset())
                        .map(|tuple| {
                            self.expand_relation(
                                state,
                                tuple.subject.as_object(),
                                computed.clone(),
                                path.clone(),
                                depth + 1,
                            )
                        });

                    Ok(SubjectTree::TupleToUserset {
                        object: object.clone(),
                        tupleset: tupleset.clone(),
                        children: try_join_all(parents).await?,
                    })
                }
            }
        }
        .boxed()
    }

    async fn expand_direct(
        &self,
        state: &ExpansionState<'_>,
        object: &ObjectRef,
        relation: &str,
        specs: &[SubjectSpec],
        path: &VisitedPath,
        depth: u32,
    ) -> Result<SubjectTree> {
        let tuples = self.repository.list_relation_tuples(object, relation).await?;

        let mut subjects = Vec::new();
        let mut usersets = Vec::new();
        for tuple in tuples {
            if !specs.iter().any(|spec| spec.accepts(&tuple)) {
                debug!("Ignoring tuple {} not allowed by the schema", tuple);
                continue;
            }
            if !self.condition_holds(state.context, &tuple) {
                continue;
            }

            match tuple.subject.relation {
                Some(ref userset_relation) => {
                    let expanded = self
                        .expand_relation(
                            state,
                            tuple.subject.as_object(),
                            userset_relation.clone(),
                            path.clone(),
                            depth + 1,
                        )
                        .await?;
                    usersets.push(expanded);
                }
                None => {
                    state.admit(&tuple.subject)?;
                    subjects.push(tuple.subject);
                }
            }
        }
        subjects.sort();

        Ok(SubjectTree::Leaf {
            object: object.clone(),
            relation: relation.to_string(),
            subjects,
            usersets,
        })
    }

    fn condition_holds(&self, context: &RequestContext, tuple: &Tuple) -> bool {
        let Some(ref condition) = tuple.condition else {
            return true;
        };

        match self
            .schema
            .conditions()
            .evaluate(&condition.name, Some(&condition.context), context)
        {
            Ok(result) => result,
            Err(err) => {
                debug!("Skipping {} during expansion: {}", tuple, err);
                false
            }
        }
    }
}

/// Gather concrete subjects; true if any branch was truncated
fn collect_subjects(tree: &SubjectTree, out: &mut BTreeSet<SubjectRef>) -> bool {
    match tree {
        SubjectTree::Leaf {
            subjects, usersets, ..
        } => {
            out.extend(subjects.iter().cloned());
            usersets
                .iter()
                .fold(false, |truncated, userset| collect_subjects(userset, out) | truncated)
        }
        SubjectTree::Union { children, .. } | SubjectTree::TupleToUserset { children, .. } => {
            children
                .iter()
                .fold(false, |truncated, child| collect_subjects(child, out) | truncated)
        }
        SubjectTree::Cycle { .. } => false,
        SubjectTree::Truncated { .. } => true,
    }
}
