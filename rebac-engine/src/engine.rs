use crate::{
    check::PermissionChecker,
    config::EngineConfig,
    error::{AuthzError, Result},
    expand::SubjectExpander,
    models::*,
    repository::TupleRepository,
    schema::CompiledSchema,
};
use error_common::log_error;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Relationship-based authorization engine
pub struct AuthorizationEngine {
    /// Storage for relationship tuples
    repository: Arc<dyn TupleRepository>,

    /// Compiled schema shared by every evaluation
    schema: Arc<CompiledSchema>,

    /// Permission checker for authorization queries
    checker: Arc<PermissionChecker>,

    /// Subject expander for listing subjects
    expander: Arc<SubjectExpander>,

    config: EngineConfig,
}

impl AuthorizationEngine {
    /// Create an engine over a repository and a compiled schema
    pub fn new(
        repository: Arc<dyn TupleRepository>,
        schema: Arc<CompiledSchema>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let checker = Arc::new(PermissionChecker::new(
            repository.clone(),
            schema.clone(),
            &config,
        ));
        let expander = Arc::new(SubjectExpander::new(
            repository.clone(),
            schema.clone(),
            &config,
        ));

        Ok(Self {
            repository,
            schema,
            checker,
            expander,
            config,
        })
    }

    /// Engine over the built-in dashboard schema
    pub fn dashboard(repository: Arc<dyn TupleRepository>, config: EngineConfig) -> Result<Self> {
        let schema = Arc::new(CompiledSchema::dashboard()?);
        Self::new(repository, schema, config)
    }

    // =============================================================================
    // Core Authorization Operations
    // =============================================================================

    /// Check if a subject holds a relation on an object
    pub async fn check(
        &self,
        object: &ObjectRef,
        relation: &str,
        subject: &SubjectRef,
    ) -> Result<bool> {
        self.check_with_context(object, relation, subject, &RequestContext::default())
            .await
    }

    /// Check with request-supplied condition values
    pub async fn check_with_context(
        &self,
        object: &ObjectRef,
        relation: &str,
        subject: &SubjectRef,
        context: &RequestContext,
    ) -> Result<bool> {
        let request = CheckRequest::new(object.clone(), relation, subject.clone())
            .with_context(context.clone());
        Ok(self.check_request(&request).await?.allowed)
    }

    /// Full check under the configured deadline. A timed-out check is
    /// abandoned along with everything it memoized.
    #[instrument(skip(self, request), fields(check = %request))]
    pub async fn check_request(&self, request: &CheckRequest) -> Result<CheckResponse> {
        let result = match self.config.check_timeout() {
            Some(deadline) => tokio::time::timeout(deadline, self.checker.resolve(request))
                .await
                .unwrap_or_else(|_| {
                    warn!("Check {} exceeded {} ms", request, self.config.check_timeout_ms);
                    Err(AuthzError::Timeout(self.config.check_timeout_ms))
                }),
            None => self.checker.resolve(request).await,
        };
        let response = result.inspect_err(|err| log_error("check", err))?;

        debug!("Check {} allowed={}", request, response.allowed);
        Ok(response)
    }

    /// Evaluate independent checks concurrently. Each item fails on its own.
    pub async fn batch_check(&self, requests: Vec<CheckRequest>) -> Vec<Result<CheckResponse>> {
        join_all(requests.iter().map(|request| self.check_request(request))).await
    }

    /// Like `check_request`, but a denial is returned as `PermissionDenied`
    pub async fn ensure_allowed(&self, request: &CheckRequest) -> Result<()> {
        if self.check_request(request).await?.allowed {
            return Ok(());
        }
        Err(AuthzError::PermissionDenied {
            subject: request.subject.to_string(),
            relation: request.relation.clone(),
            object: request.object.to_string(),
        })
    }

    // =============================================================================
    // Permission Expansion
    // =============================================================================

    /// Every subject holding a relation on an object
    pub async fn expand(&self, object: &ObjectRef, relation: &str) -> Result<BTreeSet<SubjectRef>> {
        self.expand_with_context(object, relation, &RequestContext::default())
            .await
    }

    #[instrument(skip(self, object, context), fields(object = %object))]
    pub async fn expand_with_context(
        &self,
        object: &ObjectRef,
        relation: &str,
        context: &RequestContext,
    ) -> Result<BTreeSet<SubjectRef>> {
        self.expander.expand(object, relation, context).await
    }

    /// Structured expansion, for debugging why a subject holds a relation
    pub async fn expand_tree(&self, request: &ExpandRequest) -> Result<SubjectTree> {
        self.expander
            .expand_tree(&request.object, &request.relation, &request.context)
            .await
    }

    // =============================================================================
    // Tuple Management
    // =============================================================================

    /// Write a relationship tuple
    pub async fn write_tuple(&self, tuple: Tuple) -> Result<()> {
        info!("Writing tuple: {}", tuple);

        // Validate tuple against schema
        self.schema.validate_tuple(&tuple)?;

        self.repository.write_tuple(tuple).await
    }

    /// Delete a relationship tuple
    pub async fn delete_tuple(&self, tuple: Tuple) -> Result<()> {
        info!("Deleting tuple: {}", tuple);

        self.repository.delete_tuple(tuple).await
    }

    /// Batch write: every write is validated before anything is applied
    pub async fn batch_write(&self, request: WriteRequest) -> Result<()> {
        for tuple in &request.writes {
            self.schema.validate_tuple(tuple)?;
        }

        info!(
            "Batch write: {} writes, {} deletes",
            request.writes.len(),
            request.deletes.len()
        );
        self.repository.batch_write(request).await
    }

    /// Read tuples matching a filter
    pub async fn read_tuples(&self, filter: &TupleFilter) -> Result<Vec<Tuple>> {
        self.repository.read_tuples(filter).await
    }

    // =============================================================================
    // Schema and Configuration
    // =============================================================================

    pub fn schema(&self) -> Arc<CompiledSchema> {
        self.schema.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
