//! Action registry and executor

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::actions::schema::ParamSchema;
use crate::actions::types::{ActionContext, ActionError, ActionHandler, ActionResult, Params};
use crate::config::ActionsConfig;

struct RegisteredAction {
    handler: Arc<dyn ActionHandler>,
    schema: ParamSchema,
    timeout: Option<Duration>,
}

/// Catalog entry used to describe actions to the model
#[derive(Debug, Clone, Serialize)]
pub struct ActionDescriptor {
    pub name: String,
    pub description: String,
    pub schema: ParamSchema,
}

/// Registry of named action handlers
#[derive(Clone)]
pub struct ActionRegistry {
    actions: Arc<DashMap<String, Arc<RegisteredAction>>>,
    default_timeout: Duration,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl ActionRegistry {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            actions: Arc::new(DashMap::new()),
            default_timeout,
        }
    }

    pub fn from_config(config: &ActionsConfig) -> Self {
        Self::new(Duration::from_secs(config.default_timeout_secs))
    }

    /// Register a handler under `name` with the default timeout
    ///
    /// Fails with [`ActionError::Duplicate`] if the name is taken; the
    /// existing registration is left untouched.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
        schema: ParamSchema,
    ) -> Result<(), ActionError> {
        self.insert(name.into(), handler, schema, None)
    }

    /// Register a handler with its own timeout
    pub fn register_with_timeout(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
        schema: ParamSchema,
        timeout: Duration,
    ) -> Result<(), ActionError> {
        self.insert(name.into(), handler, schema, Some(timeout))
    }

    fn insert(
        &self,
        name: String,
        handler: Arc<dyn ActionHandler>,
        schema: ParamSchema,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError> {
        match self.actions.entry(name) {
            Entry::Occupied(entry) => Err(ActionError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => {
                info!(action = %entry.key(), "Registering action");
                entry.insert(Arc::new(RegisteredAction {
                    handler,
                    schema,
                    timeout,
                }));
                Ok(())
            }
        }
    }

    /// Remove an action; returns whether it was registered
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.actions.remove(name).is_some();
        if removed {
            info!(action = %name, "Unregistered action");
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Catalog of every action, sorted by name
    pub fn describe(&self) -> Vec<ActionDescriptor> {
        let mut catalog: Vec<ActionDescriptor> = self
            .actions
            .iter()
            .map(|e| ActionDescriptor {
                name: e.key().clone(),
                description: e.value().handler.description().to_string(),
                schema: e.value().schema.clone(),
            })
            .collect();
        catalog.sort_by(|a, b| a.name.cmp(&b.name));
        catalog
    }

    /// Resolve, validate and run one action
    ///
    /// Always returns a result: unknown names, invalid parameters, handler
    /// errors, panics and timeouts all become failed results. The handler
    /// runs in its own task so a panic stays contained, and is aborted when
    /// the timeout elapses.
    #[tracing::instrument(skip(self, params, ctx), fields(cycle = ctx.cycle))]
    pub async fn execute(&self, name: &str, params: Params, ctx: &ActionContext) -> ActionResult {
        let started = Instant::now();
        let elapsed_ms = || u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        // Clone out of the map so no shard lock is held across an await
        let Some(action) = self.actions.get(name).map(|e| Arc::clone(e.value())) else {
            warn!(action = %name, "Unknown action");
            return ActionResult::failed(ActionError::UnknownAction(name.to_string()), elapsed_ms());
        };

        if let Err(reason) = action.schema.validate(&params) {
            warn!(action = %name, %reason, "Invalid action parameters");
            return ActionResult::failed(
                ActionError::InvalidParams {
                    action: name.to_string(),
                    reason,
                },
                elapsed_ms(),
            );
        }

        let limit = action.timeout.unwrap_or(self.default_timeout);
        debug!(action = %name, timeout = ?limit, "Invoking action");

        let handler = Arc::clone(&action.handler);
        let task_ctx = ctx.clone();
        let mut task = tokio::spawn(async move { handler.call(params, task_ctx).await });

        let result = match timeout(limit, &mut task).await {
            Ok(Ok(Ok(output))) => ActionResult::ok(output, elapsed_ms()),
            Ok(Ok(Err(error))) => ActionResult::failed(error, elapsed_ms()),
            Ok(Err(join_error)) if join_error.is_panic() => {
                ActionResult::failed(ActionError::Panicked(name.to_string()), elapsed_ms())
            }
            Ok(Err(join_error)) => {
                ActionResult::failed(ActionError::Failed(join_error.to_string()), elapsed_ms())
            }
            Err(_) => {
                task.abort();
                ActionResult::failed(
                    ActionError::Timeout {
                        action: name.to_string(),
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    },
                    elapsed_ms(),
                )
            }
        };

        match &result.error {
            None => debug!(action = %name, duration_ms = result.duration_ms, "Action completed"),
            Some(error) => warn!(action = %name, error = %error, "Action failed"),
        }
        result
    }
}
