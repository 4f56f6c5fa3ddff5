//! Controller registry: the single source of truth for which actions exist.
//!
//! Page controllers register their actions here. Every execution runs the
//! same pipeline: lookup, parameter validation, authorization, approval
//! gating, timed execution, metadata stamping and auditing.

use platform_core::config::{DiscoveryConfig, RegistryConfig};
use platform_core::events::{ActionEvent, ActionEventKind};
use platform_core::types::{ActionContext, Timestamp, UserContext};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::approval::{ApprovalQueue, ApprovalStatus};
use crate::discovery::{ActionDiscoveryResult, ActionDiscoveryService, ActionQuery};
use crate::emitter::{ActionEventEmitter, EventListener};
use crate::error::ActionError;
use crate::permission::PermissionManager;
use crate::types::{ActionDefinition, ActionResult, PageController, Params, ResultMetadata};
use crate::validation::ActionValidationService;

#[derive(Debug, Clone)]
struct IndexEntry {
    page_id: String,
    action: Arc<ActionDefinition>,
}

/// Counts over the current index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatistics {
    pub total_controllers: usize,
    pub active_controllers: usize,
    pub total_actions: usize,
    pub actions_by_category: BTreeMap<String, usize>,
    pub actions_by_page: BTreeMap<String, usize>,
    pub pending_approvals: usize,
    pub listener_count: usize,
}

impl RegistryStatistics {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Registry of page controllers and their indexed actions. One per process.
pub struct ControllerRegistry {
    config: RegistryConfig,
    permissions: Arc<PermissionManager>,
    validation: ActionValidationService,
    discovery: ActionDiscoveryService,
    approvals: ApprovalQueue,
    controllers: RwLock<HashMap<String, PageController>>,
    /// Keyed by `pageId.actionId`. Lock order: `controllers` before `index`.
    index: RwLock<BTreeMap<String, IndexEntry>>,
}

impl ControllerRegistry {
    pub fn new(
        config: RegistryConfig,
        permissions: Arc<PermissionManager>,
        discovery: DiscoveryConfig,
    ) -> Self {
        let approvals = ApprovalQueue::new(Arc::clone(permissions.emitter()));
        Self {
            config,
            permissions,
            validation: ActionValidationService::new(),
            discovery: ActionDiscoveryService::new(discovery),
            approvals,
            controllers: RwLock::new(HashMap::new()),
            index: RwLock::new(BTreeMap::new()),
        }
    }

    /// Attach event listeners at construction.
    pub fn with_listeners<I>(self, listeners: I) -> Self
    where
        I: IntoIterator<Item = EventListener>,
    {
        for listener in listeners {
            self.permissions.emitter().add_listener(listener);
        }
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn permissions(&self) -> &Arc<PermissionManager> {
        &self.permissions
    }

    pub fn emitter(&self) -> &Arc<ActionEventEmitter> {
        self.permissions.emitter()
    }

    pub fn approvals(&self) -> &ApprovalQueue {
        &self.approvals
    }

    fn read_controllers(&self) -> RwLockReadGuard<'_, HashMap<String, PageController>> {
        self.controllers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_controllers(&self) -> RwLockWriteGuard<'_, HashMap<String, PageController>> {
        self.controllers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_index(&self) -> RwLockReadGuard<'_, BTreeMap<String, IndexEntry>> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, BTreeMap<String, IndexEntry>> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_registered<'a>(&self, full_ids: impl IntoIterator<Item = &'a String>) {
        for full_id in full_ids {
            self.emitter()
                .emit(&ActionEvent::new(ActionEventKind::ActionRegistered, full_id.clone()));
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a page controller, replacing any controller with the same id.
    pub fn register_page_controller(&self, controller: PageController) -> Result<(), ActionError> {
        if controller.page_id.trim().is_empty() {
            return Err(ActionError::InvalidController(
                "page_id is required".to_string(),
            ));
        }
        if controller.page_name.trim().is_empty() {
            return Err(ActionError::InvalidController(format!(
                "page_name is required for {}",
                controller.page_id
            )));
        }
        if controller.action_count() > self.config.max_actions_per_page {
            return Err(ActionError::ActionLimitExceeded {
                page_id: controller.page_id.clone(),
                limit: self.config.max_actions_per_page,
            });
        }
        for (key, action) in &controller.actions {
            self.validation.validate_action(action)?;
            if key != &action.id {
                return Err(ActionError::InvalidController(format!(
                    "action {} is stored under key {}",
                    action.id, key
                )));
            }
        }

        let page_id = controller.page_id.clone();
        let mut full_ids: Vec<String> = controller
            .actions
            .keys()
            .map(|id| controller.full_action_id(id))
            .collect();
        full_ids.sort();

        {
            let mut controllers = self.write_controllers();
            let mut index = self.write_index();

            if let Some(previous) = controllers.remove(&page_id) {
                warn!(page_id = %page_id, "Page controller already registered, replacing");
                for action_id in previous.actions.keys() {
                    index.remove(&previous.full_action_id(action_id));
                }
            }
            for (action_id, action) in &controller.actions {
                index.insert(
                    controller.full_action_id(action_id),
                    IndexEntry {
                        page_id: page_id.clone(),
                        action: Arc::clone(action),
                    },
                );
            }
            controllers.insert(page_id.clone(), controller);
        }

        info!(page_id = %page_id, actions = full_ids.len(), "Page controller registered");
        self.emit_registered(&full_ids);
        Ok(())
    }

    /// Remove a page controller and all of its actions.
    pub fn unregister_page_controller(&self, page_id: &str) -> bool {
        let mut controllers = self.write_controllers();
        let mut index = self.write_index();
        match controllers.remove(page_id) {
            Some(controller) => {
                for action_id in controller.actions.keys() {
                    index.remove(&controller.full_action_id(action_id));
                }
                info!(page_id = %page_id, "Page controller unregistered");
                true
            }
            None => false,
        }
    }

    /// Add or replace one action on a registered page.
    pub fn register_action(&self, page_id: &str, action: ActionDefinition) -> Result<(), ActionError> {
        self.validation.validate_action(&action)?;

        let full_id = {
            let mut controllers = self.write_controllers();
            let controller = controllers.get_mut(page_id).ok_or_else(|| {
                ActionError::InvalidController(format!("Unknown page controller: {}", page_id))
            })?;

            let replacing = controller.actions.contains_key(&action.id);
            if !replacing && controller.action_count() + 1 > self.config.max_actions_per_page {
                return Err(ActionError::ActionLimitExceeded {
                    page_id: page_id.to_string(),
                    limit: self.config.max_actions_per_page,
                });
            }

            let full_id = controller.full_action_id(&action.id);
            let action = Arc::new(action);
            controller
                .actions
                .insert(action.id.clone(), Arc::clone(&action));
            self.write_index().insert(
                full_id.clone(),
                IndexEntry {
                    page_id: page_id.to_string(),
                    action,
                },
            );
            full_id
        };

        debug!(action_id = %full_id, "Action registered");
        self.emit_registered([&full_id]);
        Ok(())
    }

    /// Remove one action. Returns `false` if the page or action is unknown.
    pub fn unregister_action(&self, page_id: &str, action_id: &str) -> bool {
        let mut controllers = self.write_controllers();
        let Some(controller) = controllers.get_mut(page_id) else {
            return false;
        };
        if controller.actions.remove(action_id).is_none() {
            return false;
        }
        let full_id = controller.full_action_id(action_id);
        self.write_index().remove(&full_id);
        debug!(action_id = %full_id, "Action unregistered");
        true
    }

    /// Hide or reveal a page's actions without unregistering them.
    pub fn set_controller_active(&self, page_id: &str, active: bool) -> bool {
        match self.write_controllers().get_mut(page_id) {
            Some(controller) => {
                controller.is_active = active;
                info!(page_id = %page_id, active, "Page controller activity changed");
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn get_page_controller(&self, page_id: &str) -> Option<PageController> {
        self.read_controllers().get(page_id).cloned()
    }

    pub fn list_page_controllers(&self) -> Vec<PageController> {
        let mut controllers: Vec<PageController> =
            self.read_controllers().values().cloned().collect();
        controllers.sort_by(|a, b| a.page_id.cmp(&b.page_id));
        controllers
    }

    /// Actions of active controllers, in index order.
    fn active_snapshot(&self) -> Vec<(String, Arc<ActionDefinition>)> {
        let controllers = self.read_controllers();
        self.read_index()
            .iter()
            .filter(|(_, entry)| {
                controllers
                    .get(&entry.page_id)
                    .is_some_and(|c| c.is_active)
            })
            .map(|(id, entry)| (id.clone(), Arc::clone(&entry.action)))
            .collect()
    }

    /// An action of an active controller.
    pub fn get_action(&self, full_id: &str) -> Option<Arc<ActionDefinition>> {
        let controllers = self.read_controllers();
        let index = self.read_index();
        let entry = index.get(full_id)?;
        controllers
            .get(&entry.page_id)
            .filter(|c| c.is_active)
            .map(|_| Arc::clone(&entry.action))
    }

    pub fn action_ids(&self) -> Vec<String> {
        self.active_snapshot().into_iter().map(|(id, _)| id).collect()
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Run an action on behalf of `context.user`.
    ///
    /// Every failure is audited before it is returned.
    pub async fn execute_action(
        &self,
        full_id: &str,
        params: Params,
        context: ActionContext,
    ) -> Result<ActionResult, ActionError> {
        let started = Instant::now();
        let user = context.user.clone();
        let outcome = self
            .run_pipeline(full_id, params.clone(), context, false, started)
            .await;
        if let Err(err) = &outcome {
            self.record_failure(full_id, &params, &user, err, started).await;
        }
        outcome
    }

    /// Run the stored call of an approved request and consume it.
    pub async fn execute_approved(
        &self,
        request_id: Uuid,
        context: ActionContext,
    ) -> Result<ActionResult, ActionError> {
        let started = Instant::now();
        let request = self.approvals.get(request_id)?;
        // Fails unless the request is approved and the caller opened it.
        self.approvals
            .mark_executed(request_id, &request.action_id, &context.user)?;
        info!(request_id = %request_id, action_id = %request.action_id, "Executing approved request");

        let user = context.user.clone();
        let outcome = self
            .run_pipeline(&request.action_id, request.params.clone(), context, true, started)
            .await;
        if let Err(err) = &outcome {
            self.record_failure(&request.action_id, &request.params, &user, err, started)
                .await;
        }
        outcome
    }

    async fn run_pipeline(
        &self,
        full_id: &str,
        mut params: Params,
        context: ActionContext,
        approved: bool,
        started: Instant,
    ) -> Result<ActionResult, ActionError> {
        let action = self
            .get_action(full_id)
            .ok_or_else(|| ActionError::NotFound(full_id.to_string()))?;

        let validation = self.validation.validate_action_parameters(&action, &params);
        if !validation.valid {
            return Err(ActionError::ValidationFailed(validation.errors));
        }
        for parameter in &action.parameters {
            if let Some(default) = &parameter.default_value {
                if params.get(&parameter.name).map_or(true, Value::is_null) {
                    params.insert(parameter.name.clone(), default.clone());
                }
            }
        }

        if self.config.enable_permission_checking {
            let decision = self
                .permissions
                .validate_action_permissions(&action, &context.user);
            if !decision.allowed {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "Permission denied".to_string());
                self.permissions
                    .emit_permission_denied(full_id, &context.user, &reason);
                return Err(ActionError::PermissionDenied {
                    action_id: full_id.to_string(),
                    reason,
                });
            }
        }

        let mut approval_request = None;
        if self.config.enable_approval_workflows && !approved {
            if let Some(workflow) = self.permissions.get_approval_workflow(full_id) {
                let request =
                    self.approvals
                        .submit(workflow, full_id, params.clone(), &context.user);
                if request.status != ApprovalStatus::Approved {
                    return Err(ActionError::ApprovalRequired {
                        action_id: full_id.to_string(),
                        workflow_id: request.workflow_id,
                        request_id: request.id,
                    });
                }
                approval_request = Some(request.id);
            }
        }
        if let Some(request_id) = approval_request {
            self.approvals
                .mark_executed(request_id, full_id, &context.user)?;
        }

        let executor = action.executor.clone().ok_or_else(|| {
            ActionError::InvalidDefinition(format!("{} has no executor", full_id))
        })?;
        let user_id = context.user.user_id.clone();
        let user = context.user.clone();
        let body_params = params.clone();
        let handle = tokio::spawn(async move { executor.execute(body_params, context).await });

        let timeout_ms = self.config.default_timeout_ms;
        let result = match tokio::time::timeout(Duration::from_millis(timeout_ms), handle).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                return Err(ActionError::HandlerFailed(format!(
                    "action body panicked: {}",
                    join_error
                )))
            }
            Err(_) => {
                warn!(
                    action_id = %full_id,
                    timeout_ms,
                    "Action timed out; the action body keeps running in the background"
                );
                return Err(ActionError::Timeout(timeout_ms));
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let result = result.with_metadata(ResultMetadata {
            execution_time: Some(elapsed_ms),
            timestamp: Some(Timestamp::now()),
            action_id: Some(full_id.to_string()),
            user_id: Some(user_id),
            ..ResultMetadata::default()
        });

        self.record(full_id, &params, &result, &user, None).await;
        info!(action_id = %full_id, elapsed_ms, success = result.success, "Action executed");
        Ok(result)
    }

    /// Audit a call that ended in `err`.
    pub(crate) async fn record_failure(
        &self,
        full_id: &str,
        params: &Params,
        user: &UserContext,
        err: &ActionError,
        started: Instant,
    ) {
        let message = err.to_string();
        debug!(action_id = %full_id, error = %message, "Action failed");
        let result = ActionResult::failure(message.clone()).with_metadata(ResultMetadata {
            execution_time: Some(started.elapsed().as_millis() as u64),
            timestamp: Some(Timestamp::now()),
            action_id: Some(full_id.to_string()),
            user_id: Some(user.user_id.clone()),
            ..ResultMetadata::default()
        });
        self.record(full_id, params, &result, user, Some(&message))
            .await;
    }

    /// One executed/failed event per attempt, persisted when auditing is on.
    async fn record(
        &self,
        full_id: &str,
        params: &Params,
        result: &ActionResult,
        user: &UserContext,
        error: Option<&str>,
    ) {
        if self.config.enable_audit_logging {
            self.permissions
                .audit_action_execution(full_id, params, Some(result), user, error)
                .await;
            return;
        }

        let kind = if error.is_some() {
            ActionEventKind::ActionFailed
        } else {
            ActionEventKind::ActionExecuted
        };
        let mut event = ActionEvent::new(kind, full_id)
            .with_user(user)
            .with_params(Value::Object(params.clone()));
        if let Ok(value) = serde_json::to_value(result) {
            event = event.with_result(value);
        }
        if let Some(error) = error {
            event = event.with_error(error);
        }
        self.emitter().emit(&event);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn discover_actions(&self, query: &ActionQuery) -> ActionDiscoveryResult {
        let snapshot = self.active_snapshot();
        self.discovery
            .discover(snapshot.iter().map(|(id, action)| (id.as_str(), action)), query)
    }

    /// Like [`Self::discover_actions`], restricted to actions `user` may run.
    ///
    /// Authorization is applied before ranking so counts, suggestions and
    /// the result limit only ever see permitted actions.
    pub fn discover_actions_for(&self, query: &ActionQuery, user: &UserContext) -> ActionDiscoveryResult {
        let snapshot = self.get_available_actions(user);
        self.discovery
            .discover(snapshot.iter().map(|(id, action)| (id.as_str(), action)), query)
    }

    /// Every active action `user` is authorized to run.
    pub fn get_available_actions(&self, user: &UserContext) -> Vec<(String, Arc<ActionDefinition>)> {
        self.active_snapshot()
            .into_iter()
            .filter(|(_, action)| {
                self.permissions
                    .validate_action_permissions(action, user)
                    .allowed
            })
            .collect()
    }

    pub fn get_statistics(&self) -> RegistryStatistics {
        let controllers = self.read_controllers();
        let index = self.read_index();

        let mut stats = RegistryStatistics {
            total_controllers: controllers.len(),
            active_controllers: controllers.values().filter(|c| c.is_active).count(),
            total_actions: index.len(),
            pending_approvals: self.approvals.pending_count(),
            listener_count: self.emitter().listener_count(),
            ..RegistryStatistics::default()
        };
        for entry in index.values() {
            *stats
                .actions_by_category
                .entry(entry.action.category.to_string())
                .or_default() += 1;
            *stats
                .actions_by_page
                .entry(entry.page_id.clone())
                .or_default() += 1;
        }
        stats
    }
}
