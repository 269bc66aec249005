//! Deployment synchronization: content model → Canvas resources.
//!
//! Entities deploy in dependency order: module shells first, then items
//! (assignments and module-item links), then cross-links (prerequisite
//! wiring, which needs every referenced module to already exist remotely).
//!
//! Each entity is create-or-update, gated by a content digest stored in the
//! resource map: when the digest of the current payload matches the last
//! deployed one, no API call is made at all, so re-running deployment on an
//! unchanged course performs zero mutating calls.
//!
//! Failures are isolated per entity: a terminal error marks that entity
//! `failed`, its dependents `skipped`, and the batch continues. The
//! resource map is persisted after every successful entity, so an aborted
//! run leaves a valid prefix behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use questline_canvas::{
    CanvasApi, ContentDigest, ModuleItemPayload, RateLimitBudget, RemoteId, ResourceMap,
    ResourceMapStore, RetryPolicy,
};

use crate::error::Result;
use crate::graph::SkillGraph;
use crate::model::{CourseDefinition, Item, Module};
use crate::obs;
use crate::report::{DeploymentReport, EntityAction, EntityOutcome};
use crate::sync::payloads::{item_payload, module_payload};

/// Cooperative cancellation flag, checked at entity boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the digest comparison says to do for one entity.
enum SyncDecision {
    /// Digest matches the last deployment; nothing to do.
    Skip(RemoteId),
    Create,
    Update(RemoteId),
}

fn decide(map: &ResourceMap, key: &str, digest: &ContentDigest) -> SyncDecision {
    match map.get(key) {
        Some(entry) if &entry.digest == digest => SyncDecision::Skip(entry.remote_id),
        Some(entry) => SyncDecision::Update(entry.remote_id),
        None => SyncDecision::Create,
    }
}

/// Digest of an entity payload's canonical JSON.
fn digest_of<T: Serialize>(payload: &T) -> Result<ContentDigest> {
    Ok(ContentDigest::from_bytes(&serde_json::to_vec(payload)?))
}

/// Resource-map key helpers. One naming scheme, used everywhere.
pub(crate) fn module_key(id: &str) -> String {
    format!("module:{id}")
}

pub(crate) fn item_key(id: &str) -> String {
    format!("item:{id}")
}

fn link_key(id: &str) -> String {
    format!("link:{id}")
}

fn prereqs_key(id: &str) -> String {
    format!("prereqs:{id}")
}

/// Deployment synchronizer for one Canvas course.
pub struct Deployer<'a> {
    api: &'a dyn CanvasApi,
    course_id: RemoteId,
    policy: RetryPolicy,
    budget: Arc<RateLimitBudget>,
    cancel: CancelFlag,
}

impl<'a> Deployer<'a> {
    pub fn new(api: &'a dyn CanvasApi, course_id: RemoteId) -> Self {
        Self {
            api,
            course_id,
            policy: RetryPolicy::default(),
            budget: Arc::new(RateLimitBudget::default()),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_budget(mut self, budget: Arc<RateLimitBudget>) -> Self {
        self.budget = budget;
        self
    }

    /// Handle for aborting the run between entities.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Deploy the course, returning a full per-entity report.
    ///
    /// Only validation/serialization problems are `Err`; per-entity API
    /// failures land in the report.
    pub async fn deploy(
        &self,
        course: &CourseDefinition,
        map: &mut ResourceMap,
        store: &dyn ResourceMapStore,
    ) -> Result<DeploymentReport> {
        let graph = SkillGraph::build(course);
        let order = graph.topological_order()?;

        let mut report = DeploymentReport::new(&course.course_code);
        let _span = obs::DeploySpan::enter(&course.course_code);
        obs::emit_deploy_started(&course.course_code, course.modules.len());

        self.deploy_modules(course, &order, map, store, &mut report).await?;
        if !report.aborted {
            self.deploy_items(course, &order, map, store, &mut report).await?;
        }
        if !report.aborted {
            self.deploy_prerequisites(course, &order, map, store, &mut report).await?;
        }

        obs::emit_deploy_finished(
            &course.course_code,
            report.mutations(),
            report.count(EntityAction::Failed),
            report.aborted,
        );
        Ok(report)
    }

    /// Phase 1: module shells, in topological order.
    async fn deploy_modules(
        &self,
        course: &CourseDefinition,
        order: &[String],
        map: &mut ResourceMap,
        store: &dyn ResourceMapStore,
        report: &mut DeploymentReport,
    ) -> Result<()> {
        for module_id in order {
            if self.cancel.is_cancelled() {
                report.aborted = true;
                return Ok(());
            }
            let Some(module) = course.module(module_id) else {
                continue;
            };
            let position = course
                .modules
                .iter()
                .position(|m| m.id == *module_id)
                .unwrap_or(0)
                + 1;

            let key = module_key(module_id);
            let payload = module_payload(module, position);
            let digest = digest_of(&payload)?;

            let outcome = match decide(map, &key, &digest) {
                SyncDecision::Skip(id) => EntityOutcome::unchanged(&key, id),
                SyncDecision::Create => {
                    let result = self
                        .policy
                        .execute(&self.budget, || self.api.create_module(self.course_id, &payload))
                        .await;
                    match result {
                        Ok(id) => {
                            map.record(&key, id, digest);
                            store.persist(map)?;
                            EntityOutcome::ok(&key, EntityAction::Created, id)
                        }
                        Err(e) => EntityOutcome::failed(&key, e),
                    }
                }
                SyncDecision::Update(id) => {
                    let result = self
                        .policy
                        .execute(&self.budget, || {
                            self.api.update_module(self.course_id, id, &payload)
                        })
                        .await;
                    match result {
                        Ok(()) => {
                            map.record(&key, id, digest);
                            store.persist(map)?;
                            EntityOutcome::ok(&key, EntityAction::Updated, id)
                        }
                        Err(e) => EntityOutcome::failed(&key, e),
                    }
                }
            };
            obs::emit_entity_outcome(&outcome);
            report.outcomes.push(outcome);
        }
        Ok(())
    }

    /// Phase 2: items. Assignments/quizzes deploy as assignments plus a
    /// module-item link; pages deploy as inline module items.
    async fn deploy_items(
        &self,
        course: &CourseDefinition,
        order: &[String],
        map: &mut ResourceMap,
        store: &dyn ResourceMapStore,
        report: &mut DeploymentReport,
    ) -> Result<()> {
        for module_id in order {
            let Some(module) = course.module(module_id) else {
                continue;
            };

            let Some(parent_remote) = map.remote_id(&module_key(module_id)) else {
                // Module never deployed (failed create): its items cannot land.
                for item in &module.items {
                    let outcome = EntityOutcome::skipped(
                        item_key(item.id()),
                        format!("module '{module_id}' is not deployed"),
                    );
                    obs::emit_entity_outcome(&outcome);
                    report.outcomes.push(outcome);
                }
                continue;
            };

            for (index, item) in module.items.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    report.aborted = true;
                    return Ok(());
                }
                self.deploy_item(module, item, index + 1, parent_remote, map, store, report)
                    .await?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn deploy_item(
        &self,
        module: &Module,
        item: &Item,
        position: usize,
        parent_remote: RemoteId,
        map: &mut ResourceMap,
        store: &dyn ResourceMapStore,
        report: &mut DeploymentReport,
    ) -> Result<()> {
        match item {
            Item::Page { id, title, .. } => {
                let key = item_key(id);
                let payload = ModuleItemPayload {
                    title: title.clone(),
                    content_type: "Page".to_string(),
                    content_id: None,
                    position,
                };
                let digest = digest_of(&payload)?;
                let outcome = self
                    .sync_module_item(&key, parent_remote, &payload, &digest, map, store)
                    .await?;
                obs::emit_entity_outcome(&outcome);
                report.outcomes.push(outcome);
            }
            Item::Assignment { .. } | Item::Quiz { .. } => {
                let key = item_key(item.id());
                let payload = item_payload(item);
                let digest = digest_of(&payload)?;

                let assignment_remote = match decide(map, &key, &digest) {
                    SyncDecision::Skip(id) => {
                        let outcome = EntityOutcome::unchanged(&key, id);
                        obs::emit_entity_outcome(&outcome);
                        report.outcomes.push(outcome);
                        Some(id)
                    }
                    SyncDecision::Create => {
                        let result = self
                            .policy
                            .execute(&self.budget, || {
                                self.api.create_assignment(self.course_id, &payload)
                            })
                            .await;
                        match result {
                            Ok(id) => {
                                map.record(&key, id, digest);
                                store.persist(map)?;
                                let outcome = EntityOutcome::ok(&key, EntityAction::Created, id);
                                obs::emit_entity_outcome(&outcome);
                                report.outcomes.push(outcome);
                                Some(id)
                            }
                            Err(e) => {
                                let outcome = EntityOutcome::failed(&key, e);
                                obs::emit_entity_outcome(&outcome);
                                report.outcomes.push(outcome);
                                None
                            }
                        }
                    }
                    SyncDecision::Update(id) => {
                        let result = self
                            .policy
                            .execute(&self.budget, || {
                                self.api.update_assignment(self.course_id, id, &payload)
                            })
                            .await;
                        match result {
                            Ok(()) => {
                                map.record(&key, id, digest);
                                store.persist(map)?;
                                let outcome = EntityOutcome::ok(&key, EntityAction::Updated, id);
                                obs::emit_entity_outcome(&outcome);
                                report.outcomes.push(outcome);
                                Some(id)
                            }
                            Err(e) => {
                                let outcome = EntityOutcome::failed(&key, e);
                                obs::emit_entity_outcome(&outcome);
                                report.outcomes.push(outcome);
                                // Update failure still leaves a usable remote.
                                Some(id)
                            }
                        }
                    }
                };

                let link = link_key(item.id());
                match assignment_remote {
                    Some(content_id) => {
                        let link_payload = ModuleItemPayload {
                            title: item.title().to_string(),
                            content_type: "Assignment".to_string(),
                            content_id: Some(content_id),
                            position,
                        };
                        let link_digest = digest_of(&link_payload)?;
                        let outcome = self
                            .sync_module_item(
                                &link,
                                parent_remote,
                                &link_payload,
                                &link_digest,
                                map,
                                store,
                            )
                            .await?;
                        obs::emit_entity_outcome(&outcome);
                        report.outcomes.push(outcome);
                    }
                    None => {
                        let outcome = EntityOutcome::skipped(
                            &link,
                            format!("assignment '{}' failed to deploy", item.id()),
                        );
                        obs::emit_entity_outcome(&outcome);
                        report.outcomes.push(outcome);
                    }
                }
                debug!(module = %module.id, item = %item.id(), "item phase complete");
            }
        }
        Ok(())
    }

    /// Create-or-update one module item under `parent_remote`.
    async fn sync_module_item(
        &self,
        key: &str,
        parent_remote: RemoteId,
        payload: &ModuleItemPayload,
        digest: &ContentDigest,
        map: &mut ResourceMap,
        store: &dyn ResourceMapStore,
    ) -> Result<EntityOutcome> {
        let outcome = match decide(map, key, digest) {
            SyncDecision::Skip(id) => EntityOutcome::unchanged(key, id),
            SyncDecision::Create => {
                let result = self
                    .policy
                    .execute(&self.budget, || {
                        self.api
                            .create_module_item(self.course_id, parent_remote, payload)
                    })
                    .await;
                match result {
                    Ok(id) => {
                        map.record(key, id, digest.clone());
                        store.persist(map)?;
                        EntityOutcome::ok(key, EntityAction::Created, id)
                    }
                    Err(e) => EntityOutcome::failed(key, e),
                }
            }
            SyncDecision::Update(id) => {
                let result = self
                    .policy
                    .execute(&self.budget, || {
                        self.api
                            .update_module_item(self.course_id, parent_remote, id, payload)
                    })
                    .await;
                match result {
                    Ok(()) => {
                        map.record(key, id, digest.clone());
                        store.persist(map)?;
                        EntityOutcome::ok(key, EntityAction::Updated, id)
                    }
                    Err(e) => EntityOutcome::failed(key, e),
                }
            }
        };
        Ok(outcome)
    }

    /// Phase 3: prerequisite wiring. Requires every referenced module's
    /// remote id, so it runs strictly after the module phase.
    async fn deploy_prerequisites(
        &self,
        course: &CourseDefinition,
        order: &[String],
        map: &mut ResourceMap,
        store: &dyn ResourceMapStore,
        report: &mut DeploymentReport,
    ) -> Result<()> {
        for module_id in order {
            let Some(module) = course.module(module_id) else {
                continue;
            };
            if module.unlock_requirements.is_empty() {
                continue;
            }
            if self.cancel.is_cancelled() {
                report.aborted = true;
                return Ok(());
            }

            let key = prereqs_key(module_id);
            let Some(remote) = map.remote_id(&module_key(module_id)) else {
                let outcome = EntityOutcome::skipped(
                    &key,
                    format!("module '{module_id}' is not deployed"),
                );
                obs::emit_entity_outcome(&outcome);
                report.outcomes.push(outcome);
                continue;
            };

            let mut prereq_remotes = Vec::with_capacity(module.unlock_requirements.len());
            let mut missing = None;
            for prereq in &module.unlock_requirements {
                match map.remote_id(&module_key(prereq)) {
                    Some(id) => prereq_remotes.push(id),
                    None => {
                        missing = Some(prereq.clone());
                        break;
                    }
                }
            }
            if let Some(prereq) = missing {
                let outcome = EntityOutcome::skipped(
                    &key,
                    format!("prerequisite '{prereq}' is not deployed"),
                );
                obs::emit_entity_outcome(&outcome);
                report.outcomes.push(outcome);
                continue;
            }

            let digest = digest_of(&prereq_remotes)?;
            let outcome = if map.is_current(&key, &digest) {
                EntityOutcome::unchanged(&key, remote)
            } else {
                let existed = map.get(&key).is_some();
                let result = self
                    .policy
                    .execute(&self.budget, || {
                        self.api
                            .set_module_prerequisites(self.course_id, remote, &prereq_remotes)
                    })
                    .await;
                match result {
                    Ok(()) => {
                        map.record(&key, remote, digest);
                        store.persist(map)?;
                        let action = if existed {
                            EntityAction::Updated
                        } else {
                            EntityAction::Created
                        };
                        EntityOutcome::ok(&key, action, remote)
                    }
                    Err(e) => EntityOutcome::failed(&key, e),
                }
            };
            obs::emit_entity_outcome(&outcome);
            report.outcomes.push(outcome);
        }

        info!(course = %course.course_code, "prerequisite wiring complete");
        Ok(())
    }
}
