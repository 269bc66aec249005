//! In-memory fake for [`CanvasApi`] (testing only).
//!
//! `MemoryCanvas` satisfies the trait contract without a network. It records
//! every mutating call so tests can assert idempotence ("second deploy makes
//! zero mutating calls") and supports scripted failures per operation so
//! retry and partial-failure behavior can be exercised deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::{
    AssignmentPayload, CanvasApi, ColumnPayload, ModuleItemPayload, ModulePayload, RemoteId,
    Submission,
};
use crate::error::{CanvasError, CanvasResult};

/// One recorded mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Operation name, e.g. `"create_module"`.
    pub op: &'static str,
    /// Target description, e.g. `"module/101"`.
    pub target: String,
}

/// A failure to inject on the next matching call.
///
/// `CanvasError` is not `Clone`, so scripts store this reduced form and
/// materialize a fresh error per injection.
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    RateLimited { retry_after: Option<f64> },
    Transient,
    Permission,
    SchemaRejected { status: u16 },
}

impl ScriptedFailure {
    fn materialize(&self) -> CanvasError {
        match self {
            ScriptedFailure::RateLimited { retry_after } => CanvasError::RateLimited {
                retry_after: *retry_after,
            },
            ScriptedFailure::Transient => CanvasError::Transient("scripted failure".into()),
            ScriptedFailure::Permission => CanvasError::Permission {
                message: "scripted permission failure".into(),
            },
            ScriptedFailure::SchemaRejected { status } => CanvasError::SchemaRejected {
                status: *status,
                message: "scripted schema rejection".into(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: RemoteId,
    modules: HashMap<RemoteId, ModulePayload>,
    assignments: HashMap<RemoteId, AssignmentPayload>,
    module_items: HashMap<RemoteId, (RemoteId, ModuleItemPayload)>,
    prerequisites: HashMap<RemoteId, Vec<RemoteId>>,
    columns: HashMap<RemoteId, ColumnPayload>,
    column_data: HashMap<(RemoteId, RemoteId), String>,
    submissions: Vec<Submission>,
    mutations: Vec<MutationRecord>,
    failures: HashMap<String, VecDeque<ScriptedFailure>>,
}

/// In-memory [`CanvasApi`] backed by `Mutex`-protected maps.
#[derive(Debug, Default)]
pub struct MemoryCanvas {
    state: Mutex<FakeState>,
}

impl MemoryCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next call to `op` (FIFO per operation).
    /// Queue it `times` times to fail repeatedly.
    pub fn script_failure(&self, op: &str, failure: ScriptedFailure, times: u32) {
        let mut state = self.state.lock().unwrap();
        let queue = state.failures.entry(op.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(failure.clone());
        }
    }

    /// Replace the submission listing returned by `list_submissions`.
    pub fn set_submissions(&self, submissions: Vec<Submission>) {
        self.state.lock().unwrap().submissions = submissions;
    }

    /// Total number of mutating calls recorded so far.
    pub fn mutation_count(&self) -> usize {
        self.state.lock().unwrap().mutations.len()
    }

    /// Snapshot of all recorded mutating calls, in order.
    pub fn mutations(&self) -> Vec<MutationRecord> {
        self.state.lock().unwrap().mutations.clone()
    }

    /// Remote module payload, if deployed.
    pub fn module(&self, module_id: RemoteId) -> Option<ModulePayload> {
        self.state.lock().unwrap().modules.get(&module_id).cloned()
    }

    /// Remote assignment payload, if deployed.
    pub fn assignment(&self, assignment_id: RemoteId) -> Option<AssignmentPayload> {
        self.state
            .lock()
            .unwrap()
            .assignments
            .get(&assignment_id)
            .cloned()
    }

    /// Prerequisite ids wired onto a module.
    pub fn prerequisites(&self, module_id: RemoteId) -> Vec<RemoteId> {
        self.state
            .lock()
            .unwrap()
            .prerequisites
            .get(&module_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Current gradebook cell value for `(column, user)`.
    pub fn column_value(&self, column_id: RemoteId, user_id: RemoteId) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .column_data
            .get(&(column_id, user_id))
            .cloned()
    }

    fn take_failure(state: &mut FakeState, op: &str) -> Option<CanvasError> {
        state
            .failures
            .get_mut(op)
            .and_then(|q| q.pop_front())
            .map(|f| f.materialize())
    }

    fn record(state: &mut FakeState, op: &'static str, target: String) {
        state.mutations.push(MutationRecord { op, target });
    }

    fn allocate_id(state: &mut FakeState) -> RemoteId {
        state.next_id += 100;
        state.next_id
    }
}

#[async_trait]
impl CanvasApi for MemoryCanvas {
    async fn create_module(
        &self,
        _course_id: RemoteId,
        payload: &ModulePayload,
    ) -> CanvasResult<RemoteId> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut state, "create_module") {
            return Err(err);
        }
        let id = Self::allocate_id(&mut state);
        state.modules.insert(id, payload.clone());
        Self::record(&mut state, "create_module", format!("module/{id}"));
        Ok(id)
    }

    async fn update_module(
        &self,
        _course_id: RemoteId,
        module_id: RemoteId,
        payload: &ModulePayload,
    ) -> CanvasResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut state, "update_module") {
            return Err(err);
        }
        if !state.modules.contains_key(&module_id) {
            return Err(CanvasError::SchemaRejected {
                status: 404,
                message: format!("no module {module_id}"),
            });
        }
        state.modules.insert(module_id, payload.clone());
        Self::record(&mut state, "update_module", format!("module/{module_id}"));
        Ok(())
    }

    async fn create_assignment(
        &self,
        _course_id: RemoteId,
        payload: &AssignmentPayload,
    ) -> CanvasResult<RemoteId> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut state, "create_assignment") {
            return Err(err);
        }
        let id = Self::allocate_id(&mut state);
        state.assignments.insert(id, payload.clone());
        Self::record(&mut state, "create_assignment", format!("assignment/{id}"));
        Ok(id)
    }

    async fn update_assignment(
        &self,
        _course_id: RemoteId,
        assignment_id: RemoteId,
        payload: &AssignmentPayload,
    ) -> CanvasResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut state, "update_assignment") {
            return Err(err);
        }
        if !state.assignments.contains_key(&assignment_id) {
            return Err(CanvasError::SchemaRejected {
                status: 404,
                message: format!("no assignment {assignment_id}"),
            });
        }
        state.assignments.insert(assignment_id, payload.clone());
        Self::record(
            &mut state,
            "update_assignment",
            format!("assignment/{assignment_id}"),
        );
        Ok(())
    }

    async fn create_module_item(
        &self,
        _course_id: RemoteId,
        module_id: RemoteId,
        payload: &ModuleItemPayload,
    ) -> CanvasResult<RemoteId> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut state, "create_module_item") {
            return Err(err);
        }
        if !state.modules.contains_key(&module_id) {
            return Err(CanvasError::SchemaRejected {
                status: 404,
                message: format!("no module {module_id}"),
            });
        }
        let id = Self::allocate_id(&mut state);
        state.module_items.insert(id, (module_id, payload.clone()));
        Self::record(
            &mut state,
            "create_module_item",
            format!("module/{module_id}/item/{id}"),
        );
        Ok(id)
    }

    async fn update_module_item(
        &self,
        _course_id: RemoteId,
        module_id: RemoteId,
        item_id: RemoteId,
        payload: &ModuleItemPayload,
    ) -> CanvasResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut state, "update_module_item") {
            return Err(err);
        }
        if !state.module_items.contains_key(&item_id) {
            return Err(CanvasError::SchemaRejected {
                status: 404,
                message: format!("no module item {item_id}"),
            });
        }
        state.module_items.insert(item_id, (module_id, payload.clone()));
        Self::record(
            &mut state,
            "update_module_item",
            format!("module/{module_id}/item/{item_id}"),
        );
        Ok(())
    }

    async fn set_module_prerequisites(
        &self,
        _course_id: RemoteId,
        module_id: RemoteId,
        prerequisite_ids: &[RemoteId],
    ) -> CanvasResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut state, "set_module_prerequisites") {
            return Err(err);
        }
        if !state.modules.contains_key(&module_id) {
            return Err(CanvasError::SchemaRejected {
                status: 404,
                message: format!("no module {module_id}"),
            });
        }
        state
            .prerequisites
            .insert(module_id, prerequisite_ids.to_vec());
        Self::record(
            &mut state,
            "set_module_prerequisites",
            format!("module/{module_id}"),
        );
        Ok(())
    }

    async fn create_gradebook_column(
        &self,
        _course_id: RemoteId,
        payload: &ColumnPayload,
    ) -> CanvasResult<RemoteId> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut state, "create_gradebook_column") {
            return Err(err);
        }
        let id = Self::allocate_id(&mut state);
        state.columns.insert(id, payload.clone());
        Self::record(&mut state, "create_gradebook_column", format!("column/{id}"));
        Ok(id)
    }

    async fn put_column_datum(
        &self,
        _course_id: RemoteId,
        column_id: RemoteId,
        user_id: RemoteId,
        content: &str,
    ) -> CanvasResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut state, "put_column_datum") {
            return Err(err);
        }
        if !state.columns.contains_key(&column_id) {
            return Err(CanvasError::SchemaRejected {
                status: 404,
                message: format!("no column {column_id}"),
            });
        }
        state
            .column_data
            .insert((column_id, user_id), content.to_string());
        Self::record(
            &mut state,
            "put_column_datum",
            format!("column/{column_id}/user/{user_id}"),
        );
        Ok(())
    }

    async fn list_submissions(&self, _course_id: RemoteId) -> CanvasResult<Vec<Submission>> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut state, "list_submissions") {
            return Err(err);
        }
        Ok(state.submissions.clone())
    }
}
