//! Questline-Canvas: Canvas LMS REST Seam
//!
//! This crate provides everything the deployment/sync engine needs to talk
//! to Canvas without knowing about HTTP details:
//!
//! ## Key Components
//!
//! - `CanvasApi`: async trait over the Canvas endpoints the engine uses
//! - `HttpCanvasClient`: production reqwest implementation (bearer auth,
//!   per-call timeout, throttle-header handling)
//! - `RateLimitBudget` / `RetryPolicy`: the shared quota tracker and the
//!   bounded backoff loop every call runs under
//! - `ResourceMap` + stores: the persisted id/digest table that makes
//!   re-deployment idempotent
//! - `fakes::MemoryCanvas`: in-memory implementation with mutation
//!   recording and scripted failures, for tests

mod error;
pub mod api;
pub mod fakes;
pub mod http;
pub mod resource_map;
pub mod throttle;

pub use api::{
    AssignmentPayload, CanvasApi, ColumnPayload, ModuleItemPayload, ModulePayload, RemoteId,
    Submission,
};
pub use error::{CanvasError, CanvasResult};
pub use fakes::{MemoryCanvas, MutationRecord, ScriptedFailure};
pub use http::{CanvasConfig, HttpCanvasClient};
pub use resource_map::{
    ContentDigest, FsResourceMapStore, MemoryResourceMapStore, ResourceEntry, ResourceMap,
    ResourceMapStore,
};
pub use throttle::{RateLimitBudget, RetryPolicy};
