//! # LabelSync
//!
//! Keeps the labels of an organization's repositories in line with the
//! `labelsync.yml` document stored in the organization's configuration
//! repository.
//!
//! The crate is organized around three pieces:
//!
//! - [`diff`]: the pure engine that classifies configured and live labels into
//!   added, changed, aliased and removed operations.
//! - [`processors`]: one handler per [`task::TaskKind`], each applying its work
//!   against a [`store::LabelStore`] scoped to one installation.
//! - [`worker`]: the sequential consumer that pulls tasks from a
//!   [`queue::TaskQueue`], resolves installation credentials and dispatches.

#![warn(clippy::pedantic)]

pub mod access;
pub mod credentials;
pub mod diff;
pub mod processors;
pub mod queue;
pub mod report;
pub mod settings;
pub mod store;
pub mod task;
pub mod types;
pub mod worker;

pub use access::{check_access, AccessReport};
pub use credentials::{Credential, CredentialCache, Credentials, MemoryCredentialCache, TokenSource};
pub use diff::{diff, LabelDiff};
pub use processors::{TaskContext, TaskOutcome};
pub use queue::{MemoryQueue, SpoolQueue, TaskQueue};
pub use report::SyncReport;
pub use store::{LabelStore, MemoryStore, StoreFactory};
pub use task::{Task, TaskKind};
pub use types::{Installation, Issue, Label, RepoRef};
pub use worker::{Step, Worker, WorkerError};
