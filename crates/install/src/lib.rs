#![warn(clippy::pedantic)]
#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

//! Install/upgrade session lifecycle for sideload
//!
//! The [`SessionCoordinator`] owns every session record. It opens platform
//! sessions, streams payloads, commits, and turns the platform's
//! asynchronous callbacks and package broadcasts into exactly one sync
//! event per operation outcome. All state-mutating operations serialise per
//! item; different items proceed in parallel.
//!
//! [`InstallerRuntime`] is the process-scoped context that wires the
//! coordinator to the platform signal channel, the library refresh and
//! auto-update timers, and the library projection.

mod callbacks;
mod coordinator;
mod locks;
mod payload;
mod projection;
mod prompts;
mod reconcile;
mod runtime;
mod scheduler;
mod timer;

pub use coordinator::{
    CommitOutcome, CoordinatorBuilder, InstallOutcome, SessionCoordinator, SessionHandle,
};
pub use locks::ItemLocks;
pub use payload::{DirectoryPayloadSource, MemoryPayloadSource, PayloadSource};
pub use projection::LibraryProjection;
pub use prompts::{
    ConfirmationRequest, HeadlessPrompter, PendingNotification, PendingPrompts, UserPrompter,
};
pub use reconcile::ReconcileReport;
pub use runtime::{InstallerRuntime, RuntimeOptions};
pub use scheduler::{AutoUpdateReport, UpdateScheduler};
pub use timer::RecurringTimer;
