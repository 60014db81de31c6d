#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Library view for sideload
//!
//! Merges the static catalog with platform-reported installed packages and
//! the tracked installer sessions to produce one [`ItemState`] per item, and
//! projects published sync events onto an existing snapshot.
//!
//! [`ItemState`]: sideload_types::ItemState

pub mod catalog;
pub mod library;
pub mod projection;
pub mod snapshot;

pub use catalog::Catalog;
pub use library::LibraryCatalog;
pub use projection::apply_event;
pub use snapshot::{merge, LibraryEntry, LibrarySnapshot};
