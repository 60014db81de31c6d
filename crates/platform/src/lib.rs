#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Platform installer abstraction for sideload
//!
//! The platform package installer is an external capability with an
//! asynchronous callback contract. This crate defines:
//! - [`InstallerGateway`], the request side (create, write, commit, uninstall, queries)
//! - [`PlatformSignal`], everything the platform reports back later
//! - [`SimulatedInstaller`], an in-process installer used by the CLI and tests

pub mod gateway;
pub mod persist;
pub mod simulator;

pub use gateway::{
    signal_channel, InstallerGateway, PayloadStream, PlatformSignal, SignalReceiver, SignalSender,
};
pub use simulator::{SimulatedInstaller, SimulatorOptions};
