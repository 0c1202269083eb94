//! water-reminder library crate.
//!
//! Scheduling and dispatch engine for timezone-anchored hourly reminder push
//! notifications. The binary wires these pieces together; the HTTP surface
//! that feeds registrations in lives outside this crate and talks to
//! [`registration::RegistrationService`].

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod message;
pub mod notification;
pub mod registration;
pub mod registry;
pub mod scheduler;
pub mod utils;

pub use error::{Error, Result};
