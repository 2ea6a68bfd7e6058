//! Updraft — update lifecycle engine for a package release management
//! service.
//!
//! Updates move through pending, testing, and stable according to karma
//! feedback, time-in-testing policy, and critical-path approval rules,
//! driving build-system tags, bug tracker state, mail, and bus events along
//! the way.

pub mod buildsys;
pub mod bugs;
pub mod config;
pub mod error;
pub mod events;
pub mod mail;
pub mod metrics;
pub mod models;
pub mod schema;
pub mod services;
pub mod version;

#[cfg(test)]
pub mod test_util;
