//! Service layer: the transition engine plus the database glue around it.

pub mod karma;
pub mod obsoletion;
pub mod override_service;
pub mod policy;
pub mod release_service;
pub mod transition;
pub mod update_service;
