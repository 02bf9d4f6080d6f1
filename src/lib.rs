//! casetrack task engine library
//!
//! Unifies three task definition tables (predefined, case, company) behind
//! one tagged-union model with a shared query/mutation contract, plus the
//! task instance lifecycle built on top of them.

pub mod cli;
pub mod config;
pub mod db;
pub mod definitions;
pub mod error;
pub mod instances;
pub mod logging;
pub mod storage;
pub mod transform;
pub mod types;
