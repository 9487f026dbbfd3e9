//! medbench-core: multi-turn clinical-agent evaluation harness.
//!
//! Drives a language-model agent through clinical-task scenarios, mediates
//! its actions against a FHIR record server, and produces one binary
//! pass/fail judgment per scenario. The record server and the model
//! sampling layer are external collaborators behind the [`backend::Backend`]
//! and [`providers::llm::ModelClient`] seams.

pub mod backend;
pub mod config;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod grader;
pub mod model;
pub mod parser;
pub mod providers;
pub mod report;
pub mod scenario;
