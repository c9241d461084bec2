pub mod backend;
pub mod comparison;
pub mod config;
pub mod contract;
pub mod error;
pub mod gemini;
pub mod models;
pub mod orchestrator;
pub mod pdf;
pub mod prompts;
pub mod report;
pub mod routes;
pub mod stages;
