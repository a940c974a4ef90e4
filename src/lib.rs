pub mod cli;
pub mod config;
pub mod contracts;
pub mod error;
pub mod gateway;
pub mod git;
pub mod jobs;
pub mod provider;
pub mod stages;
pub mod ui;
pub mod validation;
pub mod workflow;
