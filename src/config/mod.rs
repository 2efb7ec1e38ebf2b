// src/config/mod.rs

//! Configuration loading and validation for streamdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model and its validated form (`model.rs`).
//! - Define graphs programmatically (`builder.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants like acyclicity and branch consistency (`validate.rs`).

pub mod builder;
pub mod loader;
pub mod model;
pub mod validate;

pub use builder::{DagBuilder, IntoTaskIds};
pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{
    ConfigFile, DagSection, DagSpec, DecisionConfig, DefaultArgs, DefaultSection, RawConfigFile,
    TaskConfig, TaskOverrides, TaskSpec,
};
pub use validate::parse_start_date;
