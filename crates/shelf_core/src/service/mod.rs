//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own the board controller that caches data and executes reorders.
//! - Expand prompt templates.

pub mod board;
pub mod item_service;
pub mod prompt_vars;
pub mod taxonomy_service;
