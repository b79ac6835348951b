//! UI host bindings for the shelf core.

pub mod api;
