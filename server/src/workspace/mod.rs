//! Workspace lifecycle endpoints.

pub mod handler;

// vim: ts=4
