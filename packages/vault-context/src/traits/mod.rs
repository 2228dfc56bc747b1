//! Core trait abstractions for the vault-context library.
//!
//! These traits define the capabilities the host application provides:
//! note storage, query execution, text generation, and an output surface.

pub mod generation;
pub mod query;
pub mod sink;
pub mod vault;
