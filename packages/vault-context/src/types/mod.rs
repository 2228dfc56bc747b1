//! Data types shared by the extraction engine and the streaming layer.

pub mod config;
pub mod descriptor;
pub mod document;
pub mod excerpt;
pub mod message;
