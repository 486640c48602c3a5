//! Core definitions (error type and result alias), relied upon by all lamina-* crates.

pub mod error;
pub mod result;

pub use result::Result;
