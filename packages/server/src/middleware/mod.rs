//! Cross-cutting request middleware.

pub mod status;
