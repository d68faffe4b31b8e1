//! Utility modules for common functionality.
//!
//! Currently only the logging setup used by the host binary.

pub mod logger;
