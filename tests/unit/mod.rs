//! Unit tests for microcks-host modules
//!
//! These tests cover individual components without network I/O.

mod test_config;
mod test_error_paths;
mod test_resource;
