//! This crate exists only for its integration tests; see `tests/`.
