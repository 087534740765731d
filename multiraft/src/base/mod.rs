//! Small shared utilities.

pub mod stopper;
