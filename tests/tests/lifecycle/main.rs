#[path = "../fixtures/mod.rs"]
mod fixtures;

mod t20_create_remove_idempotent;
mod t50_shutdown_drains_callers;
