#[path = "../fixtures/mod.rs"]
mod fixtures;

mod t10_add_node;
mod t20_single_outstanding_change;
mod t30_update_node;
