#[path = "../fixtures/mod.rs"]
mod fixtures;

mod t10_three_node_commit;
