use std::time::Duration;

use anyhow::Result;
use multiraft::Event;

use crate::fixtures::cid;
use crate::fixtures::init_tracing;
use crate::fixtures::ut_config;
use crate::fixtures::LoopRouter;

/// A command submitted on the leader commits on all three nodes at the same
/// index, and every completion fires without error.
#[tokio::test]
async fn three_node_commit() -> Result<()> {
    init_tracing();

    let mut router = LoopRouter::new(ut_config());
    for id in [1, 2, 3] {
        router.add_node(id)?;
    }
    router.new_group(1, &[1, 2, 3]).await?;

    let leader = router.wait_leader(1, 1, timeout()).await?;
    assert!(
        [1, 2, 3].contains(&leader),
        "leader must be a member, got {}",
        leader
    );

    router
        .node(leader)
        .submit_command(1, cid("cmd-a"), b"hello".to_vec())
        .await?;

    let mut indexes = Vec::new();
    for node_id in [1, 2, 3] {
        let event = router
            .wait_event(node_id, timeout(), "command committed", |event| {
                matches!(
                    event,
                    Event::CommandCommitted { command_id, .. }
                        if command_id == &cid("cmd-a")
                )
            })
            .await?;

        match event {
            Event::CommandCommitted {
                group_id,
                payload,
                index,
                ..
            } => {
                assert_eq!(1, group_id);
                assert_eq!(b"hello".to_vec(), payload);
                assert!(index > 0);
                indexes.push(index);
            }
            _ => unreachable!(),
        }
    }

    assert_eq!(indexes[0], indexes[1]);
    assert_eq!(indexes[0], indexes[2]);

    // Commit order: a second command lands at a strictly higher index.
    router
        .node(leader)
        .submit_command(1, cid("cmd-b"), b"world".to_vec())
        .await?;
    let event = router
        .wait_event(leader, timeout(), "second commit", |event| {
            matches!(
                event,
                Event::CommandCommitted { command_id, .. }
                    if command_id == &cid("cmd-b")
            )
        })
        .await?;
    match event {
        Event::CommandCommitted { index, .. } => {
            assert!(index > indexes[0]);
        }
        _ => unreachable!(),
    }

    router.shutdown().await;
    Ok(())
}

fn timeout() -> Duration {
    Duration::from_secs(10)
}
