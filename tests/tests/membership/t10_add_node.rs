use std::time::Duration;

use anyhow::Result;
use multiraft::Event;
use multiraft::MembershipChange;
use raft::eraftpb::MessageType;

use crate::fixtures::cid;
use crate::fixtures::init_tracing;
use crate::fixtures::ut_config;
use crate::fixtures::LoopRouter;

/// Adding a node: once the change commits and the members acknowledge it,
/// the new node is pulled into the group (via snapshot), heartbeats fan out
/// to it, and new commands commit on it.
#[tokio::test]
async fn add_node_joins_group() -> Result<()> {
    init_tracing();

    let mut router = LoopRouter::new(ut_config());
    for id in [1, 2, 3] {
        router.add_node(id)?;
    }
    // Group 1 starts on nodes 1 and 2 only; node 3 runs empty.
    router.new_group(1, &[1, 2]).await?;

    let leader = router.wait_leader(1, 1, ttl()).await?;

    router
        .node(leader)
        .change_group_membership(
            1,
            cid("add-3"),
            MembershipChange::AddNode,
            3,
            b"join-ctx".to_vec(),
        )
        .await?;

    for member in [1, 2] {
        let (kind, changed, payload) =
            router.ack_membership(member, &cid("add-3"), ttl()).await?;
        assert_eq!(MembershipChange::AddNode, kind);
        assert_eq!(3, changed);
        assert_eq!(b"join-ctx".to_vec(), payload);
    }

    // New traffic makes the leader replicate to the added node, which
    // creates the group lazily and restores from a snapshot.
    router
        .node(leader)
        .submit_command(1, cid("cmd-after"), b"v".to_vec())
        .await?;

    router
        .node(3)
        .wait(Some(ttl()))
        .group_leader(1, leader, "added node catches up and sees the leader")
        .await?;

    // Entries committed after the join replicate and apply normally.
    router
        .node(leader)
        .submit_command(1, cid("cmd-late"), b"w".to_vec())
        .await?;
    let event = router
        .wait_event(3, ttl(), "command on added node", |event| {
            matches!(
                event,
                Event::CommandCommitted { command_id, .. }
                    if command_id == &cid("cmd-late")
            )
        })
        .await?;
    match event {
        Event::CommandCommitted { payload, .. } => {
            assert_eq!(b"w".to_vec(), payload);
        }
        _ => unreachable!(),
    }

    // Heartbeats now target the new peer.
    router.net.reset_counters();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        router.net.sent_count(leader, 3, MessageType::MsgHeartbeat) >= 1,
        "added node must receive coalesced heartbeats"
    );

    router.shutdown().await;
    Ok(())
}

fn ttl() -> Duration {
    Duration::from_secs(10)
}
