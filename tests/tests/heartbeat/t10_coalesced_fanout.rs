use std::time::Duration;

use anyhow::Result;
use multiraft::Event;
use raft::eraftpb::MessageType;

use crate::fixtures::init_tracing;
use crate::fixtures::manual_tick_config;
use crate::fixtures::LoopRouter;

/// With node 1 leading three groups shared with node 2, one heartbeat
/// interval moves exactly one heartbeat 1->2 and one response 2->1 over the
/// wire, regardless of the group count; and the fan-out keeps all of node
/// 2's groups from starting elections.
#[tokio::test]
async fn coalesced_heartbeat_fanout() -> Result<()> {
    init_tracing();

    let mut router = LoopRouter::new(manual_tick_config());
    router.add_node(1)?;
    router.add_node(2)?;

    for group_id in [1, 2, 3] {
        router.new_group(group_id, &[1, 2]).await?;
    }

    // Only node 1 ticks, so only node 1 can campaign. Its election fires at
    // a random point within [10, 20) ticks per group.
    router.tick_node(1, 25).await?;

    for group_id in [1, 2, 3] {
        router
            .node(2)
            .wait(Some(ttl()))
            .group_leader(group_id, 1, "node 1 leads the shared group")
            .await?;
    }

    // Let the pipeline go quiet, then measure clean intervals.
    tokio::time::sleep(Duration::from_millis(100)).await;
    router.net.reset_counters();

    let intervals = 10u64;
    for _ in 0..intervals {
        // One heartbeat interval on both nodes. Node 2's timers tick too:
        // 30 ticks is well past its election timeout, so only the heartbeat
        // fan-out keeps its groups quiet.
        router.tick_all(3).await?;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let hb_1_to_2 = router.net.sent_count(1, 2, MessageType::MsgHeartbeat);
    let resp_2_to_1 =
        router.net.sent_count(2, 1, MessageType::MsgHeartbeatResponse);
    let resp_1_to_2 =
        router.net.sent_count(1, 2, MessageType::MsgHeartbeatResponse);

    // One wire message per direction per interval, not one per group.
    assert_eq!(
        intervals, hb_1_to_2,
        "exactly one coalesced heartbeat per interval"
    );
    assert_eq!(
        intervals, resp_2_to_1,
        "exactly one deduplicated response per interval"
    );
    // Node 2 leads nothing, so node 1 never answers its heartbeats.
    assert_eq!(0, resp_1_to_2);

    // No group on node 2 started an election: the fan-out reset its timers.
    router
        .expect_no_event(2, Duration::from_millis(500), "election on node 2", |event| {
            matches!(event, Event::LeaderElection { node_id, .. } if *node_id == 2)
        })
        .await?;

    router.shutdown().await;
    Ok(())
}

fn ttl() -> Duration {
    Duration::from_secs(10)
}
