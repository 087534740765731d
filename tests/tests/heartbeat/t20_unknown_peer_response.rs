use std::time::Duration;

use anyhow::Result;
use raft::eraftpb::MessageType;

use crate::fixtures::init_tracing;
use crate::fixtures::manual_tick_config;
use crate::fixtures::LoopRouter;

/// A heartbeat from a peer we share no groups with is not fanned out, but it
/// is answered with a bare response so the sender's recovery timer can
/// restart. The unknown peer is not registered.
#[tokio::test]
async fn unknown_peer_heartbeat_gets_bare_response() -> Result<()> {
    init_tracing();

    let mut router = LoopRouter::new(manual_tick_config());
    router.add_node(1)?;
    router.add_node(2)?;

    // Node 2 believes it shares group 1 with node 1; node 1 knows nothing.
    router.seed_group_on(2, 1, &[1, 2]);
    router.node(2).create_group(1).await?;

    // One heartbeat interval on node 2 emits its coalesced heartbeat to
    // node 1.
    router.tick_node(2, 3).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(router.net.sent_count(2, 1, MessageType::MsgHeartbeat) >= 1);
    // Node 1 answered with a bare response despite not knowing node 2.
    assert!(
        router.net.sent_count(1, 2, MessageType::MsgHeartbeatResponse) >= 1
    );

    // And node 1 still has no groups: the heartbeat created nothing.
    let metrics = router.node(1).metrics().borrow().clone();
    assert_eq!(0, metrics.groups);

    router.shutdown().await;
    Ok(())
}
