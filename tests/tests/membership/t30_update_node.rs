use std::time::Duration;

use anyhow::Result;
use multiraft::Event;
use multiraft::MembershipChange;

use crate::fixtures::cid;
use crate::fixtures::init_tracing;
use crate::fixtures::ut_config;
use crate::fixtures::LoopRouter;

/// An update change carries opaque member metadata through the log without
/// touching the peer set; the group keeps working afterwards.
#[tokio::test]
async fn update_node_passes_through() -> Result<()> {
    init_tracing();

    let mut router = LoopRouter::new(ut_config());
    router.add_node(1)?;
    router.add_node(2)?;
    router.new_group(1, &[1, 2]).await?;

    let leader = router.wait_leader(1, 1, ttl()).await?;
    let leaders_before = router.node(leader).leaders();

    router
        .node(leader)
        .change_group_membership(
            1,
            cid("upd-2"),
            MembershipChange::UpdateNode,
            2,
            b"new-address".to_vec(),
        )
        .await?;

    for member in [1, 2] {
        let (kind, changed, payload) =
            router.ack_membership(member, &cid("upd-2"), ttl()).await?;
        assert_eq!(MembershipChange::UpdateNode, kind);
        assert_eq!(2, changed);
        assert_eq!(b"new-address".to_vec(), payload);
    }

    // Leadership and membership are untouched.
    assert_eq!(leaders_before, router.node(leader).leaders());

    // The group still commits.
    router
        .node(leader)
        .submit_command(1, cid("cmd-after"), b"v".to_vec())
        .await?;
    router
        .wait_event(leader, ttl(), "command after update", |event| {
            matches!(
                event,
                Event::CommandCommitted { command_id, .. }
                    if command_id == &cid("cmd-after")
            )
        })
        .await?;

    router.shutdown().await;
    Ok(())
}

fn ttl() -> Duration {
    Duration::from_secs(10)
}
