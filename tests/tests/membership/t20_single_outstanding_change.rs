use std::time::Duration;

use anyhow::Result;
use multiraft::Event;
use multiraft::MembershipChange;
use tokio::time::timeout;

use crate::fixtures::cid;
use crate::fixtures::init_tracing;
use crate::fixtures::ut_config;
use crate::fixtures::LoopRouter;

/// Only one membership change may be outstanding: a second change submitted
/// before the first is acknowledged is re-queued and commits only after the
/// acknowledgment.
#[tokio::test]
async fn second_change_waits_for_ack() -> Result<()> {
    init_tracing();

    let mut router = LoopRouter::new(ut_config());
    router.add_node(1)?;
    router.add_node(2)?;
    router.new_group(1, &[1, 2]).await?;

    let leader = router.wait_leader(1, 1, ttl()).await?;
    let follower = if leader == 1 { 2 } else { 1 };

    // First change commits; hold on to its ack without invoking it.
    let rx1 = router
        .node(leader)
        .change_group_membership_ff(
            1,
            cid("add-3"),
            MembershipChange::AddNode,
            3,
            vec![],
        )
        .await?;
    let res = timeout(ttl(), rx1).await.expect("first change never committed")?;
    assert_eq!(Ok(()), res);

    let first_event = router
        .wait_event(leader, ttl(), "first membership change", |event| {
            matches!(
                event,
                Event::MembershipChangeCommitted { command_id, .. }
                    if command_id == &cid("add-3")
            )
        })
        .await?;

    // Second change: parked while the first is unacknowledged.
    let rx2 = router
        .node(leader)
        .change_group_membership_ff(
            1,
            cid("add-4"),
            MembershipChange::AddNode,
            4,
            vec![],
        )
        .await?;

    router
        .expect_no_event(
            leader,
            Duration::from_millis(700),
            "premature second membership change",
            |event| {
                matches!(
                    event,
                    Event::MembershipChangeCommitted { command_id, .. }
                        if command_id == &cid("add-4")
                )
            },
        )
        .await?;

    // Acknowledge the first change everywhere; the parked change is
    // re-submitted and commits.
    match first_event {
        Event::MembershipChangeCommitted { ack, .. } => ack.ack(Ok(())).await,
        _ => unreachable!(),
    }
    router.ack_membership(follower, &cid("add-3"), ttl()).await?;

    let res = timeout(ttl(), rx2)
        .await
        .expect("second change never committed")?;
    assert_eq!(Ok(()), res);

    let (kind, changed, _) =
        router.ack_membership(leader, &cid("add-4"), ttl()).await?;
    assert_eq!(MembershipChange::AddNode, kind);
    assert_eq!(4, changed);
    router.ack_membership(follower, &cid("add-4"), ttl()).await?;

    router.shutdown().await;
    Ok(())
}

fn ttl() -> Duration {
    Duration::from_secs(10)
}
