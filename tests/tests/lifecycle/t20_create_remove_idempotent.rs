use std::time::Duration;

use anyhow::Result;
use multiraft::Error;
use multiraft::Event;

use crate::fixtures::cid;
use crate::fixtures::init_tracing;
use crate::fixtures::ut_config;
use crate::fixtures::LoopRouter;

/// Group creation and removal are both idempotent, and a double create
/// leaves a single live, functional group behind.
#[tokio::test]
async fn create_and_remove_are_idempotent() -> Result<()> {
    init_tracing();

    let mut router = LoopRouter::new(ut_config());
    router.add_node(1)?;
    router.seed_group(1, &[1]);

    let node = router.node(1).clone();

    node.create_group(1).await?;
    node.create_group(1).await?;

    router
        .node(1)
        .wait(Some(Duration::from_secs(5)))
        .groups(1, "one live group after double create")
        .await?;

    // The group still works: a command commits.
    node.submit_command(1, cid("cmd-live"), b"v".to_vec()).await?;
    router
        .wait_event(1, Duration::from_secs(5), "command committed", |event| {
            matches!(
                event,
                Event::CommandCommitted { command_id, .. }
                    if command_id == &cid("cmd-live")
            )
        })
        .await?;

    node.remove_group(1).await?;
    node.remove_group(1).await?;

    router
        .node(1)
        .wait(Some(Duration::from_secs(5)))
        .groups(0, "no live group after remove")
        .await?;

    // A proposal against the removed group fails the caller.
    let res = node.submit_command(1, cid("cmd-gone"), b"v".to_vec()).await;
    assert_eq!(Err(Error::GroupNotFound(1)), res);

    router.shutdown().await;
    Ok(())
}
