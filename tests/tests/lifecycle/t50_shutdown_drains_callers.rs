use std::time::Duration;

use anyhow::Result;
use multiraft::Error;
use tokio::time::timeout;

use crate::fixtures::init_tracing;
use crate::fixtures::ut_config;
use crate::fixtures::LoopRouter;

/// Ops racing a shutdown complete instead of wedging: each either succeeds
/// or fails with the shutdown error.
#[tokio::test]
async fn shutdown_drains_concurrent_creates() -> Result<()> {
    init_tracing();

    let mut router = LoopRouter::new(ut_config());
    router.add_node(1)?;

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let node = router.node(1).clone();
            tokio::spawn(async move { node.create_group(10 + i).await })
        })
        .collect();

    router.shutdown().await;

    for handle in handles {
        let res = timeout(Duration::from_secs(5), handle)
            .await
            .expect("create_group deadlocked across shutdown")?;
        match res {
            Ok(()) | Err(Error::ShuttingDown) => {}
            Err(err) => panic!("unexpected error: {}", err),
        }
    }

    Ok(())
}

/// After the stopper has drained, new ops are refused outright.
#[tokio::test]
async fn ops_after_shutdown_fail_fast() -> Result<()> {
    init_tracing();

    let mut router = LoopRouter::new(ut_config());
    router.add_node(1)?;

    let node = router.node(1).clone();
    router.shutdown().await;

    let res = timeout(Duration::from_secs(5), node.create_group(1))
        .await
        .expect("create_group deadlocked after shutdown");
    assert_eq!(Err(Error::ShuttingDown), res);

    let res = timeout(Duration::from_secs(5), node.remove_group(1))
        .await
        .expect("remove_group deadlocked after shutdown");
    assert_eq!(Err(Error::ShuttingDown), res);

    Ok(())
}
