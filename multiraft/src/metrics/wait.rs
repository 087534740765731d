use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::message::GroupId;
use crate::message::NodeId;
use crate::metrics::Metrics;

/// Error variants related to waiting on metrics.
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("timeout after {0:?} when {1}")]
    Timeout(Duration, String),

    #[error("multiraft is shutting down")]
    ShuttingDown,
}

/// Waits for the metrics snapshot to satisfy a condition, or times out.
pub struct Wait {
    pub timeout: Duration,
    pub rx: watch::Receiver<Metrics>,
}

impl Wait {
    /// Wait for metrics to satisfy `func` or time out.
    pub async fn metrics<T>(
        &self,
        func: T,
        msg: impl ToString,
    ) -> Result<Metrics, WaitError>
    where
        T: Fn(&Metrics) -> bool,
    {
        let timeout_at = Instant::now() + self.timeout;

        let mut rx = self.rx.clone();
        loop {
            let latest = rx.borrow().clone();

            tracing::debug!(
                "id={} wait {} latest: {}",
                latest.id,
                msg.to_string(),
                latest
            );

            if func(&latest) {
                return Ok(latest);
            }

            let now = Instant::now();
            if now >= timeout_at {
                return Err(WaitError::Timeout(
                    self.timeout,
                    format!("{} latest: {}", msg.to_string(), latest),
                ));
            }

            tokio::select! {
                _ = tokio::time::sleep_until(timeout_at) => {
                    return Err(WaitError::Timeout(
                        self.timeout,
                        format!("{} latest: {}", msg.to_string(), latest),
                    ));
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(WaitError::ShuttingDown);
                    }
                }
            }
        }
    }

    /// Wait for a group's last-known leader to become `leader_id`.
    pub async fn group_leader(
        &self,
        group_id: GroupId,
        leader_id: NodeId,
        msg: impl ToString,
    ) -> Result<Metrics, WaitError> {
        self.metrics(
            |m| m.leaders.get(&group_id) == Some(&leader_id),
            format!(
                "{} .leaders[{}] == {}",
                msg.to_string(),
                group_id,
                leader_id
            ),
        )
        .await
    }

    /// Wait for the live group count to become `count`.
    pub async fn groups(
        &self,
        count: u64,
        msg: impl ToString,
    ) -> Result<Metrics, WaitError> {
        self.metrics(
            |m| m.groups == count,
            format!("{} .groups == {}", msg.to_string(), count),
        )
        .await
    }
}
