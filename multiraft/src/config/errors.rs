use anyerror::AnyError;

/// Error variants related to configuration.
#[derive(Debug, Clone, thiserror::Error)]
#[derive(PartialEq, Eq)]
pub enum ConfigError {
    #[error("ParseError: {source} while parsing ({args:?})")]
    ParseError { source: AnyError, args: Vec<String> },

    #[error("node id must not be 0")]
    InvalidNodeId,

    #[error("election_timeout_ticks must be > 0")]
    ElectionTimeoutTicks,

    #[error("heartbeat_interval_ticks must be > 0")]
    HeartbeatIntervalTicks,

    #[error("tick_interval_ms must be > 0")]
    TickInterval,

    /// Heartbeats must fit several times into one election timeout, or every
    /// quiet interval turns into an election.
    #[error("heartbeat_interval_ticks({heartbeat_interval_ticks}) must be < election_timeout_ticks({election_timeout_ticks})")]
    HeartbeatGEElection {
        heartbeat_interval_ticks: usize,
        election_timeout_ticks: usize,
    },

    #[error("max_inflight_msgs must be > 0")]
    MaxInflightMsgs,
}
