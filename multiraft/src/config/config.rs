use std::time::Duration;

use anyerror::AnyError;
use clap::Parser;

use crate::config::errors::ConfigError;

/// The runtime configuration for a multiraft coordinator.
///
/// Time is logical: one tick is the unit every embedded Raft timer counts in,
/// and `tick_interval_ms` maps it onto the wall clock. The defaults suit a
/// cluster on a low-latency network; geographically distributed installations
/// should raise `election_timeout_ticks` to account for the longer round trip.
///
/// The effective election timeout of each group is randomized by the embedded
/// Raft within `[election_timeout_ticks, 2 * election_timeout_ticks)` to keep
/// simultaneous candidacies unlikely.
#[derive(Clone, Debug, Parser)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Number of ticks without contact from a leader after which a group
    /// calls a new election.
    #[clap(long, default_value = "10")]
    pub election_timeout_ticks: usize,

    /// Number of ticks between two coalesced heartbeats to each peer. The
    /// same value is handed to each embedded Raft as its heartbeat tick.
    #[clap(long, default_value = "3")]
    pub heartbeat_interval_ticks: usize,

    /// Milliseconds between two logical ticks.
    #[clap(long, default_value = "100")]
    pub tick_interval_ms: u64,

    /// Upper bound, in bytes, on the payload of a single outbound append
    /// message of one group.
    #[clap(long, default_value = "1048576")]
    pub max_size_per_msg: u64,

    /// Maximum number of in-flight append messages a group keeps per peer.
    #[clap(long, default_value = "256")]
    pub max_inflight_msgs: usize,

    /// Enable or disable the tick worker.
    ///
    /// With ticking disabled no timer-based event fires: no group enters
    /// candidate state on its own and no coalesced heartbeat is emitted.
    /// Tests drive logical time through `MultiRaft::tick` instead.
    // clap 4 requires `num_args = 0..=1`, or it complains about missing arg
    // error https://github.com/clap-rs/clap/discussions/4374
    #[clap(long,
           default_value_t = true,
           action = clap::ArgAction::Set,
           num_args = 0..=1,
           default_missing_value = "true"
    )]
    pub enable_tick: bool,

    /// Promote selected warnings to panics. Meant for tests.
    #[clap(long,
           default_value_t = false,
           action = clap::ArgAction::Set,
           num_args = 0..=1,
           default_missing_value = "true"
    )]
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        <Self as Parser>::parse_from(Vec::<&'static str>::new())
    }
}

impl Config {
    /// Build a `Config` instance from a series of command line arguments.
    ///
    /// The first element in `args` must be the application name.
    pub fn build(args: &[&str]) -> Result<Config, ConfigError> {
        let config = <Self as Parser>::try_parse_from(args).map_err(|e| {
            ConfigError::ParseError {
                source: AnyError::from(&e),
                args: args.iter().map(|x| x.to_string()).collect(),
            }
        })?;
        config.validate()
    }

    /// Validate the state of this config, consuming it.
    pub fn validate(self) -> Result<Config, ConfigError> {
        self.verify()?;
        Ok(self)
    }

    /// Validate without consuming; used where the config is already shared.
    pub fn verify(&self) -> Result<(), ConfigError> {
        if self.election_timeout_ticks == 0 {
            return Err(ConfigError::ElectionTimeoutTicks);
        }

        if self.heartbeat_interval_ticks == 0 {
            return Err(ConfigError::HeartbeatIntervalTicks);
        }

        if self.tick_interval_ms == 0 {
            return Err(ConfigError::TickInterval);
        }

        if self.heartbeat_interval_ticks >= self.election_timeout_ticks {
            return Err(ConfigError::HeartbeatGEElection {
                heartbeat_interval_ticks: self.heartbeat_interval_ticks,
                election_timeout_ticks: self.election_timeout_ticks,
            });
        }

        if self.max_inflight_msgs == 0 {
            return Err(ConfigError::MaxInflightMsgs);
        }

        Ok(())
    }

    /// The wall-clock interval between two logical ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
