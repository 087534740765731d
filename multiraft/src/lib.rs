#![doc = include_str!("lib_readme.md")]
#![allow(clippy::bool_assert_comparison)]
#![allow(clippy::type_complexity)]
#![deny(unused_qualifications)]

mod config;
mod core;

pub mod base;
pub mod command;
pub mod errors;
pub mod event;
pub mod message;
pub mod metrics;
pub mod multiraft;
pub mod network;
pub mod state_machine;
pub mod storage;

pub use anyerror;
pub use anyerror::AnyError;

pub use crate::base::stopper::Stopper;
pub use crate::base::stopper::TaskGuard;
pub use crate::command::new_command_id;
pub use crate::command::CommandId;
pub use crate::command::COMMAND_ID_LEN;
pub use crate::config::Config;
pub use crate::config::ConfigError;
pub use crate::errors::Error;
pub use crate::errors::Fatal;
pub use crate::errors::NetworkError;
pub use crate::event::Event;
pub use crate::event::MembershipAck;
pub use crate::event::MembershipChange;
pub use crate::message::EntryFormatter;
pub use crate::message::GroupId;
pub use crate::message::NodeId;
pub use crate::message::RaftMessageRequest;
pub use crate::message::HEARTBEAT_GROUP_ID;
pub use crate::metrics::Metrics;
pub use crate::metrics::Wait;
pub use crate::metrics::WaitError;
pub use crate::multiraft::CommitReceiver;
pub use crate::multiraft::MultiRaft;
pub use crate::network::RaftMessageHandler;
pub use crate::network::Transport;
pub use crate::state_machine::StateMachine;
pub use crate::storage::GroupStorage;
pub use crate::storage::Storage;
