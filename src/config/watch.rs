use serde::Deserialize;
use serde::Serialize;

use crate::constants::INITIAL_BUFFERED_EVENTS_SIZE;
use crate::constants::INITIAL_WATCH_NODES_SIZE;
use crate::constants::UPDATE_CHANNEL_SIZE;
use crate::Error;
use crate::Result;

/// Queue and buffer sizing for watch subscriptions.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Capacity of every node's inbound and outbound queue
    #[serde(default = "default_update_channel_size")]
    pub update_channel_size: usize,

    /// Initial capacity of the node registry
    #[serde(default = "default_initial_watch_nodes_size")]
    pub initial_watch_nodes_size: usize,

    /// Initial capacity of a node's pre-start buffer
    #[serde(default = "default_initial_buffered_events_size")]
    pub initial_buffered_events_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            update_channel_size: default_update_channel_size(),
            initial_watch_nodes_size: default_initial_watch_nodes_size(),
            initial_buffered_events_size: default_initial_buffered_events_size(),
        }
    }
}

impl WatchConfig {
    /// # Errors
    /// Returns `Error::InvalidConfig` when the queue capacity is zero, which
    /// tokio channels cannot represent.
    pub fn validate(&self) -> Result<()> {
        if self.update_channel_size == 0 {
            return Err(Error::InvalidConfig(
                "watch.update_channel_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_update_channel_size() -> usize {
    UPDATE_CHANNEL_SIZE
}

fn default_initial_watch_nodes_size() -> usize {
    INITIAL_WATCH_NODES_SIZE
}

fn default_initial_buffered_events_size() -> usize {
    INITIAL_BUFFERED_EVENTS_SIZE
}
