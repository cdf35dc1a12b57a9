//! Node configuration.

use chronosync_sync::SyncConfig;

/// Configuration for a hosted node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Engine configuration.
    pub sync: SyncConfig,
    /// Capacity of the command channel between handles and the node task.
    pub command_buffer: usize,
}

impl NodeConfig {
    pub fn new(sync: SyncConfig) -> Self {
        Self {
            sync,
            command_buffer: 32,
        }
    }

    pub fn with_command_buffer(mut self, capacity: usize) -> Self {
        self.command_buffer = capacity.max(1);
        self
    }
}
