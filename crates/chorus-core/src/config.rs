use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    /// Name used in log lines to identify this engine instance.
    pub node_name: String,
    /// Spawn the bus-to-registry dispatcher. Disabled on hosts that only
    /// produce messages and run no push sockets.
    pub enable_push_dispatch: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            node_name: "chorus".to_string(),
            enable_push_dispatch: true,
        }
    }
}
