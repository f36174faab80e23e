//! Signal K path to MQTT topic mapping

use serde::{Deserialize, Serialize};

/// Topic used for every update in [`RoutingMode::SingleTopic`]
pub const SINGLE_TOPIC: &str = "signalk";

/// How outbound topics are derived from update paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingMode {
    /// `navigation.speedOverGround` -> `navigation/speedOverGround`
    PerPathTopic,
    /// Everything goes to [`SINGLE_TOPIC`]
    SingleTopic,
}

/// Map an update path to its outbound topic.
///
/// Callers are expected to reject empty paths beforehand.
pub fn map_topic(path: &str, mode: RoutingMode) -> String {
    match mode {
        RoutingMode::PerPathTopic => path.replace('.', "/"),
        RoutingMode::SingleTopic => SINGLE_TOPIC.to_string(),
    }
}
