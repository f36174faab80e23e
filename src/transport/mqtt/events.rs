//! Pure routing of rumqttc events
//!
//! The event-loop driver only needs to know a handful of things about each
//! polled event; everything else is infrastructure noise logged at trace level.

use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::Event;
use rumqttc::Outgoing;

/// Routing decisions for polled MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// ConnAck received, link is usable
    ConnectionAcknowledged,
    /// Broker sent DISCONNECT
    DisconnectedByBroker,
    /// Our own DISCONNECT left the client
    DisconnectSent,
    /// Anything else (PingResp, PubAck, outgoing publishes, ...)
    Infrastructure(String),
}

/// Route an MQTT event (pure function)
pub fn route_mqtt_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => EventRoute::ConnectionAcknowledged,
        Event::Incoming(Packet::Disconnect(disconnect)) => {
            tracing::debug!(reason = ?disconnect.reason_code, "Broker sent DISCONNECT");
            EventRoute::DisconnectedByBroker
        }
        Event::Incoming(other) => EventRoute::Infrastructure(format!("{other:?}")),
        Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
        Event::Outgoing(other) => EventRoute::Infrastructure(format!("{other:?}")),
    }
}
