//! Metric names recorded by the registry and the server.
//!
//! Recording goes through the `metrics` facade; without an installed recorder
//! every call is a no-op.

/// WebSocket memberships registered (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket memberships removed, by the handler or by eviction (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Currently registered memberships (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Broadcast calls that reached at least one member (counter).
pub const WS_BROADCASTS_TOTAL: &str = "ws_broadcasts_total";
/// Frames successfully written to a member (counter, labels: kind).
pub const WS_FRAMES_RELAYED_TOTAL: &str = "ws_frames_relayed_total";
/// Writes that failed and evicted their member (counter).
pub const WS_DELIVERY_FAILURES_TOTAL: &str = "ws_delivery_failures_total";
/// Upgrade attempts refused before registration (counter, labels: reason).
pub const WS_UPGRADES_REJECTED_TOTAL: &str = "ws_upgrades_rejected_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_BROADCASTS_TOTAL,
            WS_FRAMES_RELAYED_TOTAL,
            WS_DELIVERY_FAILURES_TOTAL,
            WS_UPGRADES_REJECTED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
