//! Event types for the broker event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchboard_core::{ConnectResult, Identity, Pid};
use uuid::Uuid;

use crate::info::RunningServiceInfo;

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Component that generated the event.
    pub source: String,
}

impl EventMetadata {
    /// Create new event metadata.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// Everything the broker reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerEvent {
    /// The broker loop is running.
    BrokerStarted {
        /// Event metadata.
        metadata: EventMetadata,
        /// Broker version.
        version: String,
    },

    /// The broker loop has exited.
    BrokerStopped {
        /// Event metadata.
        metadata: EventMetadata,
    },

    /// An instance was created.
    ServiceCreated {
        /// Event metadata.
        metadata: EventMetadata,
        /// Snapshot at creation.
        service: RunningServiceInfo,
    },

    /// An instance's service acknowledged start.
    ServiceStarted {
        /// Event metadata.
        metadata: EventMetadata,
        /// Instance identity.
        identity: Identity,
        /// Process id known so far.
        pid: Option<Pid>,
    },

    /// A runner reported the process id of an instance.
    ServicePidReceived {
        /// Event metadata.
        metadata: EventMetadata,
        /// Instance identity.
        identity: Identity,
        /// Process id.
        pid: Pid,
    },

    /// An instance could not be started.
    ServiceFailedToStart {
        /// Event metadata.
        metadata: EventMetadata,
        /// Instance identity.
        identity: Identity,
    },

    /// An instance was destroyed.
    ServiceStopped {
        /// Event metadata.
        metadata: EventMetadata,
        /// Instance identity.
        identity: Identity,
    },

    /// A connect was refused by policy or validation.
    ConnectionRefused {
        /// Event metadata.
        metadata: EventMetadata,
        /// Requesting identity.
        source: Identity,
        /// Requested target.
        target: Identity,
        /// Why it was refused.
        result: ConnectResult,
    },
}

impl BrokerEvent {
    /// Event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BrokerStarted { .. } => "broker_started",
            Self::BrokerStopped { .. } => "broker_stopped",
            Self::ServiceCreated { .. } => "service_created",
            Self::ServiceStarted { .. } => "service_started",
            Self::ServicePidReceived { .. } => "service_pid_received",
            Self::ServiceFailedToStart { .. } => "service_failed_to_start",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::ConnectionRefused { .. } => "connection_refused",
        }
    }

    /// Event metadata.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::BrokerStarted { metadata, .. }
            | Self::BrokerStopped { metadata }
            | Self::ServiceCreated { metadata, .. }
            | Self::ServiceStarted { metadata, .. }
            | Self::ServicePidReceived { metadata, .. }
            | Self::ServiceFailedToStart { metadata, .. }
            | Self::ServiceStopped { metadata, .. }
            | Self::ConnectionRefused { metadata, .. } => metadata,
        }
    }

    /// The instance this event is about, if it is about one.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::ServiceCreated { service, .. } => Some(&service.identity),
            Self::ServiceStarted { identity, .. }
            | Self::ServicePidReceived { identity, .. }
            | Self::ServiceFailedToStart { identity, .. }
            | Self::ServiceStopped { identity, .. } => Some(identity),
            Self::ConnectionRefused { target, .. } => Some(target),
            Self::BrokerStarted { .. } | Self::BrokerStopped { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use switchboard_core::ROOT_USER_GUID;

    use super::*;

    #[test]
    fn test_serializes_with_type_tag() {
        let event = BrokerEvent::ServicePidReceived {
            metadata: EventMetadata::new("broker"),
            identity: Identity::new("fetcher", ROOT_USER_GUID),
            pid: 42,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "service_pid_received");
        assert_eq!(json["pid"], 42);
        assert_eq!(event.identity().unwrap().name(), "fetcher");
    }

    #[test]
    fn test_broker_events_have_no_identity() {
        let event = BrokerEvent::BrokerStopped {
            metadata: EventMetadata::default(),
        };
        assert!(event.identity().is_none());
        assert_eq!(event.metadata().source, "unknown");
    }
}
