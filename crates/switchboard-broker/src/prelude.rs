//! Prelude module - commonly used types for convenient import.
//!
//! Use `use switchboard_broker::prelude::*;` to import all essential types.

// Broker
pub use crate::{BrokerBuilder, BrokerError, BrokerHandle, BrokerResult};

// Connections
pub use crate::{ClientProcessConnection, ConnectOutcome, ConnectParams, InterfaceRequest};

// Services
pub use crate::{
    Connector, InProcessRunner, NativeRunner, Service, ServiceContext, ServiceEndpoint,
    ServicePipe, SourceInfo, run_service,
};
