//! Well-known connection spec and capability names.

/// Name of the connection spec consulted for every connect.
pub const CONNECTOR_SPEC: &str = "switchboard:connector";

/// Wildcard peer name in `requires` and wildcard capability/interface grant.
pub const WILDCARD: &str = "*";

/// Connect on behalf of a different user.
pub const USER_ID_CAPABILITY: &str = "switchboard:user_id";

/// Connect to a non-default instance qualifier.
pub const INSTANCE_NAME_CAPABILITY: &str = "switchboard:instance_name";

/// Register an externally launched client process.
pub const CLIENT_PROCESS_CAPABILITY: &str = "switchboard:client_process";

/// One instance shared by all users, owned by a fresh synthetic user.
pub const ALL_USERS_CAPABILITY: &str = "switchboard:all_users";

/// One instance shared by all users, run as the root user.
pub const SINGLETON_CAPABILITY: &str = "switchboard:singleton";

/// Callers must name real capabilities; wildcard grants are ignored.
pub const EXPLICIT_CLASS_CAPABILITY: &str = "switchboard:explicit_class";

/// Capability a package exposes so the broker can create its services.
pub const SERVICE_FACTORY_CAPABILITY: &str = "switchboard:service_factory";

/// Interface behind [`SERVICE_FACTORY_CAPABILITY`].
pub const SERVICE_FACTORY_INTERFACE: &str = "switchboard.ServiceFactory";
