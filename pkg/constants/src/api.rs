//! Platform API constants: resource kinds, groups and discovery paths.

// ─── Topology custom resource ────────────────────────────────────────────

/// `apiVersion` of the topology custom resource.
pub const PSMDB_API_VERSION: &str = "psmdb.percona.com/v1alpha1";

/// `kind` of the topology custom resource.
pub const PSMDB_KIND: &str = "PerconaServerMongoDB";

/// Plural resource name used in REST paths.
pub const PSMDB_PLURAL: &str = "perconaservermongodbs";

// ─── Built-in kinds ──────────────────────────────────────────────────────

pub const CORE_API_VERSION: &str = "v1";
pub const APPS_API_VERSION: &str = "apps/v1";

// ─── Discovery ───────────────────────────────────────────────────────────

/// Generic server version endpoint.
pub const VERSION_PATH: &str = "/version";

/// OpenShift extended version endpoint, queried after the generic one.
pub const OPENSHIFT_VERSION_PATH: &str = "/version/openshift";

// ─── Connection ──────────────────────────────────────────────────────────

/// In-cluster API server address.
pub const DEFAULT_API_SERVER: &str = "https://kubernetes.default.svc";

/// Namespace watched when neither flags, config nor the service account name one.
pub const DEFAULT_NAMESPACE: &str = "default";
