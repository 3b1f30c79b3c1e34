//! mongod container and replset defaults.

// ─── Image ───────────────────────────────────────────────────────────────

/// Image repository used when the topology does not override it.
pub const DEFAULT_IMAGE: &str = "percona/percona-server-mongodb";

/// Image tag used when `spec.version` is empty.
pub const DEFAULT_VERSION: &str = "3.6";

// ─── Container ───────────────────────────────────────────────────────────

pub const MONGOD_CONTAINER_NAME: &str = "mongod";

/// Name of the mongod container port.
pub const MONGOD_PORT_NAME: &str = "mongodb";

pub const DEFAULT_MONGOD_PORT: i32 = 27017;

/// UID the mongod process runs as on plain Kubernetes.
pub const DEFAULT_RUN_UID: i64 = 1001;

pub const MONGOD_DATA_VOLUME: &str = "mongod-data";
pub const MONGOD_DATA_DIR: &str = "/data/db";

/// Storage requested for the data volume when no storage quantity is set.
pub const DEFAULT_STORAGE_SIZE: &str = "3Gi";

// ─── Secrets ─────────────────────────────────────────────────────────────

/// Appended to the topology name when `spec.secrets.key` is unset.
pub const DEFAULT_KEY_SECRET_SUFFIX: &str = "mongodb-key";
pub const DEFAULT_USERS_SECRET_NAME: &str = "percona-server-mongodb-users";

/// Key inside the key Secret holding the replset key file.
pub const KEY_SECRET_DATA_KEY: &str = "mongodb-key";

pub const KEY_SECRET_VOLUME: &str = "mongodb-key";
pub const KEY_SECRET_MOUNT_DIR: &str = "/etc/mongodb-secrets";

/// File mode of the mounted key file (0400).
pub const KEY_FILE_MODE: i32 = 0o400;

/// Keys read from the users Secret; each is exposed to mongod as an env var of the same name.
pub const USERS_SECRET_KEYS: &[&str] = &[
    "MONGODB_BACKUP_USER",
    "MONGODB_BACKUP_PASSWORD",
    "MONGODB_CLUSTER_ADMIN_USER",
    "MONGODB_CLUSTER_ADMIN_PASSWORD",
    "MONGODB_CLUSTER_MONITOR_USER",
    "MONGODB_CLUSTER_MONITOR_PASSWORD",
    "MONGODB_USER_ADMIN_USER",
    "MONGODB_USER_ADMIN_PASSWORD",
];

// ─── Replsets ────────────────────────────────────────────────────────────

/// Cluster DNS suffix used to build member host names.
pub const CLUSTER_DOMAIN: &str = "svc.cluster.local";

/// Shell binary used to run replset commands inside the mongod container.
pub const MONGO_SHELL: &str = "mongo";

/// Server error code `AlreadyInitialized`, returned by `replSetInitiate`
/// on a member that already holds a replset config.
pub const ALREADY_INITIALIZED_CODE: i32 = 23;
