//! Label keys and values stamped on every managed object.

/// Label key naming the product that manages the object.
pub const APP_LABEL: &str = "app";

/// Value of [`APP_LABEL`] on every managed object.
pub const APP_NAME: &str = "percona-server-mongodb";

/// Label key carrying the owning topology's name.
pub const CR_LABEL: &str = "percona-server-mongodb_cr";

/// Label key carrying the replset name.
pub const REPLSET_LABEL: &str = "replset";
