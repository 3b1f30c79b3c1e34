use pkg_state::{StoreError, StoreOp};
use pkg_types::kind::Kind;
use pkg_types::meta::ObjectKey;
use pkg_types::resources::ResourceName;
use thiserror::Error;

/// Errors raised while reconciling a topology.
#[derive(Debug, Error)]
pub enum Error {
    /// A replset carries a quantity that cannot be parsed or a request above its limit.
    #[error("replset '{replset}': invalid {resource} value '{value}': {message}")]
    ResourceSpecInvalid {
        replset: String,
        resource: ResourceName,
        value: String,
        message: String,
    },

    /// A replset name or size that cannot produce valid child objects.
    #[error("replset '{replset}': {message}")]
    InvalidReplset { replset: String, message: String },

    #[error("platform resolution failed: {0}")]
    PlatformResolutionFailed(#[source] StoreError),

    /// The version endpoint answered with a body that is not JSON.
    #[error("platform resolution failed: malformed response from {path}: {source}")]
    MalformedVersion {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to {op} {kind} '{name}': {source}")]
    ChildObjectOpFailed {
        op: StoreOp,
        kind: Kind,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to update status of {topology}: {source}")]
    StatusUpdateFailed {
        topology: ObjectKey,
        #[source]
        source: StoreError,
    },

    /// A watchdog poll failed; retried on the next cycle.
    #[error("watchdog poll for {topology} failed: {source}")]
    WatchdogPollTransient {
        topology: ObjectKey,
        #[source]
        source: StoreError,
    },

    #[error("initiating replset '{replset}' of {topology} failed: {source}")]
    InitiateFailed {
        topology: ObjectKey,
        replset: String,
        #[source]
        source: StoreError,
    },
}

impl Error {
    pub fn child_op(op: StoreOp, kind: Kind, name: impl Into<String>, source: StoreError) -> Self {
        Self::ChildObjectOpFailed {
            op,
            kind,
            name: name.into(),
            source,
        }
    }

    /// Errors confined to one replset; siblings still reconcile.
    pub fn is_replset_local(&self) -> bool {
        matches!(
            self,
            Error::ResourceSpecInvalid { .. } | Error::InvalidReplset { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_object() {
        let err = Error::ResourceSpecInvalid {
            replset: "rs0".to_string(),
            resource: ResourceName::Cpu,
            value: "abc".to_string(),
            message: "invalid number".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "replset 'rs0': invalid cpu value 'abc': invalid number"
        );
        assert!(err.is_replset_local());

        let err = Error::child_op(
            StoreOp::Create,
            Kind::StatefulSet,
            "db-rs0",
            StoreError::Forbidden("no".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "failed to create StatefulSet 'db-rs0': forbidden: no"
        );
        assert!(!err.is_replset_local());
    }
}
