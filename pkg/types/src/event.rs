use crate::meta::ObjectKey;
use crate::psmdb::PerconaServerMongoDB;

/// A lifecycle notification for one topology.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The topology was created or its spec/status changed (or is being re-delivered).
    Upserted(PerconaServerMongoDB),
    Deleted(PerconaServerMongoDB),
}

impl Event {
    /// Build an event from a feed notification of the form `{object, deleted}`.
    pub fn from_notification(object: PerconaServerMongoDB, deleted: bool) -> Self {
        if deleted {
            Event::Deleted(object)
        } else {
            Event::Upserted(object)
        }
    }

    pub fn object(&self) -> &PerconaServerMongoDB {
        match self {
            Event::Upserted(obj) | Event::Deleted(obj) => obj,
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::of(&self.object().metadata)
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Upserted(_) => write!(f, "Upserted({})", self.key()),
            Event::Deleted(_) => write!(f, "Deleted({})", self.key()),
        }
    }
}
