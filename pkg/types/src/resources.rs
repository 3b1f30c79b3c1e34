use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::quantity::Quantity;

/// A resource dimension a replset can bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceName {
    Cpu,
    Memory,
    Storage,
}

impl std::fmt::Display for ResourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceName::Cpu => write!(f, "cpu"),
            ResourceName::Memory => write!(f, "memory"),
            ResourceName::Storage => write!(f, "storage"),
        }
    }
}

pub type ResourceList = BTreeMap<ResourceName, Quantity>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: ResourceList,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: ResourceList,
}

impl ResourceRequirements {
    /// Keep only the given dimensions, in both limits and requests.
    pub fn retain(&self, names: &[ResourceName]) -> Self {
        let pick = |list: &ResourceList| -> ResourceList {
            list.iter()
                .filter(|(name, _)| names.contains(*name))
                .map(|(name, q)| (*name, q.clone()))
                .collect()
        };
        Self {
            limits: pick(&self.limits),
            requests: pick(&self.requests),
        }
    }
}
