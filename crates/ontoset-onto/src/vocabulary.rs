//! Member names the rule layer reads, and the stereotypes it knows.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Member naming the set an anti-rigid sortal requires its bearers to be.
pub const SPECIALIZATION_OF: &str = "specializationOf";

/// Member grouping phases into one mutually exclusive group.
pub const PHASE_GROUP_ID: &str = "phaseGroupId";

/// Member naming the back reference a relator installs on its parts.
pub const RELATOR_PROPERTY_ID: &str = "relatorPropertyId";

/// The stereotype a domain classifier is rendered and grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stereotype {
    Kind,
    Role,
    Phase,
    Relator,
}

impl Stereotype {
    pub const ALL: [Stereotype; 4] = [
        Stereotype::Kind,
        Stereotype::Role,
        Stereotype::Phase,
        Stereotype::Relator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stereotype::Kind => "kind",
            Stereotype::Role => "role",
            Stereotype::Phase => "phase",
            Stereotype::Relator => "relator",
        }
    }

    /// Fill color used by model views.
    pub fn color(&self) -> &'static str {
        match self {
            Stereotype::Kind => "#8888dd",
            Stereotype::Role => "#88dddd",
            Stereotype::Phase => "#cccccc",
            Stereotype::Relator => "#dd8888",
        }
    }
}

impl fmt::Display for Stereotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
