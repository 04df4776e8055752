//! The feature model: which categories of SQL object a backup carries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A category of SQL object carried by a backup.
///
/// `Full` marks a monolithic stream that concatenates several logical
/// features into one payload; the others tag exactly one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Tables,
    Data,
    Views,
    Functions,
    Procedures,
    Triggers,
    Events,
    Full,
}

impl Feature {
    /// The fixed emission order for backup output. `Full` is a stream
    /// marker, not an extractable feature, and is not part of the order.
    pub const ORDER: [Feature; 7] = [
        Feature::Tables,
        Feature::Data,
        Feature::Views,
        Feature::Functions,
        Feature::Procedures,
        Feature::Triggers,
        Feature::Events,
    ];

    /// The lowercase wire name of this feature tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Tables => "tables",
            Feature::Data => "data",
            Feature::Views => "views",
            Feature::Functions => "functions",
            Feature::Procedures => "procedures",
            Feature::Triggers => "triggers",
            Feature::Events => "events",
            Feature::Full => "full",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tables" => Ok(Feature::Tables),
            "data" => Ok(Feature::Data),
            "views" => Ok(Feature::Views),
            "functions" => Ok(Feature::Functions),
            "procedures" => Ok(Feature::Procedures),
            "triggers" => Ok(Feature::Triggers),
            "events" => Ok(Feature::Events),
            "full" => Ok(Feature::Full),
            other => Err(CoreError::Configuration(format!(
                "Unknown feature tag: {other}"
            ))),
        }
    }
}

/// One unit of extractor output: a SQL statement tagged with the feature it
/// belongs to. The container writer and the restore replayer both consume
/// this record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub feature: Feature,
    pub sql: String,
}

impl Statement {
    pub fn new(feature: Feature, sql: impl Into<String>) -> Self {
        Self {
            feature,
            sql: sql.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_tables_first_events_last() {
        assert_eq!(Feature::ORDER.first(), Some(&Feature::Tables));
        assert_eq!(Feature::ORDER.last(), Some(&Feature::Events));
        assert_eq!(Feature::ORDER.len(), 7);
    }

    #[test]
    fn roundtrip_wire_names() {
        for feature in Feature::ORDER.iter().chain([Feature::Full].iter()) {
            assert_eq!(feature.as_str().parse::<Feature>().unwrap(), *feature);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!("indexes".parse::<Feature>().is_err());
    }
}
