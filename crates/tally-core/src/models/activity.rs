//! Activity catalog model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::record::new_entity_id;

/// Broad grouping used when reporting on activities.
///
/// Serialized lowercase; capitalized aliases accept values written by older
/// exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityCategory {
    #[serde(alias = "Work")]
    Work,
    #[serde(alias = "Health")]
    Health,
    #[serde(alias = "Learning")]
    Learning,
    #[serde(alias = "Leisure")]
    Leisure,
    #[serde(alias = "Chores")]
    Chores,
    #[serde(alias = "Social")]
    Social,
    #[serde(alias = "Other")]
    Other,
}

impl ActivityCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Health => "health",
            Self::Learning => "learning",
            Self::Leisure => "leisure",
            Self::Chores => "chores",
            Self::Social => "social",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "work" => Ok(Self::Work),
            "health" => Ok(Self::Health),
            "learning" => Ok(Self::Learning),
            "leisure" => Ok(Self::Leisure),
            "chores" => Ok(Self::Chores),
            "social" => Ok(Self::Social),
            "other" => Ok(Self::Other),
            other => Err(Error::InvalidInput(format!(
                "unknown activity category: {other}"
            ))),
        }
    }
}

/// A trackable activity in the user's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub category: ActivityCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_sub_activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl Activity {
    /// Create a new activity with a fresh id.
    pub fn new(name: impl Into<String>, category: ActivityCategory) -> Self {
        Self {
            id: new_entity_id(),
            name: name.into(),
            category,
            sub_activity: None,
            sub_sub_activity: None,
            info: None,
        }
    }

    pub fn with_sub_activity(mut self, sub_activity: impl Into<String>) -> Self {
        self.sub_activity = Some(sub_activity.into());
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_activity_generates_unique_ids() {
        let a = Activity::new("Gym", ActivityCategory::Health);
        let b = Activity::new("Gym", ActivityCategory::Health);
        assert_ne!(a.id, b.id);
        assert_eq!(a.name, "Gym");
        assert_eq!(a.sub_activity, None);
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!(
            "Health".parse::<ActivityCategory>().unwrap(),
            ActivityCategory::Health
        );
        assert_eq!(
            "work".parse::<ActivityCategory>().unwrap(),
            ActivityCategory::Work
        );
        assert!("cooking".parse::<ActivityCategory>().is_err());
    }

    #[test]
    fn category_accepts_capitalized_json() {
        let parsed: ActivityCategory = serde_json::from_str("\"Health\"").unwrap();
        assert_eq!(parsed, ActivityCategory::Health);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"health\"");
    }

    #[test]
    fn optional_fields_are_omitted_from_json() {
        let activity = Activity::new("Gym", ActivityCategory::Health);
        let json = serde_json::to_value(&activity).unwrap();
        assert!(json.get("sub_activity").is_none());

        let with_sub = activity.with_sub_activity("Weights");
        let json = serde_json::to_value(&with_sub).unwrap();
        assert_eq!(json["sub_activity"], "Weights");
    }
}
