//! Intake catalog model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::record::new_entity_id;

/// What kind of thing is being consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntakeKind {
    #[serde(alias = "Food")]
    Food,
    #[serde(alias = "Drink")]
    Drink,
    #[serde(alias = "Supplement")]
    Supplement,
    #[serde(alias = "Medication")]
    Medication,
    #[serde(alias = "Other")]
    Other,
}

impl IntakeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Drink => "drink",
            Self::Supplement => "supplement",
            Self::Medication => "medication",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for IntakeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntakeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "food" => Ok(Self::Food),
            "drink" => Ok(Self::Drink),
            "supplement" => Ok(Self::Supplement),
            "medication" => Ok(Self::Medication),
            "other" => Ok(Self::Other),
            other => Err(Error::InvalidInput(format!("unknown intake kind: {other}"))),
        }
    }
}

/// Unit a quantity is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntakeUnit {
    #[serde(alias = "Milligram", alias = "mg")]
    Milligram,
    #[serde(alias = "Gram", alias = "g")]
    Gram,
    #[serde(alias = "Milliliter", alias = "ml")]
    Milliliter,
    #[serde(alias = "Liter", alias = "l")]
    Liter,
    #[serde(alias = "Piece")]
    Piece,
    #[serde(alias = "Cup")]
    Cup,
    #[serde(alias = "Serving")]
    Serving,
}

impl IntakeUnit {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Milligram => "milligram",
            Self::Gram => "gram",
            Self::Milliliter => "milliliter",
            Self::Liter => "liter",
            Self::Piece => "piece",
            Self::Cup => "cup",
            Self::Serving => "serving",
        }
    }
}

impl fmt::Display for IntakeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntakeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "milligram" | "mg" => Ok(Self::Milligram),
            "gram" | "g" => Ok(Self::Gram),
            "milliliter" | "ml" => Ok(Self::Milliliter),
            "liter" | "l" => Ok(Self::Liter),
            "piece" => Ok(Self::Piece),
            "cup" => Ok(Self::Cup),
            "serving" => Ok(Self::Serving),
            other => Err(Error::InvalidInput(format!("unknown intake unit: {other}"))),
        }
    }
}

/// A consumable in the user's catalog, with defaults for quick logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intake {
    pub id: String,
    pub name: String,
    pub kind: IntakeKind,
    pub default_quantity: f64,
    pub default_unit: IntakeUnit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl Intake {
    /// Create a new intake with a fresh id.
    pub fn new(
        name: impl Into<String>,
        kind: IntakeKind,
        default_quantity: f64,
        default_unit: IntakeUnit,
    ) -> Self {
        Self {
            id: new_entity_id(),
            name: name.into(),
            kind,
            default_quantity,
            default_unit,
            info: None,
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }
}
