//! Reading catalog model.

use serde::{Deserialize, Serialize};

use crate::models::record::new_entity_id;

/// A book or other reading material in the user's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingObject {
    pub id: String,
    pub book_name: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl ReadingObject {
    /// Create a new reading object with a fresh id.
    pub fn new(book_name: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: new_entity_id(),
            book_name: book_name.into(),
            author: author.into(),
            year: None,
            info: None,
        }
    }

    pub const fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
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
    fn new_reading_object_has_id() {
        let book = ReadingObject::new("Dune", "Frank Herbert").with_year(1965);
        assert!(!book.id.is_empty());
        assert_eq!(book.year, Some(1965));
    }

    #[test]
    fn json_omits_missing_year() {
        let book = ReadingObject::new("Dune", "Frank Herbert");
        let json = serde_json::to_value(&book).unwrap();
        assert!(json.get("year").is_none());
        assert_eq!(json["book_name"], "Dune");
    }
}
