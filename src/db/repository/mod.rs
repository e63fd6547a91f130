//! Repository layer: entity-scoped SQLite operations over a borrowed connection.

mod patient;
mod prescription;

pub use patient::*;
pub use prescription::*;

use super::DatabaseError;

/// Decode a JSON TEXT column, treating NULL or garbage as the type's default.
pub(crate) fn json_column<T: serde::de::DeserializeOwned + Default>(text: Option<String>) -> T {
    text.and_then(|t| serde_json::from_str(&t).ok()).unwrap_or_default()
}

pub(crate) fn to_json_text<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_column_defaults() {
        let v: Vec<String> = json_column(Some("[\"a\"]".into()));
        assert_eq!(v, vec!["a"]);
        let v: Vec<String> = json_column(Some("not json".into()));
        assert!(v.is_empty());
        let v: Vec<String> = json_column(None);
        assert!(v.is_empty());
    }
}
