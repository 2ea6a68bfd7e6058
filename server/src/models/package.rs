//! Package model.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::ContentType;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::packages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Package {
    pub id: i64,
    pub name: String,
    /// Space or comma separated test-case names that gate updates of this
    /// package, carried onto new updates at submission time.
    pub requirements: Option<String>,
    pub content_type: ContentType,
    pub stack_id: Option<i64>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = crate::schema::packages)]
pub struct NewPackage {
    pub name: String,
    pub requirements: Option<String>,
    pub content_type: ContentType,
    pub stack_id: Option<i64>,
}

impl Package {
    /// Requirement string split into individual test-case tokens.
    pub fn requirement_tokens(&self) -> Vec<String> {
        tokenize(self.requirements.as_deref().unwrap_or(""))
    }
}

/// Split a requirements string on whitespace and commas, dropping empties.
pub fn tokenize(requirements: &str) -> Vec<String> {
    requirements
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_handles_commas_and_spaces() {
        assert_eq!(
            tokenize("rpmlint, upgradepath  depcheck"),
            vec!["rpmlint", "upgradepath", "depcheck"]
        );
        assert!(tokenize("").is_empty());
        assert!(tokenize("  ,, ").is_empty());
    }
}
