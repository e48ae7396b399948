use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::task::{COLUMN_DUE_DATE, COLUMN_IS_COMPLETE, COLUMN_IS_PRIORITY};

/// Task list ordering preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Open tasks first, priority tasks first, then soonest due.
    #[default]
    Default,
    /// Open tasks first, then soonest due.
    Date,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Default => "default",
            SortOrder::Date => "date",
        }
    }

    pub fn order_by(self) -> String {
        match self {
            SortOrder::Default => format!(
                "{COLUMN_IS_COMPLETE} ASC, {COLUMN_IS_PRIORITY} DESC, {COLUMN_DUE_DATE} ASC"
            ),
            SortOrder::Date => format!("{COLUMN_IS_COMPLETE} ASC, {COLUMN_DUE_DATE} ASC"),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sort order '{0}' (expected 'default' or 'date')")]
pub struct ParseSortOrderError(String);

impl FromStr for SortOrder {
    type Err = ParseSortOrderError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(SortOrder::Default),
            "date" | "by_date" | "by-date" => Ok(SortOrder::Date),
            other => Err(ParseSortOrderError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::SortOrder;

    #[test]
    fn parses_known_orders_case_insensitively() {
        assert_eq!(SortOrder::from_str("DEFAULT"), Ok(SortOrder::Default));
        assert_eq!(SortOrder::from_str(" by-date "), Ok(SortOrder::Date));
        let err = SortOrder::from_str("alpha").expect_err("alpha is not an order");
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn date_order_ignores_priority() {
        assert!(SortOrder::Default.order_by().contains("is_priority DESC"));
        assert!(!SortOrder::Date.order_by().contains("is_priority"));
        assert!(SortOrder::Date.order_by().starts_with("is_complete ASC"));
    }
}
