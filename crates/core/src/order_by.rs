use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Strict parse: only the exact tokens `ASC` and `DESC` are accepted.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(CoreError::InvalidArgument(format!(
                "direction must be ASC or DESC, got {s:?}"
            ))),
        }
    }
}

/// An SQL ordering term: an expression plus a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    expression: String,
    direction: Direction,
}

impl OrderBy {
    pub fn new(expression: impl Into<String>, direction: &str) -> Result<Self, CoreError> {
        let direction = Direction::parse(direction)?;
        Self::with_direction(expression, direction)
    }

    pub fn with_direction(
        expression: impl Into<String>,
        direction: Direction,
    ) -> Result<Self, CoreError> {
        let expression = expression.into();
        if expression.trim().is_empty() {
            return Err(CoreError::InvalidArgument(
                "order expression cannot be empty".into(),
            ));
        }
        Ok(Self {
            expression,
            direction,
        })
    }

    pub fn asc(expression: impl Into<String>) -> Result<Self, CoreError> {
        Self::with_direction(expression, Direction::Asc)
    }

    pub fn desc(expression: impl Into<String>) -> Result<Self, CoreError> {
        Self::with_direction(expression, Direction::Desc)
    }

    /// Parses `"expr"`, `"expr ASC"` or `"expr desc"`. The direction token is
    /// case-insensitive and defaults to ASC.
    pub fn from_string(order_by: &str) -> Result<Self, CoreError> {
        let trimmed = order_by.trim();
        if let Some(idx) = trimmed.rfind(char::is_whitespace) {
            let tail = &trimmed[idx + 1..];
            let direction = if tail.eq_ignore_ascii_case("asc") {
                Some(Direction::Asc)
            } else if tail.eq_ignore_ascii_case("desc") {
                Some(Direction::Desc)
            } else {
                None
            };
            if let Some(direction) = direction {
                return Self::with_direction(trimmed[..idx].trim_end(), direction);
            }
        }
        Self::with_direction(trimmed, Direction::Asc)
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl FromStr for OrderBy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expression, self.direction.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_single() {
        let obj = OrderBy::from_string(" e.guid desc ").unwrap();
        assert_eq!(obj.direction(), Direction::Desc);
        assert_eq!(obj.expression(), "e.guid");

        let obj = OrderBy::from_string("e.guid").unwrap();
        assert_eq!(obj.direction(), Direction::Asc);
        assert_eq!(obj.expression(), "e.guid");
    }

    #[test]
    fn handles_arbitrary_expressions() {
        let obj = OrderBy::asc("MAX(10, e.guid)").unwrap();
        assert_eq!(obj.direction().as_str(), "ASC");
        assert_eq!(obj.expression(), "MAX(10, e.guid)");

        let obj = OrderBy::desc("MAX(10, e.guid)").unwrap();
        assert_eq!(obj.direction().as_str(), "DESC");
        assert_eq!(obj.to_string(), "MAX(10, e.guid) DESC");
    }

    #[test]
    fn rejects_empty_expression() {
        assert!(OrderBy::asc("").is_err());
        assert!(OrderBy::from_string("   ").is_err());
        assert!(OrderBy::new("  ", "ASC").is_err());
    }

    #[test]
    fn rejects_unknown_direction() {
        assert!(OrderBy::new("e.guid", "UP").is_err());
        assert!(OrderBy::new("e.guid", "desc").is_err());
        assert!(OrderBy::new("e.guid", "DESC").is_ok());
    }

    #[test]
    fn bare_direction_word_is_an_expression() {
        let obj = OrderBy::from_string("desc").unwrap();
        assert_eq!(obj.expression(), "desc");
        assert_eq!(obj.direction(), Direction::Asc);
    }

    proptest! {
        #[test]
        fn direction_survives_parse(
            name in "[a-z][a-z0-9_.]{0,12}",
            dir in prop::sample::select(vec!["asc", "ASC", "Desc", "DESC", "dEsC"]),
        ) {
            let parsed = OrderBy::from_string(&format!("{name} {dir}")).unwrap();
            prop_assert_eq!(parsed.direction().as_str(), dir.to_uppercase());
            prop_assert_eq!(parsed.expression(), name.as_str());
        }

        #[test]
        fn missing_direction_defaults_to_asc(name in "[a-z][a-z0-9_.()]{0,12}") {
            prop_assume!(!name.eq_ignore_ascii_case("asc") && !name.eq_ignore_ascii_case("desc"));
            let parsed = OrderBy::from_string(&name).unwrap();
            prop_assert_eq!(parsed.direction(), Direction::Asc);
        }
    }
}
