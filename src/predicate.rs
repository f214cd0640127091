//! Predicate encoding: `"type:expression"`, naming a [`crate::registry::Condition`].

use crate::error::{ErrorCode, ErrorMessage};
use serde::{Deserialize, Serialize};

/// A parsed `type:expression` guard, or the absence of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub condition_type: String,
    pub expression: String,
}

impl Predicate {
    /// Parse a predicate string. An empty string means "no guard" and is
    /// represented as `None`; anything else must be `type:expression`.
    pub fn parse(raw: &str) -> Result<Option<Self>, ErrorMessage> {
        if raw.is_empty() {
            return Ok(None);
        }
        match raw.split_once(':') {
            Some((condition_type, expression)) if !condition_type.is_empty() => {
                Ok(Some(Predicate {
                    condition_type: condition_type.to_string(),
                    expression: expression.to_string(),
                }))
            }
            _ => Err(ErrorMessage::new(
                ErrorCode::BadRequest,
                format!("malformed predicate: {raw:?}, expected \"type:expression\""),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_no_guard() {
        assert_eq!(Predicate::parse("").unwrap(), None);
    }

    #[test]
    fn parses_type_and_expression() {
        let p = Predicate::parse("jxpath:/v[.=2]").unwrap().unwrap();
        assert_eq!(p.condition_type, "jxpath");
        assert_eq!(p.expression, "/v[.=2]");
    }

    #[test]
    fn expression_may_contain_colons() {
        let p = Predicate::parse("eq:a:b:c").unwrap().unwrap();
        assert_eq!(p.condition_type, "eq");
        assert_eq!(p.expression, "a:b:c");
    }

    #[test]
    fn missing_type_is_bad_request() {
        assert!(Predicate::parse(":noType").is_err());
        assert!(Predicate::parse("noSeparator").is_err());
    }
}
