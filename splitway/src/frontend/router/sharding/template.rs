//! Physical naming templates, e.g. `user_db_{:02}` or `orders_{}`.
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct NameTemplate {
    prefix: String,
    suffix: String,
    width: usize,
}

impl NameTemplate {
    /// Parse a template with exactly one `{}` or `{:0N}` index slot.
    pub fn new(template: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidTemplate(template.to_owned());

        let start = template.find('{').ok_or_else(invalid)?;
        let end = start + template[start..].find('}').ok_or_else(invalid)?;
        let (prefix, suffix) = (&template[..start], &template[end + 1..]);

        if suffix.contains(['{', '}']) || prefix.contains('}') {
            return Err(invalid());
        }

        let spec = &template[start + 1..end];
        let width = match spec {
            "" => 0,
            spec => spec
                .strip_prefix(":0")
                .and_then(|width| width.parse::<usize>().ok())
                .ok_or_else(invalid)?,
        };

        Ok(Self {
            prefix: prefix.to_owned(),
            suffix: suffix.to_owned(),
            width,
        })
    }

    /// Physical name for the index.
    pub fn format(&self, index: i64) -> Result<String, Error> {
        if index < 0 {
            return Err(Error::evaluation(format!(
                "negative shard index {} for \"{}\"",
                index, self
            )));
        }

        Ok(format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            self.suffix,
            width = self.width
        ))
    }

    /// Index encoded in a physical name.
    pub fn parse_index(&self, name: &str) -> Result<i64, Error> {
        let invalid = || Error::InvalidName {
            name: name.to_owned(),
            template: self.to_string(),
        };

        let digits = name
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_suffix(&self.suffix))
            .ok_or_else(invalid)?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        digits.parse().map_err(|_| invalid())
    }
}

impl Display for NameTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.width > 0 {
            write!(f, "{}{{:0{}}}{}", self.prefix, self.width, self.suffix)
        } else {
            write!(f, "{}{{}}{}", self.prefix, self.suffix)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format_and_parse() {
        let template = NameTemplate::new("user_db_{:02}").unwrap();
        assert_eq!(template.format(3).unwrap(), "user_db_03");
        assert_eq!(template.format(123).unwrap(), "user_db_123");
        assert_eq!(template.parse_index("user_db_03").unwrap(), 3);
        assert_eq!(template.to_string(), "user_db_{:02}");

        let template = NameTemplate::new("t_{}_archive").unwrap();
        assert_eq!(template.format(7).unwrap(), "t_7_archive");
        assert_eq!(template.parse_index("t_7_archive").unwrap(), 7);
    }

    #[test]
    fn test_invalid() {
        for bad in ["users", "users_{", "users_{:x}", "users_{}_{}", "users_{:2}"] {
            assert!(
                matches!(NameTemplate::new(bad), Err(Error::InvalidTemplate(_))),
                "{}",
                bad
            );
        }

        let template = NameTemplate::new("users_{}").unwrap();
        assert!(matches!(
            template.parse_index("orders_1"),
            Err(Error::InvalidName { .. })
        ));
        assert!(matches!(
            template.parse_index("users_"),
            Err(Error::InvalidName { .. })
        ));
        assert!(matches!(
            template.parse_index("users_-1"),
            Err(Error::InvalidName { .. })
        ));
        assert!(matches!(
            template.format(-1),
            Err(Error::RuleEvaluation(_))
        ));
    }
}
