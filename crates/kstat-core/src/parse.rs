//! Reading kstats back from their JSON form.
//!
//! Accepts what [`Kstat::to_json`] and [`KstatSet::to_json`] write. JSON
//! carries no field widths, so numbers come back as 64-bit values
//! (`UInt64`, or `Int64` when negative) and text as `STRING`.
//!
//! [`KstatSet::to_json`]: crate::set::KstatSet::to_json

use std::fmt;

use serde::Deserialize;

use crate::model::Kstat;

#[derive(Debug)]
pub enum ParseError {
    Json(serde_json::Error),
    /// An array held no kstat.
    Empty,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Json(e) => write!(f, "invalid kstat JSON: {}", e),
            ParseError::Empty => write!(f, "no kstat in JSON array"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Json(e) => Some(e),
            ParseError::Empty => None,
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        ParseError::Json(e)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Box<Kstat>),
    Many(Vec<Kstat>),
}

/// Reads one kstat: either an object, or the first element of an array.
pub fn parse_kstat(json: &str) -> Result<Kstat, ParseError> {
    match serde_json::from_str(json)? {
        OneOrMany::One(ks) => Ok(*ks),
        OneOrMany::Many(list) => list.into_iter().next().ok_or(ParseError::Empty),
    }
}

/// Reads an array of kstats. Entries without times or data are
/// identity-only listings and come back empty.
pub fn parse_kstats(json: &str) -> Result<Vec<Kstat>, ParseError> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChain;
    use crate::model::{FieldType, KstatType, Numeric};
    use crate::session::Session;

    #[test]
    fn test_parse_object() {
        let session = Session::new(MockChain::typical_system());
        let ks = session.get_kstat("unix", 0, "system_misc").unwrap();
        let json = ks.to_json().unwrap().to_string();

        let back = parse_kstat(&json).unwrap();
        assert_eq!(back, ks);
        assert_eq!(back.class(), "misc");
        assert_eq!(back.kstat_type(), KstatType::Named);
        assert_eq!(back.snaptime(), ks.snaptime());
        assert_eq!(back.numeric("ncpus"), ks.numeric("ncpus"));
        assert_eq!(back.data("ncpus").map(|d| d.field_type), Some(FieldType::UInt64));
    }

    #[test]
    fn test_parse_first_of_array() {
        let json = r#"[
            {"class":"net","type":1,"module":"e1000g","instance":0,"name":"mac",
             "crtime":10,"snaptime":20,"data":{"obytes":4096,"delta":-3,"link":"up"}},
            {"class":"net","type":1,"module":"e1000g","instance":1,"name":"mac"}
        ]"#;
        let ks = parse_kstat(json).unwrap();
        assert_eq!(ks.triplet(), "e1000g:0:mac");
        assert_eq!(ks.numeric("obytes"), Some(Numeric::Unsigned(4096)));
        assert_eq!(ks.numeric("delta"), Some(Numeric::Signed(-3)));
        assert_eq!(ks.data("delta").map(|d| d.field_type), Some(FieldType::Int64));
        assert_eq!(ks.value("link").and_then(|v| v.as_text()), Some("up"));

        assert_eq!(parse_kstats(json).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_kstat("[]"), Err(ParseError::Empty)));
        assert!(matches!(parse_kstat("{\"module\":"), Err(ParseError::Json(_))));
        assert!(matches!(parse_kstats("{}"), Err(ParseError::Json(_))));
    }
}
