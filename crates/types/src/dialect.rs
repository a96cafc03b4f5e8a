use crate::error::ProfileError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The typesetting systems pgfkit can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    LaTeX,
    ConTeXt,
    #[serde(rename = "plain", alias = "plaintex")]
    PlainTeX,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::LaTeX, Dialect::ConTeXt, Dialect::PlainTeX];

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::LaTeX => "latex",
            Dialect::ConTeXt => "context",
            Dialect::PlainTeX => "plain",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolves a dialect from the first letter of the input, so `l`, `latex` and
/// `LaTeX` all select [`Dialect::LaTeX`]. `p` and `t` both mean plain TeX.
impl FromStr for Dialect {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('l') => Ok(Dialect::LaTeX),
            Some('c') => Ok(Dialect::ConTeXt),
            Some('p') | Some('t') => Ok(Dialect::PlainTeX),
            _ => Err(ProfileError::UnknownDialect(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_letter_prefixes() {
        assert_eq!("l".parse::<Dialect>().unwrap(), Dialect::LaTeX);
        assert_eq!("c".parse::<Dialect>().unwrap(), Dialect::ConTeXt);
        assert_eq!("p".parse::<Dialect>().unwrap(), Dialect::PlainTeX);
        assert_eq!("t".parse::<Dialect>().unwrap(), Dialect::PlainTeX);
    }

    #[test]
    fn test_full_names_and_case() {
        assert_eq!("LaTeX".parse::<Dialect>().unwrap(), Dialect::LaTeX);
        assert_eq!("context".parse::<Dialect>().unwrap(), Dialect::ConTeXt);
        assert_eq!("tex".parse::<Dialect>().unwrap(), Dialect::PlainTeX);
    }

    #[test]
    fn test_rejects_other_values() {
        for bad in ["", "x", "markdown", "  "] {
            assert!(matches!(bad.parse::<Dialect>(), Err(ProfileError::UnknownDialect(_))));
        }
    }

    #[test]
    fn test_display_round_trips() {
        for d in Dialect::ALL {
            assert_eq!(d.to_string().parse::<Dialect>().unwrap(), d);
        }
    }

    #[test]
    fn test_serialized_name_matches_display() {
        for d in Dialect::ALL {
            let json = serde_json::to_string(&d).unwrap();
            assert_eq!(json, format!("\"{d}\""));
            assert_eq!(serde_json::from_str::<Dialect>(&json).unwrap(), d);
        }
        assert_eq!(serde_json::from_str::<Dialect>(r#""plaintex""#).unwrap(), Dialect::PlainTeX);
    }
}
