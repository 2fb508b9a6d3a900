use std::fmt;

use serde::Deserialize;

use crate::types::Type;

/// Integer representation policy used by the type tracker and code
/// generator. Both backends share one lowering; they differ only in which
/// integer type a value starts out as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Native `long long` integers, arbitrary precision only where a value
    /// cannot fit.
    #[default]
    Fast,
    /// Arbitrary-precision integers throughout.
    Precise,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Fast, Backend::Precise];

    pub fn name(self) -> &'static str {
        match self {
            Backend::Fast => "fast",
            Backend::Precise => "precise",
        }
    }

    /// Storage type of parameters, return values, loop variables and
    /// comparison results.
    pub fn int_type(self) -> Type {
        match self {
            Backend::Fast => Type::Int,
            Backend::Precise => Type::BigInt,
        }
    }

    /// Type of an integer literal given its decimal digits.
    pub fn literal_type(self, digits: &str) -> Type {
        match self {
            Backend::Fast if digits.parse::<i64>().is_ok() => Type::Int,
            _ => Type::BigInt,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_types_follow_backend() {
        assert_eq!(Backend::Fast.literal_type("42"), Type::Int);
        assert_eq!(Backend::Fast.literal_type("-9223372036854775808"), Type::Int);
        assert_eq!(Backend::Fast.literal_type("9223372036854775808"), Type::BigInt);
        assert_eq!(Backend::Precise.literal_type("1"), Type::BigInt);
    }

    #[test]
    fn cli_spelling_matches_name() {
        use clap::ValueEnum;

        for backend in Backend::ALL {
            let value = backend.to_possible_value().expect("visible value");
            assert_eq!(value.get_name(), backend.name());
            assert_eq!(backend.to_string(), backend.name());
        }
        assert_eq!(Backend::from_str("precise", false), Ok(Backend::Precise));
        assert!(Backend::from_str("jit", false).is_err());
        assert_eq!(Backend::default(), Backend::Fast);
    }
}
