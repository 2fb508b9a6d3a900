use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Len,
    Abs,
    Min,
    Max,
    Pow,
    Str,
    Int,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "len" => Some(Self::Len),
            "abs" => Some(Self::Abs),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "pow" => Some(Self::Pow),
            "str" => Some(Self::Str),
            "int" => Some(Self::Int),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Len => "len",
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Pow => "pow",
            Self::Str => "str",
            Self::Int => "int",
        }
    }

    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::Len | Self::Abs | Self::Str | Self::Int => count == 1,
            Self::Pow => (2..=3).contains(&count),
            Self::Min | Self::Max => count >= 1,
        }
    }

    /// Human-readable arity for diagnostics.
    pub fn arity(self) -> &'static str {
        match self {
            Self::Len | Self::Abs | Self::Str | Self::Int => "1 argument",
            Self::Pow => "2 or 3 arguments",
            Self::Min | Self::Max => "at least 1 argument",
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Exception kinds understood by `raise` and `except`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Generic,
    ZeroDivision,
    Index,
    Key,
    Type,
    Value,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::Generic,
        ErrorKind::ZeroDivision,
        ErrorKind::Index,
        ErrorKind::Key,
        ErrorKind::Type,
        ErrorKind::Value,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.source_name() == name)
    }

    pub fn source_name(self) -> &'static str {
        match self {
            Self::Generic => "Exception",
            Self::ZeroDivision => "ZeroDivisionError",
            Self::Index => "IndexError",
            Self::Key => "KeyError",
            Self::Type => "TypeError",
            Self::Value => "ValueError",
        }
    }

    /// Runtime enumerator naming this kind.
    pub fn c_name(self) -> &'static str {
        match self {
            Self::Generic => "RT_EXC_Exception",
            Self::ZeroDivision => "RT_EXC_ZeroDivisionError",
            Self::Index => "RT_EXC_IndexError",
            Self::Key => "RT_EXC_KeyError",
            Self::Type => "RT_EXC_TypeError",
            Self::Value => "RT_EXC_ValueError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtins_by_name() {
        assert_eq!(Builtin::from_name("pow"), Some(Builtin::Pow));
        assert_eq!(Builtin::from_name("print"), None);
    }

    #[test]
    fn checks_builtin_arity() {
        assert!(Builtin::Pow.accepts(3));
        assert!(!Builtin::Pow.accepts(1));
        assert!(Builtin::Max.accepts(5));
        assert!(!Builtin::Len.accepts(0));
    }

    #[test]
    fn maps_exception_names() {
        assert_eq!(ErrorKind::from_name("KeyError"), Some(ErrorKind::Key));
        assert_eq!(ErrorKind::from_name("Exception"), Some(ErrorKind::Generic));
        assert_eq!(ErrorKind::from_name("OSError"), None);
        assert_eq!(ErrorKind::ZeroDivision.c_name(), "RT_EXC_ZeroDivisionError");
    }
}
