use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Global counter used to generate fresh `$N` identifiers
static AUTOIDX: AtomicUsize = AtomicUsize::new(1);

/// Identifier of a design object (module, wire, cell, process, port, ...)
///
/// Identifiers starting with a backslash are *public* names that came from
/// a source file and are compared literally. Identifiers starting with a
/// dollar sign are *generated* names produced by a pass or a frontend.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct IdString(String);

impl IdString {
    /// Create a fresh generated identifier `$N` from the global counter
    pub fn fresh() -> IdString {
        IdString(format!("${}", AUTOIDX.fetch_add(1, Ordering::Relaxed)))
    }

    /// Returns true if the identifier is a public (source-level) name
    pub fn is_public(&self) -> bool {
        self.0.starts_with('\\')
    }

    /// Returns true if the identifier was generated by a pass or frontend
    pub fn is_generated(&self) -> bool {
        self.0.starts_with('$')
    }

    /// Returns true if the identifier satisfies the container-key invariant
    pub fn is_valid(&self) -> bool {
        self.is_public() || self.is_generated()
    }

    /// The identifier with the leading backslash stripped, for display
    pub fn unescape(&self) -> &str {
        self.0.strip_prefix('\\').unwrap_or(&self.0)
    }

    /// Raw identifier text, including the leading `\` or `$`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is the empty string
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Ensure a user-supplied name carries the leading backslash of a public id
///
/// Names that already start with `\` or `$` are taken as-is.
pub fn escape_id(name: &str) -> IdString {
    if name.starts_with('\\') || name.starts_with('$') || name.is_empty() {
        IdString(name.to_owned())
    } else {
        IdString(format!("\\{name}"))
    }
}

impl From<&str> for IdString {
    fn from(name: &str) -> IdString {
        IdString(name.to_owned())
    }
}

impl From<String> for IdString {
    fn from(name: String) -> IdString {
        IdString(name)
    }
}

impl fmt::Display for IdString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for IdString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape_id("foo").as_str(), "\\foo");
        assert_eq!(escape_id("\\foo").as_str(), "\\foo");
        assert_eq!(escape_id("$42").as_str(), "$42");
        assert_eq!(escape_id("\\foo").unescape(), "foo");
        assert_eq!(IdString::from("$42").unescape(), "$42");
    }

    #[test]
    fn test_kinds() {
        assert!(escape_id("foo").is_public());
        assert!(!escape_id("foo").is_generated());
        assert!(IdString::from("$x").is_generated());
        assert!(!IdString::from("x").is_valid());
    }

    #[test]
    fn test_fresh_monotonic() {
        let a = IdString::fresh();
        let b = IdString::fresh();
        assert!(a.is_generated() && b.is_generated());
        let na: usize = a.as_str()[1..].parse().unwrap();
        let nb: usize = b.as_str()[1..].parse().unwrap();
        assert!(nb > na);
    }
}
