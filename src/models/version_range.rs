use crate::{NuGetError, parse_version};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interval over versions in NuGet notation.
///
/// `1.0` means `>= 1.0.0`, `[1.0]` is exact, `[1.0,2.0)` is bounded,
/// `(,2.0]` / `(1.0,)` are half-open and `*` or an empty string match everything.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    min: Option<Version>,
    min_inclusive: bool,
    max: Option<Version>,
    max_inclusive: bool,
    original: Option<String>,
}

impl VersionRange {
    pub fn all() -> Self {
        Self {
            min: None,
            min_inclusive: false,
            max: None,
            max_inclusive: false,
            original: None,
        }
    }

    pub fn at_least(version: Version) -> Self {
        Self {
            min: Some(version),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
            original: None,
        }
    }

    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
            original: None,
        }
    }

    pub fn new(
        min: Option<Version>,
        min_inclusive: bool,
        max: Option<Version>,
        max_inclusive: bool,
    ) -> Result<Self, NuGetError> {
        let range = Self {
            min,
            min_inclusive,
            max,
            max_inclusive,
            original: None,
        };
        range.validate()?;
        Ok(range)
    }

    pub fn parse(input: &str) -> Result<Self, NuGetError> {
        let trimmed = input.trim();
        let invalid = || NuGetError::InvalidVersionRange(input.to_string());

        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self {
                original: Some(input.to_string()),
                ..Self::all()
            });
        }

        let first = trimmed.chars().next().ok_or_else(invalid)?;
        if first != '[' && first != '(' {
            let version = parse_version(trimmed).map_err(|_| invalid())?;
            return Ok(Self {
                original: Some(input.to_string()),
                ..Self::at_least(version)
            });
        }

        let last = trimmed.chars().last().ok_or_else(invalid)?;
        if trimmed.len() < 2 || (last != ']' && last != ')') {
            return Err(invalid());
        }

        let min_inclusive = first == '[';
        let max_inclusive = last == ']';
        let inner = &trimmed[1..trimmed.len() - 1];
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();

        let range = match parts.as_slice() {
            [single] => {
                if !min_inclusive || !max_inclusive || single.is_empty() {
                    return Err(invalid());
                }
                Self::exact(parse_version(single).map_err(|_| invalid())?)
            }
            [min, max] => {
                if min.is_empty() && max.is_empty() {
                    return Err(invalid());
                }
                let parse_bound = |s: &str| -> Result<Option<Version>, NuGetError> {
                    if s.is_empty() {
                        Ok(None)
                    } else {
                        parse_version(s).map(Some).map_err(|_| invalid())
                    }
                };
                Self {
                    min: parse_bound(min)?,
                    min_inclusive,
                    max: parse_bound(max)?,
                    max_inclusive,
                    original: None,
                }
            }
            _ => return Err(invalid()),
        };

        range.validate().map_err(|_| invalid())?;

        Ok(Self {
            original: Some(input.to_string()),
            ..range
        })
    }

    fn validate(&self) -> Result<(), NuGetError> {
        if let (Some(min), Some(max)) = (&self.min, &self.max) {
            if min > max || (min == max && !(self.min_inclusive && self.max_inclusive)) {
                return Err(NuGetError::InvalidVersionRange(self.to_string()));
            }
        }
        Ok(())
    }

    pub fn min_version(&self) -> Option<&Version> {
        self.min.as_ref()
    }

    pub fn max_version(&self) -> Option<&Version> {
        self.max.as_ref()
    }

    pub fn is_min_inclusive(&self) -> bool {
        self.min_inclusive
    }

    pub fn is_max_inclusive(&self) -> bool {
        self.max_inclusive
    }

    pub fn has_lower_bound(&self) -> bool {
        self.min.is_some()
    }

    pub fn has_upper_bound(&self) -> bool {
        self.max.is_some()
    }

    pub fn is_all(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn is_exact(&self) -> bool {
        self.min.is_some() && self.min == self.max && self.min_inclusive && self.max_inclusive
    }

    pub fn satisfies(&self, version: &Version) -> bool {
        let above_min = match &self.min {
            Some(min) if self.min_inclusive => version >= min,
            Some(min) => version > min,
            None => true,
        };
        let below_max = match &self.max {
            Some(max) if self.max_inclusive => version <= max,
            Some(max) => version < max,
            None => true,
        };
        above_min && below_max
    }

    /// The string this range was parsed from, or its normalized form.
    pub fn original_string(&self) -> String {
        self.original.clone().unwrap_or_else(|| self.to_string())
    }

    pub fn to_short_string(&self) -> String {
        match (&self.min, &self.max) {
            (Some(min), None) if self.min_inclusive => min.to_string(),
            _ => self.to_string(),
        }
    }

    /// Human readable form, e.g. `(>= 1.0.0 && < 2.0.0)`.
    pub fn pretty_print(&self) -> String {
        if self.is_all() {
            return String::new();
        }
        if self.is_exact() {
            if let Some(min) = &self.min {
                return format!("(= {})", min);
            }
        }

        let mut parts = Vec::new();
        if let Some(min) = &self.min {
            parts.push(format!("{} {}", if self.min_inclusive { ">=" } else { ">" }, min));
        }
        if let Some(max) = &self.max {
            parts.push(format!("{} {}", if self.max_inclusive { "<=" } else { "<" }, max));
        }
        format!("({})", parts.join(" && "))
    }

    /// Returns the lowest of `versions` that satisfies this range.
    pub fn find_lowest_match<'a, I>(&self, versions: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        versions.into_iter().filter(|v| self.satisfies(v)).min()
    }
}

impl PartialEq for VersionRange {
    fn eq(&self, other: &Self) -> bool {
        self.min == other.min
            && self.max == other.max
            && (self.min.is_none() || self.min_inclusive == other.min_inclusive)
            && (self.max.is_none() || self.max_inclusive == other.max_inclusive)
    }
}

impl Eq for VersionRange {}

impl Default for VersionRange {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // "(, )" does not parse back
        if self.is_all() {
            return write!(f, "*");
        }
        if self.is_exact() {
            if let Some(min) = &self.min {
                return write!(f, "[{}]", min);
            }
        }

        let open = if self.min.is_some() && self.min_inclusive { '[' } else { '(' };
        let close = if self.max.is_some() && self.max_inclusive { ']' } else { ')' };
        let min = self.min.as_ref().map_or(String::new(), |v| v.to_string());
        let max = self.max.as_ref().map_or(String::new(), |v| v.to_string());
        write!(f, "{}{}, {}{}", open, min, max, close)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = NuGetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(range: VersionRange) -> Self {
        range.original_string()
    }
}

impl std::str::FromStr for VersionRange {
    type Err = NuGetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    #[test]
    fn test_plain_version_is_inclusive_minimum() {
        let range = VersionRange::parse("1.0").unwrap();
        assert!(range.satisfies(&v("1.0.0")));
        assert!(range.satisfies(&v("9.0.0")));
        assert!(!range.satisfies(&v("0.9.0")));
        assert_eq!(range.to_short_string(), "1.0.0");
        assert_eq!(range.original_string(), "1.0");
    }

    #[test]
    fn test_bounded_interval() {
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        assert!(range.satisfies(&v("1.0")));
        assert!(range.satisfies(&v("1.9.9")));
        assert!(!range.satisfies(&v("2.0")));
        assert_eq!(range.to_string(), "[1.0.0, 2.0.0)");
        assert_eq!(range.pretty_print(), "(>= 1.0.0 && < 2.0.0)");
    }

    #[test]
    fn test_exact_and_half_open() {
        let exact = VersionRange::parse("[1.2.3]").unwrap();
        assert!(exact.is_exact());
        assert!(!exact.satisfies(&v("1.2.4")));
        assert_eq!(exact.to_short_string(), "[1.2.3]");
        assert_eq!(exact.pretty_print(), "(= 1.2.3)");

        let upper = VersionRange::parse("(,2.0]").unwrap();
        assert!(upper.satisfies(&v("0.1")));
        assert!(upper.satisfies(&v("2.0")));
        assert!(!upper.satisfies(&v("2.0.1")));

        let lower = VersionRange::parse("(1.0,)").unwrap();
        assert!(!lower.satisfies(&v("1.0")));
        assert!(lower.satisfies(&v("1.0.1")));
    }

    #[test]
    fn test_all_ranges() {
        assert!(VersionRange::parse("").unwrap().is_all());
        assert!(VersionRange::parse("*").unwrap().satisfies(&v("0.0.1-alpha")));
        assert_eq!(VersionRange::all().pretty_print(), "");
        assert_eq!(VersionRange::all().to_string(), "*");
    }

    #[test]
    fn test_invalid_ranges() {
        for input in ["[1.0", "(1.0]", "[2.0,1.0]", "(1.0,1.0)", "(,)", "[a,b]", "[1.0,2.0,3.0]"] {
            assert!(VersionRange::parse(input).is_err(), "{} should be invalid", input);
        }
    }

    #[test]
    fn test_serde_uses_original_string() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            range: VersionRange,
        }

        let holder: Holder = toml::from_str("range = \"[1.0,2.0)\"").unwrap();
        assert!(holder.range.satisfies(&v("1.5")));
        let out = toml::to_string(&holder).unwrap();
        assert!(out.contains("[1.0,2.0)"));
    }

    #[test]
    fn test_unbounded_range_survives_serde() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            range: VersionRange,
        }

        let out = toml::to_string(&Holder { range: VersionRange::all() }).unwrap();
        let back: Holder = toml::from_str(&out).unwrap();
        assert!(back.range.is_all());
        assert!(back.range.satisfies(&v("0.1.0")));
    }
}
