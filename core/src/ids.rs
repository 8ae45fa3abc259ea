//! Validated identifier newtypes.
//!
//! Each type wraps a `String` that has already passed its regex at
//! construction time, so downstream code can treat the presence of a
//! `Pnum`/`GroupName`/`KeyId`/`FormId` as proof of validity instead of
//! re-checking it.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::ErrorKind;

lazy_static! {
    static ref PNUM_REGEX: Regex = Regex::new(r"^p[0-9]+$").unwrap();
    static ref GROUP_REGEX: Regex = Regex::new(r"^p[0-9]+-[a-z0-9-]+-group$").unwrap();
    static ref KEY_ID_REGEX: Regex = Regex::new(r"^[A-F0-9]{16}$").unwrap();
    static ref FORM_ID_REGEX: Regex = Regex::new(r"^[0-9]+$").unwrap();
}

/// A project identifier, e.g. `p11`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Pnum(String);

impl Pnum {
    pub fn new(s: impl Into<String>) -> Result<Self, ErrorKind> {
        let s = s.into();
        if PNUM_REGEX.is_match(&s) {
            Ok(Self(s))
        } else {
            Err(ErrorKind::InvalidPath(format!("invalid pnum: {s}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The project's implicit default member-group, `<pnum>-member-group`.
    pub fn default_group(&self) -> GroupName {
        GroupName(format!("{}-member-group", self.0))
    }
}

impl fmt::Display for Pnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Pnum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Pnum::new(s).map_err(de::Error::custom)
    }
}

/// A POSIX group name of the shape `<pnum>-<suffix>-group`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroupName(String);

impl GroupName {
    pub fn new(s: impl Into<String>) -> Result<Self, ErrorKind> {
        let s = s.into();
        if GROUP_REGEX.is_match(&s) {
            Ok(Self(s))
        } else {
            Err(ErrorKind::InvalidPath(format!("invalid group: {s}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this group belongs to the given project, i.e. its name is
    /// prefixed `<pnum>-`.
    pub fn belongs_to(&self, pnum: &Pnum) -> bool {
        self.0
            .strip_prefix(pnum.as_str())
            .map(|rest| rest.starts_with('-'))
            .unwrap_or(false)
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for GroupName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        GroupName::new(s).map_err(de::Error::custom)
    }
}

/// An SNS key-id: exactly 16 uppercase hex characters, never normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(s: impl Into<String>) -> Result<Self, ErrorKind> {
        let s = s.into();
        if KEY_ID_REGEX.is_match(&s) {
            Ok(Self(s))
        } else {
            Err(ErrorKind::InvalidSnsParam(format!("invalid key_id: {s}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An SNS form-id: digits only, no leading-zero normalization performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FormId(String);

impl FormId {
    pub fn new(s: impl Into<String>) -> Result<Self, ErrorKind> {
        let s = s.into();
        if FORM_ID_REGEX.is_match(&s) {
            Ok(Self(s))
        } else {
            Err(ErrorKind::InvalidSnsParam(format!("invalid form_id: {s}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pnum_accepts_valid() {
        assert!(Pnum::new("p11").is_ok());
        assert!(Pnum::new("p123456").is_ok());
    }

    #[test]
    fn pnum_rejects_invalid() {
        assert!(Pnum::new("P11").is_err());
        assert!(Pnum::new("11").is_err());
        assert!(Pnum::new("p11/../p12").is_err());
    }

    #[test]
    fn group_accepts_valid() {
        assert!(GroupName::new("p11-member-group").is_ok());
        assert!(GroupName::new("p11-clinical-data-group").is_ok());
    }

    #[test]
    fn group_rejects_invalid() {
        assert!(GroupName::new("p11-Member-group").is_err());
        assert!(GroupName::new("member-group").is_err());
    }

    #[test]
    fn group_belongs_to_checks_prefix() {
        let pnum = Pnum::new("p11").unwrap();
        let g = GroupName::new("p11-member-group").unwrap();
        assert!(g.belongs_to(&pnum));

        let other = GroupName::new("p12-member-group").unwrap();
        assert!(!other.belongs_to(&pnum));
    }

    #[test]
    fn key_id_requires_uppercase_exact_length() {
        assert!(KeyId::new("255CE5ED50A7558B").is_ok());
        assert!(KeyId::new("255ce5ed50a7558b").is_err());
        assert!(KeyId::new("255CE5ED50A7558").is_err());
    }

    #[test]
    fn form_id_requires_digits() {
        assert!(FormId::new("98765").is_ok());
        assert!(FormId::new("98a65").is_err());
    }
}
