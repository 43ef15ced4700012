//! Permission levels.
//!
//! [`PermissionLevel`] is the derived relationship a user has to a note. It is
//! never persisted; [`GrantLevel`] is the subset that can be stored in an
//! access grant row (ownership comes from the note itself).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::QuillError;

/// Effective capability of a user on a note.
///
/// Variants are declared lowest first so the derived `Ord` gives
/// `Owner > Admin > Write > Read > None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    None,
    Read,
    Write,
    Admin,
    Owner,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::None => "none",
            PermissionLevel::Read => "read",
            PermissionLevel::Write => "write",
            PermissionLevel::Admin => "admin",
            PermissionLevel::Owner => "owner",
        }
    }

    pub fn can_read(&self) -> bool {
        *self >= PermissionLevel::Read
    }

    pub fn can_write(&self) -> bool {
        *self >= PermissionLevel::Write
    }

    /// Owner or admin: may delete the note and manage its grants.
    pub fn can_manage(&self) -> bool {
        *self >= PermissionLevel::Admin
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PermissionLevel::None),
            "read" => Ok(PermissionLevel::Read),
            "write" => Ok(PermissionLevel::Write),
            "admin" => Ok(PermissionLevel::Admin),
            "owner" => Ok(PermissionLevel::Owner),
            other => Err(QuillError::validation(
                "permission",
                format!("unknown permission level '{}'", other),
            )),
        }
    }
}

/// Level stored on an access grant row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum GrantLevel {
    Read,
    Write,
    Admin,
}

impl GrantLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantLevel::Read => "read",
            GrantLevel::Write => "write",
            GrantLevel::Admin => "admin",
        }
    }
}

impl From<GrantLevel> for PermissionLevel {
    fn from(level: GrantLevel) -> Self {
        match level {
            GrantLevel::Read => PermissionLevel::Read,
            GrantLevel::Write => PermissionLevel::Write,
            GrantLevel::Admin => PermissionLevel::Admin,
        }
    }
}

impl fmt::Display for GrantLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantLevel {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(GrantLevel::Read),
            "write" => Ok(GrantLevel::Write),
            "admin" => Ok(GrantLevel::Admin),
            other => Err(QuillError::validation(
                "permission",
                format!("'{}' cannot be granted", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_level() -> impl Strategy<Value = PermissionLevel> {
        prop_oneof![
            Just(PermissionLevel::None),
            Just(PermissionLevel::Read),
            Just(PermissionLevel::Write),
            Just(PermissionLevel::Admin),
            Just(PermissionLevel::Owner),
        ]
    }

    #[test]
    fn test_total_order() {
        assert!(PermissionLevel::Owner > PermissionLevel::Admin);
        assert!(PermissionLevel::Admin > PermissionLevel::Write);
        assert!(PermissionLevel::Write > PermissionLevel::Read);
        assert!(PermissionLevel::Read > PermissionLevel::None);
    }

    #[test]
    fn test_capabilities() {
        assert!(!PermissionLevel::None.can_read());
        assert!(PermissionLevel::Read.can_read());
        assert!(!PermissionLevel::Read.can_write());
        assert!(PermissionLevel::Write.can_write());
        assert!(!PermissionLevel::Write.can_manage());
        assert!(PermissionLevel::Admin.can_manage());
        assert!(PermissionLevel::Owner.can_manage());
    }

    #[test]
    fn test_owner_cannot_be_granted() {
        assert!("owner".parse::<GrantLevel>().is_err());
        assert_eq!("admin".parse::<GrantLevel>().ok(), Some(GrantLevel::Admin));
    }

    proptest! {
        #[test]
        fn prop_string_form_parses_back(level in arb_level()) {
            prop_assert_eq!(level.as_str().parse::<PermissionLevel>().ok(), Some(level));
        }

        #[test]
        fn prop_capabilities_are_monotonic(a in arb_level(), b in arb_level()) {
            if a <= b {
                prop_assert!(!a.can_read() || b.can_read());
                prop_assert!(!a.can_write() || b.can_write());
                prop_assert!(!a.can_manage() || b.can_manage());
            }
        }
    }
}
