use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of the signed-in user as persisted next to the tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Storage representation
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
            Self::SuperAdmin => "SUPER_ADMIN",
        }
    }

    /// Highest role named in `names`; `super_admin` beats `admin`, case-insensitive
    pub fn highest<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        names.into_iter().fold(Self::User, |best, name| {
            let role = if name.eq_ignore_ascii_case("super_admin") {
                Self::SuperAdmin
            } else if name.eq_ignore_ascii_case("admin") {
                Self::Admin
            } else {
                Self::User
            };
            best.max(role)
        })
    }

    /// Whether the role grants access to the admin back office
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Self::User),
            "ADMIN" => Ok(Self::Admin),
            "SUPER_ADMIN" => Ok(Self::SuperAdmin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Snapshot of the persisted session.
///
/// Taken from [`crate::TokenStore::get`]; do not hold on to it across awaits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub role: Option<Role>,
}

impl Session {
    /// True when no field is set
    pub const fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.role.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_storage_names() {
        for role in [Role::User, Role::Admin, Role::SuperAdmin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_matches_storage_names() {
        let json = serde_json::to_string(&Role::SuperAdmin).unwrap();
        assert_eq!(json, "\"SUPER_ADMIN\"");
    }

    #[test]
    fn test_highest_role() {
        assert_eq!(Role::highest([]), Role::User);
        assert_eq!(Role::highest(["viewer", "Admin"]), Role::Admin);
        assert_eq!(Role::highest(["SUPER_ADMIN", "admin"]), Role::SuperAdmin);
    }

    #[test]
    fn test_admin_roles() {
        assert!(!Role::User.is_admin());
        assert!(Role::Admin.is_admin());
        assert!(Role::SuperAdmin.is_admin());
    }
}
