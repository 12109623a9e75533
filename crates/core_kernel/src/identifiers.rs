//! Strongly-typed identifiers for charging entities
//!
//! Using newtype wrappers around UUIDs provides type safety and prevents
//! accidental mixing of different identifier types. Account identities are
//! opaque strings, conventionally `tenant:account`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Tag shown before the uuid in logs
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Assigned once per balance, never reused
define_id!(BalanceUuid, "BAL");

// Correlates the log lines of one charging request
define_id!(RequestId, "REQ");

/// Separator between tenant and account in an account key
pub const KEY_SEPARATOR: char = ':';

/// Identity of an account
///
/// Persisted as the plain `tenant:account` string. The key is opaque to the
/// engine; [`AccountKey::tenant`] and [`AccountKey::account`] only split it for
/// display and rating purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountKey(String);

impl AccountKey {
    /// Builds a key from its tenant and account parts
    pub fn new(tenant: impl AsRef<str>, account: impl AsRef<str>) -> Self {
        Self(format!("{}{}{}", tenant.as_ref(), KEY_SEPARATOR, account.as_ref()))
    }

    /// Returns the tenant part, empty when the key carries no separator
    pub fn tenant(&self) -> &str {
        self.0.split_once(KEY_SEPARATOR).map(|(t, _)| t).unwrap_or("")
    }

    /// Returns the account part, the whole key when it carries no separator
    pub fn account(&self) -> &str {
        self.0.split_once(KEY_SEPARATOR).map(|(_, a)| a).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CoreError::invalid_identifier("empty account key"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for AccountKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountKey> for String {
    fn from(key: AccountKey) -> String {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_uuid_display() {
        let id = BalanceUuid::new();
        assert!(id.to_string().starts_with("BAL-"));
    }

    #[test]
    fn test_id_parsing() {
        let original = BalanceUuid::new();
        let parsed: BalanceUuid = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_account_key_parts() {
        let key = AccountKey::new("cgrates.org", "1001");
        assert_eq!(key.as_str(), "cgrates.org:1001");
        assert_eq!(key.tenant(), "cgrates.org");
        assert_eq!(key.account(), "1001");
    }

    #[test]
    fn test_account_key_without_separator() {
        let key: AccountKey = "standalone".parse().unwrap();
        assert_eq!(key.tenant(), "");
        assert_eq!(key.account(), "standalone");
    }
}
