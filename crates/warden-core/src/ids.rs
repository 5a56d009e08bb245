//! Strongly-typed identifiers for domain entities

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate strongly-typed ID wrappers
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the prefixed object name, e.g. `usr_<uuid>`
            pub fn to_prefixed(&self) -> String {
                format!("{}_{}", $prefix, self.0)
            }

            /// Parse from a prefixed object name or a bare UUID
            pub fn from_prefixed(s: &str) -> Option<Self> {
                let prefix = concat!($prefix, "_");
                let raw = s.strip_prefix(prefix).unwrap_or(s);
                Uuid::parse_str(raw).ok().map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                if let Some(id) = Self::from_prefixed(s) {
                    return Ok(id);
                }
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(UserUid, "usr");
define_id!(LoginRecordId, "login");
define_id!(TokenId, "tok");
