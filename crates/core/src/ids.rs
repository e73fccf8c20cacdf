use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

macro_rules! int_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(i64);

        impl $name {
            pub const fn from_raw(value: i64) -> Self {
                Self(value)
            }

            /// Accepts only identifiers greater than zero.
            pub fn positive(value: i64) -> Result<Self, CoreError> {
                if value < 1 {
                    return Err(CoreError::InvalidArgument(format!(
                        "{} must be a positive integer, got {value}",
                        stringify!($name)
                    )));
                }
                Ok(Self(value))
            }

            pub const fn get(&self) -> i64 {
                self.0
            }

            pub const fn is_positive(&self) -> bool {
                self.0 > 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value: i64 = s.trim().parse().map_err(|_| {
                    CoreError::InvalidArgument(format!("unrecognised {} value: {s}", stringify!($name)))
                })?;
                Self::positive(value)
            }
        }
    };
}

int_id!(Guid);
int_id!(MetastringId);
int_id!(AccessId);

impl Guid {
    /// Owner/container value meaning "nobody".
    pub const NONE: Guid = Guid(0);
}

impl AccessId {
    pub const PRIVATE: AccessId = AccessId(0);
    pub const LOGGED_IN: AccessId = AccessId(1);
    pub const PUBLIC: AccessId = AccessId(2);
    pub const FRIENDS: AccessId = AccessId(-2);
}
