use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Deterministic id with the given low bits, handy for fixtures and logs.
            pub fn from_tail(tail: u128) -> Self {
                Self(Uuid::from_u128(tail))
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
    };
}

uuid_id!(
    /// Identity of an avatar. Shared by its Root presence and every Child mirror.
    AvatarId
);

uuid_id!(
    /// Identity of a scene object.
    ObjectId
);

uuid_id!(
    /// Identity of a region process.
    RegionId
);
