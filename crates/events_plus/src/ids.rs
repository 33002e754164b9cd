//! Unique identifiers for publishers, subscribers and the links between them.
//!
//! All identifiers are random UUID v4 values wrapped in distinct newtypes so a
//! subscription id can never be passed where a publisher id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random identifier using UUID v4.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
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

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identity of a [`Publisher`](crate::Publisher).
    PublisherId
);
uuid_id!(
    /// Identity of a [`Subscriber`](crate::Subscriber).
    SubscriberId
);
uuid_id!(
    /// Identity of a [`Subscription`](crate::Subscription).
    SubscriptionId
);
uuid_id!(
    /// Identity of a subscriber [`Request`](crate::Request).
    RequestId
);
uuid_id!(
    /// Identity of a [`Callable`](crate::Callable); used to remove direct delegates.
    CallableId
);
uuid_id!(
    /// Identity of a registered observer callback.
    ObserverId
);
