//! Newtype wrappers for Discord snowflake identifiers.
//!
//! Keeps channel, message, user, role and guild ids from being mixed up when
//! they flow through the classifier, resolver and lifecycle controller.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

snowflake_id!(
    /// A guild text channel or thread channel.
    ChannelId
);
snowflake_id!(
    /// A single chat message.
    MessageId
);
snowflake_id!(
    /// A guild member or bot account.
    UserId
);
snowflake_id!(
    /// A guild role, used for mention pings.
    RoleId
);
snowflake_id!(GuildId);

impl RoleId {
    /// Renders the role mention markup understood by the chat client.
    pub fn mention(self) -> String {
        format!("<@&{}>", self.0)
    }
}
