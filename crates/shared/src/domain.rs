use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(RoomId);
id_newtype!(ThreadId);
id_newtype!(AttachmentId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Room,
    Direct,
}

/// Top-level tab of the chat surface, as carried in the `tab` navigation parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelTab {
    #[default]
    Rooms,
    Direct,
    Friends,
}

impl ChannelTab {
    /// Parses a navigation value. Unknown values yield `None`; callers default to rooms.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "rooms" => Some(Self::Rooms),
            "direct" => Some(Self::Direct),
            "friends" => Some(Self::Friends),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rooms => "rooms",
            Self::Direct => "direct",
            Self::Friends => "friends",
        }
    }

    /// Rooms and direct hold conversations; friends is a roster.
    pub fn is_conversational(self) -> bool {
        matches!(self, Self::Rooms | Self::Direct)
    }
}

impl fmt::Display for ChannelTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
