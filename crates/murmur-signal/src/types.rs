//! Fixed-width identifiers used on a signal channel.
//!
//! All three identifiers are 32 bytes. They differ only in meaning:
//!
//! - [`Overlay`]: a topological reference point a channel address must be
//!   close to.
//! - [`ResourceId`]: the mined identifier handed to subscribe and write.
//! - [`ChannelAddress`]: the broadcast address derived from a resource id.

/// Width of every identifier in bytes.
pub const ID_LEN: usize = 32;

/// Width of every identifier in bits.
pub const ID_BITS: u32 = (ID_LEN * 8) as u32;

macro_rules! id32 {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; ID_LEN]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; ID_LEN] {
                &self.0
            }

            /// Convert to lowercase hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from a hex string of exactly 64 characters.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                Self::from_slice(&hex::decode(s)?)
            }

            /// Copy from a byte slice of exactly 32 bytes.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, hex::FromHexError> {
                let arr: [u8; ID_LEN] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }
    };
}

id32! {
    /// A topological reference point (e.g. a node overlay address).
    Overlay
}

id32! {
    /// Mined identifier addressing both subscribe and write on a channel.
    ResourceId
}

id32! {
    /// Broadcast address produced from a [`ResourceId`].
    ChannelAddress
}

impl ResourceId {
    /// Short form for log lines.
    pub fn short(&self) -> String {
        format!("{}...", &self.to_hex()[..8])
    }
}
