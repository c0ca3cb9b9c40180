//! 128-bit device UUIDs. A fresh random UUID is generated for every join
//! attempt, shown to the operator and consumed once by the join request.
use core::fmt::{self, Display, Formatter};
use core::str::FromStr;
use rand::RngCore;

type Bytes = [u8; 16];

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct DeviceUuid(Bytes);

impl DeviceUuid {
    #[must_use]
    pub const fn new(bytes: Bytes) -> DeviceUuid {
        DeviceUuid(bytes)
    }
    /// Generates a random UUID from the thread-local RNG.
    #[must_use]
    pub fn random() -> DeviceUuid {
        let mut bytes = [0_u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        DeviceUuid(bytes)
    }
    #[must_use]
    pub const fn as_bytes(&self) -> &Bytes {
        &self.0
    }
}
impl AsRef<[u8]> for DeviceUuid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
impl Display for DeviceUuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
impl fmt::Debug for DeviceUuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceUuid({})", self)
    }
}

/// Local validation error for UUID strings (expected exactly 32 hex digits).
#[derive(Copy, Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub enum UuidParseError {
    #[error("expected 32 hexadecimal digits, got {0} characters")]
    Length(usize),
    #[error("not a valid hexadecimal string")]
    NotHex,
}

impl FromStr for DeviceUuid {
    type Err = UuidParseError;

    fn from_str(s: &str) -> Result<DeviceUuid, UuidParseError> {
        if s.len() != 32 {
            return Err(UuidParseError::Length(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(UuidParseError::NotHex);
        }
        let mut bytes = [0_u8; 16];
        for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
            let pair = core::str::from_utf8(chunk).map_err(|_| UuidParseError::NotHex)?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| UuidParseError::NotHex)?;
        }
        Ok(DeviceUuid(bytes))
    }
}

impl serde::Serialize for DeviceUuid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
impl<'de> serde::Deserialize<'de> for DeviceUuid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<DeviceUuid, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
