//! Core mesh identifier types (`Token`, `ModelId`, `CompanyId`, key and
//! element indices) shared by the rest of the node.
use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

/// Company identifier reported in the node composition.
pub const APP_COMPANY_ID: CompanyId = CompanyId(0x05F1);
pub const APP_PRODUCT_ID: u16 = 0x0001;
pub const APP_VERSION_ID: u16 = 0x0001;

/// 16-bit Company ID qualifying a vendor model.
#[derive(
    Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
pub struct CompanyId(pub u16);
impl Display for CompanyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

/// 16-bit Model ID. Unique within an element; SIG models carry no
/// `CompanyId`, vendor models do (see [`crate::access::ModelIdentifier`]).
#[derive(
    Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
pub struct ModelId(pub u16);
impl Display for ModelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

/// Index into the node's application-key set. Selects which application key
/// encodes/decodes a message.
#[derive(
    Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
pub struct AppKeyIndex(pub u16);
impl Display for AppKeyIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Element position within the node (0..N-1). Assigned at construction and
/// never reused across elements.
#[derive(
    Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
pub struct ElementIndex(pub u8);
impl ElementIndex {
    #[must_use]
    pub fn is_primary(self) -> bool {
        self.0 == 0
    }
}
impl Display for ElementIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct ElementCount(pub u8);
impl Display for ElementCount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque 64-bit node credential issued by the management daemon on a
/// successful join. Exactly one valid token per process at a time; the text
/// form is always 16 hexadecimal digits.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct Token(u64);
impl Token {
    #[must_use]
    pub const fn new(value: u64) -> Token {
        Token(value)
    }
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}
impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Local validation error for token strings. Raised before any request
/// reaches the management service.
#[derive(Copy, Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub enum TokenParseError {
    #[error("expected 16 hexadecimal digits, got {0} characters")]
    Length(usize),
    #[error("not a valid hexadecimal number")]
    NotHex,
}

impl FromStr for Token {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Token, TokenParseError> {
        if s.len() != 16 {
            return Err(TokenParseError::Length(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TokenParseError::NotHex);
        }
        u64::from_str_radix(s, 16)
            .map(Token)
            .map_err(|_| TokenParseError::NotHex)
    }
}

impl serde::Serialize for Token {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
impl<'de> serde::Deserialize<'de> for Token {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Token, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_wrong_length() {
        assert_eq!("".parse::<Token>(), Err(TokenParseError::Length(0)));
        assert_eq!(
            "11223344556677".parse::<Token>(),
            Err(TokenParseError::Length(14))
        );
        assert_eq!(
            "112233445566778899".parse::<Token>(),
            Err(TokenParseError::Length(18))
        );
    }
    #[test]
    fn test_token_not_hex() {
        assert_eq!(
            "112233445566778g".parse::<Token>(),
            Err(TokenParseError::NotHex)
        );
        // `from_str_radix` alone would accept a leading sign.
        assert_eq!(
            "+122334455667788".parse::<Token>(),
            Err(TokenParseError::NotHex)
        );
    }
    #[test]
    fn test_token_parse() {
        let token: Token = "1122334455667788".parse().unwrap();
        assert_eq!(token.value(), 0x1122_3344_5566_7788);
        assert_eq!(token.to_string(), "1122334455667788");
    }
    #[test]
    fn test_token_leading_zeros_display() {
        let token = Token::new(0x42);
        assert_eq!(token.to_string(), "0000000000000042");
        assert_eq!("0000000000000042".parse::<Token>(), Ok(token));
    }
}
