//! Invite tokens: the 32-byte slot the contract stores a referrer under.
//!
//! An address is stored right-aligned (12 zero bytes, then the 20 address
//! bytes); a text code is stored left-aligned and zero padded. Nothing in the
//! token records which of the two was written, so only the text form decodes.

use crate::{
    abi::{
        self,
        B256,
    },
    error::{
        DecodingError,
        EncodingError,
    },
    events::{
        Address,
        is_address_shaped,
    },
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use std::{
    fmt,
    str::FromStr,
};

pub const TOKEN_LEN: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InviteToken([u8; TOKEN_LEN]);

impl InviteToken {
    pub const ZERO: InviteToken = InviteToken([0u8; TOKEN_LEN]);

    pub fn from_bytes(bytes: [u8; TOKEN_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_address(address: &Address) -> Self {
        Self(alloy_primitives::Address::from(*address).into_word().0)
    }

    pub fn to_word(&self) -> B256 {
        B256::new(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; TOKEN_LEN]
    }
}

/// Encodes user input into a token: empty -> zero token, `0x` + 40 hex ->
/// address form, anything else -> text form.
pub fn encode(input: &str) -> Result<InviteToken, EncodingError> {
    if input.is_empty() {
        return Ok(InviteToken::ZERO);
    }
    if is_address_shaped(input)
        && let Ok(address) = input.parse::<Address>()
    {
        return Ok(InviteToken::from_address(&address));
    }
    encode_text(input)
}

/// Text form only, even for input that looks like an address.
pub fn encode_text(input: &str) -> Result<InviteToken, EncodingError> {
    let bytes = input.as_bytes();
    if bytes.len() > TOKEN_LEN {
        return Err(EncodingError::TooLong { len: bytes.len() });
    }
    let mut out = [0u8; TOKEN_LEN];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(InviteToken(out))
}

/// Display form of a text token. Never fails: malformed tokens decode to "".
pub fn decode(token: &InviteToken) -> String {
    match try_decode(token) {
        Ok(text) => text,
        Err(err) => {
            tracing::debug!(%token, ?err, "invite token is not valid text");
            String::new()
        }
    }
}

pub fn try_decode(token: &InviteToken) -> Result<String, DecodingError> {
    if token.is_zero() {
        return Ok(String::new());
    }
    let text = std::str::from_utf8(&token.0).map_err(|_| DecodingError::InvalidUtf8)?;
    Ok(text
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string())
}

impl fmt::Display for InviteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&abi::to_hex(self.0))
    }
}

impl fmt::Debug for InviteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InviteToken({self})")
    }
}

impl FromStr for InviteToken {
    type Err = DecodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = abi::from_hex(s.trim())?;
        let bytes: [u8; TOKEN_LEN] =
            bytes
                .try_into()
                .map_err(|bytes: Vec<u8>| DecodingError::WrongLength {
                    expected: TOKEN_LEN,
                    got: bytes.len(),
                })?;
        Ok(Self(bytes))
    }
}

impl Serialize for InviteToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InviteToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode__empty_input_yields_zero_token() {
        // when
        let token = encode("").unwrap();

        // then
        assert_eq!(token, InviteToken::ZERO);
        assert_eq!(decode(&token), "");
    }

    #[test]
    fn encode__address_is_right_aligned() {
        // given
        let input = "0x1111111111111111111111111111111111111111";

        // when
        let token = encode(input).unwrap();

        // then
        assert_eq!(&token.as_bytes()[..12], &[0u8; 12]);
        assert_eq!(&token.as_bytes()[12..], &[0x11u8; 20]);
    }

    #[test]
    fn encode__text_is_left_aligned_and_zero_padded() {
        // when
        let token = encode("king").unwrap();

        // then
        assert_eq!(&token.as_bytes()[..4], b"king");
        assert!(token.as_bytes()[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn encode__rejects_more_than_32_bytes() {
        // given
        let input = "a".repeat(33);

        // when
        let result = encode(&input);

        // then
        assert_eq!(result, Err(EncodingError::TooLong { len: 33 }));
    }

    #[test]
    fn encode__counts_utf8_bytes_not_chars() {
        // given
        let input = "é".repeat(17); // 34 bytes

        // then
        assert_eq!(encode(&input), Err(EncodingError::TooLong { len: 34 }));
        assert!(encode(&"é".repeat(16)).is_ok());
    }

    #[test]
    fn encode__near_miss_address_is_treated_as_text() {
        // given
        let input = "0x111111111111111111111111111111111111111"; // 39 digits

        // when
        let token = encode(input).unwrap();

        // then
        assert_eq!(decode(&token), input);
    }

    #[test]
    fn encode_text__keeps_address_looking_input_as_text() {
        // given
        let input = "0x12345678";

        // when
        let token = encode_text(input).unwrap();

        // then
        assert_eq!(&token.as_bytes()[..10], input.as_bytes());
    }

    #[test]
    fn decode__invalid_utf8_falls_back_to_empty() {
        // given
        let mut bytes = [0u8; 32];
        bytes[0] = 0xff;
        bytes[1] = 0xfe;
        let token = InviteToken::from_bytes(bytes);

        // then
        assert_eq!(try_decode(&token), Err(DecodingError::InvalidUtf8));
        assert_eq!(decode(&token), "");
    }

    #[test]
    fn decode__trims_trailing_whitespace_and_nuls() {
        // given
        let token = encode_text("vip  ").unwrap();

        // then
        assert_eq!(decode(&token), "vip");
    }

    #[test]
    fn from_str__parses_eth_call_result() {
        // given
        let token = encode("hello").unwrap();
        let rendered = token.to_string();

        // when
        let parsed: InviteToken = rendered.parse().unwrap();

        // then
        assert_eq!(parsed, token);
        assert_eq!(
            "0x00".parse::<InviteToken>(),
            Err(DecodingError::WrongLength {
                expected: 32,
                got: 1
            })
        );
    }

    #[test]
    fn decode__inverts_encode_at_the_byte_limit() {
        // given
        let input = "é".repeat(15) + "ab";

        // when
        let token = encode(&input).unwrap();

        // then
        assert_eq!(input.len(), TOKEN_LEN);
        assert_eq!(decode(&token), input);
    }

    /// Printable text cut to at most 32 bytes on a char boundary.
    fn text_code() -> impl Strategy<Value = String> {
        "\\PC{0,32}".prop_map(|raw| {
            let mut code = String::new();
            for c in raw.chars() {
                if code.len() + c.len_utf8() > TOKEN_LEN {
                    break;
                }
                code.push(c);
            }
            code
        })
    }

    proptest! {
        #[test]
        fn decode__inverts_encode_for_text_codes(input in text_code()) {
            prop_assume!(input.len() <= TOKEN_LEN);
            prop_assume!(!input.ends_with(|c: char| c == '\0' || c.is_whitespace()));
            prop_assume!(!is_address_shaped(&input));
            let token = encode(&input).unwrap();
            prop_assert_eq!(decode(&token), input);
        }
    }
}
