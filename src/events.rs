use crate::{
    abi::{
        self,
        B256,
        fomo_types::IFomoKing,
    },
    error::DecodingError,
};
use alloy_primitives::{
    self as primitives,
    U256,
};
use alloy_sol_types::SolEvent;
use chrono::DateTime;
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

/// 20-byte account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(primitives::Address);

impl Address {
    pub const ZERO: Address = Address(primitives::Address::ZERO);

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(primitives::Address::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0.0.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `0x1234...abcd`
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl From<primitives::Address> for Address {
    fn from(address: primitives::Address) -> Self {
        Self(address)
    }
}

impl From<Address> for primitives::Address {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// `0x` followed by exactly 40 hex digits, either case.
pub fn is_address_shaped(input: &str) -> bool {
    input.len() == 42
        && input.starts_with("0x")
        && input[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

impl FromStr for Address {
    type Err = DecodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !is_address_shaped(trimmed) {
            return Err(DecodingError::InvalidHex(format!(
                "'{s}' is not a 0x-prefixed 20-byte address"
            )));
        }
        let bytes = abi::from_hex(trimmed)?;
        Ok(Self(primitives::Address::from_slice(&bytes)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&abi::to_hex(self.as_bytes()))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash, Serialize, Deserialize)]
pub enum EventKind {
    NewMessage,
    RoundWon,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::NewMessage => "NewMessage",
            EventKind::RoundWon => "RoundWon",
        }
    }

    pub fn signature(self) -> &'static str {
        match self {
            EventKind::NewMessage => IFomoKing::NewMessage::SIGNATURE,
            EventKind::RoundWon => IFomoKing::RoundWon::SIGNATURE,
        }
    }

    pub fn topic(self) -> B256 {
        match self {
            EventKind::NewMessage => IFomoKing::NewMessage::SIGNATURE_HASH,
            EventKind::RoundWon => IFomoKing::RoundWon::SIGNATURE_HASH,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An undecoded contract log as returned by the chain source.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct RawLog {
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub log_index: u64,
}

impl RawLog {
    fn from_event(event: &impl SolEvent, block_number: u64, log_index: u64) -> Self {
        let encoded = event.encode_log_data();
        Self {
            topics: encoded.topics().to_vec(),
            data: encoded.data.to_vec(),
            block_number,
            log_index,
        }
    }
}

/// One contribution to the current round.
///
/// Two messages are the same message when author, timestamp and text all
/// match; there is no other event id to go by.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub author: Address,
    pub text: String,
    pub timestamp: u64,
}

impl Message {
    pub fn new(author: Address, text: impl Into<String>, timestamp: u64) -> Self {
        Self {
            author,
            text: text.into(),
            timestamp,
        }
    }

    /// UTC wall-clock time of the message, `HH:MM:SS`.
    pub fn time_label(&self) -> String {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|time| time.format("%H:%M:%S").to_string())
            .unwrap_or_default()
    }

    /// Encodes the message the way the contract emits it.
    pub fn to_log(&self, block_number: u64, log_index: u64) -> RawLog {
        let event = IFomoKing::NewMessage {
            player: self.author.into(),
            message: self.text.clone(),
            timestamp: U256::from(self.timestamp),
        };
        RawLog::from_event(&event, block_number, log_index)
    }
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct RoundWonEvent {
    pub winner: Address,
    pub amount: U256,
    pub round: u64,
}

impl RoundWonEvent {
    pub fn to_log(&self, block_number: u64, log_index: u64) -> RawLog {
        let event = IFomoKing::RoundWon {
            winner: self.winner.into(),
            amount: self.amount,
            round: U256::from(self.round),
        };
        RawLog::from_event(&event, block_number, log_index)
    }
}

/// A typed contract event that can be decoded from a [`RawLog`].
pub trait ContractEvent: Sized + Send + 'static {
    const KIND: EventKind;

    fn from_log(log: &RawLog) -> Result<Self, DecodingError>;
}

impl ContractEvent for Message {
    const KIND: EventKind = EventKind::NewMessage;

    fn from_log(log: &RawLog) -> Result<Self, DecodingError> {
        let event: IFomoKing::NewMessage = decode_event(log, Self::KIND)?;
        Ok(Message {
            author: event.player.into(),
            text: event.message,
            timestamp: abi::u64_from(event.timestamp)?,
        })
    }
}

impl ContractEvent for RoundWonEvent {
    const KIND: EventKind = EventKind::RoundWon;

    fn from_log(log: &RawLog) -> Result<Self, DecodingError> {
        let event: IFomoKing::RoundWon = decode_event(log, Self::KIND)?;
        Ok(RoundWonEvent {
            winner: event.winner.into(),
            amount: event.amount,
            round: abi::u64_from(event.round)?,
        })
    }
}

fn decode_event<E: SolEvent>(log: &RawLog, kind: EventKind) -> Result<E, DecodingError> {
    if log.topics.first() != Some(&kind.topic()) {
        return Err(DecodingError::UnexpectedLayout { event: kind.name() });
    }
    E::decode_raw_log(log.topics.iter().copied(), &log.data, true).map_err(abi::abi_error)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn alice() -> Address {
        "0x1111111111111111111111111111111111111111".parse().unwrap()
    }

    #[test]
    fn from_str__parses_mixed_case_address() {
        // given
        let raw = "0xAbCdEf0000000000000000000000000000001234";

        // when
        let address: Address = raw.parse().unwrap();

        // then
        assert_eq!(address.to_string(), raw.to_lowercase());
        assert_eq!(address.short(), "0xabcd...1234");
    }

    #[test]
    fn from_str__rejects_wrong_length() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("1111111111111111111111111111111111111111".parse::<Address>().is_err());
    }

    #[test]
    fn from_log__decodes_message_with_indexed_author() {
        // given
        let expected = Message::new(alice(), "first!", 1_700_000_123);
        let log = expected.to_log(42, 0);

        // when
        let actual = Message::from_log(&log).unwrap();

        // then
        assert_eq!(actual, expected);
    }

    #[test]
    fn from_log__truncated_data_is_an_abi_error() {
        // given
        let mut log = Message::new(alice(), "hello", 99).to_log(1, 3);
        log.data.truncate(40);

        // when
        let result = Message::from_log(&log);

        // then
        assert!(matches!(result, Err(DecodingError::Abi(_))));
    }

    #[test]
    fn from_log__rejects_log_of_another_event() {
        // given
        let won = RoundWonEvent {
            winner: alice(),
            amount: U256::from(5),
            round: 2,
        };
        let log = won.to_log(10, 0);

        // when
        let result = Message::from_log(&log);

        // then
        assert_eq!(
            result,
            Err(DecodingError::UnexpectedLayout {
                event: "NewMessage"
            })
        );
    }

    #[test]
    fn from_log__decodes_round_won() {
        // given
        let expected = RoundWonEvent {
            winner: alice(),
            amount: U256::MAX,
            round: 7,
        };

        // when
        let actual = RoundWonEvent::from_log(&expected.to_log(100, 1)).unwrap();

        // then
        assert_eq!(actual, expected);
    }

    #[test]
    fn time_label__formats_utc_clock_time() {
        // given
        let message = Message::new(alice(), "x", 3_661);

        // then
        assert_eq!(message.time_label(), "01:01:01");
    }

    #[test]
    fn serialize__renders_address_as_hex_string() {
        // given
        let message = Message::new(alice(), "hey", 1);

        // when
        let json = serde_json::to_value(&message).unwrap();

        // then
        assert_eq!(
            json["author"],
            "0x1111111111111111111111111111111111111111"
        );
        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, message);
    }
}
