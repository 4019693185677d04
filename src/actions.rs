//! Writes against the round contract: validating user input, composing the
//! call and handing it to a [`TransactionSubmitter`].

use crate::{
    abi::{
        self,
        fomo_types::IFomoKing,
    },
    codec::{
        self,
        InviteToken,
    },
    error::{
        ActionError,
        DecodingError,
        SubmissionError,
    },
    events::Address,
};
use alloy_primitives::U256;
use alloy_sol_types::SolCall;
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

pub const MAX_MESSAGE_CHARS: usize = 200;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&abi::to_hex(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl FromStr for TxHash {
    type Err = DecodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = abi::from_hex(s.trim())?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            DecodingError::WrongLength {
                expected: 32,
                got: bytes.len(),
            }
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Action {
    /// Posts a message, taking over as last player. `inviter` credits a
    /// referrer on the sender's first message.
    SendMessage { text: String, inviter: InviteToken },
    /// Registers the sender's own invite code.
    SetInviteCode { code: InviteToken },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::SendMessage { .. } => "sendMessage",
            Action::SetInviteCode { .. } => "setInviteCode",
        }
    }

    pub fn signature(&self) -> &'static str {
        match self {
            Action::SendMessage { .. } => IFomoKing::sendMessageCall::SIGNATURE,
            Action::SetInviteCode { .. } => IFomoKing::setInviteCodeCall::SIGNATURE,
        }
    }
}

/// A composed contract write: what to call and how much value to attach.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct ContractCall {
    pub action: Action,
    pub value: U256,
}

impl ContractCall {
    pub fn calldata(&self) -> Vec<u8> {
        match &self.action {
            Action::SendMessage { text, inviter } => IFomoKing::sendMessageCall {
                text: text.clone(),
                inviter: inviter.to_word(),
            }
            .abi_encode(),
            Action::SetInviteCode { code } => IFomoKing::setInviteCodeCall {
                code: code.to_word(),
            }
            .abi_encode(),
        }
    }
}

pub trait TransactionSubmitter {
    fn submit(
        &self,
        call: &ContractCall,
    ) -> impl Future<Output = Result<TxHash, SubmissionError>> + Send;
}

/// Validates and composes a `sendMessage` write.
///
/// `invite_input` goes through [`codec::encode`], so it may be an address or
/// a text code. `entrance_fee` is the last value read from the contract.
pub fn prepare_send_message(
    text: &str,
    invite_input: &str,
    sender: Option<&Address>,
    entrance_fee: Option<U256>,
) -> Result<ContractCall, ActionError> {
    let value = entrance_fee.ok_or(ActionError::FeeNotLoaded)?;
    if text.trim().is_empty() {
        return Err(ActionError::EmptyMessage);
    }
    let len = text.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(ActionError::MessageTooLong {
            len,
            max: MAX_MESSAGE_CHARS,
        });
    }
    let invite_input = invite_input.trim();
    if let Some(sender) = sender
        && !invite_input.is_empty()
        && invite_input.eq_ignore_ascii_case(&sender.to_string())
    {
        return Err(ActionError::SelfInvite);
    }
    let inviter = codec::encode(invite_input)?;
    Ok(ContractCall {
        action: Action::SendMessage {
            text: text.to_string(),
            inviter,
        },
        value,
    })
}

pub fn prepare_set_invite_code(code: &str) -> Result<ContractCall, ActionError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ActionError::EmptyInviteCode);
    }
    Ok(ContractCall {
        action: Action::SetInviteCode {
            code: codec::encode_text(code)?,
        },
        value: U256::ZERO,
    })
}

impl SubmissionError {
    /// Maps a wallet or node error message onto the failure the user sees.
    pub fn classify(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        if lowered.contains("user rejected") || lowered.contains("user denied") {
            SubmissionError::UserCancelled
        } else if lowered.contains("insufficient funds") {
            SubmissionError::InsufficientResources
        } else {
            SubmissionError::Rejected(raw.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn sender() -> Address {
        "0xabcdef0000000000000000000000000000000001".parse().unwrap()
    }

    #[test]
    fn selector__matches_contract_functions() {
        // given
        let send = Action::SendMessage {
            text: String::new(),
            inviter: InviteToken::ZERO,
        };
        let set = Action::SetInviteCode {
            code: InviteToken::ZERO,
        };

        // then
        assert_eq!(send.signature(), "sendMessage(string,bytes32)");
        assert_eq!(set.signature(), "setInviteCode(bytes32)");
        assert_eq!(set.name(), "setInviteCode");
    }

    #[test]
    fn prepare_send_message__attaches_fee_and_encoded_invite() {
        // when
        let fee = U256::from(1_000);
        let call = prepare_send_message("gm", "king", Some(&sender()), Some(fee)).unwrap();

        // then
        assert_eq!(call.value, fee);
        assert_eq!(
            call.action,
            Action::SendMessage {
                text: "gm".to_string(),
                inviter: codec::encode("king").unwrap(),
            }
        );
    }

    #[test]
    fn prepare_send_message__requires_loaded_fee() {
        // when
        let result = prepare_send_message("gm", "", Some(&sender()), None);

        // then
        assert_eq!(result, Err(ActionError::FeeNotLoaded));
    }

    #[test]
    fn prepare_send_message__rejects_blank_text() {
        // when
        let result = prepare_send_message("   ", "", None, Some(U256::from(1)));

        // then
        assert_eq!(result, Err(ActionError::EmptyMessage));
    }

    #[test]
    fn prepare_send_message__counts_characters_not_bytes() {
        // given
        let fits = "漢".repeat(MAX_MESSAGE_CHARS);
        let too_long = "a".repeat(MAX_MESSAGE_CHARS + 1);

        // then
        assert!(prepare_send_message(&fits, "", None, Some(U256::from(1))).is_ok());
        assert_eq!(
            prepare_send_message(&too_long, "", None, Some(U256::from(1))),
            Err(ActionError::MessageTooLong { len: 201, max: 200 })
        );
    }

    #[test]
    fn prepare_send_message__rejects_own_address_in_any_case() {
        // given
        let own = sender().to_string().to_uppercase().replacen("0X", "0x", 1);

        // when
        let result = prepare_send_message("gm", &own, Some(&sender()), Some(U256::from(1)));

        // then
        assert_eq!(result, Err(ActionError::SelfInvite));
    }

    #[test]
    fn prepare_send_message__oversized_invite_is_an_encoding_error() {
        // when
        let result = prepare_send_message("gm", &"x".repeat(40), None, Some(U256::from(1)));

        // then
        assert!(matches!(result, Err(ActionError::Encoding(_))));
    }

    #[test]
    fn prepare_set_invite_code__stores_text_form_without_value() {
        // when
        let call = prepare_set_invite_code("vip").unwrap();

        // then
        assert_eq!(call.value, U256::ZERO);
        assert_eq!(
            call.action,
            Action::SetInviteCode {
                code: codec::encode_text("vip").unwrap()
            }
        );
        assert_eq!(prepare_set_invite_code(" "), Err(ActionError::EmptyInviteCode));
    }

    #[test]
    fn calldata__encodes_string_and_token() {
        // given
        let call = prepare_send_message("hi", "", None, Some(U256::from(1))).unwrap();

        // when
        let data = call.calldata();

        // then
        assert_eq!(data[..4], IFomoKing::sendMessageCall::SELECTOR);
        // head: offset, token; tail: length, padded bytes
        assert_eq!(data.len(), 4 + 4 * 32);
        assert_eq!(data[4 + 31], 0x40);
        assert_eq!(&data[4 + 32..4 + 64], &[0u8; 32]);
        assert_eq!(data[4 + 95], 2);
        assert_eq!(&data[4 + 96..4 + 98], b"hi");
    }

    #[test]
    fn classify__maps_known_wallet_errors() {
        assert_eq!(
            SubmissionError::classify("MetaMask Tx Signature: User rejected the request."),
            SubmissionError::UserCancelled
        );
        assert_eq!(
            SubmissionError::classify("insufficient funds for gas * price + value"),
            SubmissionError::InsufficientResources
        );
        assert_eq!(
            SubmissionError::classify("execution reverted: InvalidCode"),
            SubmissionError::Rejected("execution reverted: InvalidCode".to_string())
        );
    }
}
