//! Bindings for the round contract and the hex helpers the adapters share.

use crate::error::DecodingError;
use alloy_primitives::U256;
use alloy_sol_types::SolCall;

pub use alloy_primitives::{
    B256,
    keccak256,
};

pub mod fomo_types {
    alloy_sol_types::sol! {
        interface IFomoKing {
            event NewMessage(address indexed player, string message, uint256 timestamp);
            event RoundWon(address indexed winner, uint256 amount, uint256 round);

            function sendMessage(string text, bytes32 inviter) external payable;
            function setInviteCode(bytes32 code) external;

            function timeLeft() external view returns (uint256);
            function roundActive() external view returns (bool);
            function lastPlayer() external view returns (address);
            function currentRound() external view returns (uint256);
            function entranceFee() external view returns (uint256);
            function pot() external view returns (uint256);
            function visiblePot() external view returns (uint256);
            function hasAccess(address account) external view returns (bool);
            function inviteCodeOf(address account) external view returns (bytes32);
            function inviteeCount(address account) external view returns (uint256);
            function referralRewardReceived(address account) external view returns (uint256);
        }
    }
}

pub fn abi_error(err: alloy_sol_types::Error) -> DecodingError {
    DecodingError::Abi(err.to_string())
}

/// Decodes what a read function returned.
pub fn decode_returns<C: SolCall>(data: &[u8]) -> Result<C::Return, DecodingError> {
    C::abi_decode_returns(data, true).map_err(abi_error)
}

pub fn u64_from(value: U256) -> Result<u64, DecodingError> {
    u64::try_from(value).map_err(|_| DecodingError::Overflow { target: "u64" })
}

pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex(raw: &str) -> Result<Vec<u8>, DecodingError> {
    let clean = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(clean).map_err(|e| DecodingError::InvalidHex(format!("{raw}: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::{
        fomo_types::IFomoKing,
        *,
    };

    #[test]
    fn selector__is_keccak_of_the_call_signature() {
        // when
        let hash = keccak256("sendMessage(string,bytes32)");

        // then
        assert_eq!(IFomoKing::sendMessageCall::SELECTOR, hash[..4]);
    }

    #[test]
    fn decode_returns__keeps_full_uint256_width() {
        // given
        let returned = U256::MAX.to_be_bytes::<32>();

        // when
        let pot = decode_returns::<IFomoKing::potCall>(&returned).unwrap();

        // then
        assert_eq!(pot._0, U256::MAX);
    }

    #[test]
    fn decode_returns__empty_return_data_is_an_abi_error() {
        // when
        let result = decode_returns::<IFomoKing::timeLeftCall>(&[]);

        // then
        assert!(matches!(result, Err(DecodingError::Abi(_))));
    }

    #[test]
    fn u64_from__rejects_values_above_u64() {
        // given
        let value = U256::from(u64::MAX) + U256::from(1);

        // then
        assert_eq!(
            u64_from(value),
            Err(DecodingError::Overflow { target: "u64" })
        );
        assert_eq!(u64_from(U256::from(7)), Ok(7));
    }

    #[test]
    fn from_hex__accepts_prefixed_and_bare_input() {
        assert_eq!(from_hex("0x0a0b").unwrap(), vec![10, 11]);
        assert_eq!(from_hex("0a0b").unwrap(), vec![10, 11]);
        assert!(from_hex("0xzz").is_err());
    }
}
