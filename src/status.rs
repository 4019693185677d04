//! Authoritative contract reads, grouped the way the view consumes them.

use crate::{
    app::chain_source::{
        ChainSource,
        StateField,
    },
    codec::{
        self,
        InviteToken,
    },
    error::SourceError,
    events::Address,
};
use alloy_primitives::U256;
use serde::{
    Deserialize,
    Serialize,
};

#[derive(PartialEq, Eq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundStatus {
    pub round: u64,
    pub active: bool,
    pub time_left: u64,
    /// `None` while nobody has written in this round.
    pub last_player: Option<Address>,
    pub entrance_fee: U256,
    pub pot: U256,
}

#[derive(PartialEq, Eq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountStatus {
    pub account: Address,
    pub invite_code: String,
    pub invitee_count: u64,
    pub referral_rewards: U256,
    pub has_access: bool,
    pub visible_pot: U256,
    /// Native coin held by the account, in wei.
    pub balance: U256,
}

pub async fn read_round_status<S: ChainSource>(source: &S) -> Result<RoundStatus, SourceError> {
    let (round, active, time_left, last_player, entrance_fee, pot) = futures::try_join!(
        source.read_state(StateField::CurrentRound),
        source.read_state(StateField::RoundActive),
        source.read_state(StateField::TimeLeft),
        source.read_state(StateField::LastPlayer),
        source.read_state(StateField::EntranceFee),
        source.read_state(StateField::Pot),
    )?;
    let last_player = last_player.as_address()?;
    Ok(RoundStatus {
        round: round.as_u64()?,
        active: active.as_bool()?,
        time_left: time_left.as_u64()?,
        last_player: (!last_player.is_zero()).then_some(last_player),
        entrance_fee: entrance_fee.as_uint()?,
        pot: pot.as_uint()?,
    })
}

pub async fn read_account_status<S: ChainSource>(
    source: &S,
    account: Address,
) -> Result<AccountStatus, SourceError> {
    let (invite_code, invitee_count, referral_rewards, has_access, visible_pot, balance) =
        futures::try_join!(
            source.read_state(StateField::InviteCodeOf(account)),
            source.read_state(StateField::InviteeCount(account)),
            source.read_state(StateField::ReferralRewardReceived(account)),
            source.read_state(StateField::HasAccess(account)),
            source.read_state(StateField::VisiblePot(account)),
            source.balance(account),
        )?;
    Ok(AccountStatus {
        account,
        invite_code: codec::decode(&InviteToken::from_bytes(invite_code.as_bytes32()?)),
        invitee_count: invitee_count.as_u64()?,
        referral_rewards: referral_rewards.as_uint()?,
        has_access: has_access.as_bool()?,
        visible_pot: visible_pot.as_uint()?,
        balance,
    })
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::app::{
        chain_source::StateValue,
        in_memory_source::InMemoryChainSource,
    };

    fn alice() -> Address {
        Address::new([0xa1; 20])
    }

    #[tokio::test]
    async fn read_round_status__collects_round_reads() {
        // given
        let source = InMemoryChainSource::new();
        source.set_round(4, true, 95);
        source.set_state(StateField::LastPlayer, StateValue::Address(alice()));
        source.set_state(StateField::EntranceFee, StateValue::Uint(U256::from(10_000)));
        source.set_state(StateField::Pot, StateValue::Uint(U256::from(250_000)));

        // when
        let status = read_round_status(&source).await.unwrap();

        // then
        assert_eq!(
            status,
            RoundStatus {
                round: 4,
                active: true,
                time_left: 95,
                last_player: Some(alice()),
                entrance_fee: U256::from(10_000),
                pot: U256::from(250_000),
            }
        );
    }

    #[tokio::test]
    async fn read_round_status__zero_last_player_means_nobody() {
        // given
        let source = InMemoryChainSource::new();

        // when
        let status = read_round_status(&source).await.unwrap();

        // then
        assert_eq!(status.last_player, None);
        assert!(!status.active);
    }

    #[tokio::test]
    async fn read_account_status__decodes_invite_code() {
        // given
        let source = InMemoryChainSource::new();
        let code = codec::encode_text("whale").unwrap();
        source.set_state(
            StateField::InviteCodeOf(alice()),
            StateValue::Bytes32(*code.as_bytes()),
        );
        source.set_state(StateField::InviteeCount(alice()), StateValue::Uint(U256::from(3)));
        source.set_state(StateField::HasAccess(alice()), StateValue::Bool(true));
        source.set_balance(alice(), U256::from(1_500_000_000_000_000_000u128));

        // when
        let status = read_account_status(&source, alice()).await.unwrap();

        // then
        assert_eq!(status.invite_code, "whale");
        assert_eq!(status.invitee_count, 3);
        assert!(status.has_access);
        assert_eq!(status.referral_rewards, U256::ZERO);
        assert_eq!(status.balance, U256::from(1_500_000_000_000_000_000u128));
    }

    #[tokio::test]
    async fn read_account_status__type_mismatch_is_invalid_response() {
        // given
        let source = InMemoryChainSource::new();
        source.set_state(StateField::InviteeCount(alice()), StateValue::Bool(true));

        // when
        let result = read_account_status(&source, alice()).await;

        // then
        assert!(matches!(result, Err(SourceError::InvalidResponse(_))));
    }
}
