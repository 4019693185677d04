use crate::{
    abi::{
        self,
        fomo_types::IFomoKing,
    },
    error::{
        DecodingError,
        SourceError,
    },
    events::{
        Address,
        EventKind,
        RawLog,
    },
};
use alloy_primitives::U256;
use alloy_sol_types::SolCall;
use std::time::Duration;
use tokio::{
    sync::{
        mpsc,
        oneshot,
    },
    task::JoinHandle,
    time,
};

/// Everything the round view needs from the contract and the node behind it.
pub trait ChainSource {
    fn latest_block(&self) -> impl Future<Output = Result<u64, SourceError>> + Send;

    fn read_state(
        &self,
        field: StateField,
    ) -> impl Future<Output = Result<StateValue, SourceError>> + Send;

    /// Native coin balance of `account` at the latest block, in wei.
    fn balance(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<U256, SourceError>> + Send;

    /// Logs of `kind` emitted in `from_block..=to_block`, in log order.
    fn query_events(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<RawLog>, SourceError>> + Send;

    fn subscribe(
        &self,
        kind: EventKind,
    ) -> impl Future<Output = Result<Subscription, SourceError>> + Send;
}

/// Read functions exposed by the round contract.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub enum StateField {
    TimeLeft,
    RoundActive,
    LastPlayer,
    CurrentRound,
    EntranceFee,
    Pot,
    /// Pot as seen by `viewer`; zero for accounts without access.
    VisiblePot(Address),
    HasAccess(Address),
    InviteCodeOf(Address),
    InviteeCount(Address),
    ReferralRewardReceived(Address),
}

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum OutputKind {
    Uint,
    Bool,
    Address,
    Bytes32,
}

impl StateField {
    pub fn signature(&self) -> &'static str {
        match self {
            StateField::TimeLeft => IFomoKing::timeLeftCall::SIGNATURE,
            StateField::RoundActive => IFomoKing::roundActiveCall::SIGNATURE,
            StateField::LastPlayer => IFomoKing::lastPlayerCall::SIGNATURE,
            StateField::CurrentRound => IFomoKing::currentRoundCall::SIGNATURE,
            StateField::EntranceFee => IFomoKing::entranceFeeCall::SIGNATURE,
            StateField::Pot => IFomoKing::potCall::SIGNATURE,
            StateField::VisiblePot(_) => IFomoKing::visiblePotCall::SIGNATURE,
            StateField::HasAccess(_) => IFomoKing::hasAccessCall::SIGNATURE,
            StateField::InviteCodeOf(_) => IFomoKing::inviteCodeOfCall::SIGNATURE,
            StateField::InviteeCount(_) => IFomoKing::inviteeCountCall::SIGNATURE,
            StateField::ReferralRewardReceived(_) => {
                IFomoKing::referralRewardReceivedCall::SIGNATURE
            }
        }
    }

    /// ABI-encoded call of the read function.
    pub fn calldata(&self) -> Vec<u8> {
        match *self {
            StateField::TimeLeft => IFomoKing::timeLeftCall {}.abi_encode(),
            StateField::RoundActive => IFomoKing::roundActiveCall {}.abi_encode(),
            StateField::LastPlayer => IFomoKing::lastPlayerCall {}.abi_encode(),
            StateField::CurrentRound => IFomoKing::currentRoundCall {}.abi_encode(),
            StateField::EntranceFee => IFomoKing::entranceFeeCall {}.abi_encode(),
            StateField::Pot => IFomoKing::potCall {}.abi_encode(),
            StateField::VisiblePot(_) => IFomoKing::visiblePotCall {}.abi_encode(),
            StateField::HasAccess(account) => IFomoKing::hasAccessCall {
                account: account.into(),
            }
            .abi_encode(),
            StateField::InviteCodeOf(account) => IFomoKing::inviteCodeOfCall {
                account: account.into(),
            }
            .abi_encode(),
            StateField::InviteeCount(account) => IFomoKing::inviteeCountCall {
                account: account.into(),
            }
            .abi_encode(),
            StateField::ReferralRewardReceived(account) => {
                IFomoKing::referralRewardReceivedCall {
                    account: account.into(),
                }
                .abi_encode()
            }
        }
    }

    /// Decodes what the read function returned.
    pub fn decode_output(&self, returned: &[u8]) -> Result<StateValue, DecodingError> {
        use IFomoKing::*;

        let value = match self {
            StateField::TimeLeft => StateValue::Uint(abi::decode_returns::<timeLeftCall>(returned)?._0),
            StateField::RoundActive => {
                StateValue::Bool(abi::decode_returns::<roundActiveCall>(returned)?._0)
            }
            StateField::LastPlayer => {
                StateValue::Address(abi::decode_returns::<lastPlayerCall>(returned)?._0.into())
            }
            StateField::CurrentRound => {
                StateValue::Uint(abi::decode_returns::<currentRoundCall>(returned)?._0)
            }
            StateField::EntranceFee => {
                StateValue::Uint(abi::decode_returns::<entranceFeeCall>(returned)?._0)
            }
            StateField::Pot => StateValue::Uint(abi::decode_returns::<potCall>(returned)?._0),
            StateField::VisiblePot(_) => {
                StateValue::Uint(abi::decode_returns::<visiblePotCall>(returned)?._0)
            }
            StateField::HasAccess(_) => {
                StateValue::Bool(abi::decode_returns::<hasAccessCall>(returned)?._0)
            }
            StateField::InviteCodeOf(_) => {
                StateValue::Bytes32(abi::decode_returns::<inviteCodeOfCall>(returned)?._0.0)
            }
            StateField::InviteeCount(_) => {
                StateValue::Uint(abi::decode_returns::<inviteeCountCall>(returned)?._0)
            }
            StateField::ReferralRewardReceived(_) => StateValue::Uint(
                abi::decode_returns::<referralRewardReceivedCall>(returned)?._0,
            ),
        };
        Ok(value)
    }

    /// Address the call has to be made from (`msg.sender` dependent reads).
    pub fn caller(&self) -> Option<Address> {
        match self {
            StateField::VisiblePot(viewer) => Some(*viewer),
            _ => None,
        }
    }

    pub fn output(&self) -> OutputKind {
        match self {
            StateField::RoundActive | StateField::HasAccess(_) => OutputKind::Bool,
            StateField::LastPlayer => OutputKind::Address,
            StateField::InviteCodeOf(_) => OutputKind::Bytes32,
            _ => OutputKind::Uint,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum StateValue {
    Uint(U256),
    Bool(bool),
    Address(Address),
    Bytes32([u8; 32]),
}

impl StateValue {
    /// What an unset storage slot of `kind` reads as.
    pub fn zero(kind: OutputKind) -> Self {
        match kind {
            OutputKind::Uint => StateValue::Uint(U256::ZERO),
            OutputKind::Bool => StateValue::Bool(false),
            OutputKind::Address => StateValue::Address(Address::ZERO),
            OutputKind::Bytes32 => StateValue::Bytes32([0u8; 32]),
        }
    }

    pub fn as_uint(&self) -> Result<U256, SourceError> {
        match self {
            StateValue::Uint(value) => Ok(*value),
            other => Err(mismatch("uint", other)),
        }
    }

    pub fn as_u64(&self) -> Result<u64, SourceError> {
        abi::u64_from(self.as_uint()?)
            .map_err(|err| SourceError::InvalidResponse(format!("{self:?}: {err}")))
    }

    pub fn as_bool(&self) -> Result<bool, SourceError> {
        match self {
            StateValue::Bool(value) => Ok(*value),
            other => Err(mismatch("bool", other)),
        }
    }

    pub fn as_address(&self) -> Result<Address, SourceError> {
        match self {
            StateValue::Address(value) => Ok(*value),
            other => Err(mismatch("address", other)),
        }
    }

    pub fn as_bytes32(&self) -> Result<[u8; 32], SourceError> {
        match self {
            StateValue::Bytes32(value) => Ok(*value),
            other => Err(mismatch("bytes32", other)),
        }
    }
}

fn mismatch(expected: &str, got: &StateValue) -> SourceError {
    SourceError::InvalidResponse(format!("expected {expected}, got {got:?}"))
}

const UNSUBSCRIBE_GRACE: Duration = Duration::from_secs(2);

/// Handle to a live event feed.
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) stops the
/// feed: nothing is delivered through it afterwards.
pub struct Subscription {
    kind: EventKind,
    events: mpsc::UnboundedReceiver<RawLog>,
    cancel: Option<oneshot::Sender<()>>,
    producer: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(kind: EventKind, events: mpsc::UnboundedReceiver<RawLog>) -> Self {
        Self {
            kind,
            events,
            cancel: None,
            producer: None,
        }
    }

    /// A feed driven by a background task that stops once `cancel` fires or
    /// its sender is dropped.
    pub fn with_producer(
        kind: EventKind,
        events: mpsc::UnboundedReceiver<RawLog>,
        cancel: oneshot::Sender<()>,
        producer: JoinHandle<()>,
    ) -> Self {
        Self {
            kind,
            events,
            cancel: Some(cancel),
            producer: Some(producer),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Next raw log, or `None` once the producer has gone away.
    pub async fn recv(&mut self) -> Option<RawLog> {
        self.events.recv().await
    }

    pub async fn unsubscribe(mut self) {
        self.events.close();
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(mut producer) = self.producer.take() {
            if time::timeout(UNSUBSCRIBE_GRACE, &mut producer).await.is_err() {
                tracing::debug!(kind = %self.kind, "producer did not stop in time, aborting");
                producer.abort();
            }
        }
        tracing::debug!(kind = %self.kind, "unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}
