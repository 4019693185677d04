use crate::{
    abi,
    actions::{
        Action,
        ContractCall,
        TransactionSubmitter,
        TxHash,
    },
    app::chain_source::{
        ChainSource,
        StateField,
        StateValue,
        Subscription,
    },
    error::{
        SourceError,
        SubmissionError,
    },
    events::{
        Address,
        EventKind,
        Message,
        RawLog,
        RoundWonEvent,
    },
};
use alloy_primitives::U256;
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tokio::sync::mpsc;

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// In-process chain: logs, contract state and live feeds kept in memory.
///
/// Clones share the same chain, so a test can keep one handle while the
/// session owns another.
#[derive(Clone, Default)]
pub struct InMemoryChainSource {
    inner: Arc<Mutex<Chain>>,
}

#[derive(Default)]
struct Chain {
    block: u64,
    timestamp: u64,
    logs: Vec<(EventKind, RawLog)>,
    state: HashMap<StateField, StateValue>,
    balances: HashMap<Address, U256>,
    subscribers: HashMap<EventKind, Vec<mpsc::UnboundedSender<RawLog>>>,
    unavailable: bool,
}

impl Chain {
    fn next_log_index(&self) -> u64 {
        self.logs
            .iter()
            .filter(|(_, log)| log.block_number == self.block)
            .count() as u64
    }

    fn emit(&mut self, kind: EventKind, log: RawLog) {
        let subscribers = self.subscribers.entry(kind).or_default();
        subscribers.retain(|tx| tx.send(log.clone()).is_ok());
    }
}

impl InMemoryChainSource {
    pub fn new() -> Self {
        let source = Self::default();
        source.chain().timestamp = GENESIS_TIMESTAMP;
        source
    }

    fn chain(&self) -> MutexGuard<'_, Chain> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_block(&self, block: u64) {
        self.chain().block = block;
    }

    /// Mines `blocks` empty blocks, one second apart.
    pub fn advance_block(&self, blocks: u64) {
        let mut chain = self.chain();
        chain.block += blocks;
        chain.timestamp += blocks;
    }

    pub fn block(&self) -> u64 {
        self.chain().block
    }

    pub fn block_timestamp(&self) -> u64 {
        self.chain().timestamp
    }

    /// Stores a historical log without notifying live subscribers.
    pub fn push_log(&self, kind: EventKind, log: RawLog) {
        self.chain().logs.push((kind, log));
    }

    /// Pushes a log to live subscribers only.
    pub fn emit(&self, kind: EventKind, log: RawLog) {
        self.chain().emit(kind, log);
    }

    /// Mines `message` into a new block and notifies live subscribers.
    pub fn record_message(&self, message: &Message) -> RawLog {
        self.record(EventKind::NewMessage, |block, index| {
            message.to_log(block, index)
        })
    }

    pub fn record_round_won(&self, event: &RoundWonEvent) -> RawLog {
        self.record(EventKind::RoundWon, |block, index| event.to_log(block, index))
    }

    fn record(&self, kind: EventKind, to_log: impl FnOnce(u64, u64) -> RawLog) -> RawLog {
        let mut chain = self.chain();
        chain.block += 1;
        chain.timestamp += 1;
        let log = to_log(chain.block, chain.next_log_index());
        chain.logs.push((kind, log.clone()));
        chain.emit(kind, log.clone());
        log
    }

    pub fn set_state(&self, field: StateField, value: StateValue) {
        self.chain().state.insert(field, value);
    }

    /// Seeds the round-level reads in one go.
    pub fn set_round(&self, round: u64, active: bool, time_left: u64) {
        let mut chain = self.chain();
        chain
            .state
            .insert(StateField::CurrentRound, StateValue::Uint(U256::from(round)));
        chain
            .state
            .insert(StateField::RoundActive, StateValue::Bool(active));
        chain
            .state
            .insert(StateField::TimeLeft, StateValue::Uint(U256::from(time_left)));
    }

    pub fn set_balance(&self, account: Address, wei: U256) {
        self.chain().balances.insert(account, wei);
    }

    /// While set, every call fails with [`SourceError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.chain().unavailable = unavailable;
    }

    /// Live subscriptions of `kind` whose receiver is still open.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let mut chain = self.chain();
        let subscribers = chain.subscribers.entry(kind).or_default();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// Drops every live feed, as a node does when it loses its filters.
    pub fn close_subscriptions(&self) {
        self.chain().subscribers.clear();
    }

    fn check_available(chain: &Chain) -> Result<(), SourceError> {
        if chain.unavailable {
            return Err(SourceError::Unavailable("in-memory source switched off".into()));
        }
        Ok(())
    }
}

impl ChainSource for InMemoryChainSource {
    async fn latest_block(&self) -> Result<u64, SourceError> {
        let chain = self.chain();
        Self::check_available(&chain)?;
        Ok(chain.block)
    }

    async fn read_state(&self, field: StateField) -> Result<StateValue, SourceError> {
        let chain = self.chain();
        Self::check_available(&chain)?;
        Ok(chain
            .state
            .get(&field)
            .copied()
            .unwrap_or_else(|| StateValue::zero(field.output())))
    }

    async fn balance(&self, account: Address) -> Result<U256, SourceError> {
        let chain = self.chain();
        Self::check_available(&chain)?;
        Ok(chain.balances.get(&account).copied().unwrap_or_default())
    }

    async fn query_events(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, SourceError> {
        let chain = self.chain();
        Self::check_available(&chain)?;
        Ok(chain
            .logs
            .iter()
            .filter(|(log_kind, log)| {
                *log_kind == kind
                    && (from_block..=to_block).contains(&log.block_number)
            })
            .map(|(_, log)| log.clone())
            .collect())
    }

    async fn subscribe(&self, kind: EventKind) -> Result<Subscription, SourceError> {
        let mut chain = self.chain();
        Self::check_available(&chain)?;
        let (tx, rx) = mpsc::unbounded_channel();
        chain.subscribers.entry(kind).or_default().push(tx);
        Ok(Subscription::new(kind, rx))
    }
}

/// Records submitted calls and answers with scripted outcomes.
///
/// When linked to a chain, a successful `sendMessage` is mined there as a
/// `NewMessage` from the linked sender.
#[derive(Clone, Default)]
pub struct InMemorySubmitter {
    inner: Arc<Mutex<Submissions>>,
}

#[derive(Default)]
struct Submissions {
    calls: Vec<ContractCall>,
    outcomes: VecDeque<SubmissionError>,
    chain: Option<(InMemoryChainSource, Address)>,
}

impl InMemorySubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn linked(chain: InMemoryChainSource, sender: Address) -> Self {
        let submitter = Self::default();
        submitter.submissions().chain = Some((chain, sender));
        submitter
    }

    fn submissions(&self) -> MutexGuard<'_, Submissions> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The next submission fails with `error`.
    pub fn fail_next(&self, error: SubmissionError) {
        self.submissions().outcomes.push_back(error);
    }

    pub fn calls(&self) -> Vec<ContractCall> {
        self.submissions().calls.clone()
    }
}

impl TransactionSubmitter for InMemorySubmitter {
    async fn submit(&self, call: &ContractCall) -> Result<TxHash, SubmissionError> {
        let mut submissions = self.submissions();
        if let Some(error) = submissions.outcomes.pop_front() {
            return Err(error);
        }
        submissions.calls.push(call.clone());
        let nonce = submissions.calls.len() as u64;
        if let Some((chain, sender)) = &submissions.chain
            && let Action::SendMessage { text, .. } = &call.action
        {
            let message = Message::new(*sender, text.clone(), chain.block_timestamp() + 1);
            chain.record_message(&message);
        }
        let mut preimage = call.calldata();
        preimage.extend(nonce.to_be_bytes());
        Ok(TxHash::new(abi::keccak256(preimage).0))
    }
}
