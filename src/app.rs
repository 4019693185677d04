use crate::{
    Result,
    app::chain_source::ChainSource,
    clock::{
        RoundClock,
        RoundPhase,
        format_countdown,
    },
    config::{
        AppConfig,
        PollConfig,
    },
    error::SourceError,
    events::{
        Address,
        ContractEvent,
        Message,
        RoundWonEvent,
    },
    fetcher::{
        EventLogFetcher,
        with_timeout,
    },
    snapshot::{
        MessageLine,
        RoundSnapshot,
    },
    status::{
        AccountStatus,
        RoundStatus,
        read_account_status,
        read_round_status,
    },
    subscriber::LiveSubscriber,
    wall::MessageWall,
};
use alloy_primitives::U256;
use std::{
    collections::VecDeque,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{
        self,
        Instant,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    info,
    warn,
};

pub mod chain_source;
pub mod in_memory_source;
pub mod json_rpc_source;


pub const MAX_NOTICES: usize = 10;
const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Continue,
    Exit,
}

/// Everything the session knows about the round. Only the control loop
/// mutates it.
#[derive(Debug)]
pub struct RoundView {
    wall: MessageWall,
    clock: RoundClock,
    phase: RoundPhase,
    display_limit: usize,
    account: Option<Address>,
    round: Option<RoundStatus>,
    account_status: Option<AccountStatus>,
    last_settlement: Option<RoundWonEvent>,
    notices: VecDeque<String>,
}

impl RoundView {
    pub fn new(display_limit: usize, retention: Option<usize>, account: Option<Address>) -> Self {
        let wall = match retention {
            Some(limit) => MessageWall::with_retention(limit),
            None => MessageWall::new(),
        };
        Self {
            wall,
            clock: RoundClock::new(),
            phase: RoundPhase::Waiting,
            display_limit,
            account,
            round: None,
            account_status: None,
            last_settlement: None,
            notices: VecDeque::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.display_limit, config.retention, config.account)
    }

    pub fn apply_messages(&mut self, batch: Vec<Message>) {
        self.wall.apply_batch(batch);
    }

    pub fn apply_live_message(&mut self, message: Message) -> bool {
        self.wall.apply_live(message)
    }

    pub fn reset_messages(&mut self) {
        self.wall.reset();
    }

    /// Takes a fresh read of the round; the countdown restarts from its
    /// `time_left` as of `read_at`. Returns the phase when it changed.
    pub fn apply_round_status(
        &mut self,
        status: RoundStatus,
        read_at: Instant,
    ) -> Option<RoundPhase> {
        self.clock.on_authoritative_read(status.time_left, read_at);
        self.round = Some(status);
        self.refresh_phase()
    }

    pub fn apply_account_status(&mut self, status: AccountStatus) {
        self.account_status = Some(status);
    }

    pub fn apply_round_won(&mut self, event: RoundWonEvent) {
        info!(round = event.round, winner = %event.winner, amount = %event.amount, "round won");
        self.last_settlement = Some(event);
    }

    pub fn record_failure(&mut self, what: &str, error: &SourceError) {
        self.notices.push_front(format!("{what} fetch failed: {error}"));
        self.notices.truncate(MAX_NOTICES);
    }

    /// Advances the countdown. Returns the phase when it changed.
    pub fn tick(&mut self, now: Instant) -> Option<RoundPhase> {
        self.clock.tick(now);
        self.refresh_phase()
    }

    fn refresh_phase(&mut self) -> Option<RoundPhase> {
        let active = self.round.as_ref().is_some_and(|round| round.active);
        let phase = RoundPhase::derive(active, self.clock.displayed_remaining());
        if phase == self.phase {
            return None;
        }
        debug!(from = %self.phase, to = %phase, "round phase changed");
        self.phase = phase;
        Some(phase)
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn wall(&self) -> &MessageWall {
        &self.wall
    }

    pub fn round(&self) -> Option<&RoundStatus> {
        self.round.as_ref()
    }

    pub fn entrance_fee(&self) -> Option<U256> {
        self.round.as_ref().map(|round| round.entrance_fee)
    }

    pub fn notices(&self) -> impl Iterator<Item = &String> {
        self.notices.iter()
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        let remaining = self.clock.displayed_remaining();
        let my_messages = self
            .account
            .map(|account| {
                self.wall
                    .by_author(&account)
                    .into_iter()
                    .map(MessageLine::from)
                    .collect()
            })
            .unwrap_or_default();
        RoundSnapshot {
            phase: self.phase,
            remaining_secs: remaining,
            countdown: format_countdown(remaining),
            round: self.round.clone(),
            account: self.account_status.clone(),
            message_count: self.wall.len(),
            recent_messages: self
                .wall
                .recent(self.display_limit)
                .iter()
                .map(MessageLine::from)
                .collect(),
            my_messages,
            last_settlement: self.last_settlement.clone(),
            notices: self.notices.iter().cloned().collect(),
        }
    }
}

enum Inbox {
    Messages(Vec<Message>),
    Round {
        status: RoundStatus,
        read_at: Instant,
    },
    Account(AccountStatus),
    FetchFailed {
        what: &'static str,
        error: SourceError,
    },
    MessageFeed(LiveSubscriber<Message>),
    SettlementFeed(LiveSubscriber<RoundWonEvent>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerCommand {
    FetchNow,
    Shutdown,
}

fn poll_ticker(period: Duration) -> time::Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Waits for the next tick or command. `false` once the worker should stop.
async fn next_poll(
    ticker: &mut time::Interval,
    cmd_rx: &mut mpsc::UnboundedReceiver<WorkerCommand>,
) -> bool {
    tokio::select! {
        _ = ticker.tick() => true,
        cmd = cmd_rx.recv() => matches!(cmd, Some(WorkerCommand::FetchNow)),
    }
}

async fn message_worker<S: ChainSource + Sync>(
    source: S,
    poll: PollConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    inbox: mpsc::UnboundedSender<Inbox>,
) {
    let fetcher = EventLogFetcher::from_config(&poll);
    let mut ticker = poll_ticker(poll.message_interval);
    while next_poll(&mut ticker, &mut cmd_rx).await {
        let item = match fetcher.fetch_recent::<S, Message>(&source).await {
            Ok(messages) => Inbox::Messages(messages),
            Err(error) => {
                warn!(?error, "message fetch failed");
                Inbox::FetchFailed {
                    what: "messages",
                    error,
                }
            }
        };
        if inbox.send(item).is_err() {
            break;
        }
    }
    debug!("message worker stopped");
}

async fn state_worker<S: ChainSource + Sync>(
    source: S,
    poll: PollConfig,
    account: Option<Address>,
    mut cmd_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    inbox: mpsc::UnboundedSender<Inbox>,
) {
    let mut ticker = poll_ticker(poll.state_interval);
    while next_poll(&mut ticker, &mut cmd_rx).await {
        let round = match with_timeout(poll.fetch_timeout, read_round_status(&source)).await {
            Ok(status) => Inbox::Round {
                status,
                read_at: Instant::now(),
            },
            Err(error) => {
                warn!(?error, "round state fetch failed");
                Inbox::FetchFailed {
                    what: "round state",
                    error,
                }
            }
        };
        if inbox.send(round).is_err() {
            break;
        }
        let Some(account) = account else {
            continue;
        };
        let item = match with_timeout(
            poll.fetch_timeout,
            read_account_status(&source, account),
        )
        .await
        {
            Ok(status) => Inbox::Account(status),
            Err(error) => {
                warn!(?error, %account, "account state fetch failed");
                Inbox::FetchFailed {
                    what: "account state",
                    error,
                }
            }
        };
        if inbox.send(item).is_err() {
            break;
        }
    }
    debug!("state worker stopped");
}

async fn next_live<T: ContractEvent>(live: &mut Option<LiveSubscriber<T>>) -> Option<T> {
    match live {
        Some(subscriber) => subscriber.recv().await,
        None => std::future::pending().await,
    }
}

async fn open_live<S: ChainSource + Sync, T: ContractEvent>(
    source: &S,
    limit: Duration,
) -> Option<LiveSubscriber<T>> {
    match with_timeout(limit, LiveSubscriber::open(source)).await {
        Ok(subscriber) => Some(subscriber),
        Err(err) => {
            warn!(?err, kind = %T::KIND, "live subscription failed, relying on polling");
            None
        }
    }
}

/// Opens a live feed off the control loop and hands it back through the
/// inbox.
fn spawn_resubscribe<S, T>(
    source: S,
    limit: Duration,
    inbox: mpsc::WeakUnboundedSender<Inbox>,
    wrap: fn(LiveSubscriber<T>) -> Inbox,
) -> JoinHandle<()>
where
    S: ChainSource + Send + Sync + 'static,
    T: ContractEvent,
{
    tokio::spawn(async move {
        let Some(subscriber) = open_live::<S, T>(&source, limit).await else {
            return;
        };
        match inbox.upgrade() {
            Some(inbox) => {
                if inbox.send(wrap(subscriber)).is_err() {
                    debug!(kind = %T::KIND, "session gone, dropping restored feed");
                }
            }
            None => subscriber.unsubscribe().await,
        }
    })
}

fn is_pending(task: &Option<JoinHandle<()>>) -> bool {
    task.as_ref().is_some_and(|task| !task.is_finished())
}

/// One round session: poll workers, live feeds and the countdown, merged
/// into a single [`RoundView`] by [`App::run`].
pub struct App<Source> {
    source: Source,
    view: RoundView,
    inbox: mpsc::UnboundedReceiver<Inbox>,
    inbox_tx: mpsc::WeakUnboundedSender<Inbox>,
    messages_cmd: mpsc::UnboundedSender<WorkerCommand>,
    state_cmd: mpsc::UnboundedSender<WorkerCommand>,
    workers: Vec<JoinHandle<()>>,
    live_messages: Option<LiveSubscriber<Message>>,
    live_settlements: Option<LiveSubscriber<RoundWonEvent>>,
    messages_resubscribe: Option<JoinHandle<()>>,
    settlements_resubscribe: Option<JoinHandle<()>>,
    fetch_timeout: Duration,
    ticker: time::Interval,
    stopped: bool,
}

impl<Source> App<Source>
where
    Source: ChainSource + Clone + Send + Sync + 'static,
{
    pub async fn start(source: Source, config: &AppConfig) -> Self {
        let fetch_timeout = config.poll.fetch_timeout;
        let (live_messages, live_settlements) = tokio::join!(
            open_live::<_, Message>(&source, fetch_timeout),
            open_live::<_, RoundWonEvent>(&source, fetch_timeout),
        );

        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let weak_inbox_tx = inbox_tx.downgrade();
        let (messages_cmd, messages_rx) = mpsc::unbounded_channel();
        let (state_cmd, state_rx) = mpsc::unbounded_channel();
        let workers = vec![
            tokio::spawn(message_worker(
                source.clone(),
                config.poll.clone(),
                messages_rx,
                inbox_tx.clone(),
            )),
            tokio::spawn(state_worker(
                source.clone(),
                config.poll.clone(),
                config.account,
                state_rx,
                inbox_tx,
            )),
        ];
        info!(
            contract = %config.contract,
            account = ?config.account,
            live = live_messages.is_some(),
            "round session started"
        );

        Self {
            source,
            view: RoundView::from_config(config),
            inbox,
            inbox_tx: weak_inbox_tx,
            messages_cmd,
            state_cmd,
            workers,
            live_messages,
            live_settlements,
            messages_resubscribe: None,
            settlements_resubscribe: None,
            fetch_timeout,
            ticker: poll_ticker(TICK),
            stopped: false,
        }
    }

    /// Processes exactly one input: a poll result, a live event, a countdown
    /// tick or `interrupt`.
    pub async fn run(&mut self, interrupt: impl Future<Output = ()>) -> Result<RunState> {
        if self.stopped {
            return Ok(RunState::Exit);
        }
        tokio::select! {
            biased;
            _ = interrupt => {
                info!("interrupted, shutting down session");
                self.shutdown().await;
                return Ok(RunState::Exit);
            }
            item = self.inbox.recv() => {
                let Some(item) = item else {
                    warn!("poll workers stopped");
                    self.shutdown().await;
                    return Ok(RunState::Exit);
                };
                self.handle_inbox(item).await;
            }
            message = next_live(&mut self.live_messages) => {
                match message {
                    Some(message) => {
                        if self.view.apply_live_message(message) {
                            debug!("live message appended");
                        }
                    }
                    None => {
                        warn!("live message feed closed, resubscribing on next poll");
                        self.live_messages = None;
                    }
                }
            }
            won = next_live(&mut self.live_settlements) => {
                match won {
                    Some(event) => {
                        self.view.apply_round_won(event);
                        self.request_state_refresh();
                    }
                    None => {
                        warn!("live settlement feed closed, resubscribing on next poll");
                        self.live_settlements = None;
                    }
                }
            }
            now = self.ticker.tick() => {
                if self.view.tick(now) == Some(RoundPhase::Settled) {
                    self.request_state_refresh();
                }
            }
        }
        Ok(RunState::Continue)
    }

    async fn handle_inbox(&mut self, item: Inbox) {
        match item {
            Inbox::Messages(batch) => {
                if self.live_messages.is_none() && !is_pending(&self.messages_resubscribe) {
                    self.messages_resubscribe = Some(spawn_resubscribe::<_, Message>(
                        self.source.clone(),
                        self.fetch_timeout,
                        self.inbox_tx.clone(),
                        Inbox::MessageFeed,
                    ));
                }
                debug!(count = batch.len(), "applying message batch");
                self.view.apply_messages(batch);
            }
            Inbox::Round { status, read_at } => {
                if self.live_settlements.is_none() && !is_pending(&self.settlements_resubscribe) {
                    self.settlements_resubscribe = Some(spawn_resubscribe::<_, RoundWonEvent>(
                        self.source.clone(),
                        self.fetch_timeout,
                        self.inbox_tx.clone(),
                        Inbox::SettlementFeed,
                    ));
                }
                if self.view.apply_round_status(status, read_at) == Some(RoundPhase::Settled) {
                    self.request_state_refresh();
                }
            }
            Inbox::Account(status) => self.view.apply_account_status(status),
            Inbox::FetchFailed { what, error } => self.view.record_failure(what, &error),
            Inbox::MessageFeed(subscriber) => {
                info!("live message feed restored, rebuilding wall");
                if let Some(stale) = self.live_messages.replace(subscriber) {
                    stale.unsubscribe().await;
                }
                self.view.reset_messages();
                let _ = self.messages_cmd.send(WorkerCommand::FetchNow);
            }
            Inbox::SettlementFeed(subscriber) => {
                info!("live settlement feed restored");
                if let Some(stale) = self.live_settlements.replace(subscriber) {
                    stale.unsubscribe().await;
                }
            }
        }
    }

    fn request_state_refresh(&self) {
        if self.state_cmd.send(WorkerCommand::FetchNow).is_err() {
            warn!("state worker gone, cannot refresh");
        }
    }

    pub fn view(&self) -> &RoundView {
        &self.view
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        self.view.snapshot()
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Stops the workers and live feeds. Nothing is processed afterwards.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let _ = self.messages_cmd.send(WorkerCommand::Shutdown);
        let _ = self.state_cmd.send(WorkerCommand::Shutdown);
        for task in [
            self.messages_resubscribe.take(),
            self.settlements_resubscribe.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
        if let Some(live) = self.live_messages.take() {
            live.unsubscribe().await;
        }
        if let Some(live) = self.live_settlements.take() {
            live.unsubscribe().await;
        }
        for worker in self.workers.drain(..) {
            worker.abort();
        }
        self.inbox.close();
        info!("round session stopped");
    }
}

impl<Source> Drop for App<Source> {
    fn drop(&mut self) {
        for task in self
            .workers
            .iter()
            .chain(&self.messages_resubscribe)
            .chain(&self.settlements_resubscribe)
        {
            task.abort();
        }
    }
}
