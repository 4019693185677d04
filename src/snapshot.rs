use crate::{
    clock::RoundPhase,
    events::{
        Address,
        Message,
        RoundWonEvent,
    },
    status::{
        AccountStatus,
        RoundStatus,
    },
};
use alloy_primitives::U256;
use serde::Serialize;
use std::fmt;

/// What a consumer renders: one consistent projection of the round view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoundSnapshot {
    pub phase: RoundPhase,
    pub remaining_secs: u64,
    pub countdown: String,
    pub round: Option<RoundStatus>,
    pub account: Option<AccountStatus>,
    pub message_count: usize,
    pub recent_messages: Vec<MessageLine>,
    /// The configured account's messages, newest first.
    pub my_messages: Vec<MessageLine>,
    pub last_settlement: Option<RoundWonEvent>,
    /// Newest first.
    pub notices: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageLine {
    pub author: Address,
    pub author_short: String,
    pub text: String,
    pub timestamp: u64,
    pub time: String,
}

impl From<&Message> for MessageLine {
    fn from(message: &Message) -> Self {
        Self {
            author: message.author,
            author_short: message.author.short(),
            text: message.text.clone(),
            timestamp: message.timestamp,
            time: message.time_label(),
        }
    }
}

impl RoundSnapshot {
    pub fn is_last_player(&self, account: &Address) -> bool {
        self.round
            .as_ref()
            .and_then(|round| round.last_player)
            .is_some_and(|last| last == *account)
    }
}

/// Wei rendered as a decimal amount of the native coin (18 decimals),
/// trailing zeros dropped.
pub fn format_ether(wei: U256) -> String {
    const UNIT: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);
    let whole = wei / UNIT;
    let fraction = wei % UNIT;
    if fraction.is_zero() {
        return whole.to_string();
    }
    // below 10^18, so it fits
    let fraction = u64::try_from(fraction).unwrap_or_default();
    let digits = format!("{fraction:018}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

impl fmt::Display for RoundSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.round {
            Some(round) => {
                writeln!(
                    f,
                    "round #{} [{}] {}  pot {}  fee {}",
                    round.round,
                    self.phase,
                    self.countdown,
                    format_ether(round.pot),
                    format_ether(round.entrance_fee),
                )?;
                if let Some(last) = round.last_player {
                    writeln!(f, "last player {}", last.short())?;
                }
            }
            None => writeln!(f, "round status not loaded [{}] {}", self.phase, self.countdown)?,
        }
        if let Some(won) = &self.last_settlement {
            writeln!(
                f,
                "round #{} won by {} for {}",
                won.round,
                won.winner.short(),
                format_ether(won.amount)
            )?;
        }
        if let Some(account) = &self.account {
            writeln!(
                f,
                "{}: balance {}, invite code '{}', {} invitees, rewards {}",
                account.account.short(),
                format_ether(account.balance),
                account.invite_code,
                account.invitee_count,
                format_ether(account.referral_rewards),
            )?;
        }
        writeln!(
            f,
            "-- {} of {} messages --",
            self.recent_messages.len(),
            self.message_count
        )?;
        for line in &self.recent_messages {
            writeln!(f, "{} {} {}", line.time, line.author_short, line.text)?;
        }
        for notice in &self.notices {
            writeln!(f, "! {notice}")?;
        }
        Ok(())
    }
}
