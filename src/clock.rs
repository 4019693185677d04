use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;
use tokio::time::Instant;

/// Countdown extrapolated locally between authoritative `timeLeft` reads.
#[derive(Debug, Clone, Default)]
pub struct RoundClock {
    last_known_remaining: u64,
    last_synced_at: Option<Instant>,
    displayed_remaining: u64,
}

impl RoundClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the countdown with a value read from the contract.
    pub fn on_authoritative_read(&mut self, remaining_secs: u64, now: Instant) {
        self.last_known_remaining = remaining_secs;
        self.last_synced_at = Some(now);
        self.displayed_remaining = remaining_secs;
    }

    pub fn tick(&mut self, now: Instant) -> u64 {
        self.displayed_remaining = match self.last_synced_at {
            Some(synced_at) => {
                let elapsed = now.saturating_duration_since(synced_at).as_secs();
                self.last_known_remaining.saturating_sub(elapsed)
            }
            None => 0,
        };
        self.displayed_remaining
    }

    pub fn displayed_remaining(&self) -> u64 {
        self.displayed_remaining
    }

    pub fn last_known_remaining(&self) -> u64 {
        self.last_known_remaining
    }

    pub fn is_synced(&self) -> bool {
        self.last_synced_at.is_some()
    }
}

/// `MM:SS`, minutes are not wrapped into hours.
pub fn format_countdown(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// No round running: nobody has written since the last payout.
    Waiting,
    Active,
    /// Countdown ran out but the contract still reports the round active; the
    /// payout happens on the next write, so the flag should be re-read.
    Settled,
}

impl RoundPhase {
    pub fn derive(active: bool, displayed_remaining: u64) -> Self {
        match (active, displayed_remaining) {
            (_, remaining) if remaining > 0 => RoundPhase::Active,
            (true, _) => RoundPhase::Settled,
            (false, _) => RoundPhase::Waiting,
        }
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundPhase::Waiting => "waiting",
            RoundPhase::Active => "active",
            RoundPhase::Settled => "settled",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn tick__counts_down_from_authoritative_read() {
        // given
        let t = Instant::now();
        let mut clock = RoundClock::new();
        clock.on_authoritative_read(120, t);

        // when
        let at_45 = clock.tick(t + Duration::from_secs(45));

        // then
        assert_eq!(at_45, 75);
    }

    #[test]
    fn on_authoritative_read__overrides_extrapolated_value() {
        // given
        let t = Instant::now();
        let mut clock = RoundClock::new();
        clock.on_authoritative_read(120, t);
        clock.tick(t + Duration::from_secs(45));

        // when
        clock.on_authoritative_read(10, t + Duration::from_secs(45));

        // then
        assert_eq!(clock.displayed_remaining(), 10);
        assert_eq!(clock.tick(t + Duration::from_secs(55)), 0);
        assert_eq!(clock.tick(t + Duration::from_secs(80)), 0);
    }

    #[test]
    fn tick__without_any_read_stays_at_zero() {
        // given
        let mut clock = RoundClock::new();

        // when
        let value = clock.tick(Instant::now() + Duration::from_secs(5));

        // then
        assert_eq!(value, 0);
        assert!(!clock.is_synced());
    }

    #[test]
    fn tick__clock_behind_sync_point_does_not_exceed_read() {
        // given
        let t = Instant::now() + Duration::from_secs(10);
        let mut clock = RoundClock::new();
        clock.on_authoritative_read(30, t);

        // when
        let value = clock.tick(t - Duration::from_secs(5));

        // then
        assert_eq!(value, 30);
    }

    #[test]
    fn derive__maps_flag_and_countdown_to_phase() {
        assert_eq!(RoundPhase::derive(false, 0), RoundPhase::Waiting);
        assert_eq!(RoundPhase::derive(true, 0), RoundPhase::Settled);
        assert_eq!(RoundPhase::derive(true, 5), RoundPhase::Active);
        assert_eq!(RoundPhase::derive(false, 5), RoundPhase::Active);
    }

    #[test]
    fn format_countdown__pads_minutes_and_seconds() {
        assert_eq!(format_countdown(0), "00:00");
        assert_eq!(format_countdown(75), "01:15");
        assert_eq!(format_countdown(3_600), "60:00");
    }

    proptest! {
        #[test]
        fn tick__never_increases_between_reads(
            remaining in 0u64..10_000,
            mut offsets in proptest::collection::vec(0u64..20_000, 1..50),
        ) {
            offsets.sort_unstable();
            let t = Instant::now();
            let mut clock = RoundClock::new();
            clock.on_authoritative_read(remaining, t);
            let mut previous = clock.displayed_remaining();
            for offset in offsets {
                let value = clock.tick(t + Duration::from_secs(offset));
                prop_assert!(value <= previous);
                prop_assert!(value <= remaining);
                previous = value;
            }
        }
    }
}
