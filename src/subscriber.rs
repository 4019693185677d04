use crate::{
    app::chain_source::{
        ChainSource,
        Subscription,
    },
    error::SourceError,
    events::ContractEvent,
};
use std::marker::PhantomData;

/// Typed live feed of one contract event.
///
/// Delivery is at-least-once and unordered with respect to historical
/// fetches; callers reconcile duplicates themselves.
pub struct LiveSubscriber<T> {
    subscription: Subscription,
    _event: PhantomData<fn() -> T>,
}

impl<T: ContractEvent> LiveSubscriber<T> {
    pub async fn open<S: ChainSource>(source: &S) -> Result<Self, SourceError> {
        let subscription = source.subscribe(T::KIND).await?;
        tracing::debug!(kind = %T::KIND, "live subscription opened");
        Ok(Self {
            subscription,
            _event: PhantomData,
        })
    }

    /// Next decodable event, or `None` once the source closed the feed.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let log = self.subscription.recv().await?;
            match T::from_log(&log) {
                Ok(event) => return Some(event),
                Err(err) => {
                    tracing::warn!(
                        kind = %T::KIND,
                        block = log.block_number,
                        ?err,
                        "dropping undecodable live event"
                    );
                }
            }
        }
    }

    /// Nothing is delivered through this handle once this returns.
    pub async fn unsubscribe(self) {
        self.subscription.unsubscribe().await;
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        app::in_memory_source::InMemoryChainSource,
        events::{
            Address,
            EventKind,
            Message,
            RawLog,
            RoundWonEvent,
        },
    };
    use alloy_primitives::U256;

    fn msg(text: &str) -> Message {
        Message::new(Address::new([7u8; 20]), text, 100)
    }

    #[tokio::test]
    async fn recv__delivers_pushed_messages_including_duplicates() {
        // given
        let source = InMemoryChainSource::new();
        let mut subscriber = LiveSubscriber::<Message>::open(&source).await.unwrap();

        // when
        source.emit(EventKind::NewMessage, msg("gm").to_log(1, 0));
        source.emit(EventKind::NewMessage, msg("gm").to_log(1, 0));

        // then
        assert_eq!(subscriber.recv().await, Some(msg("gm")));
        assert_eq!(subscriber.recv().await, Some(msg("gm")));
    }

    #[tokio::test]
    async fn recv__skips_undecodable_events() {
        // given
        let source = InMemoryChainSource::new();
        let mut subscriber = LiveSubscriber::<Message>::open(&source).await.unwrap();
        source.emit(
            EventKind::NewMessage,
            RawLog {
                topics: vec![EventKind::NewMessage.topic()],
                data: vec![],
                block_number: 1,
                log_index: 0,
            },
        );
        source.emit(EventKind::NewMessage, msg("after").to_log(1, 1));

        // when
        let received = subscriber.recv().await;

        // then
        assert_eq!(received, Some(msg("after")));
    }

    #[tokio::test]
    async fn recv__only_receives_its_own_event_kind() {
        // given
        let source = InMemoryChainSource::new();
        let mut subscriber = LiveSubscriber::<RoundWonEvent>::open(&source)
            .await
            .unwrap();
        let won = RoundWonEvent {
            winner: Address::new([1u8; 20]),
            amount: U256::from(10),
            round: 3,
        };

        // when
        source.emit(EventKind::NewMessage, msg("noise").to_log(1, 0));
        source.emit(EventKind::RoundWon, won.to_log(1, 1));

        // then
        assert_eq!(subscriber.recv().await, Some(won));
    }

    #[tokio::test]
    async fn unsubscribe__detaches_from_source() {
        // given
        let source = InMemoryChainSource::new();
        let subscriber = LiveSubscriber::<Message>::open(&source).await.unwrap();
        assert_eq!(source.subscriber_count(EventKind::NewMessage), 1);

        // when
        subscriber.unsubscribe().await;
        source.emit(EventKind::NewMessage, msg("late").to_log(2, 0));

        // then
        assert_eq!(source.subscriber_count(EventKind::NewMessage), 0);
    }

    #[tokio::test]
    async fn recv__returns_none_when_source_closes_feed() {
        // given
        let source = InMemoryChainSource::new();
        let mut subscriber = LiveSubscriber::<Message>::open(&source).await.unwrap();

        // when
        source.close_subscriptions();

        // then
        assert_eq!(subscriber.recv().await, None);
    }

    #[tokio::test]
    async fn open__fails_when_source_unavailable() {
        // given
        let source = InMemoryChainSource::new();
        source.set_unavailable(true);

        // when
        let result = LiveSubscriber::<Message>::open(&source).await;

        // then
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
    }
}
