//! End-to-end relay scenarios over an in-memory store and a recording channel.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use anon_relay::channels::{ChannelClient, EventStream, InboundMessage, MessageBody};
use anon_relay::config::{Phrases, StreamConfig};
use anon_relay::error::{ChannelError, RelayError};
use anon_relay::identity::{CorrespondentAddress, IdentityStore};
use anon_relay::pipeline::{FreshnessFilter, MessageHandler, MessageOutcome};
use anon_relay::relay::{
    RelayConsumer, RelayProducer, ReplyCommand, ReplyDispatcher, RestartBackoff,
    spawn_consumer_supervisor,
};
use anon_relay::store::{Database, LibSqlBackend};
use anon_relay::suppression::SuppressionTracker;

#[derive(Default)]
struct RecordingClient {
    sent: Mutex<Vec<(CorrespondentAddress, String)>>,
    send_delay: Duration,
}

impl RecordingClient {
    fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl ChannelClient for RecordingClient {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn send(&self, to: &CorrespondentAddress, text: &str) -> Result<(), ChannelError> {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.clone(), text.to_string()));
        Ok(())
    }

    async fn mark_read(&self, _: &[String], _: &CorrespondentAddress) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn disconnect(&self) {}
}

struct Relay {
    db: Arc<dyn Database>,
    client: Arc<RecordingClient>,
    handler: MessageHandler,
    boot: DateTime<Utc>,
    streams: StreamConfig,
}

async fn relay() -> Relay {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let client = Arc::new(RecordingClient::default());
    let boot = Utc::now();
    let streams = StreamConfig {
        consumer: "relay-test".into(),
        poll_interval: Duration::from_millis(10),
        ..StreamConfig::default()
    };
    let handler = MessageHandler::new(
        client.clone(),
        IdentityStore::new(Arc::clone(&db)),
        SuppressionTracker::new(Arc::clone(&db)),
        RelayProducer::new(Arc::clone(&db), streams.outbound.clone()),
        FreshnessFilter::new(boot, Duration::from_secs(15 * 60)),
        Phrases::default(),
    );
    Relay {
        db,
        client,
        handler,
        boot,
        streams,
    }
}

fn correspondent() -> CorrespondentAddress {
    CorrespondentAddress::new("447700900123", "s.whatsapp.net")
}

fn text_at(id: &str, at: DateTime<Utc>, text: &str) -> InboundMessage {
    InboundMessage::new(id, correspondent(), at, MessageBody::text(text))
}

fn command(id: &str, ts: &str, msg: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("id".to_string(), id.to_string()),
        ("ts".to_string(), ts.to_string()),
        ("msg".to_string(), msg.to_string()),
    ])
}

#[tokio::test]
async fn greeting_then_suppressed_follow_up() {
    let r = relay().await;
    let phrases = Phrases::default();

    r.handler
        .handle_message(&text_at("m1", r.boot, "Hello!"))
        .await;
    assert_eq!(
        r.client.texts(),
        vec![phrases.greeting.clone(), phrases.disclaimer.clone()]
    );

    // A minute later: thank-you is still eligible, disclaimer is not
    r.handler
        .handle_message(&text_at(
            "m2",
            r.boot + chrono::Duration::minutes(1),
            "I would like to talk to somebody please",
        ))
        .await;
    assert_eq!(
        r.client.texts(),
        vec![
            phrases.greeting.clone(),
            phrases.disclaimer.clone(),
            phrases.thank_you.clone()
        ]
    );

    let entries = r.db.stream_range(&r.streams.outbound).await.unwrap();
    let msgs: Vec<&str> = entries.iter().filter_map(|e| e.field("msg")).collect();
    assert_eq!(
        msgs,
        vec![
            "Hello!",
            phrases.greeting.as_str(),
            phrases.disclaimer.as_str(),
            "I would like to talk to somebody please",
            phrases.thank_you.as_str(),
        ]
    );

    // The real address never reaches the stream
    assert!(
        entries
            .iter()
            .all(|e| e.field("id") != Some("447700900123@s.whatsapp.net"))
    );
}

#[tokio::test]
async fn backlog_from_before_boot_is_ignored() {
    let r = relay().await;
    let outcome = r
        .handler
        .handle_message(&text_at(
            "old",
            r.boot - chrono::Duration::hours(1),
            "Hello!",
        ))
        .await;

    assert_eq!(outcome, MessageOutcome::Stale);
    assert!(r.client.texts().is_empty());
    assert!(
        r.db.stream_range(&r.streams.outbound)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn media_without_text_writes_nothing() {
    let r = relay().await;
    let msg = InboundMessage::new("m1", correspondent(), r.boot, MessageBody::Other);

    assert_eq!(r.handler.handle_message(&msg).await, MessageOutcome::Empty);
    assert!(r.client.texts().is_empty());
    assert!(
        r.db.stream_range(&r.streams.outbound)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        r.db.get_identity_by_address(&correspondent().to_string())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn operator_reply_reaches_the_correspondent() {
    let r = relay().await;
    r.db.insert_identity_pair(&correspondent().to_string(), "abc123")
        .await
        .unwrap();

    let consumer = Arc::new(RelayConsumer::new(Arc::clone(&r.db), &r.streams));
    consumer.ensure_group().await.unwrap();

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<ReplyCommand>();
    let dispatcher = ReplyDispatcher::new(
        IdentityStore::new(Arc::clone(&r.db)),
        SuppressionTracker::new(Arc::clone(&r.db)),
        r.client.clone(),
        consumer.acknowledger(),
    );
    let dispatch_task = tokio::spawn(dispatcher.run(rx));
    let runner = Arc::clone(&consumer);
    let consumer_task = tokio::spawn(async move { runner.run(tx).await });

    r.db.stream_append(
        &r.streams.inbound,
        &command("abc123", "1661618790", "hello, world!"),
    )
    .await
    .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while r.client.texts().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(
        *r.client.sent.lock().unwrap(),
        vec![(correspondent(), "hello, world!".to_string())]
    );

    // The ack lands just after the send
    let mut pending = 1;
    while pending > 0 && tokio::time::Instant::now() < deadline {
        pending = r
            .db
            .stream_read_pending(&r.streams.inbound, &r.streams.group, &r.streams.consumer, 10)
            .await
            .unwrap()
            .len();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pending, 0);

    consumer_task.abort();
    dispatch_task.abort();
}

#[tokio::test]
async fn malformed_command_stops_the_consumer() {
    let r = relay().await;
    let consumer = RelayConsumer::new(Arc::clone(&r.db), &r.streams);
    consumer.ensure_group().await.unwrap();

    r.db.stream_append(&r.streams.inbound, &command("abc123", "soon", "hi"))
        .await
        .unwrap();

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let err = tokio::time::timeout(Duration::from_secs(5), consumer.run(tx))
        .await
        .expect("consumer should stop on its own")
        .unwrap_err();
    assert!(matches!(err, RelayError::Protocol { .. }));

    // Acked, so a restart does not hit it again
    let pending = r
        .db
        .stream_read_pending(&r.streams.inbound, &r.streams.group, &r.streams.consumer, 10)
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn reply_to_unknown_id_is_dropped() {
    let r = relay().await;
    let consumer = Arc::new(RelayConsumer::new(Arc::clone(&r.db), &r.streams));
    consumer.ensure_group().await.unwrap();

    r.db.stream_append(&r.streams.inbound, &command("ghost-id-here", "1661618790", "hi"))
        .await
        .unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let runner = Arc::clone(&consumer);
    let consumer_task = tokio::spawn(async move { runner.run(tx).await });
    let cmd = rx.recv().await.unwrap();
    consumer_task.abort();

    let dispatcher = ReplyDispatcher::new(
        IdentityStore::new(Arc::clone(&r.db)),
        SuppressionTracker::new(Arc::clone(&r.db)),
        r.client.clone(),
        consumer.acknowledger(),
    );
    dispatcher.dispatch(&cmd).await.unwrap();

    assert!(r.client.texts().is_empty());
    let pending = r
        .db
        .stream_read_pending(&r.streams.inbound, &r.streams.group, &r.streams.consumer, 10)
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn malformed_command_behind_a_slow_reply_does_not_resend_it() {
    let r = relay().await;
    r.db.insert_identity_pair(&correspondent().to_string(), "abc123")
        .await
        .unwrap();
    let slow = Arc::new(RecordingClient {
        send_delay: Duration::from_millis(300),
        ..RecordingClient::default()
    });

    let consumer = Arc::new(RelayConsumer::new(Arc::clone(&r.db), &r.streams));
    consumer.ensure_group().await.unwrap();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<ReplyCommand>();
    let dispatcher = ReplyDispatcher::new(
        IdentityStore::new(Arc::clone(&r.db)),
        SuppressionTracker::new(Arc::clone(&r.db)),
        slow.clone(),
        consumer.acknowledger(),
    );
    let dispatch_task = tokio::spawn(dispatcher.run(rx));

    r.db.stream_append(&r.streams.inbound, &command("abc123", "1", "only once please"))
        .await
        .unwrap();
    r.db.stream_append(&r.streams.inbound, &command("abc123", "bad", "x"))
        .await
        .unwrap();

    let supervisor = spawn_consumer_supervisor(
        Arc::clone(&consumer),
        tx,
        RestartBackoff::new(Duration::from_millis(10), Duration::from_millis(50)),
    );

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(slow.texts(), vec!["only once please"]);

    supervisor.abort();
    dispatch_task.abort();
}
