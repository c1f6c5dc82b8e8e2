use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, warn};

use super::PlatformSender;
use crate::message::brief::brief_outbound;
use crate::message::{OutboundMessage, Platform};

/// Upper bound on worker threads sending unordered messages of one batch.
pub const MAX_PARALLEL_SENDS: usize = 8;

/// Collects platform senders during startup.
#[derive(Default)]
pub struct SenderMuxBuilder {
    senders: HashMap<Platform, Arc<dyn PlatformSender>>,
}

impl SenderMuxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the sender for its platform, replacing any earlier one.
    pub fn register(mut self, sender: Arc<dyn PlatformSender>) -> Self {
        let platform = sender.platform();
        if self.senders.insert(platform, sender).is_some() {
            warn!("Replacing sender for platform {}", platform);
        } else {
            info!("Registered sender for platform {}", platform);
        }
        self
    }

    pub fn build(self) -> SenderMux {
        SenderMux {
            senders: self.senders,
        }
    }
}

/// Routes outbound messages to the sender of their platform. The table is
/// fixed once built, so lookups need no locking.
pub struct SenderMux {
    senders: HashMap<Platform, Arc<dyn PlatformSender>>,
}

impl SenderMux {
    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.senders.keys().copied().collect();
        platforms.sort();
        platforms
    }

    /// Deliver one message. A missing sender or a panicking sender is logged
    /// and otherwise ignored.
    pub fn send(&self, message: &OutboundMessage) {
        let platform = message.addr().platform;
        let Some(sender) = self.senders.get(&platform) else {
            warn!("No sender for platform {}, dropping message to {}", platform, message.addr());
            return;
        };
        debug!("{}", brief_outbound(message));
        if panic::catch_unwind(AssertUnwindSafe(|| sender.send(message))).is_err() {
            error!("Sender for {} panicked delivering to {}", platform, message.addr());
        }
    }

    /// Deliver several messages. Those asking for order go out one after
    /// another in the given order; the rest are shared among at most
    /// `MAX_PARALLEL_SENDS` workers. Returns when all are done.
    pub fn send_batch(&self, messages: &[OutboundMessage]) {
        let (ordered, unordered): (Vec<&OutboundMessage>, Vec<&OutboundMessage>) =
            messages.iter().partition(|m| m.hints().preserve_order);

        if unordered.is_empty() {
            for message in ordered {
                self.send(message);
            }
            return;
        }

        let next = AtomicUsize::new(0);
        let workers = unordered.len().min(MAX_PARALLEL_SENDS);
        thread::scope(|s| {
            if !ordered.is_empty() {
                s.spawn(|| {
                    for message in &ordered {
                        self.send(message);
                    }
                });
            }
            for _ in 0..workers {
                s.spawn(|| {
                    while let Some(message) = unordered.get(next.fetch_add(1, Ordering::Relaxed)) {
                        self.send(message);
                    }
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Address, DeliveryHints};
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::Registry;

    struct CountingLayer {
        events: Arc<AtomicUsize>,
        messages: Arc<Mutex<Vec<String>>>,
    }

    #[derive(Default)]
    struct MessageVisitor(String);

    impl Visit for MessageVisitor {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{:?}", value);
            }
        }
    }

    impl<S: Subscriber> Layer<S> for CountingLayer {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = MessageVisitor::default();
            event.record(&mut visitor);
            self.events.fetch_add(1, Ordering::SeqCst);
            self.messages.lock().unwrap().push(visitor.0);
        }
    }

    struct Recording {
        platform: Platform,
        sent: Mutex<Vec<String>>,
    }

    impl PlatformSender for Recording {
        fn platform(&self) -> Platform {
            self.platform
        }

        fn send(&self, message: &OutboundMessage) {
            self.sent.lock().unwrap().push(message.text_content());
        }
    }

    struct Exploding;

    impl PlatformSender for Exploding {
        fn platform(&self) -> Platform {
            Platform::Discord
        }

        fn send(&self, _message: &OutboundMessage) {
            panic!("socket closed");
        }
    }

    fn recording(platform: Platform) -> Arc<Recording> {
        Arc::new(Recording {
            platform,
            sent: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_missing_sender_logs_once() {
        let telegram = recording(Platform::Telegram);
        let mux = SenderMuxBuilder::new().register(telegram.clone()).build();

        let events = Arc::new(AtomicUsize::new(0));
        let messages = Arc::new(Mutex::new(Vec::new()));
        let subscriber = Registry::default().with(CountingLayer {
            events: Arc::clone(&events),
            messages: Arc::clone(&messages),
        });

        tracing::subscriber::with_default(subscriber, || {
            mux.send(&OutboundMessage::text(Address::new(Platform::OneBot, 1, false), "lost"));
        });

        assert_eq!(events.load(Ordering::SeqCst), 1);
        assert!(messages.lock().unwrap()[0].contains("No sender for platform onebot"));
        assert!(telegram.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_panicking_sender_is_contained() {
        let mux = SenderMuxBuilder::new().register(Arc::new(Exploding)).build();
        mux.send(&OutboundMessage::text(Address::new(Platform::Discord, 1, false), "x"));
        assert_eq!(mux.platforms(), vec![Platform::Discord]);
    }

    #[test]
    fn test_batch_keeps_order_for_ordered_messages() {
        let telegram = recording(Platform::Telegram);
        let mux = SenderMuxBuilder::new().register(telegram.clone()).build();
        let addr = Address::new(Platform::Telegram, 1, false);

        let batch: Vec<OutboundMessage> = (0..20)
            .map(|i| OutboundMessage::text(addr, i.to_string()))
            .collect();
        mux.send_batch(&batch);

        let sent = telegram.sent.lock().unwrap().clone();
        assert_eq!(sent, (0..20).map(|i| i.to_string()).collect::<Vec<_>>());
    }

    #[test]
    fn test_batch_sends_unordered_messages() {
        let telegram = recording(Platform::Telegram);
        let mux = SenderMuxBuilder::new().register(telegram.clone()).build();
        let addr = Address::new(Platform::Telegram, 1, false);
        let loose = DeliveryHints {
            preserve_order: false,
            ..DeliveryHints::default()
        };

        let batch: Vec<OutboundMessage> = (0..8)
            .map(|i| {
                let message = OutboundMessage::text(addr, i.to_string());
                if i % 2 == 0 {
                    message.with_hints(loose)
                } else {
                    message
                }
            })
            .collect();
        mux.send_batch(&batch);

        let sent = telegram.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 8);
        let ordered: Vec<&String> = sent
            .iter()
            .filter(|s| s.parse::<u32>().unwrap() % 2 == 1)
            .collect();
        assert_eq!(ordered, vec!["1", "3", "5", "7"]);
    }

    struct Slow {
        active: AtomicUsize,
        peak: AtomicUsize,
        sent: AtomicUsize,
    }

    impl PlatformSender for Slow {
        fn platform(&self) -> Platform {
            Platform::Telegram
        }

        fn send(&self, _message: &OutboundMessage) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.sent.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_batch_caps_parallel_sends() {
        let slow = Arc::new(Slow {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            sent: AtomicUsize::new(0),
        });
        let mux = SenderMuxBuilder::new().register(slow.clone()).build();
        let addr = Address::new(Platform::Telegram, 1, false);
        let loose = DeliveryHints {
            preserve_order: false,
            ..DeliveryHints::default()
        };

        let batch: Vec<OutboundMessage> = (0..64)
            .map(|i| OutboundMessage::text(addr, i.to_string()).with_hints(loose))
            .collect();
        mux.send_batch(&batch);

        assert_eq!(slow.sent.load(Ordering::SeqCst), 64);
        let peak = slow.peak.load(Ordering::SeqCst);
        assert!((1..=MAX_PARALLEL_SENDS).contains(&peak), "peak {}", peak);
    }
}
