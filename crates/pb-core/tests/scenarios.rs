//! End-to-end behaviour of the pressure engine through `Intake`.

use async_trait::async_trait;
use parking_lot::Mutex;
use pb_core::{
    ActionDispatcher, BreachNotice, ChannelId, CommunityConfig, CommunityId, ConfigStore,
    Disposition, Intake, MessageEvent, PressureKey, PressureLedger, UserId,
};
use std::sync::Arc;

const T0: i64 = 1_700_000_000_000;

struct FixedStore(CommunityConfig);

#[async_trait]
impl ConfigStore for FixedStore {
    async fn get_config(&self, _community: CommunityId) -> anyhow::Result<Option<CommunityConfig>> {
        Ok(Some(self.0.clone()))
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    notices: Mutex<Vec<BreachNotice>>,
}

impl ActionDispatcher for RecordingDispatcher {
    fn notify_breach(&self, notice: BreachNotice) {
        self.notices.lock().push(notice);
    }
}

struct Harness {
    intake: Intake,
    dispatcher: Arc<RecordingDispatcher>,
}

impl Harness {
    fn new(config: CommunityConfig) -> Self {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let intake = Intake::new(
            Arc::new(PressureLedger::new()),
            Arc::new(FixedStore(config)),
            dispatcher.clone(),
        );
        Self { intake, dispatcher }
    }

    fn pressure(&self, user: u64) -> Option<f64> {
        self.intake
            .ledger()
            .snapshot(PressureKey::new(CommunityId(1), UserId(user)))
            .map(|s| s.pressure)
    }

    fn breaches(&self) -> usize {
        self.dispatcher.notices.lock().len()
    }
}

fn message(user: u64, content: &str) -> MessageEvent {
    MessageEvent {
        community_id: CommunityId(1),
        author_id: UserId(user),
        channel_id: ChannelId(500),
        is_from_bot: false,
        is_system_generated: false,
        attachment_count: 0,
        embed_count: 0,
        mentioned_user_count: 0,
        mentioned_role_count: 0,
        displayed_content: content.to_string(),
        raw_content: content.to_string(),
    }
}

fn scored(disposition: Disposition) -> (f64, bool) {
    match disposition {
        Disposition::Scored(outcome) => (outcome.pressure, outcome.breached),
        Disposition::Ignored => panic!("expected the message to be scored"),
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
}

#[tokio::test]
async fn plain_first_message_costs_base_plus_chars() {
    let h = Harness::new(CommunityConfig::default());

    let (pressure, breached) = scored(h.intake.handle_at(message(7, "0123456789"), T0).await.unwrap());

    assert_close(pressure, 10.0625);
    assert!(!breached);
    assert_eq!(h.breaches(), 0);
}

#[tokio::test]
async fn identical_burst_breaches_once_then_restarts_from_zero() {
    let h = Harness::new(CommunityConfig::default());
    let mut results = Vec::new();
    for _ in 0..4 {
        results.push(scored(h.intake.handle_at(message(7, "0123456789"), T0).await.unwrap()));
    }

    assert_close(results[0].0, 10.0625);
    assert_close(results[1].0, 30.125);
    assert_close(results[2].0, 50.1875);
    assert_close(results[3].0, 70.25);
    assert_eq!(
        results.iter().map(|r| r.1).collect::<Vec<_>>(),
        vec![false, false, false, true]
    );
    assert_eq!(h.breaches(), 1);
    assert_eq!(h.pressure(7), Some(0.0));

    // The repeat baseline survives the reset
    let (after, _) = scored(h.intake.handle_at(message(7, "0123456789"), T0).await.unwrap());
    assert_close(after, 20.0625);

    let notices = h.dispatcher.notices.lock();
    assert_eq!(notices[0].user_id, UserId(7));
    assert_eq!(notices[0].channel_id, ChannelId(500));
    assert_close(notices[0].pressure, 70.25);
}

#[tokio::test]
async fn thirty_seconds_of_silence_drains_default_pressure() {
    let h = Harness::new(CommunityConfig::default());

    h.intake.handle_at(message(7, "0123456789"), T0).await.unwrap();
    let (pressure, _) =
        scored(h.intake.handle_at(message(7, "abcdefghij"), T0 + 30_000).await.unwrap());

    assert_close(pressure, 10.0625);
}

#[tokio::test]
async fn decay_matches_elapsed_time() {
    let config = CommunityConfig {
        base_pressure: 0.0,
        char_pressure: 0.0,
        repeat_pressure: 0.0,
        ..Default::default()
    };
    let h = Harness::new(CommunityConfig { base_pressure: 40.0, ..config.clone() });
    h.intake.handle_at(message(7, "a"), T0).await.unwrap();

    // Zero-cost follow-up through a second intake sharing the same ledger
    let zero_cost = Intake::new(
        h.intake.ledger().clone(),
        Arc::new(FixedStore(config)),
        h.dispatcher.clone(),
    );
    let (pressure, _) = scored(zero_cost.handle_at(message(7, "b"), T0 + 7_250).await.unwrap());

    assert_close(pressure, 40.0 - 2.0 * 7.25);
}

#[tokio::test]
async fn bot_messages_leave_no_trace() {
    let h = Harness::new(CommunityConfig::default());
    let mut msg = message(7, "beep");
    msg.is_from_bot = true;

    assert_eq!(h.intake.handle_at(msg, T0).await.unwrap(), Disposition::Ignored);
    assert_eq!(h.pressure(7), None);
    assert!(h.intake.ledger().is_empty());
    assert_eq!(h.breaches(), 0);
}

#[tokio::test]
async fn repeat_bonus_needs_consecutive_messages() {
    let config = CommunityConfig {
        base_pressure: 0.0,
        char_pressure: 0.0,
        max_pressure: 1_000.0,
        ..Default::default()
    };
    let h = Harness::new(config);

    let mut pressures = Vec::new();
    for content in ["spam", "spam", "spam", "other", "spam", ""] {
        pressures.push(scored(h.intake.handle_at(message(7, content), T0).await.unwrap()).0);
    }

    assert_eq!(pressures, vec![0.0, 10.0, 20.0, 20.0, 20.0, 20.0]);

    // The empty message did not break the streak
    let (pressure, _) = scored(h.intake.handle_at(message(7, "spam"), T0).await.unwrap());
    assert_eq!(pressure, 30.0);
}

#[tokio::test]
async fn pressure_never_goes_negative() {
    let h = Harness::new(CommunityConfig { max_pressure: 45.0, ..Default::default() });

    // Deterministic pseudo-random gaps and contents
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut now = T0;
    for _ in 0..500 {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        now += (seed % 20_000) as i64;
        let content = if seed % 3 == 0 { "same" } else { "different" };

        h.intake.handle_at(message(7, content), now).await.unwrap();
        assert!(h.pressure(7).unwrap() >= 0.0);
    }
}

fn counting_config() -> CommunityConfig {
    CommunityConfig {
        max_pressure: 1e12,
        base_pressure: 1.0,
        char_pressure: 0.0,
        repeat_pressure: 0.0,
        pressure_dropoff: 0.0,
        ..Default::default()
    }
}

#[test]
fn concurrent_updates_on_one_key_lose_nothing() {
    let ledger = Arc::new(PressureLedger::new());
    let config = counting_config();
    let key = PressureKey::new(CommunityId(1), UserId(7));

    std::thread::scope(|s| {
        for _ in 0..16 {
            let ledger = Arc::clone(&ledger);
            let config = config.clone();
            s.spawn(move || {
                for _ in 0..250 {
                    ledger.apply_and_check(key, &config, &message(7, "x"), T0);
                }
            });
        }
    });

    assert_eq!(ledger.snapshot(key).unwrap().pressure, 4_000.0);
}

#[test]
fn distinct_keys_match_sequential_execution() {
    let config = CommunityConfig { max_pressure: 100.0, ..Default::default() };
    let a = PressureKey::new(CommunityId(1), UserId(7));
    let b = PressureKey::new(CommunityId(2), UserId(7));

    let run = |ledger: &PressureLedger, key: PressureKey| {
        for i in 0..200i64 {
            let content = if i % 4 == 0 { "hey" } else { "hello there" };
            ledger.apply_and_check(key, &config, &message(7, content), T0 + i * 700);
        }
    };

    let sequential = PressureLedger::new();
    run(&sequential, a);
    run(&sequential, b);

    let concurrent = PressureLedger::new();
    std::thread::scope(|s| {
        s.spawn(|| run(&concurrent, a));
        s.spawn(|| run(&concurrent, b));
    });

    assert_eq!(sequential.snapshot(a), concurrent.snapshot(a));
    assert_eq!(sequential.snapshot(b), concurrent.snapshot(b));
    assert_eq!(concurrent.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_breaches_dispatch_once_each() {
    let config = CommunityConfig {
        max_pressure: 95.0,
        base_pressure: 10.0,
        char_pressure: 0.0,
        repeat_pressure: 0.0,
        pressure_dropoff: 0.0,
        ..Default::default()
    };
    let h = Arc::new(Harness::new(config));

    let mut tasks = Vec::new();
    for _ in 0..100 {
        let h = Arc::clone(&h);
        tasks.push(tokio::spawn(async move {
            h.intake.handle_at(message(7, "x"), T0).await.unwrap()
        }));
    }
    let mut breached = 0;
    for task in tasks {
        if scored(task.await.unwrap()).1 {
            breached += 1;
        }
    }

    // Every tenth update crosses 95 and resets
    assert_eq!(breached, 10);
    assert_eq!(h.breaches(), 10);
    assert_eq!(h.pressure(7), Some(0.0));
}
