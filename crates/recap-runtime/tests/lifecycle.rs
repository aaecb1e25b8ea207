//! End-to-end runs over the SQLite store: restart catch-up, cooldowns,
//! and slot exhaustion.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use recap_core::{Clock, ConversationId, ManualClock, TimeOfDay};
use recap_llm::mock::MockReply;
use recap_runtime::testing::{EchoRenderer, TestRig};
use recap_runtime::{
    FireOutcome, OrchestratorError, Scheduler, SchedulerDeps, SummaryRequest, SummarySink,
};
use recap_store::{ConnectionConfig, JobStore, SqliteStore};

const TZ: Tz = chrono_tz::Asia::Shanghai;

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    TZ.with_ymd_and_hms(2026, 3, day, hour, minute, 0)
        .single()
        .unwrap()
        .with_timezone(&Utc)
}

fn scheduler(rig: &TestRig, store: &SqliteStore, clock: &Arc<ManualClock>) -> Arc<Scheduler> {
    Arc::new(Scheduler::new(
        SchedulerDeps {
            store: Arc::new(store.clone()) as Arc<dyn JobStore>,
            orchestrator: Arc::clone(&rig.orchestrator),
            sink: Arc::clone(&rig.sink) as Arc<dyn SummarySink>,
            clock: Arc::clone(clock) as Arc<dyn Clock>,
        },
        TZ,
        Duration::from_secs(60),
    ))
}

#[tokio::test]
async fn missed_fire_runs_once_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recap.db");
    let path = path.to_str().unwrap();
    let g1 = ConversationId::from("g1");

    // first process: schedule at 10:00, then go down before 22:00
    {
        let rig = TestRig::new(vec![]);
        let store = SqliteStore::open(path, &ConnectionConfig::default()).unwrap();
        let clock = Arc::new(ManualClock::new(at(1, 10, 0)));
        let s = scheduler(&rig, &store, &clock);
        let ack = s
            .create_or_update(g1.clone(), TimeOfDay::parse("22:00").unwrap(), Some(20), None)
            .await
            .unwrap();
        assert!(ack.is_durable());
    }

    // second process comes up at 22:05
    let rig = TestRig::new(vec![MockReply::text("today in g1")]);
    let store = SqliteStore::open(path, &ConnectionConfig::default()).unwrap();
    let clock = Arc::new(ManualClock::new(at(1, 22, 5)));
    let s = scheduler(&rig, &store, &clock);
    assert_eq!(s.load_and_arm().await.unwrap(), 1);
    assert_eq!(s.next_fire(&g1), Some(at(1, 22, 5)));

    let handles = s.tick(clock.now());
    assert_eq!(handles.len(), 1);
    for h in handles {
        assert_eq!(h.await.unwrap(), FireOutcome::Delivered);
    }
    assert_eq!(rig.sink.deliveries().len(), 1);
    assert_eq!(s.next_fire(&g1), Some(at(2, 22, 0)));

    // a third start the same evening must not fire again
    let rig = TestRig::new(vec![]);
    let clock = Arc::new(ManualClock::new(at(1, 22, 30)));
    let s = scheduler(&rig, &store, &clock);
    assert_eq!(s.load_and_arm().await.unwrap(), 1);
    assert!(s.tick(clock.now()).is_empty());
    assert_eq!(s.next_fire(&g1), Some(at(2, 22, 0)));

    let health = s.health_check().await.unwrap();
    assert!(health.is_consistent());
}

#[tokio::test]
async fn manual_runs_respect_cooldown() {
    let rig = TestRig::new(vec![MockReply::text("first"), MockReply::text("second")]);
    let g1 = ConversationId::from("g1");

    let ok = rig
        .orchestrator
        .run(SummaryRequest::manual("alice", g1.clone(), 20))
        .await
        .unwrap();
    assert_eq!(ok.message_count, 20);
    assert!(!ok.degraded);

    assert_matches!(
        rig.orchestrator.run(SummaryRequest::manual("alice", g1.clone(), 20)).await,
        Err(OrchestratorError::CooldownActive { .. })
    );
    // admins are exempt
    assert!(rig
        .orchestrator
        .run(SummaryRequest::manual("root", g1, 20))
        .await
        .is_ok());
}

#[tokio::test(start_paused = true)]
async fn one_more_than_capacity_is_busy() {
    let replies = (0..3)
        .map(|i| MockReply::delayed(Duration::from_secs(1), MockReply::text(&format!("summary {i}"))))
        .collect();
    let rig = TestRig::with(TestRig::global(), replies, Arc::new(EchoRenderer::new()));
    let g1 = ConversationId::from("g1");

    let runs = (0..3).map(|i| {
        rig.orchestrator
            .run(SummaryRequest::manual(format!("user{i}"), g1.clone(), 10))
    });
    let results = futures::future::join_all(runs).await;

    let busy = results
        .iter()
        .filter(|r| matches!(r, Err(OrchestratorError::Busy)))
        .count();
    assert_eq!(busy, 1);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    assert_eq!(rig.orchestrator.governor().available_slots(), 2);
}
