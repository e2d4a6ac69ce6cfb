//! End-to-end session behavior through the public API, using mock audio.

use dbucks::audio::source::{MockCaptureBackend, MockOutcome, TrackState};
use dbucks::audio::tone::MockTonePlayer;
use dbucks::rewards::{AccrualState, accrue, default_tiers, find_tier};
use dbucks::session::runner::wait_for_snapshot;
use dbucks::{CalibrationParams, CaptureBackend, SessionController, SessionPhase, SessionRunner};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

const WAIT: Duration = Duration::from_secs(120);

/// 0.2 RMS reads 50 dB after calibration.
fn loud() -> Vec<f32> {
    vec![0.2; 2048]
}

#[tokio::test(start_paused = true)]
async fn full_session_reports_levels_then_times_out() {
    let backend = Arc::new(MockCaptureBackend::new(MockOutcome::Grant(loud())));
    let controller = SessionController::new(CalibrationParams::default());
    let (runner, handle) = SessionRunner::new(
        controller,
        Arc::clone(&backend) as Arc<dyn CaptureBackend>,
        Arc::new(MockTonePlayer::new()),
    );
    let task = tokio::spawn(runner.run());
    let mut snapshots = handle.subscribe();

    handle.start().await.unwrap();

    let halfway = wait_for_snapshot(&mut snapshots, WAIT, |s| s.remaining_time_seconds == 30)
        .await
        .unwrap();
    assert!(halfway.is_recording);
    let db = halfway.db_level.unwrap();
    assert!((db - 50.0).abs() <= 0.5, "got {}", db);

    // a level of 50 dB is in the Study Hall band
    let tiers = default_tiers();
    assert_eq!(find_tier(db.round(), &tiers).unwrap().name, "Study Hall");

    let done = wait_for_snapshot(&mut snapshots, WAIT, |s| s.phase == SessionPhase::Idle)
        .await
        .unwrap();
    assert_eq!(done.remaining_time_seconds, 60);
    assert_eq!(done.db_level, None);
    assert_eq!(done.status, "Ready");

    let probe = &backend.probes()[0];
    assert!(!probe.is_started());
    assert_eq!(probe.stop_calls(), 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn muted_track_is_reported_and_recovers() {
    let backend = Arc::new(MockCaptureBackend::new(MockOutcome::Grant(loud())));
    let (runner, handle) = SessionRunner::new(
        SessionController::new(CalibrationParams::default()),
        Arc::clone(&backend) as Arc<dyn CaptureBackend>,
        Arc::new(MockTonePlayer::new()),
    );
    let task = tokio::spawn(runner.run());
    let mut snapshots = handle.subscribe();

    handle.start().await.unwrap();
    wait_for_snapshot(&mut snapshots, WAIT, |s| s.db_level.is_some_and(|db| db > 0.0))
        .await
        .unwrap();

    backend.probes()[0].set_track_state(TrackState::Muted);
    let muted = wait_for_snapshot(&mut snapshots, WAIT, |s| s.is_muted)
        .await
        .unwrap();
    assert_eq!(muted.db_level, Some(0.0));
    assert!(muted.is_recording);

    backend.probes()[0].set_track_state(TrackState::Live);
    let live = wait_for_snapshot(&mut snapshots, WAIT, |s| !s.is_muted)
        .await
        .unwrap();
    assert!(live.db_level.unwrap() > 0.0);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_while_waiting_for_permission_leaves_no_open_device() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(MockCaptureBackend::new(MockOutcome::Grant(loud())).with_gate(Arc::clone(&gate)));
    let (runner, handle) = SessionRunner::new(
        SessionController::new(CalibrationParams::default()),
        Arc::clone(&backend) as Arc<dyn CaptureBackend>,
        Arc::new(MockTonePlayer::new()),
    );
    let task = tokio::spawn(runner.run());
    let mut snapshots = handle.subscribe();

    handle.start().await.unwrap();
    wait_for_snapshot(&mut snapshots, WAIT, |s| s.phase == SessionPhase::Starting)
        .await
        .unwrap();
    handle.stop().await.unwrap();
    wait_for_snapshot(&mut snapshots, WAIT, |s| s.phase == SessionPhase::Idle)
        .await
        .unwrap();

    gate.notify_one();
    for _ in 0..100 {
        if backend.probes().first().is_some_and(|p| p.stop_calls() > 0) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(!backend.probes()[0].is_started());
    assert!(!handle.snapshot().is_recording);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[test]
fn an_hour_in_study_hall_earns_its_rate() {
    let tiers = default_tiers();
    let start = Instant::now();
    let state = AccrualState::new(start);

    let tier = find_tier(45.0, &tiers);
    assert_eq!(tier.unwrap().tokens_per_hour, 75.0);

    let after = accrue(state, tier, start + Duration::from_secs(3600));
    assert!((after.total_tokens - 75.0).abs() < 1e-9);
}
