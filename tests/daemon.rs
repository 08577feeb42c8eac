//! Daemon trigger dispatch and background refresh tests

use std::sync::atomic::Ordering;

use raincheck::audio::ArtifactKind;
use raincheck::daemon::refresh_knowledge;
use raincheck::{Daemon, RunOutcome, SettingsLayer, TriggerEvent, Volume};

mod common;

use common::{Harness, STEP_TIMEOUT};

fn daemon(h: &Harness) -> Daemon {
    Daemon::from_parts(
        h.services(),
        h.sync_controller(true),
        Volume::new(5),
        STEP_TIMEOUT,
    )
}

#[tokio::test]
async fn test_ask_trigger_runs_pipeline() {
    let h = Harness::new();
    let daemon = daemon(&h);

    let handle = daemon.dispatch(TriggerEvent::Ask).unwrap();

    assert_eq!(handle.await.unwrap(), RunOutcome::Completed);
    assert_eq!(h.played(), ["clear"]);
}

#[tokio::test]
async fn test_volume_trigger_sets_level() {
    let h = Harness::new();
    let daemon = daemon(&h);

    assert!(daemon.dispatch(TriggerEvent::VolumeChanged(8)).is_none());
    assert_eq!(daemon.volume().get(), 8);
    assert!(h.played().is_empty());
}

#[tokio::test]
async fn test_second_press_while_generating_is_rejected() {
    let h = Harness::new();
    let daemon = daemon(&h);
    let mut phases = daemon.orchestrator().subscribe();

    h.synth.close();
    let first = daemon.dispatch(TriggerEvent::Ask).unwrap();
    phases
        .wait_for(|p| *p == raincheck::RequestPhase::EnsuringAudio)
        .await
        .unwrap();

    let second = daemon.dispatch(TriggerEvent::Ask).unwrap();
    assert_eq!(second.await.unwrap(), RunOutcome::Rejected);

    h.synth.open();
    assert_eq!(first.await.unwrap(), RunOutcome::Completed);
    assert_eq!(h.played(), ["clear"]);
}

#[tokio::test]
async fn test_boot_renders_internal_phrases() {
    let h = Harness::new();
    h.remote.set(Some(SettingsLayer::default()));
    let daemon = daemon(&h);

    daemon.boot().await.unwrap();

    assert_eq!(h.remote.downloads.load(Ordering::SeqCst), 1);
    for id in ["no-internet", "random-error", "unknown-weather", "secret-reset"] {
        assert!(h.cache.exists(id, ArtifactKind::Internal), "{id} missing");
    }
}

#[tokio::test]
async fn test_boot_survives_failed_sync() {
    let h = Harness::with_local(SettingsLayer {
        save_previous_audio_files: Some(false),
        ..common::local_layer()
    });
    h.remote.set(None);
    h.cache
        .ensure("stale", ArtifactKind::Generated, "left over")
        .await
        .unwrap();
    let daemon = daemon(&h);

    daemon.boot().await.unwrap();

    assert_eq!(h.remote.check_ins.load(Ordering::SeqCst), 1);
    assert!(!h.cache.exists_with_override("stale", ArtifactKind::Generated, true));
    assert!(h.cache.exists("random-error", ArtifactKind::Internal));
}

#[tokio::test]
async fn test_refresh_warms_cache_without_playing() {
    let h = Harness::new();
    h.weather.set(Some({
        let mut facts = common::calm();
        facts.next_hour.is_raining = true;
        facts
    }));

    let warmed = refresh_knowledge(&h.services(), STEP_TIMEOUT).await.unwrap();

    assert_eq!(warmed, 2);
    assert!(h.cache.exists("clear", ArtifactKind::Generated));
    assert!(h.cache.exists("future-raining", ArtifactKind::Generated));
    assert!(h.played().is_empty());

    // A following request is answered from the warmed cache
    h.orchestrator().run().await;
    assert_eq!(h.synth.call_count(), 2);
    assert_eq!(h.played(), ["clear", "future-raining"]);
}

#[tokio::test]
async fn test_refresh_skipped_when_not_persisting() {
    let h = Harness::with_local(SettingsLayer {
        save_previous_audio_files: Some(false),
        ..common::local_layer()
    });

    let warmed = refresh_knowledge(&h.services(), STEP_TIMEOUT).await.unwrap();

    assert_eq!(warmed, 0);
    assert_eq!(h.weather.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.synth.call_count(), 0);
}

#[tokio::test]
async fn test_refresh_reports_weather_failure() {
    let h = Harness::new();
    h.weather.set(None);

    assert!(refresh_knowledge(&h.services(), STEP_TIMEOUT).await.is_err());
    assert_eq!(h.synth.call_count(), 0);
}
