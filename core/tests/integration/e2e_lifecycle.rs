//! Lifecycle Tests
//!
//! Startup validation, settings persistence and spoken lifecycle prompts.

use super::*;
use busvoice_core::{FileSettingsStore, Priority, SettingsStore};

/// Store whose writes always fail
struct ReadOnlyStore;

impl SettingsStore for ReadOnlyStore {
    fn load(&self) -> Result<Option<Settings>> {
        Ok(None)
    }

    fn save(&self, _settings: &Settings) -> Result<()> {
        Err(BusVoiceError::Settings("read-only".into()))
    }
}

#[tokio::test]
async fn settings_survive_a_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assistant.toml");

    {
        let store = Arc::new(FileSettingsStore::new(&path));
        let ctl = LifecycleController::start(Arc::new(RecordingSink::default()), store, test_config())
            .unwrap();
        assert!(!ctl.is_enabled());
        ctl.enable().await.unwrap();
        ctl.set_language(Language::Tamil).await.unwrap();
        ctl.set_volume(0.4);
        ctl.shutdown().await.unwrap();
    }

    let store = Arc::new(FileSettingsStore::new(&path));
    let ctl =
        LifecycleController::start(Arc::new(RecordingSink::default()), store, test_config()).unwrap();
    assert!(ctl.is_enabled());
    assert_eq!(ctl.current_language_tag(), "ta-IN");
    assert!((ctl.volume() - 0.4).abs() < 1e-6);
    assert!(ctl.snapshot().enabled);
    ctl.shutdown().await.unwrap();
}

#[tokio::test]
async fn missing_synthesis_makes_the_assistant_inert() {
    init_tracing();
    let store = Arc::new(MemorySettingsStore::with_settings(Settings {
        enabled: true,
        language: Language::Hindi,
        volume: 0.6,
    }));
    let ctl = LifecycleController::start(Arc::new(MissingSink), store.clone(), test_config()).unwrap();
    let mut events = ctl.subscribe();

    assert!(!ctl.synthesis_available());
    assert!(!ctl.is_enabled());
    assert!(matches!(
        ctl.enable().await,
        Err(BusVoiceError::SynthesisUnavailable(_))
    ));
    assert_eq!(
        ctl.announce("Bus 9 arriving", Priority::High).await.unwrap(),
        None
    );
    assert_eq!(ctl.snapshot().queued, 0);
    assert!(drain_events(&mut events)
        .iter()
        .all(|e| !matches!(e, DispatchEvent::Enqueued { .. })));
    // The stored preference is left untouched
    assert_eq!(store.current().map(|s| s.enabled), Some(true));
    ctl.shutdown().await.unwrap();
}

#[tokio::test]
async fn startup_rejects_prompts_missing_for_an_offered_language() {
    init_tracing();
    let mut config = test_config();
    config.lifecycle_prompts = true;
    config.languages.push(Language::Punjabi);

    let result = LifecycleController::start(
        Arc::new(RecordingSink::default()),
        Arc::new(MemorySettingsStore::new()),
        config,
    );
    match result {
        Err(BusVoiceError::MissingLanguageEntry(missing)) => assert_eq!(missing, "pa-IN"),
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("startup should fail"),
    }
}

#[tokio::test]
async fn lifecycle_prompts_are_queued_like_announcements() {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    let mut config = test_config();
    config.lifecycle_prompts = true;
    config.audience = Audience::Driver;
    let ctl =
        LifecycleController::start(sink.clone(), Arc::new(MemorySettingsStore::new()), config).unwrap();
    let mut events = ctl.subscribe();

    ctl.enable().await.unwrap();
    let welcome = wait_for(&mut events, |e| matches!(e, DispatchEvent::Enqueued { .. })).await;
    assert!(matches!(
        welcome,
        DispatchEvent::Enqueued { priority: Priority::Medium, language: Language::English, .. }
    ));
    wait_for(&mut events, |e| matches!(e, DispatchEvent::Completed { .. })).await;

    ctl.set_language(Language::Hindi).await.unwrap();
    wait_for(&mut events, |e| matches!(e, DispatchEvent::Completed { .. })).await;

    // Same language again is a no-op
    ctl.set_language(Language::Hindi).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let texts = sink.texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("navigation updates"));
    assert!(texts[1].starts_with("भाषा हिंदी"));
    ctl.shutdown().await.unwrap();
}

#[tokio::test]
async fn prompts_are_silent_while_disabled() {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    let mut config = test_config();
    config.lifecycle_prompts = true;
    let ctl =
        LifecycleController::start(sink.clone(), Arc::new(MemorySettingsStore::new()), config).unwrap();

    ctl.set_language(Language::Tamil).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(sink.texts().is_empty());
    assert_eq!(ctl.current_language(), Language::Tamil);
    ctl.shutdown().await.unwrap();
}

#[tokio::test]
async fn stored_language_outside_offer_falls_back() {
    init_tracing();
    let store = Arc::new(MemorySettingsStore::with_settings(Settings {
        enabled: false,
        language: Language::Gujarati,
        volume: 0.5,
    }));
    let ctl =
        LifecycleController::start(Arc::new(RecordingSink::default()), store, test_config()).unwrap();
    assert_eq!(ctl.current_language(), Language::English);
    assert_eq!(ctl.volume(), 0.5);
    ctl.shutdown().await.unwrap();
}

#[tokio::test]
async fn failing_store_is_not_fatal() {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    let ctl = LifecycleController::start(sink.clone(), Arc::new(ReadOnlyStore), test_config()).unwrap();
    let mut events = ctl.subscribe();

    ctl.enable().await.unwrap();
    ctl.set_volume(0.9);
    ctl.announce("Bus 3 arriving", Priority::Medium)
        .await
        .unwrap();
    wait_for(&mut events, |e| matches!(e, DispatchEvent::Completed { .. })).await;
    assert_eq!(sink.texts(), vec!["Bus 3 arriving"]);
    ctl.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_enable_and_disable_agree_with_the_dispatcher() {
    init_tracing();
    let store = Arc::new(MemorySettingsStore::new());
    let ctl = Arc::new(
        LifecycleController::start(
            Arc::new(RecordingSink::default()),
            store.clone(),
            test_config(),
        )
        .unwrap(),
    );

    for _ in 0..200 {
        let on = {
            let ctl = Arc::clone(&ctl);
            tokio::spawn(async move { ctl.enable().await })
        };
        let off = {
            let ctl = Arc::clone(&ctl);
            tokio::spawn(async move { ctl.disable().await })
        };
        on.await.unwrap().unwrap();
        off.await.unwrap().unwrap();

        let enabled = ctl.snapshot().enabled;
        assert_eq!(ctl.is_enabled(), enabled);
        assert_eq!(ctl.settings().enabled, enabled);
        assert_eq!(store.current().map(|s| s.enabled), Some(enabled));
    }
    ctl.shutdown().await.unwrap();
}
