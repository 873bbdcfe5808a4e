//! Reconciliation behavior against an in-memory engine, on paused time.

mod common;

use common::{deck, pedalboard};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use stompdeck::{
    Confirmation, ControlState, DeckError, DeckStatus, MoveDirection, PollMode, RefreshOutcome,
    ShadowStage, UpdateOrigin,
};
use tempfile::TempDir;

// --- poll supervisor ---

#[tokio::test(start_paused = true)]
async fn mode_switches_never_duplicate_timers() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);

    for mode in [
        PollMode::Research,
        PollMode::Live,
        PollMode::Research,
        PollMode::Live,
        PollMode::Live,
    ] {
        deck.set_poll_mode(mode).await.unwrap();
        let expected = if mode == PollMode::Live { 2 } else { 0 };
        assert_eq!(deck.supervisor().active_timers(), expected, "after {mode}");
    }

    let before = mock.count("system");
    tokio::time::sleep(Duration::from_millis(2000)).await;
    // one status timer: ticks at 0, 750 and 1500
    assert_eq!(mock.count("system") - before, 3);
    assert_eq!(deck.supervisor().active_timers(), 2);

    deck.set_poll_mode(PollMode::Research).await.unwrap();
    assert_eq!(deck.supervisor().active_timers(), 0);
    let stopped = mock.count("system");
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(mock.count("system"), stopped);
}

#[tokio::test(start_paused = true)]
async fn overlapping_live_transitions_start_one_set_of_timers() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    let supervisor = deck.supervisor();

    mock.hold("current_preset");
    let transitions = async {
        tokio::join!(
            supervisor.set_mode(PollMode::Live),
            supervisor.set_mode(PollMode::Live)
        )
    };
    let unblock = async {
        mock.wait_for("current_preset", 2).await;
        mock.release("current_preset");
    };
    tokio::join!(transitions, unblock);

    assert_eq!(supervisor.active_timers(), 2);
}

#[tokio::test(start_paused = true)]
async fn going_live_primes_baseline_before_watching() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);

    deck.set_poll_mode(PollMode::Live).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(mock.calls()[0], "current_preset");
    assert!(mock.count("current_preset") > 1);
    assert_eq!(mock.count("state"), 0, "unchanged preset must not refresh");
}

#[tokio::test(start_paused = true)]
async fn external_preset_change_refreshes_once() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);

    deck.set_poll_mode(PollMode::Live).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // someone stomps a footswitch
    mock.set_preset("10_lead");
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(mock.count("state"), 1);
    let snapshot = deck.snapshot();
    assert_eq!(snapshot.origin, UpdateOrigin::External);
    assert_eq!(snapshot.program.preset.as_deref(), Some("10_lead"));

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(mock.count("state"), 1);
}

#[tokio::test(start_paused = true)]
async fn own_preset_load_is_not_seen_as_external() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);

    deck.set_poll_mode(PollMode::Live).await.unwrap();
    let confirmation = deck
        .select_preset("10_lead", UpdateOrigin::User)
        .await
        .unwrap();
    assert_eq!(confirmation, Some(Confirmation::Confirmed { attempts: 1 }));

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(mock.count("state"), 1);
    assert_eq!(deck.snapshot().origin, UpdateOrigin::Programmatic);
}

#[tokio::test(start_paused = true)]
async fn status_strip_is_published() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    let mut strips = deck.status_strip();

    deck.set_poll_mode(PollMode::Live).await.unwrap();
    strips.changed().await.unwrap();
    let strip = strips.borrow().clone().unwrap();
    assert!(strip.engine_running);
    assert!(strip.routing_ok);
}

#[tokio::test(start_paused = true)]
async fn watch_failures_do_not_stop_polling() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);

    deck.set_poll_mode(PollMode::Live).await.unwrap();
    mock.fail("current_preset");
    mock.fail("system");
    tokio::time::sleep(Duration::from_millis(1000)).await;
    mock.recover("current_preset");
    mock.set_preset("ambient");
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(deck.supervisor().active_timers(), 2);
    assert_eq!(deck.snapshot().program.preset.as_deref(), Some("ambient"));
}

#[tokio::test(start_paused = true)]
async fn leaving_live_lets_running_refresh_finish() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);

    deck.set_poll_mode(PollMode::Live).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    mock.hold("state");
    mock.set_preset("10_lead");
    mock.wait_for("state", 1).await;

    deck.set_poll_mode(PollMode::Research).await.unwrap();
    assert_eq!(deck.supervisor().active_timers(), 0);
    mock.release("state");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = deck.snapshot();
    assert_eq!(snapshot.origin, UpdateOrigin::External);
    assert_eq!(snapshot.program.preset.as_deref(), Some("10_lead"));
    assert_eq!(mock.count("state"), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_watch_reading_does_not_overwrite_own_load() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);

    deck.set_poll_mode(PollMode::Live).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let seen = mock.count("current_preset");

    // the next watch tick reads 01_clean and its reply is held
    mock.hold("current_preset");
    mock.wait_for("current_preset", seen + 1).await;

    let confirmation = deck
        .select_preset("10_lead", UpdateOrigin::User)
        .await
        .unwrap();
    assert_eq!(confirmation, Some(Confirmation::Confirmed { attempts: 1 }));

    mock.release("current_preset");
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(mock.count("state"), 1);
    assert_eq!(deck.snapshot().origin, UpdateOrigin::Programmatic);
}

// --- refresh ---

#[tokio::test(start_paused = true)]
async fn refresh_in_flight_skips_new_request() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = Arc::new(deck(&mock, &dir));

    mock.hold("state");
    let first = {
        let deck = deck.clone();
        tokio::spawn(async move { deck.refresh(UpdateOrigin::Programmatic).await })
    };
    mock.wait_for("state", 1).await;

    let second = deck.refresh(UpdateOrigin::User).await.unwrap();
    assert!(matches!(second, RefreshOutcome::Skipped));

    mock.release("state");
    let first = first.await.unwrap().unwrap();
    assert!(first.snapshot().is_some());
    assert_eq!(mock.count("state"), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_decodes_and_sorts() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);

    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();
    let snapshot = deck.snapshot();
    assert_eq!(snapshot.presets, vec!["01_clean", "10_lead", "ambient"]);
    assert_eq!(
        snapshot.program.chain("Input"),
        Some(&["Boost".to_string(), "Screamer".to_string()][..])
    );
    assert_eq!(snapshot.config.file_options("Reverb_2", "Impulse").map(|o| o.len()), Some(2));
}

#[tokio::test(start_paused = true)]
async fn refresh_failure_sets_error_status() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);

    mock.fail("state");
    assert!(deck.refresh(UpdateOrigin::User).await.is_err());
    assert!(matches!(deck.status(), DeckStatus::Error(_)));
}

// --- presets ---

#[tokio::test(start_paused = true)]
async fn unconfirmed_load_is_not_an_error() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    mock.ignore_writes();

    let confirmation = deck
        .select_preset("10_lead", UpdateOrigin::User)
        .await
        .unwrap();

    assert_eq!(confirmation, Some(Confirmation::Unconfirmed { attempts: 10 }));
    assert_eq!(deck.status(), DeckStatus::LoadedUnconfirmed);
    assert_eq!(mock.count("state"), 10);
    assert_eq!(deck.snapshot().program.preset.as_deref(), Some("01_clean"));
}

#[tokio::test(start_paused = true)]
async fn non_user_and_placeholder_selections_are_ignored() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);

    for origin in [UpdateOrigin::Programmatic, UpdateOrigin::External] {
        assert_eq!(deck.select_preset("10_lead", origin).await.unwrap(), None);
    }
    assert_eq!(deck.select_preset("---", UpdateOrigin::User).await.unwrap(), None);
    assert_eq!(deck.select_preset("  ", UpdateOrigin::User).await.unwrap(), None);
    assert_eq!(mock.count("load_preset"), 0);
    assert_eq!(deck.status(), DeckStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn failed_load_surfaces_error() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    mock.fail("load_preset");

    let err = deck
        .select_preset("10_lead", UpdateOrigin::User)
        .await
        .unwrap_err();
    assert!(matches!(err, DeckError::Transport(_)));
    assert_eq!(
        deck.status(),
        DeckStatus::Error("HTTP 502: load_preset failed".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn preset_names_are_validated_locally() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);

    for bad in ["", "../escape", "a/b", "bell\u{7}"] {
        let err = deck.save_preset_as(bad).await.unwrap_err();
        assert!(matches!(err, DeckError::InvalidPresetName { .. }), "{bad:?}");
    }
    assert!(deck.delete_preset("..").await.is_err());
    assert_eq!(mock.count("save_preset_as"), 0);
    assert_eq!(mock.count("delete_preset"), 0);

    assert_eq!(deck.save_preset_as(" 20_crunch ").await.unwrap(), "20_crunch");
    assert!(deck.snapshot().presets.contains(&"20_crunch".to_string()));
}

#[tokio::test(start_paused = true)]
async fn save_without_name_uses_active_preset() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);

    // nothing decoded yet
    assert!(deck.save_preset(None).await.is_err());

    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();
    assert_eq!(deck.save_preset(None).await.unwrap(), "01_clean");
    assert!(mock.calls().contains(&"save_preset 01_clean".to_string()));
}

// --- parameters ---

#[tokio::test(start_paused = true)]
async fn malformed_number_is_rejected_without_write() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();

    let err = deck.set_param("Boost", "Gain", "loud").await.unwrap_err();
    match err {
        DeckError::InvalidNumber { input, last_good } => {
            assert_eq!(input, "loud");
            assert_eq!(last_good.as_deref(), Some("1.000000"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.count("set_param"), 0);
}

#[tokio::test(start_paused = true)]
async fn numeric_write_is_clamped_and_confirmed() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();

    let confirmation = deck.set_param("Boost", "Gain", "12,5").await.unwrap();
    assert_eq!(confirmation, Confirmation::Confirmed { attempts: 1 });
    assert!(mock.calls().contains(&"set_param Boost Gain 10".to_string()));
    assert_eq!(deck.snapshot().program.param("Boost", "Gain"), Some("10.000000"));
    assert_eq!(deck.status(), DeckStatus::Ok);
}

#[tokio::test(start_paused = true)]
async fn ignored_param_write_runs_out_of_attempts() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();
    mock.ignore_writes();

    let confirmation = deck.set_param("Boost", "Gain", "4").await.unwrap();
    assert_eq!(confirmation, Confirmation::Unconfirmed { attempts: 12 });
}

#[tokio::test(start_paused = true)]
async fn file_params_use_the_file_endpoint() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();

    let confirmation = deck
        .commit_param("Reverb_2", "Impulse", "plate.wav")
        .await
        .unwrap();
    assert!(confirmation.is_confirmed());
    assert_eq!(mock.count("set_file_param"), 1);
    assert_eq!(mock.count("set_param"), 0);

    deck.commit_param("Boost", "Gain", "2").await.unwrap();
    assert_eq!(mock.count("set_param"), 1);
}

#[tokio::test(start_paused = true)]
async fn file_selection_requires_user_origin() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);

    let result = deck
        .set_file_param("Reverb_2", "Impulse", "plate.wav", UpdateOrigin::Programmatic)
        .await
        .unwrap();
    assert_eq!(result, None);
    assert_eq!(mock.count("set_file_param"), 0);
}

#[tokio::test(start_paused = true)]
async fn superseded_param_failure_is_not_an_error() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = Arc::new(deck(&mock, &dir));
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();

    mock.hold("set_param");
    mock.fail("set_param");
    let first = {
        let deck = deck.clone();
        tokio::spawn(async move { deck.set_param("Boost", "Gain", "2").await })
    };
    mock.wait_for("set_param", 1).await;

    let second = {
        let deck = deck.clone();
        tokio::spawn(async move { deck.set_param("Boost", "Gain", "3").await })
    };
    // the second write is queued once it starts polling for confirmation
    mock.wait_for("state", 2).await;

    mock.release_one("set_param");
    mock.wait_for("set_param", 2).await;
    mock.recover("set_param");
    mock.release("set_param");

    assert!(!first.await.unwrap().unwrap().is_confirmed());
    assert!(second.await.unwrap().unwrap().is_confirmed());
    assert_eq!(
        mock.calls()
            .into_iter()
            .filter(|c| c.starts_with("set_param"))
            .collect::<Vec<_>>(),
        vec!["set_param Boost Gain 2", "set_param Boost Gain 3"]
    );
    assert_eq!(deck.snapshot().program.param("Boost", "Gain"), Some("3.000000"));
    assert_eq!(deck.status(), DeckStatus::Ok);
}

// --- toggles ---

#[tokio::test(start_paused = true)]
async fn failed_toggle_rolls_back() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();
    assert_eq!(deck.enabled_view("Boost"), Some(false));

    mock.fail("set_enabled");
    let err = deck.toggle_plugin("Boost").await.unwrap_err();

    assert!(matches!(err, DeckError::Transport(_)));
    assert_eq!(deck.enabled_view("Boost"), Some(false));
    assert_eq!(deck.control_state("Boost"), ControlState::Idle);
    assert!(matches!(deck.status(), DeckStatus::Error(_)));
}

#[tokio::test(start_paused = true)]
async fn toggle_is_optimistic_and_exclusive_while_in_flight() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = Arc::new(deck(&mock, &dir));
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();

    mock.hold("set_enabled");
    let pending = {
        let deck = deck.clone();
        tokio::spawn(async move { deck.toggle_plugin("Boost").await })
    };
    mock.wait_for("set_enabled", 1).await;

    assert_eq!(deck.enabled_view("Boost"), Some(true));
    assert_eq!(
        deck.control_state("Boost"),
        ControlState::Busy { optimistic: true }
    );
    assert!(matches!(
        deck.toggle_plugin("Boost").await,
        Err(DeckError::Busy(_))
    ));

    mock.release("set_enabled");
    assert!(pending.await.unwrap().unwrap());
    assert_eq!(deck.control_state("Boost"), ControlState::Idle);
    assert_eq!(deck.enabled_view("Boost"), Some(true));
    assert_eq!(mock.count("set_enabled"), 1);
}

// --- shadow stages ---

#[tokio::test(start_paused = true)]
async fn shadow_mute_uses_metadata_minimum() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();
    assert_eq!(deck.shadow_view(ShadowStage::Master).value, -6.0);

    let muted = deck.shadow_toggle_mute(ShadowStage::Master).await.unwrap();
    assert!(muted.muted);
    assert_eq!(muted.value, -40.0);
    assert!(mock.calls().contains(&"set_param Master Volume -40".to_string()));

    let unmuted = deck.shadow_toggle_mute(ShadowStage::Master).await.unwrap();
    assert!(!unmuted.muted);
    assert_eq!(unmuted.value, -6.0);
}

#[tokio::test(start_paused = true)]
async fn shadow_mute_without_metadata_uses_floor() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();
    assert_eq!(deck.shadow_view(ShadowStage::Input).value, 0.0);

    let muted = deck.shadow_toggle_mute(ShadowStage::Input).await.unwrap();
    assert_eq!(muted.value, -60.0);
    let unmuted = deck.shadow_toggle_mute(ShadowStage::Input).await.unwrap();
    assert_eq!(unmuted.value, 0.0);
}

#[tokio::test(start_paused = true)]
async fn later_decodes_never_touch_shadow_values() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();

    deck.shadow_set_value(ShadowStage::Master, -12.5).await.unwrap();
    mock.set_config("ParameterConfig Master Volume Type Knob MinValue -40 MaxValue 0 DefaultValue 0");
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();
    deck.refresh(UpdateOrigin::External).await.unwrap();

    assert_eq!(deck.shadow_view(ShadowStage::Master).value, -12.5);
}

#[tokio::test(start_paused = true)]
async fn failed_shadow_write_rolls_back() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();

    mock.fail("set_param");
    assert!(deck.shadow_set_value(ShadowStage::Master, -3.0).await.is_err());
    assert!(deck.shadow_toggle_mute(ShadowStage::Master).await.is_err());

    let view = deck.shadow_view(ShadowStage::Master);
    assert_eq!(view.value, -6.0);
    assert!(!view.muted);
}

#[tokio::test(start_paused = true)]
async fn failed_shadow_write_keeps_newer_drag() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = Arc::new(deck(&mock, &dir));
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();

    mock.hold("set_param");
    mock.fail("set_param");
    let first = {
        let deck = deck.clone();
        tokio::spawn(async move { deck.shadow_set_value(ShadowStage::Master, -10.0).await })
    };
    mock.wait_for("set_param", 1).await;

    let second = deck.shadow_set_value(ShadowStage::Master, -20.0).await.unwrap();
    assert_eq!(second.value, -20.0);

    mock.release_one("set_param");
    mock.wait_for("set_param", 2).await;
    mock.recover("set_param");
    mock.release("set_param");

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.value, -20.0);
    assert_eq!(deck.shadow_view(ShadowStage::Master).value, -20.0);
    assert!(!matches!(deck.status(), DeckStatus::Error(_)));
    assert!(mock.calls().contains(&"set_param Master Volume -20".to_string()));
}

#[tokio::test(start_paused = true)]
async fn failed_final_shadow_write_leaves_newer_drag_and_reports() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = Arc::new(deck(&mock, &dir));
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();

    mock.hold("set_param");
    mock.fail("set_param");
    let first = {
        let deck = deck.clone();
        tokio::spawn(async move { deck.shadow_set_value(ShadowStage::Master, -10.0).await })
    };
    mock.wait_for("set_param", 1).await;
    deck.shadow_set_value(ShadowStage::Master, -20.0).await.unwrap();
    mock.release("set_param");

    assert!(first.await.unwrap().is_err());
    // -10 no longer shows, so there is nothing of its own to undo
    assert_eq!(deck.shadow_view(ShadowStage::Master).value, -20.0);
    assert!(matches!(deck.status(), DeckStatus::Error(_)));
}

// --- chains ---

#[tokio::test(start_paused = true)]
async fn chain_edits_resync() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();

    assert!(deck.move_plugin("Input", 1, MoveDirection::Up).await.unwrap());
    assert!(mock.calls().contains(&"set_chain Input Screamer Boost".to_string()));
    assert_eq!(
        deck.snapshot().program.chain("Input"),
        Some(&["Screamer".to_string(), "Boost".to_string()][..])
    );

    deck.add_plugin("FxLoop", "Delay").await.unwrap();
    assert_eq!(
        deck.snapshot().program.chain("FxLoop"),
        Some(&["Reverb_2".to_string(), "Delay".to_string()][..])
    );

    assert!(deck.remove_plugin("FxLoop", 0).await.unwrap());
    assert_eq!(
        deck.snapshot().program.chain("FxLoop"),
        Some(&["Delay".to_string()][..])
    );
}

#[tokio::test(start_paused = true)]
async fn out_of_range_chain_edits_are_no_ops() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();

    assert!(!deck.move_plugin("Input", 0, MoveDirection::Up).await.unwrap());
    assert!(!deck.move_plugin("Input", 1, MoveDirection::Down).await.unwrap());
    assert!(!deck.remove_plugin("FxLoop", 5).await.unwrap());
    assert_eq!(mock.count("set_chain"), 0);

    assert!(matches!(
        deck.add_plugin("Nowhere", "Delay").await,
        Err(DeckError::UnknownChain(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn release_plugin_resyncs() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    let deck = deck(&mock, &dir);
    deck.refresh(UpdateOrigin::Programmatic).await.unwrap();

    deck.release_plugin("Reverb_2").await.unwrap();
    assert!(mock.calls().contains(&"release_plugin Reverb_2".to_string()));
    assert_eq!(deck.snapshot().program.chain("FxLoop"), Some(&[][..]));
}

// --- persisted mode ---

#[tokio::test(start_paused = true)]
async fn poll_mode_survives_restart() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();

    {
        let deck = deck(&mock, &dir);
        deck.set_poll_mode(PollMode::Research).await.unwrap();
    }

    let deck = deck(&mock, &dir);
    assert_eq!(deck.start().await.unwrap(), PollMode::Research);
    assert_eq!(deck.poll_mode(), PollMode::Research);
    assert_eq!(deck.supervisor().active_timers(), 0);
    assert_eq!(deck.snapshot().program.preset.as_deref(), Some("01_clean"));
}

#[tokio::test(start_paused = true)]
async fn corrupt_state_file_starts_live() {
    let mock = pedalboard();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("client-state.json"), "{{{{").unwrap();

    let deck = deck(&mock, &dir);
    assert_eq!(deck.start().await.unwrap(), PollMode::Live);
    assert_eq!(deck.supervisor().active_timers(), 2);
    deck.shutdown();
    assert_eq!(deck.supervisor().active_timers(), 0);
}
