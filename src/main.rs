#[cfg(not(target_os = "macos"))]
fn main() {
    eprintln!("vox is a macOS menu-bar app and does not run on this platform");
    std::process::exit(1);
}

#[cfg(target_os = "macos")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::run().await
}

#[cfg(target_os = "macos")]
mod app {
    use std::sync::mpsc::{Receiver, Sender};
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use tracing::{info, warn};

    use vox::config::{Config, HotkeyBinding, Settings};
    use vox::input::hotkey::{HotkeyAction, HotkeyMatcher};
    use vox::input::tap;
    use vox::rewrite::{RewriteClient, RewriteMode};
    use vox::service::{self, ServiceProvider, SystemClipboard};
    use vox::transcription::{EngineError, ModelKind, SpeechError, SpeechTranscriber};
    use vox::tray::{AppPhase, TrayCommand, TrayManager};
    use vox::{notify, pasteboard, permissions, telemetry};

    type Provider = ServiceProvider<RewriteClient, SystemClipboard>;

    /// Completion of a background task, marshaled back to the main loop.
    enum TaskEvent {
        RewriteDone(String),
        TranscriptionDone(Result<String, EngineError>),
    }

    fn build_rewriter(settings: &Settings) -> Option<RewriteClient> {
        settings.api_key.clone().map(|key| {
            RewriteClient::new(key, settings.model.clone(), settings.base_url.clone())
        })
    }

    /// The provider is rebuilt wholesale on any rewrite-related settings
    /// change; in-flight tasks keep the old one alive through their Arc.
    fn build_provider(settings: &Settings) -> Arc<Provider> {
        Arc::new(ServiceProvider::new(
            build_rewriter(settings),
            SystemClipboard,
            settings.thinking_mode,
        ))
    }

    /// Flatten the settings into the matcher's binding list. Modes register
    /// first so a conflicting dictation binding never shadows a rewrite.
    fn matcher_bindings(settings: &Settings) -> Vec<(HotkeyBinding, HotkeyAction)> {
        let mut bindings = Vec::new();
        for mode in RewriteMode::ALL {
            if let Some(binding) = settings.hotkeys.get(&mode) {
                bindings.push((binding.clone(), HotkeyAction::Rewrite(mode)));
            }
        }
        if settings.speech.enabled {
            bindings.push((settings.speech.hotkey.clone(), HotkeyAction::ToggleSpeech));
        }
        bindings
    }

    fn rebuild_matcher(matcher: &Mutex<HotkeyMatcher>, settings: &Settings) {
        if let Ok(mut guard) = matcher.lock() {
            guard.set_bindings(&matcher_bindings(settings));
            guard.set_enabled(settings.hotkeys_enabled);
        } else {
            warn!("hotkey matcher lock poisoned, bindings not rebuilt");
        }
    }

    pub async fn run() -> Result<()> {
        let mut config = Config::load()?;
        telemetry::init(config.settings().log_to_file, config.config_dir())?;
        info!("vox starting");

        permissions::request_all_permissions()?;
        service::flush_services_cache();

        let matcher = Arc::new(Mutex::new(HotkeyMatcher::new()));
        rebuild_matcher(&matcher, config.settings());

        let (action_tx, action_rx) = std::sync::mpsc::channel();
        let event_tap = tap::spawn_event_tap(Arc::clone(&matcher), action_tx)?;

        let mut provider = build_provider(config.settings());
        let mut transcriber = SpeechTranscriber::new(config.models_dir());
        let mut tray = TrayManager::new(config.settings())?;

        info!("event loop starting");
        event_loop(
            &mut config,
            &matcher,
            &action_rx,
            &mut provider,
            &mut transcriber,
            &mut tray,
        )
        .await;

        event_tap.shutdown();
        info!("vox stopped");
        Ok(())
    }

    async fn event_loop(
        config: &mut Config,
        matcher: &Mutex<HotkeyMatcher>,
        actions: &Receiver<HotkeyAction>,
        provider: &mut Arc<Provider>,
        transcriber: &mut SpeechTranscriber,
        tray: &mut TrayManager,
    ) {
        let (task_tx, task_rx) = std::sync::mpsc::channel::<TaskEvent>();

        loop {
            while let Ok(action) = actions.try_recv() {
                match action {
                    HotkeyAction::Rewrite(mode) => {
                        start_rewrite(config, provider, tray, &task_tx, mode);
                    }
                    HotkeyAction::ToggleSpeech => {
                        toggle_dictation(config, transcriber, tray, &task_tx).await;
                    }
                }
            }

            while let Some(command) = TrayManager::poll_events() {
                handle_tray_command(
                    config, matcher, provider, transcriber, tray, &task_tx, command,
                )
                .await;
            }

            while let Ok(event) = task_rx.try_recv() {
                handle_task_event(config, transcriber, tray, event);
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                }
                () = tokio::time::sleep(tokio::time::Duration::from_millis(10)) => {
                    // Poll interval; keeps the loop from busy-waiting.
                }
            }
        }
    }

    /// Kick off a rewrite on a background task so the loop keeps servicing
    /// hot keys and tray clicks while the network call is in flight.
    fn start_rewrite(
        config: &Config,
        provider: &Arc<Provider>,
        tray: &mut TrayManager,
        tasks: &Sender<TaskEvent>,
        mode: RewriteMode,
    ) {
        set_phase(config, tray, AppPhase::Processing);
        notify::show(&notify::rewrite_started_message(mode));

        let provider = Arc::clone(provider);
        let tasks = tasks.clone();
        tokio::spawn(async move {
            let message = provider.handle(mode).await;
            if tasks.send(TaskEvent::RewriteDone(message)).is_err() {
                warn!("task event receiver dropped, rewrite result lost");
            }
        });
    }

    /// Start or stop dictation. Starting downloads the selected model first
    /// when it is not on disk yet; stopping hands the captured samples to a
    /// worker for inference and the result comes back as a task event.
    async fn toggle_dictation(
        config: &Config,
        transcriber: &mut SpeechTranscriber,
        tray: &mut TrayManager,
        tasks: &Sender<TaskEvent>,
    ) {
        if transcriber.is_recording() {
            set_phase(config, tray, AppPhase::Processing);

            let Some(samples) = transcriber.take_recording() else {
                set_phase(config, tray, AppPhase::Idle);
                return;
            };
            if samples.is_empty() {
                notify::show("No speech detected");
                set_phase(config, tray, AppPhase::Idle);
                return;
            }

            let model = ModelKind::from_name(&config.settings().speech.model);
            let engine = match transcriber.prepare_engine(model) {
                Ok(engine) => engine,
                Err(e) => {
                    warn!(error = %e, "could not load whisper model");
                    notify::show(&notify::speech_error_message(&e));
                    set_phase(config, tray, AppPhase::Idle);
                    return;
                }
            };

            let language = config.settings().speech.language.clone();
            let tasks = tasks.clone();
            tokio::task::spawn_blocking(move || {
                let result = engine.transcribe(&samples, &language);
                if tasks.send(TaskEvent::TranscriptionDone(result)).is_err() {
                    warn!("task event receiver dropped, transcription lost");
                }
            });
            return;
        }

        let model = ModelKind::from_name(&config.settings().speech.model);
        if !transcriber.is_model_downloaded(model) {
            notify::show(&notify::model_download_message(model.name()));
            // The store clone keeps the download off the main thread; the
            // transcriber itself cannot leave it.
            let store = transcriber.store().clone();
            let downloaded =
                tokio::task::spawn_blocking(move || store.download(model, |_| {})).await;
            match downloaded {
                Ok(Ok(_)) => {
                    info!(model = model.name(), "model downloaded");
                    // A stale engine for this kind must not serve the old
                    // file.
                    transcriber.invalidate_model(model);
                }
                Ok(Err(source)) => {
                    let e = SpeechError::ModelDownload {
                        model: model.name(),
                        source,
                    };
                    warn!(error = %e, "model download failed");
                    notify::show(&notify::speech_error_message(&e));
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "model download task panicked");
                    notify::show(&format!("Failed to download {} model", model.name()));
                    return;
                }
            }
        }

        let on_level = Box::new(|level: f32| {
            tracing::trace!(level, "input level");
        });
        match transcriber.start_recording(on_level) {
            Ok(()) => {
                notify::show("Listening... press the dictation hotkey again to stop");
                set_phase(config, tray, AppPhase::Recording);
            }
            Err(e) => {
                warn!(error = %e, "could not start recording");
                notify::show(&notify::speech_error_message(&e));
            }
        }
    }

    fn handle_task_event(
        config: &Config,
        transcriber: &SpeechTranscriber,
        tray: &mut TrayManager,
        event: TaskEvent,
    ) {
        match event {
            TaskEvent::RewriteDone(message) => notify::show(&message),
            TaskEvent::TranscriptionDone(result) => match result {
                Ok(text) if text.is_empty() => notify::show("No speech detected"),
                Ok(text) => {
                    if pasteboard::write_text(&text) {
                        notify::show("Transcription copied to clipboard");
                    } else {
                        notify::show("Failed to copy transcription to clipboard");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "transcription failed");
                    notify::show(&notify::speech_error_message(&SpeechError::Engine(e)));
                }
            },
        }
        set_phase(config, tray, idle_phase(transcriber));
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_tray_command(
        config: &mut Config,
        matcher: &Mutex<HotkeyMatcher>,
        provider: &mut Arc<Provider>,
        transcriber: &mut SpeechTranscriber,
        tray: &mut TrayManager,
        tasks: &Sender<TaskEvent>,
        command: TrayCommand,
    ) {
        match command {
            TrayCommand::Rewrite(mode) => {
                start_rewrite(config, provider, tray, tasks, mode);
                return;
            }
            TrayCommand::ToggleSpeech => {
                toggle_dictation(config, transcriber, tray, tasks).await;
                return;
            }
            TrayCommand::SetModel(model) => {
                if let Err(e) = config.set_model(model) {
                    warn!(error = %e, "failed to persist model change");
                }
                *provider = build_provider(config.settings());
            }
            TrayCommand::SetWhisperModel(kind) => {
                if let Err(e) = config.set_speech_model(kind.name().to_owned()) {
                    warn!(error = %e, "failed to persist whisper model change");
                }
                transcriber.release_engine();
            }
            TrayCommand::ToggleThinking => {
                let enabled = !config.settings().thinking_mode;
                if let Err(e) = config.set_thinking_mode(enabled) {
                    warn!(error = %e, "failed to persist thinking mode");
                }
                *provider = build_provider(config.settings());
            }
            TrayCommand::ToggleHotkeys => {
                let enabled = !config.settings().hotkeys_enabled;
                if let Err(e) = config.set_hotkeys_enabled(enabled) {
                    warn!(error = %e, "failed to persist hotkeys flag");
                }
                rebuild_matcher(matcher, config.settings());
            }
            TrayCommand::ToggleAutoStart => {
                let enabled = !Config::is_auto_start_enabled();
                if let Err(e) = config.set_auto_start(enabled) {
                    warn!(error = %e, "failed to toggle launch agent");
                    notify::show("Failed to update Start at Login");
                }
            }
            TrayCommand::OpenConfigFile => {
                let result = std::process::Command::new("open")
                    .arg(config.config_file())
                    .output();
                if let Err(e) = result {
                    warn!(error = %e, "failed to open config file");
                }
                return;
            }
        }

        if let Err(e) = tray.refresh_menu(config.settings()) {
            warn!(error = %e, "failed to refresh tray menu");
        }
    }

    fn idle_phase(transcriber: &SpeechTranscriber) -> AppPhase {
        if transcriber.is_recording() {
            AppPhase::Recording
        } else {
            AppPhase::Idle
        }
    }

    fn set_phase(config: &Config, tray: &mut TrayManager, phase: AppPhase) {
        if let Err(e) = tray.set_phase(config.settings(), phase) {
            warn!(error = %e, "failed to update tray phase");
        }
    }
}
