use playalong::{InputHandle, PlayalongApp, Settings, config};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("playalong=info")),
        )
        .init();

    let settings_path = Settings::default_path();
    let settings = match Settings::load_or_default(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            error!(path = %settings_path.display(), "invalid settings, using defaults: {}", e);
            Settings::default()
        }
    };

    let watcher = if settings_path.exists() {
        config::watch(&settings_path)
            .inspect_err(|e| warn!("settings will not reload live: {}", e))
            .ok()
    } else {
        None
    };

    let mut input = InputHandle::new();
    match input.connect_midi(settings.input.midi_port_hint.as_deref()) {
        Ok(port) => info!(port, "listening for MIDI"),
        Err(e) => warn!("MIDI input unavailable, computer keyboard only: {}", e),
    }

    let (width, height) = settings.display.window_size;
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([width, height])
            .with_title("Playalong"),
        ..Default::default()
    };

    if let Err(e) = eframe::run_native(
        "Playalong",
        options,
        Box::new(|_cc| Ok(Box::new(PlayalongApp::new(settings, settings_path, input, watcher)))),
    ) {
        error!("window closed with error: {}", e);
    }
}
