use clap::Parser;
use eframe::egui;
use log::{debug, info, warn};

use seq2mp4::app::ConverterApp;
use seq2mp4::cli::Args;
use seq2mp4::config;
use seq2mp4::encode::Preset;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Create path configuration from CLI args and environment
    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());

    // Ensure directories exist
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    // Determine log level based on verbosity flags
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    // Initialize logger based on --log flag
    if let Some(log_path_opt) = &args.log_file {
        // File logging with specified verbosity level
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file("seq2mp4.log", &path_config));

        let file = std::fs::File::create(&log_path)?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("egui", log::LevelFilter::Info) // Suppress egui DEBUG spam
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!(
            "Logging to file: {} (level: {:?})",
            log_path.display(),
            log_level
        );
    } else {
        // Console logging with specified verbosity level (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("egui", log::LevelFilter::Info) // Suppress egui DEBUG spam
            .format_timestamp_millis()
            .init();
    }

    info!("seq2mp4 Image Sequence Converter starting...");
    debug!("Command-line args: {:?}", args);
    info!(
        "Config path: {}",
        config::config_file("seq2mp4.json", &path_config).display()
    );

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(format!(
                "seq2mp4 v{} - Image Sequence Converter",
                env!("CARGO_PKG_VERSION")
            ))
            .with_inner_size([800.0, 600.0])
            .with_resizable(true)
            .with_drag_and_drop(true),
        persist_window: true,
        #[cfg(not(target_arch = "wasm32"))]
        persistence_path: Some(config::config_file("seq2mp4.json", &path_config)),
        ..Default::default()
    };

    eframe::run_native(
        "seq2mp4",
        native_options,
        Box::new(move |cc| {
            // Load persisted app state if available, otherwise create default
            let mut app: ConverterApp = cc
                .storage
                .and_then(|storage| storage.get_string(eframe::APP_KEY))
                .and_then(|json| serde_json::from_str(&json).ok())
                .unwrap_or_else(|| {
                    info!("No persisted state found, creating default app");
                    ConverterApp::default()
                });

            // CLI arguments have priority over persisted settings
            if let Some(ffmpeg) = &args.ffmpeg {
                app.runner.set_encoder(ffmpeg.to_string_lossy().into_owned());
            }
            if let Some(folder) = &args.folder {
                info!("Input folder from CLI: {}", folder.display());
                app.on_folder_selected(folder);
            }
            if let Some(output) = &args.output {
                app.settings.output_file = output.clone();
            }
            if let Some(rate) = &args.frame_rate {
                app.settings.frame_rate = rate.clone();
            }
            if let Some(crf) = args.crf {
                app.settings.quality = crf;
            }
            if let Some(name) = &args.preset {
                match Preset::from_name(name) {
                    Some(preset) => app.settings.preset = preset,
                    None => warn!("Unknown preset '{}', keeping {}", name, app.settings.preset),
                }
            }

            Ok(Box::new(app))
        }),
    )?;

    info!("Application exiting");
    Ok(())
}
