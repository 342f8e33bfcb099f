//! Converter application window
//!
//! Settings form, log view and run controls around the detection and
//! conversion modules. Folder ingress is a single function used by the
//! Browse button, drag-and-drop and the CLI positional argument alike.

use std::path::{Path, PathBuf};

use eframe::egui;
use log::{info, warn};

use crate::detect;
use crate::encode::{ConversionRunner, ConversionSettings, Preset, RunEvent, RunOutcome};

/// Frame rate choices offered in the UI (typed rates still accepted via settings)
pub const FRAME_RATES: &[&str] = &[
    "12", "15", "23.976", "24", "25", "29.97", "30", "50", "59.94", "60",
];

/// Main application state
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ConverterApp {
    pub settings: ConversionSettings,
    #[serde(skip)]
    pub runner: ConversionRunner,
    #[serde(skip)]
    log_lines: Vec<String>,
    #[serde(skip)]
    status: String,
    #[serde(skip)]
    error_msg: Option<String>,
    #[serde(skip)]
    last_detection: Option<detect::DetectionResult>,
}

impl Default for ConverterApp {
    fn default() -> Self {
        Self {
            settings: ConversionSettings::default(),
            runner: ConversionRunner::default(),
            log_lines: Vec::new(),
            status: "Ready to convert".to_string(),
            error_msg: None,
            last_detection: None,
        }
    }
}

impl ConverterApp {
    /// Single ingress for folder selection (browse, drop, CLI)
    pub fn on_folder_selected(&mut self, path: &Path) {
        self.settings.input_folder = path.to_path_buf();
        self.error_msg = None;

        match detect::detect(path) {
            Ok(result) => {
                if let Some(ext) = &result.file_extension {
                    self.settings.file_extension = ext.clone();
                }
                if let Some(pattern) = &result.file_pattern {
                    self.settings.file_pattern = pattern.clone();
                }
                self.log(format!(
                    "Detected: {} files, pattern: {}, extension: {}",
                    result.file_count, self.settings.file_pattern, self.settings.file_extension
                ));
                self.last_detection = Some(result);
            }
            Err(e) => {
                warn!("Auto-detection error: {}", e);
                self.log(format!("Auto-detection error: {}", e));
                self.last_detection = None;
            }
        }

        self.settings.output_file = detect::output_path_for(path);
    }

    /// Auto-Detect Settings button: re-scan the currently selected folder
    fn detect_clicked(&mut self) {
        let folder = self.settings.input_folder.clone();
        if folder.as_os_str().is_empty() || !folder.is_dir() {
            self.error_msg = Some("Please select an input folder first".to_string());
            return;
        }
        self.on_folder_selected(&folder);
        self.log("Settings auto-detected from folder".to_string());
    }

    fn convert_clicked(&mut self) {
        match self.runner.start(&self.settings) {
            Ok(()) => {
                self.error_msg = None;
                self.status = "Converting...".to_string();
            }
            Err(e) => {
                warn!("Conversion not started: {}", e);
                self.error_msg = Some("Please select input folder and output file".to_string());
                self.log(format!("Error: {}", e));
            }
        }
    }

    fn stop_clicked(&mut self) {
        self.log("Stopping conversion...".to_string());
        self.runner.cancel();
    }

    fn log(&mut self, line: String) {
        self.log_lines.push(line);
    }

    /// Drain worker events into the log view and status line
    fn drain_runner_events(&mut self) {
        let mut drained = Vec::new();
        if let Some(rx) = self.runner.events() {
            while let Ok(event) = rx.try_recv() {
                drained.push(event);
            }
        }
        for event in drained {
            match event {
                RunEvent::Log(line) => self.log(line),
                RunEvent::Finished(outcome) => self.finish(outcome),
            }
        }
    }

    fn finish(&mut self, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Success => {
                info!("Conversion finished");
                self.status = "Done - sequence converted to MP4".to_string();
                self.error_msg = None;
            }
            RunOutcome::Failed(code) => {
                self.status = "Ready to convert".to_string();
                self.error_msg = Some(format!(
                    "Conversion failed (code {}). Check the log for details.",
                    code
                ));
            }
            RunOutcome::Cancelled => {
                self.status = "Ready to convert".to_string();
                self.error_msg = None;
            }
            RunOutcome::Error(msg) => {
                self.status = "Ready to convert".to_string();
                self.error_msg = Some(format!("Conversion failed: {}", msg));
            }
        }
    }

    /// Accept the first dropped path that is a directory
    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.clone())
                .collect()
        });
        if let Some(path) = dropped.into_iter().find(|p| p.is_dir()) {
            info!("Folder dropped: {}", path.display());
            self.on_folder_selected(&path);
            self.log(format!("Dropped folder: {}", path.display()));
        }
    }

    fn render_paths(&mut self, ui: &mut egui::Ui) {
        let busy = self.runner.is_running();

        ui.horizontal(|ui| {
            ui.label("Input Folder:");
            ui.add_enabled_ui(!busy, |ui| {
                let mut edit_path = self.settings.input_folder.display().to_string();
                if ui.text_edit_singleline(&mut edit_path).changed() {
                    self.settings.input_folder = PathBuf::from(edit_path);
                }
                if ui.button("Browse").clicked() {
                    if let Some(folder) = rfd::FileDialog::new()
                        .set_title("Select Input Folder")
                        .pick_folder()
                    {
                        self.on_folder_selected(&folder);
                    }
                }
            });
        });

        ui.horizontal(|ui| {
            ui.label("Output File:");
            ui.add_enabled_ui(!busy, |ui| {
                let mut edit_path = self.settings.output_file.display().to_string();
                if ui.text_edit_singleline(&mut edit_path).changed() {
                    self.settings.output_file = PathBuf::from(edit_path);
                }
                if ui.button("Save As").clicked() {
                    if let Some(file) = rfd::FileDialog::new()
                        .set_title("Save MP4 As")
                        .add_filter("MP4 files", &["mp4"])
                        .set_file_name("output.mp4")
                        .save_file()
                    {
                        self.settings.output_file = file;
                    }
                }
            });
        });
    }

    fn render_settings(&mut self, ui: &mut egui::Ui) {
        let busy = self.runner.is_running();
        ui.add_enabled_ui(!busy, |ui| {
            ui.horizontal(|ui| {
                ui.label("Frame Rate:");
                egui::ComboBox::from_id_salt("frame_rate")
                    .selected_text(format!("{} fps", self.settings.frame_rate))
                    .show_ui(ui, |ui| {
                        for rate in FRAME_RATES {
                            ui.selectable_value(
                                &mut self.settings.frame_rate,
                                rate.to_string(),
                                *rate,
                            );
                        }
                    });
            });

            ui.horizontal(|ui| {
                ui.label("Quality (CRF):");
                ui.add(
                    egui::Slider::new(&mut self.settings.quality, 15..=28)
                        .text("lower = higher quality"),
                );
            });

            ui.horizontal(|ui| {
                ui.label("Preset:");
                egui::ComboBox::from_id_salt("preset")
                    .selected_text(self.settings.preset.as_str())
                    .show_ui(ui, |ui| {
                        for preset in Preset::all() {
                            ui.selectable_value(
                                &mut self.settings.preset,
                                *preset,
                                preset.as_str(),
                            );
                        }
                    });
            });

            ui.horizontal(|ui| {
                ui.label("File Pattern:");
                egui::ComboBox::from_id_salt("file_pattern")
                    .selected_text(self.settings.file_pattern.clone())
                    .show_ui(ui, |ui| {
                        for pattern in detect::PATTERN_CHOICES {
                            ui.selectable_value(
                                &mut self.settings.file_pattern,
                                pattern.to_string(),
                                *pattern,
                            );
                        }
                    });
            });

            ui.horizontal(|ui| {
                ui.label("File Extension:");
                egui::ComboBox::from_id_salt("file_extension")
                    .selected_text(self.settings.file_extension.clone())
                    .show_ui(ui, |ui| {
                        for ext in detect::SUPPORTED_EXTS {
                            ui.selectable_value(
                                &mut self.settings.file_extension,
                                ext.to_string(),
                                *ext,
                            );
                        }
                    });
            });

            if ui.button("Auto-Detect Settings").clicked() {
                self.detect_clicked();
            }
        });
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        let busy = self.runner.is_running();
        ui.horizontal(|ui| {
            ui.add_enabled_ui(!busy, |ui| {
                if ui.button("Convert to MP4").clicked() {
                    self.convert_clicked();
                }
            });
            ui.add_enabled_ui(busy, |ui| {
                if ui.button("Stop").clicked() {
                    self.stop_clicked();
                }
            });
            if busy {
                ui.spinner();
            }
        });
    }

    fn render_log(&mut self, ui: &mut egui::Ui) {
        ui.label("Log:");
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for line in &self.log_lines {
                    ui.monospace(line);
                }
            });
    }
}

impl eframe::App for ConverterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_runner_events();
        self.handle_dropped_files(ctx);

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let Some(err) = &self.error_msg {
                    ui.colored_label(egui::Color32::LIGHT_RED, err);
                } else {
                    ui.label(&self.status);
                }
                if let Some(detection) = &self.last_detection {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.label(format!("{} frames", detection.file_count));
                    });
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Image Sequence Converter");
            ui.label("Select or drop a folder containing image sequence files (PNG, JPG, EXR, ...)");
            ui.separator();

            self.render_paths(ui);
            ui.add_space(8.0);
            self.render_settings(ui);
            ui.add_space(8.0);
            self.render_controls(ui);
            ui.separator();
            self.render_log(ui);
        });

        // Keep draining worker output even without user input
        if self.runner.is_running() {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        if let Ok(json) = serde_json::to_string(self) {
            storage.set_string(eframe::APP_KEY, json);
        }
    }
}
