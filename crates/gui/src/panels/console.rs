//! Console panel: job log with coloured levels.

use egui::{Color32, RichText, ScrollArea, Ui};

use crate::state::{LogEntry, LogLevel};

fn level_style(level: LogLevel) -> (&'static str, Color32) {
    match level {
        LogLevel::Info => ("[INFO]", Color32::from_rgb(150, 180, 220)),
        LogLevel::Warning => ("[WARN]", Color32::from_rgb(230, 180, 50)),
        LogLevel::Error => ("[ERROR]", Color32::from_rgb(220, 60, 60)),
        LogLevel::Success => ("[OK]", Color32::from_rgb(60, 200, 80)),
    }
}

/// `HH:MM:SS` (UTC) of a log entry
fn clock(entry: &LogEntry) -> String {
    let secs = entry
        .timestamp
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        % 86400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Show the log; returns true when the user asked to clear it.
pub fn show_console(ui: &mut Ui, logs: &[LogEntry]) -> bool {
    let mut clear = false;
    ui.horizontal(|ui| {
        ui.heading("Console");
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            clear = ui.small_button("Clear").clicked();
            let errors = logs.iter().filter(|e| e.level == LogLevel::Error).count();
            if errors > 0 {
                ui.colored_label(level_style(LogLevel::Error).1, format!("{} errors", errors));
            }
        });
    });
    ui.separator();

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .stick_to_bottom(true)
        .show(ui, |ui| {
            for entry in logs {
                let (prefix, color) = level_style(entry.level);
                ui.horizontal(|ui| {
                    ui.label(RichText::new(clock(entry)).color(Color32::GRAY).monospace().size(11.0));
                    ui.label(RichText::new(prefix).color(color).monospace().size(11.0));
                    ui.label(RichText::new(&entry.message).monospace().size(11.0));
                });
            }
        });
    clear
}
