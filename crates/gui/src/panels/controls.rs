//! Controls panel: time range, output, job buttons and the equivalent
//! command line.

use chrono::NaiveDateTime;
use egui::{Color32, RichText, Ui};
use ngprep_core::CommandLine;
use ngprep_processing::forcings::ForcingSourceKind;

use crate::state::Selection;

const INPUT_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Values typed into the controls panel.
pub struct ControlsState {
    pub start: String,
    pub end: String,
    pub output_name: String,
    pub forcing_dir: String,
    /// EPSG code of forcing grids without an embedded CRS, may be empty
    pub forcing_epsg: String,
    pub source: ForcingSourceKind,
}

impl Default for ControlsState {
    fn default() -> Self {
        Self {
            start: "2010-01-01 00:00".to_string(),
            end: "2010-01-02 00:00".to_string(),
            output_name: String::new(),
            forcing_dir: String::new(),
            forcing_epsg: String::new(),
            source: ForcingSourceKind::Nwm,
        }
    }
}

impl ControlsState {
    /// Parsed start and end, or a message for the user
    pub fn period(&self) -> Result<(NaiveDateTime, NaiveDateTime), String> {
        let parse = |label: &str, text: &str| {
            NaiveDateTime::parse_from_str(text.trim(), INPUT_FORMAT)
                .map_err(|_| format!("{} must look like 2010-01-01 00:00", label))
        };
        let start = parse("Start", &self.start)?;
        let end = parse("End", &self.end)?;
        if end <= start {
            return Err("End must be after start".to_string());
        }
        Ok((start, end))
    }

    /// Parsed EPSG override; empty means none
    pub fn epsg(&self) -> Result<Option<u32>, String> {
        let text = self.forcing_epsg.trim();
        if text.is_empty() {
            return Ok(None);
        }
        text.parse()
            .map(Some)
            .map_err(|_| format!("EPSG must be a number, got {}", text))
    }

    /// CLI invocation producing the same package as the buttons
    pub fn command_line(&self, selection: &Selection) -> Option<CommandLine> {
        if selection.is_empty() {
            return None;
        }
        let mut cmd = CommandLine::for_catchments(selection.selected().iter().cloned())
            .subset(true)
            .forcings(true)
            .realization(true)
            .output_name(self.output_name.trim())
            .source(self.source)
            .forcing_epsg(self.epsg().ok().flatten());
        if let Ok((start, end)) = self.period() {
            cmd = cmd.period(start, end);
        }
        if !self.forcing_dir.trim().is_empty() {
            cmd = cmd.forcing_dir(self.forcing_dir.trim());
        }
        Some(cmd)
    }
}

/// Result of showing the controls panel.
pub enum ControlsAction {
    Subset,
    Forcings,
    Realization,
    ClearSelection,
    None,
}

pub fn show_controls(
    ui: &mut Ui,
    state: &mut ControlsState,
    selection: &Selection,
    package: Option<&str>,
    running: bool,
) -> ControlsAction {
    let mut action = ControlsAction::None;

    ui.heading("Selection");
    if selection.is_empty() {
        ui.label("Click the map to select catchments");
    } else {
        ui.label(format!(
            "{} selected, {} upstream",
            selection.selected().len(),
            selection.upstream_only().count()
        ));
        for cat_id in selection.selected() {
            ui.label(RichText::new(cat_id).monospace());
        }
        if ui.button("Clear").clicked() {
            action = ControlsAction::ClearSelection;
        }
    }
    ui.separator();

    egui::Grid::new("period").num_columns(2).show(ui, |ui| {
        ui.label("Start");
        ui.text_edit_singleline(&mut state.start);
        ui.end_row();
        ui.label("End");
        ui.text_edit_singleline(&mut state.end);
        ui.end_row();
        ui.label("Output name");
        ui.add(egui::TextEdit::singleline(&mut state.output_name).hint_text(
            selection.default_folder_name().unwrap_or("first catchment"),
        ));
        ui.end_row();
        ui.label("Forcing dir");
        ui.text_edit_singleline(&mut state.forcing_dir);
        ui.end_row();
        ui.label("Forcing EPSG");
        ui.add(egui::TextEdit::singleline(&mut state.forcing_epsg).hint_text("from files"));
        ui.end_row();
        ui.label("Source");
        egui::ComboBox::from_id_salt("forcing_source")
            .selected_text(state.source.to_string())
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut state.source, ForcingSourceKind::Nwm, "nwm");
                ui.selectable_value(&mut state.source, ForcingSourceKind::Aorc, "aorc");
            });
        ui.end_row();
    });

    let period = state.period();
    if let Err(msg) = &period {
        ui.colored_label(Color32::RED, msg);
    }
    let epsg = state.epsg();
    if let Err(msg) = &epsg {
        ui.colored_label(Color32::RED, msg);
    }
    ui.separator();

    match package {
        Some(name) => ui.label(format!("Package: {}", name)),
        None => ui.label("No package for this selection, run Subset first"),
    };

    let idle = !running;
    ui.horizontal(|ui| {
        if ui
            .add_enabled(idle && !selection.is_empty(), egui::Button::new("Subset"))
            .clicked()
        {
            action = ControlsAction::Subset;
        }
        let can_process = idle && package.is_some() && period.is_ok();
        let can_force = can_process && epsg.is_ok() && !state.forcing_dir.trim().is_empty();
        if ui
            .add_enabled(can_force, egui::Button::new("Forcings"))
            .clicked()
        {
            action = ControlsAction::Forcings;
        }
        if ui
            .add_enabled(can_process, egui::Button::new("Realization"))
            .clicked()
        {
            action = ControlsAction::Realization;
        }
        if running {
            ui.spinner();
        }
    });

    if let Some(cmd) = state.command_line(selection) {
        ui.separator();
        ui.label("Command line");
        let text = cmd.to_string();
        ui.label(RichText::new(&text).monospace().size(11.0));
        if ui.button("Copy").clicked() {
            ui.ctx().copy_text(text);
        }
    }

    action
}
