//! Main application: NgprepMapApp implements eframe::App.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use ngprep_core::{FilePaths, Settings};
use ngprep_processing::network::NetworkGraph;

use crate::executor::{self, HydrofabricSource, JobRequest};
use crate::panels::console::show_console;
use crate::panels::controls::{show_controls, ControlsAction, ControlsState};
use crate::render::map_tiles::{show_basemap, BasemapState};
use crate::state::{AppMessage, Job, JobState, LogEntry, Outline, Selection};

/// Initial map centre over CONUS
const START_LON: f64 = -96.0;
const START_LAT: f64 = 40.0;

/// The main application state.
pub struct NgprepMapApp {
    /// Message channels for background thread communication.
    tx: Sender<AppMessage>,
    rx: Receiver<AppMessage>,

    /// Console log entries.
    logs: Vec<LogEntry>,

    basemap: BasemapState,
    controls: ControlsState,

    /// Selected catchments and everything upstream of them.
    selection: Selection,
    /// Outlines fetched so far, keyed by catchment id.
    outlines: HashMap<String, Outline>,

    /// Network graph, once loaded in the background.
    network: Option<Arc<NetworkGraph>>,
    source: HydrofabricSource,
    settings: Settings,

    /// Running pipeline job and the package built for the selection.
    jobs: JobState,
}

impl NgprepMapApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut logs = Vec::new();

        let settings = Settings::load().unwrap_or_else(|e| {
            logs.push(LogEntry::warning(format!("Settings not loaded, using defaults: {}", e)));
            Settings::default()
        });
        let source = HydrofabricSource {
            gpkg: settings.hydrofabric.clone(),
            network_cache: settings.network_cache.clone(),
        };
        logs.push(LogEntry::info(format!(
            "Output folder: {}",
            settings.root_output_dir().display()
        )));
        executor::load_network(source.clone(), tx.clone());

        Self {
            tx,
            rx,
            logs,
            basemap: BasemapState::new(&cc.egui_ctx, START_LON, START_LAT),
            controls: ControlsState::default(),
            selection: Selection::default(),
            outlines: HashMap::new(),
            network: None,
            source,
            settings,
            jobs: JobState::default(),
        }
    }

    /// Drain messages from background threads.
    fn process_messages(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                AppMessage::NetworkLoaded(network) => {
                    self.network = Some(network);
                    self.trace_selection();
                }
                AppMessage::CatchmentFound { cat_id } => {
                    let added = self.selection.toggle(&cat_id);
                    self.jobs.selection_changed();
                    self.logs.push(LogEntry::info(if added {
                        format!("Selected {}", cat_id)
                    } else {
                        format!("Deselected {}", cat_id)
                    }));
                    self.trace_selection();
                }
                AppMessage::UpstreamTraced {
                    selected,
                    upstream,
                    outlines,
                } => {
                    if self.selection.set_upstream(&selected, upstream) {
                        self.outlines.extend(outlines);
                    }
                }
                AppMessage::JobComplete { job, paths, .. } => {
                    self.jobs.complete(job, paths, self.selection.selected());
                    if job == Job::Subset && self.jobs.package().is_none() {
                        self.logs.push(LogEntry::warning(
                            "Selection changed during subset, run Subset again",
                        ));
                    }
                }
                AppMessage::Error { job, .. } => {
                    self.jobs.failed(job);
                }
                AppMessage::Log(entry) => {
                    self.logs.push(entry);
                }
            }
        }
    }

    /// Re-trace upstream of the current selection when the network is ready.
    fn trace_selection(&mut self) {
        if self.selection.is_empty() {
            return;
        }
        match &self.network {
            Some(network) => executor::trace_upstream(
                self.source.clone(),
                Arc::clone(network),
                self.selection.selected().to_vec(),
                self.tx.clone(),
            ),
            None => self
                .logs
                .push(LogEntry::info("Network still loading, upstream will follow")),
        }
    }

    fn handle_action(&mut self, action: ControlsAction) {
        match action {
            ControlsAction::Subset => self.start_subset(),
            ControlsAction::Forcings => {
                if let Some(request) = self.job_request(Job::Forcings) {
                    executor::run_forcings(request, self.tx.clone());
                }
            }
            ControlsAction::Realization => {
                if let Some(request) = self.job_request(Job::Realization) {
                    executor::run_realization(request, self.tx.clone());
                }
            }
            ControlsAction::ClearSelection => {
                self.selection.clear();
                self.outlines.clear();
                self.jobs.selection_changed();
            }
            ControlsAction::None => {}
        }
    }

    fn start_subset(&mut self) {
        let Some(network) = self.network.clone() else {
            self.logs.push(LogEntry::warning("Network is not loaded yet"));
            return;
        };
        let name = self.controls.output_name.trim();
        let folder = if name.is_empty() {
            self.selection.default_folder_name().unwrap_or_default()
        } else {
            name
        };
        match FilePaths::for_folder(folder, &self.settings.root_output_dir()) {
            Ok(paths) => {
                if !self.jobs.start(Job::Subset, self.selection.selected()) {
                    return;
                }
                executor::run_subset(
                    self.source.clone(),
                    network,
                    self.selection.selected().to_vec(),
                    paths,
                    self.tx.clone(),
                );
            }
            Err(e) => self.logs.push(LogEntry::error(format!("Subset: {}", e))),
        }
    }

    /// Parameters for `job` on the current package; marks the job started.
    fn job_request(&mut self, job: Job) -> Option<JobRequest> {
        let paths = self.jobs.package()?.clone();
        let parsed = self
            .controls
            .period()
            .and_then(|period| Ok((period, self.controls.epsg()?)));
        let ((start, end), forcing_epsg) = match parsed {
            Ok(parsed) => parsed,
            Err(msg) => {
                self.logs.push(LogEntry::warning(msg));
                return None;
            }
        };
        if !self.jobs.start(job, self.selection.selected()) {
            return None;
        }
        Some(JobRequest {
            paths,
            start,
            end,
            forcing_dir: PathBuf::from(self.controls.forcing_dir.trim()),
            forcing_epsg,
            source_kind: self.controls.source,
        })
    }
}

impl eframe::App for NgprepMapApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_messages();

        let running = self.jobs.is_running();
        if running || self.network.is_none() {
            ctx.request_repaint();
        }

        let mut action = ControlsAction::None;
        egui::SidePanel::left("controls")
            .default_width(320.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    let package = self.jobs.package().map(|p| p.subset_dir().display().to_string());
                    action = show_controls(
                        ui,
                        &mut self.controls,
                        &self.selection,
                        package.as_deref(),
                        running,
                    );
                });
            });
        self.handle_action(action);

        egui::TopBottomPanel::bottom("console")
            .resizable(true)
            .default_height(160.0)
            .show(ctx, |ui| {
                if show_console(ui, &self.logs) {
                    self.logs.clear();
                }
            });

        let mut clicked = None;
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                clicked = show_basemap(ui, &mut self.basemap, &self.outlines, &self.selection);
            });
        if let Some((lon, lat)) = clicked {
            executor::lookup_point(self.source.clone(), lon, lat, self.tx.clone());
        }
    }
}
