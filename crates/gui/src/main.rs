//! ngprep map
//!
//! Pick catchments on a basemap and build NextGen input packages for them.

mod app;
mod executor;
mod panels;
mod render;
mod state;

use app::NgprepMapApp;

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("ngprep map")
            .with_inner_size([1400.0, 900.0])
            .with_min_inner_size([800.0, 600.0]),
        renderer: eframe::Renderer::Glow,
        ..Default::default()
    };

    eframe::run_native(
        "ngprep-map",
        native_options,
        Box::new(|cc| Ok(Box::new(NgprepMapApp::new(cc)))),
    )
}
