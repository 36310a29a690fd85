//! Basemap rendering using walkers (OpenStreetMap slippy tiles) with
//! catchment outlines and click picking.

use std::collections::HashMap;

use egui::{Color32, Pos2, Response, Shape, Stroke, Ui};
use walkers::sources::OpenStreetMap;
use walkers::{lon_lat, HttpTiles, Map, MapMemory, Plugin, Position, Projector};

use crate::state::{Outline, OutlineStyle, Selection};

const SELECTED_COLOR: Color32 = Color32::from_rgb(230, 60, 60);
const UPSTREAM_COLOR: Color32 = Color32::from_rgb(40, 140, 230);

/// Persistent basemap state (survives between frames).
pub struct BasemapState {
    pub tiles: HttpTiles,
    pub memory: MapMemory,
    /// Map center position (lon, lat).
    pub center: Position,
}

impl BasemapState {
    /// Create a new basemap state centred at the given WGS-84 lon/lat.
    pub fn new(ctx: &egui::Context, lon: f64, lat: f64) -> Self {
        Self {
            tiles: HttpTiles::new(OpenStreetMap, ctx.clone()),
            memory: MapMemory::default(),
            center: lon_lat(lon, lat),
        }
    }
}

/// Draws the outline of every selected or upstream catchment.
struct CatchmentOutlines<'a> {
    outlines: &'a HashMap<String, Outline>,
    selection: &'a Selection,
}

impl Plugin for CatchmentOutlines<'_> {
    fn run(self: Box<Self>, ui: &mut Ui, _response: &Response, projector: &Projector) {
        let painter = ui.painter();
        // Upstream first so selected outlines end up on top.
        for pass in [OutlineStyle::Upstream, OutlineStyle::Selected] {
            let (color, width) = match pass {
                OutlineStyle::Selected => (SELECTED_COLOR, 2.5),
                OutlineStyle::Upstream => (UPSTREAM_COLOR, 1.5),
            };
            for (cat_id, rings) in self.outlines {
                if self.selection.style(cat_id) != Some(pass) {
                    continue;
                }
                for ring in rings {
                    let points: Vec<Pos2> = ring
                        .iter()
                        .map(|&(lon, lat)| projector.project(lon_lat(lon, lat)).to_pos2())
                        .collect();
                    painter.add(Shape::closed_line(points, Stroke::new(width, color)));
                }
            }
        }
    }
}

/// Records where the map was clicked.
#[derive(Default)]
struct ClickWatcher {
    clicked_at: Option<Position>,
}

impl Plugin for &mut ClickWatcher {
    fn run(self: Box<Self>, _ui: &mut Ui, response: &Response, projector: &Projector) {
        if !response.changed() && response.clicked_by(egui::PointerButton::Primary) {
            self.clicked_at = response
                .interact_pointer_pos()
                .map(|p| projector.unproject(p - response.rect.center()));
        }
    }
}

/// Render the basemap with catchment outlines. Returns the WGS-84
/// `(lon, lat)` of a primary click on the map, if any.
pub fn show_basemap(
    ui: &mut Ui,
    state: &mut BasemapState,
    outlines: &HashMap<String, Outline>,
    selection: &Selection,
) -> Option<(f64, f64)> {
    let mut click = ClickWatcher::default();
    let map = Map::new(Some(&mut state.tiles), &mut state.memory, state.center)
        .with_plugin(CatchmentOutlines { outlines, selection })
        .with_plugin(&mut click);
    ui.add(map);

    click.clicked_at.map(|p| (p.x(), p.y()))
}
