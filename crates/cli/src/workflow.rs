//! Input validation, step resolution and the processing pipeline

use std::path::Path;
use std::process::Command;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use ngprep_core::command::{docker_pull, docker_run_ngen, docker_run_vis, ContainerCommand};
use ngprep_core::ids::{parse_lat_lon, resolve_input, InputMode};
use ngprep_core::{FilePaths, Settings, CRS};
use ngprep_processing::forcings::{create_forcings, GeoTiffSource};
use ngprep_processing::prelude::*;
use ngprep_processing::realization::read_num_partitions;
use tracing::{error, info, warn};

use crate::args::Args;

/// What the user asked to process
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Vpu(String),
    Catchments(Vec<String>),
    Points(Vec<(f64, f64)>),
    /// Gage inputs as given, e.g. `gage-01646500`
    Gages(Vec<String>),
}

/// Validated input: the target and the output folder, when it is known
/// before any lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub target: Target,
    pub output_name: Option<String>,
}

impl Request {
    /// `-o` if given, else the gage input, else the first resolved feature
    pub fn output_folder(&self, features: &[String]) -> Option<String> {
        self.output_name.clone().or_else(|| match &self.target {
            Target::Gages(gages) => gages.first().cloned(),
            _ => features.first().cloned(),
        })
    }

    pub fn is_gage(&self) -> bool {
        matches!(self.target, Target::Gages(_))
    }
}

/// Pipeline steps to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Steps {
    pub subset: bool,
    pub forcings: bool,
    pub realization: bool,
    pub run: bool,
    pub validate: bool,
    pub vis: bool,
    pub cal: bool,
}

impl Steps {
    /// Flags as given, with `--all` and `--run` expanded
    pub fn from_args(args: &Args) -> Self {
        let mut steps = Self {
            subset: args.subset,
            forcings: args.forcings,
            realization: args.realization,
            run: args.run,
            validate: args.validate,
            vis: args.vis,
            cal: args.cal,
        };
        if args.all {
            steps.subset = true;
            steps.forcings = true;
            steps.realization = true;
            steps.run = true;
        }
        if steps.run {
            steps.validate = true;
        }
        steps
    }
}

pub fn validate_input(args: &Args) -> Result<Request> {
    if let Some(vpu) = &args.vpu {
        return Ok(Request {
            target: Target::Vpu(vpu.clone()),
            output_name: Some(args.output_name.clone().unwrap_or_else(|| format!("vpu-{}", vpu))),
        });
    }

    let mut resolved = Vec::with_capacity(args.input_feature.len());
    for raw in &args.input_feature {
        let input = resolve_input(raw, args.latlon, args.gage)?;
        if input.converted_from_waterbody {
            warn!("Waterbody IDs are no longer supported!");
            warn!("Automatically converting {} to {}", raw, input.value);
        }
        resolved.push(input);
    }

    let modes: Vec<InputMode> = resolved.iter().map(|r| r.mode).collect();
    let target = if modes.iter().all(|m| *m == InputMode::LatLon) {
        let points = resolved
            .iter()
            .map(|r| parse_lat_lon(&r.value))
            .collect::<ngprep_core::Result<Vec<_>>>()?;
        Target::Points(points)
    } else if modes.iter().all(|m| *m == InputMode::Gage) {
        Target::Gages(resolved.into_iter().map(|r| r.value).collect())
    } else if modes.iter().all(|m| *m == InputMode::Catchment) {
        Target::Catchments(resolved.into_iter().map(|r| r.value).collect())
    } else {
        bail!("Inputs mix gage ids and catchment ids, pass one kind at a time");
    };

    Ok(Request {
        target,
        output_name: args.output_name.clone(),
    })
}

/// Catchment ids behind a non-VPU target
pub fn resolve_features(target: &Target, hydrofabric: &Hydrofabric) -> Result<Vec<String>> {
    let mut features = Vec::new();
    match target {
        Target::Vpu(_) => {}
        Target::Catchments(ids) => features.extend(ids.iter().cloned()),
        Target::Points(points) => {
            for &(lat, lon) in points {
                let cat = hydrofabric.cat_from_point(lat, lon)?;
                info!("Found {} from {},{}", cat, lat, lon);
                features.push(cat);
            }
        }
        Target::Gages(gages) => {
            for gage in gages {
                let cats = hydrofabric.cat_from_gage(gage)?;
                info!("Found {} from {}", cats.join(", "), gage);
                features.extend(cats);
            }
        }
    }
    Ok(features)
}

/// Enable the steps a package folder still needs
pub fn validate_run_directory(steps: &mut Steps, paths: &FilePaths) {
    if !paths.subset_dir().exists() {
        info!("Subset folder does not exist, enabling subset, forcings, and realization.");
        steps.subset = true;
        steps.forcings = true;
        steps.realization = true;
        return;
    }
    if !paths.forcings_dir().exists() {
        info!("Forcings folder does not exist, enabling forcings.");
        steps.forcings = true;
    }
    if !paths.cat_config_dir().exists() {
        info!("Realization folder does not exist, enabling realization.");
        steps.realization = true;
    }
}

pub fn set_dependent_flags(
    steps: &mut Steps,
    paths: &FilePaths,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<()> {
    if steps.validate {
        info!("Running all missing steps required to run ngiab.");
        validate_run_directory(steps, paths);
    }

    if (steps.realization || steps.forcings) && !paths.subset_dir().exists() && !steps.subset {
        warn!("Subset required for forcings and realization generation, enabling subset.");
        steps.subset = true;
    }

    if (steps.forcings || steps.realization) && (start.is_none() || end.is_none()) {
        bail!("Both --start and --end are required for forcings generation or realization creation. YYYY-MM-DD");
    }
    Ok(())
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn open_hydrofabric(path: &Path) -> Result<Hydrofabric> {
    if !path.is_file() {
        bail!(
            "Hydrofabric not found at {}, pass --hydrofabric or set it in {}",
            path.display(),
            Settings::default_path().display()
        );
    }
    let pb = spinner("Checking hydrofabric indices...");
    Hydrofabric::verify_indices(path).context("Failed to index the hydrofabric")?;
    pb.finish_and_clear();
    Ok(Hydrofabric::open(path)?)
}

fn period(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Result<(NaiveDateTime, NaiveDateTime)> {
    match (start, end) {
        (Some(start), Some(end)) if end > start => Ok((start, end)),
        (Some(start), Some(end)) => bail!("--end {} is not after --start {}", end, start),
        _ => bail!("Both --start and --end are required"),
    }
}

/// Run a container command in the foreground; failures are logged
fn run_container(command: &ContainerCommand) -> bool {
    info!("Running {}", command);
    match Command::new(&command.program).args(&command.args).status() {
        Ok(status) if status.success() => true,
        Ok(status) => {
            error!("{} exited with {}", command.program, status);
            false
        }
        Err(e) => {
            error!("Docker is not running, please start Docker and try again. ({})", e);
            false
        }
    }
}

pub fn run(args: Args) -> Result<()> {
    let timer = Instant::now();
    let mut settings = Settings::load().context("Failed to load settings")?;
    if let Some(dir) = &args.working_dir {
        settings.set_working_dir(dir).context("Failed to save working directory")?;
        info!("Working directory set to {}", settings.root_output_dir().display());
    }
    let hydrofabric_path = args
        .hydrofabric
        .clone()
        .unwrap_or_else(|| settings.hydrofabric.clone());

    let mut steps = Steps::from_args(&args);
    let request = validate_input(&args)?;
    let is_vpu = matches!(request.target, Target::Vpu(_));

    // Everything but running a finished VPU package needs the hydrofabric
    let hydrofabric = if !is_vpu || steps.subset || steps.validate {
        Some(open_hydrofabric(&hydrofabric_path)?)
    } else {
        None
    };

    let features = match &hydrofabric {
        Some(hf) => resolve_features(&request.target, hf)?,
        None => Vec::new(),
    };
    let folder = request
        .output_folder(&features)
        .context("No output folder could be derived from the input")?;
    let paths = FilePaths::for_folder(&folder, &settings.root_output_dir())?;
    set_dependent_flags(&mut steps, &paths, args.start_date, args.end_date)?;

    let mut network = None;
    if let (false, Some(hf)) = (is_vpu, &hydrofabric) {
        info!("Processing {} in {}", features.join(", "), paths.subset_dir().display());
        let pb = spinner("Loading hydrofabric network...");
        let graph = NetworkGraph::load_or_build(hf, &settings.network_cache)?;
        pb.finish_and_clear();

        let upstream_count = graph.upstream_cats(&features).len();
        info!("Upstream catchments: {}", upstream_count);
        if upstream_count == 0 {
            error!("No upstream catchments found.");
            return Ok(());
        }
        network = Some(graph);
    }

    if steps.subset {
        let hf = hydrofabric.as_ref().context("Subsetting requires the hydrofabric")?;
        match (&request.target, &network) {
            (Target::Vpu(vpu), _) => {
                subset_vpu(vpu, hf, &paths)?;
            }
            (_, Some(graph)) => {
                info!("Subsetting hydrofabric");
                let include_outlet = !request.is_gage();
                subset(&features, hf, graph, &paths, include_outlet)?;
            }
            (_, None) => bail!("Subsetting requires the network graph"),
        }
        info!("Subsetting complete.");
    }

    if steps.forcings {
        let (start, end) = period(args.start_date, args.end_date)?;
        let dir = args
            .forcing_dir
            .as_deref()
            .context("--forcing-dir is required to generate forcings")?;
        info!("Generating forcings from {} to {}...", start, end);
        let source = GeoTiffSource::open(dir, args.forcing_epsg.map(CRS::from_epsg))
            .with_context(|| format!("Failed to open forcings in {}", dir.display()))?;
        create_forcings(&source, args.source, &paths, start, end)?;
        info!("Forcings generation complete.");
    }

    if steps.realization {
        let (start, end) = period(args.start_date, args.end_date)?;
        info!("Creating realization from {} to {}...", start, end);
        create_realization(&paths, start, end)?;
        info!("Realization creation complete.");
    }

    if steps.cal || (steps.realization && request.is_gage()) {
        match &request.target {
            Target::Gages(gages) if gages.len() == 1 => {
                info!("Creating calibration config for {}", gages[0]);
                create_calibration_config(&paths, &gages[0])?;
            }
            _ => bail!("Calibration requires a single gage input, e.g. -i gage-01646500"),
        }
    }

    if steps.run {
        info!("Running Next Gen using NGIAB...");
        let partitions = read_num_partitions(&paths)
            .context("Failed to read the partition count, has realization been run?")?;
        if run_container(&docker_pull()) && run_container(&docker_run_ngen(paths.subset_dir(), partitions)) {
            info!("Next Gen run complete.");
        } else {
            error!("Next Gen run failed.");
        }
    }

    if steps.vis && !run_container(&docker_run_vis(paths.subset_dir())) {
        error!("Failed to launch docker container.");
    }

    info!("All operations completed successfully in {:.2?}.", timer.elapsed());
    info!("Output folder: file:///{}", paths.subset_dir().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("ngprep").chain(argv.iter().copied())).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        chrono::NaiveDate::from_ymd_opt(y, m, d).and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    #[test]
    fn test_all_and_run_expand() {
        let steps = Steps::from_args(&args(&["-i", "cat-1", "-a"]));
        assert!(steps.subset && steps.forcings && steps.realization && steps.run);
        assert!(steps.validate);
        assert!(!steps.vis && !steps.cal);

        let steps = Steps::from_args(&args(&["-i", "cat-1", "--run"]));
        assert!(steps.validate && !steps.subset);
    }

    #[test]
    fn test_vpu_output_defaults() {
        let request = validate_input(&args(&["--vpu", "09"])).unwrap();
        assert_eq!(request.target, Target::Vpu("09".into()));
        assert_eq!(request.output_folder(&[]).as_deref(), Some("vpu-09"));

        let request = validate_input(&args(&["--vpu", "09", "-o", "north"])).unwrap();
        assert_eq!(request.output_folder(&[]).as_deref(), Some("north"));
    }

    #[test]
    fn test_catchment_inputs_normalised() {
        let request = validate_input(&args(&["-i", "wb_12", "5173"])).unwrap();
        assert_eq!(request.target, Target::Catchments(vec!["cat-12".into(), "cat-5173".into()]));
        assert_eq!(request.output_folder(&["cat-12".into()]).as_deref(), Some("cat-12"));
    }

    #[test]
    fn test_gage_output_folder_is_input() {
        let request = validate_input(&args(&["-i", "gage-01646500"])).unwrap();
        assert!(request.is_gage());
        assert_eq!(
            request.output_folder(&["cat-1".into()]).as_deref(),
            Some("gage-01646500")
        );
    }

    #[test]
    fn test_latlon() {
        let request = validate_input(&args(&["-i", "54.33,-69.4", "-l"])).unwrap();
        assert_eq!(request.target, Target::Points(vec![(54.33, -69.4)]));
        assert_eq!(request.output_folder(&["cat-9".into()]).as_deref(), Some("cat-9"));

        assert!(validate_input(&args(&["-i", "54.33", "-l"])).is_err());
        assert!(validate_input(&args(&["-i", "54.33,-69.4", "-l", "-g"])).is_err());
        assert!(validate_input(&args(&["-i", "gage-01646500", "-l"])).is_err());
    }

    #[test]
    fn test_missing_subset_enables_everything() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FilePaths::for_folder("cat-1", dir.path()).unwrap();
        let mut steps = Steps {
            validate: true,
            ..Steps::default()
        };
        set_dependent_flags(&mut steps, &paths, date(2010, 1, 1), date(2010, 1, 2)).unwrap();
        assert!(steps.subset && steps.forcings && steps.realization);
    }

    #[test]
    fn test_validate_fills_missing_steps() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FilePaths::for_folder("cat-1", dir.path()).unwrap();
        std::fs::create_dir_all(paths.forcings_dir()).unwrap();
        std::fs::create_dir_all(paths.config_dir()).unwrap();

        let mut steps = Steps {
            validate: true,
            ..Steps::default()
        };
        set_dependent_flags(&mut steps, &paths, date(2010, 1, 1), date(2010, 1, 2)).unwrap();
        assert!(!steps.subset && !steps.forcings);
        assert!(steps.realization);
    }

    #[test]
    fn test_forcings_need_subset_and_dates() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FilePaths::for_folder("cat-1", dir.path()).unwrap();

        let mut steps = Steps {
            forcings: true,
            ..Steps::default()
        };
        set_dependent_flags(&mut steps, &paths, date(2010, 1, 1), date(2010, 1, 2)).unwrap();
        assert!(steps.subset);

        let mut steps = Steps {
            realization: true,
            ..Steps::default()
        };
        assert!(set_dependent_flags(&mut steps, &paths, date(2010, 1, 1), None).is_err());

        let mut steps = Steps {
            subset: true,
            ..Steps::default()
        };
        assert!(set_dependent_flags(&mut steps, &paths, None, None).is_ok());
    }

    #[test]
    fn test_period() {
        let (start, end) = period(date(2010, 1, 1), date(2010, 1, 2)).unwrap();
        assert_eq!(start.to_string(), "2010-01-01 00:00:00");
        assert_eq!(end.to_string(), "2010-01-02 00:00:00");
        assert!(period(date(2010, 1, 2), date(2010, 1, 1)).is_err());
        assert!(period(date(2010, 1, 2), None).is_err());
    }
}
