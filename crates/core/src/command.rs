//! Assembly of `ngprep` and container command lines
//!
//! The map application shows the command that reproduces the current
//! selection, and the CLI prints the container commands it runs. Both are
//! built here so the argument spelling lives in one place.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};
use crate::DATE_FORMAT;

/// Program name of the CLI binary
pub const PROGRAM: &str = "ngprep";

/// Model engine container image
pub const NGEN_IMAGE: &str = "awiciroh/ciroh-ngen-image:latest";

/// Visualisation container image
pub const VIS_IMAGE: &str = "joshcu/ngiab_grafana:v0.2.1";

/// `--start`/`--end` with a time of day, e.g. `2010-01-01T06:00`
pub const TIME_ARG_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Forcing source used when `--source` is not given
pub const DEFAULT_FORCING_SOURCE: &str = "nwm";

/// Parse a `--start`/`--end` value: `YYYY-MM-DD` (midnight) or
/// `YYYY-MM-DDTHH:MM`
pub fn parse_time_arg(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Ok(t) = NaiveDateTime::parse_from_str(s, TIME_ARG_FORMAT) {
        return Ok(t);
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map(|d| d.and_time(NaiveTime::MIN))
        .map_err(|_| Error::InvalidParameter {
            name: "date",
            value: s.to_string(),
            reason: "expected YYYY-MM-DD or YYYY-MM-DDTHH:MM".to_string(),
        })
}

/// Inverse of [`parse_time_arg`]; midnight is written as a plain date
pub fn format_time_arg(t: NaiveDateTime) -> String {
    if t.time() == NaiveTime::MIN {
        t.format(DATE_FORMAT).to_string()
    } else {
        t.format(TIME_ARG_FORMAT).to_string()
    }
}

/// What the command operates on
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    /// One or more catchment ids
    Catchments(Vec<String>),
    /// A USGS gage id
    Gage(String),
    /// A point, resolved to the catchment containing it
    LatLon { lat: f64, lon: f64 },
    /// A whole vector processing unit
    Vpu(String),
}

/// Builder for an `ngprep` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    feature: Feature,
    subset: bool,
    forcings: bool,
    realization: bool,
    run: bool,
    validate: bool,
    vis: bool,
    cal: bool,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    output_name: Option<String>,
    source: Option<String>,
    forcing_dir: Option<PathBuf>,
    forcing_epsg: Option<u32>,
    debug: bool,
}

impl CommandLine {
    pub fn new(feature: Feature) -> Self {
        Self {
            feature,
            subset: false,
            forcings: false,
            realization: false,
            run: false,
            validate: false,
            vis: false,
            cal: false,
            start: None,
            end: None,
            output_name: None,
            source: None,
            forcing_dir: None,
            forcing_epsg: None,
            debug: false,
        }
    }

    /// Command for a set of catchments
    pub fn for_catchments<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Feature::Catchments(ids.into_iter().map(Into::into).collect()))
    }

    pub fn subset(mut self, on: bool) -> Self {
        self.subset = on;
        self
    }

    pub fn forcings(mut self, on: bool) -> Self {
        self.forcings = on;
        self
    }

    pub fn realization(mut self, on: bool) -> Self {
        self.realization = on;
        self
    }

    pub fn run(mut self, on: bool) -> Self {
        self.run = on;
        self
    }

    pub fn validate(mut self, on: bool) -> Self {
        self.validate = on;
        self
    }

    pub fn vis(mut self, on: bool) -> Self {
        self.vis = on;
        self
    }

    pub fn cal(mut self, on: bool) -> Self {
        self.cal = on;
        self
    }

    pub fn debug(mut self, on: bool) -> Self {
        self.debug = on;
        self
    }

    /// Start and end dates of the forcing / simulation period
    pub fn dates(self, start: NaiveDate, end: NaiveDate) -> Self {
        self.period(start.and_time(NaiveTime::MIN), end.and_time(NaiveTime::MIN))
    }

    /// Like [`CommandLine::dates`], keeping the time of day
    pub fn period(mut self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Forcing dataset family; the default is left off the command line
    pub fn source(mut self, source: impl fmt::Display) -> Self {
        let source = source.to_string();
        self.source = (source != DEFAULT_FORCING_SOURCE).then_some(source);
        self
    }

    pub fn forcing_epsg(mut self, epsg: Option<u32>) -> Self {
        self.forcing_epsg = epsg;
        self
    }

    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.output_name = (!name.is_empty()).then_some(name);
        self
    }

    pub fn forcing_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.forcing_dir = Some(dir.into());
        self
    }

    /// Arguments after the program name
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match &self.feature {
            Feature::Catchments(ids) => {
                args.push("-i".to_string());
                args.extend(ids.iter().cloned());
            }
            Feature::Gage(gage) => {
                args.extend(["-i".to_string(), gage.clone(), "-g".to_string()]);
            }
            Feature::LatLon { lat, lon } => {
                args.extend(["-i".to_string(), format!("{},{}", lat, lon), "-l".to_string()]);
            }
            Feature::Vpu(vpu) => {
                args.extend(["--vpu".to_string(), vpu.clone()]);
            }
        }

        for (on, flag) in [
            (self.subset, "-s"),
            (self.forcings, "-f"),
            (self.realization, "-r"),
            (self.run, "--run"),
            (self.validate, "--validate"),
            (self.vis, "--vis"),
            (self.cal, "--cal"),
        ] {
            if on {
                args.push(flag.to_string());
            }
        }

        if let Some(start) = self.start {
            args.push("--start".to_string());
            args.push(format_time_arg(start));
        }
        if let Some(end) = self.end {
            args.push("--end".to_string());
            args.push(format_time_arg(end));
        }
        if let Some(source) = &self.source {
            args.push("--source".to_string());
            args.push(source.clone());
        }
        if let Some(dir) = &self.forcing_dir {
            args.push("--forcing-dir".to_string());
            args.push(dir.display().to_string());
        }
        if let Some(epsg) = self.forcing_epsg {
            args.push("--forcing-epsg".to_string());
            args.push(epsg.to_string());
        }
        if let Some(name) = &self.output_name {
            args.push("-o".to_string());
            args.push(name.clone());
        }
        if self.debug {
            args.push("-D".to_string());
        }
        args
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", PROGRAM)?;
        for arg in self.args() {
            write!(f, " {}", quote(&arg))?;
        }
        Ok(())
    }
}

/// Shell-quote an argument containing whitespace or quotes
pub fn quote(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    if arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// A program and its arguments, for running or printing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for ContainerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn docker(args: &[&str]) -> ContainerCommand {
    ContainerCommand {
        program: "docker".to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
    }
}

/// `docker pull` of the model engine image
pub fn docker_pull() -> ContainerCommand {
    docker(&["pull", NGEN_IMAGE])
}

/// Run the model engine on a package with `partitions` MPI ranks
pub fn docker_run_ngen(subset_dir: &Path, partitions: usize) -> ContainerCommand {
    let volume = format!("{}:/ngen/ngen/data", subset_dir.display());
    let partitions = partitions.to_string();
    docker(&[
        "run",
        "--rm",
        "-it",
        "-v",
        &volume,
        NGEN_IMAGE,
        "/ngen/ngen/data/",
        "auto",
        &partitions,
        "local",
    ])
}

/// Serve the visualisation dashboard for a package on port 3000
pub fn docker_run_vis(subset_dir: &Path) -> ContainerCommand {
    let volume = format!("{}:/ngen/ngen/data/", subset_dir.display());
    docker(&["run", "--rm", "-it", "-p", "3000:3000", "-v", &volume, VIS_IMAGE])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_full_command() {
        let cmd = CommandLine::for_catchments(["cat-1"])
            .subset(true)
            .forcings(true)
            .realization(true)
            .dates(date(2010, 1, 1), date(2010, 1, 2))
            .output_name("name");
        assert_eq!(
            cmd.to_string(),
            "ngprep -i cat-1 -s -f -r --start 2010-01-01 --end 2010-01-02 -o name"
        );
    }

    #[test]
    fn test_time_of_day_and_source() {
        let start = date(2010, 1, 1).and_hms_opt(6, 0, 0).unwrap();
        let end = date(2010, 1, 3).and_hms_opt(0, 0, 0).unwrap();
        let cmd = CommandLine::for_catchments(["cat-1"])
            .forcings(true)
            .period(start, end)
            .source("aorc")
            .forcing_epsg(Some(4326));
        assert_eq!(
            cmd.to_string(),
            "ngprep -i cat-1 -f --start 2010-01-01T06:00 --end 2010-01-03 --source aorc --forcing-epsg 4326"
        );

        let default_source = CommandLine::for_catchments(["cat-1"]).source("nwm").forcing_epsg(None);
        assert_eq!(default_source.to_string(), "ngprep -i cat-1");
    }

    #[test]
    fn test_time_args_parse() {
        assert_eq!(
            parse_time_arg("2010-01-01T06:30").unwrap(),
            date(2010, 1, 1).and_hms_opt(6, 30, 0).unwrap()
        );
        assert_eq!(
            parse_time_arg("2010-01-02").unwrap(),
            date(2010, 1, 2).and_hms_opt(0, 0, 0).unwrap()
        );
        assert!(parse_time_arg("01/02/2010").is_err());
        assert!(parse_time_arg("2010-01-01 06:30").is_err());

        let t = date(2010, 1, 1).and_hms_opt(23, 0, 0).unwrap();
        assert_eq!(parse_time_arg(&format_time_arg(t)).unwrap(), t);
    }

    #[test]
    fn test_multiple_catchments_and_quoting() {
        let cmd = CommandLine::for_catchments(["cat-1", "cat-2"])
            .subset(true)
            .forcing_dir("/data/my forcings");
        assert_eq!(
            cmd.to_string(),
            "ngprep -i cat-1 cat-2 -s --forcing-dir \"/data/my forcings\""
        );
        assert_eq!(cmd.args()[5], "/data/my forcings");
    }

    #[test]
    fn test_gage_latlon_vpu() {
        let gage = CommandLine::new(Feature::Gage("01646500".into())).subset(true);
        assert_eq!(gage.to_string(), "ngprep -i 01646500 -g -s");

        let point = CommandLine::new(Feature::LatLon { lat: 54.33, lon: -69.4 });
        assert_eq!(point.args(), vec!["-i", "54.33,-69.4", "-l"]);

        let vpu = CommandLine::new(Feature::Vpu("09".into())).run(true).vis(true);
        assert_eq!(vpu.to_string(), "ngprep --vpu 09 --run --vis");
    }

    #[test]
    fn test_empty_output_name_is_omitted() {
        let cmd = CommandLine::for_catchments(["cat-9"]).output_name("");
        assert_eq!(cmd.to_string(), "ngprep -i cat-9");
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("a b"), "\"a b\"");
        assert_eq!(quote("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote(""), "\"\"");
    }

    #[test]
    fn test_docker_commands() {
        assert_eq!(
            docker_pull().to_string(),
            "docker pull awiciroh/ciroh-ngen-image:latest"
        );
        let run = docker_run_ngen(Path::new("/out/cat-1"), 4);
        assert_eq!(
            run.to_string(),
            "docker run --rm -it -v /out/cat-1:/ngen/ngen/data awiciroh/ciroh-ngen-image:latest /ngen/ngen/data/ auto 4 local"
        );
        let vis = docker_run_vis(Path::new("/my out"));
        assert_eq!(vis.args[6], "/my out:/ngen/ngen/data/");
        assert!(vis.to_string().contains("\"/my out:/ngen/ngen/data/\""));
    }
}
