//! Messages from background jobs to the UI loop.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ngprep_core::FilePaths;
use ngprep_processing::network::NetworkGraph;

/// Catchment outline rings in WGS-84 `(lon, lat)`
pub type Outline = Vec<Vec<(f64, f64)>>;

/// Messages sent from background threads to the main UI loop.
pub enum AppMessage {
    /// The hydrofabric network graph is ready.
    NetworkLoaded(Arc<NetworkGraph>),
    /// A map click resolved to a catchment.
    CatchmentFound { cat_id: String },
    /// Upstream catchments of the selection and the outlines to draw.
    UpstreamTraced {
        selected: Vec<String>,
        upstream: BTreeSet<String>,
        outlines: Vec<(String, Outline)>,
    },
    /// A pipeline step finished for the package at `paths`.
    JobComplete {
        job: Job,
        paths: FilePaths,
        elapsed: Duration,
    },
    /// A background task failed; `job` is set for pipeline jobs.
    Error {
        context: String,
        job: Option<Job>,
        message: String,
    },
    /// A log message for the console.
    Log(LogEntry),
}

/// Long-running pipeline steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Subset,
    Forcings,
    Realization,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::Subset => "Subset",
            Job::Forcings => "Forcings",
            Job::Realization => "Realization",
        }
    }
}

/// Log level for console messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// A log entry for the console panel.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: SystemTime,
}

impl LogEntry {
    fn new(level: LogLevel, msg: impl Into<String>) -> Self {
        Self {
            level,
            message: msg.into(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, msg)
    }

    pub fn warning(msg: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, msg)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, msg)
    }

    pub fn success(msg: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, msg)
    }
}
