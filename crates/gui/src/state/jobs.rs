//! Which pipeline job is running and which package it applies to.

use ngprep_core::FilePaths;

use super::Job;

/// One pipeline job at a time, plus the package the last subset produced
/// for the current selection.
#[derive(Debug, Default)]
pub struct JobState {
    running: Option<Job>,
    /// Selection a running subset was started for
    subset_for: Option<Vec<String>>,
    package: Option<FilePaths>,
}

impl JobState {
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Package matching the current selection, if one was built
    pub fn package(&self) -> Option<&FilePaths> {
        self.package.as_ref()
    }

    /// Mark `job` as started; false if another job is still running.
    pub fn start(&mut self, job: Job, selected: &[String]) -> bool {
        if self.running.is_some() {
            return false;
        }
        self.running = Some(job);
        if job == Job::Subset {
            self.subset_for = Some(selected.to_vec());
        }
        true
    }

    /// A job finished. A subset only becomes the package if the selection
    /// has not changed since it started.
    pub fn complete(&mut self, job: Job, paths: FilePaths, selected: &[String]) {
        if self.running == Some(job) {
            self.running = None;
        }
        if job == Job::Subset && self.subset_for.take().as_deref() == Some(selected) {
            self.package = Some(paths);
        }
    }

    /// A background task failed. Lookups and traces (`None`) leave the
    /// running job alone.
    pub fn failed(&mut self, job: Option<Job>) {
        if job.is_some() && job == self.running {
            self.running = None;
            if job == Some(Job::Subset) {
                self.subset_for = None;
            }
        }
    }

    /// The selection changed, so the package no longer describes it.
    pub fn selection_changed(&mut self) {
        self.package = None;
    }
}
