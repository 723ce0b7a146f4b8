//! Shared one-shot clustering learner.
//!
//! Analyzers feed training samples in from every core; once the quota is
//! crossed exactly one of them wins the trigger election and runs the fit.
//! The state machine is strictly monotonic: `start_learn` flips once,
//! `finish_learn` flips once after it, and the centers are immutable from
//! then on.

mod kmeans;

pub use kmeans::{Clusterer, LloydKmeans};

use std::fs::{self, File};
use std::io::BufWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use tracing::info;

use crate::config::LearnerSection;
use crate::error::{Result, WhisperError};

pub struct Learner {
    config: LearnerSection,
    /// Expected center width: `n_fft/2 + 1` bins.
    bins: usize,
    /// Training samples accumulated before the fit. Guarded by its own lock
    /// so appends never contend with the trigger election.
    train_set: Mutex<Vec<Vec<f64>>>,
    /// Serializes the "who starts training" decision.
    trigger: Mutex<()>,
    start_learn: AtomicBool,
    finish_learn: AtomicBool,
    /// Published once, after the fit; readers copy without locking.
    centers: ArcSwapOption<Vec<Vec<f64>>>,
}

impl Learner {
    /// Builds the learner; when center pre-loading is configured the file is
    /// read and validated here and the state machine starts in `done`.
    pub fn new(config: LearnerSection, bins: usize) -> Result<Self> {
        let learner = Self {
            config,
            bins,
            train_set: Mutex::new(Vec::new()),
            trigger: Mutex::new(()),
            start_learn: AtomicBool::new(false),
            finish_learn: AtomicBool::new(false),
            centers: ArcSwapOption::empty(),
        };
        if learner.config.load_result {
            learner.load_centers()?;
            learner.start_learn.store(true, Ordering::Release);
            learner.finish_learn.store(true, Ordering::Release);
        }
        Ok(learner)
    }

    pub fn k(&self) -> usize {
        self.config.val_k
    }

    /// Appends a batch of samples to the training set.
    pub fn add_train_data(&self, batch: Vec<Vec<f64>>) {
        let mut set = self.train_set.lock().unwrap_or_else(PoisonError::into_inner);
        set.extend(batch);
    }

    pub fn train_count(&self) -> usize {
        self.train_set.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the fit may start: centers were pre-loaded, or the sample
    /// quota is crossed.
    pub fn reach_learn(&self) -> bool {
        self.config.load_result || self.train_count() > self.config.num_train_data
    }

    pub fn training_started(&self) -> bool {
        self.start_learn.load(Ordering::Acquire)
    }

    pub fn training_finished(&self) -> bool {
        self.finish_learn.load(Ordering::Acquire)
    }

    /// Trigger election plus the fit itself. Exactly one caller across all
    /// analyzers observes `reach_learn() && !start_learn` under the trigger
    /// lock and runs the clusterer; everyone else returns `false`.
    pub fn maybe_start_train(&self, clusterer: &dyn Clusterer) -> Result<bool> {
        let _election = self.trigger.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.reach_learn() || self.start_learn.load(Ordering::Acquire) {
            return Ok(false);
        }
        self.start_learn.store(true, Ordering::Release);

        let samples = {
            let set = self.train_set.lock().unwrap_or_else(PoisonError::into_inner);
            set.clone()
        };
        if self.config.verbose {
            info!(records = samples.len(), k = self.config.val_k, "learner: start training");
        }

        let centers = clusterer.fit(&samples, self.config.val_k)?;
        self.centers.store(Some(Arc::new(centers)));
        self.finish_learn.store(true, Ordering::Release);

        if self.config.save_result {
            self.save_centers()?;
        }
        if self.config.verbose {
            info!("learner: finish training");
        }
        Ok(true)
    }

    /// The learned centers, available once `training_finished()`.
    pub fn centers_snapshot(&self) -> Option<Arc<Vec<Vec<f64>>>> {
        self.centers.load_full()
    }

    fn save_centers(&self) -> Result<()> {
        let path = &self.config.save_result_file;
        let centers = self.centers.load_full().ok_or_else(|| {
            WhisperError::Learner("no centers available to save".into())
        })?;
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), centers.as_ref())
            .map_err(|e| WhisperError::Io(e.into()))?;
        if self.config.verbose {
            info!(path = %path, "centers saved");
        }
        Ok(())
    }

    fn load_centers(&self) -> Result<()> {
        let path = &self.config.load_result_file;
        let txt = fs::read_to_string(path)
            .map_err(|e| WhisperError::Centers(format!("cannot read {path}: {e}")))?;
        let centers: Vec<Vec<f64>> = serde_json::from_str(&txt)
            .map_err(|e| WhisperError::Centers(format!("cannot parse {path}: {e}")))?;

        if centers.len() != self.config.val_k {
            return Err(WhisperError::Centers(format!(
                "{path} holds {} centers, val_K is {}",
                centers.len(),
                self.config.val_k
            )));
        }
        if centers.iter().any(|c| c.len() != self.bins) {
            return Err(WhisperError::Centers(format!(
                "{path} center width does not match the {} spectrogram bins",
                self.bins
            )));
        }

        self.centers.store(Some(Arc::new(centers)));
        if self.config.verbose {
            info!(path = %path, k = self.config.val_k, "centers loaded");
        }
        Ok(())
    }
}
