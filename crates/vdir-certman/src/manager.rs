//! The background worker.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use vdir_ca_client::CertAuthority;
use vdir_core::CertReqId;
use vdir_crypto::SecretBox;
use vdir_email::Notifier;
use vdir_store::RecordStore;

use crate::archive::ArchiveStore;
use crate::config::CertManConfig;
use crate::error::CertManError;
use crate::pipeline::{log_step_error, Pipeline, ScanReport};

/// Drives certificate requests through the pipeline on a fixed interval.
///
/// Cloning is cheap; clones share the pipeline and the download task table.
#[derive(Debug, Clone)]
pub struct CertManager {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    downloads: Arc<Mutex<HashMap<CertReqId, JoinHandle<()>>>>,
}

impl CertManager {
    pub fn new(pipeline: Pipeline, interval: Duration) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            interval,
            downloads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build a manager from configuration, creating the archive directory.
    pub fn from_config(
        config: &CertManConfig,
        store: Arc<RecordStore>,
        authority: Arc<dyn CertAuthority>,
        secrets: Arc<SecretBox>,
        notifier: Notifier,
    ) -> Result<Self, CertManError> {
        let dir: PathBuf = config.storage_dir()?;
        tracing::debug!(path = %dir.display(), "certificate download directory");
        let pipeline = Pipeline::new(
            store,
            authority,
            secrets,
            notifier,
            ArchiveStore::new(dir),
            config.directory_id.clone(),
        );
        Ok(Self::new(pipeline, config.interval))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ids of requests with a download task still running.
    pub fn active_downloads(&self) -> HashSet<CertReqId> {
        let mut downloads = self.downloads.lock();
        downloads.retain(|_, task| !task.is_finished());
        downloads.keys().copied().collect()
    }

    /// Run one scan and spawn download tasks for requests that need one.
    ///
    /// Returns once the scan is done; download tasks keep running.
    pub async fn tick(&self) -> ScanReport {
        let in_flight = self.active_downloads();
        let pipeline = Arc::clone(&self.pipeline);
        let report = match tokio::task::spawn_blocking(move || pipeline.scan(&in_flight)).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "cert manager scan task failed");
                return ScanReport::default();
            }
        };

        for id in &report.to_download {
            self.spawn_download(*id);
        }
        report
    }

    fn spawn_download(&self, id: CertReqId) {
        let mut downloads = self.downloads.lock();
        if downloads.get(&id).is_some_and(|task| !task.is_finished()) {
            return;
        }

        let pipeline = Arc::clone(&self.pipeline);
        let task = tokio::task::spawn_blocking(move || {
            let span = tracing::info_span!("download", request_id = %id);
            let _enter = span.enter();
            if let Err(e) = pipeline.resume(id) {
                log_step_error("download", &e);
            }
        });
        downloads.insert(id, task);
    }

    /// Wait for every download task spawned so far.
    pub async fn wait_for_downloads(&self) {
        let tasks: Vec<JoinHandle<()>> = self.downloads.lock().drain().map(|(_, t)| t).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "certificate download task failed");
            }
        }
    }

    /// Start the worker loop on the current runtime.
    ///
    /// The first scan runs one interval after start. Ticks never overlap:
    /// a scan that overruns the interval delays the next one.
    pub fn start(self) -> CertManagerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_secs = period.as_secs(), "cert manager started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("cert manager received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = self.tick().await;
                        if report.scanned > 0 {
                            tracing::info!(
                                scanned = report.scanned,
                                submitted = report.submitted,
                                polled = report.polled,
                                downloads = report.to_download.len(),
                                failed = report.failed,
                                "cert manager tick"
                            );
                        }
                    }
                }
            }

            tracing::info!("cert manager stopped");
        });

        CertManagerHandle {
            shutdown_tx,
            task,
        }
    }
}

/// Stops a running [`CertManager`].
#[derive(Debug)]
pub struct CertManagerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl CertManagerHandle {
    /// Ask the loop to exit after its current tick and wait for it.
    ///
    /// Download tasks already running are not cancelled.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "cert manager loop panicked");
        }
    }
}
