//! Background loops: round-robin scraping and one-at-a-time analysis.

use std::sync::Arc;
use std::time::Duration;

use medmon_core::{ScrapeLogEntry, ScrapeMethod, ScrapeStatus};
use medmon_storage::{MediaStore, StoreError};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::pipeline::AnalysisPipeline;
use crate::scrape::{ScrapeError, Scraper, SourceRun};
use crate::supervisor::{sleep_or_shutdown, Heartbeat, Supervisor};

/// Source id of audit rows written for failures outside any one source.
pub const SCHEDULER_SOURCE_ID: &str = "scheduler";

/// Worker names reported by the supervisor. The scrape worker's name doubles as
/// the source name on its audit rows.
pub const SCRAPE_WORKER: &str = "scrape_scheduler";
pub const ANALYSIS_SCHEDULER_WORKER: &str = "analysis_scheduler";
pub const ANALYSIS_WORKER: &str = "analysis_worker";

#[derive(Debug, Clone)]
pub struct ScrapeTick {
    pub source_id: Uuid,
    pub source_name: String,
    pub position: usize,
    pub total: usize,
    pub runs: Vec<SourceRun>,
}

/// Scrapes one source per tick, cycling through sources ordered by name.
pub struct ScrapeScheduler {
    scraper: Scraper,
    next_index: usize,
}

impl ScrapeScheduler {
    pub fn new(scraper: Scraper) -> Self {
        Self {
            scraper,
            next_index: 0,
        }
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Reloads the source list and scrapes the source at the current position.
    ///
    /// The index advances before scraping so a failing source cannot pin the rotation.
    pub async fn tick(&mut self) -> Result<Option<ScrapeTick>, ScrapeError> {
        let sources = self.scraper.store().scrapable_sources().await?;
        if sources.is_empty() {
            info!("no media sources to scrape");
            return Ok(None);
        }
        if self.next_index >= sources.len() {
            self.next_index = 0;
        }
        let position = self.next_index;
        self.next_index = (position + 1) % sources.len();

        let source = &sources[position];
        info!(
            position = position + 1,
            total = sources.len(),
            source = %source.name,
            "scraping source"
        );
        let runs = self.scraper.scrape_source(source).await?;
        Ok(Some(ScrapeTick {
            source_id: source.id,
            source_name: source.name.clone(),
            position,
            total: sources.len(),
            runs,
        }))
    }

    /// One tick with failures written to the scrape log instead of returned.
    pub async fn run_tick(&mut self) -> Option<ScrapeTick> {
        match self.tick().await {
            Ok(tick) => tick,
            Err(err) => {
                error!(error = %err, "scrape tick failed");
                let entry = ScrapeLogEntry::new(
                    SCHEDULER_SOURCE_ID,
                    SCRAPE_WORKER,
                    None,
                    ScrapeMethod::System,
                    0,
                    0,
                    ScrapeStatus::Error,
                    err.to_string(),
                );
                if let Err(log_err) = self.scraper.store().append_scrape_log(&entry).await {
                    warn!(error = %log_err, "could not write scheduler scrape log");
                }
                None
            }
        }
    }
}

/// Scrape loop body for a supervised worker. State lives behind the mutex so it survives restarts.
pub async fn run_scrape_loop(
    scheduler: Arc<Mutex<ScrapeScheduler>>,
    interval: Duration,
    heartbeat: Heartbeat,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        scheduler.lock().await.run_tick().await;
        heartbeat.beat();
        if !sleep_or_shutdown(interval, &mut shutdown).await {
            break;
        }
    }
}

/// Picks the oldest raw item and hands it to the analysis worker.
pub struct AnalysisScheduler {
    store: Arc<dyn MediaStore>,
    queue: mpsc::Sender<Uuid>,
}

impl AnalysisScheduler {
    pub fn new(store: Arc<dyn MediaStore>, queue: mpsc::Sender<Uuid>) -> Self {
        Self { store, queue }
    }

    /// Waits for a free queue slot, then claims the next raw item and enqueues it.
    ///
    /// The claim moves the item to `processing` before it is sent, so an item the
    /// worker has already taken is never selected again.
    /// Returns `Ok(None)` when nothing is waiting or the worker has gone away.
    pub async fn tick(&self) -> Result<Option<Uuid>, StoreError> {
        let Ok(permit) = self.queue.reserve().await else {
            warn!("analysis queue closed");
            return Ok(None);
        };
        let Some(media_id) = self.store.claim_next_raw_item().await? else {
            return Ok(None);
        };
        info!(%media_id, "queueing media item for analysis");
        permit.send(media_id);
        Ok(Some(media_id))
    }
}

pub async fn run_analysis_scheduler_loop(
    scheduler: Arc<AnalysisScheduler>,
    warmup: Duration,
    interval: Duration,
    heartbeat: Heartbeat,
    mut shutdown: watch::Receiver<bool>,
) {
    if !sleep_or_shutdown(warmup, &mut shutdown).await {
        return;
    }
    loop {
        if let Err(err) = scheduler.tick().await {
            error!(error = %err, "analysis scheduler tick failed");
        }
        heartbeat.beat();
        if !sleep_or_shutdown(interval, &mut shutdown).await {
            break;
        }
    }
}

/// Consumes queued item ids and runs the pipeline on each.
pub struct AnalysisWorker {
    pipeline: AnalysisPipeline,
    queue: Mutex<mpsc::Receiver<Uuid>>,
}

impl AnalysisWorker {
    pub fn new(pipeline: AnalysisPipeline, queue: mpsc::Receiver<Uuid>) -> Self {
        Self {
            pipeline,
            queue: Mutex::new(queue),
        }
    }

    pub async fn run(self: Arc<Self>, heartbeat: Heartbeat, mut shutdown: watch::Receiver<bool>) {
        let mut queue = self.queue.lock().await;
        loop {
            let next = tokio::select! {
                next = queue.recv() => next,
                _ = shutdown.changed() => None,
            };
            let Some(media_id) = next else { break };
            // errors are logged by the pipeline and reflected in the item status
            let _ = self.pipeline.process(media_id).await;
            heartbeat.beat();
        }
    }
}

/// Bounded queue between the analysis scheduler and worker; one item in flight at a time.
pub fn analysis_queue() -> (mpsc::Sender<Uuid>, mpsc::Receiver<Uuid>) {
    mpsc::channel(1)
}

/// Starts the scrape loop, the analysis scheduler, and the analysis worker under `supervisor`.
pub fn start_workers(
    supervisor: &mut Supervisor,
    scraper: Scraper,
    pipeline: AnalysisPipeline,
    config: &AppConfig,
) {
    let scrape = Arc::new(Mutex::new(ScrapeScheduler::new(scraper.clone())));
    let scrape_interval = config.scrape_interval;
    supervisor.spawn(SCRAPE_WORKER, move |heartbeat, shutdown| {
        run_scrape_loop(scrape.clone(), scrape_interval, heartbeat, shutdown)
    });

    let (tx, rx) = analysis_queue();
    let analysis = Arc::new(AnalysisScheduler::new(scraper.store().clone(), tx));
    let (warmup, interval) = (config.analysis_warmup, config.analysis_interval);
    supervisor.spawn(ANALYSIS_SCHEDULER_WORKER, move |heartbeat, shutdown| {
        run_analysis_scheduler_loop(analysis.clone(), warmup, interval, heartbeat, shutdown)
    });

    let worker = Arc::new(AnalysisWorker::new(pipeline, rx));
    supervisor.spawn(ANALYSIS_WORKER, move |heartbeat, shutdown| {
        worker.clone().run(heartbeat, shutdown)
    });
}
