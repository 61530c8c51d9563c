//! Scrape flows, background schedulers, and the analysis pipeline.

pub mod config;
pub mod pipeline;
pub mod scheduler;
pub mod scrape;
pub mod setup;
pub mod supervisor;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub const CRATE_NAME: &str = "medmon-sync";

pub use config::AppConfig;
pub use pipeline::{summarize, AnalysisPipeline, PipelineError, PipelineReport, ProjectOutcome};
pub use scheduler::{
    analysis_queue, run_analysis_scheduler_loop, run_scrape_loop, start_workers,
    AnalysisScheduler, AnalysisWorker, ScrapeScheduler, ScrapeTick,
};
pub use scrape::{RunAllReport, ScrapeError, Scraper, SourceRun};
pub use setup::{setup_project, ProjectSetupReport, ProjectSetupRequest, SetupError};
pub use supervisor::{Heartbeat, Supervisor, WorkerHealth, WorkerRegistry};
