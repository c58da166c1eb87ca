//! Maintenance scheduler: a single cooperative loop that wakes hourly
//! and, inside the configured maintenance window, runs each registered
//! task once per calendar day.

mod audit;
mod gc;
mod retention;

pub use audit::AuditTrimTask;
pub use gc::IncompleteGcTask;
pub use retention::RetentionTask;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Timelike};
use tracing::{error, info};

use crate::error::Result;

pub const CONFIG_VERSION_RETENTION: &str = "version_retention_limit";
pub const CONFIG_AUDIT_RETENTION_DAYS: &str = "audit_log_retention_days";
pub const DEFAULT_VERSION_RETENTION: &str = "10";
pub const DEFAULT_AUDIT_RETENTION_DAYS: &str = "90";

#[async_trait]
pub trait MaintenanceTask: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self) -> Result<()>;
}

pub struct Scheduler {
    tasks: Vec<Arc<dyn MaintenanceTask>>,
    window_hour: u32,
    window_minutes: u32,
    last_run_day: Option<NaiveDate>,
}

impl Scheduler {
    pub fn new(window_hour: u32, window_minutes: u32) -> Self {
        Self {
            tasks: Vec::new(),
            window_hour,
            window_minutes,
            last_run_day: None,
        }
    }

    pub fn add_task(&mut self, task: Arc<dyn MaintenanceTask>) {
        self.tasks.push(task);
    }

    /// Runs the scheduler loop until the process exits. Wakes hourly;
    /// tasks run when the local wall clock is inside the maintenance
    /// window and this calendar day has not been processed yet.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(60 * 60));
        // The first tick fires immediately, covering the start-up check.
        loop {
            ticker.tick().await;
            self.tick(Local::now()).await;
        }
    }

    async fn tick(&mut self, now: DateTime<Local>) {
        if !self.window_open(now) {
            return;
        }
        self.last_run_day = Some(now.date_naive());
        info!("Running scheduled maintenance tasks");
        self.run_all().await;
    }

    fn window_open(&self, now: DateTime<Local>) -> bool {
        now.hour() == self.window_hour
            && now.minute() < self.window_minutes
            && self.last_run_day != Some(now.date_naive())
    }

    /// Runs every registered task once, regardless of the window.
    /// Used by the loop once the window opens and by `admin maintenance`.
    pub async fn run_all(&self) {
        for task in &self.tasks {
            info!(task = task.name(), "Running maintenance task");
            match task.run().await {
                Ok(()) => info!(task = task.name(), "Maintenance task completed"),
                Err(e) => error!(task = task.name(), "Maintenance task failed: {e}"),
            }
        }
    }
}
