// ABOUTME: Binds flow entry points to cron schedules and one-shot jobs
// ABOUTME: Enforces worker and per-job instance limits and broadcasts job lifecycle events

use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::cron::{normalize_cron_expression, parse_cron};
use super::error::{Result, SchedulerError};
use crate::flow::Flow;

const EVENT_CAPACITY: usize = 256;

/// Callable fired by a job. Errors are reported as `JobEventKind::Failed`.
pub type JobEntry = Arc<dyn Fn() -> BoxFuture<'static, std::result::Result<(), String>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on job firings executing at the same time
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Upper bound on concurrent firings of a single job
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,
}

fn default_max_workers() -> usize {
    20
}

fn default_max_instances() -> usize {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_instances: default_max_instances(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub id: String,
    pub name: String,
    /// Normalized cron expression; `None` for a run-now job
    pub schedule: Option<String>,
}

impl JobHandle {
    pub fn is_recurring(&self) -> bool {
        self.schedule.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum JobEventKind {
    Submitted,
    Started,
    Finished,
    Failed(String),
    /// A firing was dropped because the job hit its instance limit
    Missed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobEvent {
    pub job_id: String,
    pub job_name: String,
    pub kind: JobEventKind,
    pub at: DateTime<Utc>,
}

struct RegisteredJob {
    handle: JobHandle,
    driver: JoinHandle<()>,
}

/// Everything a job's driver needs to fire the entry.
#[derive(Clone)]
struct Dispatcher {
    handle: JobHandle,
    entry: JobEntry,
    instances: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    events: broadcast::Sender<JobEvent>,
}

impl Dispatcher {
    fn emit(&self, kind: JobEventKind) {
        match &kind {
            JobEventKind::Submitted => debug!("Job {} submitted", self.handle.name),
            JobEventKind::Started => info!("Job {} started", self.handle.name),
            JobEventKind::Finished => info!("Job {} finished", self.handle.name),
            JobEventKind::Failed(message) => error!("Job {} failed: {}", self.handle.name, message),
            JobEventKind::Missed => warn!(
                "Job {} missed a run: maximum number of running instances reached",
                self.handle.name
            ),
        }

        // No subscribers is fine.
        let _ = self.events.send(JobEvent {
            job_id: self.handle.id.clone(),
            job_name: self.handle.name.clone(),
            kind,
            at: Utc::now(),
        });
    }

    /// Submit one firing of the entry, or record a miss when the job is
    /// already at its instance limit.
    fn fire(&self) -> Option<JoinHandle<()>> {
        let instance = match Arc::clone(&self.instances).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.emit(JobEventKind::Missed);
                return None;
            }
        };
        self.emit(JobEventKind::Submitted);

        let dispatcher = self.clone();
        Some(tokio::spawn(async move {
            let _instance = instance;
            let Ok(_worker) = Arc::clone(&dispatcher.workers).acquire_owned().await else {
                debug!("Worker pool closed before job {} started", dispatcher.handle.name);
                return;
            };

            dispatcher.emit(JobEventKind::Started);
            let outcome = AssertUnwindSafe((dispatcher.entry)()).catch_unwind().await;
            let kind = match outcome {
                Ok(Ok(())) => JobEventKind::Finished,
                Ok(Err(message)) => JobEventKind::Failed(message),
                Err(_) => JobEventKind::Failed("job panicked".to_string()),
            };
            dispatcher.emit(kind);
        }))
    }

    /// Fire at every occurrence of `schedule` until aborted.
    ///
    /// Occurrences are computed on the wall clock once and then slept for on
    /// the runtime clock from a fixed anchor, so a long run never shifts the
    /// following firings.
    async fn drive(self, schedule: Schedule) {
        let anchor_instant = Instant::now();
        let anchor_wall = Utc::now();
        let mut cursor = anchor_wall;

        loop {
            let Some(next) = schedule.after(&cursor).next() else {
                info!("Schedule of job {} has no further occurrences", self.handle.name);
                break;
            };
            let offset = (next - anchor_wall).to_std().unwrap_or(Duration::ZERO);
            sleep_until(anchor_instant + offset).await;

            cursor = next;
            self.fire();
        }
    }
}

/// Registers flow entry points as scheduled jobs.
///
/// Owned by whatever process wires up flows; call [`SchedulerBinding::shutdown`]
/// before exit to stop every job and wait for in-flight firings.
pub struct SchedulerBinding {
    config: SchedulerConfig,
    workers: Arc<Semaphore>,
    events: broadcast::Sender<JobEvent>,
    jobs: Mutex<IndexMap<String, RegisteredJob>>,
    shut_down: AtomicBool,
}

impl SchedulerBinding {
    pub fn new(config: SchedulerConfig) -> Self {
        let config = SchedulerConfig {
            max_workers: config.max_workers.max(1),
            max_instances: config.max_instances.max(1),
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        info!(
            "Scheduler started with {} workers, {} instances per job",
            config.max_workers, config.max_instances
        );

        Self {
            config,
            workers: Arc::new(Semaphore::new(config.max_workers)),
            events,
            jobs: Mutex::new(IndexMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Register `entry` to fire on `cron_expression`.
    ///
    /// A missing or blank expression registers a job that fires once,
    /// immediately. Malformed cron syntax fails with `InvalidCron` and
    /// registers nothing.
    pub async fn register_cron<F, Fut, E>(
        &self,
        name: impl Into<String>,
        cron_expression: Option<&str>,
        entry: F,
    ) -> Result<JobHandle>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let entry: JobEntry = Arc::new(move || {
            let fired = entry();
            async move { fired.await.map_err(|e| e.to_string()) }.boxed()
        });
        self.register_entry(name.into(), cron_expression, entry).await
    }

    /// Register a loaded flow according to its `scheduling` block.
    ///
    /// Returns `None` when scheduling is disabled. A flow without a crontab
    /// is run once, immediately. The flow is validated up front so a cyclic
    /// graph is reported at registration instead of at the first firing.
    pub async fn register_flow(&self, flow: Arc<Flow>) -> Result<Option<JobHandle>> {
        let scheduling = flow.scheduling()?.unwrap_or_default();
        if !scheduling.enabled {
            info!("Scheduling disabled for flow {}", flow.name());
            return Ok(None);
        }
        flow.validate()?;

        let name = flow.name().to_string();
        let handle = self
            .register_cron(name, scheduling.crontab.as_deref(), move || {
                let flow = Arc::clone(&flow);
                async move {
                    let report = flow.run(None).await.map_err(|e| e.to_string())?;
                    if report.has_errors() {
                        return Err(format!("run {} ended with errors: {}", report.run_id, report.summary()));
                    }
                    Ok::<(), String>(())
                }
            })
            .await?;

        Ok(Some(handle))
    }

    async fn register_entry(
        &self,
        name: String,
        cron_expression: Option<&str>,
        entry: JobEntry,
    ) -> Result<JobHandle> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(SchedulerError::ShutDown);
        }

        let expression = cron_expression.map(str::trim).filter(|e| !e.is_empty());
        let schedule = expression.map(parse_cron).transpose()?;

        let handle = JobHandle {
            id: Uuid::new_v4().to_string(),
            name,
            schedule: expression.map(normalize_cron_expression),
        };
        let dispatcher = Dispatcher {
            handle: handle.clone(),
            entry,
            instances: Arc::new(Semaphore::new(self.config.max_instances)),
            workers: Arc::clone(&self.workers),
            events: self.events.clone(),
        };

        let driver = match schedule {
            Some(schedule) => {
                info!(
                    "Registered job {} on schedule '{}'",
                    handle.name,
                    handle.schedule.as_deref().unwrap_or_default()
                );
                tokio::spawn(dispatcher.drive(schedule))
            }
            None => {
                info!("Registered run-now job {}", handle.name);
                tokio::spawn(async move {
                    if let Some(firing) = dispatcher.fire() {
                        let _ = firing.await;
                    }
                })
            }
        };

        self.jobs.lock().await.insert(
            handle.id.clone(),
            RegisteredJob {
                handle: handle.clone(),
                driver,
            },
        );

        Ok(handle)
    }

    /// Stop a job from firing again. Firings already submitted run to completion.
    pub async fn remove(&self, job_id: &str) -> Result<JobHandle> {
        let job = self
            .jobs
            .lock()
            .await
            .shift_remove(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound {
                job_id: job_id.to_string(),
            })?;

        job.driver.abort();
        info!("Removed job {}", job.handle.name);
        Ok(job.handle)
    }

    pub async fn jobs(&self) -> Vec<JobHandle> {
        self.jobs
            .lock()
            .await
            .values()
            .map(|job| job.handle.clone())
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Stop every job, then wait up to `timeout_duration` for in-flight
    /// firings to finish. Later registrations fail with `ShutDown`.
    pub async fn shutdown(&self, timeout_duration: Duration) -> Result<()> {
        info!("Shutting down scheduler...");
        self.shut_down.store(true, Ordering::SeqCst);

        for (_, job) in self.jobs.lock().await.drain(..) {
            job.driver.abort();
        }

        let drained = timeout(
            timeout_duration,
            self.workers.acquire_many(self.config.max_workers as u32),
        )
        .await;
        self.workers.close();

        match drained {
            Ok(_) => {
                info!("Scheduler shutdown completed successfully");
                Ok(())
            }
            Err(_) => {
                warn!("Scheduler shutdown timed out after {:?}", timeout_duration);
                Err(SchedulerError::ShutdownTimeout(timeout_duration))
            }
        }
    }
}

impl Drop for SchedulerBinding {
    fn drop(&mut self) {
        if let Ok(mut jobs) = self.jobs.try_lock() {
            for (_, job) in jobs.drain(..) {
                job.driver.abort();
            }
        }
    }
}
