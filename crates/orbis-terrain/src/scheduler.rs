//! Tile load scheduler: a bounded worker pool that turns elevation and
//! imagery jobs into finished tile meshes and textures off the caller's thread.
//!
//! Jobs are dispatched round-robin over per-worker bounded channels. Every
//! submission gets a monotonic [`RequestId`] and a [`FetchTicket`] carrying a
//! cancellation flag; a cancelled job is skipped if it has not started and
//! its result is suppressed if it has. Results travel back on the channel of
//! the [`SchedulerClient`] that submitted them, so one pool can serve several
//! planets. The scheduler never retries: failures and worker panics come back
//! as [`FetchError`] results and the caller decides what to do.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use dashmap::DashMap;
use orbis_config::SchedulerConfig;

use crate::error::{FetchError, SchedulerError};
use crate::imagery::{ImageryRequest, ImagerySource, ImageryTexture};
use crate::mesh::{MeshParams, TileMesh, build_tile_mesh};
use crate::source::{ElevationRequest, ElevationSource};

/// Identifier of one submission, unique and increasing per scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The two independent data kinds a tile fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchKind {
    Elevation,
    Imagery,
}

/// Work for a scheduler worker.
pub enum TileJob {
    /// Sample elevations and build the tile mesh with skirts.
    Elevation {
        source: Arc<dyn ElevationSource>,
        request: ElevationRequest,
        mesh: MeshParams,
    },
    /// Produce the tile texture.
    Imagery {
        source: Arc<dyn ImagerySource>,
        request: ImageryRequest,
    },
}

impl TileJob {
    pub fn kind(&self) -> FetchKind {
        match self {
            TileJob::Elevation { .. } => FetchKind::Elevation,
            TileJob::Imagery { .. } => FetchKind::Imagery,
        }
    }
}

/// Owned data produced by a job.
#[derive(Debug)]
pub enum JobOutput {
    Elevation(TileMesh),
    Imagery(ImageryTexture),
}

/// A finished job, delivered to the submitting client.
#[derive(Debug)]
pub struct FetchResult {
    pub request_id: RequestId,
    pub kind: FetchKind,
    pub outcome: Result<JobOutput, FetchError>,
    /// Time spent on the worker (for profiling).
    pub elapsed: Duration,
}

/// Handle to a submitted job.
#[derive(Clone, Debug)]
pub struct FetchTicket {
    id: RequestId,
    kind: FetchKind,
    cancelled: Arc<AtomicBool>,
}

impl FetchTicket {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn kind(&self) -> FetchKind {
        self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Internal wrapper that carries the job, its cancellation flag and the
/// channel of the client that submitted it.
struct Envelope {
    id: RequestId,
    job: TileJob,
    cancelled: Arc<AtomicBool>,
    reply: Sender<FetchResult>,
}

struct Worker {
    sender: Option<Sender<Envelope>>,
    handle: Option<JoinHandle<()>>,
}

/// Bounded pool of tile load workers.
pub struct TileLoadScheduler {
    workers: Vec<Worker>,
    next_worker: AtomicUsize,
    next_request: AtomicU64,
    /// Jobs queued or executing.
    in_flight: Arc<AtomicUsize>,
    max_in_flight: usize,
    /// Cancellation flags of jobs not yet finished.
    active: Arc<DashMap<RequestId, Arc<AtomicBool>>>,
}

impl TileLoadScheduler {
    /// Spawn `worker_count` workers, each with a queue of `queue_capacity`.
    ///
    /// At most `max_in_flight` jobs may be queued or running at once; further
    /// submissions return [`SchedulerError::Saturated`].
    pub fn new(
        worker_count: usize,
        max_in_flight: usize,
        queue_capacity: usize,
    ) -> Result<Self, SchedulerError> {
        let worker_count = worker_count.max(1);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(DashMap::new());

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (sender, receiver) = bounded::<Envelope>(queue_capacity.max(1));
            let in_flight = Arc::clone(&in_flight);
            let active = Arc::clone(&active);
            let handle = std::thread::Builder::new()
                .name(format!("tile-load-{index}"))
                .spawn(move || worker_loop(receiver, in_flight, active))
                .map_err(SchedulerError::Spawn)?;
            workers.push(Worker {
                sender: Some(sender),
                handle: Some(handle),
            });
        }

        tracing::info!(
            "Tile load scheduler started with {} workers (max {} in flight)",
            worker_count,
            max_in_flight
        );

        Ok(Self {
            workers,
            next_worker: AtomicUsize::new(0),
            next_request: AtomicU64::new(0),
            in_flight,
            max_in_flight: max_in_flight.max(1),
            active,
        })
    }

    /// Build a scheduler from config, resolving `worker_count = 0`.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let workers = if config.worker_count == 0 {
            Self::default_worker_count()
        } else {
            config.worker_count
        };
        Self::new(workers, config.max_in_flight, config.queue_capacity)
    }

    /// `min(num_cpus, 4)`, at least 1.
    pub fn default_worker_count() -> usize {
        num_cpus::get().clamp(1, 4)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Number of jobs currently queued or executing.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Returns `true` if the job has been neither finished nor cancelled.
    pub fn is_pending(&self, id: RequestId) -> bool {
        self.active.contains_key(&id)
    }

    /// Cancel a queued or running job. No-op once it has finished.
    pub fn cancel(&self, id: RequestId) {
        if let Some((_, cancelled)) = self.active.remove(&id) {
            cancelled.store(true, Ordering::Release);
        }
    }

    fn dispatch(
        &self,
        job: TileJob,
        reply: &Sender<FetchResult>,
    ) -> Result<FetchTicket, SchedulerError> {
        let previous = self.in_flight.fetch_add(1, Ordering::AcqRel);
        if previous >= self.max_in_flight {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(SchedulerError::Saturated {
                in_flight: previous,
                limit: self.max_in_flight,
            });
        }

        let id = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));
        let kind = job.kind();
        let cancelled = Arc::new(AtomicBool::new(false));
        self.active.insert(id, Arc::clone(&cancelled));

        let mut envelope = Envelope {
            id,
            job,
            cancelled: Arc::clone(&cancelled),
            reply: reply.clone(),
        };

        // Round-robin start, then fall through to the next worker with room.
        let count = self.workers.len();
        let start = self.next_worker.fetch_add(1, Ordering::Relaxed) % count;
        let mut disconnected = 0;
        for offset in 0..count {
            let Some(sender) = &self.workers[(start + offset) % count].sender else {
                disconnected += 1;
                continue;
            };
            match sender.try_send(envelope) {
                Ok(()) => {
                    return Ok(FetchTicket {
                        id,
                        kind,
                        cancelled,
                    });
                }
                Err(TrySendError::Full(back)) => envelope = back,
                Err(TrySendError::Disconnected(back)) => {
                    disconnected += 1;
                    envelope = back;
                }
            }
        }

        self.active.remove(&id);
        let in_flight = self.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        if disconnected == count {
            Err(SchedulerError::ShutDown)
        } else {
            Err(SchedulerError::Saturated {
                in_flight,
                limit: self.max_in_flight,
            })
        }
    }
}

impl Drop for TileLoadScheduler {
    fn drop(&mut self) {
        // Closing the queues ends every worker loop once its queue drains.
        for worker in &mut self.workers {
            worker.sender.take();
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn worker_loop(
    receiver: Receiver<Envelope>,
    in_flight: Arc<AtomicUsize>,
    active: Arc<DashMap<RequestId, Arc<AtomicBool>>>,
) {
    while let Ok(envelope) = receiver.recv() {
        let Envelope {
            id,
            job,
            cancelled,
            reply,
        } = envelope;

        if cancelled.load(Ordering::Acquire) {
            tracing::trace!("Skipping cancelled fetch {}", id);
        } else {
            let kind = job.kind();
            let start = Instant::now();
            let outcome = run_job_guarded(id, job);
            let elapsed = start.elapsed();

            if !cancelled.load(Ordering::Acquire) {
                // The client may be gone already; its results are simply dropped.
                let _ = reply.send(FetchResult {
                    request_id: id,
                    kind,
                    outcome,
                    elapsed,
                });
            }
        }

        active.remove(&id);
        in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Run a job synchronously. This is the CPU-intensive function that runs on
/// worker threads.
pub fn run_job(id: RequestId, job: TileJob) -> Result<JobOutput, FetchError> {
    let source_error = |source| FetchError::Source {
        request_id: id,
        source,
    };
    match job {
        TileJob::Elevation {
            source,
            request,
            mesh,
        } => {
            let samples = source.elevation(&request).map_err(source_error)?;
            let mesh = build_tile_mesh(&request, samples, source.height_range(), &mesh)
                .map_err(source_error)?;
            Ok(JobOutput::Elevation(mesh))
        }
        TileJob::Imagery { source, request } => {
            let texture = source.texture(&request).map_err(source_error)?;
            Ok(JobOutput::Imagery(texture))
        }
    }
}

fn run_job_guarded(id: RequestId, job: TileJob) -> Result<JobOutput, FetchError> {
    match panic::catch_unwind(AssertUnwindSafe(|| run_job(id, job))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("Tile load worker panicked on fetch {}: {}", id, message);
            Err(FetchError::WorkerPanicked {
                request_id: id,
                message,
            })
        }
    }
}

/// One consumer of a (possibly shared) scheduler with its own result channel.
pub struct SchedulerClient {
    scheduler: Arc<TileLoadScheduler>,
    results_tx: Sender<FetchResult>,
    results_rx: Receiver<FetchResult>,
}

impl SchedulerClient {
    pub fn new(scheduler: Arc<TileLoadScheduler>) -> Self {
        let (results_tx, results_rx) = unbounded();
        Self {
            scheduler,
            results_tx,
            results_rx,
        }
    }

    /// Submit a job. Never blocks.
    pub fn submit(&self, job: TileJob) -> Result<FetchTicket, SchedulerError> {
        self.scheduler.dispatch(job, &self.results_tx)
    }

    /// Cancel the job behind `ticket`.
    pub fn cancel(&self, ticket: &FetchTicket) {
        ticket.cancelled.store(true, Ordering::Release);
        self.scheduler.cancel(ticket.id);
    }

    /// Drain all results delivered so far.
    ///
    /// Call this once per frame on the owning thread.
    pub fn drain(&self) -> Vec<FetchResult> {
        self.results_rx.try_iter().collect()
    }

    pub fn scheduler(&self) -> &Arc<TileLoadScheduler> {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::procedural::ProceduralElevation;
    use orbis_geodesy::TileBounds;

    struct SlowSource(Duration);

    impl ElevationSource for SlowSource {
        fn elevation(&self, request: &ElevationRequest) -> Result<Vec<f64>, SourceError> {
            std::thread::sleep(self.0);
            Ok(vec![0.0; request.sample_count()])
        }

        fn height_range(&self) -> (f64, f64) {
            (0.0, 0.0)
        }
    }

    struct FailingSource;

    impl ElevationSource for FailingSource {
        fn elevation(&self, _request: &ElevationRequest) -> Result<Vec<f64>, SourceError> {
            Err(SourceError::Unavailable("offline".to_string()))
        }

        fn height_range(&self) -> (f64, f64) {
            (0.0, 0.0)
        }
    }

    struct PanickingSource;

    impl ElevationSource for PanickingSource {
        fn elevation(&self, _request: &ElevationRequest) -> Result<Vec<f64>, SourceError> {
            panic!("corrupt tile");
        }

        fn height_range(&self) -> (f64, f64) {
            (0.0, 0.0)
        }
    }

    fn job(source: Arc<dyn ElevationSource>) -> TileJob {
        TileJob::Elevation {
            source,
            request: ElevationRequest::new(TileBounds::eastern_hemisphere(), 8, 13),
            mesh: MeshParams::default(),
        }
    }

    fn flat_job() -> TileJob {
        job(Arc::new(ProceduralElevation::Flat))
    }

    fn client(workers: usize, max_in_flight: usize) -> SchedulerClient {
        SchedulerClient::new(Arc::new(
            TileLoadScheduler::new(workers, max_in_flight, 16).unwrap(),
        ))
    }

    fn collect(client: &SchedulerClient, expected: usize) -> Vec<FetchResult> {
        let mut results = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while results.len() < expected && Instant::now() < deadline {
            results.extend(client.drain());
            std::thread::sleep(Duration::from_millis(5));
        }
        results
    }

    fn wait_idle(client: &SchedulerClient) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while client.scheduler().in_flight_count() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_all_submitted_jobs_complete() {
        let client = client(3, 64);
        let mut ids = Vec::new();
        for _ in 0..12 {
            ids.push(client.submit(flat_job()).unwrap().id());
        }

        let results = collect(&client, ids.len());
        assert_eq!(results.len(), ids.len());
        for result in &results {
            assert!(ids.contains(&result.request_id));
            assert_eq!(result.kind, FetchKind::Elevation);
            match &result.outcome {
                Ok(JobOutput::Elevation(mesh)) => assert_eq!(mesh.surface.vertices.len(), 64),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        wait_idle(&client);
        assert_eq!(client.scheduler().in_flight_count(), 0);
    }

    #[test]
    fn test_request_ids_are_monotonic() {
        let client = client(1, 64);
        let a = client.submit(flat_job()).unwrap().id();
        let b = client.submit(flat_job()).unwrap().id();
        let c = client.submit(flat_job()).unwrap().id();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_saturation_is_reported() {
        let client = client(1, 2);
        let slow: Arc<dyn ElevationSource> = Arc::new(SlowSource(Duration::from_millis(200)));
        assert!(client.submit(job(Arc::clone(&slow))).is_ok());
        assert!(client.submit(job(Arc::clone(&slow))).is_ok());
        match client.submit(job(slow)) {
            Err(SchedulerError::Saturated { limit, .. }) => assert_eq!(limit, 2),
            other => panic!("expected saturation, got {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_queued_job_produces_no_result() {
        let client = client(1, 8);
        let blocker = client
            .submit(job(Arc::new(SlowSource(Duration::from_millis(150)))))
            .unwrap();
        let queued = client.submit(flat_job()).unwrap();
        client.cancel(&queued);
        assert!(queued.is_cancelled());
        assert!(!client.scheduler().is_pending(queued.id()));

        let results = collect(&client, 1);
        wait_idle(&client);
        let mut all: Vec<_> = results.into_iter().map(|r| r.request_id).collect();
        all.extend(client.drain().into_iter().map(|r| r.request_id));
        assert_eq!(all, vec![blocker.id()]);
    }

    #[test]
    fn test_source_failure_is_a_fetch_error() {
        let client = client(1, 8);
        let ticket = client.submit(job(Arc::new(FailingSource))).unwrap();
        let results = collect(&client, 1);
        assert_eq!(results.len(), 1);
        assert!(matches!(
            &results[0].outcome,
            Err(FetchError::Source { request_id, source: SourceError::Unavailable(_) })
                if *request_id == ticket.id()
        ));
    }

    #[test]
    fn test_worker_survives_panicking_job() {
        let client = client(1, 8);
        client.submit(job(Arc::new(PanickingSource))).unwrap();
        client.submit(flat_job()).unwrap();

        let results = collect(&client, 2);
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0].outcome,
            Err(FetchError::WorkerPanicked { .. })
        ));
        assert!(results[1].outcome.is_ok());
    }

    #[test]
    fn test_shared_pool_routes_results_to_submitter() {
        let scheduler = Arc::new(TileLoadScheduler::new(2, 32, 16).unwrap());
        let a = SchedulerClient::new(Arc::clone(&scheduler));
        let b = SchedulerClient::new(Arc::clone(&scheduler));

        let ticket_a = a.submit(flat_job()).unwrap();
        let ticket_b = b.submit(flat_job()).unwrap();

        let results_a = collect(&a, 1);
        let results_b = collect(&b, 1);
        assert_eq!(results_a.len(), 1);
        assert_eq!(results_b.len(), 1);
        assert_eq!(results_a[0].request_id, ticket_a.id());
        assert_eq!(results_b[0].request_id, ticket_b.id());
    }

    #[test]
    fn test_dropping_client_mid_fetch_is_harmless() {
        let scheduler = Arc::new(TileLoadScheduler::new(1, 8, 8).unwrap());
        let client = SchedulerClient::new(Arc::clone(&scheduler));
        client
            .submit(job(Arc::new(SlowSource(Duration::from_millis(50)))))
            .unwrap();
        drop(client);

        let deadline = Instant::now() + Duration::from_secs(10);
        while scheduler.in_flight_count() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(scheduler.in_flight_count(), 0);
    }

    #[test]
    fn test_imagery_job() {
        use crate::imagery::ProceduralImagery;
        let client = client(1, 8);
        let source = Arc::new(ProceduralImagery::from_config(
            &orbis_config::ImageryConfig::default(),
        ));
        let ticket = client
            .submit(TileJob::Imagery {
                source,
                request: ImageryRequest {
                    bounds: TileBounds::western_hemisphere(),
                    size: 8,
                },
            })
            .unwrap();
        assert_eq!(ticket.kind(), FetchKind::Imagery);
        let results = collect(&client, 1);
        assert!(matches!(
            &results[0].outcome,
            Ok(JobOutput::Imagery(texture)) if texture.width == 8
        ));
    }

    #[test]
    fn test_default_worker_count_is_bounded() {
        let n = TileLoadScheduler::default_worker_count();
        assert!((1..=4).contains(&n));
    }
}
