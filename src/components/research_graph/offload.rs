//! Asynchronous layout offload.
//!
//! [`LayoutOffloadChannel`] hands layout work to a background [`LayoutWorker`]
//! and correlates replies with callers through a table of pending requests.
//! Each request is bounded by a timeout. When no worker can be started, or a
//! running worker fails, the channel computes layouts in-process and callers
//! see the same future-based contract.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, Either, LocalBoxFuture};
use futures::FutureExt;
use log::{debug, error, warn};
use web_time::Instant;

use super::cache::signature;
use super::error::OffloadError;
use super::layout::LayoutEngine;
use super::protocol::{LayoutRequest, LayoutResponse, WorkerMessage};
use super::types::{GraphEdgeSpec, GraphNodeSpec, LayoutResult};

type Outcome = Result<LayoutResult, OffloadError>;

/// A background execution context able to run layout requests.
///
/// Replies are not returned from `post`; the worker feeds them back through
/// the [`ResponseHandle`] it was given at spawn time.
pub trait LayoutWorker {
	fn post(&self, request: &LayoutRequest) -> Result<(), OffloadError>;
	fn terminate(&self);
}

/// Source of timeout futures.
pub trait Timer {
	fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}

/// Timer backed by a sleeping thread, for targets with OS threads.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadTimer;

#[cfg(not(target_arch = "wasm32"))]
impl Timer for ThreadTimer {
	fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
		let (tx, rx) = oneshot::channel();
		std::thread::spawn(move || {
			std::thread::sleep(duration);
			let _ = tx.send(());
		});
		async move {
			let _ = rx.await;
		}
		.boxed_local()
	}
}

/// The platform's timer: `setTimeout` in the browser, a thread elsewhere.
pub fn default_timer() -> Rc<dyn Timer> {
	#[cfg(target_arch = "wasm32")]
	{
		Rc::new(super::web::WindowTimer)
	}
	#[cfg(not(target_arch = "wasm32"))]
	{
		Rc::new(ThreadTimer)
	}
}

struct PendingLayoutRequest {
	sender: oneshot::Sender<Outcome>,
	cache_key: String,
	created_at: Instant,
}

enum Backend {
	Worker(Rc<dyn LayoutWorker>),
	InProcess,
	Terminated,
}

struct Shared {
	engine: LayoutEngine,
	timer: Rc<dyn Timer>,
	timeout: Duration,
	backend: RefCell<Backend>,
	pending: RefCell<HashMap<u64, PendingLayoutRequest>>,
	next_id: Cell<u64>,
}

impl Shared {
	fn reject_all(&self, err: &OffloadError) {
		let drained: Vec<_> = self.pending.borrow_mut().drain().map(|(_, p)| p).collect();
		for pending in drained {
			let _ = pending.sender.send(Err(err.clone()));
		}
	}

	/// Stop using the worker for good and fail everything in flight.
	fn degrade(&self, err: OffloadError) {
		let previous = self.backend.replace(Backend::InProcess);
		match previous {
			Backend::Worker(worker) => {
				error!("layout worker failed, computing layouts in-process from now on: {err}");
				worker.terminate();
			}
			Backend::Terminated => {
				self.backend.replace(Backend::Terminated);
			}
			Backend::InProcess => {}
		}
		self.reject_all(&err);
	}
}

/// Settles a pending entry when the caller's future completes or is dropped.
struct PendingGuard {
	shared: Weak<Shared>,
	request_id: u64,
}

impl Drop for PendingGuard {
	fn drop(&mut self) {
		if let Some(shared) = self.shared.upgrade() {
			if let Ok(mut pending) = shared.pending.try_borrow_mut() {
				pending.remove(&self.request_id);
			}
		}
	}
}

/// Inbound side of the channel, given to the worker backend.
#[derive(Clone)]
pub struct ResponseHandle {
	shared: Weak<Shared>,
}

impl ResponseHandle {
	/// Settle the pending request matching `response.request_id`. Replies for
	/// unknown ids (late, already timed out, or duplicated) are dropped.
	pub fn deliver(&self, response: LayoutResponse) {
		let Some(shared) = self.shared.upgrade() else {
			return;
		};
		let request_id = response.request_id;
		let Some(pending) = shared.pending.borrow_mut().remove(&request_id) else {
			debug!("ignoring layout response {request_id}: no pending request");
			return;
		};
		debug!(
			"layout response {request_id} after {:?}",
			pending.created_at.elapsed()
		);
		let _ = pending.sender.send(response.into_result(pending.cache_key));
	}

	/// Decode a raw worker message and deliver it.
	pub fn deliver_json(&self, json: &str) {
		match WorkerMessage::from_json(json) {
			Ok(WorkerMessage::LayoutComplete(response)) => self.deliver(response),
			Ok(WorkerMessage::LayoutGraph(request)) => {
				warn!("unexpected LAYOUT_GRAPH {} from worker", request.request_id)
			}
			Err(err) => warn!("dropping worker message: {err}"),
		}
	}

	/// Report that the worker itself broke.
	pub fn fail(&self, reason: impl Into<String>) {
		if let Some(shared) = self.shared.upgrade() {
			shared.degrade(OffloadError::Worker(reason.into()));
		}
	}
}

/// Future-returning front end for layout computation.
pub struct LayoutOffloadChannel {
	shared: Rc<Shared>,
}

impl LayoutOffloadChannel {
	/// A channel that always computes in-process.
	pub fn in_process(engine: LayoutEngine) -> Self {
		Self::build(engine, default_timer(), Duration::ZERO)
	}

	/// Start a worker through `spawn`. If it fails, the failure is logged once
	/// and the channel serves every call in-process.
	pub fn with_worker<F>(engine: LayoutEngine, timer: Rc<dyn Timer>, timeout: Duration, spawn: F) -> Self
	where
		F: FnOnce(ResponseHandle) -> Result<Rc<dyn LayoutWorker>, OffloadError>,
	{
		let channel = Self::build(engine, timer, timeout);
		match spawn(channel.response_handle()) {
			Ok(worker) => {
				channel.shared.backend.replace(Backend::Worker(worker));
			}
			Err(err) => warn!("layout worker unavailable, computing layouts in-process: {err}"),
		}
		channel
	}

	fn build(engine: LayoutEngine, timer: Rc<dyn Timer>, timeout: Duration) -> Self {
		Self {
			shared: Rc::new(Shared {
				engine,
				timer,
				timeout,
				backend: RefCell::new(Backend::InProcess),
				pending: RefCell::new(HashMap::new()),
				next_id: Cell::new(1),
			}),
		}
	}

	pub fn response_handle(&self) -> ResponseHandle {
		ResponseHandle {
			shared: Rc::downgrade(&self.shared),
		}
	}

	pub fn engine(&self) -> &LayoutEngine {
		&self.shared.engine
	}

	/// Whether requests currently go to a background worker.
	pub fn is_offloaded(&self) -> bool {
		matches!(*self.shared.backend.borrow(), Backend::Worker(_))
	}

	pub fn pending_count(&self) -> usize {
		self.shared.pending.borrow().len()
	}

	/// Compute a layered layout, off the calling context when a worker is running.
	///
	/// Concurrent requests may settle in any order.
	pub fn calculate_layout(
		&self,
		nodes: Vec<GraphNodeSpec>,
		edges: Vec<GraphEdgeSpec>,
	) -> LocalBoxFuture<'static, Outcome> {
		let worker = match &*self.shared.backend.borrow() {
			Backend::Terminated => return future::ready(Err(OffloadError::Terminated)).boxed_local(),
			Backend::InProcess => None,
			Backend::Worker(worker) => Some(Rc::clone(worker)),
		};
		let Some(worker) = worker else {
			return future::ready(Ok(self.shared.engine.layout(&nodes, &edges))).boxed_local();
		};

		let request_id = self.shared.next_id.get();
		self.shared.next_id.set(request_id + 1);

		let (sender, receiver) = oneshot::channel();
		self.shared.pending.borrow_mut().insert(
			request_id,
			PendingLayoutRequest {
				sender,
				cache_key: signature(&nodes, &edges),
				created_at: Instant::now(),
			},
		);
		let sleep = self.shared.timer.sleep(self.shared.timeout);
		let guard = PendingGuard {
			shared: Rc::downgrade(&self.shared),
			request_id,
		};

		let request = LayoutRequest {
			request_id,
			nodes,
			edges,
			layout: Some(self.shared.engine.config().clone()),
		};
		if let Err(err) = worker.post(&request) {
			drop(guard);
			self.shared.degrade(err);
			return future::ready(Ok(self.shared.engine.layout(&request.nodes, &request.edges)))
				.boxed_local();
		}

		let timeout_ms = self.shared.timeout.as_millis() as u64;
		async move {
			let _guard = guard;
			match future::select(receiver, sleep).await {
				Either::Left((Ok(outcome), _)) => outcome,
				Either::Left((Err(oneshot::Canceled), _)) => Err(OffloadError::Terminated),
				Either::Right(((), _)) => {
					warn!("layout request {request_id} timed out after {timeout_ms}ms");
					Err(OffloadError::Timeout {
						request_id,
						timeout_ms,
					})
				}
			}
		}
		.boxed_local()
	}

	/// Reject everything in flight and stop the worker. Later calls fail with
	/// [`OffloadError::Terminated`].
	pub fn shutdown(&self) {
		if let Backend::Worker(worker) = self.shared.backend.replace(Backend::Terminated) {
			worker.terminate();
		}
		self.shared.reject_all(&OffloadError::Terminated);
	}
}

impl Drop for LayoutOffloadChannel {
	fn drop(&mut self) {
		self.shutdown();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::research_graph::protocol::respond;
	use crate::components::research_graph::types::{EdgeKind, StepKind};
	use futures::executor::block_on;

	#[derive(Clone, Default)]
	struct ManualTimer {
		armed: Rc<RefCell<Vec<oneshot::Sender<()>>>>,
	}

	impl ManualTimer {
		fn fire_all(&self) {
			for tx in self.armed.borrow_mut().drain(..) {
				let _ = tx.send(());
			}
		}
	}

	impl Timer for ManualTimer {
		fn sleep(&self, _: Duration) -> LocalBoxFuture<'static, ()> {
			let (tx, rx) = oneshot::channel();
			self.armed.borrow_mut().push(tx);
			async move {
				if rx.await.is_err() {
					future::pending::<()>().await;
				}
			}
			.boxed_local()
		}
	}

	/// Records requests; the test decides when and how to answer.
	#[derive(Default)]
	struct QueueWorker {
		posted: RefCell<Vec<LayoutRequest>>,
		terminated: Cell<bool>,
		refuse_posts: bool,
	}

	impl LayoutWorker for QueueWorker {
		fn post(&self, request: &LayoutRequest) -> Result<(), OffloadError> {
			if self.refuse_posts {
				return Err(OffloadError::Worker("postMessage failed".into()));
			}
			self.posted.borrow_mut().push(request.clone());
			Ok(())
		}

		fn terminate(&self) {
			self.terminated.set(true);
		}
	}

	/// Answers during `post`, through the JSON boundary.
	struct EchoWorker {
		handle: ResponseHandle,
	}

	impl LayoutWorker for EchoWorker {
		fn post(&self, request: &LayoutRequest) -> Result<(), OffloadError> {
			let json = WorkerMessage::LayoutGraph(request.clone()).to_json()?;
			self.handle.deliver(respond(&json));
			Ok(())
		}

		fn terminate(&self) {}
	}

	fn graph() -> (Vec<GraphNodeSpec>, Vec<GraphEdgeSpec>) {
		(
			vec![
				GraphNodeSpec::new("q", "Question", StepKind::Query, 0),
				GraphNodeSpec::new("s1", "Search A", StepKind::Search, 1),
				GraphNodeSpec::new("s2", "Search B", StepKind::Search, 1),
			],
			vec![
				GraphEdgeSpec::new("q", "s1", EdgeKind::Sequential),
				GraphEdgeSpec::new("q", "s2", EdgeKind::Sequential),
			],
		)
	}

	fn queued(timer: &ManualTimer) -> (LayoutOffloadChannel, Rc<QueueWorker>) {
		let worker = Rc::new(QueueWorker::default());
		let spawned = Rc::clone(&worker);
		let channel = LayoutOffloadChannel::with_worker(
			LayoutEngine::default(),
			Rc::new(timer.clone()),
			Duration::from_millis(5000),
			move |_| Ok(spawned as Rc<dyn LayoutWorker>),
		);
		(channel, worker)
	}

	fn answer(channel: &LayoutOffloadChannel, request: &LayoutRequest) {
		let json = WorkerMessage::LayoutGraph(request.clone()).to_json().unwrap();
		channel.response_handle().deliver(respond(&json));
	}

	#[test]
	fn worker_reply_resolves_the_matching_request() {
		let (nodes, edges) = graph();
		let expected = LayoutEngine::default().layout(&nodes, &edges);
		let timer = ManualTimer::default();
		let (channel, worker) = queued(&timer);

		let first = channel.calculate_layout(nodes.clone(), edges.clone());
		let second = channel.calculate_layout(nodes[..1].to_vec(), Vec::new());
		assert_eq!(channel.pending_count(), 2);

		let posted = worker.posted.borrow().clone();
		assert_ne!(posted[0].request_id, posted[1].request_id);
		// Reply out of order.
		answer(&channel, &posted[1]);
		answer(&channel, &posted[0]);

		assert_eq!(block_on(first), Ok(expected));
		assert_eq!(block_on(second).unwrap().nodes.len(), 1);
		assert_eq!(channel.pending_count(), 0);
	}

	#[test]
	fn error_reply_rejects_only_that_request() {
		let (nodes, edges) = graph();
		let timer = ManualTimer::default();
		let (channel, worker) = queued(&timer);

		let failing = channel.calculate_layout(nodes.clone(), edges.clone());
		let healthy = channel.calculate_layout(nodes, edges);
		let posted = worker.posted.borrow().clone();
		channel
			.response_handle()
			.deliver(LayoutResponse::failed(posted[0].request_id, "out of memory"));
		answer(&channel, &posted[1]);

		assert_eq!(block_on(failing), Err(OffloadError::Worker("out of memory".into())));
		assert!(block_on(healthy).is_ok());
		assert!(channel.is_offloaded());
	}

	#[test]
	fn timeout_rejects_and_late_reply_is_ignored() {
		let (nodes, edges) = graph();
		let timer = ManualTimer::default();
		let (channel, worker) = queued(&timer);

		let request = channel.calculate_layout(nodes, edges);
		timer.fire_all();
		let outcome = block_on(request);
		assert!(matches!(outcome, Err(OffloadError::Timeout { timeout_ms: 5000, .. })));
		assert_eq!(channel.pending_count(), 0);

		let posted = worker.posted.borrow().clone();
		answer(&channel, &posted[0]);
		assert_eq!(channel.pending_count(), 0);
		assert!(channel.is_offloaded());
	}

	#[test]
	fn stalled_worker_rejects_within_the_timeout() {
		let (nodes, edges) = graph();
		let channel = LayoutOffloadChannel::with_worker(
			LayoutEngine::default(),
			Rc::new(ThreadTimer),
			Duration::from_millis(50),
			|_| Ok(Rc::new(QueueWorker::default()) as Rc<dyn LayoutWorker>),
		);

		let started = std::time::Instant::now();
		let outcome = block_on(channel.calculate_layout(nodes, edges));
		let elapsed = started.elapsed();
		assert!(matches!(outcome, Err(OffloadError::Timeout { .. })));
		assert!(elapsed >= Duration::from_millis(50));
		assert!(elapsed < Duration::from_millis(1050), "took {elapsed:?}");
	}

	#[test]
	fn failed_spawn_falls_back_to_in_process_layout() {
		let (nodes, edges) = graph();
		let channel = LayoutOffloadChannel::with_worker(
			LayoutEngine::default(),
			Rc::new(ManualTimer::default()),
			Duration::from_millis(5000),
			|_| Err(OffloadError::Unavailable("no Worker in this environment".into())),
		);
		assert!(!channel.is_offloaded());

		let outcome = block_on(channel.calculate_layout(nodes.clone(), edges.clone()));
		assert_eq!(outcome, Ok(LayoutEngine::default().layout(&nodes, &edges)));
	}

	#[test]
	fn worker_answering_inside_post_is_handled() {
		let (nodes, edges) = graph();
		let channel = LayoutOffloadChannel::with_worker(
			LayoutEngine::default(),
			Rc::new(ManualTimer::default()),
			Duration::from_millis(5000),
			|handle| Ok(Rc::new(EchoWorker { handle }) as Rc<dyn LayoutWorker>),
		);
		let outcome = block_on(channel.calculate_layout(nodes.clone(), edges.clone()));
		assert_eq!(outcome, Ok(LayoutEngine::default().layout(&nodes, &edges)));
	}

	#[test]
	fn worker_failure_rejects_in_flight_and_degrades() {
		let (nodes, edges) = graph();
		let timer = ManualTimer::default();
		let (channel, worker) = queued(&timer);

		let in_flight = channel.calculate_layout(nodes.clone(), edges.clone());
		channel.response_handle().fail("script error");
		assert_eq!(block_on(in_flight), Err(OffloadError::Worker("script error".into())));
		assert!(worker.terminated.get());
		assert!(!channel.is_offloaded());

		assert!(block_on(channel.calculate_layout(nodes, edges)).is_ok());
	}

	#[test]
	fn refused_post_is_served_in_process() {
		let (nodes, edges) = graph();
		let worker = Rc::new(QueueWorker {
			refuse_posts: true,
			..QueueWorker::default()
		});
		let spawned = Rc::clone(&worker);
		let channel = LayoutOffloadChannel::with_worker(
			LayoutEngine::default(),
			Rc::new(ManualTimer::default()),
			Duration::from_millis(5000),
			move |_| Ok(spawned as Rc<dyn LayoutWorker>),
		);

		assert!(block_on(channel.calculate_layout(nodes, edges)).is_ok());
		assert!(!channel.is_offloaded());
		assert_eq!(channel.pending_count(), 0);
	}

	#[test]
	fn shutdown_rejects_pending_and_later_calls() {
		let (nodes, edges) = graph();
		let timer = ManualTimer::default();
		let (channel, worker) = queued(&timer);

		let in_flight = channel.calculate_layout(nodes.clone(), edges.clone());
		channel.shutdown();
		assert_eq!(block_on(in_flight), Err(OffloadError::Terminated));
		assert!(worker.terminated.get());
		assert_eq!(
			block_on(channel.calculate_layout(nodes, edges)),
			Err(OffloadError::Terminated)
		);
	}

	#[test]
	fn in_process_channel_resolves_immediately() {
		let (nodes, edges) = graph();
		let channel = LayoutOffloadChannel::in_process(LayoutEngine::default());
		let outcome = channel.calculate_layout(nodes, edges).now_or_never();
		assert!(matches!(outcome, Some(Ok(_))));
	}
}
