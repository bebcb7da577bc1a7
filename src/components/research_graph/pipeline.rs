//! Snapshot → cache → engine (possibly offloaded) → versioned layout.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use log::debug;

use super::cache::{signature, LayoutCache};
use super::config::GraphConfig;
use super::error::OffloadError;
use super::layout::LayoutEngine;
use super::offload::{default_timer, LayoutOffloadChannel, LayoutWorker};
use super::types::{GraphNodeSpec, GraphSnapshot, LayoutResult};
use super::web::WebLayoutWorker;

/// Composes the layout cache and the offload channel, and drops results that
/// were overtaken by a newer source version.
pub struct LayoutPipeline {
	cache: Rc<RefCell<LayoutCache>>,
	channel: Rc<LayoutOffloadChannel>,
	latest_version: Rc<Cell<u64>>,
}

impl LayoutPipeline {
	pub fn new(cache: LayoutCache, channel: LayoutOffloadChannel) -> Self {
		Self {
			cache: Rc::new(RefCell::new(cache)),
			channel: Rc::new(channel),
			latest_version: Rc::new(Cell::new(0)),
		}
	}

	/// Build from configuration, starting a Web Worker when a script URL is set.
	pub fn from_config(config: &GraphConfig) -> Self {
		let engine = LayoutEngine::new(config.layout.clone());
		let channel = match &config.offload.worker_url {
			Some(url) => LayoutOffloadChannel::with_worker(
				engine,
				default_timer(),
				Duration::from_millis(config.offload.timeout_ms),
				|handle| WebLayoutWorker::spawn(url, handle).map(|w| Rc::new(w) as Rc<dyn LayoutWorker>),
			),
			None => LayoutOffloadChannel::in_process(engine),
		};
		Self::new(LayoutCache::new(config.offload.cache_capacity), channel)
	}

	pub fn channel(&self) -> &LayoutOffloadChannel {
		&self.channel
	}

	/// Record a version seen on the source. Versions never go backwards.
	pub fn note_version(&self, version: u64) {
		if version > self.latest_version.get() {
			self.latest_version.set(version);
		}
	}

	pub fn latest_version(&self) -> u64 {
		self.latest_version.get()
	}

	/// Cached geometry for `snapshot`. Titles and kinds are not part of the
	/// signature, so they are taken from `snapshot` rather than the cache.
	pub fn cached(&self, snapshot: &GraphSnapshot) -> Option<LayoutResult> {
		let mut hit = self
			.cache
			.borrow()
			.get(&signature(&snapshot.nodes, &snapshot.edges))
			.cloned()?;
		relabel(&mut hit, snapshot);
		Some(hit)
	}

	/// Synchronous path: cache, else the in-process engine.
	pub fn layout_now(&self, snapshot: &GraphSnapshot, version: u64) -> LayoutResult {
		self.note_version(version);
		let mut result = self.cached(snapshot).unwrap_or_else(|| {
			let computed = self.channel.engine().layout(&snapshot.nodes, &snapshot.edges);
			self.cache
				.borrow_mut()
				.put(computed.cache_key.clone(), computed.clone());
			computed
		});
		result.version = Some(version);
		result
	}

	/// Asynchronous path. Resolves to `None` when a newer version was noted
	/// while this one was being computed.
	pub fn request(
		&self,
		snapshot: GraphSnapshot,
		version: u64,
	) -> LocalBoxFuture<'static, Result<Option<LayoutResult>, OffloadError>> {
		self.note_version(version);
		if let Some(mut hit) = self.cached(&snapshot) {
			hit.version = Some(version);
			return future::ready(Ok(Some(hit))).boxed_local();
		}

		let cache = Rc::clone(&self.cache);
		let latest = Rc::clone(&self.latest_version);
		let pending = self.channel.calculate_layout(snapshot.nodes, snapshot.edges);
		async move {
			let mut result = pending.await?;
			cache.borrow_mut().put(result.cache_key.clone(), result.clone());
			if version < latest.get() {
				debug!("discarding layout for version {version}; {} is current", latest.get());
				return Ok(None);
			}
			result.version = Some(version);
			Ok(Some(result))
		}
		.boxed_local()
	}

	pub fn cache_len(&self) -> usize {
		self.cache.borrow().len()
	}

	pub fn clear_cache(&self) {
		self.cache.borrow_mut().clear();
	}
}

fn relabel(layout: &mut LayoutResult, snapshot: &GraphSnapshot) {
	let mut labels: HashMap<&str, &GraphNodeSpec> = HashMap::with_capacity(snapshot.nodes.len());
	for node in &snapshot.nodes {
		labels.entry(node.id.as_str()).or_insert(node);
	}
	for node in &mut layout.nodes {
		if let Some(step) = labels.get(node.id.as_str()) {
			node.title.clone_from(&step.title);
			node.kind = step.kind;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::research_graph::config::OffloadConfig;
	use crate::components::research_graph::offload::{ResponseHandle, Timer};
	use crate::components::research_graph::protocol::{respond, LayoutRequest, WorkerMessage};
	use crate::components::research_graph::types::{EdgeKind, GraphEdgeSpec, GraphNodeSpec, StepKind};
	use futures::executor::block_on;

	struct NeverTimer;

	impl Timer for NeverTimer {
		fn sleep(&self, _: Duration) -> LocalBoxFuture<'static, ()> {
			future::pending().boxed_local()
		}
	}

	struct HeldWorker {
		posted: Rc<RefCell<Vec<LayoutRequest>>>,
	}

	impl LayoutWorker for HeldWorker {
		fn post(&self, request: &LayoutRequest) -> Result<(), OffloadError> {
			self.posted.borrow_mut().push(request.clone());
			Ok(())
		}

		fn terminate(&self) {}
	}

	fn snapshot(tier_of_b: u32) -> GraphSnapshot {
		GraphSnapshot {
			nodes: vec![
				GraphNodeSpec::new("a", "A", StepKind::Query, 0),
				GraphNodeSpec::new("b", "B", StepKind::Answer, tier_of_b),
			],
			edges: vec![GraphEdgeSpec::new("a", "b", EdgeKind::Sequential)],
		}
	}

	fn reordered(tier_of_b: u32) -> GraphSnapshot {
		let mut s = snapshot(tier_of_b);
		s.nodes.reverse();
		s
	}

	#[test]
	fn identical_structure_hits_the_cache() {
		let pipeline = LayoutPipeline::from_config(&GraphConfig::default());
		let first = pipeline.layout_now(&snapshot(1), 1);
		assert_eq!(pipeline.cache_len(), 1);

		let second = block_on(pipeline.request(reordered(1), 2)).unwrap().unwrap();
		assert_eq!(pipeline.cache_len(), 1);
		assert_eq!(second.nodes, first.nodes);
		assert_eq!(second.version, Some(2));

		pipeline.layout_now(&snapshot(2), 3);
		assert_eq!(pipeline.cache_len(), 2);
	}

	#[test]
	fn cache_hits_carry_current_titles_and_kinds() {
		let pipeline = LayoutPipeline::from_config(&GraphConfig::default());
		let mut renamed = snapshot(1);
		pipeline.layout_now(&renamed, 1);

		renamed.nodes[0].title = "Refined question".into();
		renamed.nodes[0].kind = StepKind::Analyze;
		let now = pipeline.layout_now(&renamed, 2);
		assert_eq!(pipeline.cache_len(), 1);
		let a = now.node("a").unwrap();
		assert_eq!((a.title.as_str(), a.kind), ("Refined question", StepKind::Analyze));

		let later = block_on(pipeline.request(renamed.clone(), 3)).unwrap().unwrap();
		assert_eq!(later.node("a").unwrap().title, "Refined question");
		assert_eq!(later.node("b").unwrap().title, "B");
	}

	#[test]
	fn stale_results_are_discarded() {
		let posted = Rc::new(RefCell::new(Vec::new()));
		let worker_log = Rc::clone(&posted);
		let handle: Rc<RefCell<Option<ResponseHandle>>> = Rc::default();
		let slot = Rc::clone(&handle);
		let channel = LayoutOffloadChannel::with_worker(
			LayoutEngine::default(),
			Rc::new(NeverTimer),
			Duration::from_secs(5),
			move |h| {
				*slot.borrow_mut() = Some(h);
				Ok(Rc::new(HeldWorker { posted: worker_log }) as Rc<dyn LayoutWorker>)
			},
		);
		let pipeline = LayoutPipeline::new(LayoutCache::new(10), channel);

		let older = pipeline.request(snapshot(1), 1);
		let newer = pipeline.request(snapshot(2), 2);
		assert_eq!(pipeline.channel().pending_count(), 2);

		// The newer request finishes first, then the older one.
		let handle = handle.borrow().clone().unwrap();
		for request in posted.borrow().iter().rev() {
			let json = WorkerMessage::LayoutGraph(request.clone()).to_json().unwrap();
			handle.deliver(respond(&json));
		}

		let newer = block_on(newer).unwrap().unwrap();
		assert_eq!(newer.version, Some(2));
		assert_eq!(block_on(older).unwrap(), None);
		// Both results are still worth caching.
		assert_eq!(pipeline.cache_len(), 2);
	}

	#[test]
	fn unavailable_worker_still_serves_layouts() {
		let config = GraphConfig {
			offload: OffloadConfig {
				worker_url: Some("layout-worker.js".into()),
				..OffloadConfig::default()
			},
			..GraphConfig::default()
		};
		let pipeline = LayoutPipeline::from_config(&config);
		assert!(!pipeline.channel().is_offloaded());
		let layout = block_on(pipeline.request(snapshot(1), 1)).unwrap().unwrap();
		assert_eq!(layout.nodes.len(), 2);

		pipeline.clear_cache();
		assert_eq!(pipeline.cache_len(), 0);
	}

	#[test]
	fn versions_never_go_backwards() {
		let pipeline = LayoutPipeline::from_config(&GraphConfig::default());
		pipeline.note_version(5);
		pipeline.note_version(3);
		assert_eq!(pipeline.latest_version(), 5);
	}
}
