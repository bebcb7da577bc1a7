use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::types::{EdgeKind, GraphEdgeSpec, GraphNodeSpec, GraphSnapshot, StepKind};

/// Provider of the research-step graph.
pub trait GraphSource {
	fn snapshot(&self) -> GraphSnapshot;
	/// Increases on every mutation.
	fn version(&self) -> u64;
	/// `callback` runs after every mutation until the returned guard is dropped.
	fn subscribe(&self, callback: Rc<dyn Fn()>) -> Subscription;
}

/// Keeps a [`GraphSource`] callback registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
	unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
	pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
		Self {
			unsubscribe: Some(Box::new(unsubscribe)),
		}
	}

	pub fn unsubscribe(mut self) {
		if let Some(f) = self.unsubscribe.take() {
			f();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(f) = self.unsubscribe.take() {
			f();
		}
	}
}

#[derive(Default)]
struct Store {
	snapshot: GraphSnapshot,
	version: u64,
	listeners: Vec<(u64, Rc<dyn Fn()>)>,
	next_listener: u64,
}

/// In-memory graph source. Cloning shares the same graph.
#[derive(Clone, Default)]
pub struct MemoryGraphSource {
	store: Rc<RefCell<Store>>,
}

impl MemoryGraphSource {
	pub fn new(snapshot: GraphSnapshot) -> Self {
		Self {
			store: Rc::new(RefCell::new(Store {
				snapshot,
				..Store::default()
			})),
		}
	}

	pub fn add_step(&self, id: impl Into<String>, title: impl Into<String>, kind: StepKind, tier: u32) {
		self.mutate(|g| g.nodes.push(GraphNodeSpec::new(id, title, kind, tier)));
	}

	pub fn connect(&self, source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) {
		self.mutate(|g| g.edges.push(GraphEdgeSpec::new(source, target, kind)));
	}

	/// Move a step to another tier. Unknown ids leave the graph untouched.
	pub fn set_tier(&self, id: &str, tier: u32) -> bool {
		let exists = self.store.borrow().snapshot.nodes.iter().any(|n| n.id == id);
		if exists {
			self.mutate(|g| {
				for node in g.nodes.iter_mut().filter(|n| n.id == id) {
					node.tier = tier;
				}
			});
		}
		exists
	}

	pub fn clear(&self) {
		self.mutate(|g| *g = GraphSnapshot::default());
	}

	pub fn len(&self) -> usize {
		self.store.borrow().snapshot.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn mutate(&self, f: impl FnOnce(&mut GraphSnapshot)) {
		let listeners: Vec<Rc<dyn Fn()>> = {
			let mut store = self.store.borrow_mut();
			f(&mut store.snapshot);
			store.version += 1;
			store.listeners.iter().map(|(_, l)| Rc::clone(l)).collect()
		};
		// Notify with the store released so listeners can read it.
		for listener in listeners {
			listener();
		}
	}
}

impl GraphSource for MemoryGraphSource {
	fn snapshot(&self) -> GraphSnapshot {
		self.store.borrow().snapshot.clone()
	}

	fn version(&self) -> u64 {
		self.store.borrow().version
	}

	fn subscribe(&self, callback: Rc<dyn Fn()>) -> Subscription {
		let id = {
			let mut store = self.store.borrow_mut();
			let id = store.next_listener;
			store.next_listener += 1;
			store.listeners.push((id, callback));
			id
		};
		let store: Weak<RefCell<Store>> = Rc::downgrade(&self.store);
		Subscription::new(move || {
			if let Some(store) = store.upgrade() {
				store.borrow_mut().listeners.retain(|(lid, _)| *lid != id);
			}
		})
	}
}
