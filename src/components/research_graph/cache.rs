use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};

use log::debug;

use super::types::{GraphEdgeSpec, GraphNodeSpec, LayoutResult};

/// Canonical structural key for a node/edge set.
///
/// Node and edge order do not matter; a node's tier does. Separator
/// characters inside ids are backslash-escaped, so `a-b -> c` and
/// `a -> b-c` produce different keys.
pub fn signature(nodes: &[GraphNodeSpec], edges: &[GraphEdgeSpec]) -> String {
	let mut node_keys: Vec<String> = nodes
		.iter()
		.map(|n| format!("{}:{}", escape(&n.id), n.tier))
		.collect();
	node_keys.sort_unstable();

	let mut edge_keys: Vec<String> = edges
		.iter()
		.map(|e| format!("{}-{}-{}", escape(&e.source), escape(&e.target), e.kind.as_str()))
		.collect();
	edge_keys.sort_unstable();

	format!("{}|{}", node_keys.join(","), edge_keys.join(","))
}

fn escape(id: &str) -> Cow<'_, str> {
	if !id.contains(['\\', '-', ':', ',', '|']) {
		return Cow::Borrowed(id);
	}
	let mut escaped = String::with_capacity(id.len() + 4);
	for ch in id.chars() {
		if matches!(ch, '\\' | '-' | ':' | ',' | '|') {
			escaped.push('\\');
		}
		escaped.push(ch);
	}
	Cow::Owned(escaped)
}

/// Bounded memo of layouts keyed by [`signature`].
///
/// Eviction is oldest-inserted first. Lookups do not refresh an entry's age.
#[derive(Debug)]
pub struct LayoutCache {
	capacity: usize,
	entries: HashMap<String, LayoutResult>,
	order: VecDeque<String>,
}

impl Default for LayoutCache {
	fn default() -> Self {
		Self::new(100)
	}
}

impl LayoutCache {
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			capacity,
			entries: HashMap::with_capacity(capacity + 1),
			order: VecDeque::with_capacity(capacity + 1),
		}
	}

	pub fn get(&self, key: &str) -> Option<&LayoutResult> {
		self.entries.get(key)
	}

	/// Store a layout. Re-putting an existing key replaces the value but keeps its age.
	pub fn put(&mut self, key: impl Into<String>, result: LayoutResult) {
		let key = key.into();
		if self.entries.insert(key.clone(), result).is_none() {
			self.order.push_back(key);
		}
		while self.entries.len() > self.capacity {
			let Some(oldest) = self.order.pop_front() else {
				break;
			};
			self.entries.remove(&oldest);
			debug!("layout cache evicted {oldest}");
		}
	}

	pub fn clear(&mut self) {
		self.entries.clear();
		self.order.clear();
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}
}
