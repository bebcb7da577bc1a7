use serde::{Deserialize, Serialize};

/// Category of a research step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
	/// The user's question or a reformulation of it.
	Query,
	/// A search issued against a corpus or the web.
	Search,
	/// Reading and extracting from a retrieved source.
	Read,
	/// Reasoning over collected material.
	Analyze,
	/// Merging findings into a draft.
	Synthesize,
	/// The final answer shown to the user.
	Answer,
}

impl StepKind {
	/// Every kind, in display order.
	pub const ALL: [StepKind; 6] = [
		StepKind::Query,
		StepKind::Search,
		StepKind::Read,
		StepKind::Analyze,
		StepKind::Synthesize,
		StepKind::Answer,
	];
}

/// Relationship carried by an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
	/// One step simply follows another.
	Sequential,
	/// The target consumes the output of the source.
	Dependency,
	/// The target was produced while recovering from a failure in the source.
	Error,
}

impl EdgeKind {
	/// Tag used in cache signatures and on the wire.
	pub fn as_str(self) -> &'static str {
		match self {
			EdgeKind::Sequential => "sequential",
			EdgeKind::Dependency => "dependency",
			EdgeKind::Error => "error",
		}
	}
}

/// A research step as exported by the graph source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNodeSpec {
	pub id: String,
	pub title: String,
	pub kind: StepKind,
	pub tier: u32,
}

impl GraphNodeSpec {
	/// Convenience constructor.
	pub fn new(id: impl Into<String>, title: impl Into<String>, kind: StepKind, tier: u32) -> Self {
		Self {
			id: id.into(),
			title: title.into(),
			kind,
			tier,
		}
	}
}

/// A directed relationship between two research steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdgeSpec {
	pub source: String,
	pub target: String,
	#[serde(rename = "type")]
	pub kind: EdgeKind,
}

impl GraphEdgeSpec {
	/// Convenience constructor.
	pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
		Self {
			source: source.into(),
			target: target.into(),
			kind,
		}
	}
}

/// Nodes and edges exported from the graph source at one version.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
	pub nodes: Vec<GraphNodeSpec>,
	pub edges: Vec<GraphEdgeSpec>,
}

/// A point in layout space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
	pub x: f64,
	pub y: f64,
}

impl Point {
	pub const fn new(x: f64, y: f64) -> Self {
		Self { x, y }
	}
}

/// A node with concrete layout-space geometry. `(x, y)` is the top-left corner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionedNode {
	pub id: String,
	pub x: f64,
	pub y: f64,
	pub width: f64,
	pub height: f64,
	pub tier: u32,
	pub title: String,
	pub kind: StepKind,
}

impl PositionedNode {
	/// Inclusive bounding-box test.
	pub fn contains(&self, px: f64, py: f64) -> bool {
		px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
	}

	pub fn bottom_center(&self) -> Point {
		Point::new(self.x + self.width / 2.0, self.y + self.height)
	}

	pub fn top_center(&self) -> Point {
		Point::new(self.x + self.width / 2.0, self.y)
	}
}

/// An edge with its routed path.
///
/// `points` holds either 2 points (a straight segment) or 4 points (a cubic
/// curve: start, two control points, end). An empty list marks a dangling
/// reference that must not be drawn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedEdge {
	pub source: String,
	pub target: String,
	#[serde(rename = "type")]
	pub kind: EdgeKind,
	pub points: Vec<Point>,
}

impl RoutedEdge {
	pub fn is_routable(&self) -> bool {
		!self.points.is_empty()
	}
}

/// Output of one layout pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutResult {
	pub nodes: Vec<PositionedNode>,
	pub edges: Vec<RoutedEdge>,
	/// Structural signature of the input that produced this layout.
	pub cache_key: String,
	/// Source version the layout was computed for, when produced by the pipeline.
	pub version: Option<u64>,
}

impl LayoutResult {
	pub fn node(&self, id: &str) -> Option<&PositionedNode> {
		self.nodes.iter().find(|n| n.id == id)
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}
}
