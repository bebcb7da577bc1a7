//! Layered placement and edge routing for research-step graphs.
//!
//! The primary mode stacks tiers top-to-bottom and centers each tier around
//! `x = 0`. A secondary force-directed mode starts from the layered placement
//! and lets nodes drift horizontally while every tier keeps its row.

use std::collections::{BTreeMap, HashMap};

use force_graph::{DefaultNodeIdx, EdgeData, ForceGraph, NodeData, SimulationParameters};
use log::warn;

use super::cache::signature;
use super::config::LayoutConfig;
use super::types::{GraphEdgeSpec, GraphNodeSpec, LayoutResult, Point, PositionedNode, RoutedEdge};

const TIME_STEP: f32 = 0.016;
const NODE_MASS: f32 = 10.0;

/// Converts node/edge specs into positioned nodes and routed edges.
#[derive(Clone, Debug, Default)]
pub struct LayoutEngine {
	config: LayoutConfig,
}

#[derive(Clone, Copy, Debug, Default)]
struct ForceNode {
	slot: usize,
	tier_y: f32,
}

impl LayoutEngine {
	pub fn new(config: LayoutConfig) -> Self {
		Self { config }
	}

	pub fn config(&self) -> &LayoutConfig {
		&self.config
	}

	/// Layered layout. Deterministic for a given input, never fails on bad edges.
	pub fn layout(&self, nodes: &[GraphNodeSpec], edges: &[GraphEdgeSpec]) -> LayoutResult {
		let positioned = self.place_layered(nodes);
		let routed = self.route_edges(&positioned, edges);
		LayoutResult {
			nodes: positioned,
			edges: routed,
			cache_key: signature(nodes, edges),
			version: None,
		}
	}

	/// Force-directed refinement of the layered layout.
	///
	/// Nodes listed in `pins` are held at the given top-left position. All
	/// other nodes are snapped back to their tier row after every iteration,
	/// so only their x coordinate is free. Overlap is not prevented.
	pub fn force_directed(
		&self,
		nodes: &[GraphNodeSpec],
		edges: &[GraphEdgeSpec],
		pins: &HashMap<String, Point>,
	) -> LayoutResult {
		let mut positioned = self.place_layered(nodes);
		let mut graph: ForceGraph<ForceNode, ()> = ForceGraph::new(SimulationParameters {
			force_charge: self.config.force_charge,
			force_spring: self.config.force_spring,
			force_max: self.config.force_max,
			node_speed: self.config.node_speed,
			damping_factor: self.config.damping_factor,
		});

		let mut id_to_idx: HashMap<&str, DefaultNodeIdx> = HashMap::new();
		for (slot, node) in positioned.iter().enumerate() {
			let pin = pins.get(&node.id);
			let (x, y) = pin.map_or((node.x, node.y), |p| (p.x, p.y));
			let idx = graph.add_node(NodeData {
				x: x as f32,
				y: y as f32,
				mass: NODE_MASS,
				is_anchor: pin.is_some(),
				user_data: ForceNode {
					slot,
					tier_y: node.y as f32,
				},
			});
			id_to_idx.entry(node.id.as_str()).or_insert(idx);
		}

		for edge in edges {
			if edge.source == edge.target {
				continue;
			}
			if let (Some(&src), Some(&tgt)) = (
				id_to_idx.get(edge.source.as_str()),
				id_to_idx.get(edge.target.as_str()),
			) {
				graph.add_edge(src, tgt, EdgeData::default());
			}
		}

		for _ in 0..self.config.force_iterations {
			graph.update(TIME_STEP);
			graph.visit_nodes_mut(|node| {
				if !node.data.is_anchor {
					node.data.y = node.data.user_data.tier_y;
				}
			});
		}

		graph.visit_nodes(|node| {
			let slot = node.data.user_data.slot;
			let (x, y) = (node.x() as f64, node.y() as f64);
			// Coincident pins can blow up the charge term; keep the seed position then.
			if x.is_finite() && y.is_finite() {
				positioned[slot].x = x;
				positioned[slot].y = y;
			}
		});

		let routed = self.route_edges(&positioned, edges);
		LayoutResult {
			nodes: positioned,
			edges: routed,
			cache_key: format!("force:{}", signature(nodes, edges)),
			version: None,
		}
	}

	fn place_layered(&self, nodes: &[GraphNodeSpec]) -> Vec<PositionedNode> {
		let LayoutConfig {
			node_width,
			node_height,
			horizontal_spacing,
			level_height,
			..
		} = self.config;

		let mut tiers: BTreeMap<u32, Vec<&GraphNodeSpec>> = BTreeMap::new();
		for node in nodes {
			tiers.entry(node.tier).or_default().push(node);
		}

		let mut positioned = Vec::with_capacity(nodes.len());
		for (tier, members) in tiers {
			let level_width = members.len() as f64 * horizontal_spacing;
			for (index, node) in members.into_iter().enumerate() {
				let center_x =
					-level_width / 2.0 + horizontal_spacing / 2.0 + index as f64 * horizontal_spacing;
				positioned.push(PositionedNode {
					id: node.id.clone(),
					x: center_x - node_width / 2.0,
					y: tier as f64 * level_height,
					width: node_width,
					height: node_height,
					tier,
					title: node.title.clone(),
					kind: node.kind,
				});
			}
		}
		positioned
	}

	fn route_edges(&self, nodes: &[PositionedNode], edges: &[GraphEdgeSpec]) -> Vec<RoutedEdge> {
		let mut by_id: HashMap<&str, &PositionedNode> = HashMap::with_capacity(nodes.len());
		for node in nodes {
			by_id.entry(node.id.as_str()).or_insert(node);
		}

		edges
			.iter()
			.map(|edge| {
				let points = match (by_id.get(edge.source.as_str()), by_id.get(edge.target.as_str())) {
					(Some(source), Some(target)) => route(source, target),
					_ => {
						warn!(
							"edge {} -> {} references a missing node; leaving it unrouted",
							edge.source, edge.target
						);
						Vec::new()
					}
				};
				RoutedEdge {
					source: edge.source.clone(),
					target: edge.target.clone(),
					kind: edge.kind,
					points,
				}
			})
			.collect()
	}
}

fn route(source: &PositionedNode, target: &PositionedNode) -> Vec<Point> {
	if source.id == target.id {
		let anchor = source.bottom_center();
		return vec![anchor, anchor];
	}
	let start = source.bottom_center();
	let end = target.top_center();
	let mid_y = (start.y + end.y) / 2.0;
	vec![start, Point::new(start.x, mid_y), Point::new(end.x, mid_y), end]
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::research_graph::types::{EdgeKind, StepKind};

	fn node(id: &str, tier: u32) -> GraphNodeSpec {
		GraphNodeSpec::new(id, id.to_uppercase(), StepKind::Search, tier)
	}

	fn edge(source: &str, target: &str) -> GraphEdgeSpec {
		GraphEdgeSpec::new(source, target, EdgeKind::Sequential)
	}

	fn center_x(node: &PositionedNode) -> f64 {
		node.x + node.width / 2.0
	}

	#[test]
	fn fan_out_is_centered_and_symmetric() {
		let engine = LayoutEngine::default();
		let spacing = engine.config().horizontal_spacing;
		let level = engine.config().level_height;
		let result = engine.layout(
			&[node("a", 0), node("b", 1), node("c", 1)],
			&[edge("a", "b"), edge("a", "c")],
		);

		let a = result.node("a").unwrap();
		let b = result.node("b").unwrap();
		let c = result.node("c").unwrap();
		assert_eq!(center_x(a), 0.0);
		assert_eq!(a.y, 0.0);
		assert_eq!(center_x(b), -center_x(c));
		assert_eq!(center_x(c) - center_x(b), spacing);
		assert_eq!(b.y, level);
		assert_eq!(c.y, level);

		assert_eq!(result.edges.len(), 2);
		for (routed, child) in result.edges.iter().zip([b, c]) {
			assert_eq!(routed.points.len(), 4);
			assert_eq!(routed.points[0], a.bottom_center());
			assert_eq!(routed.points[3], child.top_center());
			let mid_y = (a.y + a.height + child.y) / 2.0;
			assert_eq!(routed.points[1], Point::new(center_x(a), mid_y));
			assert_eq!(routed.points[2], Point::new(center_x(child), mid_y));
		}
	}

	#[test]
	fn empty_input_gives_empty_layout() {
		let result = LayoutEngine::default().layout(&[], &[]);
		assert!(result.nodes.is_empty());
		assert!(result.edges.is_empty());
	}

	#[test]
	fn dangling_edge_is_left_unrouted() {
		let result = LayoutEngine::default().layout(&[node("a", 0)], &[edge("a", "ghost")]);
		assert_eq!(result.edges.len(), 1);
		assert!(result.edges[0].points.is_empty());
		assert!(!result.edges[0].is_routable());
	}

	#[test]
	fn self_loop_is_a_zero_length_segment() {
		let result = LayoutEngine::default().layout(&[node("a", 0)], &[edge("a", "a")]);
		let points = &result.edges[0].points;
		assert_eq!(points.len(), 2);
		assert_eq!(points[0], points[1]);
	}

	#[test]
	fn parallel_edges_of_different_kinds_are_kept() {
		let result = LayoutEngine::default().layout(
			&[node("a", 0), node("b", 1)],
			&[
				edge("a", "b"),
				GraphEdgeSpec::new("a", "b", EdgeKind::Dependency),
			],
		);
		assert_eq!(result.edges.len(), 2);
		assert_eq!(result.edges[1].kind, EdgeKind::Dependency);
	}

	#[test]
	fn input_order_is_kept_within_a_tier() {
		let engine = LayoutEngine::default();
		let result = engine.layout(&[node("z", 2), node("y", 2), node("x", 2)], &[]);
		let xs: Vec<_> = ["z", "y", "x"]
			.iter()
			.map(|id| result.node(id).unwrap().x)
			.collect();
		assert!(xs[0] < xs[1] && xs[1] < xs[2]);
		assert!(result.nodes.iter().all(|n| n.y == 2.0 * engine.config().level_height));
	}

	#[test]
	fn force_mode_keeps_tier_rows_and_pins() {
		let engine = LayoutEngine::default();
		let nodes = [node("a", 0), node("b", 1), node("c", 1), node("d", 2)];
		let edges = [edge("a", "b"), edge("a", "c"), edge("c", "d")];
		let pins = HashMap::from([("a".to_string(), Point::new(-300.0, 15.0))]);
		let result = engine.force_directed(&nodes, &edges, &pins);

		let a = result.node("a").unwrap();
		assert_eq!((a.x, a.y), (-300.0, 15.0));
		for id in ["b", "c", "d"] {
			let n = result.node(id).unwrap();
			assert_eq!(n.y, n.tier as f64 * engine.config().level_height);
			assert!(n.x.is_finite());
		}
		assert!(result.edges.iter().all(RoutedEdge::is_routable));
		assert!(result.cache_key.starts_with("force:"));
	}
}
