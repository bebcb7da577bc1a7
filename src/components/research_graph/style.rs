use super::types::{EdgeKind, StepKind};

/// Visual descriptor for a node of one step kind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepStyle {
	pub fill: &'static str,
	pub stroke: &'static str,
	pub text: &'static str,
	pub label: &'static str,
}

/// Visual descriptor for an edge kind. An empty `dash` draws a solid line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeStyle {
	pub color: &'static str,
	pub dash: &'static [f64],
}

impl StepKind {
	pub fn style(self) -> &'static StepStyle {
		match self {
			StepKind::Query => &StepStyle {
				fill: "#1f3b57",
				stroke: "#1f77b4",
				text: "#e6f0fa",
				label: "Query",
			},
			StepKind::Search => &StepStyle {
				fill: "#4a3415",
				stroke: "#ff7f0e",
				text: "#fff1e0",
				label: "Search",
			},
			StepKind::Read => &StepStyle {
				fill: "#1d3f1d",
				stroke: "#2ca02c",
				text: "#e5f7e5",
				label: "Read",
			},
			StepKind::Analyze => &StepStyle {
				fill: "#33284a",
				stroke: "#9467bd",
				text: "#f0e9fa",
				label: "Analyze",
			},
			StepKind::Synthesize => &StepStyle {
				fill: "#3d2a26",
				stroke: "#8c564b",
				text: "#f7ebe8",
				label: "Synthesize",
			},
			StepKind::Answer => &StepStyle {
				fill: "#153d42",
				stroke: "#17becf",
				text: "#e0fafc",
				label: "Answer",
			},
		}
	}
}

impl EdgeKind {
	pub fn style(self) -> &'static EdgeStyle {
		match self {
			EdgeKind::Sequential => &EdgeStyle {
				color: "rgba(100, 180, 255, 0.7)",
				dash: &[],
			},
			EdgeKind::Dependency => &EdgeStyle {
				color: "rgba(180, 180, 200, 0.7)",
				dash: &[8.0, 4.0],
			},
			EdgeKind::Error => &EdgeStyle {
				color: "rgba(214, 39, 40, 0.85)",
				dash: &[3.0, 3.0],
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_step_kind_has_a_distinct_style() {
		let mut strokes: Vec<_> = StepKind::ALL.iter().map(|k| k.style().stroke).collect();
		strokes.sort();
		strokes.dedup();
		assert_eq!(strokes.len(), StepKind::ALL.len());
	}

	#[test]
	fn only_sequential_edges_are_solid() {
		assert!(EdgeKind::Sequential.style().dash.is_empty());
		assert!(!EdgeKind::Dependency.style().dash.is_empty());
		assert!(!EdgeKind::Error.style().dash.is_empty());
	}
}
