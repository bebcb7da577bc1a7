use std::rc::Rc;

use leptos::prelude::*;

use crate::components::research_graph::config::OffloadConfig;
use crate::components::research_graph::types::{EdgeKind, StepKind};
use crate::components::research_graph::{GraphConfig, GraphSource, MemoryGraphSource, ResearchGraphCanvas};

/// Served next to the app by trunk (see `index.html`).
const LAYOUT_WORKER_URL: &str = "./layout-worker.js";

/// Canvas settings for the host page: layout runs in the background worker.
fn canvas_config() -> GraphConfig {
	GraphConfig {
		offload: OffloadConfig {
			worker_url: Some(LAYOUT_WORKER_URL.into()),
			..OffloadConfig::default()
		},
		..GraphConfig::default()
	}
}

/// Sample research run: one question fanning out into searches and reads
/// that converge on a synthesis.
fn sample_source() -> MemoryGraphSource {
	let source = MemoryGraphSource::default();
	let steps = [
		("q", "What limits battery density?", StepKind::Query, 0),
		("s1", "Search: solid-state cells", StepKind::Search, 1),
		("s2", "Search: lithium-metal anodes", StepKind::Search, 1),
		("s3", "Search: cathode chemistry", StepKind::Search, 1),
		("r1", "Read: dendrite review", StepKind::Read, 2),
		("r2", "Read: electrolyte survey", StepKind::Read, 2),
		("a1", "Compare energy densities", StepKind::Analyze, 3),
		("y", "Synthesize findings", StepKind::Synthesize, 4),
		("ans", "Answer", StepKind::Answer, 5),
	];
	for (id, title, kind, tier) in steps {
		source.add_step(id, title, kind, tier);
	}
	let edges = [
		("q", "s1", EdgeKind::Sequential),
		("q", "s2", EdgeKind::Sequential),
		("q", "s3", EdgeKind::Sequential),
		("s1", "r1", EdgeKind::Sequential),
		("s2", "r2", EdgeKind::Sequential),
		("s3", "r2", EdgeKind::Error),
		("r1", "a1", EdgeKind::Dependency),
		("r2", "a1", EdgeKind::Dependency),
		("a1", "y", EdgeKind::Sequential),
		("y", "ans", EdgeKind::Sequential),
	];
	for (source_id, target_id, kind) in edges {
		source.connect(source_id, target_id, kind);
	}
	source
}

/// Default Home Page
#[component]
pub fn Home() -> impl IntoView {
	let source = sample_source();
	let graph: Rc<dyn GraphSource> = Rc::new(source.clone());

	let adder = source.clone();
	let add_step = move |_| {
		let n = adder.len();
		let previous = adder.snapshot().nodes.last().map(|node| (node.id.clone(), node.tier));
		let kind = StepKind::ALL[n % StepKind::ALL.len()];
		let tier = previous.as_ref().map_or(0, |(_, tier)| tier + 1);
		let id = format!("step-{n}");
		adder.add_step(id.clone(), format!("Follow-up {n}"), kind, tier);
		if let Some((previous_id, _)) = previous {
			adder.connect(previous_id, id, EdgeKind::Sequential);
		}
	};

	let clearer = source;
	let clear = move |_| clearer.clear();

	view! {
		<div class="fullscreen-graph">
			<ResearchGraphCanvas source=graph config=canvas_config() fullscreen=true />
			<div class="graph-overlay">
				<h1>"Research Graph"</h1>
				<p class="subtitle">
					"Drag to pan. Scroll or +/- to zoom. 0 resets the view. Click a step to select it, Esc to clear."
				</p>
				<button on:click=add_step>"Add step"</button>
				<button on:click=clear>"Clear"</button>
			</div>
		</div>
	}
}
