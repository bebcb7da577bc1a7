use serde::{Deserialize, Serialize};

/// Top-level configuration for the research graph canvas.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
	pub layout: LayoutConfig,
	pub viewport: ViewportConfig,
	pub offload: OffloadConfig,
}

impl GraphConfig {
	/// Parse a (possibly partial) JSON configuration; missing keys take their defaults.
	pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(json)
	}
}

/// Geometry and simulation constants for [`super::layout::LayoutEngine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
	pub node_width: f64,
	pub node_height: f64,
	/// Distance between the left edges of neighbouring nodes in one tier.
	pub horizontal_spacing: f64,
	/// Distance between the tops of consecutive tiers.
	pub level_height: f64,
	pub force_iterations: usize,
	pub force_charge: f32,
	pub force_spring: f32,
	pub force_max: f32,
	pub node_speed: f32,
	pub damping_factor: f32,
}

impl Default for LayoutConfig {
	fn default() -> Self {
		Self {
			node_width: 160.0,
			node_height: 48.0,
			horizontal_spacing: 200.0,
			level_height: 120.0,
			force_iterations: 100,
			force_charge: 150.0,
			force_spring: 0.05,
			force_max: 100.0,
			node_speed: 3000.0,
			damping_factor: 0.9,
		}
	}
}

/// Zoom and pan limits for [`super::state::ViewportController`].
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
	pub min_zoom: f64,
	pub max_zoom: f64,
	/// Multiplier applied per zoom-in step; zoom-out divides by it.
	pub zoom_step: f64,
	/// Pan distance in device pixels for one arrow key press.
	pub pan_step: f64,
}

impl Default for ViewportConfig {
	fn default() -> Self {
		Self {
			min_zoom: 0.1,
			max_zoom: 10.0,
			zoom_step: 1.1,
			pan_step: 40.0,
		}
	}
}

impl ViewportConfig {
	/// Repair limits that would make zooming misbehave: non-finite or
	/// non-positive bounds fall back to the defaults, reversed bounds are
	/// swapped, and a zoom step that is not finite and above 1 becomes the
	/// default step.
	pub fn normalized(self) -> Self {
		let defaults = Self::default();
		let positive = |v: f64, fallback: f64| if v.is_finite() && v > 0.0 { v } else { fallback };
		let min_zoom = positive(self.min_zoom, defaults.min_zoom);
		let max_zoom = positive(self.max_zoom, defaults.max_zoom);
		let zoom_step = if self.zoom_step.is_finite() && self.zoom_step > 1.0 {
			self.zoom_step
		} else {
			defaults.zoom_step
		};
		Self {
			min_zoom: min_zoom.min(max_zoom),
			max_zoom: min_zoom.max(max_zoom),
			zoom_step,
			pan_step: if self.pan_step.is_finite() { self.pan_step } else { defaults.pan_step },
		}
	}

	/// Zoom 1, pulled into the allowed range.
	pub fn initial_zoom(&self) -> f64 {
		1.0_f64.clamp(self.min_zoom, self.max_zoom)
	}
}

/// Settings for [`super::offload::LayoutOffloadChannel`] and the layout cache.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct OffloadConfig {
	pub timeout_ms: u64,
	/// Script that hosts the background layout worker. `None` keeps layout in-process.
	pub worker_url: Option<String>,
	pub cache_capacity: usize,
}

impl Default for OffloadConfig {
	fn default() -> Self {
		Self {
			timeout_ms: 5000,
			worker_url: None,
			cache_capacity: 100,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_json_keeps_defaults() {
		let config = GraphConfig::from_json(r#"{"offload": {"timeout_ms": 250}}"#).unwrap();
		assert_eq!(config.offload.timeout_ms, 250);
		assert_eq!(config.offload.cache_capacity, 100);
		assert_eq!(config.layout, LayoutConfig::default());
		assert_eq!(config.viewport.max_zoom, 10.0);
	}

	#[test]
	fn normalized_repairs_unusable_zoom_limits() {
		let config = GraphConfig::from_json(r#"{"viewport": {"min_zoom": 20, "zoom_step": 0.5}}"#)
			.unwrap()
			.viewport
			.normalized();
		assert_eq!((config.min_zoom, config.max_zoom), (10.0, 20.0));
		assert_eq!(config.zoom_step, 1.1);
		assert_eq!(config.initial_zoom(), 10.0);

		let defaults = ViewportConfig::default();
		assert_eq!(defaults.clone().normalized(), defaults);
		assert_eq!(defaults.initial_zoom(), 1.0);
	}

	#[test]
	fn rejects_malformed_json() {
		assert!(GraphConfig::from_json("{ layout: ").is_err());
	}
}
