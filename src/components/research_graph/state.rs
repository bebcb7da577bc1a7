use std::collections::HashSet;
use std::rc::Rc;

use super::config::ViewportConfig;
use super::types::{LayoutResult, Point, PositionedNode};

/// Hook into the host's per-frame paint cycle.
pub trait RedrawScheduler {
	/// Ask for one paint on the next frame.
	fn request_redraw(&self);
}

/// Pan/zoom/selection state, read by the renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewportState {
	pub zoom: f64,
	pub pan_x: f64,
	pub pan_y: f64,
	pub selected: Option<String>,
	pub hovered: Option<String>,
	pub dragging: bool,
	/// Pan offset minus pointer position at the start of the current drag.
	pub drag_anchor: Point,
}

impl Default for ViewportState {
	fn default() -> Self {
		Self {
			zoom: 1.0,
			pan_x: 0.0,
			pan_y: 0.0,
			selected: None,
			hovered: None,
			dragging: false,
			drag_anchor: Point::default(),
		}
	}
}

/// Owns [`ViewportState`] and the current layout; turns pointer and keyboard
/// input into state changes and coalesces them into at most one paint per frame.
pub struct ViewportController {
	config: ViewportConfig,
	state: ViewportState,
	layout: LayoutResult,
	neighbors: HashSet<String>,
	origin_x: f64,
	origin_y: f64,
	width: f64,
	height: f64,
	dirty: bool,
	scheduler: Rc<dyn RedrawScheduler>,
}

impl ViewportController {
	/// Unusable limits in `config` are repaired, see [`ViewportConfig::normalized`].
	pub fn new(config: ViewportConfig, scheduler: Rc<dyn RedrawScheduler>) -> Self {
		let config = config.normalized();
		Self {
			state: ViewportState {
				zoom: config.initial_zoom(),
				..ViewportState::default()
			},
			config,
			layout: LayoutResult::default(),
			neighbors: HashSet::new(),
			origin_x: 0.0,
			origin_y: 0.0,
			width: 0.0,
			height: 0.0,
			dirty: false,
			scheduler,
		}
	}

	pub fn viewport_state(&self) -> &ViewportState {
		&self.state
	}

	pub fn layout(&self) -> &LayoutResult {
		&self.layout
	}

	pub fn size(&self) -> (f64, f64) {
		(self.width, self.height)
	}

	/// Place the drawing surface: its top-left in device coordinates and its size.
	/// The layout origin sits at the surface center.
	pub fn set_viewport(&mut self, left: f64, top: f64, width: f64, height: f64) {
		self.origin_x = left + width / 2.0;
		self.origin_y = top + height / 2.0;
		self.width = width;
		self.height = height;
		self.mark_dirty();
	}

	/// Replace the layout. Selection and hover survive only if their node still exists.
	pub fn set_layout(&mut self, layout: LayoutResult) {
		self.layout = layout;
		if self
			.state
			.selected
			.as_deref()
			.is_some_and(|id| self.layout.node(id).is_none())
		{
			self.state.selected = None;
		}
		let hovered = self
			.state
			.hovered
			.take()
			.filter(|id| self.layout.node(id).is_some());
		self.refresh_hover(hovered);
		self.mark_dirty();
	}

	/// Follow the surface moving in the page (scrolling, reflow). Size is unchanged.
	pub fn set_surface_position(&mut self, left: f64, top: f64) {
		self.origin_x = left + self.width / 2.0;
		self.origin_y = top + self.height / 2.0;
	}

	/// Device coordinates to layout space.
	pub fn screen_to_layout(&self, x: f64, y: f64) -> Point {
		Point::new(
			(x - self.origin_x - self.state.pan_x) / self.state.zoom,
			(y - self.origin_y - self.state.pan_y) / self.state.zoom,
		)
	}

	/// Translation and scale that map layout space onto the surface.
	pub fn surface_transform(&self) -> (f64, f64, f64) {
		(
			self.width / 2.0 + self.state.pan_x,
			self.height / 2.0 + self.state.pan_y,
			self.state.zoom,
		)
	}

	/// First node whose box contains the device point.
	pub fn node_at(&self, x: f64, y: f64) -> Option<&PositionedNode> {
		let p = self.screen_to_layout(x, y);
		self.layout.nodes.iter().find(|node| node.contains(p.x, p.y))
	}

	pub fn pointer_down(&mut self, x: f64, y: f64) {
		if let Some(id) = self.node_at(x, y).map(|n| n.id.clone()) {
			self.select(Some(id));
			return;
		}
		self.state.dragging = true;
		self.state.drag_anchor = Point::new(self.state.pan_x - x, self.state.pan_y - y);
	}

	pub fn pointer_move(&mut self, x: f64, y: f64) {
		if self.state.dragging {
			self.state.pan_x = self.state.drag_anchor.x + x;
			self.state.pan_y = self.state.drag_anchor.y + y;
			self.mark_dirty();
		} else {
			let hovered = self.node_at(x, y).map(|n| n.id.clone());
			self.set_hover(hovered);
		}
	}

	pub fn pointer_up(&mut self) {
		self.state.dragging = false;
	}

	pub fn pointer_leave(&mut self) {
		self.state.dragging = false;
		self.set_hover(None);
	}

	/// Wheel input: positive `delta_y` zooms out, negative zooms in.
	pub fn wheel(&mut self, delta_y: f64) {
		if delta_y > 0.0 {
			self.zoom_out();
		} else if delta_y < 0.0 {
			self.zoom_in();
		}
	}

	/// Keyboard shortcuts. Returns whether the key was used.
	pub fn key_down(&mut self, key: &str) -> bool {
		let step = self.config.pan_step;
		match key {
			"+" | "=" => self.zoom_in(),
			"-" | "_" => self.zoom_out(),
			"0" => self.reset(),
			"ArrowLeft" => self.pan_by(step, 0.0),
			"ArrowRight" => self.pan_by(-step, 0.0),
			"ArrowUp" => self.pan_by(0.0, step),
			"ArrowDown" => self.pan_by(0.0, -step),
			"Escape" => self.select(None),
			_ => return false,
		}
		true
	}

	pub fn zoom_in(&mut self) {
		self.zoom_by(self.config.zoom_step);
	}

	pub fn zoom_out(&mut self) {
		self.zoom_by(1.0 / self.config.zoom_step);
	}

	/// Multiply the zoom, clamped to the configured range. Anchored at the surface
	/// center: the layout point under the center stays put.
	pub fn zoom_by(&mut self, factor: f64) {
		if !factor.is_finite() || factor <= 0.0 {
			return;
		}
		let zoom = (self.state.zoom * factor).clamp(self.config.min_zoom, self.config.max_zoom);
		if zoom != self.state.zoom {
			let ratio = zoom / self.state.zoom;
			self.state.pan_x *= ratio;
			self.state.pan_y *= ratio;
			self.state.zoom = zoom;
			self.mark_dirty();
		}
	}

	pub fn pan_by(&mut self, dx: f64, dy: f64) {
		self.state.pan_x += dx;
		self.state.pan_y += dy;
		self.mark_dirty();
	}

	pub fn select(&mut self, id: Option<String>) {
		if self.state.selected != id {
			self.state.selected = id;
			self.mark_dirty();
		}
	}

	/// Zoom 1 (or the nearest allowed zoom), no pan, no selection.
	pub fn reset(&mut self) {
		self.state.zoom = self.config.initial_zoom();
		self.state.pan_x = 0.0;
		self.state.pan_y = 0.0;
		self.state.selected = None;
		self.state.dragging = false;
		self.mark_dirty();
	}

	fn set_hover(&mut self, id: Option<String>) {
		if self.state.hovered != id {
			self.refresh_hover(id);
		}
	}

	fn refresh_hover(&mut self, id: Option<String>) {
		self.neighbors.clear();
		if let Some(hovered) = &id {
			for edge in &self.layout.edges {
				if &edge.source == hovered {
					self.neighbors.insert(edge.target.clone());
				} else if &edge.target == hovered {
					self.neighbors.insert(edge.source.clone());
				}
			}
		}
		self.state.hovered = id;
		self.mark_dirty();
	}

	pub fn is_hovered(&self, id: &str) -> bool {
		self.state.hovered.as_deref() == Some(id)
	}

	pub fn is_selected(&self, id: &str) -> bool {
		self.state.selected.as_deref() == Some(id)
	}

	/// The hovered node or one of its direct neighbours.
	pub fn is_highlighted(&self, id: &str) -> bool {
		self.is_hovered(id) || self.neighbors.contains(id)
	}

	pub fn has_active_highlight(&self) -> bool {
		self.state.hovered.is_some()
	}

	pub fn is_dirty(&self) -> bool {
		self.dirty
	}

	/// Force a repaint, e.g. after the surface lost its contents.
	pub fn invalidate(&mut self) {
		self.mark_dirty();
	}

	fn mark_dirty(&mut self) {
		if !self.dirty {
			self.dirty = true;
			self.scheduler.request_redraw();
		}
	}

	/// Per-frame hook: paints once if anything changed since the last frame.
	pub fn on_frame(&mut self, paint: impl FnOnce(&ViewportController)) -> bool {
		if !self.dirty {
			return false;
		}
		self.dirty = false;
		paint(self);
		true
	}
}
