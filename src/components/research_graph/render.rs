use log::error;
use wasm_bindgen::JsValue;
use web_sys::CanvasRenderingContext2d;

use super::error::RenderError;
use super::state::ViewportController;
use super::types::{Point, PositionedNode, RoutedEdge};

const BACKGROUND: &str = "#1a1a2e";
const SELECTED_STROKE: &str = "#ffffff";
const ERROR_TEXT: &str = "rgba(255, 120, 120, 0.9)";
const DIMMED_ALPHA: f64 = 0.25;

/// The drawing calls the renderer needs from a 2D surface.
pub trait DrawSurface {
	fn save(&self);
	fn restore(&self);
	fn transform(&self, tx: f64, ty: f64, scale: f64) -> Result<(), RenderError>;
	fn set_alpha(&self, alpha: f64);
	fn fill_rect(&self, x: f64, y: f64, w: f64, h: f64, color: &str);
	fn stroke_rect(&self, x: f64, y: f64, w: f64, h: f64, color: &str, line_width: f64);
	/// Two points draw a segment, four points a cubic curve.
	fn stroke_path(&self, points: &[Point], color: &str, line_width: f64, dash: &[f64]) -> Result<(), RenderError>;
	fn fill_text(&self, text: &str, x: f64, y: f64, color: &str, font: &str) -> Result<(), RenderError>;
}

fn js_err(err: JsValue) -> RenderError {
	RenderError::Canvas(format!("{err:?}"))
}

impl DrawSurface for CanvasRenderingContext2d {
	fn save(&self) {
		CanvasRenderingContext2d::save(self);
	}

	fn restore(&self) {
		CanvasRenderingContext2d::restore(self);
	}

	fn transform(&self, tx: f64, ty: f64, scale: f64) -> Result<(), RenderError> {
		self.translate(tx, ty).map_err(js_err)?;
		self.scale(scale, scale).map_err(js_err)
	}

	fn set_alpha(&self, alpha: f64) {
		self.set_global_alpha(alpha);
	}

	fn fill_rect(&self, x: f64, y: f64, w: f64, h: f64, color: &str) {
		self.set_fill_style_str(color);
		CanvasRenderingContext2d::fill_rect(self, x, y, w, h);
	}

	fn stroke_rect(&self, x: f64, y: f64, w: f64, h: f64, color: &str, line_width: f64) {
		self.set_stroke_style_str(color);
		self.set_line_width(line_width);
		CanvasRenderingContext2d::stroke_rect(self, x, y, w, h);
	}

	fn stroke_path(&self, points: &[Point], color: &str, line_width: f64, dash: &[f64]) -> Result<(), RenderError> {
		let pattern = js_sys::Array::new();
		for segment in dash {
			pattern.push(&JsValue::from_f64(*segment));
		}
		self.set_line_dash(&pattern).map_err(js_err)?;
		self.set_stroke_style_str(color);
		self.set_line_width(line_width);
		self.begin_path();
		match points {
			[start, end] => {
				self.move_to(start.x, start.y);
				self.line_to(end.x, end.y);
			}
			[start, c1, c2, end] => {
				self.move_to(start.x, start.y);
				self.bezier_curve_to(c1.x, c1.y, c2.x, c2.y, end.x, end.y);
			}
			_ => return Ok(()),
		}
		self.stroke();
		self.set_line_dash(&js_sys::Array::new()).map_err(js_err)
	}

	fn fill_text(&self, text: &str, x: f64, y: f64, color: &str, font: &str) -> Result<(), RenderError> {
		self.set_fill_style_str(color);
		self.set_font(font);
		CanvasRenderingContext2d::fill_text(self, text, x, y).map_err(js_err)
	}
}

/// Draw one frame of the controller's current layout and viewport.
pub fn render(controller: &ViewportController, surface: &impl DrawSurface) -> Result<(), RenderError> {
	let (width, height) = controller.size();
	surface.fill_rect(0.0, 0.0, width, height, BACKGROUND);
	surface.save();
	let outcome = draw_scene(controller, surface);
	surface.set_alpha(1.0);
	surface.restore();
	outcome
}

/// Paint boundary: a failed frame is logged and replaced by an error notice.
/// The next state change paints again.
pub fn paint_frame(controller: &ViewportController, surface: &impl DrawSurface) -> bool {
	match render(controller, surface) {
		Ok(()) => true,
		Err(err) => {
			error!("graph frame failed to render: {err}");
			let (width, height) = controller.size();
			surface.fill_rect(0.0, 0.0, width, height, BACKGROUND);
			let _ = surface.fill_text(
				"Unable to draw the research graph",
				16.0,
				24.0,
				ERROR_TEXT,
				"14px sans-serif",
			);
			false
		}
	}
}

fn draw_scene(controller: &ViewportController, surface: &impl DrawSurface) -> Result<(), RenderError> {
	let (tx, ty, k) = controller.surface_transform();
	surface.transform(tx, ty, k)?;

	for edge in controller.layout().edges.iter().filter(|e| e.is_routable()) {
		draw_edge(controller, surface, edge, k)?;
	}
	for node in &controller.layout().nodes {
		draw_node(controller, surface, node, k)?;
	}
	Ok(())
}

fn draw_edge(
	controller: &ViewportController,
	surface: &impl DrawSurface,
	edge: &RoutedEdge,
	k: f64,
) -> Result<(), RenderError> {
	let style = edge.kind.style();
	let highlighted = controller.is_highlighted(&edge.source)
		&& controller.is_highlighted(&edge.target)
		&& (controller.is_hovered(&edge.source) || controller.is_hovered(&edge.target));
	let (alpha, width) = match (controller.has_active_highlight(), highlighted) {
		(false, _) => (1.0, 1.5 / k),
		(true, true) => (1.0, 2.5 / k),
		(true, false) => (DIMMED_ALPHA, 1.0 / k),
	};
	surface.set_alpha(alpha);
	let dash: Vec<f64> = style.dash.iter().map(|d| d / k).collect();
	surface.stroke_path(&edge.points, style.color, width, &dash)
}

fn draw_node(
	controller: &ViewportController,
	surface: &impl DrawSurface,
	node: &PositionedNode,
	k: f64,
) -> Result<(), RenderError> {
	let style = node.kind.style();
	let dimmed = controller.has_active_highlight() && !controller.is_highlighted(&node.id);
	surface.set_alpha(if dimmed { DIMMED_ALPHA } else { 1.0 });

	surface.fill_rect(node.x, node.y, node.width, node.height, style.fill);
	let (stroke, line_width) = if controller.is_selected(&node.id) {
		(SELECTED_STROKE, 3.0 / k)
	} else if controller.is_hovered(&node.id) {
		(style.text, 2.0 / k)
	} else {
		(style.stroke, 1.0 / k)
	};
	surface.stroke_rect(node.x, node.y, node.width, node.height, stroke, line_width);

	surface.fill_text(style.label, node.x + 8.0, node.y + 14.0, style.stroke, "10px sans-serif")?;
	surface.fill_text(
		&node.title,
		node.x + 8.0,
		node.y + node.height - 12.0,
		style.text,
		"13px sans-serif",
	)
}
