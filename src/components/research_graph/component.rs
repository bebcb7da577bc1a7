use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;
use leptos::task::spawn_local;
use log::warn;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, KeyboardEvent, MouseEvent, WheelEvent, Window};

use super::config::GraphConfig;
use super::pipeline::LayoutPipeline;
use super::render;
use super::source::{GraphSource, Subscription};
use super::state::{RedrawScheduler, ViewportController};
use super::web::AnimationFrameScheduler;

type SharedController = Rc<RefCell<Option<ViewportController>>>;

/// Re-run the layout pipeline for the source's current snapshot and hand the
/// result to the controller, unless a newer version overtook it.
fn layout_refresh(
	source: Rc<dyn GraphSource>,
	pipeline: Rc<LayoutPipeline>,
	controller: SharedController,
) -> Rc<dyn Fn()> {
	Rc::new(move || {
		let snapshot = source.snapshot();
		let version = source.version();
		let request = pipeline.request(snapshot.clone(), version);
		let (pipeline, controller) = (pipeline.clone(), controller.clone());
		spawn_local(async move {
			let layout = match request.await {
				Ok(Some(layout)) => layout,
				Ok(None) => return,
				Err(err) => {
					if version < pipeline.latest_version() {
						return;
					}
					warn!("offloaded layout failed, laying out in-process: {err}");
					pipeline.layout_now(&snapshot, version)
				}
			};
			if let Some(ref mut c) = *controller.borrow_mut() {
				c.set_layout(layout);
			}
		});
	})
}

/// Undoes what the canvas registered outside the reactive graph: the source
/// subscription, the frame callback and the window resize listener.
struct CanvasTeardown {
	scheduler: Rc<AnimationFrameScheduler>,
	subscription: Rc<RefCell<Option<Subscription>>>,
	resize_cb: Rc<RefCell<Option<Closure<dyn FnMut()>>>>,
	controller: SharedController,
}

impl Drop for CanvasTeardown {
	fn drop(&mut self) {
		self.subscription.borrow_mut().take();
		self.scheduler.detach();
		if let Some(cb) = self.resize_cb.borrow_mut().take() {
			if let Some(window) = web_sys::window() {
				let _ = window
					.remove_event_listener_with_callback("resize", cb.as_ref().unchecked_ref());
			}
		}
		self.controller.borrow_mut().take();
	}
}

fn track_surface(controller: &mut ViewportController, canvas: Option<HtmlCanvasElement>) {
	if let Some(canvas) = canvas {
		let rect = canvas.get_bounding_client_rect();
		controller.set_surface_position(rect.left(), rect.top());
	}
}

/// Canvas view of a research-step graph.
///
/// Lays out whatever `source` currently holds, re-lays it out on every
/// mutation, and repaints only when the view actually changed. Drag to pan,
/// scroll or `+`/`-` to zoom, click a step to select it, `Escape` to clear.
#[component]
pub fn ResearchGraphCanvas(
	/// Graph provider. The canvas subscribes for as long as it is mounted.
	source: Rc<dyn GraphSource>,
	/// Layout, viewport and offload settings. Defaults apply when omitted.
	#[prop(optional)]
	config: Option<GraphConfig>,
	#[prop(default = false)] fullscreen: bool,
	#[prop(default = None)] width: Option<f64>,
	#[prop(default = None)] height: Option<f64>,
) -> impl IntoView {
	let config = config.unwrap_or_default();
	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let controller: SharedController = Rc::new(RefCell::new(None));
	let scheduler = Rc::new(AnimationFrameScheduler::default());
	let pipeline = Rc::new(LayoutPipeline::from_config(&config));
	let subscription: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
	let resize_cb: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
	let (controller_init, resize_cb_init) = (controller.clone(), resize_cb.clone());
	let teardown = StoredValue::new_local(CanvasTeardown {
		scheduler: scheduler.clone(),
		subscription: subscription.clone(),
		resize_cb: resize_cb.clone(),
		controller: controller.clone(),
	});
	on_cleanup(move || teardown.dispose());

	Effect::new(move |_| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		let canvas: HtmlCanvasElement = canvas.into();
		let window: Window = web_sys::window().unwrap();

		let (w, h) = if fullscreen {
			(
				window.inner_width().unwrap().as_f64().unwrap(),
				window.inner_height().unwrap().as_f64().unwrap(),
			)
		} else {
			(
				width.unwrap_or_else(|| {
					canvas
						.parent_element()
						.map(|p| p.client_width() as f64)
						.unwrap_or(800.0)
				}),
				height.unwrap_or_else(|| {
					canvas
						.parent_element()
						.map(|p| p.client_height() as f64)
						.unwrap_or(600.0)
				}),
			)
		};
		canvas.set_width(w as u32);
		canvas.set_height(h as u32);

		let ctx: CanvasRenderingContext2d = canvas
			.get_context("2d")
			.unwrap()
			.unwrap()
			.dyn_into()
			.unwrap();

		let mut c = ViewportController::new(
			config.viewport.clone(),
			scheduler.clone() as Rc<dyn RedrawScheduler>,
		);
		let rect = canvas.get_bounding_client_rect();
		c.set_viewport(rect.left(), rect.top(), w, h);
		*controller_init.borrow_mut() = Some(c);

		let controller_frame = controller_init.clone();
		scheduler.attach(move || {
			if let Some(ref mut c) = *controller_frame.borrow_mut() {
				c.on_frame(|c| {
					render::paint_frame(c, &ctx);
				});
			}
		});

		if fullscreen && resize_cb_init.borrow().is_none() {
			let (controller_resize, canvas_resize) = (controller_init.clone(), canvas.clone());
			*resize_cb_init.borrow_mut() = Some(Closure::new(move || {
				let win: Window = web_sys::window().unwrap();
				let (nw, nh) = (
					win.inner_width().unwrap().as_f64().unwrap(),
					win.inner_height().unwrap().as_f64().unwrap(),
				);
				canvas_resize.set_width(nw as u32);
				canvas_resize.set_height(nh as u32);
				let rect = canvas_resize.get_bounding_client_rect();
				if let Some(ref mut c) = *controller_resize.borrow_mut() {
					c.set_viewport(rect.left(), rect.top(), nw, nh);
				}
			}));
			if let Some(ref cb) = *resize_cb_init.borrow() {
				let _ =
					window.add_event_listener_with_callback("resize", cb.as_ref().unchecked_ref());
			}
		}

		let refresh = layout_refresh(source.clone(), pipeline.clone(), controller_init.clone());
		refresh();
		*subscription.borrow_mut() = Some(source.subscribe(refresh));
	});

	let state_md = controller.clone();
	let on_mousedown = move |ev: MouseEvent| {
		if let Some(ref mut c) = *state_md.borrow_mut() {
			track_surface(c, canvas_ref.get().map(Into::into));
			c.pointer_down(ev.client_x() as f64, ev.client_y() as f64);
		}
	};

	let state_mm = controller.clone();
	let on_mousemove = move |ev: MouseEvent| {
		if let Some(ref mut c) = *state_mm.borrow_mut() {
			track_surface(c, canvas_ref.get().map(Into::into));
			c.pointer_move(ev.client_x() as f64, ev.client_y() as f64);
		}
	};

	let state_mu = controller.clone();
	let on_mouseup = move |_: MouseEvent| {
		if let Some(ref mut c) = *state_mu.borrow_mut() {
			c.pointer_up();
		}
	};

	let state_ml = controller.clone();
	let on_mouseleave = move |_: MouseEvent| {
		if let Some(ref mut c) = *state_ml.borrow_mut() {
			c.pointer_leave();
		}
	};

	let state_wh = controller.clone();
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		if let Some(ref mut c) = *state_wh.borrow_mut() {
			c.wheel(ev.delta_y());
		}
	};

	let state_kd = controller.clone();
	let on_keydown = move |ev: KeyboardEvent| {
		if let Some(ref mut c) = *state_kd.borrow_mut() {
			if c.key_down(&ev.key()) {
				ev.prevent_default();
			}
		}
	};

	view! {
		<canvas
			node_ref=canvas_ref
			class="research-graph-canvas"
			tabindex="0"
			on:mousedown=on_mousedown
			on:mousemove=on_mousemove
			on:mouseup=on_mouseup
			on:mouseleave=on_mouseleave
			on:wheel=on_wheel
			on:keydown=on_keydown
			style="display: block; cursor: grab; outline: none;"
		/>
	}
}
