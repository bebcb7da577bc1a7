//! Browser backends: Web Worker offload, `setTimeout` timeouts and
//! `requestAnimationFrame` redraws.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use log::warn;
use wasm_bindgen::prelude::*;
use web_sys::{ErrorEvent, MessageEvent, Worker};

use super::error::OffloadError;
use super::offload::{LayoutWorker, ResponseHandle, Timer};
use super::protocol::{LayoutRequest, WorkerMessage};
use super::state::RedrawScheduler;

/// [`Timer`] on top of `window.setTimeout`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowTimer;

impl Timer for WindowTimer {
	fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
		let (tx, rx) = oneshot::channel::<()>();
		let callback = Closure::once_into_js(move || {
			let _ = tx.send(());
		});
		let scheduled = web_sys::window().map(|window| {
			window.set_timeout_with_callback_and_timeout_and_arguments_0(
				callback.unchecked_ref(),
				duration.as_millis().min(i32::MAX as u128) as i32,
			)
		});
		if !matches!(scheduled, Some(Ok(_))) {
			warn!("could not schedule a layout timeout; the request can only settle by reply");
		}
		async move {
			let _ = rx.await;
		}
		.boxed_local()
	}
}

/// A dedicated Web Worker running the layout handler.
///
/// The worker script is expected to load this crate's wasm module and answer
/// each string message with `handleLayoutMessage(message)`. The crate ships
/// one as `worker/layout-worker.js`; trunk builds its wasm module and serves
/// both next to the app.
pub struct WebLayoutWorker {
	worker: Worker,
	_on_message: Closure<dyn FnMut(MessageEvent)>,
	_on_error: Closure<dyn FnMut(ErrorEvent)>,
}

impl WebLayoutWorker {
	#[cfg(target_arch = "wasm32")]
	pub fn spawn(script_url: &str, responses: ResponseHandle) -> Result<Self, OffloadError> {
		let worker =
			Worker::new(script_url).map_err(|e| OffloadError::Unavailable(format!("{e:?}")))?;

		let inbound = responses.clone();
		let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
			match event.data().as_string() {
				Some(json) => inbound.deliver_json(&json),
				None => warn!("layout worker sent a non-string message"),
			}
		});
		worker.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

		let on_error = Closure::<dyn FnMut(ErrorEvent)>::new(move |event: ErrorEvent| {
			responses.fail(event.message());
		});
		worker.set_onerror(Some(on_error.as_ref().unchecked_ref()));

		Ok(Self {
			worker,
			_on_message: on_message,
			_on_error: on_error,
		})
	}

	#[cfg(not(target_arch = "wasm32"))]
	pub fn spawn(script_url: &str, _responses: ResponseHandle) -> Result<Self, OffloadError> {
		Err(OffloadError::Unavailable(format!(
			"cannot start {script_url}: Web Workers require a browser"
		)))
	}
}

impl LayoutWorker for WebLayoutWorker {
	fn post(&self, request: &LayoutRequest) -> Result<(), OffloadError> {
		let json = WorkerMessage::LayoutGraph(request.clone()).to_json()?;
		self.worker
			.post_message(&JsValue::from_str(&json))
			.map_err(|e| OffloadError::Worker(format!("postMessage failed: {e:?}")))
	}

	fn terminate(&self) {
		self.worker.set_onmessage(None);
		self.worker.set_onerror(None);
		self.worker.terminate();
	}
}

/// [`RedrawScheduler`] that books at most one animation frame at a time.
///
/// The per-frame callback usually captures the controller, which in turn holds
/// this scheduler. [`AnimationFrameScheduler::detach`] breaks that cycle.
#[derive(Default)]
pub struct AnimationFrameScheduler {
	scheduled: Cell<bool>,
	on_frame: RefCell<Option<Box<dyn FnMut()>>>,
	#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
	frame: RefCell<Option<Closure<dyn FnMut()>>>,
}

impl AnimationFrameScheduler {
	/// Install the per-frame callback and book the first frame.
	pub fn attach(self: &Rc<Self>, on_frame: impl FnMut() + 'static) {
		*self.on_frame.borrow_mut() = Some(Box::new(on_frame));
		#[cfg(target_arch = "wasm32")]
		if self.frame.borrow().is_none() {
			let this = Rc::downgrade(self);
			*self.frame.borrow_mut() = Some(Closure::<dyn FnMut()>::new(move || {
				if let Some(this) = this.upgrade() {
					this.run_frame();
				}
			}));
		}
		self.scheduled.set(false);
		self.request_redraw();
	}

	/// Drop the per-frame callback and everything it captured. A frame that is
	/// already booked runs as a no-op.
	pub fn detach(&self) {
		let callback = self.on_frame.borrow_mut().take();
		drop(callback);
	}

	pub fn is_attached(&self) -> bool {
		// Borrowed mutably only while the callback runs.
		self.on_frame.try_borrow().map_or(true, |f| f.is_some())
	}

	#[cfg(target_arch = "wasm32")]
	fn run_frame(&self) {
		self.scheduled.set(false);
		if let Some(callback) = self.on_frame.borrow_mut().as_mut() {
			callback();
		}
	}

	#[cfg(target_arch = "wasm32")]
	fn book_frame(&self) -> bool {
		let frame = self.frame.borrow();
		let (Some(callback), Some(window)) = (frame.as_ref(), web_sys::window()) else {
			return false;
		};
		window
			.request_animation_frame(callback.as_ref().unchecked_ref())
			.is_ok()
	}

	#[cfg(not(target_arch = "wasm32"))]
	fn book_frame(&self) -> bool {
		false
	}
}

impl RedrawScheduler for AnimationFrameScheduler {
	fn request_redraw(&self) {
		if self.scheduled.get() || !self.is_attached() {
			return;
		}
		self.scheduled.set(self.book_frame());
	}
}
