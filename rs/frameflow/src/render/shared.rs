use std::sync::{Arc, Mutex, MutexGuard};

use super::{RenderError, Result, VideoRender};
use crate::MixedBuffer;

/// A renderer handle that can be cloned across owners, driven from one render thread.
///
/// One lock covers the whole input and render sequence, so a frame can't be replaced between
/// its upload and its draw. The lock does not move the GL context: it stays current on the
/// thread that first rendered, and frames rendered from any other thread fail with
/// [RenderError::ContextAffinity] and are released unpresented. Hand frames to the render thread
/// instead of rendering them where they were decoded.
#[derive(Clone)]
pub struct SharedRender {
	inner: Arc<Mutex<Box<dyn VideoRender>>>,
}

impl SharedRender {
	pub fn new(render: impl VideoRender + 'static) -> Self {
		Self {
			inner: Arc::new(Mutex::new(Box::new(render))),
		}
	}

	/// Lock the renderer for a sequence of calls.
	///
	/// A panic while holding the lock leaves the renderer in an unknown state, so it is reported
	/// as released.
	pub fn lock(&self) -> Result<MutexGuard<'_, Box<dyn VideoRender>>> {
		self.inner.lock().map_err(|_| RenderError::Released)
	}

	/// Upload and present one frame under a single lock.
	pub fn render_frame(&self, frame: MixedBuffer) -> Result<()> {
		let mut render = match self.lock() {
			Ok(render) => render,
			Err(err) => {
				frame.release(false);
				return Err(err);
			}
		};

		render.on_input_frame(frame)?;
		render.on_render()
	}

	pub fn close(&self) {
		match self.inner.lock() {
			Ok(mut render) => render.close(),
			Err(poisoned) => poisoned.into_inner().close(),
		}
	}
}
