//! Putting decoded frames on screen.
//!
//! A [VideoRender] owns every frame between [VideoRender::on_input_frame] and the end of the
//! following [VideoRender::on_render], and releases each one back to its decoder exactly once:
//! with `render = true` when it was presented, `false` on every other path.

mod opengl;
mod shared;

pub use opengl::OpenGlRender;
pub use shared::SharedRender;

use crate::{
	ColorRange, MixedBuffer, PixelFormat, VideoFormatMetadata,
	filter::geometry::{AspectRatioMode, RotationMode, Sar},
	gpu::SurfaceTarget,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
	#[error("egl: {0}")]
	Egl(String),

	#[error("context is current on another thread")]
	ContextAffinity,

	#[error("no surface")]
	NoSurface,

	#[error("not initialized")]
	NotInitialized,

	#[error("released")]
	Released,

	#[error("unsupported pixel format: {0:?}")]
	UnsupportedFormat(PixelFormat),

	#[error("invalid frame: {0}")]
	InvalidFrame(String),

	#[error("shader: {0}")]
	Shader(String),

	#[error("gpu: {0}")]
	Gpu(String),

	#[error("no frame to render")]
	NoFrame,
}

impl RenderError {
	/// An integer code for the error, negative like the decode codes.
	pub fn code(&self) -> i32 {
		match self {
			Self::Egl(_) => -1,
			Self::ContextAffinity => -2,
			Self::NoSurface => -3,
			Self::NotInitialized => -4,
			Self::Released => -5,
			Self::UnsupportedFormat(_) => -6,
			Self::InvalidFrame(_) => -7,
			Self::Shader(_) => -8,
			Self::Gpu(_) => -9,
			Self::NoFrame => -10,
		}
	}

	/// The frame was rejected; the renderer itself is fine.
	pub fn is_input_error(&self) -> bool {
		matches!(self, Self::UnsupportedFormat(_) | Self::InvalidFrame(_))
	}
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderState {
	Uninitialized,

	/// The GPU context exists.
	Initialized,

	/// A surface is attached.
	SurfaceBound,

	/// A filter is built for the incoming format.
	Ready,

	/// Frames are flowing.
	Rendering,

	/// Closed for good.
	Released,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
	pub aspect: AspectRatioMode,
	pub rotation: RotationMode,
	pub sar: Sar,

	/// Divides the off-screen size; 1.0 keeps full resolution.
	pub downscale: f32,

	pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
	fn default() -> Self {
		Self {
			aspect: AspectRatioMode::default(),
			rotation: RotationMode::default(),
			sar: Sar::default(),
			downscale: 1.0,
			clear_color: [0.0, 0.0, 0.0, 1.0],
		}
	}
}

/// RGBA pixels read back from the GPU, bottom row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
	pub width: u32,
	pub height: u32,
	pub pixels: Vec<u8>,
}

impl Snapshot {
	/// The rows in top-down order, as image files expect them.
	pub fn top_down(&self) -> Vec<u8> {
		let row = self.width as usize * 4;
		if row == 0 {
			return Vec::new();
		}
		self.pixels.chunks_exact(row).rev().flatten().copied().collect()
	}
}

/// A video renderer. All calls for one renderer happen on one thread at a time.
pub trait VideoRender: Send {
	/// Create the GPU context.
	fn init(&mut self) -> Result<()>;

	/// Bind the renderer to a surface, tearing down the resources of the previous one.
	fn set_surface(&mut self, target: SurfaceTarget) -> Result<()>;

	/// Build the filter for a pixel format, unless the current one already matches.
	fn attach_filter(&mut self, format: PixelFormat, range: ColorRange) -> Result<()>;

	/// Take ownership of a decoded frame and upload it.
	///
	/// The frame is released right away if it is rejected or can't be uploaded.
	fn on_input_frame(&mut self, frame: MixedBuffer) -> Result<()>;

	/// Draw and present the uploaded frame, then release it.
	fn on_render(&mut self) -> Result<()>;

	fn set_aspect_ratio(&mut self, mode: AspectRatioMode);

	fn set_rotation(&mut self, rotation: RotationMode);

	fn set_sar(&mut self, sar: Sar);

	fn set_downscale(&mut self, factor: f32);

	/// Apply the rotation and SAR a decoder reported.
	fn set_video_format(&mut self, format: &VideoFormatMetadata);

	/// Draw the last frame off-screen and read it back.
	fn snapshot(&mut self) -> Result<Snapshot>;

	fn config(&self) -> RenderConfig;

	fn state(&self) -> RenderState;

	/// Destroy the GPU context. [VideoRender::init] may be called again afterwards.
	fn release_context(&mut self);

	/// Destroy everything; later calls fail with [RenderError::Released].
	fn close(&mut self);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_codes() {
		assert_eq!(RenderError::Egl("x".into()).code(), -1);
		assert_eq!(RenderError::NoFrame.code(), -10);

		assert!(RenderError::UnsupportedFormat(PixelFormat::Unknown(7)).is_input_error());
		assert!(RenderError::InvalidFrame("x".into()).is_input_error());
		assert!(!RenderError::ContextAffinity.is_input_error());
	}

	#[test]
	fn test_snapshot_top_down() {
		let snapshot = Snapshot {
			width: 1,
			height: 2,
			pixels: vec![1, 1, 1, 1, 2, 2, 2, 2],
		};
		assert_eq!(snapshot.top_down(), vec![2, 2, 2, 2, 1, 1, 1, 1]);
	}
}
