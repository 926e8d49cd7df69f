use super::{RenderConfig, RenderError, RenderState, Result, Snapshot, VideoRender};
use crate::{
	ColorRange, MixedBuffer, PixelFormat, VideoFormatMetadata,
	filter::{
		VideoFilter,
		geometry::{AspectRatioMode, RotationMode, Sar},
	},
	gpu::{GpuContext, SurfaceTarget},
};

/// [VideoRender] on an OpenGL ES context.
pub struct OpenGlRender<C: GpuContext> {
	context: C,
	state: RenderState,
	config: RenderConfig,
	filter: Option<VideoFilter>,

	// Uploaded and waiting for on_render.
	pending: Option<MixedBuffer>,
}

impl<C: GpuContext> OpenGlRender<C> {
	pub fn new(context: C) -> Self {
		Self::with_config(context, RenderConfig::default())
	}

	pub fn with_config(context: C, config: RenderConfig) -> Self {
		Self {
			context,
			state: RenderState::Uninitialized,
			config,
			filter: None,
			pending: None,
		}
	}

	pub fn context(&self) -> &C {
		&self.context
	}

	pub fn filter(&self) -> Option<&VideoFilter> {
		self.filter.as_ref()
	}

	fn check_open(&self) -> Result<()> {
		match self.state {
			RenderState::Released => Err(RenderError::Released),
			RenderState::Uninitialized => Err(RenderError::NotInitialized),
			RenderState::Initialized => Err(RenderError::NoSurface),
			_ => Ok(()),
		}
	}

	// Only ever called for frames that were not presented.
	fn discard(frame: MixedBuffer) {
		frame.release(false);
	}

	fn discard_pending(&mut self) {
		if let Some(frame) = self.pending.take() {
			tracing::debug!("releasing unrendered frame");
			Self::discard(frame);
		}
	}

	/// Free the filter's GL objects, or forget them if the context can't be made current.
	fn teardown_filter(&mut self) {
		let Some(filter) = self.filter.take() else {
			return;
		};

		if self.context.has_surface() && self.context.make_current().is_ok() {
			if let Ok(gpu) = self.context.gpu() {
				filter.destroy(gpu);
				return;
			}
		}

		filter.abandon();
	}

	fn teardown(&mut self) {
		self.discard_pending();
		self.teardown_filter();
		self.context.release();
	}

	fn upload(&mut self, frame: &MixedBuffer, format: PixelFormat, range: ColorRange) -> Result<()> {
		self.attach_filter(format, range)?;

		let gpu = self.context.gpu()?;
		let filter = self.filter.as_mut().ok_or(RenderError::NotInitialized)?;
		filter.upload(gpu, frame)
	}

	fn draw(&mut self, frame: &mut MixedBuffer) -> Result<()> {
		self.context.make_current()?;
		let view = self.context.surface_size()?;

		let (width, height) = {
			let gpu = self.context.gpu()?;
			let filter = self.filter.as_mut().ok_or(RenderError::NotInitialized)?;
			filter.render(gpu, None, view, &self.config)?
		};

		self.context.swap_buffers()?;

		if let Some(metadata) = frame.video_frame_metadata_mut() {
			metadata.display_width = width;
			metadata.display_height = height;
		}

		Ok(())
	}
}

impl<C: GpuContext> VideoRender for OpenGlRender<C> {
	fn init(&mut self) -> Result<()> {
		match self.state {
			RenderState::Released => return Err(RenderError::Released),
			RenderState::Uninitialized => {}
			_ => return Ok(()),
		}

		self.context.init()?;
		self.state = RenderState::Initialized;
		tracing::info!("renderer initialized");

		Ok(())
	}

	fn set_surface(&mut self, target: SurfaceTarget) -> Result<()> {
		match self.state {
			RenderState::Released => return Err(RenderError::Released),
			RenderState::Uninitialized => return Err(RenderError::NotInitialized),
			_ => {}
		}

		if self.context.surface() == Some(target) {
			return Ok(());
		}

		if self.context.has_surface() {
			// GL objects made for the old surface don't carry over.
			self.discard_pending();
			self.teardown_filter();
			self.context.release_current();
			self.context.detach_surface();
			self.state = RenderState::Initialized;
		}

		self.context.attach_surface(target)?;
		self.state = RenderState::SurfaceBound;
		tracing::info!(?target, "surface bound");

		Ok(())
	}

	fn attach_filter(&mut self, format: PixelFormat, range: ColorRange) -> Result<()> {
		self.check_open()?;

		if !format.is_supported() {
			return Err(RenderError::UnsupportedFormat(format));
		}

		self.context.make_current()?;

		if self.filter.as_ref().is_some_and(|filter| filter.matches(format, range)) {
			return Ok(());
		}

		self.teardown_filter();

		let gpu = self.context.gpu()?;
		self.filter = Some(VideoFilter::new(gpu, format, range)?);

		if self.state == RenderState::SurfaceBound {
			self.state = RenderState::Ready;
		}

		Ok(())
	}

	fn on_input_frame(&mut self, frame: MixedBuffer) -> Result<()> {
		if let Err(err) = self.check_open() {
			Self::discard(frame);
			return Err(err);
		}

		let Some(metadata) = frame.video_frame_metadata() else {
			Self::discard(frame);
			return Err(RenderError::InvalidFrame("not a video frame".into()));
		};

		let (format, range, skip) = (metadata.format, metadata.color.range, metadata.skip_output);

		if !format.is_supported() {
			tracing::warn!(?format, "rejecting frame");
			Self::discard(frame);
			return Err(RenderError::UnsupportedFormat(format));
		}

		if skip {
			Self::discard(frame);
			return Ok(());
		}

		if let Err(err) = self.upload(&frame, format, range) {
			tracing::warn!(%err, "frame upload failed");
			Self::discard(frame);
			return Err(err);
		}

		if let Some(replaced) = self.pending.replace(frame) {
			tracing::debug!("frame replaced before render");
			Self::discard(replaced);
		}

		self.state = RenderState::Rendering;
		Ok(())
	}

	fn on_render(&mut self) -> Result<()> {
		self.check_open()?;

		let mut frame = self.pending.take().ok_or(RenderError::NoFrame)?;
		let result = self.draw(&mut frame);

		if let Err(err) = &result {
			tracing::warn!(%err, "render failed");
		}

		frame.release(result.is_ok());
		result
	}

	fn set_aspect_ratio(&mut self, mode: AspectRatioMode) {
		self.config.aspect = mode;
	}

	fn set_rotation(&mut self, rotation: RotationMode) {
		self.config.rotation = rotation;
	}

	fn set_sar(&mut self, sar: Sar) {
		self.config.sar = sar;
	}

	fn set_downscale(&mut self, factor: f32) {
		self.config.downscale = factor;
	}

	fn set_video_format(&mut self, format: &VideoFormatMetadata) {
		self.config.rotation = RotationMode::from_degrees(format.rotation as i32);
		self.config.sar = Sar::new(format.sar_num, format.sar_den);

		tracing::debug!(
			width = format.width,
			height = format.height,
			rotation = format.rotation,
			sar = %self.config.sar,
			hdr = format.hdr,
			"video format"
		);
	}

	fn snapshot(&mut self) -> Result<Snapshot> {
		self.check_open()?;
		self.context.make_current()?;

		let gpu = self.context.gpu()?;
		let filter = self.filter.as_mut().ok_or(RenderError::NoFrame)?;

		let (target, width, height) = filter.render_offscreen(gpu, &self.config)?;
		let pixels = gpu.read_pixels(Some(target), width, height)?;

		Ok(Snapshot { width, height, pixels })
	}

	fn config(&self) -> RenderConfig {
		self.config
	}

	fn state(&self) -> RenderState {
		self.state
	}

	fn release_context(&mut self) {
		if matches!(self.state, RenderState::Uninitialized | RenderState::Released) {
			return;
		}

		self.teardown();
		self.state = RenderState::Uninitialized;
		tracing::info!("render context released");
	}

	fn close(&mut self) {
		if self.state == RenderState::Released {
			return;
		}

		self.teardown();
		self.state = RenderState::Released;
		tracing::info!("renderer closed");
	}
}

impl<C: GpuContext> Drop for OpenGlRender<C> {
	fn drop(&mut self) {
		self.close();
	}
}
