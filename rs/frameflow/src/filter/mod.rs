//! Turning an uploaded frame into a textured quad.
//!
//! [BaseFilter] owns the GL program, the quad geometry and an optional off-screen target.
//! [VideoFilter] adds what depends on the pixel format: shaders, plane uploads and the color matrix.

pub mod color;
pub mod geometry;
pub mod texture;

use crate::{
	BufferContext, ColorDescription, ColorRange, MixedBuffer, PixelFormat,
	gpu::{DrawPass, Gpu, ProgramId, RenderTargetId, TextureId, TextureTarget},
	render::{RenderConfig, RenderError, Result},
	shader,
};

use geometry::{GeometryCache, GeometryParams, RotationMode};
use texture::TextureSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Offscreen {
	target: RenderTargetId,
	width: u32,
	height: u32,
}

/// A compiled program, the quad, and an off-screen target sized to the frame.
#[derive(Debug)]
pub struct BaseFilter {
	program: ProgramId,
	geometry: GeometryCache,
	offscreen: Option<Offscreen>,
	logical: (u32, u32),
}

impl BaseFilter {
	pub fn new(gpu: &dyn Gpu, vertex: &str, fragment: &str) -> Result<Self> {
		let program = gpu.create_program(vertex, fragment)?;

		Ok(Self {
			program,
			geometry: GeometryCache::default(),
			offscreen: None,
			logical: (0, 0),
		})
	}

	pub fn program(&self) -> ProgramId {
		self.program
	}

	/// The frame size after rotation and down-scaling.
	pub fn logical_size(&self) -> (u32, u32) {
		self.logical
	}

	pub fn offscreen(&self) -> Option<RenderTargetId> {
		self.offscreen.map(|offscreen| offscreen.target)
	}

	/// Recompute the logical size and, when `offscreen` is set, make sure the off-screen target
	/// matches it. The target is only recreated when the size actually changes.
	pub fn update_param(
		&mut self,
		gpu: &dyn Gpu,
		width: u32,
		height: u32,
		rotation: RotationMode,
		downscale: f32,
		offscreen: bool,
	) -> Result<(u32, u32)> {
		let (width, height) = match rotation.swaps_axes() {
			true => (height, width),
			false => (width, height),
		};

		let downscale = if downscale.is_finite() { downscale.max(1.0) } else { 1.0 };
		let scale = |size: u32| ((size as f32 / downscale).round() as u32).max(1);
		self.logical = (scale(width), scale(height));

		if !offscreen {
			return Ok(self.logical);
		}

		let (width, height) = self.logical;
		match self.offscreen {
			Some(current) if (current.width, current.height) == self.logical => {}
			current => {
				if let Some(current) = current {
					gpu.delete_render_target(current.target);
				}
				self.offscreen = None;

				let target = gpu.create_render_target(width, height)?;
				self.offscreen = Some(Offscreen { target, width, height });
				tracing::debug!(width, height, "offscreen target allocated");
			}
		}

		Ok(self.logical)
	}

	/// Draw the quad. Geometry is only recomputed when `params` differ from the last draw.
	pub fn draw(
		&mut self,
		gpu: &dyn Gpu,
		target: Option<RenderTargetId>,
		textures: &[(TextureId, TextureTarget)],
		crops: &[(f32, f32)],
		color_matrix: Option<&[f32; 9]>,
		params: GeometryParams,
		clear: [f32; 4],
	) -> Result<()> {
		let geometry = self.geometry.update(params);

		gpu.draw(&DrawPass {
			program: self.program,
			target,
			viewport: (params.view_width, params.view_height),
			textures,
			crops,
			color_matrix,
			vertices: &geometry.vertices,
			tex_coords: &geometry.tex_coords,
			clear,
		})
	}

	pub fn geometry(&self) -> &GeometryCache {
		&self.geometry
	}

	pub fn destroy(self, gpu: &dyn Gpu) {
		if let Some(offscreen) = self.offscreen {
			gpu.delete_render_target(offscreen.target);
		}
		gpu.delete_program(self.program);
	}
}

// What the last upload looked like; enough to draw it again.
#[derive(Debug, Clone)]
struct UploadedFrame {
	width: u32,
	height: u32,
	crops: Vec<(f32, f32)>,
	color: ColorDescription,
}

/// The filter for one pixel format and color range.
#[derive(Debug)]
pub struct VideoFilter {
	base: BaseFilter,
	format: PixelFormat,
	range: ColorRange,
	textures: TextureSet,
	frame: Option<UploadedFrame>,
}

impl VideoFilter {
	pub fn new(gpu: &dyn Gpu, format: PixelFormat, range: ColorRange) -> Result<Self> {
		let count = shader::texture_count(format)?;
		let vertex = shader::vertex_shader(count)?;
		let fragment = shader::fragment_shader(format, range)?;

		let base = BaseFilter::new(gpu, &vertex, &fragment)?;
		tracing::info!(?format, ?range, "filter built");

		Ok(Self {
			base,
			format,
			range,
			textures: TextureSet::default(),
			frame: None,
		})
	}

	pub fn format(&self) -> PixelFormat {
		self.format
	}

	pub fn range(&self) -> ColorRange {
		self.range
	}

	pub fn matches(&self, format: PixelFormat, range: ColorRange) -> bool {
		self.format == format && self.range == range
	}

	pub fn base(&self) -> &BaseFilter {
		&self.base
	}

	/// Copy the frame's planes into textures, or latch its surface for hardware frames.
	pub fn upload(&mut self, gpu: &dyn Gpu, frame: &MixedBuffer) -> Result<()> {
		let metadata = frame
			.video_frame_metadata()
			.ok_or_else(|| RenderError::InvalidFrame("not a video frame".into()))?;

		if metadata.format != self.format {
			return Err(RenderError::InvalidFrame(format!(
				"{:?} frame given to the {:?} filter",
				metadata.format, self.format
			)));
		}

		let descs = texture::plane_descs(metadata)?;
		let surface = match self.format.is_hardware() {
			true => Some(
				metadata
					.context()
					.and_then(BufferContext::surface)
					.ok_or_else(|| RenderError::InvalidFrame("hardware frame without a surface".into()))?,
			),
			false => None,
		};

		// Nothing is drawable until an upload succeeds again.
		self.frame = None;
		self.textures.prepare(gpu, &descs)?;

		for (plane, (id, desc)) in self.textures.slots().iter().enumerate() {
			match surface {
				Some(surface) => gpu.bind_external_texture(*id, surface, plane)?,
				None => {
					let data = frame
						.plane(plane)
						.ok_or_else(|| RenderError::InvalidFrame(format!("plane {plane} has no data")))?;
					gpu.upload_texture(*id, desc, data)?;
				}
			}
		}

		self.frame = Some(UploadedFrame {
			width: metadata.width,
			height: metadata.height,
			crops: texture::plane_crops(metadata, &descs),
			color: metadata.color,
		});

		Ok(())
	}

	fn params(frame: &UploadedFrame, view: (u32, u32), config: &RenderConfig) -> GeometryParams {
		GeometryParams {
			frame_width: frame.width,
			frame_height: frame.height,
			view_width: view.0,
			view_height: view.1,
			aspect: config.aspect,
			rotation: config.rotation,
			sar: config.sar,
		}
	}

	fn color_matrix(&self, frame: &UploadedFrame) -> Option<&'static [f32; 9]> {
		let bit_depth = match self.format {
			PixelFormat::Yuv420P10LE => 10,
			_ => 8,
		};

		self.format
			.is_yuv()
			.then(|| color::select_for_depth(frame.color.space, self.range, bit_depth))
	}

	/// Draw the last uploaded frame into `view`, the surface when `target` is `None`.
	///
	/// Returns the frame's logical size after rotation and down-scaling.
	pub fn render(
		&mut self,
		gpu: &dyn Gpu,
		target: Option<RenderTargetId>,
		view: (u32, u32),
		config: &RenderConfig,
	) -> Result<(u32, u32)> {
		let frame = self.frame.clone().ok_or(RenderError::NoFrame)?;
		let logical = self
			.base
			.update_param(gpu, frame.width, frame.height, config.rotation, config.downscale, false)?;

		let textures = self.textures.bindings();
		let matrix = self.color_matrix(&frame);
		let params = Self::params(&frame, view, config);

		self.base
			.draw(gpu, target, &textures, &frame.crops, matrix, params, config.clear_color)?;

		Ok(logical)
	}

	/// Draw the last uploaded frame into the off-screen target at its logical size.
	pub fn render_offscreen(&mut self, gpu: &dyn Gpu, config: &RenderConfig) -> Result<(RenderTargetId, u32, u32)> {
		let frame = self.frame.clone().ok_or(RenderError::NoFrame)?;
		let (width, height) = self
			.base
			.update_param(gpu, frame.width, frame.height, config.rotation, config.downscale, true)?;

		let target = self
			.base
			.offscreen()
			.ok_or_else(|| RenderError::Gpu("offscreen target missing".into()))?;

		let textures = self.textures.bindings();
		let matrix = self.color_matrix(&frame);

		// The target already has the rotated shape, so the quad covers it exactly.
		let mut params = Self::params(&frame, (width, height), config);
		params.sar = geometry::Sar::SQUARE;
		params.aspect = geometry::AspectRatioMode::Fill;

		self.base
			.draw(
				gpu,
				Some(target),
				&textures,
				&frame.crops,
				matrix,
				params,
				config.clear_color,
			)?;

		Ok((target, width, height))
	}

	pub fn destroy(mut self, gpu: &dyn Gpu) {
		self.textures.destroy(gpu);
		self.base.destroy(gpu);
		tracing::debug!(format = ?self.format, "filter destroyed");
	}

	/// Drop the filter without GL calls; its objects died with the context.
	pub fn abandon(mut self) {
		self.textures.abandon();
		tracing::debug!(format = ?self.format, "filter abandoned");
	}
}
