//! Plane textures and the decision to reuse or reallocate them.

use super::geometry;
use crate::{
	PixelFormat, VideoFrameMetadata,
	gpu::{Gpu, TexelFormat, TextureDesc, TextureId, TextureTarget},
	render::{RenderError, Result},
	shader::MAX_TEXTURES,
};

fn texel_formats(format: PixelFormat) -> Result<&'static [TexelFormat]> {
	use TexelFormat::*;

	Ok(match format {
		PixelFormat::Rgb565 => &[Rgb565],
		PixelFormat::Rgb888 => &[Rgb],
		PixelFormat::Rgba8888 => &[Rgba],
		PixelFormat::Yuv420P => &[Luminance, Luminance, Luminance],
		PixelFormat::Yuv420SP => &[Luminance, LuminanceAlpha],
		PixelFormat::Yuv420P10LE => &[LuminanceAlpha, LuminanceAlpha, LuminanceAlpha],
		PixelFormat::MediaCodecSurface => &[Rgba],
		PixelFormat::PixelBufferSurface => &[Luminance, LuminanceAlpha],
		PixelFormat::Unknown(_) => return Err(RenderError::UnsupportedFormat(format)),
	})
}

/// The texture each plane of the frame needs, validated against the frame's layout.
///
/// CPU textures are as wide as the stride so rows upload without repacking; the padding is
/// cropped away by the texture coordinates.
pub fn plane_descs(frame: &VideoFrameMetadata) -> Result<Vec<TextureDesc>> {
	let format = frame.format;
	let texels = texel_formats(format)?;

	if frame.width == 0 || frame.height == 0 {
		return Err(RenderError::InvalidFrame(format!("empty frame {}x{}", frame.width, frame.height)));
	}

	if format.is_hardware() {
		let height = frame.coded_height.unwrap_or(frame.height).max(frame.height);
		let descs = texels
			.iter()
			.enumerate()
			.map(|(plane, &texel)| {
				// The second plane of a bi-planar buffer is subsampled.
				let divisor = if plane == 0 { 1 } else { 2 };
				TextureDesc {
					target: TextureTarget::External,
					format: texel,
					width: frame.width.div_ceil(divisor),
					height: height.div_ceil(divisor),
				}
			})
			.collect();

		return Ok(descs);
	}

	let mut descs = Vec::with_capacity(texels.len());
	for (plane, &texel) in texels.iter().enumerate() {
		let layout = frame
			.planes
			.get(plane)
			.ok_or_else(|| RenderError::InvalidFrame(format!("missing plane {plane}")))?;

		// Both are Some for every plane of a CPU format.
		let row_bytes = format.row_bytes(plane, frame.width).unwrap_or(0);
		let rows = format.plane_rows(plane, frame.height).unwrap_or(0);
		let bytes_per_texel = texel.bytes_per_texel();

		if layout.stride < row_bytes || layout.stride % bytes_per_texel != 0 {
			return Err(RenderError::InvalidFrame(format!(
				"plane {plane}: stride {} can't hold {row_bytes} bytes per row",
				layout.stride
			)));
		}

		if layout.rows < rows {
			return Err(RenderError::InvalidFrame(format!(
				"plane {plane}: {} rows, need {rows}",
				layout.rows
			)));
		}

		descs.push(TextureDesc {
			target: TextureTarget::Texture2D,
			format: texel,
			width: (layout.stride / bytes_per_texel) as u32,
			height: layout.rows as u32,
		});
	}

	Ok(descs)
}

/// How much of each plane's texture holds picture, in plane order.
///
/// Every plane is cropped on its own: a chroma stride need not be padded in proportion to luma.
pub fn plane_crops(frame: &VideoFrameMetadata, descs: &[TextureDesc]) -> Vec<(f32, f32)> {
	descs
		.iter()
		.enumerate()
		.map(|(plane, desc)| {
			let visible = match frame.format.is_hardware() {
				true => {
					let divisor = if plane == 0 { 1 } else { 2 };
					(frame.width.div_ceil(divisor), frame.height.div_ceil(divisor))
				}
				false => {
					let bytes_per_texel = desc.format.bytes_per_texel();
					let row_bytes = frame.format.row_bytes(plane, frame.width).unwrap_or(0);
					let rows = frame.format.plane_rows(plane, frame.height).unwrap_or(0);
					((row_bytes / bytes_per_texel) as u32, rows as u32)
				}
			};

			geometry::plane_crop(visible, (desc.width, desc.height))
		})
		.collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexturePlan {
	/// Same planes as before; upload into the existing textures.
	Reuse,

	/// Delete the current textures and create new ones.
	Reallocate,
}

pub fn plan(current: &[TextureDesc], incoming: &[TextureDesc]) -> TexturePlan {
	match current == incoming {
		true => TexturePlan::Reuse,
		false => TexturePlan::Reallocate,
	}
}

/// One texture per plane, owned by a filter.
#[derive(Debug, Default)]
pub struct TextureSet {
	slots: Vec<(TextureId, TextureDesc)>,
}

impl TextureSet {
	/// Make sure there is a texture matching each descriptor.
	pub fn prepare(&mut self, gpu: &dyn Gpu, descs: &[TextureDesc]) -> Result<TexturePlan> {
		if descs.len() > MAX_TEXTURES {
			return Err(RenderError::InvalidFrame(format!("{} planes", descs.len())));
		}

		let current: Vec<TextureDesc> = self.slots.iter().map(|(_, desc)| *desc).collect();
		let plan = plan(&current, descs);
		if plan == TexturePlan::Reuse {
			return Ok(plan);
		}

		self.destroy(gpu);

		for desc in descs {
			match gpu.create_texture(desc) {
				Ok(id) => self.slots.push((id, *desc)),
				Err(err) => {
					self.destroy(gpu);
					return Err(err);
				}
			}
		}

		tracing::debug!(?descs, "plane textures reallocated");
		Ok(plan)
	}

	pub fn slots(&self) -> &[(TextureId, TextureDesc)] {
		&self.slots
	}

	/// Texture bindings in plane order, for a draw.
	pub fn bindings(&self) -> Vec<(TextureId, TextureTarget)> {
		self.slots.iter().map(|(id, desc)| (*id, desc.target)).collect()
	}

	pub fn is_empty(&self) -> bool {
		self.slots.is_empty()
	}

	pub fn destroy(&mut self, gpu: &dyn Gpu) {
		for (id, _) in self.slots.drain(..) {
			gpu.delete_texture(id);
		}
	}

	/// Forget the textures without deleting them, for when the context is already gone.
	pub fn abandon(&mut self) {
		self.slots.clear();
	}
}
