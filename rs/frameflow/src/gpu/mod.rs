//! The GPU context and the GL command interface the filter draws with.
//!
//! [GpuContext] owns the display connection, the rendering context and the current surface.
//! [Gpu] is the narrow set of GL operations the filter needs, so the filter and renderer can be
//! exercised without a real GL driver.

mod egl;
mod gl;

pub use egl::EglContext;
pub use gl::GlowGpu;

use std::{num::NonZeroU32, thread::ThreadId};

use crate::{
	NativeWindow, SurfaceRef,
	render::{RenderError, Result},
};

/// Where the context presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceTarget {
	/// An on-screen platform window.
	Window(NativeWindow),

	/// An off-screen surface, for headless rendering.
	Pbuffer { width: u32, height: u32 },
}

/// A rendering context bound to at most one surface.
///
/// Every method except [GpuContext::release] must be called on the thread the context is current on.
pub trait GpuContext: Send {
	/// Connect to the display and create the rendering context.
	fn init(&mut self) -> Result<()>;

	fn is_initialized(&self) -> bool;

	fn attach_surface(&mut self, target: SurfaceTarget) -> Result<()>;

	/// Destroy the surface. GL objects stay valid; they belong to the context.
	fn detach_surface(&mut self);

	fn surface(&self) -> Option<SurfaceTarget>;

	fn has_surface(&self) -> bool {
		self.surface().is_some()
	}

	/// Bind the context and surface to the calling thread.
	///
	/// Fails with [RenderError::ContextAffinity] while the context is current on another thread.
	fn make_current(&mut self) -> Result<()>;

	fn release_current(&mut self);

	fn surface_size(&self) -> Result<(u32, u32)>;

	fn swap_buffers(&mut self) -> Result<()>;

	/// The GL command interface; only available while current on the calling thread.
	fn gpu(&self) -> Result<&dyn Gpu>;

	/// Destroy everything. Safe to call more than once.
	fn release(&mut self);
}

/// Tracks the thread a context is current on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAffinity {
	owner: Option<ThreadId>,
}

impl ThreadAffinity {
	/// Claim the context for the calling thread.
	pub fn bind(&mut self) -> Result<()> {
		let current = std::thread::current().id();
		match self.owner {
			Some(owner) if owner != current => Err(RenderError::ContextAffinity),
			_ => {
				self.owner = Some(current);
				Ok(())
			}
		}
	}

	/// Ensure the context is current on the calling thread.
	pub fn check(&self) -> Result<()> {
		match self.owner {
			Some(owner) if owner == std::thread::current().id() => Ok(()),
			_ => Err(RenderError::ContextAffinity),
		}
	}

	pub fn unbind(&mut self) {
		self.owner = None;
	}

	pub fn owner(&self) -> Option<ThreadId> {
		self.owner
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub NonZeroU32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub NonZeroU32);

/// An off-screen framebuffer with a color texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTargetId(pub NonZeroU32);

/// How a plane's bytes map to texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelFormat {
	/// One byte per texel, sampled as `.r`.
	Luminance,

	/// Two bytes per texel, sampled as `.r` and `.a`.
	LuminanceAlpha,

	Rgb,
	Rgba,
	Rgb565,
}

impl TexelFormat {
	pub fn bytes_per_texel(self) -> usize {
		match self {
			Self::Luminance => 1,
			Self::LuminanceAlpha | Self::Rgb565 => 2,
			Self::Rgb => 3,
			Self::Rgba => 4,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
	Texture2D,

	/// An external OES texture fed by a platform surface.
	External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
	pub target: TextureTarget,
	pub format: TexelFormat,

	/// Width in texels, including any row padding.
	pub width: u32,
	pub height: u32,
}

/// Everything needed for one quad draw.
#[derive(Debug, Clone, Copy)]
pub struct DrawPass<'a> {
	pub program: ProgramId,

	/// `None` draws to the surface.
	pub target: Option<RenderTargetId>,

	pub viewport: (u32, u32),

	/// Bound to texture units in order.
	pub textures: &'a [(TextureId, TextureTarget)],

	/// The visible fraction of each texture, scaling that plane's texture coordinates.
	pub crops: &'a [(f32, f32)],

	/// Column-major YUV to RGB matrix, for YUV programs.
	pub color_matrix: Option<&'a [f32; 9]>,

	/// Triangle strip positions in clip space.
	pub vertices: &'a [f32; 8],
	pub tex_coords: &'a [f32; 8],

	pub clear: [f32; 4],
}

/// The GL operations the filter draws with.
pub trait Gpu {
	fn create_texture(&self, desc: &TextureDesc) -> Result<TextureId>;

	/// Replace the contents of a 2D texture. `data` holds `desc.height` rows of `desc.width` texels.
	fn upload_texture(&self, texture: TextureId, desc: &TextureDesc, data: &[u8]) -> Result<()>;

	/// Latch the platform surface's current image into an external texture.
	fn bind_external_texture(&self, texture: TextureId, surface: SurfaceRef, plane: usize) -> Result<()>;

	fn delete_texture(&self, texture: TextureId);

	fn create_program(&self, vertex: &str, fragment: &str) -> Result<ProgramId>;

	fn delete_program(&self, program: ProgramId);

	fn create_render_target(&self, width: u32, height: u32) -> Result<RenderTargetId>;

	fn delete_render_target(&self, target: RenderTargetId);

	fn draw(&self, pass: &DrawPass<'_>) -> Result<()>;

	/// Read back RGBA rows, bottom row first.
	fn read_pixels(&self, target: Option<RenderTargetId>, width: u32, height: u32) -> Result<Vec<u8>>;
}

/// Binds hardware decoder output to GL textures; implemented by the platform layer.
///
/// On Android this updates the SurfaceTexture attached to the codec, on Apple platforms it maps
/// a plane of the pixel buffer through the texture cache.
pub trait ExternalTextureBinder: Send + Sync {
	/// `texture` is the raw GL name of a texture created for `target`.
	fn bind(&self, surface: SurfaceRef, plane: usize, target: TextureTarget, texture: u32) -> Result<()>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_affinity_is_exclusive() {
		let mut affinity = ThreadAffinity::default();
		assert_eq!(affinity.check(), Err(RenderError::ContextAffinity));

		affinity.bind().unwrap();
		affinity.check().unwrap();

		let mut moved = affinity;
		let result = std::thread::spawn(move || (moved.bind(), moved.check())).join().unwrap();
		assert_eq!(result, (Err(RenderError::ContextAffinity), Err(RenderError::ContextAffinity)));

		affinity.unbind();
		let mut moved = affinity;
		let result = std::thread::spawn(move || moved.bind()).join().unwrap();
		assert_eq!(result, Ok(()));
	}

	#[test]
	fn test_bytes_per_texel() {
		assert_eq!(TexelFormat::Luminance.bytes_per_texel(), 1);
		assert_eq!(TexelFormat::LuminanceAlpha.bytes_per_texel(), 2);
		assert_eq!(TexelFormat::Rgb.bytes_per_texel(), 3);
	}
}
