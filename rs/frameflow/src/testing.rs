//! Recording fakes of the GPU interfaces and frames whose release can be observed.

use std::{
	collections::HashSet,
	num::NonZeroU32,
	sync::{Arc, Mutex},
};

use crate::{
	BufferContext, CodecOutputBuffer, CodecOutputSink, CpuFrame, MixedBuffer, PixelBufferHandle, PixelFormat, SurfaceRef,
	VideoFrameMetadata,
	gpu::{
		DrawPass, Gpu, GpuContext, ProgramId, RenderTargetId, SurfaceTarget, TextureDesc, TextureId, TextureTarget,
		ThreadAffinity,
	},
	render::{RenderError, Result},
};

/// The size reported for window surfaces: a portrait phone screen.
pub const WINDOW_SIZE: (u32, u32) = (1080, 1920);

#[derive(Debug, Clone)]
pub struct DrawRecord {
	pub program: ProgramId,
	pub target: Option<RenderTargetId>,
	pub viewport: (u32, u32),
	pub textures: Vec<(TextureId, TextureTarget)>,
	pub crops: Vec<(f32, f32)>,
	pub color_matrix: Option<[f32; 9]>,
	pub vertices: [f32; 8],
	pub tex_coords: [f32; 8],
}

#[derive(Debug, Default)]
pub struct GpuLog {
	next_id: u32,

	pub textures_created: usize,
	pub live_textures: HashSet<TextureId>,

	pub programs_created: usize,
	pub live_programs: HashSet<ProgramId>,

	pub render_targets_created: usize,
	pub live_render_targets: HashSet<RenderTargetId>,

	/// (texture, descriptor, bytes uploaded)
	pub uploads: Vec<(TextureId, TextureDesc, usize)>,
	pub external_binds: Vec<(SurfaceRef, usize)>,
	pub draws: Vec<DrawRecord>,
}

impl GpuLog {
	fn next(&mut self) -> NonZeroU32 {
		self.next_id += 1;
		NonZeroU32::new(self.next_id).unwrap()
	}
}

#[derive(Debug, Default)]
pub struct FakeLog {
	pub gpu: GpuLog,

	pub attached: usize,
	pub detached: usize,
	pub swaps: usize,
	pub released: usize,
}

pub type Log = Arc<Mutex<FakeLog>>;

/// A [Gpu] that only keeps books.
pub struct FakeGpu {
	log: Log,
}

impl FakeGpu {
	pub fn new() -> (Self, Log) {
		let log = Log::default();
		(Self { log: log.clone() }, log)
	}

	fn with<T>(&self, f: impl FnOnce(&mut GpuLog) -> T) -> T {
		f(&mut self.log.lock().unwrap().gpu)
	}
}

impl Gpu for FakeGpu {
	fn create_texture(&self, _desc: &TextureDesc) -> Result<TextureId> {
		self.with(|log| {
			let id = TextureId(log.next());
			log.textures_created += 1;
			log.live_textures.insert(id);
			Ok(id)
		})
	}

	fn upload_texture(&self, texture: TextureId, desc: &TextureDesc, data: &[u8]) -> Result<()> {
		self.with(|log| {
			if !log.live_textures.contains(&texture) {
				return Err(RenderError::Gpu("unknown texture".into()));
			}

			let expected = desc.width as usize * desc.height as usize * desc.format.bytes_per_texel();
			if data.len() < expected {
				return Err(RenderError::InvalidFrame(format!("plane has {} bytes, need {expected}", data.len())));
			}

			log.uploads.push((texture, *desc, expected));
			Ok(())
		})
	}

	fn bind_external_texture(&self, texture: TextureId, surface: SurfaceRef, plane: usize) -> Result<()> {
		self.with(|log| {
			if !log.live_textures.contains(&texture) {
				return Err(RenderError::Gpu("unknown texture".into()));
			}
			log.external_binds.push((surface, plane));
			Ok(())
		})
	}

	fn delete_texture(&self, texture: TextureId) {
		self.with(|log| log.live_textures.remove(&texture));
	}

	fn create_program(&self, _vertex: &str, _fragment: &str) -> Result<ProgramId> {
		self.with(|log| {
			let id = ProgramId(log.next());
			log.programs_created += 1;
			log.live_programs.insert(id);
			Ok(id)
		})
	}

	fn delete_program(&self, program: ProgramId) {
		self.with(|log| log.live_programs.remove(&program));
	}

	fn create_render_target(&self, _width: u32, _height: u32) -> Result<RenderTargetId> {
		self.with(|log| {
			let id = RenderTargetId(log.next());
			log.render_targets_created += 1;
			log.live_render_targets.insert(id);
			Ok(id)
		})
	}

	fn delete_render_target(&self, target: RenderTargetId) {
		self.with(|log| log.live_render_targets.remove(&target));
	}

	fn draw(&self, pass: &DrawPass<'_>) -> Result<()> {
		self.with(|log| {
			if !log.live_programs.contains(&pass.program) {
				return Err(RenderError::Gpu("unknown program".into()));
			}

			log.draws.push(DrawRecord {
				program: pass.program,
				target: pass.target,
				viewport: pass.viewport,
				textures: pass.textures.to_vec(),
				crops: pass.crops.to_vec(),
				color_matrix: pass.color_matrix.copied(),
				vertices: *pass.vertices,
				tex_coords: *pass.tex_coords,
			});
			Ok(())
		})
	}

	fn read_pixels(&self, _target: Option<RenderTargetId>, width: u32, height: u32) -> Result<Vec<u8>> {
		Ok(vec![0; width as usize * height as usize * 4])
	}
}

/// A [GpuContext] with the same affinity rules as the EGL one.
pub struct FakeContext {
	gpu: FakeGpu,
	log: Log,
	initialized: bool,
	surface: Option<SurfaceTarget>,
	affinity: ThreadAffinity,
}

impl FakeContext {
	pub fn new() -> (Self, Log) {
		let (gpu, log) = FakeGpu::new();
		let context = Self {
			gpu,
			log: log.clone(),
			initialized: false,
			surface: None,
			affinity: ThreadAffinity::default(),
		};
		(context, log)
	}
}

impl GpuContext for FakeContext {
	fn init(&mut self) -> Result<()> {
		self.initialized = true;
		Ok(())
	}

	fn is_initialized(&self) -> bool {
		self.initialized
	}

	fn attach_surface(&mut self, target: SurfaceTarget) -> Result<()> {
		if !self.initialized {
			return Err(RenderError::NotInitialized);
		}

		self.detach_surface();
		self.surface = Some(target);
		self.log.lock().unwrap().attached += 1;
		Ok(())
	}

	fn detach_surface(&mut self) {
		if self.surface.take().is_some() {
			self.log.lock().unwrap().detached += 1;
		}
	}

	fn surface(&self) -> Option<SurfaceTarget> {
		self.surface
	}

	fn make_current(&mut self) -> Result<()> {
		if self.surface.is_none() {
			return Err(RenderError::NoSurface);
		}
		self.affinity.bind()
	}

	fn release_current(&mut self) {
		if self.affinity.check().is_ok() {
			self.affinity.unbind();
		}
	}

	fn surface_size(&self) -> Result<(u32, u32)> {
		match self.surface {
			Some(SurfaceTarget::Window(_)) => Ok(WINDOW_SIZE),
			Some(SurfaceTarget::Pbuffer { width, height }) => Ok((width, height)),
			None => Err(RenderError::NoSurface),
		}
	}

	fn swap_buffers(&mut self) -> Result<()> {
		self.affinity.check()?;
		if self.surface.is_none() {
			return Err(RenderError::NoSurface);
		}

		self.log.lock().unwrap().swaps += 1;
		Ok(())
	}

	fn gpu(&self) -> Result<&dyn Gpu> {
		self.affinity.check()?;
		if !self.initialized {
			return Err(RenderError::NotInitialized);
		}
		Ok(&self.gpu)
	}

	fn release(&mut self) {
		self.detach_surface();

		if self.initialized {
			self.initialized = false;
			self.log.lock().unwrap().released += 1;
		}

		self.affinity.unbind();
	}
}

#[derive(Debug, Default)]
struct ReleaseLog {
	next: usize,
	calls: Vec<(usize, bool)>,
	drops: Vec<usize>,
}

/// Hands out frames and records how they come back.
///
/// Codec frames report `(index, render)` through the codec sink; CPU frames report their index
/// when the software context is dropped.
#[derive(Debug, Clone, Default)]
pub struct Releases(Arc<Mutex<ReleaseLog>>);

impl Releases {
	pub fn calls(&self) -> Vec<(usize, bool)> {
		self.0.lock().unwrap().calls.clone()
	}

	pub fn drops(&self) -> Vec<usize> {
		self.0.lock().unwrap().drops.clone()
	}

	fn next_index(&self) -> usize {
		let mut log = self.0.lock().unwrap();
		let index = log.next;
		log.next += 1;
		index
	}

	/// A frame living in a codec output slot.
	pub fn codec_frame(&self, format: PixelFormat, width: u32, height: u32) -> MixedBuffer {
		let buffer = CodecOutputBuffer::new(self.next_index(), Arc::new(self.clone()));
		let metadata = VideoFrameMetadata::new(format, width, height).with_context(BufferContext::CodecOutput(buffer));
		MixedBuffer::wrap(metadata)
	}

	/// A CPU frame whose planes live in a software decoder's frame.
	pub fn cpu_frame(&self, format: PixelFormat, width: u32, height: u32) -> MixedBuffer {
		let metadata = VideoFrameMetadata::new(format, width, height);
		let frame = TrackedFrame {
			planes: metadata.planes.iter().map(|layout| vec![0x80; layout.len()]).collect(),
			index: self.next_index(),
			releases: self.clone(),
		};

		MixedBuffer::wrap(metadata.with_context(BufferContext::Software(Box::new(frame))))
	}
}

impl Releases {
	/// A frame backed by a retained platform pixel buffer; its release is recorded as a drop.
	pub fn pixel_buffer_frame(&self, width: u32, height: u32) -> MixedBuffer {
		let handle = TrackedPixelBuffer {
			index: self.next_index(),
			releases: self.clone(),
		};

		let metadata = VideoFrameMetadata::new(PixelFormat::PixelBufferSurface, width, height)
			.with_context(BufferContext::PixelBuffer(Box::new(handle)));
		MixedBuffer::wrap(metadata)
	}
}

impl CodecOutputSink for Releases {
	fn release_output_buffer(&self, index: usize, render: bool) {
		self.0.lock().unwrap().calls.push((index, render));
	}
}

struct TrackedFrame {
	planes: Vec<Vec<u8>>,
	index: usize,
	releases: Releases,
}

impl CpuFrame for TrackedFrame {
	fn plane(&self, index: usize) -> Option<&[u8]> {
		self.planes.get(index).map(Vec::as_slice)
	}
}

impl Drop for TrackedFrame {
	fn drop(&mut self) {
		self.releases.0.lock().unwrap().drops.push(self.index);
	}
}

struct TrackedPixelBuffer {
	index: usize,
	releases: Releases,
}

impl PixelBufferHandle for TrackedPixelBuffer {
	fn id(&self) -> u64 {
		self.index as u64
	}

	fn release(self: Box<Self>) {
		self.releases.0.lock().unwrap().drops.push(self.index);
	}
}
