use std::{
	cell::{Cell, RefCell},
	collections::HashMap,
	sync::Arc,
};

use glow::HasContext;

use super::{
	DrawPass, ExternalTextureBinder, Gpu, ProgramId, RenderTargetId, TexelFormat, TextureDesc, TextureId, TextureTarget,
};
use crate::{
	SurfaceRef,
	render::{RenderError, Result},
};

// OpenGL ES 2 names that desktop GL headers dropped.
const LUMINANCE: u32 = 0x1909;
const LUMINANCE_ALPHA: u32 = 0x190A;
const TEXTURE_EXTERNAL_OES: u32 = 0x8D65;

struct Program {
	program: glow::NativeProgram,
	position: u32,
	tex_coord: u32,
	samplers: Vec<Option<glow::NativeUniformLocation>>,
	crops: Vec<Option<glow::NativeUniformLocation>>,
	color_matrix: Option<glow::NativeUniformLocation>,
}

struct RenderTarget {
	framebuffer: glow::NativeFramebuffer,
	texture: glow::NativeTexture,
}

/// [Gpu] on top of an OpenGL ES 2 context.
///
/// Must only be used while its context is current; [super::EglContext] enforces that.
pub struct GlowGpu {
	gl: glow::Context,
	binder: Option<Arc<dyn ExternalTextureBinder>>,
	programs: RefCell<HashMap<ProgramId, Program>>,
	targets: RefCell<HashMap<RenderTargetId, RenderTarget>>,

	// Vertex and texture coordinate buffers, created on the first draw.
	buffers: Cell<Option<(glow::NativeBuffer, glow::NativeBuffer)>>,
}

impl GlowGpu {
	pub fn new(gl: glow::Context, binder: Option<Arc<dyn ExternalTextureBinder>>) -> Self {
		Self {
			gl,
			binder,
			programs: RefCell::default(),
			targets: RefCell::default(),
			buffers: Cell::new(None),
		}
	}

	fn target(target: TextureTarget) -> u32 {
		match target {
			TextureTarget::Texture2D => glow::TEXTURE_2D,
			TextureTarget::External => TEXTURE_EXTERNAL_OES,
		}
	}

	// (internal format, format, type)
	fn texel(format: TexelFormat) -> (u32, u32, u32) {
		match format {
			TexelFormat::Luminance => (LUMINANCE, LUMINANCE, glow::UNSIGNED_BYTE),
			TexelFormat::LuminanceAlpha => (LUMINANCE_ALPHA, LUMINANCE_ALPHA, glow::UNSIGNED_BYTE),
			TexelFormat::Rgb => (glow::RGB, glow::RGB, glow::UNSIGNED_BYTE),
			TexelFormat::Rgba => (glow::RGBA, glow::RGBA, glow::UNSIGNED_BYTE),
			TexelFormat::Rgb565 => (glow::RGB, glow::RGB, glow::UNSIGNED_SHORT_5_6_5),
		}
	}

	fn check_error(&self, what: &str) -> Result<()> {
		let error = unsafe { self.gl.get_error() };
		match error {
			glow::NO_ERROR => Ok(()),
			error => {
				tracing::error!("{what} failed: gl error {error:#x}");
				Err(RenderError::Gpu(format!("{what} failed: {error:#x}")))
			}
		}
	}

	fn compile(&self, kind: u32, source: &str) -> Result<glow::NativeShader> {
		let gl = &self.gl;
		unsafe {
			let shader = gl.create_shader(kind).map_err(RenderError::Shader)?;
			gl.shader_source(shader, source);
			gl.compile_shader(shader);

			if !gl.get_shader_compile_status(shader) {
				let log = gl.get_shader_info_log(shader);
				gl.delete_shader(shader);
				return Err(RenderError::Shader(log));
			}

			Ok(shader)
		}
	}

	fn buffers(&self) -> Result<(glow::NativeBuffer, glow::NativeBuffer)> {
		if let Some(buffers) = self.buffers.get() {
			return Ok(buffers);
		}

		let buffers = unsafe {
			let vertices = self.gl.create_buffer().map_err(RenderError::Gpu)?;
			let tex_coords = self.gl.create_buffer().map_err(RenderError::Gpu)?;
			(vertices, tex_coords)
		};

		self.buffers.set(Some(buffers));
		Ok(buffers)
	}

	fn attribute(&self, buffer: glow::NativeBuffer, location: u32, data: &[f32; 8]) {
		let gl = &self.gl;
		unsafe {
			gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
			gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, bytemuck::cast_slice(&data[..]), glow::DYNAMIC_DRAW);
			gl.enable_vertex_attrib_array(location);
			gl.vertex_attrib_pointer_f32(location, 2, glow::FLOAT, false, 0, 0);
		}
	}

	/// Delete everything this interface created. The context must be current.
	pub fn destroy(&self) {
		let gl = &self.gl;
		unsafe {
			for (_, program) in self.programs.borrow_mut().drain() {
				gl.delete_program(program.program);
			}

			for (_, target) in self.targets.borrow_mut().drain() {
				gl.delete_framebuffer(target.framebuffer);
				gl.delete_texture(target.texture);
			}

			if let Some((vertices, tex_coords)) = self.buffers.take() {
				gl.delete_buffer(vertices);
				gl.delete_buffer(tex_coords);
			}
		}
	}
}

impl Gpu for GlowGpu {
	fn create_texture(&self, desc: &TextureDesc) -> Result<TextureId> {
		let gl = &self.gl;
		let target = Self::target(desc.target);

		let texture = unsafe {
			let texture = gl.create_texture().map_err(RenderError::Gpu)?;
			gl.bind_texture(target, Some(texture));
			gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
			gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
			gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
			gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);

			// External textures get their storage from the platform surface.
			if desc.target == TextureTarget::Texture2D {
				let (internal, format, ty) = Self::texel(desc.format);
				gl.tex_image_2d(
					target,
					0,
					internal as i32,
					desc.width as i32,
					desc.height as i32,
					0,
					format,
					ty,
					None,
				);
			}

			gl.bind_texture(target, None);
			texture
		};

		self.check_error("create texture")?;
		Ok(TextureId(texture.0))
	}

	fn upload_texture(&self, texture: TextureId, desc: &TextureDesc, data: &[u8]) -> Result<()> {
		let expected = desc.width as usize * desc.height as usize * desc.format.bytes_per_texel();
		let data = data
			.get(..expected)
			.ok_or_else(|| RenderError::InvalidFrame(format!("plane has {} bytes, need {expected}", data.len())))?;

		let gl = &self.gl;
		let (_, format, ty) = Self::texel(desc.format);

		unsafe {
			gl.bind_texture(glow::TEXTURE_2D, Some(glow::NativeTexture(texture.0)));
			// Rows are tightly packed at the texel level.
			gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
			gl.tex_sub_image_2d(
				glow::TEXTURE_2D,
				0,
				0,
				0,
				desc.width as i32,
				desc.height as i32,
				format,
				ty,
				glow::PixelUnpackData::Slice(data),
			);
			gl.bind_texture(glow::TEXTURE_2D, None);
		}

		self.check_error("upload texture")
	}

	fn bind_external_texture(&self, texture: TextureId, surface: SurfaceRef, plane: usize) -> Result<()> {
		let binder = self
			.binder
			.as_ref()
			.ok_or_else(|| RenderError::Gpu("no external texture binder registered".into()))?;

		binder.bind(surface, plane, TextureTarget::External, texture.0.get())
	}

	fn delete_texture(&self, texture: TextureId) {
		unsafe { self.gl.delete_texture(glow::NativeTexture(texture.0)) };
	}

	fn create_program(&self, vertex: &str, fragment: &str) -> Result<ProgramId> {
		let gl = &self.gl;

		let program = unsafe {
			let vs = self.compile(glow::VERTEX_SHADER, vertex)?;
			let fs = match self.compile(glow::FRAGMENT_SHADER, fragment) {
				Ok(fs) => fs,
				Err(err) => {
					gl.delete_shader(vs);
					return Err(err);
				}
			};

			let program = gl.create_program().map_err(RenderError::Shader)?;
			gl.attach_shader(program, vs);
			gl.attach_shader(program, fs);
			gl.link_program(program);

			gl.detach_shader(program, vs);
			gl.detach_shader(program, fs);
			gl.delete_shader(vs);
			gl.delete_shader(fs);

			if !gl.get_program_link_status(program) {
				let log = gl.get_program_info_log(program);
				gl.delete_program(program);
				return Err(RenderError::Shader(log));
			}

			let attribute = |name: &str| {
				gl.get_attrib_location(program, name)
					.ok_or_else(|| RenderError::Shader(format!("missing attribute {name}")))
			};

			Program {
				program,
				position: attribute("a_position")?,
				tex_coord: attribute("a_tex_coord")?,
				samplers: (0..3)
					.map(|unit| gl.get_uniform_location(program, &format!("u_texture{unit}")))
					.collect(),
				crops: (0..3)
					.map(|unit| gl.get_uniform_location(program, &format!("u_crop{unit}")))
					.collect(),
				color_matrix: gl.get_uniform_location(program, "u_color_matrix"),
			}
		};

		let id = ProgramId(program.program.0);
		self.programs.borrow_mut().insert(id, program);
		Ok(id)
	}

	fn delete_program(&self, program: ProgramId) {
		if let Some(program) = self.programs.borrow_mut().remove(&program) {
			unsafe { self.gl.delete_program(program.program) };
		}
	}

	fn create_render_target(&self, width: u32, height: u32) -> Result<RenderTargetId> {
		let gl = &self.gl;

		let target = unsafe {
			let texture = gl.create_texture().map_err(RenderError::Gpu)?;
			gl.bind_texture(glow::TEXTURE_2D, Some(texture));
			gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
			gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
			gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
			gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
			gl.tex_image_2d(
				glow::TEXTURE_2D,
				0,
				glow::RGBA as i32,
				width.max(1) as i32,
				height.max(1) as i32,
				0,
				glow::RGBA,
				glow::UNSIGNED_BYTE,
				None,
			);

			let framebuffer = gl.create_framebuffer().map_err(RenderError::Gpu)?;
			gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
			gl.framebuffer_texture_2d(
				glow::FRAMEBUFFER,
				glow::COLOR_ATTACHMENT0,
				glow::TEXTURE_2D,
				Some(texture),
				0,
			);

			let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
			gl.bind_framebuffer(glow::FRAMEBUFFER, None);
			gl.bind_texture(glow::TEXTURE_2D, None);

			if status != glow::FRAMEBUFFER_COMPLETE {
				gl.delete_framebuffer(framebuffer);
				gl.delete_texture(texture);
				return Err(RenderError::Gpu(format!("framebuffer incomplete: {status:#x}")));
			}

			RenderTarget { framebuffer, texture }
		};

		let id = RenderTargetId(target.framebuffer.0);
		self.targets.borrow_mut().insert(id, target);
		Ok(id)
	}

	fn delete_render_target(&self, target: RenderTargetId) {
		if let Some(target) = self.targets.borrow_mut().remove(&target) {
			unsafe {
				self.gl.delete_framebuffer(target.framebuffer);
				self.gl.delete_texture(target.texture);
			}
		}
	}

	fn draw(&self, pass: &DrawPass<'_>) -> Result<()> {
		let programs = self.programs.borrow();
		let program = programs
			.get(&pass.program)
			.ok_or_else(|| RenderError::Gpu("unknown program".into()))?;

		let framebuffer = match pass.target {
			Some(id) => Some(
				self.targets
					.borrow()
					.get(&id)
					.map(|target| target.framebuffer)
					.ok_or_else(|| RenderError::Gpu("unknown render target".into()))?,
			),
			None => None,
		};

		let (vertices, tex_coords) = self.buffers()?;
		let gl = &self.gl;

		unsafe {
			gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer);
			gl.viewport(0, 0, pass.viewport.0 as i32, pass.viewport.1 as i32);

			let [r, g, b, a] = pass.clear;
			gl.clear_color(r, g, b, a);
			gl.clear(glow::COLOR_BUFFER_BIT);

			gl.use_program(Some(program.program));

			for (unit, (texture, target)) in pass.textures.iter().enumerate() {
				gl.active_texture(glow::TEXTURE0 + unit as u32);
				gl.bind_texture(Self::target(*target), Some(glow::NativeTexture(texture.0)));

				if let Some(location) = program.samplers.get(unit).cloned().flatten() {
					gl.uniform_1_i32(Some(&location), unit as i32);
				}

				if let Some(location) = program.crops.get(unit).cloned().flatten() {
					let (x, y) = pass.crops.get(unit).copied().unwrap_or((1.0, 1.0));
					gl.uniform_2_f32(Some(&location), x, y);
				}
			}

			if let (Some(matrix), Some(location)) = (pass.color_matrix, program.color_matrix.as_ref()) {
				gl.uniform_matrix_3_f32_slice(Some(location), false, matrix);
			}

			self.attribute(vertices, program.position, pass.vertices);
			self.attribute(tex_coords, program.tex_coord, pass.tex_coords);

			gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);

			gl.bind_buffer(glow::ARRAY_BUFFER, None);
			gl.bind_framebuffer(glow::FRAMEBUFFER, None);
		}

		self.check_error("draw")
	}

	fn read_pixels(&self, target: Option<RenderTargetId>, width: u32, height: u32) -> Result<Vec<u8>> {
		let framebuffer = match target {
			Some(id) => Some(
				self.targets
					.borrow()
					.get(&id)
					.map(|target| target.framebuffer)
					.ok_or_else(|| RenderError::Gpu("unknown render target".into()))?,
			),
			None => None,
		};

		let mut pixels = vec![0; width as usize * height as usize * 4];
		let gl = &self.gl;

		unsafe {
			gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer);
			gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
			gl.read_pixels(
				0,
				0,
				width as i32,
				height as i32,
				glow::RGBA,
				glow::UNSIGNED_BYTE,
				glow::PixelPackData::Slice(&mut pixels),
			);
			gl.bind_framebuffer(glow::FRAMEBUFFER, None);
		}

		self.check_error("read pixels")?;
		Ok(pixels)
	}
}
