//! GLSL ES 1.00 sources for the video filter.
//!
//! The vertex shader passes one texture coordinate per plane through; the fragment shader
//! converts the frame's pixel format to RGB. YUV programs read `u_color_matrix`, a column-major
//! `mat3` picked by [crate::filter::color::select].

use std::fmt::Write;

use crate::{
	ColorRange, PixelFormat,
	render::{RenderError, Result},
};

/// The most planes any supported format has.
pub const MAX_TEXTURES: usize = 3;

pub fn vertex_shader(texture_count: usize) -> Result<String> {
	if !(1..=MAX_TEXTURES).contains(&texture_count) {
		return Err(RenderError::Shader(format!("unsupported texture count: {texture_count}")));
	}

	let mut source = String::from("attribute vec4 a_position;\nattribute vec2 a_tex_coord;\n");
	for i in 0..texture_count {
		let _ = writeln!(source, "uniform vec2 u_crop{i};");
		let _ = writeln!(source, "varying vec2 v_tex_coord{i};");
	}

	source.push_str("void main() {\n\tgl_Position = a_position;\n");
	for i in 0..texture_count {
		let _ = writeln!(source, "\tv_tex_coord{i} = a_tex_coord * u_crop{i};");
	}
	source.push_str("}\n");

	Ok(source)
}

/// How many textures (and varyings) the fragment shader for `format` samples.
pub fn texture_count(format: PixelFormat) -> Result<usize> {
	format.plane_count().ok_or(RenderError::UnsupportedFormat(format))
}

pub fn fragment_shader(format: PixelFormat, range: ColorRange) -> Result<String> {
	let body = match format {
		PixelFormat::Rgb565 | PixelFormat::Rgb888 | PixelFormat::Rgba8888 => RGB,
		PixelFormat::MediaCodecSurface => EXTERNAL,
		PixelFormat::Yuv420P => YUV420P,
		PixelFormat::Yuv420SP | PixelFormat::PixelBufferSurface => YUV420SP,
		PixelFormat::Yuv420P10LE => YUV420P10LE,
		PixelFormat::Unknown(_) => return Err(RenderError::UnsupportedFormat(format)),
	};

	let mut source = String::new();
	if format == PixelFormat::MediaCodecSurface {
		source.push_str("#extension GL_OES_EGL_image_external : require\n");
	}
	source.push_str("precision mediump float;\n");

	let count = texture_count(format)?;
	let sampler = match format {
		PixelFormat::MediaCodecSurface => "samplerExternalOES",
		_ => "sampler2D",
	};

	for i in 0..count {
		let _ = writeln!(source, "varying vec2 v_tex_coord{i};");
		let _ = writeln!(source, "uniform {sampler} u_texture{i};");
	}

	if format.is_yuv() {
		let offset = match (format, range) {
			(PixelFormat::Yuv420P10LE, ColorRange::Limited) => "vec3(64.0 / 1023.0, 512.0 / 1023.0, 512.0 / 1023.0)",
			(PixelFormat::Yuv420P10LE, ColorRange::Full) => "vec3(0.0, 512.0 / 1023.0, 512.0 / 1023.0)",
			(_, ColorRange::Limited) => "vec3(16.0 / 255.0, 128.0 / 255.0, 128.0 / 255.0)",
			(_, ColorRange::Full) => "vec3(0.0, 128.0 / 255.0, 128.0 / 255.0)",
		};

		source.push_str("uniform mat3 u_color_matrix;\n");
		let _ = writeln!(source, "const vec3 c_offset = {offset};");
	}

	source.push_str(body);
	Ok(source)
}

const RGB: &str = "\
void main() {
	gl_FragColor = texture2D(u_texture0, v_tex_coord0);
}
";

const EXTERNAL: &str = "\
void main() {
	gl_FragColor = texture2D(u_texture0, v_tex_coord0);
}
";

const YUV420P: &str = "\
void main() {
	vec3 yuv = vec3(
		texture2D(u_texture0, v_tex_coord0).r,
		texture2D(u_texture1, v_tex_coord1).r,
		texture2D(u_texture2, v_tex_coord2).r);
	gl_FragColor = vec4(u_color_matrix * (yuv - c_offset), 1.0);
}
";

const YUV420SP: &str = "\
void main() {
	vec3 yuv = vec3(
		texture2D(u_texture0, v_tex_coord0).r,
		texture2D(u_texture1, v_tex_coord1).ra);
	gl_FragColor = vec4(u_color_matrix * (yuv - c_offset), 1.0);
}
";

// Each sample is a little endian 16-bit word: low byte in luminance, high byte in alpha.
const YUV420P10LE: &str = "\
float sample10(sampler2D texture, vec2 coord) {
	vec4 t = texture2D(texture, coord);
	return (t.a * 65280.0 + t.r * 255.0) / 1023.0;
}
void main() {
	vec3 yuv = vec3(
		sample10(u_texture0, v_tex_coord0),
		sample10(u_texture1, v_tex_coord1),
		sample10(u_texture2, v_tex_coord2));
	gl_FragColor = vec4(u_color_matrix * (yuv - c_offset), 1.0);
}
";
