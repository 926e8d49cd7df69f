mod log;

use std::{
	fs::File,
	io::{BufReader, Read},
	path::PathBuf,
};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use frameflow::{
	ColorDescription, ColorRange, ColorSpace, MixedBuffer, PixelFormat, VideoFrameMetadata,
	filter::geometry::{AspectRatioMode, RotationMode},
	gpu::{EglContext, SurfaceTarget},
	render::{OpenGlRender, RenderConfig, SharedRender, VideoRender},
};

/// Render raw frames into an off-screen EGL surface.
#[derive(Parser, Clone, Debug)]
pub struct Config {
	/// A file of raw frames stored back to back, planes tightly packed.
	#[arg(long)]
	pub input: PathBuf,

	#[arg(long)]
	pub width: u32,

	#[arg(long)]
	pub height: u32,

	#[arg(long, value_enum, default_value_t = Format::Yuv420p)]
	pub format: Format,

	#[arg(long, value_enum, default_value_t = Space::Bt709)]
	pub color_space: Space,

	#[arg(long, value_enum, default_value_t = Range::Limited)]
	pub color_range: Range,

	/// The width of the surface the frames are drawn on.
	#[arg(long, default_value_t = 1280)]
	pub view_width: u32,

	#[arg(long, default_value_t = 720)]
	pub view_height: u32,

	#[arg(long, value_enum, default_value_t = Aspect::Fit)]
	pub aspect: Aspect,

	/// Clockwise rotation in degrees.
	#[arg(long, default_value_t = 0, allow_negative_numbers = true)]
	pub rotation: i32,

	/// Divide the snapshot size by this factor.
	#[arg(long, default_value_t = 1.0)]
	pub downscale: f32,

	/// Stop after this many frames.
	#[arg(long)]
	pub frames: Option<usize>,

	/// Write the last frame to this PNG file.
	#[arg(long)]
	pub snapshot: Option<PathBuf>,

	/// The log configuration.
	#[command(flatten)]
	pub log: log::Log,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
	Rgb565,
	Rgb888,
	Rgba8888,
	Yuv420p,
	Nv12,
	Yuv420p10le,
}

impl From<Format> for PixelFormat {
	fn from(format: Format) -> Self {
		match format {
			Format::Rgb565 => Self::Rgb565,
			Format::Rgb888 => Self::Rgb888,
			Format::Rgba8888 => Self::Rgba8888,
			Format::Yuv420p => Self::Yuv420P,
			Format::Nv12 => Self::Yuv420SP,
			Format::Yuv420p10le => Self::Yuv420P10LE,
		}
	}
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Space {
	Bt601,
	Bt709,
	Bt2020,
}

impl From<Space> for ColorSpace {
	fn from(space: Space) -> Self {
		match space {
			Space::Bt601 => Self::Bt601,
			Space::Bt709 => Self::Bt709,
			Space::Bt2020 => Self::Bt2020,
		}
	}
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Range {
	Limited,
	Full,
}

impl From<Range> for ColorRange {
	fn from(range: Range) -> Self {
		match range {
			Range::Limited => Self::Limited,
			Range::Full => Self::Full,
		}
	}
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aspect {
	FitWidth,
	FitHeight,
	Fit,
	Fill,
	ScaleFill,
}

impl From<Aspect> for AspectRatioMode {
	fn from(aspect: Aspect) -> Self {
		match aspect {
			Aspect::FitWidth => Self::FitWidth,
			Aspect::FitHeight => Self::FitHeight,
			Aspect::Fit => Self::Fit,
			Aspect::Fill => Self::Fill,
			Aspect::ScaleFill => Self::ScaleFill,
		}
	}
}

/// Fill `buf` with the next frame. Returns false at a clean end of input.
fn read_frame(input: &mut impl Read, buf: &mut [u8]) -> anyhow::Result<bool> {
	let mut filled = 0;
	while filled < buf.len() {
		match input.read(&mut buf[filled..])? {
			0 => break,
			n => filled += n,
		}
	}

	match filled {
		0 => Ok(false),
		n if n == buf.len() => Ok(true),
		n => anyhow::bail!("truncated frame: {n} of {} bytes", buf.len()),
	}
}

fn main() -> anyhow::Result<()> {
	let config = Config::parse();
	config.log.init();

	let format = PixelFormat::from(config.format);
	let color = ColorDescription {
		space: config.color_space.into(),
		range: config.color_range.into(),
		..Default::default()
	};

	let frame_size = VideoFrameMetadata::new(format, config.width, config.height).frame_size();
	if frame_size == 0 {
		anyhow::bail!("empty frame size: {}x{}", config.width, config.height);
	}

	let file = File::open(&config.input).with_context(|| format!("failed to open {}", config.input.display()))?;
	let mut input = BufReader::new(file);

	let mut render = OpenGlRender::with_config(
		EglContext::new(),
		RenderConfig {
			aspect: config.aspect.into(),
			rotation: RotationMode::from_degrees(config.rotation),
			downscale: config.downscale,
			..Default::default()
		},
	);

	render.init().context("failed to initialize EGL")?;
	render
		.set_surface(SurfaceTarget::Pbuffer {
			width: config.view_width,
			height: config.view_height,
		})
		.context("failed to create surface")?;

	let shared = SharedRender::new(render);

	tracing::info!(input = %config.input.display(), ?format, width = config.width, height = config.height, "rendering");

	let mut rendered = 0;
	while config.frames.is_none_or(|max| rendered < max) {
		// 25 fps worth of timestamps; raw files carry none.
		let pts = rendered as i64 * 40;
		let metadata = VideoFrameMetadata::new(format, config.width, config.height)
			.with_timestamps(pts, pts)
			.with_color(color);

		let mut frame = MixedBuffer::allocate(frame_size, metadata);
		let data = frame.data_mut().context("frame has no data")?;
		if !read_frame(&mut input, data)? {
			break;
		}

		shared
			.render_frame(frame)
			.with_context(|| format!("failed to render frame {rendered}"))?;
		rendered += 1;
	}

	tracing::info!(frames = rendered, "done");

	if let Some(path) = &config.snapshot {
		let snapshot = shared.lock()?.snapshot().context("failed to take snapshot")?;

		image::save_buffer(
			path,
			&snapshot.top_down(),
			snapshot.width,
			snapshot.height,
			image::ExtendedColorType::Rgba8,
		)
		.with_context(|| format!("failed to write {}", path.display()))?;

		tracing::info!(path = %path.display(), width = snapshot.width, height = snapshot.height, "snapshot written");
	}

	shared.close();
	Ok(())
}
