use std::{ffi::c_void, ptr::NonNull};

use num_enum::FromPrimitive;

use super::BufferContext;

/// Pixel layout of a decoded video frame.
///
/// Raw values come from decoders and platform bridges; anything we don't recognize
/// lands in [PixelFormat::Unknown] and is rejected by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(i32)]
pub enum PixelFormat {
	Rgb565 = 1,
	Rgb888 = 2,
	Rgba8888 = 3,
	/// YUV 4:2:0 with three planes.
	Yuv420P = 4,
	/// YUV 4:2:0 with a luma plane and an interleaved UV plane (NV12).
	Yuv420SP = 5,
	/// YUV 4:2:0 planar, 10 bits stored little endian in 16-bit words.
	Yuv420P10LE = 6,
	/// Opaque codec output rendered into an external OES texture.
	MediaCodecSurface = 100,
	/// Opaque bi-planar platform pixel buffer.
	PixelBufferSurface = 101,
	#[num_enum(catch_all)]
	Unknown(i32),
}

impl PixelFormat {
	/// The number of planes (and textures) used by the format.
	pub fn plane_count(self) -> Option<usize> {
		match self {
			Self::Rgb565 | Self::Rgb888 | Self::Rgba8888 | Self::MediaCodecSurface => Some(1),
			Self::Yuv420SP | Self::PixelBufferSurface => Some(2),
			Self::Yuv420P | Self::Yuv420P10LE => Some(3),
			Self::Unknown(_) => None,
		}
	}

	/// Hardware formats carry no CPU bytes, only a surface reference.
	pub fn is_hardware(self) -> bool {
		matches!(self, Self::MediaCodecSurface | Self::PixelBufferSurface)
	}

	pub fn is_yuv(self) -> bool {
		matches!(
			self,
			Self::Yuv420P | Self::Yuv420SP | Self::Yuv420P10LE | Self::PixelBufferSurface
		)
	}

	pub fn is_supported(self) -> bool {
		!matches!(self, Self::Unknown(_))
	}

	/// Bytes per sample of each plane, as `(plane width divisor, bytes per pixel)`.
	fn plane_shape(self, plane: usize) -> Option<(u32, usize)> {
		match (self, plane) {
			(Self::Rgb565, 0) => Some((1, 2)),
			(Self::Rgb888, 0) => Some((1, 3)),
			(Self::Rgba8888, 0) => Some((1, 4)),
			(Self::Yuv420P, 0) => Some((1, 1)),
			(Self::Yuv420P, 1 | 2) => Some((2, 1)),
			(Self::Yuv420SP, 0) => Some((1, 1)),
			(Self::Yuv420SP, 1) => Some((2, 2)),
			(Self::Yuv420P10LE, 0) => Some((1, 2)),
			(Self::Yuv420P10LE, 1 | 2) => Some((2, 2)),
			_ => None,
		}
	}

	/// The minimum number of bytes in one row of the given plane.
	pub fn row_bytes(self, plane: usize, width: u32) -> Option<usize> {
		let (divisor, bpp) = self.plane_shape(plane)?;
		Some(width.div_ceil(divisor) as usize * bpp)
	}

	/// The number of rows in the given plane.
	pub fn plane_rows(self, plane: usize, height: u32) -> Option<usize> {
		let (divisor, _) = self.plane_shape(plane)?;
		// Every subsampled format here is 4:2:0, so rows follow the width divisor.
		Some(height.div_ceil(divisor) as usize)
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ColorSpace {
	#[default]
	Unspecified,
	Bt601,
	Bt709,
	Bt2020,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ColorRange {
	/// 16-235 for 8-bit luma.
	#[default]
	Limited,
	/// 0-255.
	Full,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ColorPrimaries {
	#[default]
	Unspecified,
	Bt601,
	Bt709,
	Bt2020,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransferCharacteristic {
	#[default]
	Unspecified,
	Bt709,
	/// SMPTE ST 2084 (PQ).
	Smpte2084,
	/// ARIB STD-B67 (HLG).
	AribStdB67,
}

/// Everything needed to pick a YUV to RGB conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ColorDescription {
	pub space: ColorSpace,
	pub range: ColorRange,
	pub primaries: ColorPrimaries,
	pub transfer: TransferCharacteristic,
}

impl ColorDescription {
	pub fn is_hdr(&self) -> bool {
		matches!(
			self.transfer,
			TransferCharacteristic::Smpte2084 | TransferCharacteristic::AribStdB67
		)
	}
}

/// Location of one plane inside a frame's byte region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PlaneLayout {
	/// Byte offset into the owned region. Ignored when the planes are served by a [BufferContext].
	pub offset: usize,

	/// Number of bytes between rows (may include alignment padding).
	pub stride: usize,

	/// Number of rows.
	pub rows: usize,
}

impl PlaneLayout {
	/// Tightly packed planes, one after the other.
	pub fn packed(format: PixelFormat, width: u32, height: u32) -> Vec<Self> {
		let mut offset = 0;
		let mut planes = Vec::new();

		for plane in 0..format.plane_count().unwrap_or(0) {
			let (Some(stride), Some(rows)) = (format.row_bytes(plane, width), format.plane_rows(plane, height)) else {
				// Hardware formats have no CPU planes.
				break;
			};

			planes.push(Self { offset, stride, rows });
			offset += stride * rows;
		}

		planes
	}

	pub fn len(&self) -> usize {
		self.stride * self.rows
	}

	pub fn end(&self) -> usize {
		self.offset + self.len()
	}
}

/// Describes a decoded video frame.
#[derive(Debug)]
pub struct VideoFrameMetadata {
	pub width: u32,
	pub height: u32,

	/// The size the frame is displayed at, rewritten by the renderer after rotation and scaling.
	pub display_width: u32,
	pub display_height: u32,

	pub format: PixelFormat,

	/// CPU plane layout, empty for hardware frames.
	pub planes: Vec<PlaneLayout>,

	/// Presentation timestamp in milliseconds.
	pub pts: i64,

	/// Decode timestamp in milliseconds.
	pub dts: i64,

	pub color: ColorDescription,

	/// Rows allocated by the codec, when larger than `height` (macroblock alignment).
	pub coded_height: Option<u32>,

	/// The decoder skipped producing pixels for this buffer (fast seek).
	pub skip_output: bool,

	context: Option<BufferContext>,
}

impl VideoFrameMetadata {
	pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
		Self {
			width,
			height,
			display_width: width,
			display_height: height,
			format,
			planes: PlaneLayout::packed(format, width, height),
			pts: 0,
			dts: 0,
			color: ColorDescription::default(),
			coded_height: None,
			skip_output: false,
			context: None,
		}
	}

	/// Attach the hook that hands the backing memory back to its decoder.
	pub fn with_context(mut self, context: BufferContext) -> Self {
		self.context = Some(context);
		self
	}

	pub fn with_timestamps(mut self, pts: i64, dts: i64) -> Self {
		self.pts = pts;
		self.dts = dts;
		self
	}

	pub fn with_color(mut self, color: ColorDescription) -> Self {
		self.color = color;
		self
	}

	pub fn context(&self) -> Option<&BufferContext> {
		self.context.as_ref()
	}

	pub(crate) fn take_context(&mut self) -> Option<BufferContext> {
		self.context.take()
	}

	/// The total number of bytes covered by the plane layout.
	pub fn frame_size(&self) -> usize {
		self.planes.iter().map(PlaneLayout::end).max().unwrap_or(0)
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleFormat {
	#[default]
	S16,
	S32,
	F32,
}

/// Describes decoded PCM audio. Audio flows through the same container but is rendered elsewhere.
#[derive(Debug, Clone, Default)]
pub struct AudioFrameMetadata {
	pub sample_rate: u32,
	pub channels: u32,
	pub format: SampleFormat,
	pub samples: usize,
	pub pts: i64,
}

/// Describes a compressed packet from the demuxer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketMetadata {
	pub stream_index: usize,

	/// Presentation timestamp in milliseconds.
	pub pts: i64,

	/// Decode timestamp in milliseconds.
	pub dts: i64,

	pub keyframe: bool,
}

/// A platform window handle. The only platform type that crosses into the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeWindow(NonNull<c_void>);

impl NativeWindow {
	/// # Safety
	/// The pointer must be a valid native window (ANativeWindow, OHNativeWindow, CAEAGLLayer, ...)
	/// and stay valid while any renderer or decoder holds it.
	pub unsafe fn from_raw(ptr: *mut c_void) -> Option<Self> {
		NonNull::new(ptr).map(Self)
	}

	pub fn as_ptr(&self) -> *mut c_void {
		self.0.as_ptr()
	}
}

// SAFETY: The handle is an opaque token; the platform objects behind it are reference counted and
// thread-safe to pass around. Only EGL dereferences it, on the render thread.
unsafe impl Send for NativeWindow {}
unsafe impl Sync for NativeWindow {}

/// Backend specific output context delivered with a format change.
#[derive(Debug)]
pub enum HardwareContext {
	Android { window: NativeWindow },
	Harmony { window: NativeWindow },
	Ios { layer: NativeWindow },
}

impl HardwareContext {
	pub fn window(&self) -> NativeWindow {
		match self {
			Self::Android { window } | Self::Harmony { window } => *window,
			Self::Ios { layer } => *layer,
		}
	}
}

/// Describes the video stream; produced alongside or ahead of frames.
///
/// Deliberately not [Clone]: the hardware context must have a single owner.
#[derive(Debug, Default)]
pub struct VideoFormatMetadata {
	pub width: u32,
	pub height: u32,
	pub hdr: bool,

	/// Clockwise rotation in degrees.
	pub rotation: u32,

	pub sar_num: u32,
	pub sar_den: u32,

	pub color: ColorDescription,

	pub hardware: Option<HardwareContext>,
}

impl VideoFormatMetadata {
	pub fn new(width: u32, height: u32) -> Self {
		Self {
			width,
			height,
			sar_num: 1,
			sar_den: 1,
			..Default::default()
		}
	}
}
