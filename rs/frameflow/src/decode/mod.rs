//! Video decoding into [MixedBuffer] frames.
//!
//! Every backend implements [VideoDecoder]; callers only ever see the trait.
//! Decoded frames (and a [BufferType::VideoFormat] container whenever the output format changes)
//! are handed to the registered [FrameCallback], which takes ownership of them.
//!
//! # Backends
//!
//! - [SoftwareVideoDecoder]: a CPU codec behind [SoftwareCodec]; FFmpeg with the `decode` feature.
//! - [CodecVideoDecoder]: a platform codec with indexed output slots (MediaCodec, OH AVCodec).
//! - [PixelBufferVideoDecoder]: a platform session producing pixel buffers (VideoToolbox).
//!
//! [VideoDecoderFactory] is the one place a backend is chosen.

mod codec;
mod factory;
#[cfg(feature = "decode")]
mod ffmpeg;
mod pixel_buffer;
mod software;

pub use codec::*;
pub use factory::*;
#[cfg(feature = "decode")]
pub use ffmpeg::FfmpegCodec;
pub use pixel_buffer::*;
pub use software::*;

use crate::{BufferType, MixedBuffer, PacketMetadata, PixelFormat, VideoFormatMetadata};

/// Errors that can occur during decoding.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
	#[error("codec not found: {0}")]
	CodecNotFound(String),

	#[error("failed to open codec: {0}")]
	OpenFailed(String),

	#[error("invalid codec parameters: {0}")]
	InvalidParams(String),

	#[error("decoder not initialized")]
	NotInitialized,

	#[error("invalid data: {0}")]
	InvalidData(String),

	#[error("missing reference frame")]
	MissingReference,
}

impl DecodeError {
	/// A numeric code for FFI and logging.
	pub fn code(&self) -> i32 {
		match self {
			Self::CodecNotFound(_) => -1,
			Self::OpenFailed(_) => -2,
			Self::InvalidParams(_) => -3,
			Self::NotInitialized => -4,
			Self::InvalidData(_) => -5,
			Self::MissingReference => -6,
		}
	}

	/// Whether the decoder must be reinitialized (or replaced) before continuing.
	///
	/// A missing reference clears up at the next keyframe.
	pub fn is_fatal(&self) -> bool {
		!matches!(self, Self::MissingReference)
	}
}

/// Result type for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
	H264,
	H265,
	Vp8,
	Vp9,
	Av1,
}

/// Everything a decoder needs to configure itself for a stream.
#[derive(Debug)]
pub struct VideoStreamInfo {
	pub codec: VideoCodec,

	/// Codec specific initialization data (SPS/PPS, hvcC, ...), possibly arriving late.
	pub extradata: Option<Vec<u8>>,

	pub format: VideoFormatMetadata,
}

impl VideoStreamInfo {
	pub fn new(codec: VideoCodec, width: u32, height: u32) -> Self {
		Self {
			codec,
			extradata: None,
			format: VideoFormatMetadata::new(width, height),
		}
	}

	pub fn with_extradata(mut self, extradata: Vec<u8>) -> Self {
		self.extradata = Some(extradata);
		self
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
	/// A frame was emitted.
	Decoded,

	/// The packet was accepted but no frame is ready; feed more input.
	TryAgain,

	/// A frame held back by a full codec was emitted instead of accepting the packet; send the
	/// same packet again.
	Resend,

	/// Every buffered frame has been emitted after an end-of-stream packet.
	EndOfStream,
}

/// Receives decoded frames and format changes. Ownership of each buffer moves to the callback.
pub type FrameCallback = Box<dyn FnMut(MixedBuffer) + Send>;

pub trait VideoDecoder: Send {
	fn backend(&self) -> DecoderBackend;

	fn set_callback(&mut self, callback: FrameCallback);

	/// Configure the codec for the stream.
	fn init(&mut self, info: &VideoStreamInfo) -> Result<()>;

	/// Feed one compressed packet, emitting at most one frame.
	///
	/// A packet with no payload signals end of stream; keep calling with empty packets to drain.
	/// On [DecodeStatus::Resend] the packet was not consumed and must be sent again.
	fn decode(&mut self, packet: &MixedBuffer) -> Result<DecodeStatus>;

	/// Renegotiate codec parameters mid-stream, such as late extradata.
	fn set_video_format(&mut self, info: &VideoStreamInfo) -> Result<()>;

	/// Discard buffered state without tearing down the codec, used on seek.
	fn flush(&mut self) -> Result<()>;

	/// Tear down the codec. Safe to call more than once.
	fn release(&mut self);
}

/// Split a packet container into its metadata and payload.
fn packet_payload(packet: &MixedBuffer) -> Result<(&PacketMetadata, &[u8])> {
	if packet.buffer_type() != BufferType::VideoPacket {
		return Err(DecodeError::InvalidData(format!(
			"expected a video packet, got {:?}",
			packet.buffer_type()
		)));
	}

	let metadata = packet
		.packet_metadata()
		.ok_or_else(|| DecodeError::InvalidData("missing packet metadata".into()))?;

	Ok((metadata, packet.data().unwrap_or_default()))
}

/// Delivers frames to the callback, announcing format changes first.
#[derive(Default)]
struct Output {
	callback: Option<FrameCallback>,
	current: Option<(u32, u32, PixelFormat)>,
	rotation: u32,
	sar: (u32, u32),
}

impl Output {
	fn set_callback(&mut self, callback: FrameCallback) {
		self.callback = Some(callback);
	}

	fn configure(&mut self, info: &VideoStreamInfo) {
		self.rotation = info.format.rotation;
		self.sar = (info.format.sar_num, info.format.sar_den);
		self.current = None;
	}

	fn emit(&mut self, frame: MixedBuffer) {
		let Some(callback) = self.callback.as_mut() else {
			tracing::warn!("no frame callback registered, discarding frame");
			frame.release(false);
			return;
		};

		if let Some(metadata) = frame.video_frame_metadata() {
			let current = (metadata.width, metadata.height, metadata.format);
			if self.current != Some(current) {
				tracing::debug!(width = metadata.width, height = metadata.height, format = ?metadata.format, "output format changed");
				self.current = Some(current);

				let mut format = VideoFormatMetadata::new(metadata.width, metadata.height);
				format.rotation = self.rotation;
				(format.sar_num, format.sar_den) = self.sar;
				format.color = metadata.color;
				format.hdr = metadata.color.is_hdr();

				callback(MixedBuffer::wrap(format));
			}
		}

		callback(frame);
	}
}
