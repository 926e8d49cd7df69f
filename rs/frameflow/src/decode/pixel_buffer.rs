use std::sync::Arc;

use super::{
	DecodeError, DecodeStatus, DecoderBackend, FrameCallback, Output, Result, VideoCodec, VideoDecoder, VideoStreamInfo,
};
use crate::{BufferContext, ColorDescription, MixedBuffer, PacketMetadata, PixelBufferHandle, PixelFormat, VideoFrameMetadata};

/// A frame produced by a [PixelBufferSession].
pub struct DecodedPixelBuffer {
	pub handle: Box<dyn PixelBufferHandle>,
	pub width: u32,
	pub height: u32,

	/// Presentation timestamp in milliseconds.
	pub pts: i64,

	pub color: ColorDescription,
}

/// The bridge to a platform decompression session that outputs retained pixel buffers, such as VideoToolbox.
pub trait PixelBufferSession: Send {
	fn configure(&mut self, codec: VideoCodec, extradata: Option<&[u8]>, width: u32, height: u32) -> Result<()>;

	/// Submit a packet; output may arrive asynchronously.
	fn decode(&mut self, packet: &PacketMetadata, data: &[u8]) -> Result<()>;

	/// Finish every submitted packet.
	fn drain(&mut self) -> Result<()>;

	/// The next decoded buffer in presentation order, if any.
	fn next_frame(&mut self) -> Option<DecodedPixelBuffer>;

	/// Drop pending output without invalidating the session.
	fn flush(&mut self);

	fn invalidate(&mut self);
}

/// Creates platform sessions; registered on the [super::VideoDecoderFactory].
pub trait PixelBufferProvider: Send + Sync {
	fn create(&self) -> Result<Box<dyn PixelBufferSession>>;
}

impl<F> PixelBufferProvider for F
where
	F: Fn() -> Result<Box<dyn PixelBufferSession>> + Send + Sync,
{
	fn create(&self) -> Result<Box<dyn PixelBufferSession>> {
		self()
	}
}

/// Decodes with a platform session, emitting [PixelFormat::PixelBufferSurface] frames.
pub struct PixelBufferVideoDecoder {
	provider: Arc<dyn PixelBufferProvider>,
	session: Option<Box<dyn PixelBufferSession>>,
	output: Output,
	draining: bool,
}

impl PixelBufferVideoDecoder {
	pub fn new(provider: Arc<dyn PixelBufferProvider>) -> Self {
		Self {
			provider,
			session: None,
			output: Output::default(),
			draining: false,
		}
	}
}

impl VideoDecoder for PixelBufferVideoDecoder {
	fn backend(&self) -> DecoderBackend {
		DecoderBackend::VideoToolbox
	}

	fn set_callback(&mut self, callback: FrameCallback) {
		self.output.set_callback(callback);
	}

	fn init(&mut self, info: &VideoStreamInfo) -> Result<()> {
		self.release();

		let mut session = self.provider.create()?;
		session.configure(
			info.codec,
			info.extradata.as_deref(),
			info.format.width,
			info.format.height,
		)?;

		self.session = Some(session);
		self.output.configure(info);
		self.draining = false;

		tracing::info!(codec = ?info.codec, width = info.format.width, height = info.format.height, "pixel buffer decoder initialized");

		Ok(())
	}

	fn decode(&mut self, packet: &MixedBuffer) -> Result<DecodeStatus> {
		let session = self.session.as_mut().ok_or(DecodeError::NotInitialized)?;
		let (metadata, payload) = super::packet_payload(packet)?;

		if payload.is_empty() {
			if !self.draining {
				tracing::debug!("end of stream, draining");
				session.drain()?;
				self.draining = true;
			}
		} else if self.draining {
			return Err(DecodeError::InvalidData("packet after end of stream without a flush".into()));
		} else {
			session.decode(metadata, payload)?;
		}

		let Some(decoded) = session.next_frame() else {
			return Ok(match self.draining {
				true => DecodeStatus::EndOfStream,
				false => DecodeStatus::TryAgain,
			});
		};

		let metadata = VideoFrameMetadata::new(PixelFormat::PixelBufferSurface, decoded.width, decoded.height)
			.with_timestamps(decoded.pts, decoded.pts)
			.with_color(decoded.color)
			.with_context(BufferContext::PixelBuffer(decoded.handle));

		self.output.emit(MixedBuffer::wrap(metadata));
		Ok(DecodeStatus::Decoded)
	}

	fn set_video_format(&mut self, info: &VideoStreamInfo) -> Result<()> {
		// A new format description needs a new session.
		tracing::debug!(codec = ?info.codec, "recreating pixel buffer session");
		self.init(info)
	}

	fn flush(&mut self) -> Result<()> {
		let session = self.session.as_mut().ok_or(DecodeError::NotInitialized)?;
		session.flush();
		self.draining = false;
		Ok(())
	}

	fn release(&mut self) {
		if let Some(mut session) = self.session.take() {
			session.invalidate();
			tracing::debug!("pixel buffer decoder released");
		}
	}
}

impl Drop for PixelBufferVideoDecoder {
	fn drop(&mut self) {
		self.release();
	}
}
