use std::{fmt, sync::Arc};

use super::{
	CodecVideoDecoder, DecodeError, HardwareCodecProvider, PixelBufferProvider, PixelBufferVideoDecoder, Result,
	SoftwareCodec, SoftwareVideoDecoder, VideoDecoder, VideoStreamInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DecoderBackend {
	#[default]
	Software,

	/// Codec output slots rendered into an external texture (MediaCodec, OH AVCodec).
	MediaCodec,

	/// Retained bi-planar pixel buffers (VideoToolbox).
	VideoToolbox,
}

impl fmt::Display for DecoderBackend {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Software => write!(f, "software"),
			Self::MediaCodec => write!(f, "mediacodec"),
			Self::VideoToolbox => write!(f, "videotoolbox"),
		}
	}
}

type SoftwareProvider = Arc<dyn Fn() -> Box<dyn SoftwareCodec> + Send + Sync>;

/// Chooses a [VideoDecoder] implementation for a [DecoderBackend].
///
/// Platform bridges are registered here; nothing else needs to know which backends exist.
#[derive(Clone)]
pub struct VideoDecoderFactory {
	software: Option<SoftwareProvider>,
	media_codec: Option<Arc<dyn HardwareCodecProvider>>,
	video_toolbox: Option<Arc<dyn PixelBufferProvider>>,
}

impl Default for VideoDecoderFactory {
	fn default() -> Self {
		#[cfg(feature = "decode")]
		let software: Option<SoftwareProvider> = Some(Arc::new(|| -> Box<dyn SoftwareCodec> {
			Box::new(super::FfmpegCodec::new())
		}));
		#[cfg(not(feature = "decode"))]
		let software: Option<SoftwareProvider> = None;

		Self {
			software,
			media_codec: None,
			video_toolbox: None,
		}
	}
}

impl VideoDecoderFactory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Use a different CPU codec for the software backend.
	pub fn with_software<F>(mut self, create: F) -> Self
	where
		F: Fn() -> Box<dyn SoftwareCodec> + Send + Sync + 'static,
	{
		self.software = Some(Arc::new(create));
		self
	}

	pub fn with_media_codec(mut self, provider: Arc<dyn HardwareCodecProvider>) -> Self {
		self.media_codec = Some(provider);
		self
	}

	pub fn with_video_toolbox(mut self, provider: Arc<dyn PixelBufferProvider>) -> Self {
		self.video_toolbox = Some(provider);
		self
	}

	pub fn supports(&self, backend: DecoderBackend) -> bool {
		match backend {
			DecoderBackend::Software => self.software.is_some(),
			DecoderBackend::MediaCodec => self.media_codec.is_some(),
			DecoderBackend::VideoToolbox => self.video_toolbox.is_some(),
		}
	}

	/// Create an uninitialized decoder for the backend.
	pub fn create(&self, backend: DecoderBackend) -> Result<Box<dyn VideoDecoder>> {
		let missing = || DecodeError::CodecNotFound(format!("no {backend} decoder registered"));

		Ok(match backend {
			DecoderBackend::Software => {
				let create = self.software.as_ref().ok_or_else(missing)?;
				Box::new(SoftwareVideoDecoder::new(create()))
			}
			DecoderBackend::MediaCodec => {
				let provider = self.media_codec.clone().ok_or_else(missing)?;
				Box::new(CodecVideoDecoder::new(provider))
			}
			DecoderBackend::VideoToolbox => {
				let provider = self.video_toolbox.clone().ok_or_else(missing)?;
				Box::new(PixelBufferVideoDecoder::new(provider))
			}
		})
	}

	/// Create and initialize a decoder, falling back to software when the hardware backend
	/// is missing or refuses the stream.
	pub fn create_with_fallback(&self, backend: DecoderBackend, info: &VideoStreamInfo) -> Result<Box<dyn VideoDecoder>> {
		let err = match self.create(backend).and_then(|mut decoder| {
			decoder.init(info)?;
			Ok(decoder)
		}) {
			Ok(decoder) => return Ok(decoder),
			Err(err) if backend != DecoderBackend::Software => err,
			Err(err) => return Err(err),
		};

		tracing::warn!(%backend, %err, "hardware decoder unavailable, falling back to software");

		let mut decoder = self.create(DecoderBackend::Software)?;
		decoder.init(info)?;
		Ok(decoder)
	}
}

impl fmt::Debug for VideoDecoderFactory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("VideoDecoderFactory")
			.field("software", &self.software.is_some())
			.field("media_codec", &self.media_codec.is_some())
			.field("video_toolbox", &self.video_toolbox.is_some())
			.finish()
	}
}
