//! The FFmpeg software codec.

use ffmpeg_next as ffmpeg;

use super::{DecodeError, Receive, Result, SendStatus, SoftwareCodec, VideoCodec, VideoStreamInfo};
use crate::{
	BufferContext, ColorDescription, ColorPrimaries, ColorRange, ColorSpace, CpuFrame, MixedBuffer, PacketMetadata,
	PixelFormat, PlaneLayout, TransferCharacteristic, VideoFrameMetadata,
};

/// Decodes with libavcodec, handing out frames without copying their planes.
#[derive(Default)]
pub struct FfmpegCodec {
	decoder: Option<ffmpeg::decoder::Video>,
}

impl FfmpegCodec {
	pub fn new() -> Self {
		Self::default()
	}

	fn decoder(&mut self) -> Result<&mut ffmpeg::decoder::Video> {
		self.decoder.as_mut().ok_or(DecodeError::NotInitialized)
	}
}

impl SoftwareCodec for FfmpegCodec {
	fn open(&mut self, info: &VideoStreamInfo) -> Result<()> {
		// Initialize FFmpeg (idempotent)
		ffmpeg::init().map_err(|e| DecodeError::OpenFailed(e.to_string()))?;

		let id = match info.codec {
			VideoCodec::H264 => ffmpeg::codec::Id::H264,
			VideoCodec::H265 => ffmpeg::codec::Id::HEVC,
			VideoCodec::Vp8 => ffmpeg::codec::Id::VP8,
			VideoCodec::Vp9 => ffmpeg::codec::Id::VP9,
			VideoCodec::Av1 => ffmpeg::codec::Id::AV1,
		};

		let codec = ffmpeg::codec::decoder::find(id).ok_or_else(|| DecodeError::CodecNotFound(format!("{id:?}")))?;
		let mut context = ffmpeg::codec::context::Context::new_with_codec(codec);

		// The extradata must be in place before the codec is opened.
		if let Some(data) = info.extradata.as_deref().filter(|data| !data.is_empty()) {
			let size = i32::try_from(data.len()).map_err(|_| DecodeError::InvalidParams("extradata too large".into()))?;

			unsafe {
				let context = context.as_mut_ptr();
				let padded = data.len() + ffmpeg::sys::AV_INPUT_BUFFER_PADDING_SIZE as usize;
				let extradata = ffmpeg::sys::av_mallocz(padded) as *mut u8;
				if extradata.is_null() {
					return Err(DecodeError::OpenFailed("failed to allocate extradata".into()));
				}

				std::ptr::copy_nonoverlapping(data.as_ptr(), extradata, data.len());
				(*context).extradata = extradata;
				(*context).extradata_size = size;
			}
		}

		let decoder = context
			.decoder()
			.video()
			.map_err(|e| DecodeError::OpenFailed(e.to_string()))?;

		self.decoder = Some(decoder);
		Ok(())
	}

	fn send(&mut self, packet: Option<(&PacketMetadata, &[u8])>) -> Result<SendStatus> {
		let decoder = self.decoder()?;

		let result = match packet {
			Some((metadata, payload)) => {
				let mut packet = ffmpeg::codec::packet::Packet::copy(payload);
				packet.set_pts(Some(metadata.pts));
				packet.set_dts(Some(metadata.dts));
				if metadata.keyframe {
					packet.set_flags(ffmpeg::codec::packet::Flags::KEY);
				}
				decoder.send_packet(&packet)
			}
			None => decoder.send_eof(),
		};

		match result {
			Ok(()) => Ok(SendStatus::Accepted),
			Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(SendStatus::Full),
			Err(e) => Err(map_error(e)),
		}
	}

	fn receive(&mut self) -> Result<Receive> {
		let decoder = self.decoder()?;

		let mut decoded = ffmpeg::frame::Video::empty();
		match decoder.receive_frame(&mut decoded) {
			Ok(()) => Ok(Receive::Frame(convert(decoded))),
			Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(Receive::Again),
			Err(ffmpeg::Error::Eof) => Ok(Receive::Eof),
			Err(e) => Err(map_error(e)),
		}
	}

	fn flush(&mut self) {
		if let Some(decoder) = self.decoder.as_mut() {
			decoder.flush();
		}
	}

	fn close(&mut self) {
		self.decoder = None;
	}
}

fn map_error(err: ffmpeg::Error) -> DecodeError {
	match err {
		ffmpeg::Error::DecoderNotFound => DecodeError::CodecNotFound(err.to_string()),
		_ => DecodeError::InvalidData(err.to_string()),
	}
}

/// Keeps the AVFrame alive until the renderer releases it.
struct FfmpegFrame(ffmpeg::frame::Video);

impl CpuFrame for FfmpegFrame {
	fn plane(&self, index: usize) -> Option<&[u8]> {
		(index < self.0.planes()).then(|| self.0.data(index))
	}
}

fn convert(frame: ffmpeg::frame::Video) -> MixedBuffer {
	use ffmpeg::format::Pixel;

	let (format, full_range) = match frame.format() {
		Pixel::YUV420P => (PixelFormat::Yuv420P, false),
		Pixel::YUVJ420P => (PixelFormat::Yuv420P, true),
		Pixel::NV12 => (PixelFormat::Yuv420SP, false),
		Pixel::YUV420P10LE => (PixelFormat::Yuv420P10LE, false),
		Pixel::RGB24 => (PixelFormat::Rgb888, false),
		Pixel::RGBA => (PixelFormat::Rgba8888, false),
		Pixel::RGB565LE => (PixelFormat::Rgb565, false),
		// Handed through so the renderer rejects it instead of guessing a layout.
		other => (
			PixelFormat::Unknown(ffmpeg::sys::AVPixelFormat::from(other) as i32),
			false,
		),
	};

	let range = match frame.color_range() {
		ffmpeg::color::Range::JPEG => ColorRange::Full,
		_ if full_range => ColorRange::Full,
		_ => ColorRange::Limited,
	};

	let color = ColorDescription {
		space: match frame.color_space() {
			ffmpeg::color::Space::BT470BG | ffmpeg::color::Space::SMPTE170M => ColorSpace::Bt601,
			ffmpeg::color::Space::BT709 => ColorSpace::Bt709,
			ffmpeg::color::Space::BT2020NCL | ffmpeg::color::Space::BT2020CL => ColorSpace::Bt2020,
			_ => ColorSpace::Unspecified,
		},
		range,
		primaries: match frame.color_primaries() {
			ffmpeg::color::Primaries::BT470BG | ffmpeg::color::Primaries::SMPTE170M => ColorPrimaries::Bt601,
			ffmpeg::color::Primaries::BT709 => ColorPrimaries::Bt709,
			ffmpeg::color::Primaries::BT2020 => ColorPrimaries::Bt2020,
			_ => ColorPrimaries::Unspecified,
		},
		transfer: match frame.color_transfer_characteristic() {
			ffmpeg::color::TransferCharacteristic::BT709 => TransferCharacteristic::Bt709,
			ffmpeg::color::TransferCharacteristic::SMPTE2084 => TransferCharacteristic::Smpte2084,
			ffmpeg::color::TransferCharacteristic::ARIB_STD_B67 => TransferCharacteristic::AribStdB67,
			_ => TransferCharacteristic::Unspecified,
		},
	};

	let pts = frame.timestamp().or(frame.pts()).unwrap_or_default();

	let mut metadata = VideoFrameMetadata::new(format, frame.width(), frame.height())
		.with_timestamps(pts, pts)
		.with_color(color);

	// Strides come from the decoder, not the packed layout.
	metadata.planes = (0..format.plane_count().unwrap_or(0))
		.filter_map(|plane| {
			let rows = format.plane_rows(plane, frame.height())?;
			Some(PlaneLayout {
				offset: 0,
				stride: frame.stride(plane),
				rows,
			})
		})
		.collect();

	MixedBuffer::wrap(metadata.with_context(BufferContext::Software(Box::new(FfmpegFrame(frame)))))
}
