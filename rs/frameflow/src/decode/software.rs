use std::collections::VecDeque;

use super::{DecodeError, DecodeStatus, DecoderBackend, FrameCallback, Output, Result, VideoDecoder, VideoStreamInfo};
use crate::{MixedBuffer, PacketMetadata};

/// The result of handing a packet to a [SoftwareCodec].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
	Accepted,

	/// The codec must output a frame before it takes more input.
	Full,
}

/// The result of asking a [SoftwareCodec] for a frame.
#[derive(Debug)]
pub enum Receive {
	Frame(MixedBuffer),

	/// More input is needed.
	Again,

	/// Fully drained after end of stream.
	Eof,
}

/// A CPU codec with separate send and receive steps.
pub trait SoftwareCodec: Send {
	fn open(&mut self, info: &VideoStreamInfo) -> Result<()>;

	/// Send a packet, or `None` to signal end of stream.
	fn send(&mut self, packet: Option<(&PacketMetadata, &[u8])>) -> Result<SendStatus>;

	fn receive(&mut self) -> Result<Receive>;

	/// Drop buffered frames and reset the decode state.
	fn flush(&mut self);

	fn close(&mut self);
}

/// Drives a [SoftwareCodec] one packet at a time.
pub struct SoftwareVideoDecoder {
	codec: Box<dyn SoftwareCodec>,
	output: Output,
	opened: bool,

	// End of stream was sent; only empty packets are accepted until a flush.
	draining: bool,

	// Frames pulled out to make room for input, emitted one per call.
	ready: VecDeque<MixedBuffer>,
}

impl SoftwareVideoDecoder {
	pub fn new(codec: Box<dyn SoftwareCodec>) -> Self {
		Self {
			codec,
			output: Output::default(),
			opened: false,
			draining: false,
			ready: VecDeque::new(),
		}
	}

	// Keep sending until the codec accepts, parking any frames it has to give up first.
	fn push(&mut self, packet: Option<(&PacketMetadata, &[u8])>) -> Result<()> {
		loop {
			match self.codec.send(packet)? {
				SendStatus::Accepted => return Ok(()),
				SendStatus::Full => match self.codec.receive()? {
					Receive::Frame(frame) => self.ready.push_back(frame),
					Receive::Again | Receive::Eof => {
						return Err(DecodeError::InvalidData(
							"codec refused input without producing output".into(),
						));
					}
				},
			}
		}
	}

	fn discard_ready(&mut self) {
		for frame in self.ready.drain(..) {
			frame.release(false);
		}
	}
}

impl VideoDecoder for SoftwareVideoDecoder {
	fn backend(&self) -> DecoderBackend {
		DecoderBackend::Software
	}

	fn set_callback(&mut self, callback: FrameCallback) {
		self.output.set_callback(callback);
	}

	fn init(&mut self, info: &VideoStreamInfo) -> Result<()> {
		if self.opened {
			self.release();
		}

		self.codec.open(info)?;
		self.output.configure(info);
		self.opened = true;
		self.draining = false;

		tracing::info!(codec = ?info.codec, width = info.format.width, height = info.format.height, "software decoder initialized");

		Ok(())
	}

	fn decode(&mut self, packet: &MixedBuffer) -> Result<DecodeStatus> {
		if !self.opened {
			return Err(DecodeError::NotInitialized);
		}

		let (metadata, payload) = super::packet_payload(packet)?;

		if payload.is_empty() {
			if !self.draining {
				tracing::debug!("end of stream, draining");
				self.push(None)?;
				self.draining = true;
			}
		} else if self.draining {
			return Err(DecodeError::InvalidData("packet after end of stream without a flush".into()));
		} else if let Some(frame) = self.ready.pop_front() {
			// Emptying the parked frames first keeps them bounded by what the codec held.
			self.output.emit(frame);
			return Ok(DecodeStatus::Resend);
		} else {
			self.push(Some((metadata, payload)))?;
		}

		if let Some(frame) = self.ready.pop_front() {
			self.output.emit(frame);
			return Ok(DecodeStatus::Decoded);
		}

		match self.codec.receive()? {
			Receive::Frame(frame) => {
				self.output.emit(frame);
				Ok(DecodeStatus::Decoded)
			}
			Receive::Again => Ok(DecodeStatus::TryAgain),
			Receive::Eof => Ok(DecodeStatus::EndOfStream),
		}
	}

	fn set_video_format(&mut self, info: &VideoStreamInfo) -> Result<()> {
		tracing::debug!(codec = ?info.codec, "renegotiating software decoder");
		self.init(info)
	}

	fn flush(&mut self) -> Result<()> {
		if !self.opened {
			return Err(DecodeError::NotInitialized);
		}

		self.discard_ready();
		self.codec.flush();
		self.draining = false;

		Ok(())
	}

	fn release(&mut self) {
		if !self.opened {
			return;
		}

		self.discard_ready();
		self.codec.close();
		self.opened = false;
		self.draining = false;

		tracing::debug!("software decoder released");
	}
}

impl Drop for SoftwareVideoDecoder {
	fn drop(&mut self) {
		self.release();
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::{BufferType, PixelFormat, VideoFrameMetadata, decode::VideoCodec};
	use std::sync::{Arc, Mutex};

	/// Holds `delay` frames before it starts returning them, like a codec with B-frame reordering.
	#[derive(Default)]
	pub(crate) struct DelayCodec {
		pub delay: usize,

		// Each packet decodes to this many frames (pts * 10 + n), when above one.
		pub frames_per_packet: usize,

		// Refuse input while a frame is waiting to be received.
		pub backpressure: bool,

		queued: VecDeque<i64>,
		eof: bool,
		pub closed: Arc<Mutex<usize>>,
	}

	impl DelayCodec {
		pub fn new(delay: usize) -> Self {
			Self {
				delay,
				..Default::default()
			}
		}

		fn frame(pts: i64) -> MixedBuffer {
			let metadata = VideoFrameMetadata::new(PixelFormat::Yuv420P, 2, 2).with_timestamps(pts, pts);
			MixedBuffer::allocate(6, metadata)
		}
	}

	impl SoftwareCodec for DelayCodec {
		fn open(&mut self, _info: &VideoStreamInfo) -> Result<()> {
			self.queued.clear();
			self.eof = false;
			Ok(())
		}

		fn send(&mut self, packet: Option<(&PacketMetadata, &[u8])>) -> Result<SendStatus> {
			if self.backpressure && self.queued.len() > self.delay {
				return Ok(SendStatus::Full);
			}

			match packet {
				Some((metadata, _)) if self.frames_per_packet > 1 => {
					let frames = self.frames_per_packet as i64;
					self.queued.extend((0..frames).map(|n| metadata.pts * 10 + n));
				}
				Some((metadata, _)) => self.queued.push_back(metadata.pts),
				None => self.eof = true,
			}

			Ok(SendStatus::Accepted)
		}

		fn receive(&mut self) -> Result<Receive> {
			if self.eof || self.queued.len() > self.delay {
				if let Some(pts) = self.queued.pop_front() {
					return Ok(Receive::Frame(Self::frame(pts)));
				}
			}

			Ok(if self.eof { Receive::Eof } else { Receive::Again })
		}

		fn flush(&mut self) {
			self.queued.clear();
			self.eof = false;
		}

		fn close(&mut self) {
			*self.closed.lock().unwrap() += 1;
		}
	}

	fn packet(pts: i64) -> MixedBuffer {
		let metadata = PacketMetadata {
			pts,
			dts: pts,
			..Default::default()
		};
		MixedBuffer::video_packet(vec![0xAA; 8], metadata)
	}

	fn eos() -> MixedBuffer {
		MixedBuffer::video_packet(Vec::new(), PacketMetadata::default())
	}

	fn collect(decoder: &mut SoftwareVideoDecoder) -> Arc<Mutex<Vec<i64>>> {
		let frames = Arc::new(Mutex::new(Vec::new()));
		let sink = frames.clone();
		decoder.set_callback(Box::new(move |buffer| {
			if let Some(metadata) = buffer.video_frame_metadata() {
				sink.lock().unwrap().push(metadata.pts);
			}
		}));
		frames
	}

	fn info() -> VideoStreamInfo {
		VideoStreamInfo::new(VideoCodec::H264, 2, 2)
	}

	#[test]
	fn test_not_initialized() {
		let mut decoder = SoftwareVideoDecoder::new(Box::new(DelayCodec::new(0)));
		assert_eq!(decoder.decode(&packet(0)), Err(DecodeError::NotInitialized));
	}

	#[test]
	fn test_pipelined_decode_and_drain() {
		let mut decoder = SoftwareVideoDecoder::new(Box::new(DelayCodec::new(2)));
		let frames = collect(&mut decoder);
		decoder.init(&info()).unwrap();

		assert_eq!(decoder.decode(&packet(0)), Ok(DecodeStatus::TryAgain));
		assert_eq!(decoder.decode(&packet(40)), Ok(DecodeStatus::TryAgain));
		assert_eq!(decoder.decode(&packet(80)), Ok(DecodeStatus::Decoded));
		assert_eq!(*frames.lock().unwrap(), vec![0]);

		assert_eq!(decoder.decode(&eos()), Ok(DecodeStatus::Decoded));
		assert_eq!(decoder.decode(&eos()), Ok(DecodeStatus::Decoded));
		assert_eq!(decoder.decode(&eos()), Ok(DecodeStatus::EndOfStream));
		assert_eq!(decoder.decode(&eos()), Ok(DecodeStatus::EndOfStream));

		assert_eq!(*frames.lock().unwrap(), vec![0, 40, 80]);
	}

	#[test]
	fn test_full_codec_parks_frames() {
		let mut codec = DelayCodec::new(0);
		codec.frames_per_packet = 2;
		codec.backpressure = true;

		let mut decoder = SoftwareVideoDecoder::new(Box::new(codec));
		let frames = collect(&mut decoder);
		decoder.init(&info()).unwrap();

		// Never more than one frame per call, even when the codec has two to give.
		for pts in 0..3 {
			assert_eq!(decoder.decode(&packet(pts)), Ok(DecodeStatus::Decoded));
		}
		assert_eq!(*frames.lock().unwrap(), vec![0, 1, 10]);

		for _ in 0..3 {
			assert_eq!(decoder.decode(&eos()), Ok(DecodeStatus::Decoded));
		}
		assert_eq!(decoder.decode(&eos()), Ok(DecodeStatus::EndOfStream));
		assert_eq!(*frames.lock().unwrap(), vec![0, 1, 10, 11, 20, 21]);
	}

	#[test]
	fn test_parked_frames_stay_bounded() {
		let mut codec = DelayCodec::new(0);
		codec.frames_per_packet = 2;
		codec.backpressure = true;

		let mut decoder = SoftwareVideoDecoder::new(Box::new(codec));
		let frames = collect(&mut decoder);
		decoder.init(&info()).unwrap();

		for pts in 0..1000 {
			while decoder.decode(&packet(pts)) == Ok(DecodeStatus::Resend) {
				assert!(decoder.ready.len() <= 1, "{} parked at {pts}", decoder.ready.len());
			}
			assert!(decoder.ready.len() <= 1, "{} parked at {pts}", decoder.ready.len());
		}

		while decoder.decode(&eos()) == Ok(DecodeStatus::Decoded) {}

		let expected: Vec<i64> = (0..1000).flat_map(|pts| [pts * 10, pts * 10 + 1]).collect();
		assert_eq!(*frames.lock().unwrap(), expected);
	}

	#[test]
	fn test_packet_after_eos_requires_flush() {
		let mut decoder = SoftwareVideoDecoder::new(Box::new(DelayCodec::new(0)));
		collect(&mut decoder);
		decoder.init(&info()).unwrap();

		assert_eq!(decoder.decode(&eos()), Ok(DecodeStatus::EndOfStream));
		assert!(matches!(decoder.decode(&packet(1)), Err(DecodeError::InvalidData(_))));

		decoder.flush().unwrap();
		assert_eq!(decoder.decode(&packet(1)), Ok(DecodeStatus::Decoded));
	}

	#[test]
	fn test_format_container_precedes_first_frame() {
		let mut decoder = SoftwareVideoDecoder::new(Box::new(DelayCodec::new(0)));
		let types = Arc::new(Mutex::new(Vec::new()));
		let sink = types.clone();
		decoder.set_callback(Box::new(move |buffer| sink.lock().unwrap().push(buffer.buffer_type())));
		decoder.init(&info()).unwrap();

		decoder.decode(&packet(0)).unwrap();
		assert_eq!(*types.lock().unwrap(), vec![BufferType::VideoFormat, BufferType::VideoFrame]);
	}

	#[test]
	fn test_release_is_idempotent() {
		let codec = DelayCodec::new(0);
		let closed = codec.closed.clone();

		let mut decoder = SoftwareVideoDecoder::new(Box::new(codec));
		decoder.init(&info()).unwrap();
		decoder.release();
		decoder.release();
		drop(decoder);

		assert_eq!(*closed.lock().unwrap(), 1);
		let mut decoder = SoftwareVideoDecoder::new(Box::new(DelayCodec::new(0)));
		assert_eq!(decoder.flush(), Err(DecodeError::NotInitialized));
	}
}
