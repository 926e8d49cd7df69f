use std::{
	collections::VecDeque,
	sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::{
	DecodeError, DecodeStatus, DecoderBackend, FrameCallback, Output, Result, VideoCodec, VideoDecoder, VideoStreamInfo,
};
use crate::{
	BufferContext, CodecOutputBuffer, CodecOutputSink, ColorDescription, HardwareContext, MixedBuffer, NativeWindow,
	PacketMetadata, PixelFormat, VideoFrameMetadata,
};

/// Parameters handed to [HardwareCodec::configure].
#[derive(Debug, Clone)]
pub struct CodecConfig<'a> {
	pub codec: VideoCodec,
	pub width: u32,
	pub height: u32,
	pub extradata: Option<&'a [u8]>,

	/// The surface decoded frames are rendered into.
	pub window: Option<NativeWindow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
	Queued,

	/// No input slot is free; drain some output first.
	Full,
}

/// The layout of the codec's output slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecFormat {
	pub width: u32,
	pub height: u32,
	pub stride: u32,
	pub slice_height: u32,
	pub color: ColorDescription,
}

/// A filled output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOutputInfo {
	pub index: usize,

	/// Presentation timestamp in milliseconds.
	pub pts: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecOutput {
	Buffer(CodecOutputInfo),
	FormatChanged(CodecFormat),
	TryAgain,
	EndOfStream,
}

/// The bridge to a platform codec with indexed output slots, such as MediaCodec or OH AVCodec.
///
/// Methods take `&self` because slots are released from the render thread while the decode thread
/// keeps queueing input. Implementations that must call the platform on a specific thread forward
/// the call there.
pub trait HardwareCodec: Send + Sync {
	fn configure(&self, config: &CodecConfig<'_>) -> Result<()>;

	fn queue_input(&self, packet: &PacketMetadata, data: &[u8]) -> Result<InputStatus>;

	fn queue_end_of_stream(&self) -> Result<()>;

	fn dequeue_output(&self) -> Result<CodecOutput>;

	/// Return an output slot, rendering it to the configured surface when `render` is set.
	fn release_output_buffer(&self, index: usize, render: bool);

	fn flush(&self) -> Result<()>;

	fn stop(&self);
}

/// Creates platform codecs; registered on the [super::VideoDecoderFactory].
pub trait HardwareCodecProvider: Send + Sync {
	fn create(&self, codec: VideoCodec) -> Result<Arc<dyn HardwareCodec>>;
}

impl<F> HardwareCodecProvider for F
where
	F: Fn(VideoCodec) -> Result<Arc<dyn HardwareCodec>> + Send + Sync,
{
	fn create(&self, codec: VideoCodec) -> Result<Arc<dyn HardwareCodec>> {
		self(codec)
	}
}

// Bumped whenever outstanding slots become invalid. A slot is released while holding the lock,
// and the codec is flushed or stopped while holding it, so the two never interleave.
#[derive(Debug, Default)]
struct Generation(Mutex<u64>);

impl Generation {
	fn lock(&self) -> MutexGuard<'_, u64> {
		self.0.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

// Returns slots to the codec unless they were invalidated by a flush.
struct SlotReleaser {
	codec: Arc<dyn HardwareCodec>,
	generation: Arc<Generation>,
	issued: u64,
}

impl CodecOutputSink for SlotReleaser {
	fn release_output_buffer(&self, index: usize, render: bool) {
		let generation = self.generation.lock();
		if *generation != self.issued {
			// The codec already reclaimed every slot when it was flushed or stopped.
			tracing::debug!(index, "skipping release of stale codec slot");
			return;
		}

		self.codec.release_output_buffer(index, render);
	}
}

/// Decodes with a platform codec, emitting [PixelFormat::MediaCodecSurface] frames.
pub struct CodecVideoDecoder {
	provider: Arc<dyn HardwareCodecProvider>,
	codec: Option<Arc<dyn HardwareCodec>>,
	output: Output,

	generation: Arc<Generation>,

	format: Option<CodecFormat>,
	pending: VecDeque<(PacketMetadata, Vec<u8>)>,
	draining: bool,
	eos_queued: bool,
}

impl CodecVideoDecoder {
	pub fn new(provider: Arc<dyn HardwareCodecProvider>) -> Self {
		Self {
			provider,
			codec: None,
			output: Output::default(),
			generation: Arc::default(),
			format: None,
			pending: VecDeque::new(),
			draining: false,
			eos_queued: false,
		}
	}

	fn codec(&self) -> Result<Arc<dyn HardwareCodec>> {
		self.codec.clone().ok_or(DecodeError::NotInitialized)
	}

	fn configure(&mut self, info: &VideoStreamInfo) -> Result<()> {
		let codec = self.provider.create(info.codec)?;

		let config = CodecConfig {
			codec: info.codec,
			width: info.format.width,
			height: info.format.height,
			extradata: info.extradata.as_deref(),
			window: info.format.hardware.as_ref().map(HardwareContext::window),
		};

		if config.window.is_none() {
			tracing::warn!("no output window, codec frames cannot be rendered");
		}

		codec.configure(&config)?;

		self.codec = Some(codec);
		self.output.configure(info);
		self.format = None;
		self.draining = false;
		self.eos_queued = false;

		Ok(())
	}

	// Queue as many parked packets as the codec has room for.
	fn feed(&mut self, codec: &dyn HardwareCodec) -> Result<()> {
		while let Some((metadata, data)) = self.pending.front() {
			match codec.queue_input(metadata, data)? {
				InputStatus::Queued => {
					self.pending.pop_front();
				}
				InputStatus::Full => break,
			}
		}

		if self.draining && self.pending.is_empty() && !self.eos_queued {
			codec.queue_end_of_stream()?;
			self.eos_queued = true;
		}

		Ok(())
	}


	fn frame(&self, codec: &Arc<dyn HardwareCodec>, info: CodecOutputInfo) -> MixedBuffer {
		let releaser = SlotReleaser {
			codec: codec.clone(),
			generation: self.generation.clone(),
			issued: *self.generation.lock(),
		};

		let (width, height, color, coded_height) = match self.format {
			Some(format) => (
				format.width,
				format.height,
				format.color,
				(format.slice_height > format.height).then_some(format.slice_height),
			),
			None => (0, 0, ColorDescription::default(), None),
		};

		let mut metadata = VideoFrameMetadata::new(PixelFormat::MediaCodecSurface, width, height)
			.with_timestamps(info.pts, info.pts)
			.with_color(color)
			.with_context(BufferContext::CodecOutput(CodecOutputBuffer::new(
				info.index,
				Arc::new(releaser),
			)));
		metadata.coded_height = coded_height;

		MixedBuffer::wrap(metadata)
	}
}

impl VideoDecoder for CodecVideoDecoder {
	fn backend(&self) -> DecoderBackend {
		DecoderBackend::MediaCodec
	}

	fn set_callback(&mut self, callback: FrameCallback) {
		self.output.set_callback(callback);
	}

	fn init(&mut self, info: &VideoStreamInfo) -> Result<()> {
		self.release();
		self.configure(info)?;

		tracing::info!(codec = ?info.codec, width = info.format.width, height = info.format.height, "codec decoder initialized");

		Ok(())
	}

	fn decode(&mut self, packet: &MixedBuffer) -> Result<DecodeStatus> {
		let codec = self.codec()?;
		let (metadata, payload) = super::packet_payload(packet)?;

		if payload.is_empty() {
			if !self.draining {
				tracing::debug!("end of stream, draining");
				self.draining = true;
			}
			self.feed(codec.as_ref())?;
		} else if self.draining {
			return Err(DecodeError::InvalidData("packet after end of stream without a flush".into()));
		} else {
			self.pending.push_back((metadata.clone(), payload.to_vec()));
			self.feed(codec.as_ref())?;
		}

		loop {
			match codec.dequeue_output()? {
				CodecOutput::FormatChanged(format) => {
					tracing::debug!(?format, "codec output format changed");
					self.format = Some(format);
				}
				CodecOutput::Buffer(info) => {
					let frame = self.frame(&codec, info);
					self.output.emit(frame);

					// A slot was consumed, so there may be room for parked input.
					if !self.pending.is_empty() {
						self.feed(codec.as_ref())?;
					}

					return Ok(DecodeStatus::Decoded);
				}
				CodecOutput::TryAgain => return Ok(DecodeStatus::TryAgain),
				CodecOutput::EndOfStream => return Ok(DecodeStatus::EndOfStream),
			}
		}
	}

	fn set_video_format(&mut self, info: &VideoStreamInfo) -> Result<()> {
		tracing::debug!(codec = ?info.codec, "reconfiguring codec decoder");
		self.init(info)
	}

	fn flush(&mut self) -> Result<()> {
		let codec = self.codec()?;

		self.pending.clear();
		self.draining = false;
		self.eos_queued = false;

		// Waits for any release in progress; later ones see the new generation.
		let mut generation = self.generation.lock();
		*generation += 1;
		codec.flush()
	}

	fn release(&mut self) {
		let Some(codec) = self.codec.take() else {
			return;
		};

		self.pending.clear();

		let mut generation = self.generation.lock();
		*generation += 1;
		codec.stop();
		drop(generation);

		tracing::debug!("codec decoder released");
	}
}

impl Drop for CodecVideoDecoder {
	fn drop(&mut self) {
		self.release();
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use std::{sync::mpsc, time::Duration};

	#[derive(Debug, Clone, PartialEq, Eq)]
	pub(crate) enum Call {
		Configure { window: bool },
		Queue(i64),
		EndOfStream,
		Release(usize, bool),
		Flush,
		Stop,
	}

	/// A codec with `slots` input slots that outputs queued packets in order.
	#[derive(Default)]
	pub(crate) struct FakeCodec {
		pub calls: Mutex<Vec<Call>>,
		pub slots: usize,
		queue: Mutex<VecDeque<i64>>,
		format_sent: Mutex<bool>,
		eos: Mutex<bool>,
		next_index: Mutex<usize>,

		// When set, a release signals the first channel and then waits on the second.
		release_gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
	}

	impl FakeCodec {
		pub fn new(slots: usize) -> Arc<Self> {
			Arc::new(Self {
				slots,
				..Default::default()
			})
		}

		pub fn calls(&self) -> Vec<Call> {
			self.calls.lock().unwrap().clone()
		}

		fn record(&self, call: Call) {
			self.calls.lock().unwrap().push(call);
		}
	}

	impl HardwareCodec for FakeCodec {
		fn configure(&self, config: &CodecConfig<'_>) -> Result<()> {
			self.record(Call::Configure {
				window: config.window.is_some(),
			});
			Ok(())
		}

		fn queue_input(&self, packet: &PacketMetadata, _data: &[u8]) -> Result<InputStatus> {
			let mut queue = self.queue.lock().unwrap();
			if queue.len() >= self.slots {
				return Ok(InputStatus::Full);
			}

			queue.push_back(packet.pts);
			self.record(Call::Queue(packet.pts));
			Ok(InputStatus::Queued)
		}

		fn queue_end_of_stream(&self) -> Result<()> {
			*self.eos.lock().unwrap() = true;
			self.record(Call::EndOfStream);
			Ok(())
		}

		fn dequeue_output(&self) -> Result<CodecOutput> {
			let mut format_sent = self.format_sent.lock().unwrap();
			if !*format_sent {
				*format_sent = true;
				return Ok(CodecOutput::FormatChanged(CodecFormat {
					width: 1920,
					height: 1080,
					stride: 1920,
					slice_height: 1088,
					color: ColorDescription::default(),
				}));
			}

			if let Some(pts) = self.queue.lock().unwrap().pop_front() {
				let mut index = self.next_index.lock().unwrap();
				*index += 1;
				return Ok(CodecOutput::Buffer(CodecOutputInfo { index: *index, pts }));
			}

			Ok(match *self.eos.lock().unwrap() {
				true => CodecOutput::EndOfStream,
				false => CodecOutput::TryAgain,
			})
		}

		fn release_output_buffer(&self, index: usize, render: bool) {
			self.record(Call::Release(index, render));

			if let Some((entered, resume)) = self.release_gate.lock().unwrap().as_ref() {
				entered.send(()).unwrap();
				resume.recv().unwrap();
			}
		}

		fn flush(&self) -> Result<()> {
			self.queue.lock().unwrap().clear();
			*self.eos.lock().unwrap() = false;
			self.record(Call::Flush);
			Ok(())
		}

		fn stop(&self) {
			self.record(Call::Stop);
		}
	}

	pub(crate) fn provider(codec: Arc<FakeCodec>) -> Arc<dyn HardwareCodecProvider> {
		Arc::new(move |_codec: VideoCodec| -> Result<Arc<dyn HardwareCodec>> { Ok(codec.clone() as Arc<dyn HardwareCodec>) })
	}

	fn packet(pts: i64) -> MixedBuffer {
		MixedBuffer::video_packet(
			vec![0; 4],
			PacketMetadata {
				pts,
				..Default::default()
			},
		)
	}

	fn frames(decoder: &mut CodecVideoDecoder) -> Arc<Mutex<Vec<MixedBuffer>>> {
		let frames = Arc::new(Mutex::new(Vec::new()));
		let sink = frames.clone();
		decoder.set_callback(Box::new(move |buffer| {
			if buffer.video_frame_metadata().is_some() {
				sink.lock().unwrap().push(buffer);
			}
		}));
		frames
	}

	#[test]
	fn test_frames_carry_codec_slots() {
		let codec = FakeCodec::new(4);
		let mut decoder = CodecVideoDecoder::new(provider(codec.clone()));
		let frames = frames(&mut decoder);

		decoder.init(&VideoStreamInfo::new(VideoCodec::H264, 1920, 1080)).unwrap();
		assert_eq!(decoder.decode(&packet(33)), Ok(DecodeStatus::Decoded));

		let frame = frames.lock().unwrap().pop().unwrap();
		let metadata = frame.video_frame_metadata().unwrap();
		assert_eq!(metadata.format, PixelFormat::MediaCodecSurface);
		assert_eq!(metadata.pts, 33);
		assert_eq!(metadata.coded_height, Some(1088));
		assert!(metadata.planes.is_empty());

		frame.release(true);
		assert_eq!(
			codec.calls(),
			vec![Call::Configure { window: false }, Call::Queue(33), Call::Release(1, true)]
		);
	}

	#[test]
	fn test_full_input_is_parked() {
		let codec = FakeCodec::new(0);
		let mut decoder = CodecVideoDecoder::new(provider(codec.clone()));
		decoder.init(&VideoStreamInfo::new(VideoCodec::H265, 640, 360)).unwrap();

		assert_eq!(decoder.decode(&packet(1)), Ok(DecodeStatus::TryAgain));
		assert_eq!(decoder.pending.len(), 1);
	}

	#[test]
	fn test_drain_to_end_of_stream() {
		let codec = FakeCodec::new(4);
		let mut decoder = CodecVideoDecoder::new(provider(codec.clone()));
		let frames = frames(&mut decoder);
		decoder.init(&VideoStreamInfo::new(VideoCodec::H264, 1920, 1080)).unwrap();

		let eos = MixedBuffer::video_packet(Vec::new(), PacketMetadata::default());
		assert_eq!(decoder.decode(&eos), Ok(DecodeStatus::EndOfStream));
		assert_eq!(decoder.decode(&eos), Ok(DecodeStatus::EndOfStream));
		assert!(frames.lock().unwrap().is_empty());
		assert_eq!(codec.calls().iter().filter(|call| **call == Call::EndOfStream).count(), 1);
	}

	#[test]
	fn test_stale_slots_are_not_released_after_flush() {
		let codec = FakeCodec::new(4);
		let mut decoder = CodecVideoDecoder::new(provider(codec.clone()));
		let frames = frames(&mut decoder);
		decoder.init(&VideoStreamInfo::new(VideoCodec::H264, 1920, 1080)).unwrap();

		decoder.decode(&packet(0)).unwrap();
		decoder.flush().unwrap();

		let frame = frames.lock().unwrap().pop().unwrap();
		frame.release(true);

		assert!(!codec.calls().iter().any(|call| matches!(call, Call::Release(..))));
	}

	#[test]
	fn test_flush_waits_for_release_in_progress() {
		let codec = FakeCodec::new(4);
		let (entered_tx, entered_rx) = mpsc::channel();
		let (resume_tx, resume_rx) = mpsc::channel();
		*codec.release_gate.lock().unwrap() = Some((entered_tx, resume_rx));

		let mut decoder = CodecVideoDecoder::new(provider(codec.clone()));
		let frames = frames(&mut decoder);
		decoder.init(&VideoStreamInfo::new(VideoCodec::H264, 1920, 1080)).unwrap();
		decoder.decode(&packet(0)).unwrap();

		let frame = frames.lock().unwrap().pop().unwrap();
		let releasing = std::thread::spawn(move || frame.release(true));
		entered_rx.recv().unwrap();

		let flushing = std::thread::spawn(move || {
			decoder.flush().unwrap();
			decoder
		});

		// The slot is still being handed back, so the codec must not be flushed yet.
		std::thread::sleep(Duration::from_millis(50));
		assert!(!codec.calls().contains(&Call::Flush));

		resume_tx.send(()).unwrap();
		releasing.join().unwrap();
		let decoder = flushing.join().unwrap();

		let calls = codec.calls();
		assert_eq!(&calls[calls.len() - 2..], &[Call::Release(1, true), Call::Flush]);
		drop(decoder);
	}

	#[test]
	fn test_release_is_idempotent() {
		let codec = FakeCodec::new(4);
		let mut decoder = CodecVideoDecoder::new(provider(codec.clone()));
		decoder.init(&VideoStreamInfo::new(VideoCodec::H264, 1920, 1080)).unwrap();

		decoder.release();
		decoder.release();
		drop(decoder);

		assert_eq!(codec.calls().iter().filter(|call| **call == Call::Stop).count(), 1);
	}
}
