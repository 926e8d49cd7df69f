//! The tagged container that carries frames, packets and format changes between stages.
//!
//! A [MixedBuffer] either owns a contiguous byte region or wraps memory owned by a decode backend.
//! Backend memory goes back through its [BufferContext] exactly once, via [MixedBuffer::release].
//! Dropping a container frees bytes it owns but never fires a backend release hook; whoever holds
//! the container last (normally the renderer) is responsible for that.

mod context;
mod metadata;

pub use context::*;
pub use metadata::*;

/// The discriminant of a [MixedBuffer].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
	VideoFrame,
	AudioFrame,
	VideoPacket,
	AudioPacket,
	VideoFormat,
}

/// The active payload description; its variant is the buffer's type.
#[derive(Debug)]
pub enum Metadata {
	VideoFrame(VideoFrameMetadata),
	AudioFrame(AudioFrameMetadata),
	VideoPacket(PacketMetadata),
	AudioPacket(PacketMetadata),
	VideoFormat(VideoFormatMetadata),
}

impl Metadata {
	pub fn buffer_type(&self) -> BufferType {
		match self {
			Self::VideoFrame(_) => BufferType::VideoFrame,
			Self::AudioFrame(_) => BufferType::AudioFrame,
			Self::VideoPacket(_) => BufferType::VideoPacket,
			Self::AudioPacket(_) => BufferType::AudioPacket,
			Self::VideoFormat(_) => BufferType::VideoFormat,
		}
	}
}

impl From<VideoFrameMetadata> for Metadata {
	fn from(metadata: VideoFrameMetadata) -> Self {
		Self::VideoFrame(metadata)
	}
}

impl From<AudioFrameMetadata> for Metadata {
	fn from(metadata: AudioFrameMetadata) -> Self {
		Self::AudioFrame(metadata)
	}
}

impl From<VideoFormatMetadata> for Metadata {
	fn from(metadata: VideoFormatMetadata) -> Self {
		Self::VideoFormat(metadata)
	}
}

/// A frame, packet or format change, tagged by its [BufferType].
#[derive(Debug)]
pub struct MixedBuffer {
	// Fixed at construction.
	metadata: Metadata,

	// None once ownership was handed out, or when the memory belongs to a backend.
	data: Option<Vec<u8>>,
}

impl MixedBuffer {
	/// Take ownership of the caller's bytes.
	pub fn from_vec(data: Vec<u8>, metadata: impl Into<Metadata>) -> Self {
		Self {
			metadata: metadata.into(),
			data: Some(data),
		}
	}

	/// Allocate a zeroed region of `capacity` bytes for the caller to fill via [Self::data_mut].
	pub fn allocate(capacity: usize, metadata: impl Into<Metadata>) -> Self {
		Self::from_vec(vec![0; capacity], metadata)
	}

	/// A container without owned bytes, for hardware frames and format changes.
	pub fn wrap(metadata: impl Into<Metadata>) -> Self {
		Self {
			metadata: metadata.into(),
			data: None,
		}
	}

	pub fn video_packet(data: Vec<u8>, metadata: PacketMetadata) -> Self {
		Self::from_vec(data, Metadata::VideoPacket(metadata))
	}

	pub fn audio_packet(data: Vec<u8>, metadata: PacketMetadata) -> Self {
		Self::from_vec(data, Metadata::AudioPacket(metadata))
	}

	pub fn buffer_type(&self) -> BufferType {
		self.metadata.buffer_type()
	}

	/// The number of owned bytes; zero after [Self::obtain_data].
	pub fn size(&self) -> usize {
		self.data.as_ref().map_or(0, Vec::len)
	}

	pub fn data(&self) -> Option<&[u8]> {
		self.data.as_deref()
	}

	pub fn data_mut(&mut self) -> Option<&mut [u8]> {
		self.data.as_deref_mut()
	}

	/// Hand exclusive ownership of the bytes to the caller.
	///
	/// Returns `None` when called a second time or when the container never owned its memory.
	pub fn obtain_data(&mut self) -> Option<Vec<u8>> {
		self.data.take()
	}

	/// Replace the backing store, freeing the previous one if it was owned.
	pub fn update_buffer(&mut self, data: Vec<u8>) {
		self.data = Some(data);
	}

	pub fn metadata(&self) -> &Metadata {
		&self.metadata
	}

	pub fn video_frame_metadata(&self) -> Option<&VideoFrameMetadata> {
		match &self.metadata {
			Metadata::VideoFrame(metadata) => Some(metadata),
			_ => None,
		}
	}

	pub fn video_frame_metadata_mut(&mut self) -> Option<&mut VideoFrameMetadata> {
		match &mut self.metadata {
			Metadata::VideoFrame(metadata) => Some(metadata),
			_ => None,
		}
	}

	pub fn audio_frame_metadata(&self) -> Option<&AudioFrameMetadata> {
		match &self.metadata {
			Metadata::AudioFrame(metadata) => Some(metadata),
			_ => None,
		}
	}

	pub fn packet_metadata(&self) -> Option<&PacketMetadata> {
		match &self.metadata {
			Metadata::VideoPacket(metadata) | Metadata::AudioPacket(metadata) => Some(metadata),
			_ => None,
		}
	}

	pub fn video_format_metadata(&self) -> Option<&VideoFormatMetadata> {
		match &self.metadata {
			Metadata::VideoFormat(metadata) => Some(metadata),
			_ => None,
		}
	}

	/// The bytes of a CPU plane, from the owned region or the software decoder's frame.
	///
	/// Hardware frames have no planes and return `None`.
	pub fn plane(&self, index: usize) -> Option<&[u8]> {
		let metadata = self.video_frame_metadata()?;
		let layout = metadata.planes.get(index)?;

		if let Some(context) = metadata.context() {
			let plane = context.plane(index)?;
			return plane.get(..layout.len());
		}

		self.data.as_deref()?.get(layout.offset..layout.end())
	}

	/// Whether a backend still waits for this buffer.
	pub fn has_release_hook(&self) -> bool {
		self.video_frame_metadata().is_some_and(|metadata| metadata.context().is_some())
	}

	/// Give the memory back to its owner and consume the container.
	///
	/// `render` reports whether the frame was presented.
	pub fn release(mut self, render: bool) {
		if let Some(context) = self.video_frame_metadata_mut().and_then(VideoFrameMetadata::take_context) {
			context.release(render);
		}
	}
}
