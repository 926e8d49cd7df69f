use std::{fmt, sync::Arc};

/// A CPU frame whose planes stay in decoder-owned memory.
pub trait CpuFrame: Send {
	/// The bytes of the given plane, including row padding.
	fn plane(&self, index: usize) -> Option<&[u8]>;
}

/// The codec that owns indexed output slots.
pub trait CodecOutputSink: Send + Sync {
	/// Return the slot to the codec, optionally rendering it to the codec's output surface.
	///
	/// Implementations forward the call to the codec's owning thread when the platform requires it.
	fn release_output_buffer(&self, index: usize, render: bool);
}

/// A retained platform pixel buffer.
pub trait PixelBufferHandle: Send {
	/// A stable identifier the platform texture binder can resolve.
	fn id(&self) -> u64;

	/// Drop our retain on the buffer.
	fn release(self: Box<Self>);
}

/// The reference a hardware frame hands to the texture binder instead of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceRef {
	CodecOutput(usize),
	PixelBuffer(u64),
}

/// An output slot borrowed from a hardware codec.
pub struct CodecOutputBuffer {
	index: usize,
	sink: Arc<dyn CodecOutputSink>,
	released: bool,
}

impl CodecOutputBuffer {
	pub fn new(index: usize, sink: Arc<dyn CodecOutputSink>) -> Self {
		Self {
			index,
			sink,
			released: false,
		}
	}

	pub fn index(&self) -> usize {
		self.index
	}

	fn release(mut self, render: bool) {
		self.released = true;
		self.sink.release_output_buffer(self.index, render);
	}
}

impl Drop for CodecOutputBuffer {
	fn drop(&mut self) {
		if !self.released {
			// The codec will stall once it runs out of slots.
			tracing::warn!(index = self.index, "codec output buffer dropped without release");
		}
	}
}

impl fmt::Debug for CodecOutputBuffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CodecOutputBuffer")
			.field("index", &self.index)
			.field("released", &self.released)
			.finish()
	}
}

/// Backend memory behind a frame, plus the one way to give it back.
pub enum BufferContext {
	/// A CPU frame from a software decoder; freed by dropping it.
	Software(Box<dyn CpuFrame>),

	/// A slot owned by a hardware codec.
	CodecOutput(CodecOutputBuffer),

	/// A retained platform pixel buffer.
	PixelBuffer(Box<dyn PixelBufferHandle>),
}

impl BufferContext {
	/// Hand the memory back to its owner.
	///
	/// `render` tells codecs whether the frame was presented; consuming `self` makes a second call impossible.
	pub fn release(self, render: bool) {
		match self {
			Self::Software(frame) => drop(frame),
			Self::CodecOutput(buffer) => buffer.release(render),
			Self::PixelBuffer(buffer) => buffer.release(),
		}
	}

	/// Plane bytes for software frames.
	pub fn plane(&self, index: usize) -> Option<&[u8]> {
		match self {
			Self::Software(frame) => frame.plane(index),
			_ => None,
		}
	}

	/// The surface reference for hardware frames.
	pub fn surface(&self) -> Option<SurfaceRef> {
		match self {
			Self::Software(_) => None,
			Self::CodecOutput(buffer) => Some(SurfaceRef::CodecOutput(buffer.index)),
			Self::PixelBuffer(buffer) => Some(SurfaceRef::PixelBuffer(buffer.id())),
		}
	}
}

impl fmt::Debug for BufferContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Software(_) => f.write_str("Software"),
			Self::CodecOutput(buffer) => fmt::Debug::fmt(buffer, f),
			Self::PixelBuffer(buffer) => f.debug_tuple("PixelBuffer").field(&buffer.id()).finish(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;

	#[derive(Default)]
	struct Sink {
		released: Mutex<Vec<(usize, bool)>>,
	}

	impl CodecOutputSink for Sink {
		fn release_output_buffer(&self, index: usize, render: bool) {
			self.released.lock().unwrap().push((index, render));
		}
	}

	struct Pixels(Arc<Mutex<u32>>);

	impl PixelBufferHandle for Pixels {
		fn id(&self) -> u64 {
			9
		}

		fn release(self: Box<Self>) {
			*self.0.lock().unwrap() += 1;
		}
	}

	#[test]
	fn test_codec_output_release_forwards_flag() {
		let sink = Arc::new(Sink::default());
		let context = BufferContext::CodecOutput(CodecOutputBuffer::new(3, sink.clone()));

		assert_eq!(context.surface(), Some(SurfaceRef::CodecOutput(3)));
		context.release(true);

		assert_eq!(*sink.released.lock().unwrap(), vec![(3, true)]);
	}

	#[test]
	fn test_pixel_buffer_release() {
		let count = Arc::new(Mutex::new(0));
		let context = BufferContext::PixelBuffer(Box::new(Pixels(count.clone())));

		assert_eq!(context.surface(), Some(SurfaceRef::PixelBuffer(9)));
		context.release(false);

		assert_eq!(*count.lock().unwrap(), 1);
	}

	#[test]
	#[tracing_test::traced_test]
	fn test_codec_output_leak_is_logged() {
		let sink = Arc::new(Sink::default());
		drop(BufferContext::CodecOutput(CodecOutputBuffer::new(1, sink.clone())));

		assert!(sink.released.lock().unwrap().is_empty());
		assert!(logs_contain("dropped without release"));
	}
}
