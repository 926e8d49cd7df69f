//! # frameflow: frame hand-off and OpenGL ES rendering for media playback
//!
//! Decoded video frames come from very different places: a CPU decoder, a platform codec that
//! lends out output slots, or a platform session that hands out pixel buffers. `frameflow`
//! carries all of them in one container and puts them on screen through OpenGL ES, while making
//! sure each frame's memory goes back to its owner exactly once.
//!
//! ## Overview
//!
//! - **Buffer**: [MixedBuffer], the tagged container for frames, packets and format changes.
//! - **Decode**: the [decode::VideoDecoder] trait, its backends, and the factory choosing one.
//! - **GPU**: the EGL context wrapper and the GL command interface.
//! - **Shader**: GLSL sources per pixel format.
//! - **Filter**: color matrices, quad geometry and plane textures.
//! - **Render**: [render::VideoRender] and the frame release contract.
//!
//! All GL work for one renderer happens on one thread; [render::SharedRender] serializes callers.
mod buffer;

pub mod decode;
pub mod filter;
pub mod gpu;
pub mod render;
pub mod shader;

#[cfg(test)]
mod testing;

pub use buffer::*;
