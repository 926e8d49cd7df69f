//! Quad placement and texture coordinates.
//!
//! The quad is a triangle strip in the order bottom-left, bottom-right, top-left, top-right.
//! Plane rows are uploaded top row first, so `t = 0` is the top of the picture.

use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AspectRatioMode {
	/// Fill the view's width, letterboxing or cropping vertically.
	FitWidth,

	/// Fill the view's height, pillarboxing or cropping horizontally.
	FitHeight,

	/// Show the whole frame.
	#[default]
	Fit,

	/// Cover the whole view, cropping the frame.
	Fill,

	/// Same as [AspectRatioMode::Fill].
	ScaleFill,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RotationMode {
	#[default]
	Rotate0,
	Rotate90,
	Rotate180,
	Rotate270,
	FlipVertical,
	FlipHorizontal,
}

impl RotationMode {
	/// Clockwise rotation from container metadata. Anything but a right angle is ignored.
	pub fn from_degrees(degrees: i32) -> Self {
		match degrees.rem_euclid(360) {
			90 => Self::Rotate90,
			180 => Self::Rotate180,
			270 => Self::Rotate270,
			_ => Self::Rotate0,
		}
	}

	/// Whether the frame's width ends up vertical on screen.
	pub fn swaps_axes(self) -> bool {
		matches!(self, Self::Rotate90 | Self::Rotate270)
	}

	fn tex_coords(self) -> [f32; 8] {
		match self {
			Self::Rotate0 => [0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
			Self::Rotate90 => [1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
			Self::Rotate180 => [1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0],
			Self::Rotate270 => [0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0],
			Self::FlipVertical => [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
			Self::FlipHorizontal => [1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0],
		}
	}
}

/// Sample aspect ratio: the shape of one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sar {
	pub num: u32,
	pub den: u32,
}

impl Sar {
	pub const SQUARE: Self = Self { num: 1, den: 1 };

	pub fn new(num: u32, den: u32) -> Self {
		Self { num, den }
	}

	/// Unknown ratios (a zero on either side) count as square pixels.
	pub fn ratio(self) -> f32 {
		if self.num == 0 || self.den == 0 {
			return 1.0;
		}
		self.num as f32 / self.den as f32
	}
}

impl Default for Sar {
	fn default() -> Self {
		Self::SQUARE
	}
}

impl fmt::Display for Sar {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.num, self.den)
	}
}

/// The size the frame is shown at before fitting, after SAR and rotation.
pub fn display_size(width: u32, height: u32, sar: Sar, rotation: RotationMode) -> (u32, u32) {
	let width = (width as f32 * sar.ratio()).round().max(1.0) as u32;
	match rotation.swaps_axes() {
		true => (height, width),
		false => (width, height),
	}
}

/// How far the quad extends along each axis in clip space, 1.0 being the view's edge.
pub fn vertex_scale(
	frame: (u32, u32),
	view: (u32, u32),
	sar: Sar,
	rotation: RotationMode,
	mode: AspectRatioMode,
) -> (f32, f32) {
	let (width, height) = display_size(frame.0, frame.1, sar, rotation);
	if width == 0 || height == 0 || view.0 == 0 || view.1 == 0 {
		return (1.0, 1.0);
	}

	let frame_aspect = width as f32 / height as f32;
	let view_aspect = view.0 as f32 / view.1 as f32;

	let fit_width = (1.0, view_aspect / frame_aspect);
	let fit_height = (frame_aspect / view_aspect, 1.0);

	// A frame wider than the view overflows horizontally when fitted to the height.
	let wider = frame_aspect > view_aspect;

	match mode {
		AspectRatioMode::FitWidth => fit_width,
		AspectRatioMode::FitHeight => fit_height,
		AspectRatioMode::Fit if wider => fit_width,
		AspectRatioMode::Fit => fit_height,
		AspectRatioMode::Fill | AspectRatioMode::ScaleFill if wider => fit_height,
		AspectRatioMode::Fill | AspectRatioMode::ScaleFill => fit_width,
	}
}

pub fn vertices(scale: (f32, f32)) -> [f32; 8] {
	let (x, y) = scale;
	[-x, -y, x, -y, -x, y, x, y]
}

/// The visible fraction of a plane's texture on each axis.
///
/// Textures are as wide as the stride and as tall as the allocated rows; the shader scales each
/// plane's coordinates by its own crop so row padding is never sampled.
pub fn plane_crop(visible: (u32, u32), padded: (u32, u32)) -> (f32, f32) {
	let ratio = |visible: u32, padded: u32| match padded {
		0 => 1.0,
		padded => (visible as f32 / padded as f32).min(1.0),
	};

	(ratio(visible.0, padded.0), ratio(visible.1, padded.1))
}

/// Everything the quad depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryParams {
	pub frame_width: u32,
	pub frame_height: u32,

	pub view_width: u32,
	pub view_height: u32,

	pub aspect: AspectRatioMode,
	pub rotation: RotationMode,
	pub sar: Sar,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
	pub vertices: [f32; 8],
	pub tex_coords: [f32; 8],
}

impl Geometry {
	pub fn new(params: &GeometryParams) -> Self {
		let scale = vertex_scale(
			(params.frame_width, params.frame_height),
			(params.view_width, params.view_height),
			params.sar,
			params.rotation,
			params.aspect,
		);

		Self {
			vertices: vertices(scale),
			tex_coords: params.rotation.tex_coords(),
		}
	}

	/// The vertical half-extent of the quad in clip space.
	pub fn y_extent(&self) -> f32 {
		self.vertices[5]
	}

	pub fn x_extent(&self) -> f32 {
		self.vertices[2]
	}
}

impl Default for Geometry {
	fn default() -> Self {
		Self {
			vertices: vertices((1.0, 1.0)),
			tex_coords: RotationMode::Rotate0.tex_coords(),
		}
	}
}

/// Recomputes the quad only when one of its inputs changes.
#[derive(Debug, Default)]
pub struct GeometryCache {
	params: Option<GeometryParams>,
	geometry: Geometry,
	updates: usize,
}

impl GeometryCache {
	pub fn update(&mut self, params: GeometryParams) -> &Geometry {
		if self.params != Some(params) {
			self.geometry = Geometry::new(&params);
			self.params = Some(params);
			self.updates += 1;

			tracing::trace!(?params, geometry = ?self.geometry, "geometry updated");
		}

		&self.geometry
	}

	pub fn geometry(&self) -> &Geometry {
		&self.geometry
	}

	/// How many times the quad was recomputed.
	pub fn updates(&self) -> usize {
		self.updates
	}

	pub fn invalidate(&mut self) {
		self.params = None;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn params(frame: (u32, u32), view: (u32, u32)) -> GeometryParams {
		GeometryParams {
			frame_width: frame.0,
			frame_height: frame.1,
			view_width: view.0,
			view_height: view.1,
			aspect: AspectRatioMode::Fit,
			rotation: RotationMode::Rotate0,
			sar: Sar::SQUARE,
		}
	}

	fn close(a: f32, b: f32) -> bool {
		(a - b).abs() < 1e-4
	}

	#[test]
	fn test_fit_landscape_into_portrait() {
		let geometry = Geometry::new(&params((1920, 1080), (1080, 1920)));

		assert!(close(geometry.x_extent(), 1.0));
		// (1080 / 1920) / (1920 / 1080)
		assert!(close(geometry.y_extent(), 0.31640625), "{}", geometry.y_extent());
	}

	#[test]
	fn test_fill_crops_instead() {
		let mut params = params((1920, 1080), (1080, 1920));
		params.aspect = AspectRatioMode::Fill;

		let geometry = Geometry::new(&params);
		assert!(close(geometry.y_extent(), 1.0));
		assert!(geometry.x_extent() > 1.0);

		params.aspect = AspectRatioMode::ScaleFill;
		assert_eq!(Geometry::new(&params), geometry);
	}

	#[test]
	fn test_fit_width_and_height() {
		let frame = (1000, 1000);
		let view = (2000, 1000);

		let width = vertex_scale(frame, view, Sar::SQUARE, RotationMode::Rotate0, AspectRatioMode::FitWidth);
		assert_eq!(width, (1.0, 2.0));

		let height = vertex_scale(frame, view, Sar::SQUARE, RotationMode::Rotate0, AspectRatioMode::FitHeight);
		assert_eq!(height, (0.5, 1.0));

		let fit = vertex_scale(frame, view, Sar::SQUARE, RotationMode::Rotate0, AspectRatioMode::Fit);
		assert_eq!(fit, height);
	}

	#[test]
	fn test_rotation_swaps_aspect() {
		let mut params = params((1920, 1080), (1080, 1920));
		params.rotation = RotationMode::Rotate90;

		// A rotated landscape frame fills a portrait view exactly.
		let geometry = Geometry::new(&params);
		assert!(close(geometry.x_extent(), 1.0));
		assert!(close(geometry.y_extent(), 1.0));
		assert_eq!(geometry.tex_coords, [1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
	}

	#[test]
	fn test_sar_widens_pixels() {
		// 720x576 anamorphic 16:9.
		let (width, height) = display_size(720, 576, Sar::new(64, 45), RotationMode::Rotate0);
		assert_eq!((width, height), (1024, 576));

		assert_eq!(Sar::new(0, 1).ratio(), 1.0);
		assert_eq!(Sar::new(4, 0).ratio(), 1.0);
	}

	#[test]
	fn test_plane_crop() {
		let (x, y) = plane_crop((1920, 1080), (2048, 1088));
		assert!(close(x, 1920.0 / 2048.0));
		assert!(close(y, 1080.0 / 1088.0));

		// Chroma padded more than luma keeps its own fraction.
		let (x, _) = plane_crop((683, 384), (704, 384));
		assert!(close(x, 683.0 / 704.0));

		assert_eq!(plane_crop((16, 16), (0, 0)), (1.0, 1.0));
		assert_eq!(plane_crop((32, 32), (16, 16)), (1.0, 1.0));
	}

	#[test]
	fn test_from_degrees() {
		assert_eq!(RotationMode::from_degrees(90), RotationMode::Rotate90);
		assert_eq!(RotationMode::from_degrees(-90), RotationMode::Rotate270);
		assert_eq!(RotationMode::from_degrees(540), RotationMode::Rotate180);
		assert_eq!(RotationMode::from_degrees(45), RotationMode::Rotate0);
	}

	#[test]
	fn test_cache_recomputes_on_change() {
		let mut cache = GeometryCache::default();
		let params = params((1280, 720), (1280, 720));

		cache.update(params);
		cache.update(params);
		assert_eq!(cache.updates(), 1);

		cache.update(GeometryParams {
			rotation: RotationMode::FlipVertical,
			..params
		});
		assert_eq!(cache.updates(), 2);
		assert_eq!(cache.geometry().tex_coords, [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);

		cache.invalidate();
		cache.update(params);
		assert_eq!(cache.updates(), 3);
	}

	#[test]
	fn test_degenerate_view() {
		assert_eq!(
			vertex_scale((0, 0), (1080, 1920), Sar::SQUARE, RotationMode::Rotate0, AspectRatioMode::Fit),
			(1.0, 1.0)
		);
	}
}
