//! YUV to RGB conversion matrices.
//!
//! Each matrix is column-major, ready for `glUniformMatrix3fv` without transposing, and expects
//! the shader to subtract the range offset first.

use crate::{ColorRange, ColorSpace};

pub type ColorMatrix = [f32; 9];

const fn matrix(ky: f32, gu: f32, bu: f32, rv: f32, gv: f32) -> ColorMatrix {
	[ky, ky, ky, 0.0, gu, bu, rv, gv, 0.0]
}

pub const BT601_LIMITED: ColorMatrix = matrix(1.164384, -0.391762, 2.017232, 1.596027, -0.812968);
pub const BT601_FULL: ColorMatrix = matrix(1.0, -0.344136, 1.772, 1.402, -0.714136);
pub const BT709_LIMITED: ColorMatrix = matrix(1.164384, -0.213249, 2.112402, 1.792741, -0.532909);
pub const BT709_FULL: ColorMatrix = matrix(1.0, -0.187324, 1.8556, 1.5748, -0.468124);
pub const BT2020_LIMITED: ColorMatrix = matrix(1.164384, -0.187326, 2.141772, 1.678674, -0.650424);
pub const BT2020_FULL: ColorMatrix = matrix(1.0, -0.164553, 1.8814, 1.4746, -0.571353);

// Limited 10-bit samples normalized by 1023 span 876 (luma) and 896 (chroma) codes rather than
// the 219 and 224 of 8-bit samples normalized by 255.
const fn ten_bit(m: ColorMatrix) -> ColorMatrix {
	let y = (1023.0 / 876.0) / (255.0 / 219.0);
	let c = (1023.0 / 896.0) / (255.0 / 224.0);
	[m[0] * y, m[1] * y, m[2] * y, m[3] * c, m[4] * c, m[5] * c, m[6] * c, m[7] * c, m[8] * c]
}

pub const BT601_LIMITED_10: ColorMatrix = ten_bit(BT601_LIMITED);
pub const BT709_LIMITED_10: ColorMatrix = ten_bit(BT709_LIMITED);
pub const BT2020_LIMITED_10: ColorMatrix = ten_bit(BT2020_LIMITED);

/// Pick the matrix for a frame. Streams that don't declare a space are treated as BT.709.
pub fn select(space: ColorSpace, range: ColorRange) -> &'static ColorMatrix {
	match (space, range) {
		(ColorSpace::Bt601, ColorRange::Limited) => &BT601_LIMITED,
		(ColorSpace::Bt601, ColorRange::Full) => &BT601_FULL,
		(ColorSpace::Bt709 | ColorSpace::Unspecified, ColorRange::Limited) => &BT709_LIMITED,
		(ColorSpace::Bt709 | ColorSpace::Unspecified, ColorRange::Full) => &BT709_FULL,
		(ColorSpace::Bt2020, ColorRange::Limited) => &BT2020_LIMITED,
		(ColorSpace::Bt2020, ColorRange::Full) => &BT2020_FULL,
	}
}

/// Like [select], for samples of `bit_depth` bits normalized by their own maximum.
pub fn select_for_depth(space: ColorSpace, range: ColorRange, bit_depth: u8) -> &'static ColorMatrix {
	if bit_depth <= 8 || range == ColorRange::Full {
		return select(space, range);
	}

	match space {
		ColorSpace::Bt601 => &BT601_LIMITED_10,
		ColorSpace::Bt709 | ColorSpace::Unspecified => &BT709_LIMITED_10,
		ColorSpace::Bt2020 => &BT2020_LIMITED_10,
	}
}
