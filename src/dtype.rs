//! Element type descriptors.
//!
//! A [`Dtype`] is shared, immutable metadata: how many bytes one element
//! takes, how large the type-specific parameter block is, and how to print an
//! element. The planner parameterizes every size computation by it.
//!
//! The engine computes in `f32`. `Q31` and `Q7` describe fixed-point tensors
//! produced by an external calibration step; their parameter block is a
//! [`QParams`] (shift and zero point) stored next to the data.

use core::fmt;

/// Per-type metadata consumed by size and layout computations.
pub struct Dtype {
    /// Short type name, e.g. `"f32"`.
    pub name: &'static str,
    /// Bytes per element.
    pub size: usize,
    /// Bytes of the type-specific parameter block attached to each tensor.
    pub tensor_params_size: usize,
    /// Debug hook printing one element stored in `bytes`.
    pub fmt_element: fn(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result,
}

impl Dtype {
    /// Whether tensors of this type carry a parameter block.
    #[must_use]
    pub const fn has_params(&self) -> bool {
        self.tensor_params_size != 0
    }
}

impl fmt::Debug for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl PartialEq for Dtype {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Dtype {}

/// Fixed-point quantization parameters: `real = (q - zero_point) / 2^shift`.
///
/// The in-memory footprint matches the parameter block the planner reserves:
/// 8 bytes for `Q31`, 4 bytes for `Q7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QParams {
    /// Number of fractional bits.
    pub shift: u16,
    /// Integer representing real zero.
    pub zero_point: i32,
}

impl QParams {
    /// Creates quantization parameters.
    #[must_use]
    pub const fn new(shift: u16, zero_point: i32) -> Self {
        Self { shift, zero_point }
    }

    /// Maps a real value onto the fixed-point grid, saturating to `[min, max]`.
    #[must_use]
    pub fn quantize(&self, x: f32, min: i32, max: i32) -> i32 {
        let scaled = libm::roundf(libm::ldexpf(x, i32::from(self.shift))) as i64;
        scaled.saturating_add(i64::from(self.zero_point)).clamp(i64::from(min), i64::from(max)) as i32
    }

    /// Maps a fixed-point value back to a real value.
    #[must_use]
    pub fn dequantize(&self, q: i32) -> f32 {
        libm::ldexpf((i64::from(q) - i64::from(self.zero_point)) as f32, -i32::from(self.shift))
    }
}

fn fmt_f32(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match bytes.try_into() {
        Ok(raw) => write!(f, "{:.6}", f32::from_ne_bytes(raw)),
        Err(_) => f.write_str("?"),
    }
}

fn fmt_q31(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match bytes.try_into() {
        Ok(raw) => write!(f, "{}", i32::from_ne_bytes(raw)),
        Err(_) => f.write_str("?"),
    }
}

fn fmt_q7(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match bytes {
        [b] => write!(f, "{}", i8::from_ne_bytes([*b])),
        _ => f.write_str("?"),
    }
}

/// 32-bit IEEE float, the type every default kernel computes in.
pub static F32: Dtype = Dtype {
    name: "f32",
    size: 4,
    tensor_params_size: 0,
    fmt_element: fmt_f32,
};

/// 32-bit fixed point with a [`QParams`] block.
pub static Q31: Dtype = Dtype {
    name: "q31",
    size: 4,
    tensor_params_size: 8,
    fmt_element: fmt_q31,
};

/// 8-bit fixed point with a [`QParams`] block.
pub static Q7: Dtype = Dtype {
    name: "q7",
    size: 1,
    tensor_params_size: 4,
    fmt_element: fmt_q7,
};
