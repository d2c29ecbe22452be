//! Graded approximate equality of `f32` values and slices.
//!
//! Training results differ between kernel providers in the last bits, so
//! comparisons rate the distance instead of answering yes or no.

/// Largest absolute difference still rated [`ApproxEquality::Relative`].
pub const F32_MAX_ERROR: f32 = 1e-3;

/// Largest absolute difference still rated [`ApproxEquality::Partial`].
pub const F32_AVG_ERROR: f32 = 1e-5;

/// Largest absolute difference still rated [`ApproxEquality::Precise`].
pub const F32_MIN_ERROR: f32 = 1e-6;

/// How close two values are, best first.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Within [`F32_MIN_ERROR`].
    Precise = 0,
    /// Within [`F32_AVG_ERROR`].
    Partial = 1,
    /// Within [`F32_MAX_ERROR`].
    Relative = 2,
    /// Not equal.
    Scarce = 3,
}

/// Rates the distance to another value.
pub trait RelativeEq<Rhs: ?Sized> {
    /// The rating of `self` against `rhs`.
    fn approx_eq(&self, rhs: &Rhs) -> ApproxEquality;
}

impl RelativeEq<Self> for f32 {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        let dif = (self - rhs).abs();
        if dif < F32_MIN_ERROR {
            ApproxEquality::Precise
        } else if dif < F32_AVG_ERROR {
            ApproxEquality::Partial
        } else if dif < F32_MAX_ERROR {
            ApproxEquality::Relative
        } else {
            ApproxEquality::Scarce
        }
    }
}

// The worst element decides; slices of different lengths are never equal.
impl RelativeEq<Self> for [f32] {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        if self.len() != rhs.len() {
            return ApproxEquality::Scarce;
        }
        let mut eq = ApproxEquality::Precise;
        for (a, b) in self.iter().zip(rhs) {
            eq = eq.max(a.approx_eq(b));
            if eq == ApproxEquality::Scarce {
                break;
            }
        }
        eq
    }
}

impl<const N: usize> RelativeEq<Self> for [f32; N] {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        self.as_slice().approx_eq(rhs.as_slice())
    }
}

/// Whether `a` and `b` are [`ApproxEquality::Precise`].
pub fn approx_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a.approx_eq(b) == ApproxEquality::Precise
}

/// Whether `a` and `b` are rated `tolerance` or better.
pub fn approx_within<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B, tolerance: ApproxEquality) -> bool {
    a.approx_eq(b) <= tolerance
}
