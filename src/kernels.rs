/*! Lane-batched sample conversion and windowing kernels.

Every function here processes exactly one lane group per call: 16
elements for an `f32` destination, 8 for `f64` ([`Scalar::LANES`]).
They are written as fixed-trip-count loops over slices so the compiler
emits wide vector code; the callers drive them with aligned, 64-byte
destination buffers and arbitrary (possibly unaligned) integer sources.

The integer source types each floating point path accepts are encoded
in the [`Lane`] trait: the 16-lane `f32` path takes 16/32-bit integers,
the 8-lane `f64` path additionally takes 64-bit ones. Passing anything
else does not compile.
*/
use crate::Scalar;

/// Integer sample type accepted by the lane path targeting `S`.
pub trait Lane<S: Scalar>: Copy + Send + Sync + 'static {
    /// Reverse the bytes within the element.
    fn swap_bytes(self) -> Self;

    /// Widen to the destination scalar, preserving signedness.
    fn widen(self) -> S;
}

macro_rules! lane_impl {
    ($($int:ty => $scalar:ty),+ $(,)?) => {
        $(
            impl Lane<$scalar> for $int {
                fn swap_bytes(self) -> Self {
                    <$int>::swap_bytes(self)
                }
                fn widen(self) -> $scalar {
                    self as $scalar
                }
            }
        )+
    };
}

lane_impl!(
    i16 => f32, u16 => f32, i32 => f32, u32 => f32,
    i16 => f64, u16 => f64, i32 => f64, u32 => f64, i64 => f64, u64 => f64,
);

/// Convert a single integer sample.
///
/// The scalar reference for the lane kernels, also used for payload
/// tails shorter than one lane group.
#[inline]
pub fn convert_scalar<S: Scalar, I: Lane<S>>(v: I, byteswap: bool) -> S {
    if byteswap { v.swap_bytes().widen() } else { v.widen() }
}

/// Convert one lane group of integer samples to floating point.
///
/// Reads and writes exactly [`Scalar::LANES`] elements.
#[inline]
pub fn convert<S: Scalar, I: Lane<S>>(src: &[I], dst: &mut [S], byteswap: bool) {
    let src = &src[..S::LANES];
    let dst = &mut dst[..S::LANES];
    if byteswap {
        for (d, s) in dst.iter_mut().zip(src) {
            *d = s.swap_bytes().widen();
        }
    } else {
        for (d, s) in dst.iter_mut().zip(src) {
            *d = s.widen();
        }
    }
}

/// Convert one lane group and multiply by a window slice.
///
/// With `window == None` this is plain [`convert`].
#[inline]
pub fn convert_windowed<S: Scalar, I: Lane<S>>(
    src: &[I],
    window: Option<&[S]>,
    dst: &mut [S],
    byteswap: bool,
) {
    convert(src, dst, byteswap);
    if let Some(w) = window {
        for (d, w) in dst[..S::LANES].iter_mut().zip(&w[..S::LANES]) {
            *d = *d * *w;
        }
    }
}

/// Multiply one lane group element-wise by a window slice.
#[inline]
pub fn apply_window<S: Scalar>(data: &[S], window: &[S], dst: &mut [S]) {
    let data = &data[..S::LANES];
    let window = &window[..S::LANES];
    for ((d, x), w) in dst[..S::LANES].iter_mut().zip(data).zip(window) {
        *d = *x * *w;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_one<S: Scalar, I: Lane<S>>(src: &[I]) {
        for byteswap in [false, true] {
            let mut dst = vec![S::ZERO; S::LANES];
            convert(src, &mut dst, byteswap);
            for (lane, (&got, &s)) in dst.iter().zip(src).enumerate() {
                let want = if byteswap {
                    s.swap_bytes().widen()
                } else {
                    s.widen()
                };
                assert_eq!(got, want, "lane {lane} byteswap {byteswap}");
            }
        }
    }

    #[test]
    fn convert_matches_scalar_reference() {
        let i16s: Vec<i16> = (0..16).map(|i| (i * 1000 - 8000) as i16).collect();
        let u16s: Vec<u16> = (0..16).map(|i| (i * 4000) as u16).collect();
        let i32s: Vec<i32> = (0..16).map(|i| i * 100_000 - 800_000).collect();
        let u32s: Vec<u32> = (0..16).map(|i| i as u32 * 200_000).collect();
        check_one::<f32, i16>(&i16s);
        check_one::<f32, u16>(&u16s);
        check_one::<f32, i32>(&i32s);
        check_one::<f32, u32>(&u32s);
        check_one::<f64, i16>(&i16s[..8]);
        check_one::<f64, u16>(&u16s[..8]);
        check_one::<f64, i32>(&i32s[..8]);
        check_one::<f64, u32>(&u32s[..8]);
        let i64s: Vec<i64> = (0..8).map(|i| i * 10_000_000_000 - 40_000_000_000).collect();
        let u64s: Vec<u64> = (0..8).map(|i| i as u64 * 20_000_000_000).collect();
        check_one::<f64, i64>(&i64s);
        check_one::<f64, u64>(&u64s);
    }

    #[test]
    fn byteswap_then_sign() {
        // 0x0180 byte-swapped is 0x8001, which must read back negative.
        let src = [0x0180i16; 16];
        let mut dst = [0.0f32; 16];
        convert(&src, &mut dst, true);
        assert_eq!(dst[0], -32767.0);
    }

    #[test]
    fn windowed_is_convert_times_window() {
        let src: Vec<i16> = (0..16).map(|i| (i * 512) as i16).collect();
        let window: Vec<f32> = (0..16).map(|i| 0.25 + i as f32 / 32.0).collect();
        let mut plain = [0.0f32; 16];
        let mut windowed = [0.0f32; 16];
        convert(&src, &mut plain, false);
        convert_windowed(&src, Some(&window), &mut windowed, false);
        for i in 0..16 {
            assert_eq!(windowed[i], plain[i] * window[i]);
        }
        // None window degrades to plain convert.
        let mut none = [0.0f32; 16];
        convert_windowed(&src, None, &mut none, false);
        assert_eq!(none, plain);
    }

    #[test]
    fn apply_window_elementwise() {
        let data = [2.0f64; 8];
        let window: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let mut dst = [0.0f64; 8];
        apply_window(&data, &window, &mut dst);
        for i in 0..8 {
            assert_eq!(dst[i], 2.0 * i as f64);
        }
    }
}
/* vim: textwidth=80
 */
