/*! Window functions.

Blackman-Harris here is periodic (divides by N); Hamming is the
symmetric form (divides by N-1).

<https://en.wikipedia.org/wiki/Window_function>
<https://en.wikipedia.org/wiki/Spectral_leakage>

Windows can be generated in two layouts: one weight per sample, or with
each weight replicated into two adjacent lanes so the window lines up
with interleaved (re, im) complex samples.
*/
use crate::aligned::{ALIGNMENT, AlignedVec};
use crate::{Error, Result, Scalar};

/// Window type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    /// Blackman-Harris window.
    BlackmanHarris,

    /// Hamming window.
    Hamming,
}

impl WindowType {
    /// Parse a window property value.
    ///
    /// The empty string means "no window" and maps to `None`; anything
    /// other than the recognized names is a configuration error.
    pub fn parse(name: &str) -> Result<Option<WindowType>> {
        match name {
            "" => Ok(None),
            "BLACKMAN_HARRIS" => Ok(Some(WindowType::BlackmanHarris)),
            "HAMMING" => Ok(Some(WindowType::Hamming)),
            other => Err(Error::config(format!("unknown window type {other:?}"))),
        }
    }

    /// Generate the window.
    ///
    /// Returns `length` weights, or `2 * length` with each weight
    /// doubled into adjacent lanes when `complex` is set.
    pub fn make<S: Scalar>(&self, length: usize, complex: bool) -> Result<AlignedVec<S>> {
        match self {
            WindowType::BlackmanHarris => blackman_harris(length, complex),
            WindowType::Hamming => hamming(length, complex),
        }
    }
}

fn fill<S: Scalar>(
    length: usize,
    complex: bool,
    f: impl Fn(f64) -> f64,
) -> Result<AlignedVec<S>> {
    let mut window = AlignedVec::new(ALIGNMENT, length * if complex { 2 } else { 1 })?;
    for n in 0..length {
        let val = S::from_f64(f(n as f64));
        if complex {
            window[n * 2] = val;
            window[n * 2 + 1] = val;
        } else {
            window[n] = val;
        }
    }
    Ok(window)
}

/// Create a Blackman-Harris window.
///
/// <https://en.wikipedia.org/wiki/Window_function#Blackman%E2%80%93Harris_window>
pub fn blackman_harris<S: Scalar>(length: usize, complex: bool) -> Result<AlignedVec<S>> {
    // Parameters.
    const A0: f64 = 0.35875;
    const A1: f64 = 0.48829;
    const A2: f64 = 0.14128;
    const A3: f64 = 0.01168;

    let m = length as f64;
    fill(length, complex, |n| {
        let t1 = 2.0 * std::f64::consts::PI * n / m;
        let t2 = 4.0 * std::f64::consts::PI * n / m;
        let t3 = 6.0 * std::f64::consts::PI * n / m;
        A0 - A1 * t1.cos() + A2 * t2.cos() - A3 * t3.cos()
    })
}

/// Create a Hamming window.
///
/// <https://en.wikipedia.org/wiki/Window_function#Hann_and_Hamming_windows>
pub fn hamming<S: Scalar>(length: usize, complex: bool) -> Result<AlignedVec<S>> {
    const A0: f64 = 0.54;
    const A1: f64 = 0.46;

    let m = (length - 1) as f64;
    fill(length, complex, |n| {
        A0 - A1 * (2.0 * std::f64::consts::PI * n / m).cos()
    })
}

/* vim: textwidth=80
 */
