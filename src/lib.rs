#![warn(missing_docs)]
/*! Pluggable signal-processing components for streaming RF/IQ pipelines.

This crate provides the components of a DSP pipeline for digitized RF
data, plus the low-level numerical primitives they share. Each component
is a unit with typed input/output ports, a small set of named
properties, and a `process()` callback that an external scheduler (the
host framework, not part of this crate) drives.

Numerical payloads travel between components as owned, 64-byte aligned
buffers ([`aligned::AlignedVec`]), so every stage can use wide aligned
loads and stores. Network packets travel as byte vectors and are parsed
in place by zero-copy overlays ([`vita49`], [`sdds`]).

# Architecture overview

A typical pipeline:

```text
   [ UdpSource ]          batches of raw datagrams
        ↓
   [ Stov or Fft ]        frame into aligned sample buffers
        ↓                 (Fft also transforms in place)
   [ Psd ]                power spectral density, dB
        ↓
   [ ExpSmooth ]          one-pole smoothing across frames
        ↓
   [ AlignedMemWriter ]   capped binary capture
```

[`Histogram`](histogram::Histogram) taps raw packet bytes directly, and
[`FileWriter`](file_writer::FileWriter) captures extracted packet
payloads.

# Example

Push a synthesized frame through the smoother by hand, the way the host
scheduler would:

```
use iqflow::component::{Component, Retval};
use iqflow::components::ExpSmooth;
use iqflow::aligned::AlignedVec;
use iqflow::port::{Timestamp, channel};

let (tx, rx) = channel();
let (mut smooth, out) = ExpSmooth::<f32>::new(rx);
smooth.initialize()?;
tx.push(AlignedVec::new(64, 16)?, Timestamp::default());
assert!(matches!(smooth.process()?, Retval::Normal));
assert_eq!(out.pop().unwrap().0.len(), 16);
# Ok::<(), iqflow::Error>(())
```
*/

// Components.
pub mod aligned_mem_writer;
pub mod exp_smooth;
pub mod fft;
pub mod file_writer;
pub mod histogram;
pub mod psd;
pub mod stov;
pub mod udp_source;

// Shared infrastructure.
pub mod aligned;
pub mod component;
pub mod components;
pub mod kernels;
pub mod port;
pub mod sdds;
pub mod vita49;
pub mod windows;

/// Float type used by the convenience aliases. The components themselves
/// are generic over [`Scalar`].
pub type Float = f32;

/// Complex (I/Q) data.
pub type Complex = num_complex::Complex<Float>;

/// Crate error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad property value or bad combination of properties, found at
    /// `initialize()`. The component refuses to run.
    #[error("configuration error: {0}")]
    Config(String),

    /// Aligned allocation failed. Fatal for the component.
    #[error("aligned allocation of {0} bytes failed")]
    Alloc(usize),

    /// A packet overlay did not fit the byte span it was given.
    #[error("packet overlay error: {0}")]
    Overlay(String),

    /// Out of range buffer access.
    #[error("index {index} out of range for length {len}")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Buffer length in elements.
        len: usize,
    },

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}

/// Crate result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Floating point scalar understood by the lane-batched kernels.
///
/// Implemented for `f32` (16 lanes per step) and `f64` (8 lanes per
/// step); the kernels and components are written against exactly these
/// two.
pub trait Scalar:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + std::fmt::Debug
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + std::ops::Div<Output = Self>
    + 'static
{
    /// Elements processed per kernel step.
    const LANES: usize;

    /// Additive identity.
    const ZERO: Self;

    /// Multiplicative identity.
    const ONE: Self;

    /// Conversion from f64, used when generating coefficients.
    fn from_f64(v: f64) -> Self;

    /// Fused multiply-add: `self * a + b`.
    fn mul_add(self, a: Self, b: Self) -> Self;

    /// Base-10 logarithm.
    fn log10(self) -> Self;
}

impl Scalar for f32 {
    const LANES: usize = 16;
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        f32::mul_add(self, a, b)
    }
    fn log10(self) -> Self {
        f32::log10(self)
    }
}

impl Scalar for f64 {
    const LANES: usize = 8;
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    fn from_f64(v: f64) -> Self {
        v
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        f64::mul_add(self, a, b)
    }
    fn log10(self) -> Self {
        f64::log10(self)
    }
}

/// Element type of framed sample buffers: bare scalars or interleaved
/// complex. The framers fill buffers of these in scalar lanes.
pub trait FrameElem: Copy + Default + Send + Sync + 'static {
    /// Underlying scalar.
    type Scalar: Scalar;

    /// Scalar lanes per element: 1 for real, 2 for complex.
    const SCALARS: usize;

    /// View a slice of elements as its interleaved scalar lanes.
    fn as_scalars_mut(elems: &mut [Self]) -> &mut [Self::Scalar];
}

impl FrameElem for f32 {
    type Scalar = f32;
    const SCALARS: usize = 1;
    fn as_scalars_mut(elems: &mut [Self]) -> &mut [f32] {
        elems
    }
}

impl FrameElem for f64 {
    type Scalar = f64;
    const SCALARS: usize = 1;
    fn as_scalars_mut(elems: &mut [Self]) -> &mut [f64] {
        elems
    }
}

impl<S: Scalar> FrameElem for num_complex::Complex<S> {
    type Scalar = S;
    const SCALARS: usize = 2;
    fn as_scalars_mut(elems: &mut [Self]) -> &mut [S] {
        // SAFETY: Complex<S> is repr(C) { re, im }, so n complex elements
        // are exactly 2n interleaved scalars.
        unsafe { std::slice::from_raw_parts_mut(elems.as_mut_ptr() as *mut S, elems.len() * 2) }
    }
}

/* vim: textwidth=80
 */
