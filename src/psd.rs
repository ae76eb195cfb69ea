/*! Power spectral density.

Turns a complex spectrum into per-bin power in dB: `|X[k]|²` normalized
by the sample rate and the sum of the squared window samples, then
`10·log10`. The window named here must match the one applied before the
transform, since its squared sum is the normalization factor.
*/
use num_complex::Complex;

use crate::aligned::AlignedVec;
use crate::component::{Component, PropertyValue, Retval};
use crate::port::{InputPort, OutputPort, channel};
use crate::windows::WindowType;
use crate::{Error, Result, Scalar};

/// PSD component.
///
/// Input: complex spectra of `fft_size` bins. Output: real PSD buffers
/// of the same length, in dB.
pub struct Psd<T: Scalar> {
    // Properties.
    window_name: String,
    fft_size: u32,
    sample_rate: f64,

    // Ports.
    src: InputPort<AlignedVec<Complex<T>>>,
    dst: OutputPort<AlignedVec<T>>,

    // Members. Reciprocal of `Fs * Σw²`, set at initialize.
    scale: Option<T>,
}

impl<T: Scalar> Psd<T> {
    /// Create a new Psd component reading spectra from `src`.
    pub fn new(src: InputPort<AlignedVec<Complex<T>>>) -> (Self, InputPort<AlignedVec<T>>) {
        let (dst, dr) = channel();
        (
            Self {
                window_name: String::new(),
                fft_size: 1024,
                sample_rate: 1.0,
                src,
                dst,
                scale: None,
            },
            dr,
        )
    }
}

impl<T: Scalar> Component for Psd<T> {
    fn name(&self) -> &str {
        "psd"
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        match name {
            "window" => self.window_name = value.into_string(name)?,
            "fft_size" => self.fft_size = value.into_u32(name)?,
            "sample_rate" => self.sample_rate = value.into_f64(name)?,
            _ => return Err(Error::config(format!("psd: unknown property {name}"))),
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<()> {
        let size = self.fft_size as usize;
        if size == 0 || size % T::LANES != 0 {
            return Err(Error::config(format!(
                "fft_size {size} is not a positive multiple of {} bins",
                T::LANES
            )));
        }
        if !(self.sample_rate > 0.0) {
            return Err(Error::config(format!(
                "sample_rate {} must be positive",
                self.sample_rate
            )));
        }
        // Σw² of the effective window; a missing window is rectangular,
        // whose squared sum is just the bin count.
        let window_sum = match WindowType::parse(&self.window_name)? {
            Some(wt) => {
                let w = wt.make::<T>(size, false)?;
                let mut acc = T::ZERO;
                for &v in w.iter() {
                    acc = v.mul_add(v, acc);
                }
                acc
            }
            None => T::from_f64(size as f64),
        };
        self.scale = Some(T::ONE / (T::from_f64(self.sample_rate) * window_sum));
        Ok(())
    }

    fn process(&mut self) -> Result<Retval> {
        let scale = self
            .scale
            .ok_or_else(|| Error::config("psd: process before initialize"))?;
        let Some((data, ts)) = self.src.pop() else {
            return Ok(Retval::Noop);
        };
        let mut psd = AlignedVec::<T>::new(data.alignment(), data.len())?;
        let ten = T::from_f64(10.0);
        for (bins, out) in data
            .chunks_exact(T::LANES)
            .zip(psd.chunks_exact_mut(T::LANES))
        {
            // Power per bin, normalized by Fs and the window sum.
            for (o, c) in out.iter_mut().zip(bins) {
                *o = c.im.mul_add(c.im, c.re * c.re) * scale;
            }
            // To dB. Non-positive power passes through untouched rather
            // than collapsing to -inf.
            for o in out.iter_mut() {
                if *o > T::ZERO {
                    *o = ten * o.log10();
                }
            }
        }
        self.dst.push(psd, ts);
        Ok(Retval::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::Timestamp;

    fn make(
        window: &str,
        fft_size: u32,
        fs: f64,
    ) -> anyhow::Result<(
        OutputPort<AlignedVec<Complex<f32>>>,
        Psd<f32>,
        InputPort<AlignedVec<f32>>,
    )> {
        let (tx, rx) = channel();
        let (mut psd, out) = Psd::<f32>::new(rx);
        psd.set_property("window", window.into())?;
        psd.set_property("fft_size", PropertyValue::U32(fft_size))?;
        psd.set_property("sample_rate", PropertyValue::F64(fs))?;
        psd.initialize()?;
        Ok((tx, psd, out))
    }

    #[test]
    fn rectangular_normalization() -> anyhow::Result<()> {
        let n = 16u32;
        let fs = 1000.0;
        let (tx, mut psd, out) = make("", n, fs)?;
        let mut spec = AlignedVec::<Complex<f32>>::with_default_alignment(n as usize)?;
        spec[3] = Complex::new(3.0, 4.0); // |X|² = 25
        tx.push(spec, Timestamp::new(5, 6));
        assert_eq!(psd.process()?, Retval::Normal);
        let (got, ts) = out.pop().unwrap();
        assert_eq!(ts, Timestamp::new(5, 6));
        let want = 10.0 * (25.0 / (fs as f32 * n as f32)).log10();
        assert!((got[3] - want).abs() < 1e-4);
        // Zero-power bins pass through as zero, not -inf.
        assert_eq!(got[0], 0.0);
        Ok(())
    }

    #[test]
    fn window_sum_normalization() -> anyhow::Result<()> {
        let n = 32u32;
        let (tx, mut psd, out) = make("BLACKMAN_HARRIS", n, 1.0)?;
        let w = crate::windows::blackman_harris::<f32>(n as usize, false)?;
        let wsum: f32 = w.iter().map(|v| v * v).sum();
        let mut spec = AlignedVec::<Complex<f32>>::with_default_alignment(n as usize)?;
        spec[0] = Complex::new(1.0, 0.0);
        tx.push(spec, Timestamp::default());
        psd.process()?;
        let (got, _) = out.pop().unwrap();
        let want = 10.0 * (1.0 / wsum).log10();
        assert!((got[0] - want).abs() < 1e-3, "{} vs {want}", got[0]);
        Ok(())
    }

    #[test]
    fn reject_bad_config() -> anyhow::Result<()> {
        assert!(make("HANN", 16, 1.0).is_err());
        assert!(make("", 0, 1.0).is_err());
        assert!(make("", 20, 1.0).is_err()); // not a lane multiple
        assert!(make("", 16, 0.0).is_err());
        Ok(())
    }

    #[test]
    fn noop_without_input() -> anyhow::Result<()> {
        let (_tx, mut psd, _out) = make("", 16, 1.0)?;
        assert_eq!(psd.process()?, Retval::Noop);
        Ok(())
    }
}
/* vim: textwidth=80
 */
