/*! Exponential smoother.

One-pole IIR across successive buffers of the same length:
`s[k] = α·x[k] + (1−α)·s[k−1]` per bin, processed in lane groups with a
fused multiply-add. With `α = 1` the component is a pass-through; the
first buffer after initialization seeds the state unchanged.
*/
use log::warn;

use crate::aligned::AlignedVec;
use crate::component::{Component, PropertyValue, Retval};
use crate::port::{InputPort, OutputPort, channel};
use crate::{Error, Result, Scalar};

/// Exponential smoother component.
pub struct ExpSmooth<T: Scalar> {
    // Properties.
    alpha: f64,

    // Ports.
    src: InputPort<AlignedVec<T>>,
    dst: OutputPort<AlignedVec<T>>,

    // Members.
    taps: Option<(T, T)>, // (alpha, 1 - alpha)
    state: Option<AlignedVec<T>>,
}

impl<T: Scalar> ExpSmooth<T> {
    /// Create a new smoother reading buffers from `src`.
    pub fn new(src: InputPort<AlignedVec<T>>) -> (Self, InputPort<AlignedVec<T>>) {
        let (dst, dr) = channel();
        (
            Self {
                alpha: 1.0,
                src,
                dst,
                taps: None,
                state: None,
            },
            dr,
        )
    }
}

impl<T: Scalar> Component for ExpSmooth<T> {
    fn name(&self) -> &str {
        "exp_smooth"
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        match name {
            "alpha" => self.alpha = value.into_f64(name)?,
            _ => {
                return Err(Error::config(format!(
                    "exp_smooth: unknown property {name}"
                )));
            }
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(Error::config(format!(
                "alpha {} outside [0, 1]",
                self.alpha
            )));
        }
        let alpha = T::from_f64(self.alpha);
        self.taps = Some((alpha, T::ONE - alpha));
        self.state = None;
        Ok(())
    }

    fn process(&mut self) -> Result<Retval> {
        let (alpha, one_minus_alpha) = self
            .taps
            .ok_or_else(|| Error::config("exp_smooth: process before initialize"))?;
        let Some((mut data, ts)) = self.src.pop() else {
            return Ok(Retval::Noop);
        };
        if alpha == T::ONE {
            // No smoothing, pass through as is.
            self.dst.push(data, ts);
            return Ok(Retval::Normal);
        }
        let reseed = match &self.state {
            None => true,
            Some(state) if state.len() != data.len() => {
                warn!(
                    "exp_smooth: buffer length changed {} -> {}, reseeding",
                    state.len(),
                    data.len()
                );
                true
            }
            Some(_) => false,
        };
        if reseed {
            // First buffer seeds the state and passes unchanged.
            self.state = Some(data.clone());
        } else if let Some(state) = &mut self.state {
            for (x, s) in data
                .chunks_exact_mut(T::LANES)
                .zip(state.chunks_exact_mut(T::LANES))
            {
                for (x, s) in x.iter_mut().zip(s.iter_mut()) {
                    let smoothed = s.mul_add(one_minus_alpha, *x * alpha);
                    *x = smoothed;
                    *s = smoothed;
                }
            }
            // Lane tail, if the buffer is not a lane multiple.
            let tail = data.len() - data.len() % T::LANES;
            for (x, s) in data[tail..].iter_mut().zip(state[tail..].iter_mut()) {
                let smoothed = s.mul_add(one_minus_alpha, *x * alpha);
                *x = smoothed;
                *s = smoothed;
            }
        }
        self.dst.push(data, ts);
        Ok(Retval::Normal)
    }
}

/* vim: textwidth=80
 */
