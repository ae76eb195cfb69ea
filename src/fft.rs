/*! FFT plan and the FFT pipeline component.

[`FftPlan`] wraps a forward transform planned once at initialization
and executed on every frame, with optional canonical `fftshift`.

The [`Fft`] component frames network packet batches into aligned
complex buffers on a background thread, applying the configured window
during accumulation, and executes the plan from `process()`. The two
halves are decoupled by an internal queue so bursty packet ingress
never stalls on transform time, and the scheduler keeps control of
pacing the downstream stages.
*/
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, warn};
use num_complex::Complex;
use rustfft::{FftNum, FftPlanner};

use crate::aligned::{ALIGNMENT, AlignedVec};
use crate::component::{Component, PropertyValue, Retval};
use crate::kernels;
use crate::port::{InputPort, OutputPort, Timestamp, channel};
use crate::windows::WindowType;
use crate::{Error, FrameElem, Result, Scalar, vita49};

/// Canonical fftshift: rotate the buffer by half its length so DC lands
/// in the center. Applying it twice to an even-length buffer is the
/// identity.
pub fn fftshift<T>(buf: &mut [T]) {
    buf.rotate_left(buf.len() / 2);
}

/// A forward 1-D transform planned once and reused for every frame.
pub struct FftPlan<T: FftNum> {
    size: usize,
    shift: bool,
    fft: Arc<dyn rustfft::Fft<T>>,
    scratch: Vec<Complex<T>>,
    real_work: Vec<Complex<T>>,
}

impl<T: FftNum + Default> FftPlan<T> {
    /// Plan a forward transform of `size` bins.
    ///
    /// `threads` is accepted as a planning hint for property
    /// compatibility; plans execute single-threaded.
    pub fn new(size: usize, threads: u32, shift: bool) -> Result<Self> {
        if size == 0 {
            return Err(Error::config("fft_size must be nonzero"));
        }
        if threads == 0 {
            return Err(Error::config("fftw_threads must be nonzero"));
        }
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        Ok(Self {
            size,
            shift,
            fft,
            scratch,
            real_work: Vec::new(),
        })
    }

    /// Transform size in bins.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Execute the complex transform in place over `size` bins,
    /// applying the configured shift.
    pub fn execute(&mut self, buf: &mut [Complex<T>]) {
        let buf = &mut buf[..self.size];
        self.fft.process_with_scratch(buf, &mut self.scratch);
        if self.shift {
            fftshift(buf);
        }
    }

    /// Real-to-complex transform.
    ///
    /// Writes the `size / 2 + 1` meaningful bins of the spectrum of a
    /// real signal into `out` (DC first; the conjugate-symmetric upper
    /// half is not materialized, and the shift flag does not apply).
    pub fn execute_real(&mut self, input: &[T], out: &mut [Complex<T>]) -> Result<()> {
        let bins = self.size / 2 + 1;
        if input.len() < self.size || out.len() < bins {
            return Err(Error::config(format!(
                "real transform needs {} inputs and {bins} output bins, got {} and {}",
                self.size,
                input.len(),
                out.len()
            )));
        }
        self.real_work.resize(self.size, Complex::default());
        for (w, &x) in self.real_work.iter_mut().zip(input) {
            *w = Complex::new(x, T::default());
        }
        self.fft
            .process_with_scratch(&mut self.real_work, &mut self.scratch);
        out[..bins].copy_from_slice(&self.real_work[..bins]);
        Ok(())
    }
}

/// FFT pipeline component.
///
/// Input: batches of VITA-49 packets as byte vectors. Output: aligned
/// complex frames of `fft_size` bins, windowed and transformed.
pub struct Fft<T: Scalar + FftNum>
where
    i16: kernels::Lane<T>,
{
    // Properties.
    window_name: String,
    fft_size: u32,
    planner_threads: u32,
    shift: bool,

    // Ports.
    src: Option<InputPort<Vec<Vec<u8>>>>,
    dst: OutputPort<AlignedVec<Complex<T>>>,

    // Members.
    plan: Option<FftPlan<T>>,
    window: Option<AlignedVec<T>>,
    frame_tx: Option<OutputPort<AlignedVec<Complex<T>>>>,
    frame_rx: InputPort<AlignedVec<Complex<T>>>,
    stop: Arc<AtomicBool>,
    framer: Option<std::thread::JoinHandle<()>>,
}

impl<T: Scalar + FftNum> Fft<T>
where
    i16: kernels::Lane<T>,
{
    /// Create a new Fft component reading packet batches from `src`.
    pub fn new(src: InputPort<Vec<Vec<u8>>>) -> (Self, InputPort<AlignedVec<Complex<T>>>) {
        let (dst, dr) = channel();
        let (frame_tx, frame_rx) = channel();
        (
            Self {
                window_name: String::new(),
                fft_size: 1024,
                planner_threads: 1,
                shift: true,
                src: Some(src),
                dst,
                plan: None,
                window: None,
                frame_tx: Some(frame_tx),
                frame_rx,
                stop: Arc::new(AtomicBool::new(false)),
                framer: None,
            },
            dr,
        )
    }

    /// Background framer: pull packet batches, window-convert the int16
    /// IQ payloads into aligned frames, queue completed frames.
    fn framer(
        src: InputPort<Vec<Vec<u8>>>,
        frames: OutputPort<AlignedVec<Complex<T>>>,
        window: Option<AlignedVec<T>>,
        fft_size: usize,
        stop: Arc<AtomicBool>,
    ) {
        let scalar_len = fft_size * 2;
        let mut frame: Option<AlignedVec<Complex<T>>> = None;
        let mut scalar_idx = 0usize;
        while !stop.load(Ordering::Relaxed) {
            let Some((batch, _ts)) = src.wait_pop(Duration::from_secs(1)) else {
                continue;
            };
            for pkt in &batch {
                let overlay = match vita49::Overlay::new(pkt) {
                    Ok(o) => o,
                    Err(e) => {
                        debug!("fft: dropping unparseable packet: {e}");
                        continue;
                    }
                };
                if !overlay.header().is_data() {
                    continue;
                }
                let payload = match overlay.payload_i16() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("fft: dropping packet payload: {e}");
                        continue;
                    }
                };
                let mut pos = 0;
                while pos < payload.len() {
                    let mut buf = match frame.take() {
                        Some(buf) => buf,
                        None => match AlignedVec::new(ALIGNMENT, fft_size) {
                            Ok(buf) => {
                                scalar_idx = 0;
                                buf
                            }
                            Err(e) => {
                                error!("fft: frame allocation failed, framer exiting: {e}");
                                return;
                            }
                        },
                    };
                    {
                        let scalars = Complex::<T>::as_scalars_mut(buf.as_mut_slice());
                        let n = (scalar_len - scalar_idx).min(payload.len() - pos);
                        if n >= T::LANES {
                            kernels::convert_windowed(
                                &payload[pos..],
                                window.as_ref().map(|w| &w[scalar_idx..]),
                                &mut scalars[scalar_idx..],
                                false,
                            );
                            pos += T::LANES;
                            scalar_idx += T::LANES;
                        } else {
                            // Tail shorter than one lane group.
                            for k in 0..n {
                                let mut v: T = kernels::convert_scalar(payload[pos + k], false);
                                if let Some(w) = &window {
                                    v = v * w[scalar_idx + k];
                                }
                                scalars[scalar_idx + k] = v;
                            }
                            pos += n;
                            scalar_idx += n;
                        }
                    }
                    if scalar_idx == scalar_len {
                        frames.push(buf, Timestamp::now());
                    } else {
                        frame = Some(buf);
                    }
                }
            }
        }
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.framer.take()
            && handle.join().is_err()
        {
            warn!("fft: framer thread panicked");
        }
    }
}

impl<T: Scalar + FftNum> Component for Fft<T>
where
    i16: kernels::Lane<T>,
{
    fn name(&self) -> &str {
        "fft"
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        match name {
            "window" => self.window_name = value.into_string(name)?,
            "fft_size" => self.fft_size = value.into_u32(name)?,
            "fftw_threads" => self.planner_threads = value.into_u32(name)?,
            "shift" => self.shift = value.into_bool(name)?,
            _ => return Err(Error::config(format!("fft: unknown property {name}"))),
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<()> {
        let size = self.fft_size as usize;
        if size == 0 || (size * 2) % T::LANES != 0 {
            return Err(Error::config(format!(
                "fft_size {size} is not a positive multiple of {} complex samples",
                T::LANES / 2
            )));
        }
        if let Some(wt) = WindowType::parse(&self.window_name)? {
            self.window = Some(wt.make(size, true)?);
        }
        self.plan = Some(FftPlan::new(size, self.planner_threads, self.shift)?);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.plan.is_none() {
            return Err(Error::config("fft: start before initialize"));
        }
        let (Some(src), Some(frame_tx)) = (self.src.take(), self.frame_tx.take()) else {
            return Err(Error::config("fft: already started"));
        };
        let window = self.window.take();
        let fft_size = self.fft_size as usize;
        let stop = self.stop.clone();
        self.framer = Some(
            std::thread::Builder::new()
                .name("fft-framer".into())
                .spawn(move || Self::framer(src, frame_tx, window, fft_size, stop))?,
        );
        Ok(())
    }

    fn process(&mut self) -> Result<Retval> {
        let plan = self
            .plan
            .as_mut()
            .ok_or_else(|| Error::config("fft: process before initialize"))?;
        let Some((mut frame, ts)) = self.frame_rx.wait_pop(Duration::from_secs(1)) else {
            return Ok(Retval::Noop);
        };
        plan.execute(frame.as_mut_slice());
        self.dst.push(frame, ts);
        Ok(Retval::Normal)
    }

    fn stop(&mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }
}

impl<T: Scalar + FftNum> Drop for Fft<T>
where
    i16: kernels::Lane<T>,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

/* vim: textwidth=80
 */
