/*! ADC sample histogram.

Buckets the I component of complex int16 samples from raw packet bytes
into `2^adc_bits` bins centered on zero, clamping out-of-range values
into the edge bins, and emits one bin vector roughly once per second of
signal (every `sample_rate` samples).
*/
use log::{debug, warn};

use crate::component::{Component, PropertyValue, Retval};
use crate::port::{InputPort, OutputPort, channel};
use crate::{Error, Result, sdds, vita49};

/// Packet transport the histogram taps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Sdds,
    Vita49,
}

impl Transport {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "sdds" => Ok(Transport::Sdds),
            "vita49" => Ok(Transport::Vita49),
            other => Err(Error::config(format!("unknown transport {other:?}"))),
        }
    }
}

/// Histogram component.
///
/// Input: a contiguous byte vector of back-to-back fixed-size packets.
/// Output: `Vec<u64>` bin vectors.
pub struct Histogram {
    // Properties.
    transport_name: String,
    msg_size: u32,
    byteswap: bool,
    adc_bits: u32,
    sample_rate: f32,

    // Ports.
    src: InputPort<Vec<u8>>,
    dst: OutputPort<Vec<u64>>,

    // Members.
    transport: Option<Transport>,
    bins: Vec<u64>,
    samples: u64,
}

impl Histogram {
    /// Create a new histogram reading raw packet bytes from `src`.
    pub fn new(src: InputPort<Vec<u8>>) -> (Self, InputPort<Vec<u64>>) {
        let (dst, dr) = channel();
        (
            Self {
                transport_name: String::new(),
                msg_size: 0,
                byteswap: true,
                adc_bits: 0,
                sample_rate: 0.0,
                src,
                dst,
                transport: None,
                bins: Vec::new(),
                samples: 0,
            },
            dr,
        )
    }

    fn bucket(&mut self, payload: &[i16]) {
        let bins = self.bins.len() as i32;
        // I components only: even lanes of the interleaved payload.
        for iq in payload.chunks_exact(2) {
            let sample = if self.byteswap {
                iq[0].swap_bytes()
            } else {
                iq[0]
            };
            let idx = (i32::from(sample) + bins / 2).clamp(0, bins - 1);
            self.bins[idx as usize] += 1;
            self.samples += 1;
        }
    }
}

impl Component for Histogram {
    fn name(&self) -> &str {
        "histogram"
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        match name {
            "transport" => self.transport_name = value.into_string(name)?,
            "msg_size" => self.msg_size = value.into_u32(name)?,
            "byteswap" => self.byteswap = value.into_bool(name)?,
            "adc_bits" => self.adc_bits = value.into_u32(name)?,
            "sample_rate" => self.sample_rate = value.into_f32(name)?,
            _ => {
                return Err(Error::config(format!(
                    "histogram: unknown property {name}"
                )));
            }
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<()> {
        self.transport = Some(Transport::parse(&self.transport_name)?);
        if self.msg_size == 0 {
            return Err(Error::config("msg_size must be nonzero"));
        }
        if !(1..=16).contains(&self.adc_bits) {
            return Err(Error::config(format!(
                "adc_bits {} outside 1..=16",
                self.adc_bits
            )));
        }
        if !(self.sample_rate > 0.0) {
            return Err(Error::config(format!(
                "sample_rate {} must be positive",
                self.sample_rate
            )));
        }
        self.bins = vec![0; 1 << self.adc_bits];
        self.samples = 0;
        Ok(())
    }

    fn process(&mut self) -> Result<Retval> {
        let transport = self
            .transport
            .ok_or_else(|| Error::config("histogram: process before initialize"))?;
        let Some((data, ts)) = self.src.pop() else {
            return Ok(Retval::Noop);
        };
        for raw in data.chunks_exact(self.msg_size as usize) {
            let payload = match transport {
                Transport::Sdds => sdds::Overlay::new(raw).and_then(|o| o.payload_i16()),
                Transport::Vita49 => match vita49::Overlay::new(raw) {
                    Ok(o) if !o.header().is_data() => continue,
                    Ok(o) => o.payload_i16(),
                    Err(e) => Err(e),
                },
            };
            match payload {
                Ok(p) => self.bucket(p),
                Err(e) => {
                    debug!("histogram: skipping packet: {e}");
                    continue;
                }
            }
        }
        // One emission per second of signal, give or take a packet.
        if self.samples > self.sample_rate as u64 {
            let full = std::mem::replace(&mut self.bins, vec![0; 1 << self.adc_bits]);
            if self.dst.remaining() == 0 {
                warn!("histogram: downstream full, dropping emission");
            } else {
                self.dst.push(full, ts);
            }
            self.samples = 0;
        }
        Ok(Retval::Normal)
    }
}

/* vim: textwidth=80
 */
