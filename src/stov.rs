/*! Stream-to-vector framer.

Accumulates int16 IQ samples from packet batches into fixed-size
aligned output buffers, widening to the configured floating point
element type (optionally byte-swapping) one lane group at a time. Each
emitted buffer carries the timestamp of the first packet that
contributed to it.
*/
use log::{debug, warn};

use crate::aligned::{ALIGNMENT, AlignedVec};
use crate::component::{Component, PropertyValue, Retval};
use crate::kernels::{self, Lane};
use crate::port::{InputPort, OutputPort, Timestamp, channel};
use crate::{Error, FrameElem, Result, Scalar, sdds, vita49};

/// Packet transport the framer consumes.
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

/// Stream-to-vector framer component.
///
/// Input: batches of packets as byte vectors. Output: aligned buffers
/// of `output_size` elements of `T` (real or interleaved complex).
pub struct Stov<T: FrameElem>
where
    i16: Lane<T::Scalar>,
{
    // Properties.
    output_size: u32,
    transport_name: String,
    byteswap: bool,

    // Ports.
    src: InputPort<Vec<Vec<u8>>>,
    dst: OutputPort<AlignedVec<T>>,

    // Members.
    transport: Option<Transport>,
    out_buf: Option<AlignedVec<T>>,
    scalar_idx: usize,
    out_ts: Timestamp,
}

impl<T: FrameElem> Stov<T>
where
    i16: Lane<T::Scalar>,
{
    /// Create a new framer reading packet batches from `src`.
    pub fn new(src: InputPort<Vec<Vec<u8>>>) -> (Self, InputPort<AlignedVec<T>>) {
        let (dst, dr) = channel();
        (
            Self {
                output_size: 0,
                transport_name: String::new(),
                byteswap: false,
                src,
                dst,
                transport: None,
                out_buf: None,
                scalar_idx: 0,
                out_ts: Timestamp::default(),
            },
            dr,
        )
    }

    /// Feed one packet's payload into the output buffer, emitting
    /// whenever it fills.
    fn accumulate(&mut self, payload: &[i16], ts: Timestamp) -> Result<()> {
        let scalar_len = self.output_size as usize * T::SCALARS;
        let lanes = T::Scalar::LANES;
        let mut pos = 0;
        while pos < payload.len() {
            let mut buf = match self.out_buf.take() {
                Some(buf) => buf,
                None => {
                    self.scalar_idx = 0;
                    self.out_ts = ts;
                    AlignedVec::new(ALIGNMENT, self.output_size as usize)?
                }
            };
            {
                let scalars = T::as_scalars_mut(buf.as_mut_slice());
                let n = (scalar_len - self.scalar_idx).min(payload.len() - pos);
                if n >= lanes {
                    kernels::convert(
                        &payload[pos..],
                        &mut scalars[self.scalar_idx..],
                        self.byteswap,
                    );
                    pos += lanes;
                    self.scalar_idx += lanes;
                } else {
                    // Tail shorter than one lane group.
                    for k in 0..n {
                        scalars[self.scalar_idx + k] =
                            kernels::convert_scalar(payload[pos + k], self.byteswap);
                    }
                    pos += n;
                    self.scalar_idx += n;
                }
            }
            if self.scalar_idx == scalar_len {
                self.dst.push(buf, self.out_ts);
            } else {
                self.out_buf = Some(buf);
            }
        }
        Ok(())
    }
}

impl<T: FrameElem> Component for Stov<T>
where
    i16: Lane<T::Scalar>,
{
    fn name(&self) -> &str {
        "stov"
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        match name {
            "output_size" => self.output_size = value.into_u32(name)?,
            "transport" => self.transport_name = value.into_string(name)?,
            "byteswap" => self.byteswap = value.into_bool(name)?,
            _ => return Err(Error::config(format!("stov: unknown property {name}"))),
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<()> {
        self.transport = Some(Transport::parse(&self.transport_name)?);
        let scalar_len = self.output_size as usize * T::SCALARS;
        if scalar_len == 0 || scalar_len % T::Scalar::LANES != 0 {
            return Err(Error::config(format!(
                "output_size {} is not a positive multiple of the {}-lane stride",
                self.output_size,
                T::Scalar::LANES
            )));
        }
        Ok(())
    }

    fn process(&mut self) -> Result<Retval> {
        let transport = self
            .transport
            .ok_or_else(|| Error::config("stov: process before initialize"))?;
        let Some((batch, _batch_ts)) = self.src.pop() else {
            return Ok(Retval::Noop);
        };
        for pkt in &batch {
            let parsed = match transport {
                Transport::Sdds => {
                    sdds::Overlay::new(pkt).and_then(|o| Ok((o.payload_i16()?, o.timestamp())))
                }
                Transport::Vita49 => match vita49::Overlay::new(pkt) {
                    Ok(o) if !o.header().is_data() => continue,
                    Ok(o) => o.payload_i16().map(|p| (p, o.timestamp())),
                    Err(e) => Err(e),
                },
            };
            match parsed {
                Ok((payload, ts)) => self.accumulate(payload, ts)?,
                Err(e) => {
                    debug!("stov: skipping packet: {e}");
                    continue;
                }
            }
        }
        if self.dst.remaining() == 0 {
            warn!("stov: downstream queue full");
        }
        Ok(Retval::NoYield)
    }
}

/* vim: textwidth=80
 */
