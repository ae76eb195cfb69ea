/*! Zero-copy VITA-49 packet overlay.

Parses the fixed header word of an ANSI/VITA-49 VRT packet and computes
the byte offsets of the optional fields that follow, without copying
anything: the overlay borrows the packet's byte span and all accessors
read through it big-endian.

Word layout of the 32-bit header (bit 31 down):

```text
  31-28 packet type      27 class-id enable   26-24 indicators
  23-22 TSI              21-20 TSF            19-16 packet count
  15-0  packet size, in 32-bit words
```

For signal data packets, indicator bit 26 means a one-word trailer sits
at the end of the packet.
*/
use crate::port::Timestamp;
use crate::{Error, Result};

/// Bytes in the fixed header word.
pub const HEADER_BYTES: usize = 4;

/// The type of VRT packet, from header bits 31-28.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Signal data packet without a stream ID.
    SignalData,
    /// Signal data packet with a stream ID.
    SignalDataStreamId,
    /// Extension data packet without a stream ID.
    ExtensionData,
    /// Extension data packet with a stream ID.
    ExtensionDataStreamId,
    /// Context packet.
    Context,
    /// Extension context packet.
    ExtensionContext,
    /// Command packet.
    Command,
    /// Extension command packet.
    ExtensionCommand,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;
    fn try_from(v: u8) -> Result<Self> {
        use PacketType::*;
        Ok(match v {
            0x0 => SignalData,
            0x1 => SignalDataStreamId,
            0x2 => ExtensionData,
            0x3 => ExtensionDataStreamId,
            0x4 => Context,
            0x5 => ExtensionContext,
            0x6 => Command,
            0x7 => ExtensionCommand,
            other => return Err(Error::Overlay(format!("reserved packet type {other:#x}"))),
        })
    }
}

/// Integer timestamp mode, header bits 23-22.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tsi {
    /// No integer timestamp.
    None,
    /// UTC seconds.
    Utc,
    /// GPS seconds.
    Gps,
    /// Other epoch.
    Other,
}

/// Fractional timestamp mode, header bits 21-20.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tsf {
    /// No fractional timestamp.
    None,
    /// Sample count.
    SampleCount,
    /// Real time (picoseconds).
    RealTime,
    /// Free running count.
    FreeRunning,
}

/// Decoded fixed header word.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    word: u32,
    packet_type: PacketType,
}

impl Header {
    /// Decode the first word of a packet.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let raw: [u8; 4] = data
            .get(..HEADER_BYTES)
            .and_then(|d| d.try_into().ok())
            .ok_or_else(|| Error::Overlay("packet shorter than its header".into()))?;
        let word = u32::from_be_bytes(raw);
        let packet_type = PacketType::try_from((word >> 28) as u8)?;
        Ok(Self { word, packet_type })
    }

    /// Packet type.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// True for signal data packets (with or without stream ID).
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(
            self.packet_type,
            PacketType::SignalData | PacketType::SignalDataStreamId
        )
    }

    /// True for context packets.
    #[must_use]
    pub fn is_context(&self) -> bool {
        self.packet_type == PacketType::Context
    }

    /// Class-ID enable bit.
    #[must_use]
    pub fn class_id_enable(&self) -> bool {
        self.word & (1 << 27) != 0
    }

    /// Trailer-included indicator. Only meaningful for data packets.
    #[must_use]
    pub fn trailer_included(&self) -> bool {
        self.word & (1 << 26) != 0
    }

    /// Integer timestamp mode.
    #[must_use]
    pub fn tsi(&self) -> Tsi {
        match (self.word >> 22) & 0b11 {
            0 => Tsi::None,
            1 => Tsi::Utc,
            2 => Tsi::Gps,
            _ => Tsi::Other,
        }
    }

    /// Fractional timestamp mode.
    #[must_use]
    pub fn tsf(&self) -> Tsf {
        match (self.word >> 20) & 0b11 {
            0 => Tsf::None,
            1 => Tsf::SampleCount,
            2 => Tsf::RealTime,
            _ => Tsf::FreeRunning,
        }
    }

    /// Modulo-16 packet count.
    #[must_use]
    pub fn packet_count(&self) -> u8 {
        ((self.word >> 16) & 0xF) as u8
    }

    /// Total packet size in 32-bit words, header included.
    #[must_use]
    pub fn packet_size(&self) -> u16 {
        (self.word & 0xFFFF) as u16
    }
}

/// Decoded 8-byte class identifier field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassId {
    /// Organizationally unique identifier (24 bits).
    pub oui: u32,
    /// Information class code.
    pub information_class: u16,
    /// Packet class code.
    pub packet_class: u16,
}

/// Byte offsets of the optional fields present in one packet.
#[derive(Debug, Clone, Copy, Default)]
struct Offsets {
    stream_id: Option<usize>,
    class_id: Option<usize>,
    integer_timestamp: Option<usize>,
    fractional_timestamp: Option<usize>,
    payload: Option<usize>,
    trailer: Option<usize>,
}

/// Non-owning read-only view of one VITA-49 packet.
pub struct Overlay<'a> {
    data: &'a [u8],
    header: Header,
    offsets: Offsets,
}

impl<'a> Overlay<'a> {
    /// Parse the header and lay out the field offsets.
    ///
    /// Fails if the span is shorter than the packet size the header
    /// declares, or the declared fields do not fit inside it.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let header = Header::parse(data)?;
        let packet_bytes = header.packet_size() as usize * 4;
        if packet_bytes > data.len() {
            return Err(Error::Overlay(format!(
                "packet size {} words exceeds span of {} bytes",
                header.packet_size(),
                data.len()
            )));
        }
        let mut offsets = Offsets::default();
        let mut cursor = HEADER_BYTES;
        if header.packet_type() != PacketType::SignalData {
            offsets.stream_id = Some(cursor);
            cursor += 4;
        }
        if header.class_id_enable() {
            offsets.class_id = Some(cursor);
            cursor += 8;
        }
        if header.tsi() != Tsi::None {
            offsets.integer_timestamp = Some(cursor);
            cursor += 4;
        }
        if header.tsf() != Tsf::None {
            offsets.fractional_timestamp = Some(cursor);
            cursor += 8;
        }
        if header.is_data() {
            offsets.payload = Some(cursor);
            if header.trailer_included() {
                offsets.trailer = Some(packet_bytes - 4);
            }
        }
        let end = offsets
            .trailer
            .map_or(packet_bytes, |t| t.min(packet_bytes));
        if cursor > end {
            return Err(Error::Overlay(format!(
                "header fields ({cursor} bytes) run past packet end ({end} bytes)"
            )));
        }
        Ok(Self {
            data,
            header,
            offsets,
        })
    }

    /// The decoded header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    fn be32(&self, pos: usize) -> u32 {
        u32::from_be_bytes(self.data[pos..pos + 4].try_into().unwrap())
    }

    fn be64(&self, pos: usize) -> u64 {
        u64::from_be_bytes(self.data[pos..pos + 8].try_into().unwrap())
    }

    /// Stream identifier, absent for `SignalData` packets.
    #[must_use]
    pub fn stream_id(&self) -> Option<u32> {
        self.offsets.stream_id.map(|pos| self.be32(pos))
    }

    /// Class identifier, present iff the class-ID enable bit is set.
    #[must_use]
    pub fn class_id(&self) -> Option<ClassId> {
        self.offsets.class_id.map(|pos| {
            let hi = self.be32(pos);
            let lo = self.be32(pos + 4);
            ClassId {
                oui: hi & 0x00FF_FFFF,
                information_class: (lo >> 16) as u16,
                packet_class: (lo & 0xFFFF) as u16,
            }
        })
    }

    /// Integer timestamp word, present iff TSI != NONE.
    #[must_use]
    pub fn integer_timestamp(&self) -> Option<u32> {
        self.offsets.integer_timestamp.map(|pos| self.be32(pos))
    }

    /// Fractional timestamp, present iff TSF != NONE.
    #[must_use]
    pub fn fractional_timestamp(&self) -> Option<u64> {
        self.offsets.fractional_timestamp.map(|pos| self.be64(pos))
    }

    /// Trailer word, present iff the data header says so.
    #[must_use]
    pub fn trailer(&self) -> Option<u32> {
        self.offsets.trailer.map(|pos| self.be32(pos))
    }

    /// Assemble a [`Timestamp`] from whichever timestamp fields are
    /// present; absent fields stay zero.
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        Timestamp {
            seconds: self.integer_timestamp().unwrap_or(0),
            picoseconds: self.fractional_timestamp().unwrap_or(0),
        }
    }

    /// Payload length in bytes, zero for non-data packets.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        let Some(pos) = self.offsets.payload else {
            return 0;
        };
        let mut len = self.header.packet_size() as usize * 4 - pos;
        if self.offsets.trailer.is_some() {
            len -= 4;
        }
        len
    }

    /// The raw payload bytes. Empty for non-data packets.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        match self.offsets.payload {
            Some(pos) => &self.data[pos..pos + self.payload_len()],
            None => &[],
        }
    }

    /// The payload viewed as native-order 16-bit samples.
    ///
    /// Heap-allocated receive buffers are always sufficiently aligned
    /// for this; an odd payload address inside a hand-built span is
    /// surfaced as an overlay error.
    pub fn payload_i16(&self) -> Result<&'a [i16]> {
        let bytes = self.payload();
        if bytes.as_ptr() as usize % std::mem::align_of::<i16>() != 0 {
            return Err(Error::Overlay("payload not 16-bit aligned".into()));
        }
        // SAFETY: the span is valid for payload_len() bytes and the
        // pointer alignment was just checked.
        Ok(unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const i16, bytes.len() / 2) })
    }
}

/* vim: textwidth=80
 */
