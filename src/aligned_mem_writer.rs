/*! Capped aligned-buffer file sink.

Appends the raw bytes of incoming aligned sample buffers to a file
until `num_bytes` have been written, then clears its input and
finishes. The final write is truncated so exactly `num_bytes` land in
the file.
*/
use std::fs::File;
use std::io::Write;

use log::debug;

use crate::aligned::AlignedVec;
use crate::component::{Component, PropertyValue, Retval};
use crate::port::InputPort;
use crate::{Error, FrameElem, Result};

/// Aligned-buffer file writer component.
pub struct AlignedMemWriter<T: FrameElem> {
    // Properties.
    filename: String,
    num_bytes: u64,

    // Ports.
    src: InputPort<AlignedVec<T>>,

    // Members.
    file: Option<File>,
    bytes_written: u64,
}

impl<T: FrameElem> AlignedMemWriter<T> {
    /// Create a new writer reading aligned buffers from `src`.
    pub fn new(src: InputPort<AlignedVec<T>>) -> Self {
        Self {
            filename: String::new(),
            num_bytes: 0,
            src,
            file: None,
            bytes_written: 0,
        }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl<T: FrameElem> Component for AlignedMemWriter<T> {
    fn name(&self) -> &str {
        "aligned_mem_writer"
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        match name {
            "filename" => self.filename = value.into_string(name)?,
            "num_bytes" => self.num_bytes = value.into_u64(name)?,
            _ => {
                return Err(Error::config(format!(
                    "aligned_mem_writer: unknown property {name}"
                )));
            }
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<()> {
        if self.filename.is_empty() {
            return Err(Error::config("filename must be set"));
        }
        if self.num_bytes == 0 {
            return Err(Error::config("num_bytes must be nonzero"));
        }
        debug!("aligned_mem_writer: opening sink {}", self.filename);
        self.file = Some(File::create(&self.filename)?);
        self.bytes_written = 0;
        Ok(())
    }

    fn process(&mut self) -> Result<Retval> {
        let Some(file) = self.file.as_mut() else {
            return Err(Error::config("aligned_mem_writer: no open file"));
        };
        let Some((data, _ts)) = self.src.pop() else {
            return Ok(Retval::Noop);
        };
        let bytes = data.as_bytes();
        let remaining = self.num_bytes - self.bytes_written;
        let take = (bytes.len() as u64).min(remaining) as usize;
        file.write_all(&bytes[..take])?;
        self.bytes_written += take as u64;
        if self.bytes_written >= self.num_bytes {
            file.flush()?;
            self.file = None;
            self.src.clear();
            return Ok(Retval::Finish);
        }
        Ok(Retval::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{OutputPort, Timestamp, channel};

    fn make(
        path: &std::path::Path,
        cap: u64,
    ) -> (OutputPort<AlignedVec<f32>>, AlignedMemWriter<f32>) {
        let (tx, rx) = channel();
        let mut w = AlignedMemWriter::new(rx);
        w.set_property("filename", path.to_str().unwrap().into())
            .unwrap();
        w.set_property("num_bytes", PropertyValue::U64(cap)).unwrap();
        w.initialize().unwrap();
        (tx, w)
    }

    fn buf(len: usize, fill: f32) -> AlignedVec<f32> {
        let mut b = AlignedVec::with_default_alignment(len).unwrap();
        b.iter_mut().for_each(|v| *v = fill);
        b
    }

    #[test]
    fn caps_at_num_bytes_and_finishes() -> anyhow::Result<()> {
        let tmpd = tempfile::tempdir()?;
        let path = tmpd.path().join("capture.bin");
        // Cap of 10_000 bytes fed with 4096-byte buffers: the third
        // invocation crosses the cap and finishes.
        let (tx, mut w) = make(&path, 10_000);
        for _ in 0..3 {
            tx.push(buf(1024, 1.0), Timestamp::default());
        }
        assert_eq!(w.process()?, Retval::Normal);
        assert_eq!(w.process()?, Retval::Normal);
        assert_eq!(w.process()?, Retval::Finish);
        assert_eq!(w.bytes_written(), 10_000);
        assert_eq!(std::fs::read(&path)?.len(), 10_000);
        // Finished: the input was cleared with it.
        assert!(w.src.is_empty());
        Ok(())
    }

    #[test]
    fn exact_bytes_round_trip() -> anyhow::Result<()> {
        let tmpd = tempfile::tempdir()?;
        let path = tmpd.path().join("capture.bin");
        let (tx, mut w) = make(&path, 8);
        let mut b = AlignedVec::with_default_alignment(2)?;
        b[0] = 1.0f32;
        b[1] = -2.5;
        tx.push(b, Timestamp::default());
        assert_eq!(w.process()?, Retval::Finish);
        let out = std::fs::read(&path)?;
        assert_eq!(&out[..4], &1.0f32.to_le_bytes());
        assert_eq!(&out[4..], &(-2.5f32).to_le_bytes());
        Ok(())
    }

    #[test]
    fn noop_without_input() -> anyhow::Result<()> {
        let tmpd = tempfile::tempdir()?;
        let (_tx, mut w) = make(&tmpd.path().join("x.bin"), 8);
        assert_eq!(w.process()?, Retval::Noop);
        Ok(())
    }
}
/* vim: textwidth=80
 */
