/*! Capped packet-payload file sink.

Extracts the payload bytes of VITA-49 data packets from incoming
batches and appends them to a file until `num_bytes` have been written,
then clears its input and finishes.
*/
use std::fs::File;
use std::io::Write;

use log::debug;

use crate::component::{Component, PropertyValue, Retval};
use crate::port::InputPort;
use crate::{Error, Result, vita49};

/// File writer component consuming packet batches.
pub struct FileWriter {
    // Properties.
    filename: String,
    num_bytes: u64,

    // Ports.
    src: InputPort<Vec<Vec<u8>>>,

    // Members.
    file: Option<File>,
    total_bytes: u64,
}

impl FileWriter {
    /// Create a new file writer reading packet batches from `src`.
    pub fn new(src: InputPort<Vec<Vec<u8>>>) -> Self {
        Self {
            filename: String::new(),
            num_bytes: 0,
            src,
            file: None,
            total_bytes: 0,
        }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

impl Component for FileWriter {
    fn name(&self) -> &str {
        "file_writer"
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        match name {
            "filename" => self.filename = value.into_string(name)?,
            "num_bytes" => self.num_bytes = value.into_u64(name)?,
            _ => {
                return Err(Error::config(format!(
                    "file_writer: unknown property {name}"
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
        debug!("file_writer: opening sink {}", self.filename);
        self.file = Some(File::create(&self.filename)?);
        self.total_bytes = 0;
        Ok(())
    }

    fn process(&mut self) -> Result<Retval> {
        let Some(file) = self.file.as_mut() else {
            return Err(Error::config("file_writer: no open file"));
        };
        let Some((batch, _ts)) = self.src.pop() else {
            return Ok(Retval::Noop);
        };
        for pkt in &batch {
            let overlay = match vita49::Overlay::new(pkt) {
                Ok(o) => o,
                Err(e) => {
                    debug!("file_writer: skipping packet: {e}");
                    continue;
                }
            };
            if !overlay.header().is_data() {
                continue;
            }
            let payload = overlay.payload();
            let remaining = self.num_bytes - self.total_bytes;
            let take = (payload.len() as u64).min(remaining) as usize;
            file.write_all(&payload[..take])?;
            self.total_bytes += take as u64;
            if self.total_bytes >= self.num_bytes {
                file.flush()?;
                self.file = None;
                self.src.clear();
                return Ok(Retval::Finish);
            }
        }
        Ok(Retval::Normal)
    }
}

/* vim: textwidth=80
 */
