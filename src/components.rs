//! Convenient mod collecting all components for import.
pub use crate::aligned_mem_writer::AlignedMemWriter;
pub use crate::exp_smooth::ExpSmooth;
pub use crate::fft::Fft;
pub use crate::file_writer::FileWriter;
pub use crate::histogram::Histogram;
pub use crate::psd::Psd;
pub use crate::stov::Stov;
pub use crate::udp_source::UdpSource;
