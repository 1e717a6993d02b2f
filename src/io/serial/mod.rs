// src/io/serial/mod.rs
//
// Serial side of the tap: link abstraction over the OS port, timing-gap frame
// assembly, and the per-port reader that drives both. The `serialport`-backed
// opener only exists on desktop targets.

pub mod framer;
pub mod link;
pub mod reader;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub(crate) mod utils;

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
mod system;

pub use framer::{Frame, FrameAssembler, RawChunk};
pub use link::{LinkOpener, SerialLink, SerialPortInfo};
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub use system::{list_serial_ports, SystemPorts};
pub use reader::{FirstOpen, PortReader, ReaderExit, ReaderOptions};
pub use utils::Parity;
