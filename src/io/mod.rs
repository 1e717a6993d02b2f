// src/io/mod.rs
//
// Device I/O. Only serial ports are tapped today.

pub mod serial;
