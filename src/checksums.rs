// src/checksums.rs
//
// CRC-16/Modbus, used by the multidrop direction heuristic to decide whether a
// frame is trustworthy enough to read an address and function code from.

/// CRC-16 Modbus (polynomial 0x8005 reflected = 0xA001, init 0xFFFF).
pub fn crc16_modbus_checksum(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Whether the last two bytes of `frame` are a valid little-endian Modbus CRC
/// over the bytes before them.
pub fn modbus_crc_valid(frame: &[u8]) -> bool {
    if frame.len() < 4 {
        return false;
    }
    let data_without_crc = &frame[..frame.len() - 2];
    let received_crc = (frame[frame.len() - 2] as u16) | ((frame[frame.len() - 1] as u16) << 8);
    crc16_modbus_checksum(data_without_crc) == received_crc
}

/// Append CRC-16 Modbus to data, low byte first
pub fn append_modbus_crc(data: &[u8]) -> Vec<u8> {
    let crc = crc16_modbus_checksum(data);
    let mut result = Vec::with_capacity(data.len() + 2);
    result.extend_from_slice(data);
    result.push((crc & 0xFF) as u8);
    result.push(((crc >> 8) & 0xFF) as u8);
    result
}
