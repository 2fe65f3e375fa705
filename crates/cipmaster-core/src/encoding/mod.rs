/// Zero-copy little-endian reader for decoding ENIP and CIP frames.
pub mod reader;
/// Byte writer for encoding frames into a caller-owned buffer.
pub mod writer;
