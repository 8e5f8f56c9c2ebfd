//! On-disk encodings for intermediate data.

pub mod encode_decode;
