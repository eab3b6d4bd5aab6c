//! HMAC-chained KDF and AEAD header sealing (VMess) plus the small set of
//! stream/AEAD cipher helpers the wire codecs in `transport` build on.

pub mod aead;
pub mod kdf;

pub use aead::{VMessHeaderError, open_vmess_aead_header, seal_vmess_aead_header};
pub use kdf::kdf;
