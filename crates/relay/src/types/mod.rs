pub mod metadata;

pub use metadata::{DnsMode, Metadata, Network};
