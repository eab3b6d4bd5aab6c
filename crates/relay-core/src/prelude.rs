//! Common imports pulled in with `use relay_core::prelude::*;` across the
//! workspace, mirroring the glob-import convention the rest of the crate
//! family uses for std/sync/time types.

pub use std::collections::HashMap;
pub use std::fmt::{Debug, Display};
pub use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
pub use std::pin::Pin;
pub use std::sync::Arc;
pub use std::task::Poll;
pub use std::time::{Duration, Instant};

pub use crate::Strng;
