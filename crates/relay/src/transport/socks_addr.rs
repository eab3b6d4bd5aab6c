//! SOCKS5-style address encoding shared by Shadowsocks, ShadowsocksR, and
//! Trojan request framing: address-type byte, address, big-endian port.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::transport::buf::BufferWriter;
use crate::types::Metadata;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Encodes `metadata`'s destination the way the upstream stream ciphers
/// expect it prepended to the first write: prefer the unresolved hostname
/// so remote-DNS-capable adapters can resolve it themselves.
pub fn encode(metadata: &Metadata) -> Vec<u8> {
	let mut w = BufferWriter::new();
	match (&metadata.host, metadata.dst_ip) {
		(Some(host), _) => {
			w.put_u8(ATYP_DOMAIN);
			w.put_u8(host.len() as u8);
			w.put_slice(host.as_bytes());
		},
		(None, Some(IpAddr::V4(v4))) => {
			w.put_u8(ATYP_IPV4);
			w.put_slice(&v4.octets());
		},
		(None, Some(IpAddr::V6(v6))) => {
			w.put_u8(ATYP_IPV6);
			w.put_slice(&v6.octets());
		},
		(None, None) => {
			w.put_u8(ATYP_IPV4);
			w.put_slice(&[0, 0, 0, 0]);
		},
	}
	w.put_u16_be(metadata.dst_port);
	w.into_vec()
}

/// Parses a header written by `encode` off the front of `buf`, returning
/// the address and the number of bytes consumed so the caller can slice
/// the remaining payload. A domain header has no IP to report, so it
/// decodes to an unspecified address with the port preserved; callers
/// that need the real peer fall back to the proxy's own address instead.
pub fn decode(buf: &[u8]) -> Option<(SocketAddr, usize)> {
	let atyp = *buf.first()?;
	match atyp {
		ATYP_IPV4 => {
			if buf.len() < 7 {
				return None;
			}
			let ip = Ipv4Addr::new(buf[1], buf[2], buf[3], buf[4]);
			let port = u16::from_be_bytes([buf[5], buf[6]]);
			Some((SocketAddr::new(IpAddr::V4(ip), port), 7))
		},
		ATYP_IPV6 => {
			if buf.len() < 19 {
				return None;
			}
			let mut octets = [0u8; 16];
			octets.copy_from_slice(&buf[1..17]);
			let port = u16::from_be_bytes([buf[17], buf[18]]);
			Some((SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port), 19))
		},
		ATYP_DOMAIN => {
			let len = *buf.get(1)? as usize;
			let total = 2 + len + 2;
			if buf.len() < total {
				return None;
			}
			let port = u16::from_be_bytes([buf[2 + len], buf[3 + len]]);
			Some((SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port), total))
		},
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{Metadata, Network};

	#[test]
	fn encodes_domain_address() {
		let mut m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		m.host = Some("example.com".into());
		m.dst_port = 443;
		let out = encode(&m);
		assert_eq!(out[0], ATYP_DOMAIN);
		assert_eq!(out[1], 11);
		assert_eq!(&out[2..13], b"example.com");
		assert_eq!(&out[13..15], &443u16.to_be_bytes());
	}

	#[test]
	fn encodes_ipv4_when_host_absent() {
		let mut m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		m.dst_ip = Some("1.2.3.4".parse().unwrap());
		m.dst_port = 80;
		let out = encode(&m);
		assert_eq!(out, vec![ATYP_IPV4, 1, 2, 3, 4, 0, 80]);
	}

	#[test]
	fn decodes_ipv4_header_and_consumed_length() {
		let mut m = Metadata::new(Network::Udp, "127.0.0.1:1".parse().unwrap(), "test");
		m.dst_ip = Some("1.2.3.4".parse().unwrap());
		m.dst_port = 80;
		let mut out = encode(&m);
		out.extend_from_slice(b"payload");
		let (addr, consumed) = decode(&out).unwrap();
		assert_eq!(addr, "1.2.3.4:80".parse().unwrap());
		assert_eq!(&out[consumed..], b"payload");
	}

	#[test]
	fn decode_rejects_truncated_header() {
		assert!(decode(&[ATYP_IPV4, 1, 2, 3]).is_none());
	}
}
