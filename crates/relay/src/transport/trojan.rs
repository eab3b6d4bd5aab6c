//! Trojan request framing: `SHA224(password)` as lowercase hex, CRLF,
//! command byte, SOCKS address, CRLF, then the payload — designed to be
//! indistinguishable from a TLS-wrapped HTTPS request to anything that
//! doesn't hold the password.

use sha2::{Digest, Sha224};

use crate::transport::buf::BufferWriter;
use crate::transport::socks_addr;
use crate::types::{Metadata, Network};

const CRLF: &[u8] = b"\r\n";
const CMD_CONNECT: u8 = 0x01;
const CMD_UDP_ASSOCIATE: u8 = 0x03;

/// Hex-encodes `SHA224(password)`, the value every Trojan client sends in
/// place of a plaintext password.
pub fn hashed_password(password: &str) -> String {
	let digest = Sha224::digest(password.as_bytes());
	hex::encode(digest)
}

pub fn build_request_header(password: &str, metadata: &Metadata) -> Vec<u8> {
	let mut w = BufferWriter::new();
	w.put_slice(hashed_password(password).as_bytes());
	w.put_slice(CRLF);
	w.put_u8(match metadata.network {
		Network::Tcp => CMD_CONNECT,
		Network::Udp => CMD_UDP_ASSOCIATE,
	});
	w.put_slice(&socks_addr::encode(metadata));
	w.put_slice(CRLF);
	w.into_vec()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn password_hash_is_56_hex_chars() {
		let hashed = hashed_password("secret");
		assert_eq!(hashed.len(), 56);
		assert!(hashed.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}

	#[test]
	fn request_header_is_framed_with_crlf() {
		let mut m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		m.host = Some("example.com".into());
		m.dst_port = 443;
		let header = build_request_header("secret", &m);
		assert!(header.starts_with(hashed_password("secret").as_bytes()));
		assert_eq!(&header[56..58], CRLF);
		assert_eq!(header[58], CMD_CONNECT);
		assert!(header.ends_with(CRLF));
	}

	#[test]
	fn udp_associate_uses_udp_command_byte() {
		let mut m = Metadata::new(Network::Udp, "127.0.0.1:1".parse().unwrap(), "test");
		m.dst_ip = Some("1.2.3.4".parse().unwrap());
		m.dst_port = 53;
		let header = build_request_header("secret", &m);
		assert_eq!(header[58], CMD_UDP_ASSOCIATE);
	}
}
