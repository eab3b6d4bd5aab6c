//! ShadowsocksR: `protocol(cipher(obfs(rawSocket)))` layering on top of
//! the plain Shadowsocks cipher primitives in `super::shadowsocks`.

pub mod obfs;
pub mod protocol;

use self::obfs::{Base as ObfsBase, Obfs, pick_obfs};
use self::protocol::{Base as ProtocolBase, Protocol, pick_protocol};
use super::shadowsocks::{Cipher, CipherError, CipherKind, StreamCrypter, evp_bytes_to_key, normalize_cipher_name};
use super::socks_addr;
use crate::types::Metadata;

#[derive(thiserror::Error, Debug)]
pub enum SsrError {
	#[error(transparent)]
	Cipher(#[from] CipherError),
	#[error(transparent)]
	Obfs(#[from] obfs::ObfsError),
	#[error(transparent)]
	Protocol(#[from] protocol::ProtocolError),
	/// The AEAD ciphers carry their own nonce/tag framing and have no
	/// meaningful IV for the protocol layer to sign, so an SSR config
	/// naming one is rejected outright.
	#[error("invalid connection type")]
	InvalidConnectionType,
}

#[derive(Clone, Debug)]
pub struct Options {
	pub server: String,
	pub port: u16,
	pub password: String,
	pub cipher: String,
	pub obfs: String,
	pub obfs_param: String,
	pub protocol: String,
	pub protocol_param: String,
	pub random_host: bool,
}

pub struct ShadowSocksR {
	crypter: StreamCrypter,
	obfs: Box<dyn Obfs>,
	protocol: Box<dyn Protocol>,
}

impl ShadowSocksR {
	pub fn new(mut opt: Options) -> Result<Self, SsrError> {
		opt.cipher = normalize_cipher_name(&opt.cipher);

		let (stream_kind, key) = if opt.cipher == "dummy" {
			(super::shadowsocks::StreamKind::Dummy, evp_bytes_to_key(&opt.password, 16))
		} else {
			let cipher = Cipher::pick(&opt.cipher, &opt.password)?;
			match cipher.kind {
				CipherKind::Stream(kind) => (kind, cipher.key),
				CipherKind::Aead(_) => return Err(SsrError::InvalidConnectionType),
			}
		};

		opt.obfs = opt.obfs.to_ascii_lowercase();
		if opt.obfs.starts_with("http_") && (opt.random_host || opt.obfs_param.is_empty()) {
			opt.obfs_param = obfs::rand_host();
		}

		let (obfs_impl, obfs_overhead) = pick_obfs(
			&opt.obfs,
			&ObfsBase {
				host: opt.server.clone(),
				port: opt.port,
				param: opt.obfs_param.clone(),
			},
		)?;

		opt.protocol = opt.protocol.to_ascii_lowercase();
		let protocol_impl = pick_protocol(
			&opt.protocol,
			&ProtocolBase {
				key: key.clone(),
				overhead: obfs_overhead,
				param: opt.protocol_param.clone(),
			},
		)?;

		Ok(ShadowSocksR {
			crypter: StreamCrypter::new(stream_kind, key),
			obfs: obfs_impl,
			protocol: protocol_impl,
		})
	}

	/// Builds the first outbound write: the SOCKS address header, run
	/// through `protocol -> cipher -> obfs`, the reverse of the read-side
	/// unwrap order (`obfs -> cipher -> protocol`).
	pub fn stream_request_header(&mut self, metadata: &Metadata) -> Vec<u8> {
		let iv = self.crypter.obtain_write_iv();
		let addr = socks_addr::encode(metadata);
		let tagged = self.protocol.encode(&iv, &addr);
		let mut ciphertext = tagged;
		self.crypter.apply_keystream(&iv, &mut ciphertext);
		let framed = self.obfs.encode(&ciphertext);
		let mut out = Vec::with_capacity(iv.len() + framed.len());
		out.extend_from_slice(&iv);
		out.extend_from_slice(&framed);
		out
	}

	/// Frames one outbound UDP datagram: `protocol -> cipher`, no obfs
	/// layer. Each datagram carries its own random IV since UDP has no
	/// persistent stream to derive one from once.
	pub fn encode_packet(&mut self, metadata: &Metadata, payload: &[u8]) -> Vec<u8> {
		let iv = self.crypter.random_iv();
		let mut plaintext = socks_addr::encode(metadata);
		plaintext.extend_from_slice(payload);
		let tagged = self.protocol.encode(&iv, &plaintext);
		let mut ciphertext = tagged;
		self.crypter.apply_keystream(&iv, &mut ciphertext);
		let mut out = Vec::with_capacity(iv.len() + ciphertext.len());
		out.extend_from_slice(&iv);
		out.extend_from_slice(&ciphertext);
		out
	}

	/// Unframes one inbound UDP datagram: splits off the leading IV, then
	/// `cipher -> protocol`, returning the SOCKS-addr-prefixed plaintext.
	pub fn decode_packet(&mut self, data: &[u8]) -> Option<Vec<u8>> {
		let iv_len = self.crypter.iv_len();
		if data.len() < iv_len {
			return None;
		}
		let (iv, ciphertext) = data.split_at(iv_len);
		let mut plaintext = ciphertext.to_vec();
		self.crypter.apply_keystream(iv, &mut plaintext);
		Some(self.protocol.decode(iv, &plaintext))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::Network;

	fn opts(cipher: &str) -> Options {
		Options {
			server: "example.com".into(),
			port: 8388,
			password: "hunter2".into(),
			cipher: cipher.into(),
			obfs: "plain".into(),
			obfs_param: String::new(),
			protocol: "origin".into(),
			protocol_param: String::new(),
			random_host: false,
		}
	}

	#[test]
	fn aead_cipher_is_rejected() {
		let err = ShadowSocksR::new(opts("aes-256-gcm")).unwrap_err();
		assert!(matches!(err, SsrError::InvalidConnectionType));
	}

	#[test]
	fn none_cipher_aliases_to_dummy_and_succeeds() {
		let ssr = ShadowSocksR::new(opts("none"));
		assert!(ssr.is_ok());
	}

	#[test]
	fn stream_cipher_builds_a_request_header() {
		let mut ssr = ShadowSocksR::new(opts("aes-128-ctr")).unwrap();
		let mut m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		m.host = Some("dst.example".into());
		m.dst_port = 443;
		let header = ssr.stream_request_header(&m);
		assert!(!header.is_empty());
	}

	#[test]
	fn http_obfs_picks_random_host_when_param_empty() {
		let mut o = opts("aes-128-ctr");
		o.obfs = "http_simple".into();
		let ssr = ShadowSocksR::new(o);
		assert!(ssr.is_ok());
	}
}
