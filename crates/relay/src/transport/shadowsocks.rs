//! Shadowsocks cipher selection and the classic `EVP_BytesToKey`-style key
//! derivation shared by plain Shadowsocks and the ShadowsocksR layering in
//! `shadowsocksr`. AEAD ciphers derive a per-session subkey from a random
//! salt (HKDF-SHA1); stream ciphers expose a raw IV that SSR's protocol
//! layer consumes via `obtain_write_iv`.

use aead::{Aead, KeyInit as AeadKeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce as GcmNonce};
use chacha20poly1305::ChaCha20Poly1305;
use ctr::cipher::{KeyIvInit, StreamCipher as CtrStreamCipherTrait};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::RngCore;
use sha1::Sha1;

#[derive(thiserror::Error, Debug)]
pub enum CipherError {
	#[error("unsupported cipher {0:?}")]
	Unsupported(String),
	#[error("{0} is not none/dummy or a supported stream cipher in ssr")]
	NotStreamCipher(String),
	#[error("aead open failed (wrong key, salt reuse, or corrupted data)")]
	AeadOpenFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeadKind {
	Aes128Gcm,
	Aes256Gcm,
	Chacha20Poly1305,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
	Aes128Ctr,
	Aes256Ctr,
	/// No-op cipher: SSR's `none`/`dummy` alias, used when only the obfs and
	/// protocol layers should run.
	Dummy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
	Aead(AeadKind),
	Stream(StreamKind),
}

impl CipherKind {
	pub fn key_len(self) -> usize {
		match self {
			CipherKind::Aead(AeadKind::Aes128Gcm) => 16,
			CipherKind::Aead(AeadKind::Aes256Gcm) => 32,
			CipherKind::Aead(AeadKind::Chacha20Poly1305) => 32,
			CipherKind::Stream(StreamKind::Aes128Ctr) => 16,
			CipherKind::Stream(StreamKind::Aes256Ctr) => 32,
			CipherKind::Stream(StreamKind::Dummy) => 16,
		}
	}

	pub fn iv_len(self) -> usize {
		match self {
			CipherKind::Aead(_) => 0,
			CipherKind::Stream(StreamKind::Aes128Ctr) => 16,
			CipherKind::Stream(StreamKind::Aes256Ctr) => 16,
			CipherKind::Stream(StreamKind::Dummy) => 0,
		}
	}
}

/// Normalizes the `none` alias and parses a cipher name into its kind.
/// Matches the upstream's SSR compatibility shim
/// (`strings.EqualFold(cipher, "none")` => `"dummy"`), applied
/// case-insensitively.
pub fn normalize_cipher_name(name: &str) -> String {
	if name.eq_ignore_ascii_case("none") {
		"dummy".to_string()
	} else {
		name.to_ascii_lowercase()
	}
}

pub fn pick_cipher_kind(name: &str) -> Result<CipherKind, CipherError> {
	let name = normalize_cipher_name(name);
	match name.as_str() {
		"aes-128-gcm" => Ok(CipherKind::Aead(AeadKind::Aes128Gcm)),
		"aes-256-gcm" => Ok(CipherKind::Aead(AeadKind::Aes256Gcm)),
		"chacha20-ietf-poly1305" | "chacha20-poly1305" => Ok(CipherKind::Aead(AeadKind::Chacha20Poly1305)),
		"aes-128-ctr" => Ok(CipherKind::Stream(StreamKind::Aes128Ctr)),
		"aes-256-ctr" => Ok(CipherKind::Stream(StreamKind::Aes256Ctr)),
		"dummy" => Ok(CipherKind::Stream(StreamKind::Dummy)),
		other => Err(CipherError::Unsupported(other.to_string())),
	}
}

/// OpenSSL's `EVP_BytesToKey` with MD5, the key derivation every
/// Shadowsocks/SSR implementation uses to turn a user password into raw
/// key bytes.
pub fn evp_bytes_to_key(password: &str, key_len: usize) -> Vec<u8> {
	let mut key = Vec::with_capacity(key_len);
	let mut prev: Vec<u8> = Vec::new();
	while key.len() < key_len {
		let mut hasher = Md5::new();
		hasher.update(&prev);
		hasher.update(password.as_bytes());
		prev = hasher.finalize().to_vec();
		key.extend_from_slice(&prev);
	}
	key.truncate(key_len);
	key
}

pub struct Cipher {
	pub kind: CipherKind,
	pub key: Vec<u8>,
}

impl Cipher {
	pub fn pick(name: &str, password: &str) -> Result<Self, CipherError> {
		let kind = pick_cipher_kind(name)?;
		let key = evp_bytes_to_key(password, kind.key_len());
		Ok(Cipher { kind, key })
	}

	pub fn is_aead(&self) -> bool {
		matches!(self.kind, CipherKind::Aead(_))
	}
}

/// Stream-cipher wrapper. Generates (and caches) a random IV on first use
/// so callers -- notably ShadowsocksR's protocol layer -- can read it back
/// via `obtain_write_iv`, mirroring the upstream's
/// `shadowstream.Conn.ObtainWriteIV`.
pub struct StreamCrypter {
	kind: StreamKind,
	key: Vec<u8>,
	write_iv: Option<Vec<u8>>,
}

impl StreamCrypter {
	pub fn new(kind: StreamKind, key: Vec<u8>) -> Self {
		StreamCrypter {
			kind,
			key,
			write_iv: None,
		}
	}

	pub fn obtain_write_iv(&mut self) -> Vec<u8> {
		if let Some(iv) = &self.write_iv {
			return iv.clone();
		}
		let iv = self.random_iv();
		self.write_iv = Some(iv.clone());
		iv
	}

	pub fn iv_len(&self) -> usize {
		self.kind.iv_len().max(1)
	}

	/// A fresh IV, independent of the cached connection IV `obtain_write_iv`
	/// tracks. Each UDP datagram needs its own, unlike a TCP stream's single
	/// IV for the whole connection.
	pub fn random_iv(&self) -> Vec<u8> {
		let mut iv = vec![0u8; self.iv_len()];
		if self.kind != StreamKind::Dummy {
			rand::rng().fill_bytes(&mut iv);
		}
		iv
	}

	/// Encrypts/decrypts in place (CTR mode is its own inverse). `Dummy`
	/// leaves the buffer untouched.
	pub fn apply_keystream(&self, iv: &[u8], data: &mut [u8]) {
		match self.kind {
			StreamKind::Dummy => {},
			StreamKind::Aes128Ctr => {
				let mut c = ctr::Ctr128BE::<aes::Aes128>::new(self.key.as_slice().into(), iv.into());
				c.apply_keystream(data);
			},
			StreamKind::Aes256Ctr => {
				let mut c = ctr::Ctr128BE::<aes::Aes256>::new(self.key.as_slice().into(), iv.into());
				c.apply_keystream(data);
			},
		}
	}
}

fn hkdf_sha1(salt: &[u8], ikm: &[u8], info: &[u8], out_len: usize) -> Vec<u8> {
	// RFC 5869 extract-and-expand, built from HMAC-SHA1 directly since the
	// crate set here favors primitive `hmac`/`sha1` over a dedicated hkdf
	// dependency for this one call site.
	let mut extractor = Hmac::<Sha1>::new_from_slice(salt).expect("hmac accepts any key length");
	extractor.update(ikm);
	let prk = extractor.finalize().into_bytes();

	let mut okm = Vec::with_capacity(out_len);
	let mut prev: Vec<u8> = Vec::new();
	let mut counter = 1u8;
	while okm.len() < out_len {
		let mut expander = Hmac::<Sha1>::new_from_slice(&prk).expect("hmac accepts any key length");
		expander.update(&prev);
		expander.update(info);
		expander.update(&[counter]);
		prev = expander.finalize().into_bytes().to_vec();
		okm.extend_from_slice(&prev);
		counter += 1;
	}
	okm.truncate(out_len);
	okm
}

/// Derives the per-session AEAD subkey from the master key and a random
/// salt, the construction every Shadowsocks AEAD cipher uses before
/// sealing the first chunk.
pub fn derive_session_key(master_key: &[u8], salt: &[u8]) -> Vec<u8> {
	hkdf_sha1(salt, master_key, b"ss-subkey", master_key.len())
}

pub fn aead_seal(kind: AeadKind, session_key: &[u8], nonce12: &[u8; 12], plaintext: &[u8]) -> Vec<u8> {
	match kind {
		AeadKind::Aes128Gcm => Aes128Gcm::new_from_slice(session_key)
			.expect("valid key length")
			.encrypt(GcmNonce::from_slice(nonce12), Payload { msg: plaintext, aad: &[] })
			.expect("gcm seal cannot fail for valid input"),
		AeadKind::Aes256Gcm => Aes256Gcm::new_from_slice(session_key)
			.expect("valid key length")
			.encrypt(GcmNonce::from_slice(nonce12), Payload { msg: plaintext, aad: &[] })
			.expect("gcm seal cannot fail for valid input"),
		AeadKind::Chacha20Poly1305 => ChaCha20Poly1305::new_from_slice(session_key)
			.expect("valid key length")
			.encrypt(nonce12.into(), Payload { msg: plaintext, aad: &[] })
			.expect("chacha seal cannot fail for valid input"),
	}
}

pub fn aead_open(kind: AeadKind, session_key: &[u8], nonce12: &[u8; 12], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
	let res = match kind {
		AeadKind::Aes128Gcm => Aes128Gcm::new_from_slice(session_key)
			.expect("valid key length")
			.decrypt(GcmNonce::from_slice(nonce12), Payload { msg: ciphertext, aad: &[] }),
		AeadKind::Aes256Gcm => Aes256Gcm::new_from_slice(session_key)
			.expect("valid key length")
			.decrypt(GcmNonce::from_slice(nonce12), Payload { msg: ciphertext, aad: &[] }),
		AeadKind::Chacha20Poly1305 => ChaCha20Poly1305::new_from_slice(session_key)
			.expect("valid key length")
			.decrypt(nonce12.into(), Payload { msg: ciphertext, aad: &[] }),
	};
	res.map_err(|_| CipherError::AeadOpenFailed)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn none_aliases_to_dummy_case_insensitively() {
		for variant in ["none", "NONE", "None"] {
			assert_eq!(normalize_cipher_name(variant), "dummy");
		}
		assert_eq!(pick_cipher_kind("none").unwrap(), CipherKind::Stream(StreamKind::Dummy));
	}

	#[test]
	fn key_derivation_is_deterministic_and_sized() {
		let k1 = evp_bytes_to_key("hunter2", 32);
		let k2 = evp_bytes_to_key("hunter2", 32);
		assert_eq!(k1, k2);
		assert_eq!(k1.len(), 32);
		assert_ne!(k1, evp_bytes_to_key("other", 32));
	}

	#[test]
	fn aead_round_trip() {
		let key = evp_bytes_to_key("pw", 32);
		let session = derive_session_key(&key, b"saltsaltsaltsalt");
		let nonce = [0u8; 12];
		let sealed = aead_seal(AeadKind::Aes256Gcm, &session, &nonce, b"payload");
		let opened = aead_open(AeadKind::Aes256Gcm, &session, &nonce, &sealed).unwrap();
		assert_eq!(opened, b"payload");
	}

	#[test]
	fn stream_crypter_round_trips_via_ctr_symmetry() {
		let key = evp_bytes_to_key("pw", 16);
		let mut crypter = StreamCrypter::new(StreamKind::Aes128Ctr, key);
		let iv = crypter.obtain_write_iv();
		let mut data = b"hello world".to_vec();
		crypter.apply_keystream(&iv, &mut data);
		assert_ne!(data, b"hello world");
		crypter.apply_keystream(&iv, &mut data);
		assert_eq!(data, b"hello world");
	}

	#[test]
	fn dummy_cipher_is_a_no_op() {
		let mut crypter = StreamCrypter::new(StreamKind::Dummy, vec![]);
		let iv = crypter.obtain_write_iv();
		let mut data = b"untouched".to_vec();
		crypter.apply_keystream(&iv, &mut data);
		assert_eq!(data, b"untouched");
	}
}
