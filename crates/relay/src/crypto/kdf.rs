//! VMess AEAD's HMAC-chained key derivation.
//!
//! `kdf(key, path...)` is defined recursively: the bottom level is a
//! standard HMAC-SHA256 keyed by the literal salt `"VMess AEAD KDF"`.
//! Each subsequent path element becomes the key of an HMAC whose
//! underlying hash function is the *previous level's HMAC instance*
//! (not SHA256 directly) — so a path of length `n` produces `n+1`
//! nested HMACs, and the final level MACs the caller's secret `key`.
//!
//! Because the nesting substitutes the hash algorithm itself (not just
//! the key material) at each level, it can't be expressed as a plain
//! fold over `hmac::Hmac<Sha256>` from the `hmac` crate — that crate's
//! `Hmac<D>` is generic over a `Digest`, not over "the previous HMAC
//! instance". The base case (keyed by the salt) uses `hmac`+`sha2`
//! directly; each further level reuses SHA256's block/output size (64
//! and 32 bytes, matching HMAC-SHA256's own parameters) through a small
//! hand-written HMAC composition, which is the one place this module
//! cannot just call into RustCrypto's `Hmac` type.

use hmac::{Hmac, Mac};
use sha2::Sha256;

const VMESS_AEAD_KDF_SALT: &[u8] = b"VMess AEAD KDF";
const BLOCK_SIZE: usize = 64;

type HashFn<'a> = dyn Fn(&[u8]) -> [u8; 32] + 'a;

fn hmac_with(key: &[u8], msg: &[u8], h: &HashFn) -> [u8; 32] {
	let mut k = if key.len() > BLOCK_SIZE {
		h(key).to_vec()
	} else {
		key.to_vec()
	};
	k.resize(BLOCK_SIZE, 0);

	let mut ipad = vec![0x36u8; BLOCK_SIZE];
	let mut opad = vec![0x5cu8; BLOCK_SIZE];
	for i in 0..BLOCK_SIZE {
		ipad[i] ^= k[i];
		opad[i] ^= k[i];
	}

	ipad.extend_from_slice(msg);
	let inner = h(&ipad);

	opad.extend_from_slice(&inner);
	h(&opad)
}

fn base_level(msg: &[u8]) -> [u8; 32] {
	let mut mac = Hmac::<Sha256>::new_from_slice(VMESS_AEAD_KDF_SALT).expect("hmac accepts any key length");
	mac.update(msg);
	mac.finalize().into_bytes().into()
}

/// Computes the `n+1`-deep nested-HMAC chain and returns the 32-byte
/// output of MACing `key` at the deepest level.
pub fn kdf(key: &[u8], path: &[&[u8]]) -> [u8; 32] {
	// Build the chain of hash closures bottom-up, then MAC `key`.
	let mut chain: Box<HashFn> = Box::new(base_level);
	for segment in path {
		let segment = segment.to_vec();
		let prev = chain;
		chain = Box::new(move |msg: &[u8]| hmac_with(&segment, msg, &*prev));
	}
	chain(key)
}

/// Convenience wrapper for the common case of string-ish path segments.
pub fn kdf_str(key: &[u8], path: &[&str]) -> [u8; 32] {
	let path: Vec<&[u8]> = path.iter().map(|s| s.as_bytes()).collect();
	kdf(key, &path)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deterministic_for_same_inputs() {
		let a = kdf_str(b"secret", &["AES Auth ID Encryption"]);
		let b = kdf_str(b"secret", &["AES Auth ID Encryption"]);
		assert_eq!(a, b);
	}

	#[test]
	fn differs_per_path_depth() {
		let zero = kdf(b"secret", &[]);
		let one = kdf_str(b"secret", &["a"]);
		let two = kdf_str(b"secret", &["a", "b"]);
		assert_ne!(zero, one);
		assert_ne!(one, two);
	}

	#[test]
	fn differs_from_plain_hmac_sha256() {
		// Not a plain single-level HMAC-SHA256(key=salt) of the secret —
		// the one-path-segment case already has two nested levels.
		let nested = kdf_str(b"secret", &["x"]);
		let mut plain = Hmac::<Sha256>::new_from_slice(VMESS_AEAD_KDF_SALT).unwrap();
		plain.update(b"secret");
		let plain: [u8; 32] = plain.finalize().into_bytes().into();
		assert_ne!(nested, plain);
	}
}
