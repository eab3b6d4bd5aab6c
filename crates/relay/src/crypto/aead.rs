//! VMess AEAD header sealing/opening.
//!
//! Layout: `authID(16) || aeadLen(2+16) || connectionNonce(8) ||
//! aeadHeader(len+16)`.

use aead::{Aead, KeyInit, Payload};
use aes::Aes128;
use aes_gcm::{Aes128Gcm, Nonce};
use ecb::Encryptor;
use ecb::cipher::{BlockEncryptMut, BlockSizeUser, KeyInit as EcbKeyInit, generic_array::GenericArray};
use rand::RngCore;

use crate::crypto::kdf::{kdf, kdf_str};

const AUTH_ID_LEN: usize = 16;
const CONN_NONCE_LEN: usize = 8;

#[derive(thiserror::Error, Debug)]
pub enum VMessHeaderError {
	#[error("sealed header too short")]
	Truncated,
	#[error("auth id did not decrypt to a matching CRC32")]
	AuthIdCrcMismatch,
	#[error("aead open failed (wrong key or corrupted data)")]
	AeadOpenFailed,
}

fn aes128_ecb_encrypt(key: &[u8; 16], block: &mut [u8; 16]) {
	let mut cipher = Encryptor::<Aes128>::new_from_slice(key).expect("16 byte key");
	let ga: &mut GenericArray<u8, <Encryptor<Aes128> as BlockSizeUser>::BlockSize> = GenericArray::from_mut_slice(block);
	cipher.encrypt_block_mut(ga);
}

fn aes128_ecb_decrypt(key: &[u8; 16], block: &mut [u8; 16]) {
	use ecb::Decryptor;
	use ecb::cipher::BlockDecryptMut;
	let mut cipher = Decryptor::<Aes128>::new_from_slice(key).expect("16 byte key");
	let ga: &mut GenericArray<u8, <Decryptor<Aes128> as BlockSizeUser>::BlockSize> = GenericArray::from_mut_slice(block);
	cipher.decrypt_block_mut(ga);
}

/// 8 bytes unix time (be) || 4 random bytes || CRC32/IEEE of those 12
/// bytes (be), AES-128-ECB encrypted with `kdf(cmdKey, "AES Auth ID
/// Encryption")[:16]`.
fn create_auth_id(cmd_key: &[u8], unix_time: u64) -> [u8; AUTH_ID_LEN] {
	let mut buf = [0u8; AUTH_ID_LEN];
	buf[0..8].copy_from_slice(&unix_time.to_be_bytes());
	rand::rng().fill_bytes(&mut buf[8..12]);
	let crc = crc32fast::hash(&buf[0..12]);
	buf[12..16].copy_from_slice(&crc.to_be_bytes());

	let key_material = kdf_str(cmd_key, &["AES Auth ID Encryption"]);
	let mut key = [0u8; 16];
	key.copy_from_slice(&key_material[..16]);
	aes128_ecb_encrypt(&key, &mut buf);
	buf
}

/// Inverse of `create_auth_id`: decrypts and checks the embedded CRC32,
/// returning the 8-byte timestamp on success.
fn open_auth_id(cmd_key: &[u8], auth_id: &[u8; AUTH_ID_LEN]) -> Result<u64, VMessHeaderError> {
	let key_material = kdf_str(cmd_key, &["AES Auth ID Encryption"]);
	let mut key = [0u8; 16];
	key.copy_from_slice(&key_material[..16]);
	let mut buf = *auth_id;
	aes128_ecb_decrypt(&key, &mut buf);
	let crc = crc32fast::hash(&buf[0..12]);
	if crc.to_be_bytes() != buf[12..16] {
		return Err(VMessHeaderError::AuthIdCrcMismatch);
	}
	let mut time_bytes = [0u8; 8];
	time_bytes.copy_from_slice(&buf[0..8]);
	Ok(u64::from_be_bytes(time_bytes))
}

fn gcm_seal(key32: [u8; 32], nonce12: [u8; 12], aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
	let cipher = Aes128Gcm::new_from_slice(&key32[..16]).expect("16 byte key");
	cipher
		.encrypt(
			Nonce::from_slice(&nonce12),
			Payload {
				msg: plaintext,
				aad,
			},
		)
		.expect("gcm seal of well-formed plaintext cannot fail")
}

fn gcm_open(key32: [u8; 32], nonce12: [u8; 12], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, VMessHeaderError> {
	let cipher = Aes128Gcm::new_from_slice(&key32[..16]).expect("16 byte key");
	cipher
		.decrypt(
			Nonce::from_slice(&nonce12),
			Payload {
				msg: ciphertext,
				aad,
			},
		)
		.map_err(|_| VMessHeaderError::AeadOpenFailed)
}

/// Seals `data` (the VMess request header payload) under `cmd_key`,
/// producing the full wire-ready header. `unix_time` and
/// `connection_nonce` are parameters (rather than sourced from
/// `SystemTime`/`rand` internally) purely so golden-vector tests can
/// pin them; real callers pass the current time and fresh random bytes.
pub fn seal_vmess_aead_header(
	cmd_key: &[u8; 16],
	data: &[u8],
	unix_time: u64,
	connection_nonce: [u8; CONN_NONCE_LEN],
) -> Vec<u8> {
	let auth_id = create_auth_id(cmd_key, unix_time);

	let len_key = kdf(cmd_key, &[b"VMess Header AEAD Key_Length", &auth_id, &connection_nonce]);
	let len_nonce = kdf(cmd_key, &[b"VMess Header AEAD Nonce_Length", &auth_id, &connection_nonce]);
	let mut len_nonce12 = [0u8; 12];
	len_nonce12.copy_from_slice(&len_nonce[..12]);
	let len_plain = (data.len() as u16).to_be_bytes();
	let sealed_len = gcm_seal(len_key, len_nonce12, &auth_id, &len_plain);

	let hdr_key = kdf(cmd_key, &[b"VMess Header AEAD Key", &auth_id, &connection_nonce]);
	let hdr_nonce = kdf(cmd_key, &[b"VMess Header AEAD Nonce", &auth_id, &connection_nonce]);
	let mut hdr_nonce12 = [0u8; 12];
	hdr_nonce12.copy_from_slice(&hdr_nonce[..12]);
	let sealed_hdr = gcm_seal(hdr_key, hdr_nonce12, &auth_id, data);

	let mut out = Vec::with_capacity(AUTH_ID_LEN + sealed_len.len() + CONN_NONCE_LEN + sealed_hdr.len());
	out.extend_from_slice(&auth_id);
	out.extend_from_slice(&sealed_len);
	out.extend_from_slice(&connection_nonce);
	out.extend_from_slice(&sealed_hdr);
	out
}

/// Opens a header sealed by `seal_vmess_aead_header`, returning the
/// original `data` and the embedded timestamp.
pub fn open_vmess_aead_header(cmd_key: &[u8; 16], sealed: &[u8]) -> Result<(Vec<u8>, u64), VMessHeaderError> {
	if sealed.len() < AUTH_ID_LEN + 2 + 16 + CONN_NONCE_LEN {
		return Err(VMessHeaderError::Truncated);
	}
	let mut auth_id = [0u8; AUTH_ID_LEN];
	auth_id.copy_from_slice(&sealed[0..AUTH_ID_LEN]);
	let time = open_auth_id(cmd_key, &auth_id)?;

	let sealed_len_bytes = &sealed[AUTH_ID_LEN..AUTH_ID_LEN + 2 + 16];
	let nonce_off = AUTH_ID_LEN + 2 + 16;
	let connection_nonce = &sealed[nonce_off..nonce_off + CONN_NONCE_LEN];
	let header_off = nonce_off + CONN_NONCE_LEN;
	if sealed.len() < header_off + 16 {
		return Err(VMessHeaderError::Truncated);
	}
	let sealed_header_bytes = &sealed[header_off..];

	let len_key = kdf(cmd_key, &[b"VMess Header AEAD Key_Length", &auth_id, connection_nonce]);
	let len_nonce = kdf(cmd_key, &[b"VMess Header AEAD Nonce_Length", &auth_id, connection_nonce]);
	let mut len_nonce12 = [0u8; 12];
	len_nonce12.copy_from_slice(&len_nonce[..12]);
	let len_plain = gcm_open(len_key, len_nonce12, &auth_id, sealed_len_bytes)?;
	if len_plain.len() != 2 {
		return Err(VMessHeaderError::Truncated);
	}
	let declared_len = u16::from_be_bytes([len_plain[0], len_plain[1]]) as usize;
	if sealed_header_bytes.len() != declared_len + 16 {
		return Err(VMessHeaderError::Truncated);
	}

	let hdr_key = kdf(cmd_key, &[b"VMess Header AEAD Key", &auth_id, connection_nonce]);
	let hdr_nonce = kdf(cmd_key, &[b"VMess Header AEAD Nonce", &auth_id, connection_nonce]);
	let mut hdr_nonce12 = [0u8; 12];
	hdr_nonce12.copy_from_slice(&hdr_nonce[..12]);
	let data = gcm_open(hdr_key, hdr_nonce12, &auth_id, sealed_header_bytes)?;

	Ok((data, time))
}

#[cfg(test)]
mod tests {
	use super::*;

	const CMD_KEY: [u8; 16] = *b"0123456789abcdef";

	#[test]
	fn round_trip_restores_payload() {
		let payload = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
		let nonce = [1, 2, 3, 4, 5, 6, 7, 8];
		let sealed = seal_vmess_aead_header(&CMD_KEY, payload, 1_700_000_000, nonce);
		let (opened, time) = open_vmess_aead_header(&CMD_KEY, &sealed).expect("opens cleanly");
		assert_eq!(opened, payload);
		assert_eq!(time, 1_700_000_000);
	}

	#[test]
	fn wrong_key_fails_to_open() {
		let payload = b"hello";
		let sealed = seal_vmess_aead_header(&CMD_KEY, payload, 1_700_000_000, [0; 8]);
		let other_key: [u8; 16] = *b"fedcba9876543210";
		assert!(open_vmess_aead_header(&other_key, &sealed).is_err());
	}

	#[test]
	fn truncated_input_is_rejected() {
		assert!(matches!(
			open_vmess_aead_header(&CMD_KEY, &[0u8; 4]),
			Err(VMessHeaderError::Truncated)
		));
	}

	#[test]
	fn deterministic_golden_vector_shape() {
		// Fixed cmdKey, time, and connection nonce: the sealed header's
		// length is pinned by the AEAD tag sizes, even though the
		// ciphertext bytes themselves vary with a fresh random AuthID
		// each call (AuthID embeds 4 random bytes).
		let payload = b"abc";
		let sealed = seal_vmess_aead_header(&CMD_KEY, payload, 1_700_000_000, [9; 8]);
		assert_eq!(sealed.len(), 16 + (2 + 16) + 8 + (payload.len() + 16));
	}
}
