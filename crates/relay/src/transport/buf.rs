//! A small staged byte writer over a pooled `BytesMut` backing buffer.
//! Wire codecs (`vmess`, `shadowsocksr`) use it to assemble a header or
//! packet in one contiguous allocation instead of many small `Vec`
//! pushes, then hand the finished bytes to a single socket write.

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;

const POOLED_CAPACITY: usize = 2048;
const MAX_POOLED: usize = 64;

static POOL: Mutex<Vec<BytesMut>> = Mutex::new(Vec::new());

/// A checked-out buffer. Returned to the process-wide pool on drop if it
/// hasn't grown unreasonably large, otherwise simply freed.
pub struct BufferWriter {
	buf: BytesMut,
}

impl Default for BufferWriter {
	fn default() -> Self {
		Self::new()
	}
}

impl BufferWriter {
	pub fn new() -> Self {
		let buf = POOL
			.lock()
			.pop()
			.unwrap_or_else(|| BytesMut::with_capacity(POOLED_CAPACITY));
		BufferWriter { buf }
	}

	pub fn put_slice(&mut self, data: &[u8]) -> &mut Self {
		self.buf.put_slice(data);
		self
	}

	pub fn put_u64_be(&mut self, v: u64) -> &mut Self {
		self.buf.put_u64(v);
		self
	}

	pub fn put_u32_be(&mut self, v: u32) -> &mut Self {
		self.buf.put_u32(v);
		self
	}

	pub fn put_u16_be(&mut self, v: u16) -> &mut Self {
		self.buf.put_u16(v);
		self
	}

	pub fn put_u8(&mut self, v: u8) -> &mut Self {
		self.buf.put_u8(v);
		self
	}

	pub fn bytes(&self) -> &[u8] {
		&self.buf
	}

	pub fn len(&self) -> usize {
		self.buf.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}

	/// Consumes the writer, returning the assembled bytes and releasing
	/// the underlying allocation back to the pool.
	pub fn into_vec(mut self) -> Vec<u8> {
		let out = self.buf.to_vec();
		self.buf.clear();
		out
	}
}

impl Drop for BufferWriter {
	fn drop(&mut self) {
		if self.buf.capacity() == 0 {
			return;
		}
		self.buf.clear();
		let mut pool = POOL.lock();
		if pool.len() < MAX_POOLED {
			pool.push(std::mem::take(&mut self.buf));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn assembles_staged_bytes() {
		let mut w = BufferWriter::new();
		w.put_u64_be(42).put_slice(b"abc");
		assert_eq!(w.len(), 11);
		let out = w.into_vec();
		assert_eq!(&out[..8], &42u64.to_be_bytes());
		assert_eq!(&out[8..], b"abc");
	}

	#[test]
	fn reuses_pooled_backing() {
		{
			let mut w = BufferWriter::new();
			w.put_slice(&[0u8; 256]);
		}
		let w2 = BufferWriter::new();
		assert!(w2.buf.capacity() >= 256);
	}
}
