//! SSR obfuscation plugins. Only `plain` and the `http_*` family are
//! implemented; both operate on just the first write/read of a
//! connection, matching the upstream plugins' behavior of disguising the
//! handshake rather than every subsequent packet.

const HOST_POOL: &[&str] = &[
	"www.bing.com",
	"www.baidu.com",
	"www.taobao.com",
	"www.qq.com",
	"www.tmall.com",
	"www.sina.com.cn",
	"www.weibo.com",
	"www.163.com",
];

/// Picks a synthetic Host header value. Grounded on the upstream's
/// `convert.RandHost()`, used when `obfs-param` is empty or `rand-host`
/// is set.
pub fn rand_host() -> String {
	let idx = (rand::random::<u32>() as usize) % HOST_POOL.len();
	HOST_POOL[idx].to_string()
}

#[derive(thiserror::Error, Debug)]
pub enum ObfsError {
	#[error("unsupported obfs {0:?}")]
	Unsupported(String),
}

pub struct Base {
	pub host: String,
	pub port: u16,
	pub param: String,
}

pub trait Obfs: Send {
	/// Wraps an outbound chunk. No-op after the first call for obfs
	/// plugins that only disguise the handshake.
	fn encode(&mut self, data: &[u8]) -> Vec<u8>;
	/// Strips an inbound chunk's disguise, if any remains to strip.
	fn decode(&mut self, data: &[u8]) -> Vec<u8>;
}

pub struct Plain;

impl Obfs for Plain {
	fn encode(&mut self, data: &[u8]) -> Vec<u8> {
		data.to_vec()
	}

	fn decode(&mut self, data: &[u8]) -> Vec<u8> {
		data.to_vec()
	}
}

pub struct HttpSimple {
	host: String,
	first_write_done: bool,
	first_read_done: bool,
}

impl HttpSimple {
	pub fn new(base: &Base) -> Self {
		let host = if base.param.is_empty() {
			rand_host()
		} else {
			base.param.clone()
		};
		HttpSimple {
			host,
			first_write_done: false,
			first_read_done: false,
		}
	}
}

impl Obfs for HttpSimple {
	fn encode(&mut self, data: &[u8]) -> Vec<u8> {
		if self.first_write_done {
			return data.to_vec();
		}
		self.first_write_done = true;
		let mut out = format!(
			"GET / HTTP/1.1\r\nHost: {}\r\nUser-Agent: curl/7.88.1\r\nAccept: */*\r\nConnection: Upgrade\r\n\r\n",
			self.host
		)
		.into_bytes();
		out.extend_from_slice(data);
		out
	}

	fn decode(&mut self, data: &[u8]) -> Vec<u8> {
		if self.first_read_done {
			return data.to_vec();
		}
		self.first_read_done = true;
		match data.windows(4).position(|w| w == b"\r\n\r\n") {
			Some(pos) => data[pos + 4..].to_vec(),
			None => data.to_vec(),
		}
	}
}

pub fn pick_obfs(name: &str, base: &Base) -> Result<(Box<dyn Obfs>, usize), ObfsError> {
	match name.to_ascii_lowercase().as_str() {
		"plain" | "" => Ok((Box::new(Plain), 0)),
		"http_simple" | "http_post" => Ok((Box::new(HttpSimple::new(base)), 0)),
		other => Err(ObfsError::Unsupported(other.to_string())),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn http_simple_wraps_only_first_write() {
		let mut obfs = HttpSimple::new(&Base {
			host: "x".into(),
			port: 0,
			param: "my.host".into(),
		});
		let first = obfs.encode(b"payload");
		assert!(String::from_utf8_lossy(&first).contains("Host: my.host"));
		let second = obfs.encode(b"more");
		assert_eq!(second, b"more");
	}

	#[test]
	fn rand_host_param_falls_back_to_pool() {
		let base = Base {
			host: "x".into(),
			port: 0,
			param: String::new(),
		};
		let (_, overhead) = pick_obfs("http_simple", &base).unwrap();
		assert_eq!(overhead, 0);
	}
}
