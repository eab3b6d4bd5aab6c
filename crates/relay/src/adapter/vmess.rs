//! VMess adapter: dials the server, writes the AEAD-sealed request header
//! from `transport::vmess`, then wraps the stream in AEAD chunk framing
//! for the rest of the session.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use uuid::Uuid;

use super::{AdapterError, AdapterKind, Conn, PacketConn, ProxyAdapter, enable_tcp_keepalive};
use crate::transport::vmess::{Address, Command, Request, VmessStream, build_request_header};
use crate::types::{Metadata, Network};

pub struct VmessAdapter {
	name: String,
	server: String,
	port: u16,
	uuid: Uuid,
}

impl VmessAdapter {
	pub fn new(name: impl Into<String>, server: impl Into<String>, port: u16, uuid: Uuid) -> Self {
		VmessAdapter {
			name: name.into(),
			server: server.into(),
			port,
			uuid,
		}
	}

	/// The VMess "cmdKey" is MD5(uuid || "c48619fe-8f02-49e0-b9e9-edf763e17e21"),
	/// the fixed salt every VMess client uses to turn a UUID into the AEAD
	/// command key.
	fn cmd_key(&self) -> [u8; 16] {
		use md5::{Digest, Md5};
		const MAGIC: &str = "c48619fe-8f02-49e0-b9e9-edf763e17e21";
		let mut hasher = Md5::new();
		hasher.update(self.uuid.as_bytes());
		hasher.update(MAGIC.as_bytes());
		let digest = hasher.finalize();
		let mut key = [0u8; 16];
		key.copy_from_slice(&digest);
		key
	}
}

#[async_trait]
impl ProxyAdapter for VmessAdapter {
	async fn dial_tcp(&self, metadata: &Metadata) -> Result<Conn, AdapterError> {
		let proxy_addr = format!("{}:{}", self.server, self.port);
		let mut stream = TcpStream::connect(&proxy_addr)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
		enable_tcp_keepalive(&stream).map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;

		let cmd_key = self.cmd_key();
		let request = Request {
			command: match metadata.network {
				Network::Tcp => Command::Tcp,
				Network::Udp => Command::Udp,
			},
			address: match &metadata.host {
				Some(h) => Address::Domain(h.to_string()),
				None => Address::Ip(metadata.dst_ip.unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))),
			},
			port: metadata.dst_port,
		};
		let unix_time = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
		let header = build_request_header(&cmd_key, &request, unix_time);
		stream
			.write_all(&header)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;

		Ok(Box::new(VmessStream::new(stream, &cmd_key)))
	}

	async fn listen_udp(&self, _metadata: &Metadata) -> Result<Box<dyn PacketConn>, AdapterError> {
		Err(AdapterError::UdpUnsupported(self.name.clone()))
	}

	fn supports_udp(&self) -> bool {
		false
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn kind(&self) -> AdapterKind {
		AdapterKind::Vmess
	}
}
