//! SOCKS5 CONNECT adapter: no-auth or username/password handshake
//! followed by a CONNECT request, per RFC 1928.

use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{AdapterError, AdapterKind, Conn, PacketConn, ProxyAdapter, enable_tcp_keepalive};
use crate::transport::buf::BufferWriter;
use crate::types::Metadata;

const VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_USER_PASS: u8 = 0x02;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

pub struct Socks5Adapter {
	name: String,
	server: String,
	port: u16,
	username: Option<String>,
	password: Option<String>,
}

impl Socks5Adapter {
	pub fn new(name: impl Into<String>, server: impl Into<String>, port: u16, username: Option<String>, password: Option<String>) -> Self {
		Socks5Adapter {
			name: name.into(),
			server: server.into(),
			port,
			username,
			password,
		}
	}

	async fn handshake(&self, stream: &mut TcpStream, proxy_addr: &str) -> Result<(), AdapterError> {
		let wants_auth = self.username.is_some();
		let methods: &[u8] = if wants_auth { &[METHOD_USER_PASS] } else { &[METHOD_NO_AUTH] };
		let mut greeting = vec![VERSION, methods.len() as u8];
		greeting.extend_from_slice(methods);
		stream
			.write_all(&greeting)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.to_string(), e))?;

		let mut resp = [0u8; 2];
		stream
			.read_exact(&mut resp)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.to_string(), e))?;
		if resp[0] != VERSION {
			return Err(AdapterError::Dial(proxy_addr.to_string(), io::Error::other("unexpected socks version")));
		}
		match resp[1] {
			METHOD_NO_AUTH => {},
			METHOD_USER_PASS => {
				let user = self.username.as_deref().unwrap_or_default();
				let pass = self.password.as_deref().unwrap_or_default();
				let mut auth = vec![0x01u8, user.len() as u8];
				auth.extend_from_slice(user.as_bytes());
				auth.push(pass.len() as u8);
				auth.extend_from_slice(pass.as_bytes());
				stream
					.write_all(&auth)
					.await
					.map_err(|e| AdapterError::Dial(proxy_addr.to_string(), e))?;
				let mut auth_resp = [0u8; 2];
				stream
					.read_exact(&mut auth_resp)
					.await
					.map_err(|e| AdapterError::Dial(proxy_addr.to_string(), e))?;
				if auth_resp[1] != 0x00 {
					return Err(AdapterError::Dial(proxy_addr.to_string(), io::Error::other("socks5 auth rejected")));
				}
			},
			0xFF => return Err(AdapterError::Dial(proxy_addr.to_string(), io::Error::other("no acceptable socks5 auth method"))),
			other => return Err(AdapterError::Dial(proxy_addr.to_string(), io::Error::other(format!("unsupported socks5 method {other}")))),
		}
		Ok(())
	}

	async fn connect(&self, stream: &mut TcpStream, metadata: &Metadata, proxy_addr: &str) -> Result<(), AdapterError> {
		let mut w = BufferWriter::new();
		w.put_u8(VERSION).put_u8(CMD_CONNECT).put_u8(0x00);
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
			(None, None) => return Err(AdapterError::Dial(proxy_addr.to_string(), io::Error::other("no destination to connect to"))),
		}
		w.put_u16_be(metadata.dst_port);
		stream
			.write_all(w.bytes())
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.to_string(), e))?;

		let mut header = [0u8; 4];
		stream
			.read_exact(&mut header)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.to_string(), e))?;
		if header[1] != 0x00 {
			return Err(AdapterError::Dial(proxy_addr.to_string(), io::Error::other(format!("socks5 connect failed: code {}", header[1]))));
		}
		let skip = match header[3] {
			ATYP_IPV4 => 4,
			ATYP_IPV6 => 16,
			ATYP_DOMAIN => {
				let mut len = [0u8; 1];
				stream
					.read_exact(&mut len)
					.await
					.map_err(|e| AdapterError::Dial(proxy_addr.to_string(), e))?;
				len[0] as usize
			},
			other => return Err(AdapterError::Dial(proxy_addr.to_string(), io::Error::other(format!("unknown atyp {other}")))),
		};
		let mut discard = vec![0u8; skip + 2];
		stream
			.read_exact(&mut discard)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.to_string(), e))?;
		Ok(())
	}
}

#[async_trait]
impl ProxyAdapter for Socks5Adapter {
	async fn dial_tcp(&self, metadata: &Metadata) -> Result<Conn, AdapterError> {
		let proxy_addr = format!("{}:{}", self.server, self.port);
		let mut stream = TcpStream::connect(&proxy_addr)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
		enable_tcp_keepalive(&stream).map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
		self.handshake(&mut stream, &proxy_addr).await?;
		self.connect(&mut stream, metadata, &proxy_addr).await?;
		Ok(Box::new(stream))
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
		AdapterKind::Socks5
	}
}
