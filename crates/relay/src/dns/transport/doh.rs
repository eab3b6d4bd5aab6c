//! DNS-over-HTTPS: POST `application/dns-message` bytes to a resolver
//! URL. The query ID is rewritten to 0 before transmission (so the CDN in
//! front of most public DoH resolvers can cache the response) and
//! restored on the reply.

use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Message;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use super::{DnsTransport, TransportError};

const DNS_MESSAGE_MIME: &str = "application/dns-message";

pub struct DohTransport {
	url: String,
	client: Arc<reqwest::Client>,
}

impl DohTransport {
	pub fn new(url: impl Into<String>, client: Arc<reqwest::Client>) -> Self {
		DohTransport { url: url.into(), client }
	}
}

#[async_trait]
impl DnsTransport for DohTransport {
	async fn exchange(&self, query: &Message) -> Result<Message, TransportError> {
		let original_id = query.id();
		let mut rewritten = query.clone();
		rewritten.set_id(0);
		let wire = rewritten.to_vec()?;

		let resp = self
			.client
			.post(&self.url)
			.header(CONTENT_TYPE, DNS_MESSAGE_MIME)
			.header(ACCEPT, DNS_MESSAGE_MIME)
			.body(wire)
			.send()
			.await?
			.error_for_status()?;
		let body = resp.bytes().await?;

		let mut answer = Message::from_vec(&body)?;
		answer.set_id(original_id);
		Ok(answer)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stores_the_configured_url() {
		let t = DohTransport::new("https://dns.example/dns-query", Arc::new(reqwest::Client::new()));
		assert_eq!(t.url, "https://dns.example/dns-query");
	}
}
