//! Races a set of named DNS transports, consistent with this crate's
//! heavy `futures`/`futures-util` usage elsewhere: the first non-error,
//! non-`ServFail`/`Refused` response wins and every other in-flight
//! lookup is dropped (cancelled) once the winner resolves.

use std::sync::Arc;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use hickory_proto::op::{Message, ResponseCode};
use relay_core::Strng;

use super::transport::DnsTransport;

pub struct PickResult {
	pub message: Message,
	pub source: Strng,
}

fn is_soft_failure(code: ResponseCode) -> bool {
	matches!(code, ResponseCode::ServFail | ResponseCode::Refused)
}

/// Returns the first upstream whose answer isn't a transport error or a
/// soft DNS failure. If every upstream fails, returns `None` (the caller
/// surfaces "all DNS requests failed").
pub async fn race(transports: &[(Strng, Arc<dyn DnsTransport>)], query: &Message) -> Option<PickResult> {
	let mut inflight = FuturesUnordered::new();
	for (name, transport) in transports {
		let name = name.clone();
		let transport = transport.clone();
		let query = query.clone();
		inflight.push(async move {
			let result = transport.exchange(&query).await;
			(name, result)
		});
	}

	while let Some((name, result)) = inflight.next().await {
		match result {
			Ok(message) if !is_soft_failure(message.response_code()) => {
				return Some(PickResult { message, source: name });
			},
			Ok(_) => continue,
			Err(_) => continue,
		}
	}
	None
}

#[cfg(test)]
mod tests {
	use async_trait::async_trait;

	use super::super::transport::TransportError;
	use super::*;

	struct FixedTransport {
		response_code: ResponseCode,
	}

	#[async_trait]
	impl DnsTransport for FixedTransport {
		async fn exchange(&self, query: &Message) -> Result<Message, TransportError> {
			let mut msg = query.clone();
			msg.set_response_code(self.response_code);
			Ok(msg)
		}
	}

	#[tokio::test]
	async fn first_non_soft_failure_wins() {
		let transports: Vec<(Strng, Arc<dyn DnsTransport>)> = vec![
			("servfail".into(), Arc::new(FixedTransport { response_code: ResponseCode::ServFail })),
			("good".into(), Arc::new(FixedTransport { response_code: ResponseCode::NoError })),
		];
		let query = Message::new();
		let result = race(&transports, &query).await.expect("one upstream answers cleanly");
		assert_eq!(result.source.as_str(), "good");
	}

	#[tokio::test]
	async fn all_soft_failures_yields_none() {
		let transports: Vec<(Strng, Arc<dyn DnsTransport>)> =
			vec![("a".into(), Arc::new(FixedTransport { response_code: ResponseCode::ServFail }))];
		let query = Message::new();
		assert!(race(&transports, &query).await.is_none());
	}
}
