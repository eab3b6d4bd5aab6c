//! Resolver core: cache lookup, main/fallback racing via `picker`, the
//! fallback-filter reroute, empty-answer synthesis for a disabled address
//! family, and fake-IP allocation -- the `ExchangeContext` algorithm
//! (§4.6) in one place.

use std::net::IpAddr;
use std::sync::Arc;

use hickory_proto::op::{Message, Query};
use hickory_proto::rr::{DNSClass, Name, RecordType};
use relay_core::Strng;

use super::cache::{Cache, cache_key};
use super::fakeip::FakeIpStore;
use super::picker;
use super::transport::DnsTransport;
use crate::rules::domain::DomainRule;
use crate::rules::geoip::GeoIpDatabase;

#[derive(thiserror::Error, Debug)]
pub enum DnsError {
	#[error("all dns requests failed")]
	AllFailed,
	#[error("invalid hostname {0}")]
	InvalidHost(String),
	#[error("no address record for {0}")]
	NoAnswer(String),
}

pub struct FakeIpSettings {
	pub store: Arc<FakeIpStore>,
	/// Hosts matching one of these are excluded from fake-IP and resolved
	/// normally instead.
	pub filter: Vec<DomainRule>,
}

/// Resolved, ready-to-race upstream set plus the fallback/family/fake-IP
/// policy around it. Assembled by `config::load`/the parser (not raw
/// config deserialized in place), so it carries live transports rather
/// than connection strings.
#[derive(Clone)]
pub struct ResolverConfig {
	pub main: Vec<(Strng, Arc<dyn DnsTransport>)>,
	pub fallback: Vec<(Strng, Arc<dyn DnsTransport>)>,
	pub fallback_filter_db: Option<Arc<GeoIpDatabase>>,
	pub fallback_filter_country: Option<String>,
	pub ipv4_disabled: bool,
	pub ipv6_disabled: bool,
	pub fake_ip: Option<Arc<FakeIpSettings>>,
}

impl std::fmt::Debug for ResolverConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ResolverConfig")
			.field("main", &self.main.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>())
			.field("fallback", &self.fallback.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>())
			.field("ipv4_disabled", &self.ipv4_disabled)
			.field("ipv6_disabled", &self.ipv6_disabled)
			.field("fake_ip", &self.fake_ip.is_some())
			.finish()
	}
}

/// Synthesized empty answers never touched an upstream, so they're
/// labelled with this instead of a transport name.
const LOCAL_SOURCE: &str = "relay";

/// A resolved message plus the upstream (`rMsg.Source`) that answered it,
/// carried through cache hits and fresh lookups alike so callers can
/// report and log it (§3/§6).
pub struct Answer {
	pub message: Message,
	pub source: String,
}

pub struct Resolver {
	config: ResolverConfig,
	cache: Cache,
}

impl Resolver {
	pub fn new(config: ResolverConfig) -> Self {
		Resolver { config, cache: Cache::new() }
	}

	pub async fn exchange(&self, query: &Message, proxy_adapter: Option<&str>) -> Result<Answer, DnsError> {
		if let Some(empty) = self.synthesize_disabled_family(query) {
			return Ok(Answer { message: empty, source: LOCAL_SOURCE.to_string() });
		}

		let key = cache_key(query, proxy_adapter);
		if let Some((mut cached, source)) = self.cache.get(&key) {
			cached.set_id(query.id());
			return Ok(Answer { message: cached, source });
		}

		let mut picked = picker::race(&self.config.main, query).await;

		if let Some(result) = &picked {
			if self.fallback_filter_triggered(&result.message) && !self.config.fallback.is_empty() {
				if let Some(fallback_result) = picker::race(&self.config.fallback, query).await {
					picked = Some(fallback_result);
				}
			}
		}

		let Some(result) = picked else { return Err(DnsError::AllFailed) };
		self.cache.put(key, result.message.clone(), result.source.to_string());

		let mut message = result.message;
		message.set_id(query.id());

		let question = message.queries().first();
		tracing::debug!(
			target: "relay::dns",
			source = %result.source,
			qtype = question.map(|q| q.query_type().to_string()).unwrap_or_default(),
			name = question.map(|q| q.name().to_string()).unwrap_or_default(),
			answers = ?message.answers().iter().map(render_answer).collect::<Vec<_>>(),
			"dns answer"
		);

		Ok(Answer { message, source: result.source.to_string() })
	}

	/// `host -> IP` for the dispatcher's pre-dial resolve step. Prefers a
	/// fake-IP allocation over a real A query when fake-IP mode is
	/// configured and `host` isn't excluded by its filter.
	pub async fn resolve_host(&self, host: &str, metadata: &crate::types::Metadata) -> Result<IpAddr, DnsError> {
		let name = Name::from_ascii(format!("{host}.")).map_err(|_| DnsError::InvalidHost(host.to_string()))?;
		let mut query_msg = Message::new();
		let mut question = Query::new();
		question.set_name(name);
		question.set_query_type(RecordType::A);
		question.set_query_class(DNSClass::IN);
		query_msg.add_query(question);

		let strng_host: Strng = host.into();
		if let Some(fake) = self.fake_ip_answer(&query_msg, &strng_host, metadata) {
			if let Some(ip) = fake.answers().iter().find_map(record_ip) {
				return Ok(ip);
			}
		}

		let answer = self.exchange(&query_msg, None).await?;
		answer.message.answers().iter().find_map(record_ip).ok_or_else(|| DnsError::NoAnswer(host.to_string()))
	}

	fn synthesize_disabled_family(&self, query: &Message) -> Option<Message> {
		let question = query.queries().first()?;
		let disabled = match question.query_type() {
			RecordType::A => self.config.ipv4_disabled,
			RecordType::AAAA => self.config.ipv6_disabled,
			_ => false,
		};
		if !disabled {
			return None;
		}
		let mut response = query.clone();
		response.set_message_type(hickory_proto::op::MessageType::Response);
		response.set_authoritative(true);
		response.set_recursion_available(true);
		response.answers_mut().clear();
		Some(response)
	}

	fn fallback_filter_triggered(&self, primary: &Message) -> bool {
		let Some(db) = &self.config.fallback_filter_db else { return false };
		let Some(country) = &self.config.fallback_filter_country else { return false };
		primary.answers().iter().filter_map(|r| record_ip(r)).any(|ip| country_matches(db, &country, ip))
	}

	/// For A queries not excluded by the fake-IP filter, allocates a
	/// synthetic address with TTL = 1 instead of racing any upstream.
	pub fn fake_ip_answer(&self, query: &Message, host: &Strng, metadata: &crate::types::Metadata) -> Option<Message> {
		let settings = self.config.fake_ip.as_ref()?;
		let question = query.queries().first()?;
		if question.query_type() != RecordType::A {
			return None;
		}
		if super::fakeip::filter_excludes(&settings.filter, metadata) {
			return None;
		}
		let ip = settings.store.lookup_or_allocate(host);
		let IpAddr::V4(v4) = ip else { return None };

		let mut response = query.clone();
		response.set_message_type(hickory_proto::op::MessageType::Response);
		response.set_authoritative(true);
		response.set_recursion_available(true);
		response.answers_mut().clear();
		let record = hickory_proto::rr::Record::from_rdata(question.name().clone(), 1, hickory_proto::rr::RData::A(v4.into()));
		response.add_answer(record);
		Some(response)
	}
}

fn record_ip(record: &hickory_proto::rr::Record) -> Option<IpAddr> {
	match record.data() {
		hickory_proto::rr::RData::A(a) => Some(IpAddr::V4((*a).into())),
		hickory_proto::rr::RData::AAAA(aaaa) => Some(IpAddr::V6((*aaaa).into())),
		_ => None,
	}
}

/// `"<rdata> <ttl>"`, the answer/ttl pair the DNS answer log line reports
/// per record.
fn render_answer(record: &hickory_proto::rr::Record) -> String {
	match record_ip(record) {
		Some(ip) => format!("{ip} {}", record.ttl()),
		None => format!("{:?} {}", record.data(), record.ttl()),
	}
}

fn country_matches(db: &GeoIpDatabase, country: &str, ip: IpAddr) -> bool {
	db.country_code(ip).is_some_and(|code| code.eq_ignore_ascii_case(country))
}

#[cfg(test)]
mod tests {
	use std::str::FromStr;

	use hickory_proto::op::Query;
	use hickory_proto::rr::{DNSClass, Name};

	use super::*;

	fn query_for(name: &str, qtype: RecordType) -> Message {
		let mut msg = Message::new();
		let mut query = Query::new();
		query.set_name(Name::from_str(name).unwrap());
		query.set_query_type(qtype);
		query.set_query_class(DNSClass::IN);
		msg.add_query(query);
		msg
	}

	#[test]
	fn disabled_family_synthesizes_empty_noerror() {
		let config = ResolverConfig {
			main: Vec::new(),
			fallback: Vec::new(),
			fallback_filter_db: None,
			fallback_filter_country: None,
			ipv4_disabled: true,
			ipv6_disabled: false,
			fake_ip: None,
		};
		let resolver = Resolver::new(config);
		let query = query_for("example.com.", RecordType::A);
		let response = resolver.synthesize_disabled_family(&query).unwrap();
		assert!(response.answers().is_empty());
		assert!(response.authoritative());
		assert!(response.recursion_available());
	}
}
