//! DNS answer cache. Key is `"[proxy:]name:qtype:qclass"` (§3); stored TTL
//! is floored to 120 s on insert when positive, and decremented by elapsed
//! wall time (never below 1 s) on every hit.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;
use parking_lot::Mutex;

const TTL_FLOOR: u32 = 120;

pub fn cache_key(query: &Message, proxy_adapter: Option<&str>) -> String {
	let question = query.queries().first();
	let (name, qtype, qclass) = match question {
		Some(q) => (q.name().to_string(), q.query_type(), q.query_class()),
		None => (String::new(), RecordType::A, hickory_proto::rr::DNSClass::IN),
	};
	match proxy_adapter {
		Some(proxy) => format!("{proxy}:{name}:{qtype}:{qclass}"),
		None => format!("{name}:{qtype}:{qclass}"),
	}
}

struct Entry {
	message: Message,
	source: String,
	stored_at: Instant,
	ttl: Duration,
}

pub struct Cache {
	entries: Mutex<HashMap<String, Entry>>,
}

impl Cache {
	pub fn new() -> Self {
		Cache { entries: Mutex::new(HashMap::new()) }
	}

	/// `None` on a miss or an expired entry (which is evicted). Otherwise
	/// a fresh copy of the cached message with every record's TTL
	/// decremented by the elapsed time, floored at 1 s, plus the source
	/// upstream that originally answered it.
	pub fn get(&self, key: &str) -> Option<(Message, String)> {
		let mut entries = self.entries.lock();
		let entry = entries.get(key)?;
		let elapsed = entry.stored_at.elapsed();
		if elapsed >= entry.ttl {
			entries.remove(key);
			return None;
		}
		let remaining = (entry.ttl - elapsed).as_secs().max(1) as u32;
		let mut message = entry.message.clone();
		let source = entry.source.clone();
		for answer in message.answers_mut() {
			answer.set_ttl(remaining);
		}
		Some((message, source))
	}

	/// Stores `message` under `key`, flooring its minimum record TTL to
	/// `TTL_FLOOR` when positive (a TTL of 0, e.g. a synthesized empty
	/// answer, is never floored -- it is never meant to be cached at all
	/// and callers should skip calling `put` for those).
	pub fn put(&self, key: String, message: Message, source: String) {
		let min_ttl = message.answers().iter().map(|r| r.ttl()).min().unwrap_or(0);
		if min_ttl == 0 {
			return;
		}
		let ttl = Duration::from_secs(min_ttl.max(TTL_FLOOR) as u64);
		self.entries.lock().insert(key, Entry { message, source, stored_at: Instant::now(), ttl });
	}
}

impl Default for Cache {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use std::str::FromStr;

	use hickory_proto::rr::rdata::A;
	use hickory_proto::rr::{Name, RData, Record};

	use super::*;

	fn message_with_ttl(ttl: u32) -> Message {
		let mut msg = Message::new();
		let name = Name::from_str("example.com.").unwrap();
		let record = Record::from_rdata(name, ttl, RData::A(A::new(1, 2, 3, 4)));
		msg.add_answer(record);
		msg
	}

	#[test]
	fn low_ttl_is_floored_to_120_on_insert() {
		let cache = Cache::new();
		cache.put("k".to_string(), message_with_ttl(30), "upstream-a".to_string());
		let (msg, source) = cache.get("k").unwrap();
		assert_eq!(source, "upstream-a");
		assert!(msg.answers()[0].ttl() <= TTL_FLOOR && msg.answers()[0].ttl() > TTL_FLOOR - 2);
	}

	#[test]
	fn zero_ttl_answers_are_never_cached() {
		let cache = Cache::new();
		cache.put("k".to_string(), message_with_ttl(0), "upstream-a".to_string());
		assert!(cache.get("k").is_none());
	}
}
