//! Control-plane surface (§6): a single `GET /dns/query` endpoint for
//! ad-hoc lookups against the live [`Resolver`], rendered as the same
//! JSON shape DoH-JSON-API consumers expect. No auth, no other routes --
//! everything else in the control API is out of scope.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use hickory_proto::op::{DNSClass, Message, Query as DnsQuery};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use serde::{Deserialize, Serialize};

use crate::dns::resolver::Resolver;

const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct AppState {
	resolver: Arc<Resolver>,
}

/// Builds the control-plane router bound to a shared resolver. Callers
/// own serving it (`axum::serve`) on whatever address the top-level
/// config's `control-addr` names.
pub fn router(resolver: Arc<Resolver>) -> Router {
	Router::new().route("/dns/query", get(dns_query)).with_state(AppState { resolver })
}

pub async fn serve(addr: SocketAddr, resolver: Arc<Resolver>) -> anyhow::Result<()> {
	let listener = tokio::net::TcpListener::bind(addr).await?;
	axum::serve(listener, router(resolver)).await?;
	Ok(())
}

#[derive(Deserialize)]
struct QueryParams {
	name: String,
	#[serde(rename = "type", default = "default_qtype")]
	qtype: String,
	proxy: Option<String>,
}

fn default_qtype() -> String {
	"A".to_string()
}

#[derive(Serialize)]
struct DnsQueryResponse {
	#[serde(rename = "Server")]
	server: String,
	#[serde(rename = "Status")]
	status: u16,
	#[serde(rename = "Question")]
	question: Vec<QuestionJson>,
	#[serde(rename = "TC")]
	tc: bool,
	#[serde(rename = "RD")]
	rd: bool,
	#[serde(rename = "RA")]
	ra: bool,
	#[serde(rename = "AD")]
	ad: bool,
	#[serde(rename = "CD")]
	cd: bool,
	#[serde(rename = "Answer", skip_serializing_if = "Vec::is_empty")]
	answer: Vec<RecordJson>,
	#[serde(rename = "Authority", skip_serializing_if = "Vec::is_empty")]
	authority: Vec<RecordJson>,
	#[serde(rename = "Additional", skip_serializing_if = "Vec::is_empty")]
	additional: Vec<RecordJson>,
}

#[derive(Serialize)]
struct QuestionJson {
	name: String,
	#[serde(rename = "type")]
	qtype: u16,
}

#[derive(Serialize)]
struct RecordJson {
	name: String,
	#[serde(rename = "type")]
	rtype: u16,
	#[serde(rename = "TTL")]
	ttl: u32,
	data: String,
}

fn render_records(records: &[Record]) -> Vec<RecordJson> {
	records
		.iter()
		.map(|r| RecordJson { name: r.name().to_string(), rtype: u16::from(r.record_type()), ttl: r.ttl(), data: render_rdata(r.data()) })
		.collect()
}

fn render_rdata(data: &RData) -> String {
	match data {
		RData::A(a) => a.to_string(),
		RData::AAAA(aaaa) => aaaa.to_string(),
		RData::CNAME(name) => name.to_string(),
		RData::NS(name) => name.to_string(),
		RData::PTR(name) => name.to_string(),
		RData::TXT(txt) => txt.iter().map(|b| String::from_utf8_lossy(b).into_owned()).collect::<Vec<_>>().join(""),
		RData::MX(mx) => format!("{} {}", mx.preference(), mx.exchange()),
		RData::SOA(soa) => format!(
			"{} {} {} {} {} {} {}",
			soa.mname(),
			soa.rname(),
			soa.serial(),
			soa.refresh(),
			soa.retry(),
			soa.expire(),
			soa.minimum()
		),
		other => format!("{other:?}"),
	}
}

fn render(message: &Message, source: &str) -> DnsQueryResponse {
	let header = message.header();
	DnsQueryResponse {
		server: source.to_string(),
		status: u16::from(header.response_code()),
		question: message.queries().iter().map(|q| QuestionJson { name: q.name().to_string(), qtype: u16::from(q.query_type()) }).collect(),
		tc: header.truncated(),
		rd: header.recursion_desired(),
		ra: header.recursion_available(),
		ad: header.authentic_data(),
		cd: header.checking_disabled(),
		answer: render_records(message.answers()),
		authority: render_records(message.name_servers()),
		additional: render_records(message.additionals()),
	}
}

async fn dns_query(State(state): State<AppState>, Query(params): Query<QueryParams>) -> Response {
	let qtype = match RecordType::from_str(&params.qtype.to_ascii_uppercase()) {
		Ok(t) => t,
		Err(_) => return (StatusCode::BAD_REQUEST, format!("unknown query type {:?}", params.qtype)).into_response(),
	};
	let name = match Name::from_str(&ensure_trailing_dot(&params.name)) {
		Ok(n) => n,
		Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid name {:?}: {e}", params.name)).into_response(),
	};

	let mut query_msg = Message::new();
	let mut question = DnsQuery::new();
	question.set_name(name);
	question.set_query_type(qtype);
	question.set_query_class(DNSClass::IN);
	query_msg.add_query(question);

	match tokio::time::timeout(DEFAULT_DNS_TIMEOUT, state.resolver.exchange(&query_msg, params.proxy.as_deref())).await {
		Ok(Ok(answer)) => Json(render(&answer.message, &answer.source)).into_response(),
		Ok(Err(e)) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
		Err(_) => (StatusCode::GATEWAY_TIMEOUT, "dns query timed out".to_string()).into_response(),
	}
}

fn ensure_trailing_dot(name: &str) -> String {
	if name.ends_with('.') { name.to_string() } else { format!("{name}.") }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn appends_a_trailing_dot_once() {
		assert_eq!(ensure_trailing_dot("example.com"), "example.com.");
		assert_eq!(ensure_trailing_dot("example.com."), "example.com.");
	}

	#[test]
	fn renders_a_records_as_dotted_quad() {
		let rdata = RData::A("1.2.3.4".parse().unwrap());
		assert_eq!(render_rdata(&rdata), "1.2.3.4");
	}
}
