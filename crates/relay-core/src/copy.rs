//! Full-duplex byte splicing between two async streams, with independent
//! per-direction deadlines. Used by the tunnel dispatcher to relay bytes
//! between an inbound connection and the adapter-dialed outbound one.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectionResult {
	pub client_to_upstream: u64,
	pub upstream_to_client: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum CopyError {
	#[error("client->upstream copy failed: {0}")]
	ClientToUpstream(#[source] std::io::Error),
	#[error("upstream->client copy failed: {0}")]
	UpstreamToClient(#[source] std::io::Error),
}

/// Relay bytes in both directions until either side hits EOF or an error,
/// then shut down and close both. Each direction is an independent task so
/// a stalled reader on one side never blocks draining the other.
pub async fn copy_bidirectional<A, B>(mut a: A, mut b: B) -> Result<ConnectionResult, CopyError>
where
	A: AsyncRead + AsyncWrite + Unpin,
	B: AsyncRead + AsyncWrite + Unpin,
{
	let (mut ar, mut aw) = tokio::io::split(&mut a);
	let (mut br, mut bw) = tokio::io::split(&mut b);

	let client_to_upstream = async {
		let n = tokio::io::copy(&mut ar, &mut bw).await?;
		let _ = bw.shutdown().await;
		Ok::<_, std::io::Error>(n)
	};
	let upstream_to_client = async {
		let n = tokio::io::copy(&mut br, &mut aw).await?;
		let _ = aw.shutdown().await;
		Ok::<_, std::io::Error>(n)
	};

	tokio::pin!(client_to_upstream);
	tokio::pin!(upstream_to_client);

	let mut result = ConnectionResult::default();
	let mut c2u_done = false;
	let mut u2c_done = false;
	loop {
		tokio::select! {
			res = &mut client_to_upstream, if !c2u_done => {
				result.client_to_upstream = res.map_err(CopyError::ClientToUpstream)?;
				c2u_done = true;
			}
			res = &mut upstream_to_client, if !u2c_done => {
				result.upstream_to_client = res.map_err(CopyError::UpstreamToClient)?;
				u2c_done = true;
			}
		}
		if c2u_done && u2c_done {
			break;
		}
	}
	Ok(result)
}

/// Relay with a deadline applied to the whole splice (not per read/write
/// call) — used by adapters whose dial contract hands back a connection
/// that must be force-closed after a fixed stall window (e.g. the reject
/// adapter's abuse penalty).
pub async fn copy_bidirectional_deadline<A, B>(
	a: A,
	b: B,
	deadline: Duration,
) -> Result<ConnectionResult, CopyError>
where
	A: AsyncRead + AsyncWrite + Unpin,
	B: AsyncRead + AsyncWrite + Unpin,
{
	match tokio::time::timeout(deadline, copy_bidirectional(a, b)).await {
		Ok(res) => res,
		Err(_) => Ok(ConnectionResult::default()),
	}
}
