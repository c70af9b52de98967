//! Session handler: drives one connection from admission to close.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::Instant;

use crate::decode::Decoder;
use crate::error::SessionError;
use crate::net::PeerIdentity;
use crate::observability::metrics;
use crate::protocol::{read_request, write_response, ImageHeader, Request, Response};
use crate::security::{AdmissionSlot, RateDecision};
use crate::server::ServiceState;
use crate::session::staging::PendingPayload;
use crate::session::state::{SessionEnd, SessionState};
use crate::session::SessionLimits;

/// Upper bound for writing the last response before closing.
const FAREWELL_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a closing session keeps reading what the peer already sent.
const LINGER_TIMEOUT: Duration = Duration::from_millis(250);

/// Oversized payloads up to this multiple of the limit are drained and the
/// session continues; anything larger closes the session.
const DISCARD_LIMIT_FACTOR: u64 = 2;

/// Serve one accepted connection until it closes.
///
/// Takes an admission slot first; without one the peer gets SERVER_BUSY and
/// the global counter is never touched.
pub async fn serve_connection<S, D>(
    mut stream: S,
    peer: PeerIdentity,
    services: Arc<ServiceState<D>>,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    D: Decoder,
{
    let slot = match services.admission.try_admit() {
        Ok(slot) => slot,
        Err(busy) => {
            tracing::warn!(
                peer = %peer,
                active = busy.active,
                max_users = busy.max_users,
                "Server busy, connection terminated"
            );
            let farewell = write_response(&mut stream, &Response::ServerBusy);
            if let Ok(Err(e)) = tokio::time::timeout(FAREWELL_TIMEOUT, farewell).await {
                tracing::debug!(error = %e, "Failed to send busy response");
            }
            let _ = tokio::time::timeout(FAREWELL_TIMEOUT, stream.shutdown()).await;
            discard_unread(&mut stream).await;
            metrics::record_session_end("busy");
            return SessionEnd::Busy;
        }
    };

    tracing::info!(
        active = services.admission.active(),
        max_users = services.admission.max_users(),
        "Session admitted"
    );

    let mut session = Session {
        stream: BufReader::new(stream),
        peer,
        services,
        state: SessionState::AwaitingRequest,
        last_activity: Instant::now(),
        completed: 0,
        slot: Some(slot),
    };
    let end = session.serve().await;
    session.close(&end).await;
    end
}

/// Run `fut`, giving up after `limit` of no completion.
async fn within<T, E, F>(limit: Duration, fut: F) -> Result<T, SessionEnd>
where
    F: Future<Output = Result<T, E>>,
    E: Into<SessionEnd>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(SessionEnd::Timeout),
    }
}

/// Read and drop whatever the peer has in flight, for at most
/// `LINGER_TIMEOUT`. Closing a TCP socket with unread input sends a reset,
/// which can destroy the final response before the peer reads it.
async fn discard_unread<R: AsyncRead + Unpin>(stream: &mut R) {
    let mut buf = [0u8; 4096];
    let _ = tokio::time::timeout(LINGER_TIMEOUT, async {
        while let Ok(n) = stream.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
    })
    .await;
}

fn chunk_len(remaining: u64, max: usize) -> usize {
    remaining.min(max as u64) as usize
}

struct Session<S, D> {
    stream: BufReader<S>,
    peer: PeerIdentity,
    services: Arc<ServiceState<D>>,
    state: SessionState,
    last_activity: Instant,
    completed: u64,
    slot: Option<AdmissionSlot>,
}

impl<S, D> Session<S, D>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    D: Decoder,
{
    async fn serve(&mut self) -> SessionEnd {
        loop {
            if let Err(end) = self.serve_one().await {
                return end;
            }
        }
    }

    /// One pass through the request cycle. `Err` carries the reason to close.
    async fn serve_one(&mut self) -> Result<(), SessionEnd> {
        self.transition(SessionState::AwaitingRequest);
        let limits = self.services.limits();
        self.await_request(&limits).await?;

        let admission = &self.services.admission;
        if admission.over_capacity() {
            tracing::warn!(
                active = admission.active(),
                max_users = admission.max_users(),
                "Session count above ceiling, closing session"
            );
            return Err(SessionEnd::Busy);
        }

        let now = std::time::Instant::now();
        match self.services.limiter.check_and_record(self.peer.identity(), now) {
            Ok(RateDecision::Allowed { count }) => {
                tracing::debug!(count, "Request allowed");
            }
            Ok(RateDecision::Limited { .. }) => return self.cool_down(&limits).await,
            Err(full) => {
                tracing::warn!(error = %full, "Cannot track client, closing session");
                return Err(SessionEnd::RegistryFull);
            }
        }

        let header = match within(limits.idle_timeout, read_request(&mut self.stream)).await? {
            Request::Quit => {
                let forgotten = self.services.limiter.forget(self.peer.identity());
                tracing::info!(forgotten, "Client has disconnected");
                return Err(SessionEnd::Quit);
            }
            Request::Image(header) => header,
        };

        let response = self.process_image(header, &limits).await?;

        self.transition(SessionState::Responding);
        self.respond(&response, &limits).await?;
        self.completed += 1;
        self.last_activity = Instant::now();
        Ok(())
    }

    /// Wait until the peer has sent something, without consuming it.
    async fn await_request(&mut self, limits: &SessionLimits) -> Result<(), SessionEnd> {
        let deadline = self.last_activity + limits.idle_timeout;
        let ready = tokio::time::timeout_at(deadline, self.stream.fill_buf())
            .await
            .map(|filled| filled.map(|buf| !buf.is_empty()));

        match ready {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(SessionEnd::PeerClosed),
            Ok(Err(e)) => Err(SessionError::Connection(e).into()),
            Err(_) => Err(SessionEnd::Timeout),
        }
    }

    /// Answer RATE_LIMIT_EXCEEDED and hold the session for one window.
    ///
    /// The pending request is left unread and handled on the next pass.
    async fn cool_down(&mut self, limits: &SessionLimits) -> Result<(), SessionEnd> {
        self.respond(&Response::RateLimitExceeded, limits).await?;

        let cooldown = self.services.limiter.cooldown();
        tracing::info!(cooldown_secs = cooldown.as_secs_f64(), "Rate limited, cooling down");
        tokio::time::sleep(cooldown).await;

        self.services
            .limiter
            .end_cooldown(self.peer.identity(), std::time::Instant::now());
        self.last_activity = Instant::now();
        Ok(())
    }

    async fn process_image(
        &mut self,
        header: ImageHeader,
        limits: &SessionLimits,
    ) -> Result<Response, SessionEnd> {
        tracing::info!(size = header.len, "Received image size");

        if header.len == 0 {
            metrics::record_transfer("empty", 0);
            tracing::info!("Empty payload, nothing to decode");
            return Ok(Response::Failure);
        }

        self.transition(SessionState::ReceivingPayload);

        let discard_limit = limits.max_payload_size.saturating_mul(DISCARD_LIMIT_FACTOR);
        if header.len > discard_limit {
            metrics::record_transfer("too_large", 0);
            return Err(SessionError::Protocol(format!(
                "declared payload of {} bytes is beyond the {} byte discard limit",
                header.len, discard_limit
            ))
            .into());
        }

        if header.len > limits.max_payload_size {
            tracing::warn!(
                size = header.len,
                max_payload_size = limits.max_payload_size,
                "Exceeded maximum payload size, discarding transfer"
            );
            self.discard(header.remaining(), limits).await?;
            metrics::record_transfer("too_large", 0);
            return Ok(Response::Failure);
        }

        let mut pending = PendingPayload::create(&limits.staging_dir, header.len)
            .await
            .map_err(SessionError::Staging)?;
        if let Some(byte) = header.lead_byte {
            pending
                .write_chunk(&[byte])
                .await
                .map_err(SessionError::Staging)?;
        }

        let mut buf = vec![0u8; chunk_len(pending.remaining(), limits.chunk_size)];
        while pending.remaining() > 0 {
            let want = chunk_len(pending.remaining(), buf.len());
            let n = within(limits.idle_timeout, self.stream.read(&mut buf[..want])).await?;
            if n == 0 {
                metrics::record_transfer("truncated", pending.received());
                return Err(SessionError::Protocol(format!(
                    "peer closed after {} of {} payload bytes",
                    pending.received(),
                    pending.declared()
                ))
                .into());
            }
            pending
                .write_chunk(&buf[..n])
                .await
                .map_err(SessionError::Staging)?;
        }
        pending.finish().await.map_err(SessionError::Staging)?;

        metrics::record_transfer("complete", pending.received());
        tracing::info!(bytes = pending.received(), "Image reception completed");

        self.transition(SessionState::Decoding);
        let started = std::time::Instant::now();
        let decoded = self.services.decoder.decode(pending.path()).await;
        if let Err(e) = pending.remove().await {
            tracing::warn!(error = %e, "Failed to remove staging file");
        }

        let response = match decoded {
            Ok(Some(text)) => {
                metrics::record_decode("success", started.elapsed());
                tracing::info!(len = text.len(), "Payload decoded");
                Response::Success(text)
            }
            Ok(None) => {
                metrics::record_decode("no_result", started.elapsed());
                tracing::info!("Decoder found no result");
                Response::Failure
            }
            Err(e) => {
                metrics::record_decode("error", started.elapsed());
                tracing::warn!(error = %e, "Decoder failed");
                Response::Failure
            }
        };
        Ok(response)
    }

    /// Read and drop `remaining` payload bytes so the next request lines up.
    async fn discard(&mut self, mut remaining: u64, limits: &SessionLimits) -> Result<(), SessionEnd> {
        let mut buf = vec![0u8; chunk_len(remaining, limits.chunk_size)];
        while remaining > 0 {
            let want = chunk_len(remaining, buf.len());
            let n = within(limits.idle_timeout, self.stream.read(&mut buf[..want])).await?;
            if n == 0 {
                return Err(SessionError::Protocol(format!(
                    "peer closed with {} discarded payload bytes outstanding",
                    remaining
                ))
                .into());
            }
            remaining -= n as u64;
        }
        Ok(())
    }

    async fn respond(&mut self, response: &Response, limits: &SessionLimits) -> Result<(), SessionEnd> {
        within(limits.idle_timeout, write_response(&mut self.stream, response)).await?;
        tracing::debug!(outcome = %response.code(), "Response sent");
        Ok(())
    }

    /// Send the closing response, if the reason has one, then release
    /// everything the session holds.
    async fn close(&mut self, end: &SessionEnd) {
        let farewell = match end {
            SessionEnd::Timeout => Some(Response::Timeout),
            SessionEnd::Busy | SessionEnd::RegistryFull => Some(Response::ServerBusy),
            SessionEnd::Failed(SessionError::Protocol(_)) => Some(Response::Failure),
            _ => None,
        };
        if let Some(response) = &farewell {
            match tokio::time::timeout(FAREWELL_TIMEOUT, write_response(&mut self.stream, response)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "Failed to send final response"),
                Err(_) => tracing::debug!("Timed out sending final response"),
            }
        }

        self.transition(SessionState::Closed);
        let _ = tokio::time::timeout(FAREWELL_TIMEOUT, self.stream.shutdown()).await;
        if farewell.is_some() {
            discard_unread(&mut self.stream).await;
        }
        self.slot.take();

        match end {
            SessionEnd::Timeout => {
                tracing::info!(completed = self.completed, "Timeout occurred for client, connection closed")
            }
            SessionEnd::Failed(e) => {
                tracing::warn!(completed = self.completed, error = %e, "Session failed, connection closed")
            }
            other => tracing::info!(
                completed = self.completed,
                reason = other.reason(),
                "Session closed"
            ),
        }
        metrics::record_session_end(end.reason());
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::trace!(from = %self.state, to = %next, "Session state change");
            self.state = next;
        }
    }
}
