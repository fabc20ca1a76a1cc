//! Output pump: one task per session moving stream output to its client
//!
//! The pump is the only reader of a session's stream. It polls with a bounded
//! timeout so a close from another task is noticed within one poll interval, and
//! it performs the session's final cleanup exactly once on the way out.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::ServerEvent;
use super::registry::SessionRegistry;
use super::session::{CloseReason, SessionHandle};
use super::stream::{ReadOutcome, StreamReader};
use super::transport::Transport;

/// Incremental UTF-8 decoder.
///
/// A multi-byte character split across two reads is held back until the rest
/// arrives; bytes that can never form a valid character become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end, wait for more bytes
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let remainder = rest.to_vec();
        self.pending = remainder;
        out
    }

    /// Flush whatever is still held back, replacing it if incomplete
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

/// Why the read loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpExit {
    /// Session left `Active` while the pump was waiting
    Cancelled,
    Eof,
    StreamError,
}

pub(crate) struct OutputPump {
    session: SessionHandle,
    reader: Box<dyn StreamReader>,
    transport: Arc<dyn Transport>,
    registry: Arc<SessionRegistry>,
    poll_timeout: Duration,
    close_grace: Duration,
}

impl OutputPump {
    pub(crate) fn new(
        session: SessionHandle,
        reader: Box<dyn StreamReader>,
        transport: Arc<dyn Transport>,
        registry: Arc<SessionRegistry>,
        poll_timeout: Duration,
        close_grace: Duration,
    ) -> Self {
        Self {
            session,
            reader,
            transport,
            registry,
            poll_timeout,
            close_grace,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let session_id = self.session.id.clone();
        debug!(session_id = %session_id, "Output pump started");

        let mut decoder = Utf8Decoder::default();
        let exit = self.pump(&mut decoder).await;

        let tail = decoder.finish();
        if !tail.is_empty() {
            self.send_output(tail).await;
        }

        self.finish(exit).await;
    }

    async fn pump(&mut self, decoder: &mut Utf8Decoder) -> PumpExit {
        loop {
            if !self.session.is_active().await {
                return PumpExit::Cancelled;
            }

            match self.reader.read(self.poll_timeout).await {
                Ok(ReadOutcome::Timeout) => continue,
                Ok(ReadOutcome::Data(bytes)) => {
                    crate::metrics::record_output_bytes(bytes.len() as u64);
                    let text = decoder.decode(&bytes);
                    if !text.is_empty() && !self.send_output(text).await {
                        return PumpExit::Cancelled;
                    }
                }
                Ok(ReadOutcome::Eof) => return PumpExit::Eof,
                Err(e) => {
                    warn!(
                        session_id = %self.session.id,
                        error = %e,
                        "Terminal stream read failed"
                    );
                    return PumpExit::StreamError;
                }
            }
        }
    }

    /// Deliver output unless the session closes first. Returns false if the
    /// output was dropped because the session is no longer active.
    async fn send_output(&mut self, data: String) -> bool {
        let event = ServerEvent::Output {
            session_id: self.session.id.clone(),
            data,
        };

        tokio::select! {
            biased;
            _ = self.transport.deliver(&self.session.routing_key, event) => true,
            _ = self.session.closed() => {
                debug!(session_id = %self.session.id, "Output dropped, session closing");
                false
            }
        }
    }

    /// Release the stream if nobody else did, drop the session and tell the client.
    async fn finish(self, exit: PumpExit) {
        let OutputPump {
            session,
            reader,
            transport,
            registry,
            close_grace,
            ..
        } = self;

        let fallback = match exit {
            PumpExit::StreamError => CloseReason::StreamError,
            PumpExit::Eof | PumpExit::Cancelled => CloseReason::Eof,
        };

        if session.begin_close(fallback).await {
            match tokio::time::timeout(close_grace, session.close_stream()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(session_id = %session.id, error = %e, "Stream close failed"),
                Err(_) => warn!(session_id = %session.id, "Stream close exceeded grace period"),
            }
        }

        let reason = session.mark_closed(fallback).await;
        registry.remove(&session.id).await;

        // The read half goes before the client hears about it
        drop(reader);

        crate::metrics::record_session_closed(reason.as_str());
        info!(
            session_id = %session.id,
            container_id = %session.target,
            reason = reason.as_str(),
            "Terminal session closed"
        );

        let closed = ServerEvent::Closed {
            session_id: session.id.clone(),
            reason,
        };
        if tokio::time::timeout(close_grace, transport.deliver(&session.routing_key, closed))
            .await
            .is_err()
        {
            warn!(
                session_id = %session.id,
                "Client is not draining its queue, closed notification dropped"
            );
        }
    }
}
