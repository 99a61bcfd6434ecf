//! Newline-delimited JSON framing for the streaming endpoints.
//!
//! The server flushes chunks at arbitrary byte boundaries, so a chunk may hold
//! several events, half an event, or split a multi-byte character. Bytes are
//! buffered until a full line is available and only then decoded.

use super::{ChatError, ChatResult};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, Stream, StreamExt};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// Decoded events of one streaming response.
pub(crate) type EventStream<T> = BoxStream<'static, ChatResult<T>>;

#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Pops the next complete line without its terminator.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever trails the last newline once the body has ended.
    pub(crate) fn take_remainder(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        if rest.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Decodes one line, or returns `None` for blank and malformed lines.
pub(crate) fn decode_line<T: DeserializeOwned>(line: &str) -> Option<T> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<T>(line) {
        Ok(event) => Some(event),
        Err(err) => {
            let skipped = ChatError::MalformedEvent(err.to_string());
            debug!(error = %skipped, line, "skipping stream line");
            None
        }
    }
}

struct LineReader<S> {
    body: Pin<Box<S>>,
    buffer: LineBuffer,
    idle_timeout: Duration,
    exhausted: bool,
}

impl<S> LineReader<S> {
    fn abort(&mut self) {
        self.exhausted = true;
        self.buffer.clear();
    }
}

/// Splits a chunked body into lines. Each wait for the next chunk is bounded
/// by `idle_timeout`; a transport error or timeout is yielded once and ends
/// the stream.
pub(crate) fn read_lines<S, B>(body: S, idle_timeout: Duration) -> impl Stream<Item = ChatResult<String>>
where
    S: Stream<Item = ChatResult<B>>,
    B: AsRef<[u8]>,
{
    let reader = LineReader {
        body: Box::pin(body),
        buffer: LineBuffer::default(),
        idle_timeout,
        exhausted: false,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(line) = reader.buffer.next_line() {
                return Some((Ok(line), reader));
            }
            if reader.exhausted {
                return reader.buffer.take_remainder().map(|line| (Ok(line), reader));
            }
            match tokio::time::timeout(reader.idle_timeout, reader.body.next()).await {
                Ok(Some(Ok(chunk))) => reader.buffer.push(chunk.as_ref()),
                Ok(Some(Err(err))) => {
                    reader.abort();
                    return Some((Err(err), reader));
                }
                Ok(None) => reader.exhausted = true,
                Err(_) => {
                    let limit = reader.idle_timeout;
                    reader.abort();
                    return Some((Err(ChatError::Timeout(limit)), reader));
                }
            }
        }
    })
}

/// Lines decoded into `T`, with malformed lines dropped.
pub(crate) fn event_stream<T, S, B>(body: S, idle_timeout: Duration) -> EventStream<T>
where
    T: DeserializeOwned + Send + 'static,
    S: Stream<Item = ChatResult<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    read_lines(body, idle_timeout)
        .filter_map(|item| {
            futures::future::ready(match item {
                Ok(line) => decode_line::<T>(&line).map(Ok),
                Err(err) => Some(Err(err)),
            })
        })
        .boxed()
}

/// Sends `request` and checks the status, bounding the wait for headers.
pub(crate) async fn send_streaming(request: RequestBuilder, limit: Duration) -> ChatResult<Response> {
    let response = tokio::time::timeout(limit, request.send())
        .await
        .map_err(|_| ChatError::Timeout(limit))?
        .map_err(|err| ChatError::from_transport(err, limit))?;

    let status = response.status();
    if !status.is_success() {
        let body = tokio::time::timeout(limit, response.text())
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or_default();
        return Err(ChatError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Deferred request: nothing is sent until the returned future is polled.
pub(crate) fn open_event_stream<T>(
    request: RequestBuilder,
    limit: Duration,
) -> BoxFuture<'static, ChatResult<EventStream<T>>>
where
    T: DeserializeOwned + Send + 'static,
{
    async move {
        let response = send_streaming(request, limit).await?;
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|err| ChatError::from_transport(err, limit)));
        Ok(event_stream(body, limit))
    }
    .boxed()
}
