use crate::buffer::Buffer;
use crate::logging::StreamSummary;
use crate::processor::{process_line, LineOutcome};
use crate::types::{GatewayError, ObservedError, Result};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

const MAX_STREAM_FRAGMENTS: usize = 100_000;

fn codec_error(e: LinesCodecError) -> std::io::Error {
    match e {
        LinesCodecError::Io(io) => io,
        other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
    }
}

/// Splits an async reader into newline-delimited fragments.
pub fn fragments_from_reader<R>(reader: R) -> impl Stream<Item = std::io::Result<String>> + Unpin
where
    R: AsyncRead + Unpin,
{
    FramedRead::new(reader, LinesCodec::new()).map(|line| line.map_err(codec_error))
}

/// Same as [`fragments_from_reader`] for a transport that yields byte chunks,
/// e.g. `reqwest::Response::bytes_stream` with its error mapped to `io::Error`.
pub fn fragments_from_bytes<S>(chunks: S) -> impl Stream<Item = std::io::Result<String>> + Unpin
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    fragments_from_reader(StreamReader::new(chunks))
}

/// Hook that forwards every chunk into a channel. Dropping the receiver
/// aborts the stream on the next chunk.
pub fn channel_hook(tx: mpsc::UnboundedSender<String>) -> impl FnMut(&str) -> Result<()> {
    move |text: &str| {
        tx.send(text.to_string())
            .map_err(|_| GatewayError::Hook("output receiver dropped".to_string()).into())
    }
}

pub struct StreamHandler;

impl StreamHandler {
    /// Drives one chat stream to completion.
    ///
    /// Fragments are processed strictly in arrival order. A fragment that fails
    /// to parse is kept as carry-over for the next one; every decoded delta is
    /// written to `buffer` and, when non-empty, handed to `hook`. Upstream
    /// errors, hook errors and cancellation end the stream immediately.
    pub async fn handle_stream<S, H>(
        mut fragments: S,
        buffer: &mut Buffer,
        legacy: bool,
        cancel: &CancellationToken,
        mut hook: H,
    ) -> Result<()>
    where
        S: Stream<Item = std::io::Result<String>> + Unpin,
        H: FnMut(&str) -> Result<()>,
    {
        let mut summary = StreamSummary::new();
        let mut carry = String::new();
        let mut last_parse_error: Option<ObservedError> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("[STREAM] Cancelled after {} fragments", summary.fragments);
                    summary.log_summary(buffer.get_quota());
                    return Err(GatewayError::Cancelled.into());
                }
                next = fragments.next() => next,
            };

            let fragment = match next {
                Some(fragment) => fragment?,
                None => break,
            };
            if fragment.trim().is_empty() {
                continue;
            }

            summary.fragments += 1;
            if summary.fragments > MAX_STREAM_FRAGMENTS {
                tracing::error!("[STREAM] Exceeded max fragment limit ({})", MAX_STREAM_FRAGMENTS);
                return Err(GatewayError::Internal(
                    "Stream exceeded max fragment limit".to_string(),
                    tracing_error::SpanTrace::capture(),
                )
                .into());
            }

            match process_line(buffer, legacy, &carry, &fragment) {
                Ok(LineOutcome::Done) => {
                    carry.clear();
                    break;
                }
                Ok(LineOutcome::Delta { text, merged }) => {
                    if merged {
                        summary.merged += 1;
                    }
                    carry.clear();
                    last_parse_error = None;
                    buffer.write(&text);
                    summary.record_delta(&text, text.is_empty() && buffer.is_function_calling());
                    if !text.is_empty() {
                        hook(&text)?;
                    }
                }
                Err(e) => match e.recovered_text() {
                    Some(recovered) => {
                        summary.parse_failures += 1;
                        carry = recovered.to_string();
                        last_parse_error = Some(e);
                    }
                    None => {
                        tracing::warn!("[STREAM] {} ({})", e, e.inner.code());
                        summary.log_summary(buffer.get_quota());
                        return Err(e);
                    }
                },
            }
        }

        summary.log_summary(buffer.get_quota());

        if let Some(err) = last_parse_error {
            if buffer.is_empty() {
                return Err(err);
            }
            tracing::warn!(
                "[STREAM] Dropping unparsed tail ({} bytes) after {} chars of output",
                carry.len(),
                buffer.cursor()
            );
        }
        Ok(())
    }
}
