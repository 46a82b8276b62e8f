//! NDJSON streaming consumer for Ollama responses.
//!
//! Ollama streams one JSON object per line. This module:
//! 1. Reassembles lines that straddle network chunk boundaries
//! 2. Parses each line as a frame, skipping blanks and malformed lines
//! 3. Folds every fragment into a running [`StreamAggregate`]
//! 4. Stops early on cancellation or (for pulls) on the first success frame
//!
//! The consumers are generic over the byte stream so the same code runs on
//! `reqwest::Response::bytes_stream()` and on in-memory streams in tests.

use std::collections::VecDeque;
use std::fmt::Display;

use chrono::Utc;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::errors::OllamaError;
use super::types::{GenerateResult, GenerationStats, PullProgress};

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// Running result of a streamed generate/chat call.
#[derive(Debug, Clone, Default)]
pub struct StreamAggregate {
    full_text: String,
    terminal: Option<GenerateResult>,
    frames: usize,
    cancelled: bool,
}

impl StreamAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one frame into the aggregate.
    pub fn push(&mut self, frame: &GenerateResult) {
        self.frames += 1;
        self.full_text.push_str(&frame.response);
        if frame.done {
            self.terminal = Some(frame.clone());
        }
    }

    /// Text accumulated so far, in arrival order.
    pub fn text(&self) -> &str {
        &self.full_text
    }

    /// Number of frames folded in.
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Produce the caller-facing result.
    ///
    /// The last `done` frame is returned with `response` replaced by the full
    /// text. Without one, a terminal record is synthesized and stamped now.
    /// A stream cancelled before its `done` frame yields the partial text
    /// with `done = false`; once the `done` frame is in, the reply is
    /// complete whatever happens to the token afterwards.
    pub fn finish(self, model: &str) -> GenerateResult {
        if self.cancelled && self.terminal.is_none() {
            return GenerateResult {
                model: model.to_string(),
                created_at: Utc::now(),
                response: self.full_text,
                done: false,
                context: None,
                stats: GenerationStats::default(),
            };
        }

        match self.terminal {
            Some(mut terminal) => {
                terminal.response = self.full_text;
                terminal
            }
            None => GenerateResult {
                model: model.to_string(),
                created_at: Utc::now(),
                response: self.full_text,
                done: true,
                context: None,
                stats: GenerationStats::default(),
            },
        }
    }
}

// ─── Line reader ─────────────────────────────────────────────────────────────

enum ReadEvent {
    Line(String),
    End,
    Cancelled,
}

/// Owns the byte stream for the duration of one call. Dropping it releases
/// the underlying connection, which happens on every exit path.
struct LineReader<S> {
    label: &'static str,
    stream: S,
    buffer: Vec<u8>,
    ready: VecDeque<String>,
    finished: bool,
}

impl<S, B, E> LineReader<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    fn new(label: &'static str, stream: S) -> Self {
        Self {
            label,
            stream,
            buffer: Vec::new(),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    async fn next_line(
        &mut self,
        cancel: Option<&CancellationToken>,
    ) -> Result<ReadEvent, OllamaError> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(ReadEvent::Line(line));
            }
            if self.finished {
                return Ok(ReadEvent::End);
            }

            let next = match cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Ok(ReadEvent::Cancelled),
                        item = self.stream.next() => item,
                    }
                }
                None => self.stream.next().await,
            };

            match next {
                Some(Ok(bytes)) => self.absorb(bytes.as_ref()),
                Some(Err(e)) => {
                    return Err(OllamaError::Stream {
                        reason: format!("stream read error: {e}"),
                    })
                }
                None => {
                    self.finished = true;
                    // A final line without a trailing newline is still a frame.
                    let rest = std::mem::take(&mut self.buffer);
                    if !rest.is_empty() {
                        self.ready
                            .push_back(String::from_utf8_lossy(&rest).into_owned());
                    }
                }
            }
        }
    }

    fn absorb(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.ready
                .push_back(String::from_utf8_lossy(&line).into_owned());
        }
    }
}

impl<S> Drop for LineReader<S> {
    fn drop(&mut self) {
        tracing::debug!(stream = self.label, "released stream reader");
    }
}

// ─── Consumers ───────────────────────────────────────────────────────────────

/// Consume a generate/chat NDJSON stream.
///
/// `parse` turns one line into a frame (generate and chat frames differ on
/// the wire). `on_frame` sees every parsed frame, terminal or not, with only
/// the incremental fragment in `response`. The cancellation token is checked
/// before each callback and while waiting for the next chunk.
pub async fn consume_generation_stream<S, B, E, P, F>(
    stream: S,
    parse: P,
    cancel: Option<&CancellationToken>,
    mut on_frame: F,
) -> Result<StreamAggregate, OllamaError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
    P: Fn(&str) -> Result<GenerateResult, serde_json::Error>,
    F: FnMut(&GenerateResult),
{
    let mut reader = LineReader::new("generation", stream);
    let mut aggregate = StreamAggregate::new();

    loop {
        let line = match reader.next_line(cancel).await? {
            ReadEvent::Line(line) => line,
            ReadEvent::End => break,
            ReadEvent::Cancelled => {
                aggregate.cancelled = true;
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let frame = match parse(trimmed) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, line = %trimmed, "skipping unparsable stream frame");
                continue;
            }
        };

        aggregate.push(&frame);

        if cancel.is_some_and(|t| t.is_cancelled()) {
            aggregate.cancelled = true;
            break;
        }
        on_frame(&frame);
    }

    tracing::debug!(
        frames = aggregate.frame_count(),
        chars = aggregate.text().len(),
        cancelled = aggregate.is_cancelled(),
        "generation stream finished"
    );

    Ok(aggregate)
}

/// How a pull stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// A frame with `status == "success"` was seen.
    Succeeded,
    /// The stream closed without a success frame.
    StreamEnded,
}

/// Consume a pull NDJSON stream until the first success frame.
///
/// Returns as soon as success is seen; the rest of the stream is not
/// drained. Every parsed progress frame is forwarded to `on_progress`.
pub async fn consume_pull_stream<S, B, E, F>(
    stream: S,
    mut on_progress: F,
) -> Result<PullOutcome, OllamaError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
    F: FnMut(&PullProgress),
{
    let mut reader = LineReader::new("pull", stream);

    loop {
        let line = match reader.next_line(None).await? {
            ReadEvent::Line(line) => line,
            ReadEvent::End | ReadEvent::Cancelled => return Ok(PullOutcome::StreamEnded),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let progress: PullProgress = match serde_json::from_str(trimmed) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, line = %trimmed, "skipping unparsable pull frame");
                continue;
            }
        };

        on_progress(&progress);
        if progress.is_success() {
            return Ok(PullOutcome::Succeeded);
        }
    }
}

// ─── Frame parsers ───────────────────────────────────────────────────────────

/// Parse a `/api/generate` frame.
pub fn parse_generate_frame(line: &str) -> Result<GenerateResult, serde_json::Error> {
    serde_json::from_str(line)
}

/// Parse a `/api/chat` frame and flatten it into the generate shape.
pub fn parse_chat_frame(line: &str) -> Result<GenerateResult, serde_json::Error> {
    serde_json::from_str::<super::types::ChatResponse>(line).map(GenerateResult::from)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};

    type Chunk = Result<Vec<u8>, Infallible>;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Chunk> + Unpin {
        let items: Vec<Chunk> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(items)
    }

    fn gen_line(fragment: &str, done: bool) -> String {
        let mut v = serde_json::json!({
            "model": "m",
            "created_at": "2024-01-01T00:00:00Z",
            "response": fragment,
            "done": done,
        });
        if done {
            v["total_duration"] = serde_json::json!(1234);
            v["eval_count"] = serde_json::json!(3);
        }
        format!("{v}\n")
    }

    /// Stream wrapper that counts how many times it is dropped.
    struct CountingStream<S> {
        inner: S,
        drops: Arc<AtomicUsize>,
    }

    impl<S: Stream + Unpin> Stream for CountingStream<S> {
        type Item = S::Item;
        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
            Pin::new(&mut self.inner).poll_next(cx)
        }
    }

    impl<S> Drop for CountingStream<S> {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_fragments_concatenated_in_order() {
        let lines = [
            gen_line("Hel", false),
            gen_line("", false),
            gen_line("lo, ", false),
            gen_line("world", false),
            gen_line("!", true),
        ];
        let parts: Vec<&str> = lines.iter().map(String::as_str).collect();

        let mut seen = Vec::new();
        let aggregate =
            consume_generation_stream(chunks(&parts), parse_generate_frame, None, |f| {
                seen.push(f.response.clone())
            })
            .await
            .unwrap();

        assert_eq!(seen, vec!["Hel", "", "lo, ", "world", "!"]);
        let result = aggregate.finish("m");
        assert_eq!(result.response, "Hello, world!");
        assert!(result.done);
        assert_eq!(result.stats.total_duration, Some(1234));
        assert_eq!(result.stats.eval_count, Some(3));
    }

    #[tokio::test]
    async fn test_no_done_frame_synthesizes_terminal() {
        let lines = [gen_line("partial ", false), gen_line("text", false)];
        let parts: Vec<&str> = lines.iter().map(String::as_str).collect();
        let before = Utc::now();

        let aggregate = consume_generation_stream(chunks(&parts), parse_generate_frame, None, |_| {})
            .await
            .unwrap();
        let result = aggregate.finish("fallback-model");

        assert!(result.done);
        assert_eq!(result.response, "partial text");
        assert_eq!(result.model, "fallback-model");
        assert!(result.created_at >= before);
        assert!(result.stats.total_duration.is_none());
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let full = format!("{}{}", gen_line("ab", false), gen_line("cd", true));
        let (a, b) = full.split_at(17);
        let (b, c) = b.split_at(b.len() - 9);

        let aggregate = consume_generation_stream(chunks(&[a, b, c]), parse_generate_frame, None, |_| {})
            .await
            .unwrap();
        assert_eq!(aggregate.frame_count(), 2);
        assert_eq!(aggregate.finish("m").response, "abcd");
    }

    #[tokio::test]
    async fn test_blank_and_malformed_lines_skipped() {
        let good_a = gen_line("x", false);
        let good_b = gen_line("y", true);
        let parts = [good_a.as_str(), "\n", "   \n", "{not json}\n", good_b.as_str()];

        let mut calls = 0;
        let aggregate = consume_generation_stream(chunks(&parts), parse_generate_frame, None, |_| {
            calls += 1
        })
        .await
        .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(aggregate.finish("m").response, "xy");
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline_is_parsed() {
        let first = gen_line("a", false);
        let last = gen_line("b", true);
        let last = last.trim_end();

        let aggregate = consume_generation_stream(
            chunks(&[first.as_str(), last]),
            parse_generate_frame,
            None,
            |_| {},
        )
        .await
        .unwrap();
        let result = aggregate.finish("m");
        assert_eq!(result.response, "ab");
        assert_eq!(result.stats.eval_count, Some(3));
    }

    #[tokio::test]
    async fn test_chat_frames_use_message_content() {
        let parts = [
            "{\"model\":\"m\",\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":false}\n",
            "{\"model\":\"m\",\"message\":{\"role\":\"assistant\",\"content\":\" there\"},\"done\":false}\n",
            "{\"model\":\"m\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"eval_count\":2}\n",
        ];
        let aggregate = consume_generation_stream(chunks(&parts), parse_chat_frame, None, |_| {})
            .await
            .unwrap();
        let result = aggregate.finish("m");
        assert_eq!(result.response, "Hi there");
        assert_eq!(result.stats.eval_count, Some(2));
    }

    #[tokio::test]
    async fn test_read_error_is_stream_error() {
        let items: Vec<Result<Vec<u8>, String>> = vec![
            Ok(gen_line("a", false).into_bytes()),
            Err("connection reset".to_string()),
        ];
        let err = consume_generation_stream(
            futures::stream::iter(items),
            parse_generate_frame,
            None,
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_invokes_no_callback() {
        let token = CancellationToken::new();
        token.cancel();
        let lines = [gen_line("a", false), gen_line("b", true)];
        let parts: Vec<&str> = lines.iter().map(String::as_str).collect();

        let mut calls = 0;
        let aggregate =
            consume_generation_stream(chunks(&parts), parse_generate_frame, Some(&token), |_| {
                calls += 1
            })
            .await
            .unwrap();
        assert_eq!(calls, 0);
        assert!(aggregate.is_cancelled());
        assert!(!aggregate.finish("m").done);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_chunk() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<Chunk>();
        let token = CancellationToken::new();

        tx.unbounded_send(Ok(gen_line("first", false).into_bytes()))
            .unwrap();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let token_task = token.clone();
        let handle = tokio::spawn(async move {
            consume_generation_stream(rx, parse_generate_frame, Some(&token_task), move |f| {
                seen_cb.lock().unwrap().push(f.response.clone())
            })
            .await
        });

        // Let the first frame through, then cancel while the reader waits.
        while seen.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        token.cancel();
        let aggregate = handle.await.unwrap().unwrap();

        // Frames sent after cancellation are never delivered.
        let _ = tx.unbounded_send(Ok(gen_line("late", true).into_bytes()));
        assert_eq!(*seen.lock().unwrap(), vec!["first".to_string()]);
        assert!(aggregate.is_cancelled());
        assert_eq!(aggregate.text(), "first");
    }

    #[tokio::test]
    async fn test_cancel_on_done_frame_keeps_complete_reply() {
        let token = CancellationToken::new();
        // Both frames in one chunk, so the done frame is parsed without
        // waiting on the network again.
        let body = format!("{}{}", gen_line("all ", false), gen_line("there", true));

        let mut calls = 0;
        let token_cb = token.clone();
        let aggregate =
            consume_generation_stream(chunks(&[body.as_str()]), parse_generate_frame, Some(&token), |_| {
                calls += 1;
                // A newer request takes over just as the last frame lands.
                token_cb.cancel();
            })
            .await
            .unwrap();

        assert_eq!(calls, 1);
        assert!(aggregate.is_cancelled());
        let result = aggregate.finish("m");
        assert!(result.done);
        assert_eq!(result.response, "all there");
        assert_eq!(result.stats.eval_count, Some(3));
    }

    #[tokio::test]
    async fn test_pull_stops_at_success_without_draining() {
        let drops = Arc::new(AtomicUsize::new(0));
        let polled = Arc::new(AtomicUsize::new(0));
        let polled_inner = polled.clone();
        let lines = vec![
            "{\"status\":\"pulling manifest\"}\n".to_string(),
            "{\"status\":\"downloading\",\"digest\":\"sha256:ab\",\"total\":100,\"completed\":50}\n"
                .to_string(),
            "{\"status\":\"success\"}\n".to_string(),
            "{\"status\":\"never read\"}\n".to_string(),
        ];
        let inner = futures::stream::iter(lines).map(move |l| {
            polled_inner.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(l.into_bytes())
        });
        let stream = CountingStream {
            inner,
            drops: drops.clone(),
        };

        let mut statuses = Vec::new();
        let outcome = consume_pull_stream(stream, |p| statuses.push(p.status.clone()))
            .await
            .unwrap();

        assert_eq!(outcome, PullOutcome::Succeeded);
        assert_eq!(statuses, vec!["pulling manifest", "downloading", "success"]);
        assert_eq!(polled.load(Ordering::SeqCst), 3);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pull_stream_end_without_success_releases_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let stream = CountingStream {
            inner: chunks(&["{\"status\":\"pulling manifest\"}\n", "{\"error\":\"file does not exist\"}\n"]),
            drops: drops.clone(),
        };

        let outcome = consume_pull_stream(stream, |_| {}).await.unwrap();
        assert_eq!(outcome, PullOutcome::StreamEnded);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generation_stream_released_on_error_path() {
        let drops = Arc::new(AtomicUsize::new(0));
        let items: Vec<Result<Vec<u8>, String>> = vec![Err("boom".into())];
        let stream = CountingStream {
            inner: futures::stream::iter(items),
            drops: drops.clone(),
        };
        let result = consume_generation_stream(stream, parse_generate_frame, None, |_| {}).await;
        assert!(result.is_err());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
