//! Streaming decoder: raw text fragments in, typed events out.
//!
//! ```text
//! fragments ──► LineBuffer ──► complete lines ──► LineClassifier ──► StreamingEvent<T>
//! ```
//!
//! The pipeline is one `scan` over the fragment stream. Each fragment produces
//! a batch of events that is flattened into the output before the next fragment
//! is pulled, so events come out in text order and nothing is buffered beyond
//! the line buffer's partial line. A slow consumer simply polls less often.
//!
//! A line is reasoning when it sits inside a tag block (`<think>…</think>` by
//! default), starts with the prefix marker (`//THINKING:` by default), or is not
//! a JSON candidate at all (candidates start with `{` or `[`). A candidate line
//! that fails to parse is skipped with a warning; the stream keeps going.

use crate::line_buffer::LineBuffer;
use crate::tools::Tool;
use crate::types::Message;
use crate::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Raw text fragments as delivered by a model server.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Sending half of a fragment [`channel`].
pub type FragmentSender = mpsc::Sender<Result<String>>;

/// One decoded unit of streamed output.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamingEvent<T> {
    Thinking(String),
    Object(T),
}

impl<T> StreamingEvent<T> {
    pub fn is_thinking(&self) -> bool {
        matches!(self, StreamingEvent::Thinking(_))
    }

    pub fn into_object(self) -> Option<T> {
        match self {
            StreamingEvent::Object(object) => Some(object),
            StreamingEvent::Thinking(_) => None,
        }
    }
}

/// Markers that identify reasoning text.
#[derive(Debug, Clone)]
pub struct ReasoningMarkers {
    tags: Vec<String>,
    prefix: Option<String>,
}

impl Default for ReasoningMarkers {
    fn default() -> Self {
        Self {
            tags: vec!["think".into(), "analysis".into(), "thought".into()],
            prefix: Some("//THINKING:".into()),
        }
    }
}

impl ReasoningMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also treat `<tag>…</tag>` blocks as reasoning.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn without_prefix(mut self) -> Self {
        self.prefix = None;
        self
    }
}

/// Per-line classifier. Stateful only across tag blocks that span lines.
pub struct LineClassifier<T> {
    markers: ReasoningMarkers,
    open_tag: Option<String>,
    block: Vec<String>,
    _target: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> LineClassifier<T> {
    pub fn new(markers: ReasoningMarkers) -> Self {
        Self {
            markers,
            open_tag: None,
            block: Vec::new(),
            _target: PhantomData,
        }
    }

    /// Events for one complete line, in text order.
    ///
    /// Outside a reasoning block, only a line whose trimmed text starts with
    /// `{` or `[` is a record candidate and gets parsed into `T`. Every other
    /// line is reasoning text, so bare JSON scalars (`42`, `"done"`, `true`)
    /// never decode as records; wrap them in an object or array when `T` is
    /// a scalar type.
    pub fn classify(&mut self, line: &str) -> Vec<StreamingEvent<T>> {
        let mut events = Vec::new();
        self.classify_into(line, &mut events);
        events
    }

    /// Flush a reasoning block left open at end of stream.
    pub fn finish(&mut self) -> Vec<StreamingEvent<T>> {
        if self.open_tag.take().is_none() {
            return Vec::new();
        }
        let text = std::mem::take(&mut self.block).join("\n");
        let text = text.trim();
        if text.is_empty() {
            Vec::new()
        } else {
            vec![StreamingEvent::Thinking(text.to_string())]
        }
    }

    fn classify_into(&mut self, line: &str, events: &mut Vec<StreamingEvent<T>>) {
        if let Some(tag) = self.open_tag.clone() {
            let close = format!("</{}>", tag);
            match line.find(&close) {
                Some(pos) => {
                    self.block.push(line[..pos].to_string());
                    self.open_tag = None;
                    let text = std::mem::take(&mut self.block).join("\n");
                    if !text.trim().is_empty() {
                        events.push(StreamingEvent::Thinking(text.trim().to_string()));
                    }
                    let rest = line[pos + close.len()..].trim();
                    if !rest.is_empty() {
                        self.classify_into(rest, events);
                    }
                }
                None => self.block.push(line.to_string()),
            }
            return;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        if let Some(rest) = self
            .markers
            .prefix
            .as_deref()
            .and_then(|prefix| trimmed.strip_prefix(prefix))
        {
            events.push(StreamingEvent::Thinking(rest.trim().to_string()));
            return;
        }

        let opened = self.markers.tags.iter().find_map(|tag| {
            trimmed
                .strip_prefix(format!("<{}>", tag).as_str())
                .map(|after| (tag.clone(), after))
        });
        if let Some((tag, after)) = opened {
            self.open_tag = Some(tag);
            if !after.trim().is_empty() {
                self.classify_into(after, events);
            }
            return;
        }

        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            match serde_json::from_str::<T>(trimmed) {
                Ok(object) => events.push(StreamingEvent::Object(object)),
                Err(err) => log::warn!(
                    "Skipping line that is not a valid {}: {}",
                    std::any::type_name::<T>(),
                    err
                ),
            }
        } else {
            events.push(StreamingEvent::Thinking(trimmed.to_string()));
        }
    }
}

/// Decode fragments into reasoning and object events, in text order.
///
/// Upstream errors are passed through in place; decoding continues with the
/// next fragment if the consumer keeps polling.
pub fn decode_mixed<T, S>(
    fragments: S,
    markers: ReasoningMarkers,
) -> impl Stream<Item = Result<StreamingEvent<T>>>
where
    T: DeserializeOwned,
    S: Stream<Item = Result<String>>,
{
    let state = (LineBuffer::new(), LineClassifier::<T>::new(markers));

    fragments
        .map(Some)
        .chain(stream::once(async { None }))
        .scan(state, |(buffer, classifier), item| {
            let batch: Vec<Result<StreamingEvent<T>>> = match item {
                Some(Ok(fragment)) => {
                    let (next, lines) = std::mem::take(buffer)
                        .add_fragment(&fragment)
                        .drain_complete_lines();
                    *buffer = next;
                    lines
                        .iter()
                        .flat_map(|line| classifier.classify(line))
                        .map(Ok)
                        .collect()
                }
                Some(Err(err)) => vec![Err(err)],
                None => {
                    let mut events = std::mem::take(buffer)
                        .finish()
                        .map(|tail| classifier.classify(&tail))
                        .unwrap_or_default();
                    events.extend(classifier.finish());
                    events.into_iter().map(Ok).collect()
                }
            };
            futures::future::ready(Some(batch))
        })
        .flat_map(stream::iter)
}

/// Objects only: a filter over [`decode_mixed`].
pub fn decode_objects<T, S>(fragments: S, markers: ReasoningMarkers) -> impl Stream<Item = Result<T>>
where
    T: DeserializeOwned,
    S: Stream<Item = Result<String>>,
{
    decode_mixed(fragments, markers).filter_map(|event| {
        futures::future::ready(match event {
            Ok(StreamingEvent::Object(object)) => Some(Ok(object)),
            Ok(StreamingEvent::Thinking(_)) => None,
            Err(err) => Some(Err(err)),
        })
    })
}

/// Bounded fragment source. Producers wait once `capacity` fragments are
/// queued and not yet pulled by the decoder.
pub fn channel(capacity: usize) -> (FragmentSender, FragmentStream) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, Box::pin(ReceiverStream::new(rx)))
}

/// Streaming call to a model: raw text fragments.
#[async_trait]
pub trait StreamingInference: Send + Sync {
    async fn stream(
        &self,
        history: &[Message],
        visible_tools: &[Arc<Tool>],
    ) -> Result<FragmentStream>;
}

/// Open a stream and decode it into mixed events.
pub async fn stream_mixed<T>(
    inference: &dyn StreamingInference,
    history: &[Message],
    visible_tools: &[Arc<Tool>],
    markers: ReasoningMarkers,
) -> Result<BoxStream<'static, Result<StreamingEvent<T>>>>
where
    T: DeserializeOwned + Send + 'static,
{
    let fragments = inference.stream(history, visible_tools).await?;
    Ok(decode_mixed(fragments, markers).boxed())
}

/// Open a stream and decode only the objects.
pub async fn stream_objects<T>(
    inference: &dyn StreamingInference,
    history: &[Message],
    visible_tools: &[Arc<Tool>],
    markers: ReasoningMarkers,
) -> Result<BoxStream<'static, Result<T>>>
where
    T: DeserializeOwned + Send + 'static,
{
    let fragments = inference.stream(history, visible_tools).await?;
    Ok(decode_objects(fragments, markers).boxed())
}

/// Collect a whole stream of objects, failing on the first upstream error.
pub async fn collect_objects<T>(objects: impl Stream<Item = Result<T>>) -> Result<Vec<T>> {
    objects.try_collect().await
}
