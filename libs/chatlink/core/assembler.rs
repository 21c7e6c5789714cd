//! Streamed message reassembly
//!
//! Assistant replies arrive as `message_stream` chunks keyed by message id.
//! Chunks of different messages may interleave; chunks of one message arrive
//! in order. A message is handed off exactly once, when its completion flag
//! is seen, and its id is then remembered as finished so stragglers and
//! duplicate completions cannot resurrect it.
//!
//! Both sets are bounded. Finished ids are forgotten oldest first, and when
//! too many messages are mid-stream the one that started earliest is
//! abandoned.

use crate::protocol::{CompletedMessage, StreamChunk};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// A message still receiving chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingMessage {
    pub message_id: String,
    pub conversation_id: String,
    pub accumulated_text: String,
    pub is_complete: bool,
}

/// What happened to one ingested chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    /// Chunk appended; the message is still streaming
    Partial {
        message_id: String,
        conversation_id: String,
        chunk: String,
    },
    /// Chunk appended and the message finished
    Completed {
        message: CompletedMessage,
        last_chunk: String,
    },
    /// Chunk discarded; assembler state unchanged
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The message id was already finalized
    AlreadyFinished,
    /// The event had no message id
    MissingMessageId,
}

/// Reassembles chunked messages keyed by message id
#[derive(Debug)]
pub struct MessageStreamAssembler {
    active: HashMap<String, StreamingMessage>,
    /// Partial message ids, oldest first
    active_order: VecDeque<String>,
    streaming_capacity: usize,
    finished: HashSet<String>,
    finished_order: VecDeque<String>,
    finished_capacity: usize,
}

impl MessageStreamAssembler {
    /// # Arguments
    /// * `finished_capacity` - How many finalized ids to remember (oldest evicted first)
    /// * `streaming_capacity` - How many partial messages to hold (oldest abandoned first)
    pub fn new(finished_capacity: usize, streaming_capacity: usize) -> Self {
        Self {
            active: HashMap::new(),
            active_order: VecDeque::new(),
            streaming_capacity: streaming_capacity.max(1),
            finished: HashSet::new(),
            finished_order: VecDeque::new(),
            finished_capacity: finished_capacity.max(1),
        }
    }

    /// Feed one `message_stream` event
    ///
    /// Duplicate suppression only covers the last `finished_capacity`
    /// completions. Once an id has been forgotten, a late chunk for it starts
    /// a new message and a late completion is delivered again.
    pub fn ingest(&mut self, event: StreamChunk) -> Assembly {
        if event.message_id.is_empty() {
            warn!("Discarding stream chunk without messageId");
            return Assembly::Ignored(IgnoreReason::MissingMessageId);
        }

        if self.finished.contains(&event.message_id) {
            debug!(
                "Discarding chunk for finished message {} (complete: {})",
                event.message_id, event.is_complete
            );
            return Assembly::Ignored(IgnoreReason::AlreadyFinished);
        }

        if !self.active.contains_key(&event.message_id) {
            self.make_room();
            self.active_order.push_back(event.message_id.clone());
        }

        let entry = self
            .active
            .entry(event.message_id.clone())
            .or_insert_with(|| StreamingMessage {
                message_id: event.message_id.clone(),
                conversation_id: event.conversation_id.clone(),
                accumulated_text: String::new(),
                is_complete: false,
            });

        entry.accumulated_text.push_str(&event.chunk);

        if !event.is_complete {
            return Assembly::Partial {
                message_id: event.message_id,
                conversation_id: entry.conversation_id.clone(),
                chunk: event.chunk,
            };
        }

        // Completion observed: the entry leaves the working set right here
        entry.is_complete = true;
        let message = CompletedMessage {
            message_id: event.message_id.clone(),
            conversation_id: entry.conversation_id.clone(),
            full_text: std::mem::take(&mut entry.accumulated_text),
        };
        self.active.remove(&event.message_id);
        self.active_order.retain(|id| id != &event.message_id);
        self.remember_finished(event.message_id);

        debug!(
            "Message {} complete ({} chars)",
            message.message_id,
            message.full_text.len()
        );

        Assembly::Completed {
            message,
            last_chunk: event.chunk,
        }
    }

    /// Abandon the oldest partial messages until one more fits
    fn make_room(&mut self) {
        while self.active.len() >= self.streaming_capacity {
            let Some(oldest) = self.active_order.pop_front() else {
                break;
            };
            if let Some(abandoned) = self.active.remove(&oldest) {
                warn!(
                    "Abandoning incomplete message {} ({} chars buffered)",
                    oldest,
                    abandoned.accumulated_text.len()
                );
            }
        }
    }

    fn remember_finished(&mut self, message_id: String) {
        if self.finished_order.len() >= self.finished_capacity {
            if let Some(oldest) = self.finished_order.pop_front() {
                self.finished.remove(&oldest);
            }
        }
        self.finished.insert(message_id.clone());
        self.finished_order.push_back(message_id);
    }

    /// Messages currently mid-stream
    pub fn in_progress(&self) -> usize {
        self.active.len()
    }

    /// Peek at a message still streaming
    pub fn get(&self, message_id: &str) -> Option<&StreamingMessage> {
        self.active.get(message_id)
    }

    /// Drop all partial messages and finished ids
    pub fn clear(&mut self) {
        self.active.clear();
        self.active_order.clear();
        self.finished.clear();
        self.finished_order.clear();
    }
}
