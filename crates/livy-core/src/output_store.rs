//! Broadcast + history output sink for interpret runs.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use futures::{
    StreamExt, future,
    stream::{self, BoxStream},
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::OutputMsg;

/// Default history size limit (10 MB).
const HISTORY_BYTES: usize = 10_000 * 1024;

#[derive(Clone)]
struct StoredMsg {
    msg: OutputMsg,
    bytes: usize,
}

struct Inner {
    history: VecDeque<StoredMsg>,
    total_bytes: usize,
}

/// Output sink with broadcast and history support.
///
/// The statement assembler streams each successful statement's output
/// here as it completes. Late subscribers replay the history first and
/// then follow live updates.
pub struct OutputStore {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<OutputMsg>,
}

impl Default for OutputStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputStore {
    /// Create a new output store.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            inner: RwLock::new(Inner {
                history: VecDeque::with_capacity(32),
                total_bytes: 0,
            }),
            sender,
        }
    }

    /// Push a message to both live listeners and history.
    pub fn push(&self, msg: OutputMsg) {
        let _ = self.sender.send(msg.clone());
        let bytes = msg.approx_bytes();

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(msg, OutputMsg::Cleared) {
            inner.history.clear();
            inner.total_bytes = 0;
        }
        while inner.total_bytes.saturating_add(bytes) > HISTORY_BYTES {
            if let Some(front) = inner.history.pop_front() {
                inner.total_bytes = inner.total_bytes.saturating_sub(front.bytes);
            } else {
                break;
            }
        }
        inner.history.push_back(StoredMsg { msg, bytes });
        inner.total_bytes = inner.total_bytes.saturating_add(bytes);
    }

    /// Push statement output.
    pub fn push_stdout<S: Into<String>>(&self, s: S) {
        self.push(OutputMsg::Stdout(s.into()));
    }

    /// Push a failure message.
    pub fn push_stderr<S: Into<String>>(&self, s: S) {
        self.push(OutputMsg::Stderr(s.into()));
    }

    /// Discard everything pushed so far.
    pub fn clear(&self) {
        self.push(OutputMsg::Cleared);
    }

    /// Push finished notification.
    pub fn push_finished(&self) {
        self.push(OutputMsg::Finished);
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn get_receiver(&self) -> broadcast::Receiver<OutputMsg> {
        self.sender.subscribe()
    }

    /// Get a snapshot of the history.
    #[must_use]
    pub fn get_history(&self) -> Vec<OutputMsg> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .iter()
            .map(|s| s.msg.clone())
            .collect()
    }

    /// Concatenated stdout currently visible in the history.
    #[must_use]
    pub fn stdout_text(&self) -> String {
        self.get_history()
            .into_iter()
            .filter_map(|msg| match msg {
                OutputMsg::Stdout(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// Concatenated stderr currently visible in the history.
    #[must_use]
    pub fn stderr_text(&self) -> String {
        self.get_history()
            .into_iter()
            .filter_map(|msg| match msg {
                OutputMsg::Stderr(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// Everything visible so far, then live messages, ending after `Finished`.
    ///
    /// Messages dropped because the subscriber lagged are skipped.
    #[must_use]
    pub fn events(&self) -> BoxStream<'static, OutputMsg> {
        let replay = stream::iter(self.get_history());
        let live = BroadcastStream::new(self.get_receiver())
            .filter_map(|res| future::ready(res.ok()));

        replay
            .chain(live)
            .scan(false, |done, msg| {
                if *done {
                    return future::ready(None);
                }
                *done = matches!(msg, OutputMsg::Finished);
                future::ready(Some(msg))
            })
            .boxed()
    }
}
