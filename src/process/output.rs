//! # Output data model: chunks, events, and the final result.
//!
//! Raw output for one stream is either textual or binary for the whole
//! lifetime of that stream, never mixed. [`StreamData`] carries both a
//! single fragment (inside [`OutputChunk::Data`]) and the final
//! concatenation (inside [`ProcessResult`]).

/// Textual or binary output data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamData {
    /// UTF-8 text, produced when the text flag is set.
    Text(String),
    /// Raw bytes (the default representation).
    Binary(Vec<u8>),
}

impl StreamData {
    /// Byte length of the data.
    pub fn len(&self) -> usize {
        match self {
            StreamData::Text(s) => s.len(),
            StreamData::Binary(b) => b.len(),
        }
    }

    /// Whether the data is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows the data as text, if textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StreamData::Text(s) => Some(s),
            StreamData::Binary(_) => None,
        }
    }

    /// Consumes the data into a `String`, if textual.
    pub fn into_text(self) -> Option<String> {
        match self {
            StreamData::Text(s) => Some(s),
            StreamData::Binary(_) => None,
        }
    }

    /// Borrows the underlying bytes regardless of representation.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            StreamData::Text(s) => s.as_bytes(),
            StreamData::Binary(b) => b,
        }
    }
}

impl From<&str> for StreamData {
    fn from(s: &str) -> Self {
        StreamData::Text(s.to_string())
    }
}

impl From<String> for StreamData {
    fn from(s: String) -> Self {
        StreamData::Text(s)
    }
}

impl From<Vec<u8>> for StreamData {
    fn from(b: Vec<u8>) -> Self {
        StreamData::Binary(b)
    }
}

impl From<&[u8]> for StreamData {
    fn from(b: &[u8]) -> Self {
        StreamData::Binary(b.to_vec())
    }
}

/// One stream notification: a data fragment or the end-of-stream marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    /// A buffered fragment of stream output.
    Data(StreamData),
    /// End of the stream; no more fragments will follow.
    End,
}

/// Event keys exposed by a process handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessEventKind {
    /// Stdout fragments and end-of-stream marker.
    Stdout,
    /// Stderr fragments and end-of-stream marker.
    Stderr,
    /// Final result, emitted once after the completion handle resolves.
    Finished,
}

/// Payload delivered to process listeners, tagged by [`ProcessEventKind`].
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// Payload for [`ProcessEventKind::Stdout`].
    Stdout(OutputChunk),
    /// Payload for [`ProcessEventKind::Stderr`].
    Stderr(OutputChunk),
    /// Payload for [`ProcessEventKind::Finished`]; carries the same data the
    /// completion handle resolved (or failed) with.
    Finished(ProcessResult),
}

/// Final result of one process run.
///
/// `stdout`/`stderr` hold the concatenated buffered output in whichever
/// representation the stream used, or `None` when nothing was buffered.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// OS exit code. Zero resolves the completion handle; non-zero fails it.
    pub exit_code: i32,
    /// Native diagnostic text, if any.
    pub error: Option<String>,
    /// Buffered stdout, if any.
    pub stdout: Option<StreamData>,
    /// Buffered stderr, if any.
    pub stderr: Option<StreamData>,
}
