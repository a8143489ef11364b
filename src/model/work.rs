//! Work item and lifecycle state types.

/// Structured field map returned by row/document/message backends.
pub type Record = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// One unit of work pulled from a source for a single iteration.
///
/// Created fresh on every successful fetch and dropped once the item has been
/// acknowledged or reported as failed. Nothing here is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    /// Raw bytes handed to the external program.
    pub payload: Vec<u8>,

    /// Field data, when the backend returns rows, documents or message
    /// attributes. None for byte-stream backends.
    pub record: Option<Record>,

    /// Backend identifier needed to acknowledge or fail this exact item
    /// (message id, row key, file path).
    pub key: Option<String>,
}

impl WorkItem {
    /// Item carrying an opaque payload.
    pub fn from_payload(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            record: None,
            key: None,
        }
    }

    /// Item built from a record; the payload is the record as JSON.
    pub fn from_record(record: Record) -> Self {
        let payload = serde_json::Value::Object(record.clone()).to_string();
        Self {
            payload: payload.into_bytes(),
            record: Some(record),
            key: None,
        }
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Payload as text. Invalid UTF-8 sequences are replaced.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

// ---------------------------------------------------------------------------
// Lifecycle state
// ---------------------------------------------------------------------------

/// Where the controller is in the fetch → execute → ack/fail cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Source configured, not yet connected.
    Init,
    /// Connected, waiting to fetch.
    Ready,
    /// External program running on a fetched item.
    Executing,
    /// Program succeeded, acknowledging.
    Ack,
    /// Program failed, reporting failure.
    Fail,
    /// Could not configure or connect. Terminal.
    Fatal,
    /// Source released. Terminal.
    Terminal,
}

impl State {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: State) -> bool {
        use State::*;
        matches!(
            (self, to),
            (Init, Ready)
                | (Init, Fatal)
                | (Ready, Ready)        // no work
                | (Ready, Executing)
                | (Ready, Terminal)
                | (Executing, Ack)
                | (Executing, Fail)
                | (Ack, Ready)
                | (Fail, Ready)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Fatal | State::Terminal)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Init => "init",
            State::Ready => "ready",
            State::Executing => "executing",
            State::Ack => "ack",
            State::Fail => "fail",
            State::Fatal => "fatal",
            State::Terminal => "terminal",
        };
        f.write_str(s)
    }
}
