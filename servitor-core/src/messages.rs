use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

/// One collected failure or warning, keyed by the field path it concerns
/// (or `base` for service-level messages).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: String,
    pub text: String,
}

impl Message {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

/// Which log a message landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Errors,
    Warnings,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogKind::Errors => f.write_str("error"),
            LogKind::Warnings => f.write_str("warning"),
        }
    }
}

/// Raised when a log configured to raise on add receives a message. The
/// message is appended before the exception is produced, so the log still
/// holds it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{log} message on '{key}': {text}")]
pub struct MessageRaised {
    pub log: LogKind,
    pub key: String,
    pub text: String,
}

/// Effects applied when a message lands in the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddPolicy {
    pub break_on_add: bool,
    pub raise_on_add: bool,
    pub rollback_on_add: bool,
}

/// Per-add overrides of the log policy; `None` fields defer to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    pub break_on_add: Option<bool>,
    pub raise_on_add: Option<bool>,
    pub rollback_on_add: Option<bool>,
}

/// Keyed accumulation of messages in insertion order.
///
/// The `broke` flag is monotonic: once set by an add it stays set for the
/// rest of the run.
#[derive(Debug, Clone)]
pub struct MessageLog {
    kind: LogKind,
    policy: AddPolicy,
    entries: IndexMap<String, Vec<String>>,
    broke: bool,
    rollback_requested: bool,
}

impl MessageLog {
    pub fn new(kind: LogKind, policy: AddPolicy) -> Self {
        Self {
            kind,
            policy,
            entries: IndexMap::new(),
            broke: false,
            rollback_requested: false,
        }
    }

    pub fn kind(&self) -> LogKind {
        self.kind
    }

    pub fn policy(&self) -> AddPolicy {
        self.policy
    }

    /// Appends one message under `key` with the log's own policy.
    pub fn add(
        &mut self,
        key: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), MessageRaised> {
        self.add_all(key, [text.into()], AddOptions::default())
    }

    /// Appends every text under `key`, then applies the add effects:
    /// raising produces an exception carrying the first text of the batch,
    /// after the batch has been appended.
    pub fn add_all(
        &mut self,
        key: impl Into<String>,
        texts: impl IntoIterator<Item = impl Into<String>>,
        options: AddOptions,
    ) -> Result<(), MessageRaised> {
        let key = key.into();
        let texts: Vec<String> = texts.into_iter().map(Into::into).collect();
        if texts.is_empty() {
            return Ok(());
        }
        let first = texts[0].clone();
        self.entries.entry(key.clone()).or_default().extend(texts);

        if options.break_on_add.unwrap_or(self.policy.break_on_add) {
            self.broke = true;
        }
        if options
            .rollback_on_add
            .unwrap_or(self.policy.rollback_on_add)
        {
            self.rollback_requested = true;
        }
        if options.raise_on_add.unwrap_or(self.policy.raise_on_add) {
            return Err(MessageRaised {
                log: self.kind,
                key,
                text: first,
            });
        }
        Ok(())
    }

    /// Copies every message of `source` into this log. Each one passes
    /// through [`MessageLog::add_all`], so this log's policy governs the
    /// break, raise, and rollback effects.
    pub fn absorb<S: IntoMessages>(&mut self, source: S) -> Result<(), MessageRaised> {
        for message in source.into_messages() {
            self.add_all(message.key, [message.text], AddOptions::default())?;
        }
        Ok(())
    }

    pub fn broke(&self) -> bool {
        self.broke
    }

    pub fn rollback_requested(&self) -> bool {
        self.rollback_requested
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of message texts across all keys.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, texts)| (key.as_str(), texts.as_slice()))
    }

    /// Ordered key to texts map for presentation.
    pub fn summary(&self) -> IndexMap<String, Vec<String>> {
        self.entries.clone()
    }
}

/// Containers whose contents can be absorbed into a [`MessageLog`].
pub trait IntoMessages {
    fn into_messages(self) -> Vec<Message>;
}

impl IntoMessages for &MessageLog {
    fn into_messages(self) -> Vec<Message> {
        self.entries()
            .flat_map(|(key, texts)| texts.iter().map(move |text| Message::new(key, text)))
            .collect()
    }
}

impl IntoMessages for IndexMap<String, Vec<String>> {
    fn into_messages(self) -> Vec<Message> {
        self.into_iter()
            .flat_map(|(key, texts)| {
                texts
                    .into_iter()
                    .map(move |text| Message::new(key.clone(), text))
            })
            .collect()
    }
}

impl IntoMessages for Vec<(String, String)> {
    fn into_messages(self) -> Vec<Message> {
        self.into_iter()
            .map(|(key, text)| Message { key, text })
            .collect()
    }
}

impl IntoMessages for Vec<Message> {
    fn into_messages(self) -> Vec<Message> {
        self
    }
}

/// A JSON object maps keys to a string or an array; anything else is
/// rendered. Non-object values land under `base`.
impl IntoMessages for &Value {
    fn into_messages(self) -> Vec<Message> {
        fn texts_of(value: &Value) -> Vec<String> {
            match value {
                Value::String(text) => vec![text.clone()],
                Value::Array(items) => items.iter().flat_map(texts_of).collect(),
                other => vec![other.to_string()],
            }
        }

        match self {
            Value::Object(map) => map
                .iter()
                .flat_map(|(key, value)| {
                    texts_of(value)
                        .into_iter()
                        .map(move |text| Message::new(key, text))
                })
                .collect(),
            Value::Null => Vec::new(),
            other => texts_of(other)
                .into_iter()
                .map(|text| Message::new("base", text))
                .collect(),
        }
    }
}
