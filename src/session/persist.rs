//! Expression persistence
//!
//! Two places remember the last good expression: a durable key/value slot and
//! a shareable link whose fragment carries the percent-encoded expression.
//! Both are written together after every successful compile and read at
//! startup, link first.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

/// Slot key holding the last successfully compiled expression.
pub const EXPRESSION_KEY: &str = "expr";

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize slot contents: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable key → string storage.
pub trait SlotStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError>;
}

/// Shareable locator whose fragment carries an expression.
pub trait Locator: Send {
    /// The decoded fragment, if any.
    fn fragment(&self) -> Option<String>;
    fn set_fragment(&mut self, value: &str) -> Result<(), PersistError>;
    /// Full shareable form of the locator.
    fn link(&self) -> String;
}

/// Slot storage backed by a JSON object on disk.
#[derive(Debug)]
pub struct FileSlot {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileSlot {
    /// `<data dir>/glitchbox/state.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("glitchbox").join("state.json"))
    }

    /// Open the slot file. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = fs::read_to_string(&path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default();
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SlotStore for FileSlot {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        let contents = serde_json::to_string_pretty(&self.entries)?;
        let write_err = |source| PersistError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&self.path, contents).map_err(write_err)
    }
}

/// Process-local slot storage.
#[derive(Debug, Default)]
pub struct MemorySlot {
    entries: HashMap<String, String>,
}

impl SlotStore for MemorySlot {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// A share link: `<base>#<percent-encoded expression>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareLink {
    base: String,
    fragment: String,
}

impl ShareLink {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            fragment: String::new(),
        }
    }

    /// Split a link at its first `#`.
    pub fn parse(link: &str) -> Self {
        match link.split_once('#') {
            Some((base, fragment)) => Self {
                base: base.to_owned(),
                fragment: fragment.to_owned(),
            },
            None => Self::new(link),
        }
    }
}

impl Locator for ShareLink {
    fn fragment(&self) -> Option<String> {
        if self.fragment.is_empty() {
            return None;
        }
        decode_component(&self.fragment)
    }

    fn set_fragment(&mut self, value: &str) -> Result<(), PersistError> {
        self.fragment = encode_component(value);
        Ok(())
    }

    fn link(&self) -> String {
        format!("{}#{}", self.base, self.fragment)
    }
}

/// Percent-encode everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
pub fn encode_component(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Reverse of [`encode_component`]. `None` on malformed escapes or invalid UTF-8.
pub fn decode_component(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// The slot and the locator, updated as a pair.
pub struct Persistence {
    slot: Box<dyn SlotStore>,
    locator: Box<dyn Locator>,
}

impl Persistence {
    pub fn new(slot: impl SlotStore + 'static, locator: impl Locator + 'static) -> Self {
        Self {
            slot: Box::new(slot),
            locator: Box::new(locator),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemorySlot::default(), ShareLink::default())
    }

    /// Startup lookup: link fragment, then slot. Empty values count as absent.
    pub fn restore(&self) -> Option<String> {
        self.locator
            .fragment()
            .filter(|text| !text.is_empty())
            .or_else(|| self.slot.get(EXPRESSION_KEY).filter(|text| !text.is_empty()))
    }

    /// Best-effort write to both places. Failures are logged and ignored.
    pub fn store(&mut self, expression: &str) {
        if let Err(err) = self.locator.set_fragment(expression) {
            tracing::warn!(%err, "failed to update share link");
        }
        if let Err(err) = self.slot.set(EXPRESSION_KEY, expression) {
            tracing::warn!(%err, "failed to persist expression");
        }
    }

    pub fn stored(&self) -> Option<String> {
        self.slot.get(EXPRESSION_KEY)
    }

    pub fn link(&self) -> String {
        self.locator.link()
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("link", &self.locator.link())
            .finish()
    }
}
