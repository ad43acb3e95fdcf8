//! Accumulating buffer for dynamic-loader error text.
//!
//! Each backend owns one [`Diagnostics`] buffer. While an initialization
//! attempt runs, every loader failure is appended as a ` * `-prefixed bullet,
//! one per line. The next attempt starts by replacing the content, so the
//! buffer only ever describes the most recent attempt.
//!
//! The buffer never panics on allocation failure: the write degrades to a
//! fixed message instead.

use std::borrow::Cow;
use std::collections::TryReserveError;
use std::ffi::CString;

/// Prefix written before every entry.
pub const MARKER: &str = " * ";

/// Content stored when a new entry cannot be allocated.
pub const ALLOCATION_FAILURE: &str = " * <out of memory while recording a loader error>";

/// How a pending error is combined with the existing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMode {
    /// Discard the previous content.
    Replace,
    /// Keep the previous content and add a new line.
    Append,
}

/// Owned, nullable loader error text.
///
/// An empty buffer is always represented as "no buffer": [`text`](Self::text)
/// returns `None` exactly when [`len`](Self::len) is zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    buffer: Option<Cow<'static, str>>,
}

impl Diagnostics {
    /// Create an empty buffer.
    pub const fn new() -> Self {
        Self { buffer: None }
    }

    /// Record a pending loader error.
    ///
    /// Without a pending error, [`RecordMode::Replace`] clears the buffer and
    /// [`RecordMode::Append`] leaves it untouched.
    pub fn record(&mut self, pending: Option<&str>, mode: RecordMode) {
        self.record_with(pending, mode, String::try_reserve_exact);
    }

    /// [`record`](Self::record) with the allocation step supplied by the caller.
    pub(crate) fn record_with<R>(&mut self, pending: Option<&str>, mode: RecordMode, reserve: R)
    where
        R: FnOnce(&mut String, usize) -> Result<(), TryReserveError>,
    {
        let Some(message) = pending else {
            if mode == RecordMode::Replace {
                self.buffer = None;
            }
            return;
        };

        let previous = match mode {
            RecordMode::Replace => None,
            RecordMode::Append => self.text(),
        };
        let separator = usize::from(previous.is_some());
        let capacity = previous.map_or(0, str::len) + separator + MARKER.len() + message.len();

        let mut next = String::new();
        if reserve(&mut next, capacity).is_err() {
            self.buffer = Some(Cow::Borrowed(ALLOCATION_FAILURE));
            return;
        }
        if let Some(previous) = previous {
            next.push_str(previous);
            next.push('\n');
        }
        next.push_str(MARKER);
        next.push_str(message);

        self.buffer = Some(Cow::Owned(next));
    }

    /// Append one bullet.
    pub fn append(&mut self, message: &str) {
        self.record(Some(message), RecordMode::Append);
    }

    /// Clear the buffer.
    pub fn reset(&mut self) {
        self.record(None, RecordMode::Replace);
    }

    /// Current content, `None` when empty.
    pub fn text(&self) -> Option<&str> {
        self.buffer.as_deref()
    }

    /// Length of the content in bytes.
    pub fn len(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.len())
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_none()
    }

    /// Individual messages without their markers.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.text()
            .into_iter()
            .flat_map(str::lines)
            .map(|line| line.strip_prefix(MARKER).unwrap_or(line))
    }

    /// NUL-terminated copy of the content for foreign callers.
    ///
    /// Interior NUL bytes, which loader messages never contain in practice,
    /// are replaced by spaces.
    pub fn to_c_string(&self) -> Option<CString> {
        let text = self.text()?;
        let bytes: Vec<u8> = text
            .bytes()
            .map(|b| if b == 0 { b' ' } else { b })
            .collect();
        CString::new(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_replace_without_error_clears() {
        let mut diag = Diagnostics::new();
        diag.append("libcuda.so.1: cannot open shared object file");
        assert!(!diag.is_empty());

        diag.record(None, RecordMode::Replace);
        assert!(diag.is_empty());
        assert_eq!(diag.len(), 0);
        assert_eq!(diag.text(), None);

        // Idempotent on an empty buffer.
        diag.reset();
        assert!(diag.is_empty());
    }

    #[test]
    fn test_append_without_error_is_noop() {
        let mut diag = Diagnostics::new();
        diag.record(None, RecordMode::Append);
        assert!(diag.is_empty());

        diag.append("first");
        diag.record(None, RecordMode::Append);
        assert_eq!(diag.text(), Some(" * first"));
    }

    #[test]
    fn test_append_joins_with_newline() {
        let mut diag = Diagnostics::new();
        diag.append("A");
        diag.append("B");
        assert_eq!(diag.text(), Some(" * A\n * B"));
        assert_eq!(diag.len(), " * A\n * B".len());
        assert_eq!(diag.entries().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_replace_with_error_starts_fresh() {
        let mut diag = Diagnostics::new();
        diag.append("old");
        diag.record(Some("new"), RecordMode::Replace);
        assert_eq!(diag.text(), Some(" * new"));
    }

    #[test]
    fn test_c_string() {
        let mut diag = Diagnostics::new();
        assert!(diag.to_c_string().is_none());

        diag.append("missing\0symbol");
        let c = diag.to_c_string().unwrap();
        assert_eq!(c.to_bytes(), b" * missing symbol");
        assert_eq!(c.as_bytes_with_nul().last(), Some(&0));
    }

    #[test]
    fn test_allocation_failure_degrades_to_fixed_text() {
        let fail = |buffer: &mut String, _: usize| buffer.try_reserve_exact(usize::MAX);

        let mut diag = Diagnostics::new();
        diag.append("libamdhip64.so: cannot open shared object file");
        diag.record_with(Some("hipInit: undefined symbol"), RecordMode::Append, fail);
        assert_eq!(diag.text(), Some(ALLOCATION_FAILURE));
        assert_eq!(diag.len(), ALLOCATION_FAILURE.len());

        let mut fresh = Diagnostics::new();
        fresh.record_with(Some("libcuda.so.1"), RecordMode::Replace, fail);
        assert_eq!(fresh.text(), Some(ALLOCATION_FAILURE));

        // The buffer stays usable afterwards.
        fresh.append("next");
        assert_eq!(fresh.entries().last(), Some("next"));
    }

    proptest! {
        #[test]
        fn prop_append_preserves_every_message(
            messages in prop::collection::vec("[a-zA-Z0-9 ./:_-]{0,40}", 1..8)
        ) {
            let mut diag = Diagnostics::new();
            for message in &messages {
                diag.append(message);
            }

            let expected = messages
                .iter()
                .map(|m| format!("{MARKER}{m}"))
                .collect::<Vec<_>>()
                .join("\n");
            prop_assert_eq!(diag.text(), Some(expected.as_str()));
            prop_assert_eq!(diag.len(), expected.len());
            prop_assert_eq!(diag.entries().count(), messages.len());
        }

        #[test]
        fn prop_replace_keeps_only_last(first in "[a-z]{1,20}", second in "[a-z]{1,20}") {
            let mut diag = Diagnostics::new();
            diag.append(&first);
            diag.record(Some(&second), RecordMode::Replace);
            prop_assert_eq!(diag.text().map(str::to_owned), Some(format!("{MARKER}{second}")));
        }
    }
}
