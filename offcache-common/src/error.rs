// Copyright 2026 offcache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    backtrace::Backtrace,
    fmt::{Debug, Display},
    sync::Arc,
};

/// ErrorKind is all kinds of Error of offcache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The store cannot satisfy an allocation.
    ///
    /// Surfaced to the caller and never retried.
    CapacityExceeded,
    /// Optimistic-lock conflict of a versioned put.
    ///
    /// The caller must re-read and retry at a higher level.
    StaleItem,
    /// Config error, raised when a builder parameter is missing or out of range.
    Config,
    /// The remote backend cannot be reached.
    BackendUnavailable,
    /// A pointer does not match the allocation record of its segment.
    ///
    /// Indicates corruption or a programming bug. The operation is aborted instead of returning wrong data.
    ConsistencyViolation,
    /// Serialization or deserialization error.
    Serde,
    /// External error, e.g. raised by a cache loader or a task saver.
    External,
    /// Out of range.
    OutOfRange,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::CapacityExceeded => "Capacity exceeded",
            ErrorKind::StaleItem => "Stale item",
            ErrorKind::Config => "Config error",
            ErrorKind::BackendUnavailable => "Backend unavailable",
            ErrorKind::ConsistencyViolation => "Consistency violation",
            ErrorKind::Serde => "Serde error",
            ErrorKind::External => "External error",
            ErrorKind::OutOfRange => "Out of range",
        }
    }
}

/// Error is the error struct returned by all offcache functions.
///
/// ## Display
///
/// - Via `Display`, the error is printed in a single line:
///
/// ```shell
/// Stale item, context: { expected: 1, actual: 2 } => stored version does not match
/// ```
///
/// - Via `Debug`, the error is printed in multi lines with context, source and backtrace (if captured).
///
/// - Via `{:#?}`, the conventional struct-style Debug representation is used.
pub struct Error {
    kind: ErrorKind,
    message: String,

    context: Vec<(&'static str, String)>,

    source: Option<Arc<anyhow::Error>>,
    backtrace: Option<Arc<Backtrace>>,
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // If alternate has been specified, we will print like Debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("context", &self.context);
            de.field("source", &self.source);
            de.field("backtrace", &self.backtrace);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "  {k}: {v}")?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source:")?;
            writeln!(f, "  {source:#}")?;
        }

        if let Some(backtrace) = &self.backtrace {
            writeln!(f)?;
            writeln!(f, "Backtrace:")?;
            writeln!(f, "{backtrace}")?;
        }

        Ok(())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            let mut iter = self.context.iter().peekable();
            while let Some((k, v)) = iter.next() {
                write!(f, "{k}: {v}")?;
                if iter.peek().is_some() {
                    write!(f, ", ")?;
                }
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref().as_ref())
    }
}

/// Cloning an [`Error`] with large message and context can be expensive.
impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            context: self.context.clone(),
            source: self.source.clone(),
            backtrace: self.backtrace.clone(),
        }
    }
}

impl Error {
    /// Create a new error.
    ///
    /// If the error needs to carry a source error, please use `with_source` method.
    ///
    /// ```rust
    /// # use offcache_common::error::{Error, ErrorKind};
    /// let io_error = std::io::Error::other("disk is gone");
    /// Error::new(ErrorKind::External, "task saver failed").with_source(io_error);
    /// ```
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: None,
            backtrace: Some(Arc::new(Backtrace::capture())),
        }
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set source for error.
    ///
    /// # Notes
    ///
    /// If the source has been set, we will raise a panic here in debug builds.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(Arc::new(source.into()));
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error context.
    pub fn context(&self) -> &Vec<(&'static str, String)> {
        &self.context
    }

    /// Get the error backtrace.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// Get the error source.
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Downcast the reference of the source error to a specific error type reference.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source.as_deref().and_then(|e| e.downcast_ref::<E>())
    }
}

/// Result type for offcache.
pub type Result<T> = std::result::Result<T, Error>;

/// Helper methods for Error.
impl Error {
    /// Helper for creating a [`ErrorKind::CapacityExceeded`] error with context.
    pub fn capacity_exceeded(capacity: usize, allocated: usize, required: usize) -> Self {
        Error::new(ErrorKind::CapacityExceeded, "no segment can hold the requested region")
            .with_context("capacity", capacity)
            .with_context("allocated", allocated)
            .with_context("required", required)
    }

    /// Helper for creating a [`ErrorKind::StaleItem`] error with context.
    ///
    /// `actual` is `None` if the key is absent.
    pub fn stale_item(expected: u32, actual: Option<u32>) -> Self {
        let actual = match actual {
            Some(version) => version.to_string(),
            None => "absent".to_string(),
        };
        Error::new(ErrorKind::StaleItem, "stored version does not match")
            .with_context("expected", expected)
            .with_context("actual", actual)
    }

    /// Helper for creating a [`ErrorKind::Config`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Config, message)
    }

    /// Helper for creating a [`ErrorKind::ConsistencyViolation`] error with the offending pointer fields.
    pub fn consistency_violation(segment: u32, offset: u32, len: u32, recorded: Option<u32>) -> Self {
        let recorded = match recorded {
            Some(len) => len.to_string(),
            None => "none".to_string(),
        };
        Error::new(ErrorKind::ConsistencyViolation, "pointer does not match the segment record")
            .with_context("segment", segment)
            .with_context("offset", offset)
            .with_context("len", len)
            .with_context("recorded", recorded)
    }

    /// Helper for wrapping an error raised by a user supplied collaborator.
    pub fn external(source: impl Into<anyhow::Error>) -> Self {
        Error::new(ErrorKind::External, "").with_source(source)
    }

    /// Helper for creating an error from [`bincode::Error`].
    #[cfg(feature = "serde")]
    pub fn bincode_error(source: bincode::Error) -> Self {
        Error::new(ErrorKind::Serde, "bincode error").with_source(source)
    }
}

#[cfg(feature = "serde")]
impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Self::bincode_error(e)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<Error>();
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn test_error_display() {
        let err = Error::stale_item(1, Some(2));
        assert_eq!(
            "Stale item, context: { expected: 1, actual: 2 } => stored version does not match",
            err.to_string()
        );

        let err = Error::stale_item(0, None);
        assert_eq!(
            "Stale item, context: { expected: 0, actual: absent } => stored version does not match",
            err.to_string()
        );
    }

    #[test]
    fn test_error_downcast() {
        let inner = TestError("loader is broken".to_string());
        let err = Error::external(inner.clone());
        assert_eq!(err.kind(), ErrorKind::External);

        let downcasted = err.downcast_ref::<TestError>().unwrap();
        assert_eq!(downcasted, &inner);
    }

    #[test]
    fn test_error_context() {
        let err = Error::capacity_exceeded(1000, 960, 90);
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(
            err.context(),
            &vec![
                ("capacity", "1000".to_string()),
                ("allocated", "960".to_string()),
                ("required", "90".to_string())
            ]
        );
    }
}
