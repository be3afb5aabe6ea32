//! I/O endpoint values that can be bound to a command's standard streams
//!
//! Endpoints are plain values stored in a command template. They are only
//! turned into real streams when the command starts (see [`crate::resolve`]),
//! so a [`Buffer`] that changes between baking and starting is read in its
//! latest state.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_channel::{Receiver, Sender};
use futures::io::{AsyncRead, AsyncWrite};
use futures::lock::Mutex as AsyncMutex;

use crate::command::Command;

/// A shared, growable byte buffer.
///
/// Clones share the same storage, so a buffer handed to a command as an
/// output sink can be inspected by the caller once the command finished.
#[derive(Clone, Default)]
pub struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append bytes to the buffer
    pub fn append(&self, bytes: &[u8]) {
        self.lock().extend_from_slice(bytes);
    }

    /// Copy of the current contents
    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Current contents as text, replacing invalid UTF-8
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Number of bytes held
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discard the contents
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns true if both handles share the same storage
    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        Self(Arc::new(Mutex::new(bytes.to_vec())))
    }
}

impl From<&str> for Buffer {
    fn from(text: &str) -> Self {
        Self::from(text.as_bytes())
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("len", &self.len()).finish()
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A readable stream shared between command templates
#[derive(Clone)]
pub struct SharedReader(pub(crate) Arc<AsyncMutex<BoxedReader>>);

impl SharedReader {
    /// Wrap an async reader
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self(Arc::new(AsyncMutex::new(Box::new(reader))))
    }
}

impl fmt::Debug for SharedReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedReader(..)")
    }
}

/// A writable stream shared between command templates
#[derive(Clone)]
pub struct SharedWriter(pub(crate) Arc<AsyncMutex<BoxedWriter>>);

impl SharedWriter {
    /// Wrap an async writer
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self(Arc::new(AsyncMutex::new(Box::new(writer))))
    }

    /// Returns true if both handles wrap the same writer
    pub fn ptr_eq(&self, other: &SharedWriter) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedWriter(..)")
    }
}

/// A value of a type no stream binding knows how to use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opaque {
    /// Rust type name of the value
    pub type_name: &'static str,
    /// Debug rendering of the value
    pub repr: String,
}

impl Opaque {
    fn of<T: fmt::Debug>(value: &T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            repr: format!("{value:?}"),
        }
    }
}

/// Where a command reads its standard input from
#[derive(Debug, Clone)]
pub enum Input {
    /// Literal text
    Text(String),
    /// Literal bytes
    Bytes(Vec<u8>),
    /// An async reader, streamed in
    Reader(SharedReader),
    /// A buffer, read in its state at start time
    Buffer(Buffer),
    /// Lines received from a channel, each written followed by a newline
    Lines(Receiver<String>),
    /// Byte chunks received from a channel, written as-is
    Chunks(Receiver<Vec<u8>>),
    /// Another command, whose standard output is piped in
    Command(Box<Command>),
    /// The host process's standard input
    Inherit,
    /// A value of an unsupported kind; fails when the command starts
    Other(Opaque),
}

impl Input {
    /// Classify a dynamically typed value as an input endpoint.
    ///
    /// Values of an unknown type are kept as [`Input::Other`] and rejected
    /// when the command starts.
    pub fn from_value<T: Any + fmt::Debug>(value: T) -> Self {
        let opaque = Opaque::of(&value);
        let value: Box<dyn Any> = Box::new(value);
        let value = match value.downcast::<Input>() {
            Ok(input) => return *input,
            Err(value) => value,
        };
        let value = match value.downcast::<String>() {
            Ok(text) => return Input::Text(*text),
            Err(value) => value,
        };
        let value = match value.downcast::<&'static str>() {
            Ok(text) => return Input::Text((*text).to_string()),
            Err(value) => value,
        };
        let value = match value.downcast::<Vec<u8>>() {
            Ok(bytes) => return Input::Bytes(*bytes),
            Err(value) => value,
        };
        let value = match value.downcast::<Buffer>() {
            Ok(buffer) => return Input::Buffer(*buffer),
            Err(value) => value,
        };
        let value = match value.downcast::<SharedReader>() {
            Ok(reader) => return Input::Reader(*reader),
            Err(value) => value,
        };
        let value = match value.downcast::<Receiver<String>>() {
            Ok(rx) => return Input::Lines(*rx),
            Err(value) => value,
        };
        let value = match value.downcast::<Receiver<Vec<u8>>>() {
            Ok(rx) => return Input::Chunks(*rx),
            Err(value) => value,
        };
        match value.downcast::<Command>() {
            Ok(command) => Input::Command(command),
            Err(_) => Input::Other(opaque),
        }
    }
}

impl From<&str> for Input {
    fn from(text: &str) -> Self {
        Input::Text(text.to_string())
    }
}

impl From<String> for Input {
    fn from(text: String) -> Self {
        Input::Text(text)
    }
}

impl From<Vec<u8>> for Input {
    fn from(bytes: Vec<u8>) -> Self {
        Input::Bytes(bytes)
    }
}

impl From<&[u8]> for Input {
    fn from(bytes: &[u8]) -> Self {
        Input::Bytes(bytes.to_vec())
    }
}

impl From<Buffer> for Input {
    fn from(buffer: Buffer) -> Self {
        Input::Buffer(buffer)
    }
}

impl From<SharedReader> for Input {
    fn from(reader: SharedReader) -> Self {
        Input::Reader(reader)
    }
}

impl From<Receiver<String>> for Input {
    fn from(rx: Receiver<String>) -> Self {
        Input::Lines(rx)
    }
}

impl From<Receiver<Vec<u8>>> for Input {
    fn from(rx: Receiver<Vec<u8>>) -> Self {
        Input::Chunks(rx)
    }
}

impl From<Command> for Input {
    fn from(command: Command) -> Self {
        Input::Command(Box::new(command))
    }
}

/// Where a command writes its standard output or standard error
#[derive(Debug, Clone)]
pub enum Output {
    /// Appended to a buffer
    Buffer(Buffer),
    /// Streamed to an async writer, flushed after every chunk
    Writer(SharedWriter),
    /// Sent to a channel one line at a time, without the newline
    Lines(Sender<String>),
    /// Sent to a channel one chunk at a time
    Chunks(Sender<Vec<u8>>),
    /// The host process's corresponding standard stream
    Inherit,
    /// A value of an unsupported kind; fails when the command starts
    Other(Opaque),
}

impl Output {
    /// Classify a dynamically typed value as an output endpoint.
    ///
    /// Values of an unknown type are kept as [`Output::Other`] and rejected
    /// when the command starts.
    pub fn from_value<T: Any + fmt::Debug>(value: T) -> Self {
        let opaque = Opaque::of(&value);
        let value: Box<dyn Any> = Box::new(value);
        let value = match value.downcast::<Output>() {
            Ok(output) => return *output,
            Err(value) => value,
        };
        let value = match value.downcast::<Buffer>() {
            Ok(buffer) => return Output::Buffer(*buffer),
            Err(value) => value,
        };
        let value = match value.downcast::<SharedWriter>() {
            Ok(writer) => return Output::Writer(*writer),
            Err(value) => value,
        };
        let value = match value.downcast::<Sender<String>>() {
            Ok(tx) => return Output::Lines(*tx),
            Err(value) => value,
        };
        match value.downcast::<Sender<Vec<u8>>>() {
            Ok(tx) => Output::Chunks(*tx),
            Err(_) => Output::Other(opaque),
        }
    }

    /// Returns true if both endpoints write into the very same sink
    pub fn same_sink(&self, other: &Output) -> bool {
        match (self, other) {
            (Output::Buffer(a), Output::Buffer(b)) => a.ptr_eq(b),
            (Output::Writer(a), Output::Writer(b)) => a.ptr_eq(b),
            (Output::Lines(a), Output::Lines(b)) => a.same_channel(b),
            (Output::Chunks(a), Output::Chunks(b)) => a.same_channel(b),
            _ => false,
        }
    }
}

impl From<Buffer> for Output {
    fn from(buffer: Buffer) -> Self {
        Output::Buffer(buffer)
    }
}

impl From<SharedWriter> for Output {
    fn from(writer: SharedWriter) -> Self {
        Output::Writer(writer)
    }
}

impl From<Sender<String>> for Output {
    fn from(tx: Sender<String>) -> Self {
        Output::Lines(tx)
    }
}

impl From<Sender<Vec<u8>>> for Output {
    fn from(tx: Sender<Vec<u8>>) -> Self {
        Output::Chunks(tx)
    }
}
