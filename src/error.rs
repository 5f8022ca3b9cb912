use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
    io::Error as IoError,
};

/// The reason an import failed.
///
/// Decoders accumulate warnings for recoverable defects and only surface one of
/// these kinds when nothing useful can be returned.
#[derive(Debug)]
pub enum ErrorKind {
    /// The buffer is shorter than the smallest valid file of the format.
    FileTooSmall,
    /// The format identifier does not match.
    InvalidMagic,
    /// The format version is unknown and a required section is missing.
    UnsupportedVersion,
    /// A read reached the end of the buffer at top-level.
    UnexpectedEof,
    /// No face survived decoding.
    InvalidGeometry,
    /// The node graph could not be built.
    InvalidHierarchy,
    /// The underlying stream failed.
    Io(IoError),
    /// No decoder is registered for the file extension.
    UnknownExtension,
}

#[derive(Debug)]
pub struct Error {
    format: &'static str,
    kind: ErrorKind,
    message: String,
    offset: Option<usize>,
}

impl Error {
    pub(crate) fn new<M: Into<String>>(kind: ErrorKind, message: M) -> Self {
        Self {
            format: "",
            kind,
            message: message.into(),
            offset: None,
        }
    }

    pub(crate) fn with_format(mut self, format: &'static str) -> Self {
        self.format = format;
        self
    }

    pub(crate) fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The short name of the format whose decoder reported this error, if any.
    pub fn format(&self) -> &str {
        self.format
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Byte position of the decode cursor when the error was raised, if known.
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        if !self.format.is_empty() {
            write!(f, "{}: ", self.format)?;
        }

        write!(f, "{}", self.message)?;

        if let Some(offset) = self.offset {
            write!(f, " (at byte {})", offset)?;
        }

        Ok(())
    }
}

impl StdError for Error {}

impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        let message = error.to_string();
        Self::new(ErrorKind::Io(error), message)
    }
}
