//! Definition of errors.

use core::fmt;

use std::error::Error;

pub type Result<T, E = GondolaError> = core::result::Result<T, E>;

#[derive(Debug)]
pub enum GondolaError {
    InvalidModel(InvalidModelError),
    InvalidArgument(InvalidArgumentError),
    InvalidTemplate(InvalidTemplateError),
    InvalidTransition(InvalidTransitionError),
    DecodeError(bincode::error::DecodeError),
    EncodeError(bincode::error::EncodeError),
    IOError(std::io::Error),
}

impl GondolaError {
    pub(crate) fn invalid_model<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidModel(InvalidModelError { msg: msg.into() })
    }

    pub(crate) fn invalid_argument<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidArgument(InvalidArgumentError {
            arg,
            msg: msg.into(),
        })
    }

    pub(crate) fn invalid_template<S>(line: usize, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidTemplate(InvalidTemplateError {
            line,
            msg: msg.into(),
        })
    }

    pub(crate) fn invalid_transition<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidTransition(InvalidTransitionError { msg: msg.into() })
    }
}

impl fmt::Display for GondolaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidModel(e) => e.fmt(f),
            Self::InvalidArgument(e) => e.fmt(f),
            Self::InvalidTemplate(e) => e.fmt(f),
            Self::InvalidTransition(e) => e.fmt(f),
            Self::DecodeError(e) => e.fmt(f),
            Self::EncodeError(e) => e.fmt(f),
            Self::IOError(e) => e.fmt(f),
        }
    }
}

impl Error for GondolaError {}

/// Error used when the model is invalid.
#[derive(Debug)]
pub struct InvalidModelError {
    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidModelError: {}", self.msg)
    }
}

impl Error for InvalidModelError {}

/// Error used when the argument is invalid.
#[derive(Debug)]
pub struct InvalidArgumentError {
    /// Name of the argument.
    pub(crate) arg: &'static str,

    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidArgumentError: {}: {}", self.arg, self.msg)
    }
}

impl Error for InvalidArgumentError {}

/// Error used when a feature template does not compile.
#[derive(Debug)]
pub struct InvalidTemplateError {
    /// Line number of the offending template (1-based).
    pub(crate) line: usize,

    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidTemplateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidTemplateError: line {}: {}", self.line, self.msg)
    }
}

impl Error for InvalidTemplateError {}

/// Error used when a transition cannot be applied to a state.
#[derive(Debug)]
pub struct InvalidTransitionError {
    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidTransitionError: {}", self.msg)
    }
}

impl Error for InvalidTransitionError {}

impl From<bincode::error::DecodeError> for GondolaError {
    fn from(error: bincode::error::DecodeError) -> Self {
        Self::DecodeError(error)
    }
}

impl From<bincode::error::EncodeError> for GondolaError {
    fn from(error: bincode::error::EncodeError) -> Self {
        Self::EncodeError(error)
    }
}

impl From<std::io::Error> for GondolaError {
    fn from(error: std::io::Error) -> Self {
        Self::IOError(error)
    }
}
