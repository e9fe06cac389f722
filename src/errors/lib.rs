//! Error taxonomy for the annotation engine.
//!
//! A single opaque `Error` with an `ErrorKind` travels across module
//! boundaries; leaf enums carry the precise failure. Failures raised while
//! executing a model additionally carry the model/variant identity so batch
//! reporting can attribute them.
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structural problem with the incoming message; fatal to the whole call.
    Input,
    /// A selected model variant is unusable (e.g. missing code); fatal to
    /// that variant only.
    Configuration,
    /// Failure in the sandbox itself (compile, harness setup), not user code.
    Sandbox,
    /// A model execution ended abnormally past the in-script catch.
    Model,
    /// An external collaborator (catalog, api, libraries) failed.
    Provider,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Input => write!(f, "input"),
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Sandbox => write!(f, "sandbox"),
            ErrorKind::Model => write!(f, "model"),
            ErrorKind::Provider => write!(f, "provider"),
        }
    }
}

pub struct ErrorInner {
    pub kind: ErrorKind,
    pub source: Option<BoxError>,
    pub message: Option<String>,
    /// `<model>@v<variant>` identity when the failure belongs to one model.
    pub model: Option<String>,
}

pub struct Error {
    pub inner: Box<ErrorInner>,
}

impl Error {
    pub fn new<E>(kind: ErrorKind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(ErrorInner {
                kind,
                source: source.map(Into::into),
                message: None,
                model: None,
            }),
        }
    }

    pub fn with_message<E>(kind: ErrorKind, message: String, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(ErrorInner {
                kind,
                source: source.map(Into::into),
                message: Some(message),
                model: None,
            }),
        }
    }

    /// Attach the `<model>@v<variant>` identity to this error.
    pub fn for_model(mut self, model: impl Into<String>) -> Error {
        self.inner.model = Some(model.into());
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }

    pub fn model(&self) -> Option<&str> {
        self.inner.model.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.inner.message.as_deref()
    }

    pub fn is_input(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Input)
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Configuration)
    }

    pub fn is_sandbox(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Sandbox)
    }

    pub fn is_model(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Model)
    }

    pub fn is_provider(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Provider)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("nanoautomata::Error");
        f.field("kind", &self.inner.kind);
        if let Some(ref message) = self.inner.message {
            f.field("message", message);
        }
        if let Some(ref model) = self.inner.model {
            f.field("model", model);
        }
        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref message) = self.inner.message {
            write!(f, "{} error: {}", self.inner.kind, message)?;
        } else {
            write!(f, "{} error", self.inner.kind)?;
        }

        if let Some(ref source) = self.inner.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|e| &**e as &(dyn StdError + 'static))
    }
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("message code is required")]
    MissingCode,
    #[error("context must be ready to annotate {0}")]
    MissingContext(String),
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("tried to execute model variant {0} with missing code")]
    MissingCode(String),
    #[error("invalid variant configuration: {0}")]
    InvalidVariant(String),
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("script compile failed: {0}")]
    Compile(String),
    #[error("script run failed: {0}")]
    Run(String),
    #[error("script produced no result")]
    NoResult,
    #[error("script result is not valid JSON: {0}")]
    InvalidResult(#[source] BoxError),
    #[error("sandbox setup failed: {0}")]
    Setup(String),
}

impl From<InputError> for Error {
    fn from(err: InputError) -> Self {
        Error::new(ErrorKind::Input, Some(err))
    }
}

impl From<ConfigurationError> for Error {
    fn from(err: ConfigurationError) -> Self {
        Error::new(ErrorKind::Configuration, Some(err))
    }
}

impl From<SandboxError> for Error {
    fn from(err: SandboxError) -> Self {
        Error::new(ErrorKind::Sandbox, Some(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::from(SandboxError::InvalidResult(err.to_string().into()))
    }
}

impl Error {
    pub fn provider<E: Into<BoxError>>(source: E) -> Self {
        Error::new(ErrorKind::Provider, Some(source))
    }

    pub fn model_failure(message: String, model: impl Into<String>) -> Self {
        Error::with_message(ErrorKind::Model, message, None::<BoxError>).for_model(model)
    }
}
