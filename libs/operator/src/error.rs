use crate::directory::DirectoryError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All errors possible to occur during reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error originating from the `kube-rs` crate, including API conflicts.
    #[error("Kubernetes reported error: {0}")]
    KubeError(#[source] kube::Error),

    /// The referenced `ConsoleTemplate` does not exist in the console's namespace.
    #[error("console template not found: {0}")]
    TemplateNotFound(String),

    /// The console and its template both omit a command, leaving nothing to run.
    #[error("no command given by console or console template")]
    MissingCommand,

    /// A resource is missing a namespace where one is required by this operator.
    #[error("object {0} has no namespace")]
    MissingNamespace(String),

    /// Client-side validation rejected a field; the caller decides whether to
    /// clamp/continue or surface the error.
    #[error("invalid specification: {0}")]
    InvalidSpecification(String),

    /// The subject resolver failed to expand a directory-group reference.
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// A finalizer-free resource somehow needed a namespace-qualified name and had none.
    #[error("missing object key: {0}")]
    MissingObjectKey(&'static str),

    /// Tracing/telemetry bootstrap failure, surfaced only at startup.
    #[error("invalid trace id")]
    InvalidTraceId,
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::KubeError(e)
    }
}

impl Error {
    /// A low-cardinality label suitable for a Prometheus metric.
    pub fn metric_label(&self) -> String {
        match self {
            Error::KubeError(_) => "kube".to_string(),
            Error::TemplateNotFound(_) => "template_not_found".to_string(),
            Error::MissingCommand => "missing_command".to_string(),
            Error::MissingNamespace(_) => "missing_namespace".to_string(),
            Error::InvalidSpecification(_) => "invalid_specification".to_string(),
            Error::Directory(_) => "directory".to_string(),
            Error::MissingObjectKey(_) => "missing_object_key".to_string(),
            Error::InvalidTraceId => "invalid_trace_id".to_string(),
        }
    }
}
