// error.rs — crate error type.
//
// Three kinds are surfaced to callers: accelerator initialisation,
// accelerator execution (with a status code) and unsupported operator
// selections. Configuration validation gets its own variant so a bad
// config never reaches the device.

use std::fmt;

use thiserror::Error;

/// Status code attached to an [`Error::AcceleratorExecution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcceleratorStatus {
    /// The device ran out of memory for a buffer or a submission.
    OutOfMemory,
    /// The backend rejected a command (bad binding, bad dispatch, ...).
    Validation,
    /// Driver or backend internal failure.
    Internal,
    /// Mapping a buffer for host readback failed.
    MapFailed,
    /// The processor's buffers were already released.
    Released,
    /// A tile larger than the allocated capacity was submitted.
    CapacityExceeded,
}

impl AcceleratorStatus {
    /// Stable numeric code, suitable for logs and exit statuses.
    pub fn code(self) -> u32 {
        match self {
            AcceleratorStatus::OutOfMemory => 2,
            AcceleratorStatus::Validation => 3,
            AcceleratorStatus::Internal => 4,
            AcceleratorStatus::MapFailed => 5,
            AcceleratorStatus::Released => 6,
            AcceleratorStatus::CapacityExceeded => 7,
        }
    }
}

impl fmt::Display for AcceleratorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcceleratorStatus::OutOfMemory => "out of memory",
            AcceleratorStatus::Validation => "validation error",
            AcceleratorStatus::Internal => "internal error",
            AcceleratorStatus::MapFailed => "buffer map failed",
            AcceleratorStatus::Released => "buffers released",
            AcceleratorStatus::CapacityExceeded => "tile exceeds buffer capacity",
        };
        write!(f, "{name} (code {})", self.code())
    }
}

/// Errors reported by the block-processing engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Device selection, configuration or buffer allocation failed while
    /// constructing a processor.
    #[error("accelerator initialization failed: {reason}")]
    AcceleratorInit { reason: String },

    /// A transfer, launch or synchronisation failed while processing a tile.
    #[error("accelerator execution failed: {status}: {description}")]
    AcceleratorExecution {
        status: AcceleratorStatus,
        description: String,
    },

    /// The configured operator selection does not name a known stencil.
    #[error("unsupported operation: command `{command}`{}", fmt_algorithm(.algorithm))]
    UnsupportedOperation {
        command: String,
        algorithm: Option<String>,
    },

    /// Processor configuration rejected before touching the device.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn fmt_algorithm(algorithm: &Option<String>) -> String {
    match algorithm {
        Some(a) => format!(" with algorithm `{a}`"),
        None => String::new(),
    }
}

impl Error {
    pub(crate) fn init(reason: impl Into<String>) -> Self {
        Error::AcceleratorInit { reason: reason.into() }
    }

    pub(crate) fn execution(status: AcceleratorStatus, description: impl Into<String>) -> Self {
        Error::AcceleratorExecution {
            status,
            description: description.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
