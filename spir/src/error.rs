use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        $crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic error type covering every failure this library can return.
///
/// Normal analysis flow never produces an `Error`: the ID allocator, the
/// lattice operations and the fixpoint driver signal exhaustion or absence
/// through sentinel returns (`EntityId::NULL`, `false`, `changed` flags).
/// Errors arise at the edges, when persisted SPIR input is loaded, written,
/// or linked.
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged or does not follow the SPIR container layout.
    ///
    /// Includes the source location where the malformation was detected,
    /// captured by the internal `malformed_error!` macro.
    #[error("Malformed SPIR data: {message} ({file}:{line})")]
    Malformed {
        /// Description of what was malformed.
        message: String,
        /// Source file where the error was raised.
        file: &'static str,
        /// Source line where the error was raised.
        line: u32,
    },

    /// A read past the end of the input buffer was attempted.
    #[error("Attempted to read beyond the end of the input")]
    OutOfBounds,

    /// The container version is newer than this library understands.
    #[error("Unsupported SPIR container version: {0}")]
    NotSupported(u8),

    /// Two translation units define the same symbol.
    ///
    /// Raised while linking when a function with a body is defined in more
    /// than one input. Declarations without a definition unify silently.
    #[error("Duplicate definition of symbol `{0}`")]
    DuplicateSymbol(String),

    /// Filesystem I/O failed.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
