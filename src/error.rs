//! Error types for the bitstream engine.

use crate::huffman::HuffmanCompileError;

/// The crate-wide result alias. Every public bitstream operation returns
/// this rather than panicking; a production caller wraps a read/write
/// session in [`crate::reader::BitstreamReader::barrier`] /
/// [`crate::writer::BitstreamWriter::barrier`] and decides how to recover.
pub type Result<T> = std::result::Result<T, BitstreamError>;

/// Every failure kind the engine can report, plus the Huffman compiler's
/// own error surface (kept distinct since compile errors are reported as
/// values, not aborts).
#[derive(thiserror::Error, Debug)]
pub enum BitstreamError {
    /// The backend could not supply a requested byte.
    #[error("end of stream")]
    EndOfStream,

    /// The backend (file, external callback) signalled a failure.
    #[error("backend I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// A writer position operation was attempted while not byte-aligned.
    #[error("stream is not byte-aligned")]
    NotByteAligned,

    /// An invalid parameter was supplied: bad unary stop bit, seeking an
    /// unseekable backend, an unknown Huffman symbol on encode, or
    /// unreading with no buffered bit to push back onto.
    #[error("contract violation: {0}")]
    ContractViolation(&'static str),

    /// A Huffman table failed to compile.
    #[error("huffman table compile error: {0}")]
    Huffman(#[from] HuffmanCompileError),

    /// The stream was already closed.
    #[error("stream is closed")]
    Closed,

    /// A position handle was used on a reader/writer other than the one
    /// that produced it, or was used after its originating recorder was
    /// reset.
    #[error("position handle is stale or belongs to a different stream")]
    StalePosition,
}
