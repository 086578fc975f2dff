//! Error types shared by the transmit and receive chains.

use thiserror::Error;

/// Result type for PHY operations.
pub type PhyResult<T> = Result<T, PhyError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhyError {
    /// A MAC address was not exactly 6 bytes long.
    #[error("MAC address must be 6 bytes but got {0} bytes")]
    InvalidMacAddress(usize),

    /// The MSDU handed to the framer exceeds the 802.11 payload limit.
    #[error("Payload of {length} bytes exceeds the maximum of {max} bytes")]
    PayloadTooLarge { length: usize, max: usize },

    /// The frame needs more symbols or encoded bits than the configured limits allow.
    #[error("Frame too large with {nb_symbols} symbols and {nb_encoded_bits} encoded bits")]
    FrameTooLarge { nb_symbols: usize, nb_encoded_bits: usize },

    /// A stream tag key was absent or present more than once at a frame start.
    #[error("Expected exactly one '{key}' tag but found {found}")]
    MissingMetadata { key: &'static str, found: usize },

    /// The received PSDU did not pass the frame check sequence.
    #[error("Frame check sequence failed with residue 0x{checksum:08X}")]
    ChecksumMismatch { checksum: u32 },

    /// Numeric encoding tag that does not name a known modulation and coding scheme.
    #[error("Unknown encoding {0}")]
    UnknownEncoding(u32),

    /// SIGNAL field rate bits that do not name a known encoding.
    #[error("Unknown rate field 0x{0:02X}")]
    UnknownRateField(u8),

    /// SIGNAL field failed its even parity check.
    #[error("SIGNAL field parity check failed")]
    SignalParity,

    /// Side channel encoding must be QPSK 1/2 or 8PSK 1/2.
    #[error("Unsupported side channel encoding {0}")]
    UnsupportedSideEncoding(u32),

    /// The primary encoding cannot carry a constellation offset.
    #[error("Unsupported primary encoding {0} for the side channel")]
    UnsupportedPrimaryEncoding(u32),

    /// Constellation order is not one of the variable length code tables.
    #[error("Unsupported VLC constellation order {0}")]
    UnsupportedVlcOrder(usize),

    /// Number of backup candidates must lie within [1, number of markers].
    #[error("Number of backup candidates {nb_backup} must be between 1 and {max}")]
    InvalidMarkerBackup { nb_backup: usize, max: usize },

    /// Sector vector is empty or has an entry outside [2, 8].
    #[error("Invalid sector configuration: {0}")]
    InvalidSectorCount(String),

    /// Zero subcarrier decoding only supports one or two nulled subcarriers.
    #[error("Unsupported number of zero subcarriers {0}")]
    UnsupportedZeroCount(usize),

    /// Zero subcarrier symbols past the end of the reference pattern.
    #[error("Reference pattern covers {available} symbols but {required} were requested")]
    ReferencePatternExceeded { required: usize, available: usize },

    /// A prefix code table where one codeword prefixes another.
    #[error("Codeword {0} conflicts with another codeword's prefix")]
    PrefixConflict(usize),

    /// A bit string walked off the prefix code tree.
    #[error("Prefix code has no branch for bit {bit} at node {node}")]
    MissingCodeBranch { node: usize, bit: u8 },

    /// Not enough symbols in the frame to carry the side channel.
    #[error("Side channel needs {required} symbols but frame has {available}")]
    SideChannelTooShort { required: usize, available: usize },

    /// The inbound queue was closed.
    #[error("Queue closed")]
    Closed,
}
