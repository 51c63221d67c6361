/// Errors that can occur when configuring or synchronizing a distributed map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A range was constructed with `low > high`.
    InvalidRange {
        /// Requested lower bound.
        low: String,
        /// Requested upper bound.
        high: String,
    },
    /// The rank is out of bounds or the rank count is zero.
    InvalidRank {
        /// Requested rank.
        rank: usize,
        /// Requested number of ranks.
        n_ranks: usize,
    },
    /// The max load factor must lie in `(0, 1]`.
    InvalidLoadFactor,
    /// More than one rank was configured but no transport was supplied.
    MissingTransport,
    /// The transport failed to deliver or synchronize.
    Transport(String),
    /// A payload could not be encoded or decoded.
    Codec(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidRange { low, high } => {
                write!(f, "invalid range: low ({}) is greater than high ({})", low, high)
            }
            Error::InvalidRank { rank, n_ranks } => {
                write!(f, "rank {} is invalid for {} ranks", rank, n_ranks)
            }
            Error::InvalidLoadFactor => write!(f, "max load factor must be in (0, 1]"),
            Error::MissingTransport => {
                write!(f, "a transport is required when more than one rank is configured")
            }
            Error::Transport(msg) => write!(f, "transport error: {}", msg),
            Error::Codec(msg) => write!(f, "codec error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Codec(err.to_string())
    }
}
