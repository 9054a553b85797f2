use std::io;
use thiserror::Error;

/// Everything that can go wrong while mapping, parsing or lazily decoding a heap dump.
///
/// Offsets are absolute positions in the dump file.
#[derive(Debug, Error)]
pub enum HprofError {
    #[error("I/O error at offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: io::Error,
    },
    #[error("read of {len} bytes at offset {offset} runs past end of data ({limit} bytes)")]
    OutOfBounds { offset: u64, len: u64, limit: u64 },
    #[error("malformed hprof at offset {offset}: {message}")]
    Format { offset: u64, message: String },
    #[error("unsupported identifier size {0}, expected 4 or 8")]
    UnsupportedIdSize(u32),
}

impl HprofError {
    pub(crate) fn format<S: Into<String>>(offset: u64, message: S) -> HprofError {
        HprofError::Format {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn io(offset: u64, source: io::Error) -> HprofError {
        HprofError::Io { offset, source }
    }

    /// Translate a nom failure while decoding the structure named `what` that starts at `offset`.
    pub(crate) fn from_nom<I>(
        offset: u64,
        what: &str,
        err: nom::Err<(I, nom::error::ErrorKind)>,
    ) -> HprofError {
        match err {
            nom::Err::Incomplete(needed) => HprofError::format(
                offset,
                format!("truncated {} ({:?} more bytes needed)", what, needed),
            ),
            nom::Err::Error((_, kind)) | nom::Err::Failure((_, kind)) => {
                HprofError::format(offset, format!("could not decode {}: {:?}", what, kind))
            }
        }
    }

    /// The file offset the failure was detected at, when known.
    pub fn offset(&self) -> Option<u64> {
        match self {
            HprofError::Io { offset, .. } => Some(*offset),
            HprofError::OutOfBounds { offset, .. } => Some(*offset),
            HprofError::Format { offset, .. } => Some(*offset),
            HprofError::UnsupportedIdSize(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nom_error_keeps_offset() {
        let err = HprofError::from_nom(
            42,
            "load class",
            nom::Err::Error((&b""[..], nom::error::ErrorKind::Eof)),
        );

        assert_eq!(Some(42), err.offset());
        assert!(format!("{}", err).contains("load class"));
    }
}
