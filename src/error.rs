use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown force feedback effect type {0:#x}")]
    UnknownEffectType(u16),
    #[error("unknown periodic waveform {0:#x}")]
    UnknownWaveform(u16),
    #[error("trace line {line}: {kind}")]
    Parse {
        line: usize,
        #[source]
        kind: ParseError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

/// Why a single trace line could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing timestamp")]
    MissingTimestamp,
    #[error("bad timestamp {0:?}")]
    BadTimestamp(String),
    #[error("missing direction marker")]
    MissingMarker,
    #[error("unknown direction marker {0:?}")]
    UnknownMarker(String),
    #[error("missing operation keyword")]
    MissingKeyword,
    #[error("unknown operation {0:?}")]
    UnknownKeyword(String),
    #[error("missing argument for {0}")]
    MissingArgument(&'static str),
    #[error("value {value:?} for {key} is not a number in range")]
    BadNumber { key: String, value: String },
    #[error("malformed parameter {0:?}")]
    BadParameter(String),
    #[error("unknown effect type {0:?}")]
    UnknownEffectType(String),
    #[error("unknown waveform {0:?}")]
    UnknownWaveform(String),
    #[error("unknown feature {0:?}")]
    UnknownFeature(String),
}
