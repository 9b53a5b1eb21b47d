use thiserror::Error;

#[derive(Error, Debug)]
pub enum ElectionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Process {0} is not in the roster")]
    UnknownProcess(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Frame error: {0}")]
    Frame(#[from] tokio_util::codec::LinesCodecError),

    #[error("Connection closed before a message was received")]
    EmptyFrame,

    #[error("Election engine has stopped")]
    EngineStopped,

    #[error("Election engine queue is full")]
    QueueFull,
}

pub type Result<T> = std::result::Result<T, ElectionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn unknown_process_display() {
        let err = ElectionError::UnknownProcess(5);
        assert_eq!(err.to_string(), "Process 5 is not in the roster");
    }

    #[test]
    fn io_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: ElectionError = io.into();
        assert!(err.to_string().contains("refused"));
        assert!(err.source().is_some());
    }

    #[test]
    fn codec_error_converts() {
        let parse = serde_json::from_str::<u64>("not a number").unwrap_err();
        let err: ElectionError = parse.into();
        assert!(matches!(err, ElectionError::Codec(_)));
    }
}
