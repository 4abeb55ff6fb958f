//! Failures of the process-level resources the server needs before it can run.

use std::{io, net::SocketAddr, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to prepare directory `{}`", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to listen on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to install tracing subscriber: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn directory(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Directory {
            path: path.into(),
            source,
        }
    }

    pub fn bind(addr: SocketAddr, source: io::Error) -> Self {
        Self::Bind { addr, source }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn directory_errors_name_the_path_and_keep_the_cause() {
        let err = InfraError::directory(
            ".cache/repos",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );

        assert_eq!(err.to_string(), "failed to prepare directory `.cache/repos`");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("denied"));
    }

    #[test]
    fn bind_errors_name_the_address() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().expect("addr");
        let err = InfraError::bind(addr, io::Error::from(io::ErrorKind::AddrInUse));

        assert_eq!(err.to_string(), "failed to listen on 127.0.0.1:8080");
    }
}
