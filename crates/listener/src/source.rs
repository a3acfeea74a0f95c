//! Where a change batch comes from.

use std::path::PathBuf;

use tokio::io::AsyncReadExt;

use crate::batch::{parse_batch, ListenerError, ParsedBatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSource {
    File(PathBuf),
    Stdin,
}

impl BatchSource {
    /// `-` or no path means standard input.
    pub fn from_arg(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) if path.as_os_str() != "-" => Self::File(path),
            _ => Self::Stdin,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Stdin => "stdin".to_string(),
        }
    }

    pub async fn read(&self) -> Result<Vec<u8>, ListenerError> {
        let read = match self {
            Self::File(path) => tokio::fs::read(path).await,
            Self::Stdin => {
                let mut buf = Vec::new();
                tokio::io::stdin().read_to_end(&mut buf).await.map(|_| buf)
            }
        };
        read.map_err(|source| ListenerError::Read {
            source_name: self.describe(),
            source,
        })
    }

    /// Reads and parses in one step.
    pub async fn load(&self) -> Result<ParsedBatch, ListenerError> {
        let raw = self.read().await?;
        parse_batch(&raw)
    }
}
