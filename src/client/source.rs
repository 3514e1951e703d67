//! Byte chunk sources feeding a stream pipeline

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use super::connector::NtripClient;
use crate::error::ClientError;

/// Anything that yields stream bytes chunk by chunk.
///
/// `next_chunk` returns whatever bytes are available, waiting only when
/// none are. An error ends the stream; [`ClientError::ConnectionClosed`]
/// is the orderly end.
pub trait ChunkSource: Send {
    fn next_chunk(&mut self) -> impl Future<Output = Result<Bytes, ClientError>> + Send;
}

impl<S> ChunkSource for NtripClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn next_chunk(&mut self) -> impl Future<Output = Result<Bytes, ClientError>> + Send {
        NtripClient::next_chunk(self)
    }
}

/// Replays pre-recorded chunks, e.g. a captured stream or a test vector
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    chunks: VecDeque<Bytes>,
    pace: Option<Duration>,
}

impl ReplaySource {
    pub fn new<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            pace: None,
        }
    }

    /// Split one recording into chunks of at most `size` bytes
    pub fn split(data: impl Into<Bytes>, size: usize) -> Self {
        let mut data: Bytes = data.into();
        let size = size.max(1);
        let mut chunks = VecDeque::new();
        while !data.is_empty() {
            let n = size.min(data.len());
            chunks.push_back(data.split_to(n));
        }
        Self { chunks, pace: None }
    }

    /// Sleep this long before handing out each chunk
    pub fn pace(mut self, delay: Duration) -> Self {
        self.pace = Some(delay);
        self
    }

    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

impl ChunkSource for ReplaySource {
    async fn next_chunk(&mut self) -> Result<Bytes, ClientError> {
        if let Some(delay) = self.pace {
            tokio::time::sleep(delay).await;
        }
        self.chunks.pop_front().ok_or(ClientError::ConnectionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_in_order() {
        let mut source = ReplaySource::new(vec![&b"ab"[..], &b"cd"[..]]);
        assert_eq!(&source.next_chunk().await.unwrap()[..], b"ab");
        assert_eq!(&source.next_chunk().await.unwrap()[..], b"cd");
        assert!(matches!(
            source.next_chunk().await,
            Err(ClientError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_split() {
        let mut source = ReplaySource::split(Bytes::from_static(b"abcdefg"), 3);
        assert_eq!(source.remaining(), 3);
        let mut all = Vec::new();
        while let Ok(chunk) = source.next_chunk().await {
            assert!(chunk.len() <= 3);
            all.extend_from_slice(&chunk);
        }
        assert_eq!(all, b"abcdefg");
    }
}
