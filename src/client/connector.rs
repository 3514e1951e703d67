//! NTRIP client connection
//!
//! Performs the request/response handshake on any byte transport and then
//! hands out body bytes as they arrive. Every read is bounded by the idle
//! timeout and aborted as soon as the stop signal fires.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;

use super::chunked::ChunkedDecoder;
use super::config::{ClientConfig, MountpointUrl};
use super::request::{build_request, ResponseHead, ResponseKind};
use crate::error::ClientError;

/// An established mountpoint (or sourcetable) connection
#[derive(Debug)]
pub struct NtripClient<S> {
    io: S,
    config: ClientConfig,
    url: MountpointUrl,
    head: ResponseHead,
    /// Raw body bytes not yet handed out
    raw: BytesMut,
    chunked: Option<ChunkedDecoder>,
    stop: watch::Receiver<bool>,
    eof: bool,
    bytes_received: u64,
}

impl NtripClient<TcpStream> {
    /// Connect to the mountpoint and complete the handshake
    pub async fn connect(
        config: ClientConfig,
        stop: watch::Receiver<bool>,
    ) -> Result<Self, ClientError> {
        let url = config.parse_url()?;
        let mut stop = stop;
        let io = open_tcp(&url, &config, &mut stop).await?;
        Self::open(io, config, url, stop, false).await
    }

    /// Fetch the caster sourcetable and return its full body
    pub async fn fetch_sourcetable(config: ClientConfig) -> Result<Bytes, ClientError> {
        let url = config.parse_url()?.sourcetable();
        let (_, mut stop) = watch::channel(false);
        let io = open_tcp(&url, &config, &mut stop).await?;
        Self::request_sourcetable(io, config).await
    }
}

impl<S> NtripClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run the mountpoint handshake over an already open transport
    pub async fn handshake(
        io: S,
        config: ClientConfig,
        stop: watch::Receiver<bool>,
    ) -> Result<Self, ClientError> {
        let url = config.parse_url()?;
        Self::open(io, config, url, stop, false).await
    }

    /// Request the sourcetable over an already open transport
    pub async fn request_sourcetable(io: S, config: ClientConfig) -> Result<Bytes, ClientError> {
        let url = config.parse_url()?.sourcetable();
        // nobody holds the sender, so the request never stops early
        let (_, stop) = watch::channel(false);
        let mut client = Self::open(io, config, url, stop, true).await?;
        client.read_to_end().await
    }

    async fn open(
        mut io: S,
        config: ClientConfig,
        url: MountpointUrl,
        mut stop: watch::Receiver<bool>,
        sourcetable: bool,
    ) -> Result<Self, ClientError> {
        let request = build_request(&url, &config.user_agent);
        tokio::select! {
            biased;
            _ = stopped(&mut stop) => return Err(ClientError::Stopped),
            written = async {
                io.write_all(request.as_bytes()).await?;
                io.flush().await
            } => written?,
        }

        let mut client = Self {
            io,
            raw: BytesMut::with_capacity(config.read_buffer_size),
            config,
            url,
            head: ResponseHead {
                kind: ResponseKind::Http,
                status: 0,
                status_line: String::new(),
                headers: Vec::new(),
            },
            chunked: None,
            stop,
            eof: false,
            bytes_received: 0,
        };

        let end = loop {
            if let Some(end) = ResponseHead::find_end(&client.raw)? {
                break end;
            }
            if client.read_some().await? == 0 {
                return Err(ClientError::ConnectionClosed);
            }
        };
        let head_bytes = client.raw.split_to(end);
        client.head = ResponseHead::parse(&head_bytes)?;
        client.head.check(client.url.mountpoint())?;

        if !sourcetable && client.head.kind == ResponseKind::Sourcetable {
            return Err(ClientError::UnexpectedResponse(format!(
                "mountpoint {} not offered by caster",
                client.url.mountpoint()
            )));
        }
        if client.head.is_chunked() {
            client.chunked = Some(ChunkedDecoder::new());
        }

        tracing::info!(
            host = %client.url.host,
            mountpoint = %client.url.mountpoint(),
            response = %client.head.status_line,
            chunked = client.chunked.is_some(),
            "Caster accepted request"
        );
        Ok(client)
    }

    /// Next run of body bytes. Returns whatever is available, waiting only
    /// when nothing is.
    pub async fn next_chunk(&mut self) -> Result<Bytes, ClientError> {
        loop {
            if let Some(chunk) = self.take_available()? {
                return Ok(chunk);
            }
            if self.eof || self.chunked.as_ref().is_some_and(ChunkedDecoder::is_done) {
                return Err(ClientError::ConnectionClosed);
            }
            if self.read_some().await? == 0 {
                self.eof = true;
            }
        }
    }

    /// Read the body until the caster closes it
    pub async fn read_to_end(&mut self) -> Result<Bytes, ClientError> {
        let limit = self.head.content_length();
        let mut body = BytesMut::new();
        loop {
            if limit.is_some_and(|len| body.len() >= len) {
                break;
            }
            match self.next_chunk().await {
                Ok(chunk) => body.extend_from_slice(&chunk),
                Err(ClientError::ConnectionClosed) => break,
                Err(e) => return Err(e),
            }
        }
        if let Some(len) = limit {
            body.truncate(len);
        }
        Ok(body.freeze())
    }

    pub fn response(&self) -> &ResponseHead {
        &self.head
    }

    pub fn url(&self) -> &MountpointUrl {
        &self.url
    }

    /// Body bytes handed out so far
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    fn take_available(&mut self) -> Result<Option<Bytes>, ClientError> {
        if self.raw.is_empty() {
            return Ok(None);
        }
        let input = self.raw.split();
        let data = match &mut self.chunked {
            Some(decoder) => decoder.decode(&input)?,
            None => input.freeze(),
        };
        if data.is_empty() {
            return Ok(None);
        }
        self.bytes_received += data.len() as u64;
        Ok(Some(data))
    }

    async fn read_some(&mut self) -> Result<usize, ClientError> {
        let idle = self.config.idle_timeout;
        self.raw.reserve(self.config.read_buffer_size);
        tokio::select! {
            biased;
            _ = stopped(&mut self.stop) => Err(ClientError::Stopped),
            read = timeout(idle, self.io.read_buf(&mut self.raw)) => match read {
                Ok(n) => Ok(n?),
                Err(_) => Err(ClientError::IdleTimeout(idle)),
            },
        }
    }
}

async fn open_tcp(
    url: &MountpointUrl,
    config: &ClientConfig,
    stop: &mut watch::Receiver<bool>,
) -> Result<TcpStream, ClientError> {
    let addr = url.addr();
    tracing::debug!(addr = %addr, mountpoint = %url.mountpoint(), "Connecting to caster");

    let connect = tokio::select! {
        biased;
        _ = stopped(stop) => return Err(ClientError::Stopped),
        connect = timeout(config.connect_timeout, TcpStream::connect(&addr)) => connect,
    };
    let socket = match connect {
        Err(_) => return Err(ClientError::ConnectTimeout(config.connect_timeout)),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            return Err(ClientError::ConnectionRefused(addr))
        }
        Ok(result) => result?,
    };
    socket.set_nodelay(true)?;
    Ok(socket)
}

/// Resolves once the stop flag is raised; never if the sender is gone
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
