use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use futures::Future;
use libp2p::request_response;
use libp2p::StreamProtocol;

use crate::{ClientParams, Request, Response, ServerParams};

/// Codec for the header exchange protocol.
///
/// Messages are borsh-encoded and delimited by the end of the stream.
/// Inbound requests are capped by the server's `max_request_size` and
/// inbound responses by the client's. On the serving side, reading a
/// request is bound by the read deadline and writing a response by the
/// write deadline. Exceeding either fails the stream with
/// [`io::ErrorKind::TimedOut`].
#[derive(Clone, Debug)]
pub struct Codec {
    max_request_size: u64,
    max_response_size: u64,
    read_deadline: Duration,
    write_deadline: Duration,
}

impl Codec {
    pub fn new(server: &ServerParams, client: &ClientParams) -> Self {
        Self {
            max_request_size: server.max_request_size.as_u64(),
            max_response_size: client.max_request_size.as_u64(),
            read_deadline: server.read_deadline,
            write_deadline: server.write_deadline,
        }
    }

    pub fn max_request_size(&self) -> u64 {
        self.max_request_size
    }

    pub fn max_response_size(&self) -> u64 {
        self.max_response_size
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(&ServerParams::default(), &ClientParams::default())
    }
}

async fn with_deadline<T>(
    deadline: Duration,
    what: &'static str,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    tokio::time::timeout(deadline, fut).await.map_err(|_| {
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{what} deadline of {deadline:?} exceeded"),
        )
    })?
}

async fn read_limited<T>(io: &mut T, max_size: u64) -> io::Result<Vec<u8>>
where
    T: AsyncRead + Unpin + Send,
{
    let mut vec = Vec::new();
    io.take(max_size + 1).read_to_end(&mut vec).await?;

    if vec.len() as u64 > max_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message exceeds the maximum size of {max_size} bytes"),
        ));
    }

    Ok(vec)
}

#[async_trait]
impl request_response::Codec for Codec {
    type Protocol = StreamProtocol;
    type Request = Request;
    type Response = Response;

    async fn read_request<T>(&mut self, _: &Self::Protocol, io: &mut T) -> io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        let bytes = with_deadline(
            self.read_deadline,
            "read",
            read_limited(io, self.max_request_size),
        )
        .await?;
        Request::decode(&bytes)
    }

    async fn read_response<T>(
        &mut self,
        _: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        let bytes = read_limited(io, self.max_response_size).await?;
        Response::decode(&bytes)
    }

    async fn write_request<T>(
        &mut self,
        _: &Self::Protocol,
        io: &mut T,
        req: Self::Request,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let data = req.encode()?;
        io.write_all(data.as_ref()).await?;

        Ok(())
    }

    async fn write_response<T>(
        &mut self,
        _: &Self::Protocol,
        io: &mut T,
        resp: Self::Response,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let data = resp.encode()?;

        with_deadline(self.write_deadline, "write", async {
            io.write_all(data.as_ref()).await
        })
        .await
    }
}
