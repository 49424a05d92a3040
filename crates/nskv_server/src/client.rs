//! Client for the key/value server.

use crate::error::{ServerError, ServerResult};
use crate::transport::{read_frame, write_frame};
use nskv_protocol::{
    DelRequest, ExistsRequest, GetRequest, KeysRequest, KvReply, KvRequest, ProtocolError,
    PutRequest, RequestFrame, ResponseFrame, DEFAULT_MAX_FRAME_SIZE,
};
use tokio::net::{TcpStream, ToSocketAddrs};

/// A connection to a key/value server.
///
/// Calls are sent one at a time; each waits for its response before the
/// next request goes out.
#[derive(Debug)]
pub struct KvClient {
    stream: TcpStream,
    next_id: u64,
    max_frame_size: usize,
}

impl KvClient {
    /// Connects to a server.
    pub async fn connect(addr: impl ToSocketAddrs) -> ServerResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            next_id: 1,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        })
    }

    /// Sets the maximum frame size for both directions.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Sends a request and waits for its reply.
    ///
    /// A failure status from the server comes back as [`ServerError::Remote`].
    pub async fn call(&mut self, request: KvRequest) -> ServerResult<KvReply> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let payload = RequestFrame::new(id, request).encode()?;
        write_frame(&mut self.stream, &payload, self.max_frame_size).await?;

        let Some(bytes) = read_frame(&mut self.stream, self.max_frame_size).await? else {
            return Err(ProtocolError::Io(std::io::ErrorKind::UnexpectedEof.into()).into());
        };
        let response = ResponseFrame::decode(&bytes)?;
        if response.id != id {
            return Err(ServerError::UnexpectedResponse(format!(
                "response id {} does not match request id {id}",
                response.id
            )));
        }
        response.result.map_err(ServerError::Remote)
    }

    /// Reads a value. A missing key is `Ok(None)`.
    pub async fn get(&mut self, namespace: &str, key: &[u8]) -> ServerResult<Option<Vec<u8>>> {
        let request = KvRequest::Get(GetRequest {
            namespace: namespace.to_owned(),
            key: key.to_vec(),
        });
        match self.call(request).await {
            Ok(KvReply::Get(reply)) => Ok(Some(reply.value)),
            Ok(other) => Err(mismatch("get", &other)),
            Err(ServerError::Remote(status)) if status.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Writes a value. Returns true if the key was newly added.
    pub async fn put(
        &mut self,
        namespace: &str,
        key: &[u8],
        value: &[u8],
        overwrite: bool,
    ) -> ServerResult<bool> {
        let request = KvRequest::Put(PutRequest {
            namespace: namespace.to_owned(),
            key: key.to_vec(),
            value: value.to_vec(),
            overwrite,
        });
        match self.call(request).await? {
            KvReply::Put(reply) => Ok(reply.added_num > 0),
            other => Err(mismatch("put", &other)),
        }
    }

    /// Deletes a key, or every key starting with `key` when `by_prefix`.
    /// Returns the number of keys removed.
    pub async fn del(&mut self, namespace: &str, key: &[u8], by_prefix: bool) -> ServerResult<i64> {
        let request = KvRequest::Del(DelRequest {
            namespace: namespace.to_owned(),
            key: key.to_vec(),
            del_by_prefix: by_prefix,
        });
        match self.call(request).await? {
            KvReply::Del(reply) => Ok(reply.deleted_num),
            other => Err(mismatch("del", &other)),
        }
    }

    /// Checks whether a key is present.
    pub async fn exists(&mut self, namespace: &str, key: &[u8]) -> ServerResult<bool> {
        let request = KvRequest::Exists(ExistsRequest {
            namespace: namespace.to_owned(),
            key: key.to_vec(),
        });
        match self.call(request).await? {
            KvReply::Exists(reply) => Ok(reply.exists),
            other => Err(mismatch("exists", &other)),
        }
    }

    /// Lists keys starting with `prefix`, in no particular order.
    pub async fn keys(&mut self, namespace: &str, prefix: &[u8]) -> ServerResult<Vec<Vec<u8>>> {
        let request = KvRequest::Keys(KeysRequest {
            namespace: namespace.to_owned(),
            prefix: prefix.to_vec(),
        });
        match self.call(request).await? {
            KvReply::Keys(reply) => Ok(reply.results),
            other => Err(mismatch("keys", &other)),
        }
    }
}

fn mismatch(op: &str, reply: &KvReply) -> ServerError {
    ServerError::UnexpectedResponse(format!("{op} answered with {reply:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nskv_protocol::{PutReply, Status};
    use tokio::net::TcpListener;

    /// Accepts one connection and answers each request with `answer`.
    async fn scripted_server(
        answer: impl Fn(RequestFrame) -> ResponseFrame + Send + 'static,
    ) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            while let Some(bytes) = read_frame(&mut stream, DEFAULT_MAX_FRAME_SIZE).await.unwrap() {
                let response = answer(RequestFrame::decode(&bytes).unwrap());
                let encoded = response.encode().unwrap();
                write_frame(&mut stream, &encoded, DEFAULT_MAX_FRAME_SIZE)
                    .await
                    .unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn mismatched_id_is_rejected() {
        let addr = scripted_server(|req| {
            ResponseFrame::new(req.id + 100, Ok(KvReply::Put(PutReply { added_num: 1 })))
        })
        .await;
        let mut client = KvClient::connect(addr).await.unwrap();
        let err = client.put("", b"k", b"v", true).await.unwrap_err();
        assert!(matches!(err, ServerError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn wrong_reply_kind_is_rejected() {
        let addr = scripted_server(|req| {
            ResponseFrame::new(req.id, Ok(KvReply::Put(PutReply { added_num: 1 })))
        })
        .await;
        let mut client = KvClient::connect(addr).await.unwrap();
        let err = client.exists("", b"k").await.unwrap_err();
        assert!(matches!(err, ServerError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn remote_status_surfaces() {
        let addr = scripted_server(|req| {
            ResponseFrame::new(req.id, Err(Status::unavailable("down")))
        })
        .await;
        let mut client = KvClient::connect(addr).await.unwrap();
        match client.get("", b"k").await.unwrap_err() {
            ServerError::Remote(status) => assert_eq!(status.message, "down"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn ids_increase_per_call() {
        let addr = scripted_server(|req| {
            ResponseFrame::new(
                req.id,
                Ok(KvReply::Put(PutReply {
                    added_num: req.id as i64,
                })),
            )
        })
        .await;
        let mut client = KvClient::connect(addr).await.unwrap();
        for _ in 0..3 {
            assert!(client.put("", b"k", b"v", true).await.unwrap());
        }
        assert_eq!(client.next_id, 4);
    }
}
