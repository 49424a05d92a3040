//! RPC request and reply messages.

use crate::error::{ProtocolError, ProtocolResult};
use crate::status::Status;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Reads the value of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    /// Namespace; empty for the global keyspace.
    pub namespace: String,
    /// Key within the namespace.
    #[serde(with = "crate::bytes")]
    pub key: Vec<u8>,
}

/// Reply to [`GetRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetReply {
    /// The stored value.
    #[serde(with = "crate::bytes")]
    pub value: Vec<u8>,
}

/// Stores a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRequest {
    /// Namespace; empty for the global keyspace.
    pub namespace: String,
    /// Key within the namespace.
    #[serde(with = "crate::bytes")]
    pub key: Vec<u8>,
    /// Value to store.
    #[serde(with = "crate::bytes")]
    pub value: Vec<u8>,
    /// Replace an existing value instead of leaving it untouched.
    pub overwrite: bool,
}

/// Reply to [`PutRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutReply {
    /// 1 if the key was newly inserted, 0 if it already existed.
    pub added_num: i64,
}

/// Deletes a key or every key under a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelRequest {
    /// Namespace; empty for the global keyspace.
    pub namespace: String,
    /// Key, or prefix when `del_by_prefix` is set.
    #[serde(with = "crate::bytes")]
    pub key: Vec<u8>,
    /// Treat `key` as a prefix.
    pub del_by_prefix: bool,
}

/// Reply to [`DelRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelReply {
    /// Number of keys removed.
    pub deleted_num: i64,
}

/// Checks whether a key exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistsRequest {
    /// Namespace; empty for the global keyspace.
    pub namespace: String,
    /// Key within the namespace.
    #[serde(with = "crate::bytes")]
    pub key: Vec<u8>,
}

/// Reply to [`ExistsRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistsReply {
    /// Whether the key exists.
    pub exists: bool,
}

/// Lists keys under a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysRequest {
    /// Namespace; empty for the global keyspace.
    pub namespace: String,
    /// Key prefix within the namespace.
    #[serde(with = "crate::bytes")]
    pub prefix: Vec<u8>,
}

/// Reply to [`KeysRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeysReply {
    /// Matching keys with the namespace stripped, in no particular order.
    #[serde(with = "crate::bytes::list")]
    pub results: Vec<Vec<u8>>,
}

/// Any RPC request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvRequest {
    /// Get request.
    Get(GetRequest),
    /// Put request.
    Put(PutRequest),
    /// Del request.
    Del(DelRequest),
    /// Exists request.
    Exists(ExistsRequest),
    /// Keys request.
    Keys(KeysRequest),
}

impl KvRequest {
    /// Returns the operation name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            KvRequest::Get(_) => "get",
            KvRequest::Put(_) => "put",
            KvRequest::Del(_) => "del",
            KvRequest::Exists(_) => "exists",
            KvRequest::Keys(_) => "keys",
        }
    }

    /// Returns the namespace the request addresses.
    pub fn namespace(&self) -> &str {
        match self {
            KvRequest::Get(r) => &r.namespace,
            KvRequest::Put(r) => &r.namespace,
            KvRequest::Del(r) => &r.namespace,
            KvRequest::Exists(r) => &r.namespace,
            KvRequest::Keys(r) => &r.namespace,
        }
    }
}

/// Any successful RPC reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvReply {
    /// Get reply.
    Get(GetReply),
    /// Put reply.
    Put(PutReply),
    /// Del reply.
    Del(DelReply),
    /// Exists reply.
    Exists(ExistsReply),
    /// Keys reply.
    Keys(KeysReply),
}

/// A request as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Client-chosen id echoed in the response.
    pub id: u64,
    /// The request.
    pub request: KvRequest,
}

/// A response as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Id of the request this answers.
    pub id: u64,
    /// The reply, or the status the call failed with.
    pub result: Result<KvReply, Status>,
}

impl RequestFrame {
    /// Creates a request frame.
    pub fn new(id: u64, request: KvRequest) -> Self {
        Self { id, request }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

impl ResponseFrame {
    /// Creates a response frame.
    pub fn new(id: u64, result: Result<KvReply, Status>) -> Self {
        Self { id, result }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;

    #[test]
    fn put_request_roundtrip() {
        let frame = RequestFrame::new(
            7,
            KvRequest::Put(PutRequest {
                namespace: "jobs".into(),
                key: b"job/1".to_vec(),
                value: vec![0, 159, 146, 150],
                overwrite: true,
            }),
        );
        let decoded = RequestFrame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn not_found_response_roundtrip() {
        let frame = ResponseFrame::new(3, Err(Status::not_found("Failed to find the key")));
        let decoded = ResponseFrame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded.id, 3);
        assert_eq!(decoded.result.unwrap_err().code, StatusCode::NotFound);
    }

    #[test]
    fn keys_reply_uses_byte_strings() {
        let frame = ResponseFrame::new(
            1,
            Ok(KvReply::Keys(KeysReply {
                results: vec![b"a/1".to_vec(), b"a/2".to_vec()],
            })),
        );
        let encoded = frame.encode().unwrap();
        // CBOR major type 2 (byte string) of length 3 followed by "a/1".
        assert!(encoded.windows(4).any(|w| w == [0x43, b'a', b'/', b'1']));
        assert_eq!(ResponseFrame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn garbage_fails_to_decode() {
        let err = RequestFrame::decode(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn request_accessors() {
        let req = KvRequest::Keys(KeysRequest {
            namespace: "n".into(),
            prefix: b"k".to_vec(),
        });
        assert_eq!(req.name(), "keys");
        assert_eq!(req.namespace(), "n");
    }
}
