//! The RPC adapter between wire requests and a storage backend.

use crate::config::BackendConfig;
use crate::error::{storage_status, ServerResult};
use nskv_protocol::{
    DelReply, DelRequest, ExistsReply, ExistsRequest, GetReply, GetRequest, KeysReply, KeysRequest,
    KvReply, KvRequest, PutReply, PutRequest, Status,
};
use nskv_storage::{DurableKv, HashStore, InMemoryKv, InternalKv, RespExecutor, StorageResult};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Delivers the outcome of one RPC back to the transport.
pub type SendReply<T> = Box<dyn FnOnce(Result<T, Status>) + Send + 'static>;

/// Opens the backend named by `config`.
///
/// For [`BackendConfig::Durable`] this blocks while connecting.
pub fn open_backend(config: &BackendConfig) -> ServerResult<Arc<dyn InternalKv>> {
    let kv: Arc<dyn InternalKv> = match config {
        BackendConfig::Memory => Arc::new(InMemoryKv::new()?),
        BackendConfig::Loopback => Arc::new(DurableKv::new(HashStore::new())?),
        BackendConfig::Durable {
            store_addr,
            connect_timeout,
        } => {
            let executor = RespExecutor::connect(store_addr, *connect_timeout)?;
            Arc::new(DurableKv::new(executor)?)
        }
    };
    tracing::info!(backend = config.kind(), "storage backend opened");
    Ok(kv)
}

/// Turns a backend result into an RPC outcome.
fn resolve<T, R>(
    send_reply: SendReply<R>,
    op: &'static str,
    build: impl FnOnce(T) -> Result<R, Status> + Send + 'static,
) -> nskv_storage::Callback<T>
where
    T: 'static,
    R: 'static,
{
    Box::new(move |result: StorageResult<T>| {
        let outcome = match result {
            Ok(value) => build(value),
            Err(err) => {
                tracing::warn!(op, error = %err, "backend operation failed");
                Err(storage_status(&err))
            }
        };
        send_reply(outcome);
    })
}

/// The key/value RPC service.
///
/// Holds nothing but the active backend. Each handler unpacks its request,
/// calls the backend and resolves `send_reply` from the completion. Only
/// `Get` can fail on a healthy backend (with `NotFound`); every other call
/// succeeds whether or not anything changed.
#[derive(Clone)]
pub struct KvService {
    kv: Arc<dyn InternalKv>,
}

impl KvService {
    /// Creates a service on an already-open backend.
    pub fn new(kv: Arc<dyn InternalKv>) -> Self {
        Self { kv }
    }

    /// Opens the configured backend and creates a service on it.
    pub fn from_config(config: &BackendConfig) -> ServerResult<Self> {
        Ok(Self::new(open_backend(config)?))
    }

    /// Returns the active backend.
    pub fn backend(&self) -> &Arc<dyn InternalKv> {
        &self.kv
    }

    /// Handles a Get request.
    pub fn handle_get(&self, request: GetRequest, send_reply: SendReply<GetReply>) {
        self.kv.get(
            &request.namespace,
            &request.key,
            resolve(send_reply, "get", |value: Option<Vec<u8>>| match value {
                Some(value) => Ok(GetReply { value }),
                None => Err(Status::not_found("Failed to find the key")),
            }),
        );
    }

    /// Handles a Put request.
    pub fn handle_put(&self, request: PutRequest, send_reply: SendReply<PutReply>) {
        self.kv.put(
            &request.namespace,
            &request.key,
            &request.value,
            request.overwrite,
            resolve(send_reply, "put", |newly_added: bool| {
                Ok(PutReply {
                    added_num: i64::from(newly_added),
                })
            }),
        );
    }

    /// Handles a Del request.
    pub fn handle_del(&self, request: DelRequest, send_reply: SendReply<DelReply>) {
        self.kv.del(
            &request.namespace,
            &request.key,
            request.del_by_prefix,
            resolve(send_reply, "del", |deleted_num: i64| {
                Ok(DelReply { deleted_num })
            }),
        );
    }

    /// Handles an Exists request.
    pub fn handle_exists(&self, request: ExistsRequest, send_reply: SendReply<ExistsReply>) {
        self.kv.exists(
            &request.namespace,
            &request.key,
            resolve(send_reply, "exists", |exists: bool| Ok(ExistsReply { exists })),
        );
    }

    /// Handles a Keys request.
    pub fn handle_keys(&self, request: KeysRequest, send_reply: SendReply<KeysReply>) {
        self.kv.keys(
            &request.namespace,
            &request.prefix,
            resolve(send_reply, "keys", |results: Vec<Vec<u8>>| {
                Ok(KeysReply { results })
            }),
        );
    }

    /// Dispatches any request to its handler.
    pub fn handle(&self, request: KvRequest, send_reply: SendReply<KvReply>) {
        match request {
            KvRequest::Get(req) => {
                self.handle_get(req, Box::new(move |r| send_reply(r.map(KvReply::Get))))
            }
            KvRequest::Put(req) => {
                self.handle_put(req, Box::new(move |r| send_reply(r.map(KvReply::Put))))
            }
            KvRequest::Del(req) => {
                self.handle_del(req, Box::new(move |r| send_reply(r.map(KvReply::Del))))
            }
            KvRequest::Exists(req) => {
                self.handle_exists(req, Box::new(move |r| send_reply(r.map(KvReply::Exists))))
            }
            KvRequest::Keys(req) => {
                self.handle_keys(req, Box::new(move |r| send_reply(r.map(KvReply::Keys))))
            }
        }
    }

    /// Handles a request and waits for its reply.
    pub async fn call(&self, request: KvRequest) -> Result<KvReply, Status> {
        let (tx, rx) = oneshot::channel();
        self.handle(
            request,
            Box::new(move |outcome| {
                // The caller may have given up waiting; nothing to do then.
                let _ = tx.send(outcome);
            }),
        );
        rx.await
            .unwrap_or_else(|_| Err(Status::internal("backend dropped the completion")))
    }
}

impl std::fmt::Debug for KvService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use nskv_protocol::StatusCode;
    use nskv_storage::{CommandExecutor, ReplyHandler, StorageError};

    fn memory_service() -> KvService {
        KvService::from_config(&BackendConfig::Memory).unwrap()
    }

    fn put(ns: &str, key: &str, value: &str, overwrite: bool) -> KvRequest {
        KvRequest::Put(PutRequest {
            namespace: ns.into(),
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
            overwrite,
        })
    }

    fn get(ns: &str, key: &str) -> KvRequest {
        KvRequest::Get(GetRequest {
            namespace: ns.into(),
            key: key.as_bytes().to_vec(),
        })
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let service = memory_service();
        let status = service.call(get("ns", "k")).await.unwrap_err();
        assert_eq!(status.code, StatusCode::NotFound);
    }

    #[tokio::test]
    async fn get_returns_empty_value_distinct_from_missing() {
        let service = memory_service();
        service.call(put("ns", "k", "", true)).await.unwrap();
        let reply = service.call(get("ns", "k")).await.unwrap();
        assert_eq!(reply, KvReply::Get(GetReply { value: Vec::new() }));
    }

    #[tokio::test]
    async fn put_reports_added_num() {
        let service = memory_service();
        assert_eq!(
            service.call(put("ns", "k", "a", false)).await.unwrap(),
            KvReply::Put(PutReply { added_num: 1 })
        );
        // Existing key left untouched is still a successful call.
        assert_eq!(
            service.call(put("ns", "k", "b", false)).await.unwrap(),
            KvReply::Put(PutReply { added_num: 0 })
        );
        assert_eq!(
            service.call(get("ns", "k")).await.unwrap(),
            KvReply::Get(GetReply {
                value: b"a".to_vec()
            })
        );
    }

    #[tokio::test]
    async fn del_and_exists() {
        let service = memory_service();
        let del = |prefix: bool| {
            KvRequest::Del(DelRequest {
                namespace: "ns".into(),
                key: b"k".to_vec(),
                del_by_prefix: prefix,
            })
        };
        assert_eq!(
            service.call(del(false)).await.unwrap(),
            KvReply::Del(DelReply { deleted_num: 0 })
        );
        service.call(put("ns", "k", "v", true)).await.unwrap();
        assert_eq!(
            service.call(del(false)).await.unwrap(),
            KvReply::Del(DelReply { deleted_num: 1 })
        );
        let exists = service
            .call(KvRequest::Exists(ExistsRequest {
                namespace: "ns".into(),
                key: b"k".to_vec(),
            }))
            .await
            .unwrap();
        assert_eq!(exists, KvReply::Exists(ExistsReply { exists: false }));
    }

    #[tokio::test]
    async fn keys_on_loopback_backend() {
        let service = KvService::from_config(&BackendConfig::Loopback).unwrap();
        for k in ["a/1", "a/2", "b/1"] {
            service.call(put("ns", k, "x", true)).await.unwrap();
        }
        let reply = service
            .call(KvRequest::Keys(KeysRequest {
                namespace: "ns".into(),
                prefix: b"a/".to_vec(),
            }))
            .await
            .unwrap();
        let KvReply::Keys(KeysReply { mut results }) = reply else {
            panic!("unexpected reply {reply:?}");
        };
        results.sort();
        assert_eq!(results, vec![b"a/1".to_vec(), b"a/2".to_vec()]);
    }

    struct Down;

    impl CommandExecutor for Down {
        fn run_argv_async(&mut self, _argv: Vec<Vec<u8>>, handler: ReplyHandler) {
            handler(Err(StorageError::Unavailable("store is down".into())));
        }
    }

    #[tokio::test]
    async fn backend_failure_is_unavailable() {
        let service = KvService::new(Arc::new(DurableKv::new(Down).unwrap()));
        let status = service.call(put("", "k", "v", true)).await.unwrap_err();
        assert_eq!(status.code, StatusCode::Unavailable);
        let status = service.call(get("", "k")).await.unwrap_err();
        assert_eq!(status.code, StatusCode::Unavailable);
    }

    #[test]
    fn durable_connect_failure_is_reported() {
        let config = BackendConfig::Durable {
            store_addr: "127.0.0.1:1".into(),
            connect_timeout: std::time::Duration::from_millis(200),
        };
        let err = KvService::from_config(&config).unwrap_err();
        assert!(matches!(err, ServerError::Storage(ref e) if e.is_unavailable()));
    }
}
