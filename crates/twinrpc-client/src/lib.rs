//! TwinRPC Client Library
//!
//! Correlates calls with responses over JSON-RPC 2.0 or XML-RPC. Calls return
//! immediately; results are delivered to per-call completions or to
//! client-wide handlers keyed by method, and local failures are reported
//! through the exception signal instead of being returned.

pub mod call;
pub mod events;
pub mod registry;
pub mod transport;

pub use call::{CallContext, CallSpec, IdSpec};
pub use events::{ClientError, ClientEvent, ClientException};
pub use transport::{HttpTransport, Transport, TransportError};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use call::{ResponseHook, ResultHandler};
use events::EventManager;
use registry::{PendingCall, PendingRegistry};
use twinrpc_core::models::{ClientConfig, Request, RequestId, ResponsePart};
use twinrpc_core::{assemble, BatchEntry, Protocol, Value};

type Hook = Box<dyn FnOnce() + Send>;

/// One payload and the ids it is expected to answer
struct Exchange {
    payload: String,
    ids: Vec<RequestId>,
}

#[derive(Default)]
struct InitState {
    initialized: bool,
    queued: Vec<Vec<CallSpec>>,
    before_initialize: Vec<Hook>,
    on_initialized: Vec<Hook>,
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    registry: Mutex<PendingRegistry>,
    handlers: RwLock<HashMap<String, ResultHandler>>,
    hooks: RwLock<HashMap<String, ResponseHook>>,
    events: EventManager,
    state: Mutex<InitState>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

/// TwinRPC client. Cheap to clone; clones share the pending-call registry.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

impl RpcClient {
    /// Create a client. It queues calls until [`RpcClient::initialize`] runs.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let events = EventManager::new();
        if let Err(e) = config.validate() {
            events.raise(ClientError::Configuration(e.to_string()));
        }

        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                registry: Mutex::new(PendingRegistry::new()),
                handlers: RwLock::new(HashMap::new()),
                hooks: RwLock::new(HashMap::new()),
                events,
                state: Mutex::new(InitState::default()),
                in_flight: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a client that talks HTTP to `config.url`
    pub fn http(config: ClientConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::from_config(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn protocol(&self) -> Protocol {
        self.inner.config.protocol
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub fn on_exception<F>(&self, handler: F)
    where
        F: Fn(&ClientException) + Send + Sync + 'static,
    {
        self.inner.events.set_exception_handler(Arc::new(handler));
    }

    /// Register the client-wide result handler for `method`, used when a call
    /// carries no completion of its own
    pub async fn register_handler<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(&CallContext, Value) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .write()
            .await
            .insert(method.into(), Arc::new(handler));
    }

    /// Transform every result of `method` before it reaches its callback
    pub async fn add_response_hook<F>(&self, method: impl Into<String>, hook: F)
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.inner
            .hooks
            .write()
            .await
            .insert(method.into(), Arc::new(hook));
    }

    pub async fn before_initialize<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock().await;
        if state.initialized {
            return;
        }
        state.before_initialize.push(Box::new(hook));
    }

    /// Run `callback` once the client is initialized, or now if it already is
    pub async fn once_initialized<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.inner.state.lock().await;
            if !state.initialized {
                state.on_initialized.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    pub async fn is_initialized(&self) -> bool {
        self.inner.state.lock().await.initialized
    }

    /// Mark the client ready and replay queued calls in submission order
    pub async fn initialize(&self) {
        let before = {
            let mut state = self.inner.state.lock().await;
            if state.initialized {
                return;
            }
            std::mem::take(&mut state.before_initialize)
        };
        for hook in before {
            hook();
        }

        let (callbacks, replay) = {
            let mut state = self.inner.state.lock().await;
            if state.initialized {
                return;
            }
            state.initialized = true;

            // Register queued calls under the state lock so they keep submission order
            let queued = std::mem::take(&mut state.queued);
            if !queued.is_empty() {
                tracing::debug!("Replaying {} queued call group(s)", queued.len());
            }
            let mut replay = Vec::new();
            for specs in queued {
                replay.extend(self.prepare(specs).await);
            }

            (std::mem::take(&mut state.on_initialized), replay)
        };

        self.inner.events.emit(ClientEvent::Initialized);
        for callback in callbacks {
            callback();
        }

        self.spawn(replay).await;
    }

    /// Issue one or more calls. Returns without waiting for responses.
    pub async fn call(&self, specs: Vec<CallSpec>) {
        if specs.is_empty() {
            return;
        }

        let mut state = self.inner.state.lock().await;
        if !state.initialized {
            tracing::debug!("Client not initialized, queueing {} call(s)", specs.len());
            state.queued.push(specs);
            return;
        }

        let exchanges = self.prepare(specs).await;
        self.spawn(exchanges).await;
        drop(state);
    }

    pub async fn call_one(&self, spec: CallSpec) {
        self.call(vec![spec]).await;
    }

    /// Wait until every exchange issued so far has been processed
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.inner.in_flight.lock().await);
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!("Exchange task failed: {}", e);
                }
            }
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.registry.lock().await.len()
    }

    /// Handle one decoded response part
    pub async fn process_result(&self, part: ResponsePart) {
        if let Some(error) = part.error {
            if !part.id.is_null() {
                self.inner.registry.lock().await.take(&part.id);
            }
            self.inner.events.raise(ClientError::Server(error));
            return;
        }

        let Some(result) = part.result else {
            // Bare envelope, nothing to deliver
            if !part.id.is_null() {
                self.inner.registry.lock().await.take(&part.id);
            }
            return;
        };

        let pending = self.inner.registry.lock().await.take(&part.id);
        let Some(pending) = pending else {
            self.inner.events.raise(ClientError::UnregisteredId(part.id));
            return;
        };

        let PendingCall {
            method,
            scope,
            completion,
        } = pending;
        let context = CallContext {
            id: part.id,
            method,
            scope,
        };

        self.inner.events.emit(ClientEvent::BeforeResult {
            id: context.id.clone(),
            method: context.method.clone(),
        });

        let hook = self.inner.hooks.read().await.get(&context.method).cloned();
        let result = match hook {
            Some(hook) => hook(result),
            None => result,
        };

        match completion {
            Some(completion) => completion(&context, result),
            None => {
                let handler = self.inner.handlers.read().await.get(&context.method).cloned();
                match handler {
                    Some(handler) => handler(&context, result),
                    None => self.inner.events.raise(ClientError::Configuration(format!(
                        "Callback for remote procedure [{}] not defined!",
                        context.method
                    ))),
                }
            }
        }
    }

    /// Decode a whole response payload and process each part in order
    pub async fn process_payload(&self, body: &str) {
        self.process_reply(body, &[]).await;
    }

    /// Like `process_payload`, but an undecodable reply also drops `ids`,
    /// the calls it was meant to answer
    async fn process_reply(&self, body: &str, ids: &[RequestId]) {
        if body.trim().is_empty() {
            return;
        }

        match self.protocol().codec().decode_responses(body) {
            Ok(parts) => {
                for part in parts {
                    self.process_result(part).await;
                }
            }
            Err(e) => {
                self.forget(ids).await;
                self.inner.events.raise(ClientError::Decode(e));
            }
        }
    }

    async fn forget(&self, ids: &[RequestId]) {
        let mut registry = self.inner.registry.lock().await;
        for id in ids {
            registry.take(id);
        }
    }

    /// Register calls and encode them into the payloads to send
    async fn prepare(&self, specs: Vec<CallSpec>) -> Vec<Exchange> {
        let config = &self.inner.config;
        let protocol = config.protocol;
        let codec = protocol.codec();

        let mut entries: Vec<(BatchEntry, RequestId)> = Vec::with_capacity(specs.len());
        {
            let mut registry = self.inner.registry.lock().await;
            for spec in specs {
                let CallSpec {
                    method,
                    params,
                    id,
                    scope,
                    batch_order,
                    completion,
                } = spec;

                if method.is_empty() {
                    self.inner
                        .events
                        .raise(ClientError::Configuration("Method name is empty".to_string()));
                    continue;
                }

                let id = match id {
                    IdSpec::Auto => RequestId::String(Uuid::new_v4().to_string()),
                    IdSpec::Explicit(id) => id,
                    IdSpec::Notification => RequestId::Null,
                };

                if !id.is_null() {
                    let pending = PendingCall {
                        method: method.clone(),
                        scope: scope.unwrap_or_else(|| config.default_scope.clone()),
                        completion,
                    };
                    if registry.register(id.clone(), pending).is_err() {
                        self.inner.events.raise(ClientError::Configuration(format!(
                            "Request id {} is already pending",
                            id
                        )));
                        continue;
                    }
                }

                let request = Request::new(method, params, id.clone());
                entries.push((BatchEntry::new(codec.encode_request(&request), batch_order), id));
            }
        }

        let batched = protocol == Protocol::JsonRpc || config.xml_batch;
        if protocol == Protocol::XmlRpc && config.xml_batch && entries.len() > 1 {
            tracing::warn!(
                "Sending {} calls in an XML-RPC <batch>, which third-party servers may reject",
                entries.len()
            );
        }

        if batched || entries.len() <= 1 {
            let ids: Vec<RequestId> = entries
                .iter()
                .map(|(_, id)| id.clone())
                .filter(|id| !id.is_null())
                .collect();
            let entries: Vec<BatchEntry> = entries.into_iter().map(|(entry, _)| entry).collect();
            return assemble(entries, protocol)
                .map(|payload| vec![Exchange { payload, ids }])
                .unwrap_or_default();
        }

        // One exchange per call, sent in batch order
        entries.sort_by_key(|(entry, _)| entry.order);
        entries
            .into_iter()
            .filter_map(|(entry, id)| {
                let ids = if id.is_null() { Vec::new() } else { vec![id] };
                assemble(vec![entry], protocol).map(|payload| Exchange { payload, ids })
            })
            .collect()
    }

    /// Send exchanges one after another on a background task
    async fn spawn(&self, exchanges: Vec<Exchange>) {
        if exchanges.is_empty() {
            return;
        }

        let client = self.clone();
        let handle = tokio::spawn(async move {
            for exchange in exchanges {
                client.run_exchange(exchange).await;
            }
        });

        let mut in_flight = self.inner.in_flight.lock().await;
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.push(handle);
    }

    async fn run_exchange(&self, exchange: Exchange) {
        let Exchange { payload, ids } = exchange;
        match self.inner.transport.send(self.protocol(), payload).await {
            Ok(body) => self.process_reply(&body, &ids).await,
            Err(e) => {
                self.forget(&ids).await;
                self.inner.events.raise(ClientError::Connection(e.to_string()));
            }
        }
    }
}
