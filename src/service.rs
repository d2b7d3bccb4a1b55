//! Service registry: the interface between the server pipeline and the code
//! that actually answers calls.
//!
//! The pipeline only knows the [`ServiceRegistry`] trait. For every request it
//! resolves the `"<Service>.<Method>"` name from the header into an
//! [`Invoker`], which decodes the argument body into the type the method
//! expects, runs the method and encodes the reply with the connection's
//! codec. Argument and reply types are therefore fixed at registration time,
//! while method names are still bound late, from what arrives on the wire.
//!
//! [`Services`] is the registry shipped with the crate: a map of named
//! [`Service`]s, each holding typed async handlers.
//!
//! ```ignore
//! let mut services = Services::new();
//! services.register(
//!     Service::new("Arith").method("Sum", |args: (i64, i64)| async move {
//!         Ok::<_, String>(args.0 + args.1)
//!     }),
//! )?;
//! let server = Server::new(services);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{DispatchError, RegisterError};
use crate::protocol::codec::CodecType;

/// A resolved method, ready to be called with an encoded argument.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Decodes `argv` with `codec_type`, runs the method and returns the
    /// encoded reply.
    async fn invoke(&self, codec_type: CodecType, argv: &[u8]) -> Result<Vec<u8>, DispatchError>;
}

/// Maps `"<Service>.<Method>"` names to invokers.
pub trait ServiceRegistry: Send + Sync + 'static {
    fn resolve(&self, service_method: &str) -> Result<Arc<dyn Invoker>, DispatchError>;
}

/// Type-erased handler of one method.
trait Handler: Send + Sync + 'static {
    fn call(
        &self,
        codec_type: CodecType,
        argv: &[u8],
    ) -> BoxFuture<'static, Result<Vec<u8>, DispatchError>>;
}

/// Wrapper that decodes the argument before calling the handler and encodes
/// its reply afterwards.
struct TypedHandler<F, A, R, E, Fut> {
    handler: F,
    _phantom: PhantomData<fn(A) -> (Fut, R, E)>,
}

impl<F, A, R, E, Fut> Handler for TypedHandler<F, A, R, E, Fut>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: serde::Serialize + Send + 'static,
    E: fmt::Display + Send + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    fn call(
        &self,
        codec_type: CodecType,
        argv: &[u8],
    ) -> BoxFuture<'static, Result<Vec<u8>, DispatchError>> {
        let args: A = match codec_type.decode_body(argv) {
            Ok(args) => args,
            Err(e) => {
                let err = DispatchError::InvalidArgument(e.to_string());
                return Box::pin(async move { Err(err) });
            }
        };

        let fut = (self.handler)(args);
        Box::pin(async move {
            let reply = fut.await.map_err(|e| DispatchError::Failed(e.to_string()))?;
            codec_type.encode_body(&reply).map_err(|e| DispatchError::InvalidReply(e.to_string()))
        })
    }
}

/// One registered method.
pub struct Method {
    name: String,
    handler: Box<dyn Handler>,
    num_calls: AtomicU64,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How many times the method has been invoked.
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("num_calls", &self.num_calls())
            .finish()
    }
}

#[async_trait]
impl Invoker for Method {
    async fn invoke(&self, codec_type: CodecType, argv: &[u8]) -> Result<Vec<u8>, DispatchError> {
        self.num_calls.fetch_add(1, Ordering::Relaxed);
        self.handler.call(codec_type, argv).await
    }
}

/// A named group of methods.
#[derive(Debug)]
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<Method>>,
}

impl Service {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), methods: HashMap::new() }
    }

    /// Adds a method.
    ///
    /// `handler` receives the decoded argument and returns the reply, or an
    /// error whose message is sent back to the caller. Registering the same
    /// name twice keeps the last handler.
    pub fn method<F, A, R, E, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        A: DeserializeOwned + Send + 'static,
        R: serde::Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let method = Method {
            name: name.to_string(),
            handler: Box::new(TypedHandler { handler, _phantom: PhantomData }),
            num_calls: AtomicU64::new(0),
        };
        if self.methods.insert(name.to_string(), Arc::new(method)).is_some() {
            warn!("rpc: method {}.{} registered twice", self.name, name);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_method(&self, name: &str) -> Option<&Arc<Method>> {
        self.methods.get(name)
    }
}

/// Registry of services keyed by service name.
#[derive(Debug, Default)]
pub struct Services {
    services: HashMap<String, Service>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `service`. Fails if a service with the same name exists.
    pub fn register(&mut self, service: Service) -> Result<(), RegisterError> {
        if service.name.is_empty() {
            return Err(RegisterError::EmptyServiceName);
        }
        if self.services.contains_key(&service.name) {
            return Err(RegisterError::DuplicateService(service.name));
        }
        self.services.insert(service.name.clone(), service);
        Ok(())
    }

    pub fn get_service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }
}

impl ServiceRegistry for Services {
    /// Splits at the last `.`: everything before it names the service.
    fn resolve(&self, service_method: &str) -> Result<Arc<dyn Invoker>, DispatchError> {
        let Some((service_name, method_name)) = service_method.rsplit_once('.') else {
            return Err(DispatchError::IllFormed(service_method.to_string()));
        };
        let service = self
            .services
            .get(service_name)
            .ok_or_else(|| DispatchError::UnknownService(service_name.to_string()))?;
        let method = service
            .methods
            .get(method_name)
            .ok_or_else(|| DispatchError::UnknownMethod(method_name.to_string()))?;
        Ok(method.clone() as Arc<dyn Invoker>)
    }
}
