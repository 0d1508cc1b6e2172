//! Service registry and dispatch of `open` frames.
//!
//! Services are keyed by `(app_id, service)`. The registry is filled at
//! startup, then shared read-only by every session behind an `Arc`.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::connection::ServerConnection;
use crate::error::{RoutingError, ServerError, ServerResult, ServiceError};

/// Future returned by a service handler.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<(), ServiceError>> + Send>>;

/// Type-erased service handler.
pub type ServiceHandler = Arc<dyn Fn(Value, ServerConnection) -> ServiceFuture + Send + Sync>;

/// Table of registered services.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    apps: HashMap<String, HashMap<String, ServiceHandler>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `service` on `app_id`.
    ///
    /// The handler receives the `params` of the `open` frame and the
    /// connection. Returning `Ok` closes the connection (unless the handler
    /// [detached](ServerConnection::detach) it); returning `Err` sends an
    /// `error` frame with the error's message, then `close`.
    pub fn register<F, Fut>(
        &mut self,
        app_id: impl Into<String>,
        service: impl Into<String>,
        handler: F,
    ) -> ServerResult<()>
    where
        F: Fn(Value, ServerConnection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        let app_id = app_id.into();
        let service = service.into();
        let services = self.apps.entry(app_id.clone()).or_default();

        if services.contains_key(&service) {
            return Err(ServerError::DuplicateService { app_id, service });
        }

        let handler: ServiceHandler = Arc::new(move |params, connection| {
            Box::pin(handler(params, connection)) as ServiceFuture
        });
        services.insert(service, handler);
        Ok(())
    }

    /// Looks up a handler.
    pub fn resolve(&self, app_id: &str, service: &str) -> Result<ServiceHandler, RoutingError> {
        let services = self
            .apps
            .get(app_id)
            .ok_or_else(|| RoutingError::AppNotFound {
                app_id: app_id.to_string(),
            })?;

        services
            .get(service)
            .cloned()
            .ok_or_else(|| RoutingError::ServiceNotFound {
                app_id: app_id.to_string(),
                service: service.to_string(),
            })
    }

    /// Registered apps and their services, sorted.
    pub fn catalog(&self) -> BTreeMap<&str, Vec<&str>> {
        self.apps
            .iter()
            .map(|(app, services)| {
                let mut names: Vec<&str> = services.keys().map(String::as_str).collect();
                names.sort_unstable();
                (app.as_str(), names)
            })
            .collect()
    }

    /// Total number of registered services.
    pub fn len(&self) -> usize {
        self.apps.values().map(HashMap::len).sum()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.catalog())
            .finish()
    }
}

/// Starts handlers for accepted `open` frames.
#[derive(Debug, Clone)]
pub(crate) struct Dispatcher {
    registry: Arc<ServiceRegistry>,
}

impl Dispatcher {
    pub(crate) fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    /// Resolves the target and spawns its handler on `tasks`.
    ///
    /// Returns `false` if nothing is registered under that name; the
    /// connection has then already been failed and closed.
    pub(crate) fn dispatch(
        &self,
        connection: ServerConnection,
        app_id: &str,
        service: &str,
        params: Value,
        tasks: &mut JoinSet<()>,
    ) -> bool {
        let handler = match self.registry.resolve(app_id, service) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(connection_id = %connection.id(), "{e}");
                // Client hears about it as error + close on this connection.
                let _ = connection.fail(e.to_string());
                connection.close();
                return false;
            }
        };

        let span = info_span!(
            "service",
            connection_id = %connection.id(),
            app_id,
            service,
        );
        tasks.spawn(run_handler(handler, params, connection).instrument(span));
        true
    }
}

async fn run_handler(handler: ServiceHandler, params: Value, connection: ServerConnection) {
    let handle = connection.clone();
    let outcome = AssertUnwindSafe(async move { handler(params, handle).await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {
            if !connection.is_detached() {
                connection.close();
            }
            debug!("handler finished");
        }
        Ok(Err(e)) => {
            if !connection.is_closed() {
                warn!(error = %e, "handler failed");
                let _ = connection.fail(e.to_string());
            } else {
                debug!(error = %e, "handler failed after close");
            }
            connection.close();
        }
        Err(_) => {
            error!("handler panicked");
            let _ = connection.fail("Internal service error.");
            connection.close();
        }
    }
}
