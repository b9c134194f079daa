//! Listener supervision: a fixed set of static HTTP listeners plus at most
//! one dynamically managed slot, all funnelling exits into one channel.
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use log::{debug, info};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::Notify;

use crate::config::AppConfig;
use crate::error::RebindResult;
use crate::http::router;
use crate::session::SessionStore;

/// Delivered on the shared channel when an accept loop returns.
#[derive(Debug)]
pub struct ListenerExit {
    pub port: u16,
    pub error: String,
}

// handle kept in the inventory; dropping it does not stop the listener,
// signalling its Notify does
#[derive(Debug)]
struct ListenerHandle {
    port: u16,
    shutdown: Arc<Notify>,
}

#[derive(Debug, Default)]
struct Inventory {
    static_listeners: Vec<ListenerHandle>,
    dynamic_listener: Option<ListenerHandle>,
}

/// Owns every HTTP listener. The router reaches back into it for the
/// `/servers` endpoint, so it also carries the shared collaborators the
/// router needs.
pub struct HttpServerPool {
    pub config: Arc<AppConfig>,
    pub store: Arc<SessionStore>,
    inventory: RwLock<Inventory>,
    exit_tx: mpsc::UnboundedSender<ListenerExit>,
}

impl HttpServerPool {
    /// The receiver side carries every listener exit; the caller decides how
    /// loudly to log them.
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<SessionStore>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ListenerExit>) {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(HttpServerPool {
            config,
            store,
            inventory: RwLock::new(Inventory::default()),
            exit_tx,
        });
        (pool, exit_rx)
    }

    /// Bind and serve one listener. Bind failures surface before any state
    /// changes. A dynamic listener on a port some static listener already
    /// owns is never bound at all: the slot stays empty and the call still
    /// succeeds.
    // boxed so the recursive call chain (accept_loop -> handle_connection ->
    // put_dynamic -> replace_dynamic -> start_listener) doesn't leave rustc
    // trying to resolve a self-referential opaque `impl Future` type
    pub fn start_listener(
        self: Arc<Self>,
        port: u16,
        dynamic: bool,
    ) -> Pin<Box<dyn Future<Output = RebindResult<()>> + Send>> {
        Box::pin(async move {
            // the conflict check has to run before bind: the static listener
            // holds the port, so binding it again could only fail
            if dynamic {
                let inventory = self.inventory.read().expect("inventory lock poisoned");
                if inventory
                    .static_listeners
                    .iter()
                    .any(|handle| handle.port == port)
                {
                    debug!(
                        "port {} already owned by a static listener, dynamic slot left empty",
                        port
                    );
                    return Ok(());
                }
            }

            let listener = TcpListener::bind(("0.0.0.0", port)).await?;

            // with port 0 the inventory must carry the actually bound port
            let port = listener.local_addr()?.port();

            let shutdown = Arc::new(Notify::new());
            {
                let mut inventory = self.inventory.write().expect("inventory lock poisoned");

                if dynamic {
                    inventory.dynamic_listener = Some(ListenerHandle {
                        port,
                        shutdown: Arc::clone(&shutdown),
                    });
                } else {
                    inventory.static_listeners.push(ListenerHandle {
                        port,
                        shutdown: Arc::clone(&shutdown),
                    });
                }
            }

            tokio::spawn(async move {
                self.accept_loop(listener, port, shutdown).await;
            });
            Ok(())
        })
    }

    /// Static ports in start order, then the dynamic port if the slot is
    /// filled. This is exactly the `/servers` enumeration order.
    pub fn ports(&self) -> (Vec<u16>, Option<u16>) {
        let inventory = self.inventory.read().expect("inventory lock poisoned");
        (
            inventory
                .static_listeners
                .iter()
                .map(|handle| handle.port)
                .collect(),
            inventory.dynamic_listener.as_ref().map(|handle| handle.port),
        )
    }

    /// Swap the dynamic listener: stop the current one if present, then
    /// start on the requested port.
    pub async fn replace_dynamic(self: Arc<Self>, port: u16) -> RebindResult<()> {
        if let Some(old) = self.stop_dynamic() {
            info!("stopped dynamic http listener on port {}", old);
        }
        self.start_listener(port, true).await
    }

    // take the slot and signal its accept loop; the exit shows up on the
    // shared channel like any other
    fn stop_dynamic(&self) -> Option<u16> {
        let handle = self
            .inventory
            .write()
            .expect("inventory lock poisoned")
            .dynamic_listener
            .take()?;
        handle.shutdown.notify_one();
        Some(handle.port)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, port: u16, shutdown: Arc<Notify>) {
        info!("http listener on port {}", port);

        let exit = loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    break ListenerExit {
                        port,
                        error: "listener closed".to_string(),
                    };
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let pool = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(e) = router::handle_connection(stream, pool).await {
                                debug!("http client {}: {:?}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        break ListenerExit {
                            port,
                            error: e.to_string(),
                        };
                    }
                }
            }
        };

        // receivers may be gone at shutdown; nothing left to report to
        let _ = self.exit_tx.send(exit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(allow_dynamic: bool) -> (Arc<HttpServerPool>, mpsc::UnboundedReceiver<ListenerExit>) {
        let config = AppConfig {
            allow_dynamic_servers: allow_dynamic,
            ..AppConfig::default()
        };
        HttpServerPool::new(Arc::new(config), Arc::new(SessionStore::new()))
    }

    #[tokio::test]
    async fn inventory_keeps_start_order() {
        let (pool, _exits) = pool_with(true);

        Arc::clone(&pool).start_listener(0, false).await.unwrap();
        Arc::clone(&pool).start_listener(0, false).await.unwrap();
        let (static_ports, dynamic) = pool.ports();
        assert_eq!(static_ports.len(), 2);
        assert!(dynamic.is_none());

        Arc::clone(&pool).start_listener(0, true).await.unwrap();
        let (after_static, dynamic) = pool.ports();
        assert_eq!(after_static, static_ports);
        assert!(dynamic.is_some());
    }

    #[tokio::test]
    async fn dynamic_on_static_port_is_dropped_silently() {
        let (pool, _exits) = pool_with(true);

        Arc::clone(&pool).start_listener(0, false).await.unwrap();
        let (static_ports, _) = pool.ports();

        // the call reports success but the slot stays empty
        assert!(Arc::clone(&pool)
            .start_listener(static_ports[0], true)
            .await
            .is_ok());
        let (_, dynamic) = pool.ports();
        assert!(dynamic.is_none());
    }

    #[tokio::test]
    async fn replacing_the_dynamic_listener_reports_the_old_one() {
        let (pool, mut exits) = pool_with(true);

        Arc::clone(&pool).start_listener(0, true).await.unwrap();
        let (_, first) = pool.ports();
        let first = first.unwrap();

        Arc::clone(&pool).replace_dynamic(0).await.unwrap();
        let (_, second) = pool.ports();
        let second = second.unwrap();
        assert_ne!(first, second);

        let exit = exits.recv().await.unwrap();
        assert_eq!(exit.port, first);
    }
}
