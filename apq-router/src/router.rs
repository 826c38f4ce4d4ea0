use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use displaydoc::Display;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::BoxError;

use crate::axum_factory::make_axum_router;
use crate::configuration::Configuration;
use crate::router_factory::create_router_service;

/// Error types for the router.
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum ApqRouterError {
    /// could not create router: {0}
    ServiceCreationError(BoxError),

    /// could not create the HTTP server: {0}
    ServerCreationError(std::io::Error),

    /// failed to stop HTTP Server: {0}
    HttpServerLifecycleError(BoxError),
}

/// Shutdown kinds.
#[derive(Default)]
pub enum ShutdownKind {
    /// No graceful shutdown
    None,

    /// A custom shutdown future.
    Custom(Pin<Box<dyn Future<Output = ()> + Send>>),

    /// Watch for Ctl-C signal.
    #[default]
    CtrlC,
}

impl ShutdownKind {
    /// Convert to a future that resolves when the shutdown is triggered.
    async fn wait(self) {
        match self {
            ShutdownKind::None => futures::future::pending::<()>().await,
            ShutdownKind::Custom(future) => future.await,
            ShutdownKind::CtrlC => {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!("cannot listen for shutdown signal: {err}");
                    futures::future::pending::<()>().await;
                }
                tracing::info!("received Ctrl-C, shutting down");
            }
        }
    }
}

/// The persisted query router.
///
/// ```no_run
/// use apq_router::ApqRouter;
/// use apq_router::Configuration;
/// use apq_router::ShutdownKind;
/// # use tower::BoxError;
/// # #[tokio::main]
/// # async fn main() -> Result<(), BoxError> {
/// let router = ApqRouter::builder()
///     .configuration(Configuration::default())
///     .shutdown(ShutdownKind::CtrlC)
///     .build();
/// router.serve().await?;
/// # Ok(())
/// # }
/// ```
pub struct ApqRouter {
    configuration: Configuration,
    shutdown: ShutdownKind,
}

#[buildstructor::buildstructor]
impl ApqRouter {
    #[builder(visibility = "pub")]
    fn new(configuration: Configuration, shutdown: Option<ShutdownKind>) -> Self {
        Self {
            configuration,
            shutdown: shutdown.unwrap_or_default(),
        }
    }

    /// Start the HTTP server in a separate task.
    ///
    /// Resolves once the server listens, the returned handle reports the
    /// bound address. This is useful when `server.listen` uses port 0.
    pub async fn start(self) -> Result<RouterHandle, ApqRouterError> {
        let ApqRouter {
            configuration,
            shutdown,
        } = self;

        let service = create_router_service(&configuration)
            .await
            .map_err(ApqRouterError::ServiceCreationError)?;
        let app = make_axum_router(service, &configuration.server);

        let listener = TcpListener::bind(configuration.server.listen)
            .await
            .map_err(ApqRouterError::ServerCreationError)?;
        let listen_address = listener
            .local_addr()
            .map_err(ApqRouterError::ServerCreationError)?;
        tracing::info!(
            "GraphQL endpoint exposed at http://{}{} 🚀",
            listen_address,
            configuration.server.path
        );

        let (shutdown_sender, shutdown_receiver) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    tokio::select! {
                        _ = shutdown.wait() => {}
                        _ = shutdown_receiver => {}
                    }
                    tracing::debug!("stopping the http server");
                })
                .await
        });

        Ok(RouterHandle {
            listen_address,
            shutdown_sender,
            server,
        })
    }

    /// Start the router and wait until it shuts down.
    pub async fn serve(self) -> Result<(), ApqRouterError> {
        self.start().await?.stopped().await
    }
}

/// Handle on a started router.
///
/// Dropping the handle triggers a graceful shutdown.
pub struct RouterHandle {
    listen_address: SocketAddr,
    shutdown_sender: oneshot::Sender<()>,
    server: JoinHandle<std::io::Result<()>>,
}

impl RouterHandle {
    /// The address the HTTP server is bound to.
    pub fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Trigger and wait for graceful shutdown.
    pub async fn shutdown(self) -> Result<(), ApqRouterError> {
        let RouterHandle {
            shutdown_sender,
            server,
            ..
        } = self;
        let _ = shutdown_sender.send(());
        join(server).await
    }

    /// Wait for the server to stop on its own shutdown signal.
    pub async fn stopped(self) -> Result<(), ApqRouterError> {
        let RouterHandle {
            shutdown_sender,
            server,
            ..
        } = self;
        let result = join(server).await;
        drop(shutdown_sender);
        result
    }
}

async fn join(server: JoinHandle<std::io::Result<()>>) -> Result<(), ApqRouterError> {
    match server.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(ApqRouterError::HttpServerLifecycleError(err.into())),
        Err(err) => Err(ApqRouterError::HttpServerLifecycleError(err.into())),
    }
}
