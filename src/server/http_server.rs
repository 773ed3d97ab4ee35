//! Coroutine HTTP server wrapper. Provides a typed interface for starting
//! the transport runtime and a handle for readiness polling, shutdown, and
//! joining.

use may::coroutine::JoinHandle;
use may_minihttp::HttpService;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;
use tracing::info;

use crate::config::ServiceConfig;

/// Wrapper around the transport runtime's HTTP server.
pub struct HttpServer<T>(pub T);

/// Handle to a running HTTP server.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    /// Wait for the server to accept connections.
    ///
    /// Polls the bind address with TCP connects. Useful in tests to make
    /// sure the server is up before sending requests.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the server is not reachable within ~250ms
    /// (50 attempts, 5ms apart).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop the server, cancelling its coroutine and waiting for it to
    /// finish. Consumes the handle.
    pub fn stop(self) {
        // SAFETY: cancelling the server coroutine during shutdown is the
        // intended use; the handle is valid because we own it.
        unsafe {
            self.handle.coroutine().cancel();
        }
        let _ = self.handle.join();
    }

    /// Block until the server coroutine finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the server coroutine panicked.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

impl<T: HttpService + Clone + Send + Sync + 'static> HttpServer<T> {
    /// Start the server on `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or the port cannot be
    /// bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let handle = may_minihttp::HttpServer(self.0).start(addr)?;
        info!(addr = %addr, "Server listening");
        Ok(ServerHandle { addr, handle })
    }
}

/// Start a service with coroutine stacks sized from configuration.
///
/// # Errors
///
/// Returns an error if the listener fails to bind.
pub fn start<T, A>(service: T, addr: A, config: &ServiceConfig) -> io::Result<ServerHandle>
where
    T: HttpService + Clone + Send + Sync + 'static,
    A: ToSocketAddrs,
{
    may::config().set_stack_size(config.stack_size);
    HttpServer(service).start(addr)
}
