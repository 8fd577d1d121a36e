use may::coroutine::JoinHandle;
use may_minihttp::{HttpServerWithHeaders, HttpService};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Header slots per request; enough for typical gateway and proxy traffic.
pub const MAX_HEADERS: usize = 32;

/// Wrapper around may_minihttp's HTTP server.
pub struct HttpServer<T>(pub T);

/// Handle to a running HTTP server.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Polls the listening address until a TCP connection succeeds.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the server is not accepting within `timeout`.
    pub fn wait_ready_for(&self, timeout: Duration) -> io::Result<()> {
        let started = Instant::now();
        while started.elapsed() < timeout {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// [`ServerHandle::wait_ready_for`] with a 250ms budget.
    pub fn wait_ready(&self) -> io::Result<()> {
        self.wait_ready_for(Duration::from_millis(250))
    }

    /// Cancels the server coroutine and waits for it to finish.
    pub fn stop(self) {
        // SAFETY: cancel() is unsafe in may; the handle is owned here and the
        // coroutine is only cancelled once, during shutdown.
        unsafe {
            self.handle.coroutine().cancel();
        }
        if self.handle.join().is_err() {
            tracing::warn!(addr = %self.addr, "server coroutine ended with a panic");
        }
        info!(addr = %self.addr, "server stopped");
    }

    /// Blocks until the server coroutine finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the server coroutine panicked.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

impl<T: HttpService + Clone + Send + Sync + 'static> HttpServer<T> {
    /// Binds `addr` and starts serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let handle = HttpServerWithHeaders::<_, MAX_HEADERS>(self.0).start(addr)?;
        info!(addr = %addr, "server listening");
        Ok(ServerHandle { addr, handle })
    }
}
