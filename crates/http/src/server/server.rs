//! Server lifecycle and task dispatch.
//!
//! One accept thread hands each connection to a worker. Dispatch prefers the
//! single pre-warmed idle slot (a lock-free cell), falling back to a fresh
//! slot from the bounded pool; when even that is refused the connection goes
//! down the deny path. `hangup` swaps a paused sentinel into the idle cell
//! so dispatch fails fast, then drains the in-flight barrier.

use std::fmt;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwapOption;
use http::StatusCode;
use socket2::{Domain, Socket, Type};
use tracing::{debug, info, warn};

use crate::connection;
use crate::protocol::error::ServerError;
use crate::protocol::response;
use crate::server::config::ServerConfig;
use crate::server::pool::WorkerPool;
use crate::server::sync::{Barrier, Latch, Slot, Task};

const DEFAULT_BACKLOG: u32 = 128;

/// Occupant of the idle-slot cell.
#[derive(Debug)]
enum Warm {
    /// A pre-warmed worker waiting for one task.
    Idle(Slot),
    /// Sentinel: dispatch must fail fast. Only the engine's pinned instance
    /// ever sits in the cell, so identity comparison suffices.
    Paused,
}

struct Engine {
    config: ServerConfig,
    pool: WorkerPool,
    /// Lock-free cell holding the pre-warmed slot, the paused sentinel, or
    /// nothing.
    idle: ArcSwapOption<Warm>,
    paused: Arc<Warm>,
    /// In-flight task counter; `hangup` drains it.
    tasks: Barrier,
    /// Taken and dropped by `close` so the port frees up even while
    /// in-flight tasks still hold the engine alive.
    listener: Mutex<Option<Arc<TcpListener>>>,
    closed: AtomicBool,
}

impl Engine {
    fn new(config: ServerConfig, listener: Arc<TcpListener>) -> Self {
        Self {
            pool: WorkerPool::new(config.thread_prefix(), config.max_workers()),
            config,
            idle: ArcSwapOption::empty(),
            paused: Arc::new(Warm::Paused),
            tasks: Barrier::new(),
            listener: Mutex::new(Some(listener)),
            closed: AtomicBool::new(false),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        let listener = self.listener.lock().expect("listener cell poisoned");
        match listener.as_ref() {
            Some(listener) => listener.local_addr().map_err(ServerError::io),
            None => Err(ServerError::NotStarted),
        }
    }

    /// Places one accepted connection onto a worker, or denies it.
    fn dispatch(self: &Arc<Self>, stream: TcpStream) {
        let stream = Arc::new(stream);
        self.tasks.inc();

        let task: Task = {
            let engine = Arc::clone(self);
            let stream = Arc::clone(&stream);
            Box::new(move || {
                // closes the connection and leaves the barrier however the
                // task ends
                let _flight = FlightGuard { engine: Arc::clone(&engine), stream: Arc::clone(&stream) };
                connection::process(&stream, &engine.config);
            })
        };

        if let Err(e) = self.allocate(task) {
            // the task never ran: leave the barrier before the deny hook so
            // a hook calling `hangup` cannot wait on this very connection
            self.tasks.dec();
            self.deny(&stream, &e);
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Tries the pre-warmed slot first, then a fresh one from the pool.
    /// After either success the cell is re-warmed opportunistically.
    fn allocate(&self, mut task: Task) -> Result<(), ServerError> {
        let cached = self.idle.load_full();
        if let Some(warm) = cached.as_ref() {
            if Arc::ptr_eq(warm, &self.paused) {
                return Err(ServerError::Paused);
            }
            if let Warm::Idle(slot) = warm.as_ref() {
                match slot.assign(task) {
                    Ok(()) => {
                        self.idle.compare_and_swap(&cached, None);
                        self.prewarm();
                        return Ok(());
                    }
                    // slot got spent under us, fall through to a fresh one
                    Err(returned) => task = returned,
                }
            }
        }

        let (slot, runner) = Slot::new();
        self.pool.execute(runner)?;
        slot.assign(task).map_err(|_task| ServerError::Exhausted)?;
        self.prewarm();
        Ok(())
    }

    /// Parks a fresh worker in the idle cell, best effort: pool exhaustion
    /// or a raced cell simply skip the warm-up.
    fn prewarm(&self) {
        let (slot, runner) = Slot::new();
        if self.pool.execute(runner).is_err() {
            return;
        }

        let warm = Arc::new(Warm::Idle(slot));
        let previous = self.idle.compare_and_swap(&None::<Arc<Warm>>, Some(Arc::clone(&warm)));
        if previous.is_some() {
            if let Warm::Idle(slot) = warm.as_ref() {
                slot.release();
            }
        }
    }

    /// Swaps the paused sentinel into the idle cell, releasing a parked
    /// worker if one was there.
    fn pause(&self) {
        let prior = self.idle.swap(Some(Arc::clone(&self.paused)));
        if let Some(warm) = prior {
            if !Arc::ptr_eq(&warm, &self.paused) {
                if let Warm::Idle(slot) = warm.as_ref() {
                    slot.release();
                }
            }
        }
    }

    /// Clears the paused sentinel and re-warms; a no-op when not paused.
    fn unpause(&self) {
        let previous = self.idle.compare_and_swap(&self.paused, None);
        let was_paused = previous.as_ref().is_some_and(|w| Arc::ptr_eq(w, &self.paused));
        if was_paused {
            self.prewarm();
        }
    }

    fn deny(&self, stream: &TcpStream, error: &ServerError) {
        warn!(error = %error, "denying a connection");
        match self.config.deny() {
            Some(hook) => hook(stream, error),
            None => {
                if let Err(e) =
                    response::write_status_line(&mut (&*stream), StatusCode::SERVICE_UNAVAILABLE)
                {
                    debug!(error = %e, "cannot write the deny status");
                }
            }
        }
    }

    /// Drops the cached idle worker so it does not outlive the listener.
    fn drain_idle(&self) {
        if let Some(warm) = self.idle.swap(None) {
            if let Warm::Idle(slot) = warm.as_ref() {
                slot.release();
            }
        }
    }
}

/// Closes the task's connection and decrements the in-flight counter,
/// whether the task finished or panicked.
struct FlightGuard {
    engine: Arc<Engine>,
    stream: Arc<TcpStream>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        self.engine.tasks.dec();
    }
}

struct Active {
    engine: Arc<Engine>,
    acceptor: JoinHandle<()>,
}

/// The blocking HTTP server.
///
/// Lifecycle operations (`start`, `hangup`, `resume`, `close`) exclude each
/// other through one internal lock; a closed server may be started again.
#[derive(Default)]
pub struct HttpServer {
    control: Mutex<Option<Active>>,
}

impl HttpServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds, pre-warms one idle worker and spawns the accept loop.
    /// Returns once the loop is accepting. The configuration is consumed
    /// and frozen.
    ///
    /// Binding failure (port in use among others) surfaces as
    /// [`ServerError::Bind`]; retrying with another port is the caller's
    /// call.
    pub fn start(&self, config: ServerConfig) -> Result<(), ServerError> {
        let mut control = self.control.lock().expect("server control poisoned");
        if control.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        let listener = Arc::new(bind(&config)?);
        let addr = listener.local_addr().map_err(ServerError::io)?;
        let acceptor_name = format!("{}accept", config.thread_prefix());

        let engine = Arc::new(Engine::new(config, Arc::clone(&listener)));
        engine.prewarm();

        let started = Arc::new(Latch::new());
        let acceptor = {
            let engine = Arc::clone(&engine);
            let started = Arc::clone(&started);
            thread::Builder::new()
                .name(acceptor_name)
                .spawn(move || accept_loop(&engine, &listener, &started))
                .map_err(ServerError::io)?
        };
        started.wait();

        info!(%addr, "server started");
        *control = Some(Active { engine, acceptor });
        Ok(())
    }

    /// Pauses dispatch and blocks until every in-flight task has finished.
    ///
    /// While paused, fresh connections go down the deny path without
    /// touching a worker. The listener stays bound.
    pub fn hangup(&self) -> Result<(), ServerError> {
        let control = self.control.lock().expect("server control poisoned");
        let Some(active) = control.as_ref() else {
            return Err(ServerError::NotStarted);
        };

        active.engine.pause();
        active.engine.tasks.wait_idle();
        info!("server hung up");
        Ok(())
    }

    /// Lifts a pause and pre-warms a fresh idle worker.
    pub fn resume(&self) -> Result<(), ServerError> {
        let control = self.control.lock().expect("server control poisoned");
        let Some(active) = control.as_ref() else {
            return Err(ServerError::NotStarted);
        };

        active.engine.unpause();
        info!("server resumed");
        Ok(())
    }

    /// Unbinds the listener and stops the accept loop. In-flight tasks are
    /// left to finish on their own; the port frees up before they do.
    /// A no-op when not started.
    pub fn close(&self) -> Result<(), ServerError> {
        let mut control = self.control.lock().expect("server control poisoned");
        let Some(active) = control.take() else {
            return Ok(());
        };

        active.engine.closed.store(true, Ordering::SeqCst);
        let listener = active.engine.listener.lock().expect("listener cell poisoned").take();
        if let Some(listener) = &listener {
            nudge_acceptor(listener);
        }
        if active.acceptor.join().is_err() {
            debug!("acceptor ended by panic");
        }
        // the acceptor's clone is gone after the join, dropping ours closes
        // the socket
        drop(listener);
        active.engine.drain_idle();

        info!("server closed");
        Ok(())
    }

    /// The bound address, useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        let control = self.control.lock().expect("server control poisoned");
        match control.as_ref() {
            Some(active) => active.engine.local_addr(),
            None => Err(ServerError::NotStarted),
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let started = self.control.lock().map(|c| c.is_some()).unwrap_or(false);
        f.debug_struct("HttpServer").field("started", &started).finish()
    }
}

fn accept_loop(engine: &Arc<Engine>, listener: &TcpListener, started: &Latch) {
    started.open();

    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                if engine.closed.load(Ordering::SeqCst) {
                    break;
                }
                debug!(%peer, "accepted a connection");
                engine.dispatch(stream);
            }
            Err(e) => {
                if engine.closed.load(Ordering::SeqCst) {
                    break;
                }
                // one failed accept never stops the loop
                warn!(error = %e, "accept failed");
            }
        }
    }
}

/// Binds the listening socket with address reuse and the configured backlog.
fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let addr: SocketAddr = format!("{}:{}", config.address(), config.port())
        .parse()
        .map_err(|e: std::net::AddrParseError| {
            ServerError::bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

    let socket =
        Socket::new(Domain::for_address(addr), Type::STREAM, None).map_err(ServerError::bind)?;
    socket.set_reuse_address(true).map_err(ServerError::bind)?;
    socket.bind(&addr.into()).map_err(ServerError::bind)?;

    let backlog = match config.backlog() {
        0 => DEFAULT_BACKLOG,
        n => n,
    };
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX)).map_err(ServerError::bind)?;

    Ok(socket.into())
}

/// Unblocks a thread parked in `accept` by connecting to the listener once.
fn nudge_acceptor(listener: &TcpListener) {
    if let Ok(addr) = listener.local_addr() {
        if let Ok(nudge) = TcpStream::connect(addr) {
            let _ = nudge.shutdown(Shutdown::Both);
        }
    }
}
