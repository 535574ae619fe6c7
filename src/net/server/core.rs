#![cfg(feature = "net")]

use crate::net::{NetError, ProtocolError};
use crate::timeouts::SERVER_SHUTDOWN_GRACE;
use log::{error, warn};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);

type ConnectionFn = dyn Fn(TcpStream, SocketAddr) -> Result<(), NetError> + Send + Sync;

/// Counts in-flight connections against an optional ceiling.
struct ConnectionSlots {
    active: AtomicUsize,
    limit: usize,
}

impl ConnectionSlots {
    fn claim(self: &Arc<Self>) -> Option<SlotGuard> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |active| {
                (active < self.limit).then_some(active + 1)
            })
            .ok()
            .map(|_| SlotGuard {
                slots: Arc::clone(self),
            })
    }
}

struct SlotGuard {
    slots: Arc<ConnectionSlots>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.active.fetch_sub(1, Ordering::Release);
    }
}

/// Connection threads still owned by the server.
#[derive(Default)]
struct Workers {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Workers {
    fn push(&self, worker: JoinHandle<()>) -> Result<(), NetError> {
        let mut handles = lock_or_poison(&self.handles, "connection workers")?;
        handles.retain(|handle| !handle.is_finished());
        handles.push(worker);
        Ok(())
    }

    fn join_all(&self) -> Result<(), NetError> {
        let handles: Vec<_> =
            lock_or_poison(&self.handles, "connection workers")?.drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        Ok(())
    }
}

struct AcceptLoop {
    name: &'static str,
    listener: TcpListener,
    stop: Arc<AtomicBool>,
    slots: Option<Arc<ConnectionSlots>>,
    workers: Arc<Workers>,
    handler: Arc<ConnectionFn>,
    stopped: Sender<()>,
}

impl AcceptLoop {
    fn run(self) {
        let name = self.name;
        while !self.stop.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => self.dispatch(stream, addr),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_BACKOFF);
                }
                Err(err) => {
                    error!("event={name}_accept_error error={err}");
                    break;
                }
            }
        }
        let _ = self.stopped.send(());
    }

    fn dispatch(&self, stream: TcpStream, addr: SocketAddr) {
        let name = self.name;
        let slot = match &self.slots {
            Some(slots) => match slots.claim() {
                Some(slot) => Some(slot),
                None => {
                    warn!(
                        "event={name}_connection_rejected addr={addr} reason=too_many_connections limit={}",
                        slots.limit
                    );
                    return;
                }
            },
            None => None,
        };
        if let Err(err) = stream.set_nonblocking(false) {
            warn!("event={name}_connection_setup_failed addr={addr} error={err}");
            return;
        }
        let handler = Arc::clone(&self.handler);
        let worker = thread::spawn(move || {
            let _slot = slot;
            if let Err(err) = handler(stream, addr) {
                warn!("event={name}_connection_error addr={addr} error={err}");
            }
        });
        if let Err(err) = self.workers.push(worker) {
            warn!("event={name}_connection_tracking_failed error={err}");
        }
    }
}

/// Owns a running accept loop and the connection threads it spawned.
pub(crate) struct ServerHandle {
    name: &'static str,
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    accept: Option<(JoinHandle<()>, Receiver<()>)>,
    workers: Arc<Workers>,
}

impl ServerHandle {
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, waits up to `timeout` for the accept loop to exit,
    /// then joins connections still in flight.
    pub(crate) fn try_shutdown(&mut self, timeout: Duration) -> Result<(), NetError> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some((thread, stopped)) = self.accept.take() {
            match stopped.recv_timeout(timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
                Err(RecvTimeoutError::Timeout) => {
                    return Err(ProtocolError::ShutdownTimeout { context: self.name }.into());
                }
            }
            if thread.join().is_err() {
                warn!("event=server_accept_loop_panic name={}", self.name);
            }
        }
        self.workers.join_all()
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.try_shutdown(SERVER_SHUTDOWN_GRACE);
    }
}

/// Runs `handler` on its own thread for every accepted connection until the
/// returned handle is shut down. With `max_connections`, connections beyond
/// the limit are dropped at accept time.
pub(crate) fn spawn_listener<F>(
    name: &'static str,
    listener: TcpListener,
    max_connections: Option<usize>,
    handler: F,
) -> io::Result<ServerHandle>
where
    F: Fn(TcpStream, SocketAddr) -> Result<(), NetError> + Send + Sync + 'static,
{
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;
    let stop = Arc::new(AtomicBool::new(false));
    let workers = Arc::new(Workers::default());
    let (stopped, stopped_rx) = mpsc::channel();
    let accept_loop = AcceptLoop {
        name,
        listener,
        stop: Arc::clone(&stop),
        slots: max_connections.map(|limit| {
            Arc::new(ConnectionSlots {
                active: AtomicUsize::new(0),
                limit: limit.max(1),
            })
        }),
        workers: Arc::clone(&workers),
        handler: Arc::new(handler),
        stopped,
    };
    let thread = thread::Builder::new()
        .name(format!("{name}-accept"))
        .spawn(move || accept_loop.run())?;
    Ok(ServerHandle {
        name,
        local_addr,
        stop,
        accept: Some((thread, stopped_rx)),
        workers,
    })
}

fn lock_or_poison<'a, T>(
    mutex: &'a Mutex<T>,
    context: &'static str,
) -> Result<MutexGuard<'a, T>, NetError> {
    mutex
        .lock()
        .map_err(|_| NetError::from(ProtocolError::Poisoned { context }))
}
