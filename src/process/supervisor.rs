//! Child process supervision.
//!
//! A [`Supervisor`] owns at most one child at a time. `launch` only
//! queues a monitor task on the runtime and returns; the monitor creates
//! the process, spawns one reader task per output stream and then waits
//! for the exit. All four sources hand their events to the same channel
//! through an [`Emitter`], which is the only place the shared state is
//! touched.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handshake::HandshakePort;
use super::state::{LifecycleState, Shared};
use crate::config::{RelaunchPolicy, SupervisorConfig};
use crate::error::{Result, StreamKind, SupervisorError};
use crate::event::{init_event_source, ErrorOrigin, EventReceiver, EventSender, SupervisorEvent};

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Supervises one external child process and reports its lifecycle.
///
/// The supervisor is owned by its collaborator. Dropping it, or calling
/// [`Supervisor::shutdown`], kills and reaps the live child; no further
/// events of that launch are delivered.
pub struct Supervisor {
    config: SupervisorConfig,
    runtime: Handle,
    event_sink: EventSender,
    shared: Arc<Mutex<Shared>>,
    kill_switch: Option<oneshot::Sender<()>>,
    /// Monitor of the most recent launch. The next monitor waits for it so
    /// the old child is reaped before a new one is spawned.
    monitor: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Creates an idle supervisor.
    ///
    /// Must be called from within a tokio runtime; the runtime handle is
    /// kept so that `launch` itself never has to be async.
    ///
    /// # Returns
    /// A tuple of (Supervisor, Receiver for lifecycle events)
    pub fn new(config: SupervisorConfig) -> Result<(Self, EventReceiver)> {
        config.validate()?;
        let runtime = Handle::try_current()?;
        let (event_sink, events) = init_event_source();

        Ok((
            Self {
                config,
                runtime,
                event_sink,
                shared: Arc::new(Mutex::new(Shared::default())),
                kill_switch: None,
                monitor: None,
            },
            events,
        ))
    }

    pub fn state(&self) -> LifecycleState {
        lock(&self.shared).state
    }

    /// OS id of the live child, if one has been started and not reaped.
    pub fn pid(&self) -> Option<u32> {
        lock(&self.shared).pid
    }

    /// A launch is in flight or its child has not exited yet.
    pub fn is_active(&self) -> bool {
        lock(&self.shared).in_flight
    }

    /// Launches the child with `working_dir` as its only argument.
    ///
    /// Returns as soon as the launch is queued. Every outcome, including a
    /// missing executable, arrives later on the event channel; nothing is
    /// reported from here. An empty `working_dir` is passed through as an
    /// empty argument and means "use the child's default".
    ///
    /// While a previous child is still active the configured
    /// [`RelaunchPolicy`] applies.
    pub fn launch(&mut self, working_dir: impl Into<String>) {
        let working_dir = working_dir.into();
        debug!(working_dir = %working_dir, "launch requested");

        if self.is_active() {
            match self.config.relaunch {
                RelaunchPolicy::Reject => {
                    let err = SupervisorError::AlreadyRunning { pid: self.pid() };
                    warn!("{}", err);
                    self.send_now(SupervisorEvent::error(ErrorOrigin::Launch, err.to_string()));
                    return;
                }
                RelaunchPolicy::Replace => {
                    info!(pid = ?self.pid(), "replacing running child process");
                    self.teardown();
                }
            }
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let generation = lock(&self.shared).begin_launch();
        self.kill_switch = Some(kill_tx);

        let emitter = Emitter {
            sink: self.event_sink.clone(),
            shared: Arc::clone(&self.shared),
            generation,
        };

        let path = match self.config.executable_path() {
            Ok(path) => path,
            Err(err) => {
                error!("{}", err);
                emitter.emit(SupervisorEvent::error(ErrorOrigin::Launch, err.to_string()));
                emitter.finish();
                return;
            }
        };

        let mut command = Command::new(&path);
        command
            .arg(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let monitor = Monitor {
            command,
            path,
            emitter,
            previous: self.monitor.take(),
            read_buffer_size: self.config.read_buffer_size,
            drain_timeout: self.config.drain_timeout(),
        };
        self.monitor = Some(self.runtime.spawn(monitor.run(kill_rx)));
    }

    /// Same as `launch("")`.
    pub fn launch_default(&mut self) {
        self.launch(String::new());
    }

    /// Kills and reaps the live child, if any, and returns to `idle`.
    ///
    /// Events of the torn-down launch that have not been delivered yet are
    /// discarded, including its `Ended`.
    pub fn shutdown(&mut self) {
        if self.is_active() {
            info!(pid = ?self.pid(), "shutting down child process");
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        // Bump the generation first so the old monitor cannot emit past this point.
        lock(&self.shared).tear_down();
        if let Some(kill) = self.kill_switch.take() {
            if kill.send(()).is_err() {
                debug!("monitor already finished");
            }
        }
    }

    fn send_now(&self, event: SupervisorEvent) {
        let _shared = lock(&self.shared);
        if let Err(e) = self.event_sink.send(event) {
            debug!("event receiver dropped: {:?}", e.0);
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Hands events of one launch to the collaborator.
///
/// Sending happens under the shared lock, after checking that the launch
/// is still current, so a teardown and a late event never interleave.
#[derive(Clone)]
struct Emitter {
    sink: EventSender,
    shared: Arc<Mutex<Shared>>,
    generation: u64,
}

impl Emitter {
    /// Returns false if the launch is stale or nobody is listening.
    fn emit(&self, event: SupervisorEvent) -> bool {
        let mut shared = lock(&self.shared);
        if !shared.is_current(self.generation) {
            debug!(generation = self.generation, "dropping event of replaced launch: {:?}", event);
            return false;
        }
        shared.state = shared.state.on_event(&event);
        if event.is_terminal() {
            shared.in_flight = false;
            shared.pid = None;
        }
        match self.sink.send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!("event receiver dropped: {:?}", e.0);
                false
            }
        }
    }

    fn is_current(&self) -> bool {
        lock(&self.shared).is_current(self.generation)
    }

    fn set_pid(&self, pid: Option<u32>) {
        let mut shared = lock(&self.shared);
        if shared.is_current(self.generation) {
            shared.pid = pid;
        }
    }

    /// Marks the launch as no longer in flight. Terminal events already do
    /// this; the monitor calls it on every exit path regardless.
    fn finish(&self) {
        let mut shared = lock(&self.shared);
        if shared.is_current(self.generation) {
            shared.in_flight = false;
            shared.pid = None;
        }
    }
}

/// Owns the child from spawn until it is reaped.
struct Monitor {
    command: Command,
    path: PathBuf,
    emitter: Emitter,
    previous: Option<JoinHandle<()>>,
    read_buffer_size: usize,
    drain_timeout: Duration,
}

impl Monitor {
    async fn run(self, mut kill_rx: oneshot::Receiver<()>) {
        let Monitor {
            mut command,
            path,
            emitter,
            previous,
            read_buffer_size,
            drain_timeout,
        } = self;

        // At most one live child: the previous monitor kills and reaps its
        // child before it returns.
        if let Some(previous) = previous {
            if let Err(e) = previous.await {
                warn!("previous monitor did not finish cleanly: {}", e);
            }
        }
        if !emitter.is_current() {
            debug!(path = %path.display(), "launch superseded before spawn");
            return;
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                let err = SupervisorError::Spawn { path, source };
                error!("{}", err);
                emitter.emit(SupervisorEvent::error(ErrorOrigin::Launch, err.to_string()));
                emitter.finish();
                return;
            }
        };

        let pid = child.id();
        info!(pid = ?pid, path = %path.display(), "child process started");
        emitter.set_pid(pid);
        emitter.emit(SupervisorEvent::Started);

        // Readers start only after Started is queued, which keeps Ready behind it.
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(read_stream(
                stdout,
                StreamKind::Stdout,
                emitter.clone(),
                read_buffer_size,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(read_stream(
                stderr,
                StreamKind::Stderr,
                emitter.clone(),
                read_buffer_size,
            )));
        }

        // Either sender fired or the supervisor was dropped: both mean teardown.
        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = &mut kill_rx => None,
        };

        match exited {
            None => kill_and_reap(&mut child, &readers).await,
            Some(Ok(status)) => {
                let exit_code = exit_code(&status);
                info!(pid = ?pid, exit_code, "child process exited");
                drain(readers, drain_timeout).await;
                emitter.emit(SupervisorEvent::Ended { exit_code });
            }
            Some(Err(source)) => {
                let err = SupervisorError::Wait(source);
                error!(pid = ?pid, "{}", err);
                emitter.emit(SupervisorEvent::error(ErrorOrigin::Io, err.to_string()));
                // The exit can no longer be observed, but the child keeps
                // running and its output keeps flowing until teardown.
                if (&mut kill_rx).await.is_err() {
                    debug!(pid = ?pid, "supervisor dropped");
                }
                kill_and_reap(&mut child, &readers).await;
            }
        }

        emitter.finish();
    }
}

async fn kill_and_reap(child: &mut Child, readers: &[JoinHandle<()>]) {
    let pid = child.id();
    if let Err(e) = child.kill().await {
        warn!(pid = ?pid, "Failed to kill child process: {}", e);
    }
    for reader in readers {
        reader.abort();
    }
    debug!(pid = ?pid, "child process torn down");
}

/// Reads one output stream until EOF, emitting one event per read.
async fn read_stream<R>(mut stream: R, kind: StreamKind, emitter: Emitter, buf_size: usize)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buf_size];

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                debug!(stream = %kind, "child stream closed");
                break;
            }
            Ok(n) => {
                let chunk = &buf[..n];
                let event = match kind {
                    StreamKind::Stdout => {
                        let port = HandshakePort::parse(chunk);
                        debug!(%port, "child reported ready");
                        SupervisorEvent::ready(port)
                    }
                    StreamKind::Stderr => SupervisorEvent::error(
                        ErrorOrigin::Stderr,
                        String::from_utf8_lossy(chunk).into_owned(),
                    ),
                };
                emitter.emit(event);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                let err = SupervisorError::Read { stream: kind, source };
                warn!("{}", err);
                emitter.emit(SupervisorEvent::error(ErrorOrigin::Io, err.to_string()));
                break;
            }
        }
    }
}

/// Waits for the readers to flush what the child wrote before it exited.
///
/// A grandchild can inherit the pipes and keep them open; readers still
/// running after `timeout` are aborted.
async fn drain(readers: Vec<JoinHandle<()>>, timeout: Duration) {
    let aborts: Vec<_> = readers.iter().map(JoinHandle::abort_handle).collect();
    if tokio::time::timeout(timeout, join_all(readers)).await.is_err() {
        warn!("child output still open {:?} after exit; abandoning readers", timeout);
        for handle in aborts {
            handle.abort();
        }
    }
}

/// Exit code as reported by the OS. A child killed by a signal reports the
/// signal number.
#[cfg(unix)]
fn exit_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal()).unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
