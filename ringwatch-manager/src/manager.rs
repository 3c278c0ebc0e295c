use std::fmt::{Display, Formatter};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use ringwatch_hashring::{ConsistentHashRing, HashRingError, RingKey};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::ManagerConfig;
use crate::error::RingError;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
/// The lifecycle of a [RingManager].
///
/// A manager only ever moves forward through these states, once stopped
/// a new manager must be created.
pub enum Lifecycle {
    NotStarted,
    Running,
    Stopped,
}

impl Display for Lifecycle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Lifecycle::NotStarted => "not started",
            Lifecycle::Running => "running",
            Lifecycle::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
/// Controls how long the worker loop runs for.
pub enum RunLoop {
    /// Process commands until the manager is stopped.
    Forever,
    /// Process `n` commands, then close the mailbox and exit once the commands
    /// accepted before it closed have been handled.
    Iterations(usize),
}

impl RunLoop {
    fn should_continue(&self, processed: usize) -> bool {
        match self {
            RunLoop::Forever => true,
            RunLoop::Iterations(n) => processed < *n,
        }
    }
}

/// A message sent to the ring worker.
pub enum Command {
    AddNode(RingKey),
    RemoveNode(RingKey),
    GetNode {
        key: String,
        reply: oneshot::Sender<Result<RingKey, HashRingError>>,
    },
    GetNodes {
        key: String,
        count: usize,
        reply: oneshot::Sender<Result<Vec<RingKey>, HashRingError>>,
    },
    ListNodes(oneshot::Sender<Vec<RingKey>>),
    Ping(oneshot::Sender<()>),
}

struct Shared {
    config: ManagerConfig,
    state: Mutex<State>,
}

struct State {
    lifecycle: Lifecycle,
    tx: Option<flume::Sender<Command>>,
    // Held until the worker is started.
    rx: Option<flume::Receiver<Command>>,
    ring: Option<ConsistentHashRing>,
}

#[derive(Clone, Default)]
/// A handle to the ring actor.
///
/// Handles are cheap to clone and all clones talk to the same worker.
/// The [Default] handle is *uninitialized*, every operation on it returns
/// [RingError::NotInitialized] which allows a component to hold a handle
/// before the real manager exists.
pub struct RingManager {
    shared: Option<Arc<Shared>>,
}

impl RingManager {
    /// Creates a new manager with the ring pre-populated by the given nodes.
    ///
    /// The manager does not process any commands until [Self::start] is called.
    pub fn new<K>(nodes: impl IntoIterator<Item = K>) -> Self
    where
        K: Into<RingKey>,
    {
        Self::with_config(nodes, ManagerConfig::default())
    }

    /// Creates a new manager using the provided config.
    pub fn with_config<K>(nodes: impl IntoIterator<Item = K>, config: ManagerConfig) -> Self
    where
        K: Into<RingKey>,
    {
        let ring = ConsistentHashRing::with_replicas(config.replicas).with_nodes(nodes);
        let (tx, rx) = flume::bounded(config.mailbox_capacity.max(1));

        let state = State {
            lifecycle: Lifecycle::NotStarted,
            tx: Some(tx),
            rx: Some(rx),
            ring: Some(ring),
        };

        Self {
            shared: Some(Arc::new(Shared {
                config,
                state: Mutex::new(state),
            })),
        }
    }

    #[inline]
    /// Returns if the handle points at a real manager.
    pub fn is_initialized(&self) -> bool {
        self.shared.is_some()
    }

    /// The current lifecycle state of the manager.
    pub fn lifecycle(&self) -> Result<Lifecycle, RingError> {
        Ok(self.shared()?.state.lock().lifecycle)
    }

    /// The number of commands waiting in the mailbox.
    pub fn pending(&self) -> usize {
        self.shared
            .as_ref()
            .and_then(|shared| shared.state.lock().tx.as_ref().map(|tx| tx.len()))
            .unwrap_or_default()
    }

    /// Starts the worker loop, processing commands until the manager is stopped.
    pub fn start(&self) -> Result<JoinHandle<()>, RingError> {
        self.start_with(RunLoop::Forever)
    }

    /// Starts the worker loop with the given run loop.
    ///
    /// This must be called from within a tokio runtime, otherwise
    /// [RingError::NoRuntime] is returned and the manager is left untouched.
    pub fn start_with(&self, run_loop: RunLoop) -> Result<JoinHandle<()>, RingError> {
        let shared = self.shared()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RingError::NoRuntime)?;

        let (rx, ring) = {
            let mut state = shared.state.lock();
            match state.lifecycle {
                Lifecycle::NotStarted => {},
                Lifecycle::Running => return Err(RingError::AlreadyStarted),
                Lifecycle::Stopped => {
                    return Err(RingError::NotRunning(Lifecycle::Stopped))
                },
            }

            let (Some(rx), Some(ring)) = (state.rx.take(), state.ring.take()) else {
                return Err(RingError::AlreadyStarted);
            };
            state.lifecycle = Lifecycle::Running;
            (rx, ring)
        };

        info!(num_nodes = ring.len(), run_loop = ?run_loop, "Starting ring manager.");

        Ok(runtime.spawn(run_worker(
            Arc::downgrade(shared),
            ring,
            rx,
            run_loop,
        )))
    }

    /// Stops the manager.
    ///
    /// The mailbox is closed, commands already accepted are still processed but
    /// every operation issued afterwards fails. This is permanent.
    pub fn stop(&self) -> Result<(), RingError> {
        let shared = self.shared()?;
        let mut state = shared.state.lock();

        if state.lifecycle == Lifecycle::Stopped {
            debug!("Ring manager is already stopped.");
            return Ok(());
        }

        info!(previous_state = %state.lifecycle, "Stopping ring manager.");
        state.lifecycle = Lifecycle::Stopped;
        state.tx = None;
        state.rx = None;
        state.ring = None;

        Ok(())
    }

    /// Adds a node to the ring.
    ///
    /// This only waits for the command to be accepted into the mailbox, not for
    /// it to be applied. A lookup issued after this returns will observe the node.
    pub async fn add_node(&self, key: impl Into<RingKey>) -> Result<(), RingError> {
        self.send(Command::AddNode(key.into())).await
    }

    /// Removes a node from the ring.
    ///
    /// This only waits for the command to be accepted into the mailbox.
    pub async fn remove_node(&self, key: impl Into<RingKey>) -> Result<(), RingError> {
        self.send(Command::RemoveNode(key.into())).await
    }

    /// Gets the node which currently owns the given key.
    pub async fn get_node(&self, key: &str) -> Result<RingKey, RingError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetNode {
            key: key.to_string(),
            reply,
        })
        .await?;

        let node = rx.await.map_err(|_| RingError::NotRunning(Lifecycle::Stopped))??;
        Ok(node)
    }

    /// Gets up to `count` distinct nodes for the given key, in preference order.
    pub async fn get_nodes(
        &self,
        key: &str,
        count: usize,
    ) -> Result<Vec<RingKey>, RingError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetNodes {
            key: key.to_string(),
            count,
            reply,
        })
        .await?;

        let nodes = rx.await.map_err(|_| RingError::NotRunning(Lifecycle::Stopped))??;
        Ok(nodes)
    }

    /// Lists the current members of the ring.
    pub async fn nodes(&self) -> Result<Vec<RingKey>, RingError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ListNodes(reply)).await?;
        rx.await.map_err(|_| RingError::NotRunning(Lifecycle::Stopped))
    }

    /// Checks the worker is consuming commands, returning `false` if it does not
    /// respond within the configured ping timeout.
    pub async fn ping(&self) -> bool {
        self.try_ping().await.is_ok()
    }

    /// Pings the worker, returning why it did not respond.
    pub async fn try_ping(&self) -> Result<(), RingError> {
        let ping_timeout = self.shared()?.config.ping_timeout;

        let (reply, rx) = oneshot::channel();
        let round_trip = async {
            self.send(Command::Ping(reply)).await?;
            rx.await.map_err(|_| RingError::NotRunning(Lifecycle::Stopped))
        };

        tokio::time::timeout(ping_timeout, round_trip)
            .await
            .map_err(|_| RingError::Timeout(ping_timeout))?
    }

    fn shared(&self) -> Result<&Arc<Shared>, RingError> {
        self.shared.as_ref().ok_or(RingError::NotInitialized)
    }

    fn sender(&self) -> Result<flume::Sender<Command>, RingError> {
        let state = self.shared()?.state.lock();
        match (state.lifecycle, state.tx.as_ref()) {
            (Lifecycle::Running, Some(tx)) => Ok(tx.clone()),
            (Lifecycle::Running, None) => Err(RingError::NotRunning(Lifecycle::Stopped)),
            (lifecycle, _) => Err(RingError::NotRunning(lifecycle)),
        }
    }

    async fn send(&self, command: Command) -> Result<(), RingError> {
        let tx = self.sender()?;

        // The worker has gone away without the manager being stopped.
        tx.send_async(command)
            .await
            .map_err(|_| RingError::NotRunning(Lifecycle::Stopped))
    }
}

async fn run_worker(
    shared: Weak<Shared>,
    mut ring: ConsistentHashRing,
    rx: flume::Receiver<Command>,
    run_loop: RunLoop,
) {
    let mut processed = 0;
    while run_loop.should_continue(processed) {
        let Ok(command) = rx.recv_async().await else {
            break;
        };

        ring = handle_command(ring, command);
        processed += 1;
    }

    // Close the mailbox before draining it so nothing new can be accepted.
    if let Some(shared) = shared.upgrade() {
        let mut state = shared.state.lock();
        state.lifecycle = Lifecycle::Stopped;
        state.tx = None;
    }

    // Callers part way through a send still hold a sender, the channel only
    // disconnects once every accepted command has been taken off the queue.
    let mut drained = 0;
    while let Ok(command) = rx.recv_async().await {
        ring = handle_command(ring, command);
        drained += 1;
    }

    info!(processed = processed, drained = drained, "Ring manager worker has exited.");
}

fn handle_command(ring: ConsistentHashRing, command: Command) -> ConsistentHashRing {
    match command {
        Command::AddNode(key) => {
            debug!(node = %key, "Adding node.");
            return ring.add_node(key);
        },
        Command::RemoveNode(key) => {
            debug!(node = %key, "Removing node.");
            return ring.remove_node(key);
        },
        Command::GetNode { key, reply } => {
            let _ = reply.send(ring.get_node(&key).cloned());
        },
        Command::GetNodes { key, count, reply } => {
            let nodes = ring
                .get_nodes(&key, count)
                .map(|nodes| nodes.into_iter().cloned().collect());
            let _ = reply.send(nodes);
        },
        Command::ListNodes(reply) => {
            let _ = reply.send(ring.nodes().cloned().collect());
        },
        Command::Ping(reply) => {
            let _ = reply.send(());
        },
    }

    ring
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_new_manager_is_not_started() {
        let manager = RingManager::new(["njal", "kjartan"]);
        assert!(manager.is_initialized());
        assert_eq!(manager.lifecycle(), Ok(Lifecycle::NotStarted));
        assert_eq!(manager.pending(), 0);
    }

    #[tokio::test]
    async fn test_start_transitions_to_running() {
        let manager = RingManager::new(["njal", "kjartan"]);
        manager.start().expect("Start manager.");

        assert_eq!(manager.lifecycle(), Ok(Lifecycle::Running));
        assert!(manager.ping().await);
        assert_eq!(manager.start().unwrap_err(), RingError::AlreadyStarted);

        manager.stop().expect("Stop manager.");
        assert_eq!(manager.lifecycle(), Ok(Lifecycle::Stopped));
    }

    #[tokio::test]
    async fn test_uninitialized_manager() {
        let broken = RingManager::default();

        assert!(!broken.is_initialized());
        assert_eq!(broken.lifecycle(), Err(RingError::NotInitialized));
        assert_eq!(broken.start().unwrap_err(), RingError::NotInitialized);
        assert_eq!(broken.stop(), Err(RingError::NotInitialized));
        assert_eq!(broken.add_node("junk").await, Err(RingError::NotInitialized));
        assert_eq!(broken.remove_node("junk").await, Err(RingError::NotInitialized));
        assert_eq!(broken.get_node("junk").await, Err(RingError::NotInitialized));
        assert_eq!(broken.get_nodes("junk", 2).await, Err(RingError::NotInitialized));
        assert_eq!(broken.nodes().await, Err(RingError::NotInitialized));
        assert_eq!(broken.try_ping().await, Err(RingError::NotInitialized));
        assert!(!broken.ping().await);
        assert_eq!(broken.pending(), 0);
    }

    #[tokio::test]
    async fn test_commands_before_start() {
        let manager = RingManager::new(["kjartan"]);

        let expected = Err(RingError::NotRunning(Lifecycle::NotStarted));
        assert_eq!(manager.add_node("njal").await, expected);
        assert_eq!(manager.remove_node("kjartan").await, expected);
        assert_eq!(manager.get_node("foo").await, Err(RingError::NotRunning(Lifecycle::NotStarted)));
        assert!(!manager.ping().await);
    }

    #[tokio::test]
    async fn test_add_then_get() {
        let manager = RingManager::new(Vec::<String>::new());
        manager.start().expect("Start manager.");

        assert_eq!(manager.get_node("foo").await, Err(RingError::EmptyRing));

        manager.add_node("n1").await.expect("Add node.");
        let node = manager.get_node("foo").await.expect("Get node.");
        assert_eq!(node, "n1");
    }

    #[tokio::test]
    async fn test_remove_node() {
        let manager = RingManager::new(["kjartan"]);
        manager.start().expect("Start manager.");

        manager.remove_node("kjartan").await.expect("Remove node.");
        assert_eq!(manager.get_node("foo").await, Err(RingError::EmptyRing));
        assert_eq!(manager.get_nodes("foo", 2).await, Err(RingError::EmptyRing));
        assert!(manager.nodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_and_get_nodes() {
        let manager = RingManager::new(["b", "a"]);
        manager.start().expect("Start manager.");

        manager.add_node("c").await.unwrap();
        manager.add_node("a").await.unwrap();
        assert_eq!(manager.nodes().await.unwrap(), vec!["a", "b", "c"]);

        let nodes = manager.get_nodes("foo", 2).await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0], manager.get_node("foo").await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_fails_fast() {
        let manager = RingManager::new(["kjartan"]);
        manager.start().expect("Start manager.");
        manager.stop().expect("Stop manager.");
        manager.stop().expect("Stopping twice is harmless.");

        let stopped = Err(RingError::NotRunning(Lifecycle::Stopped));
        assert_eq!(manager.add_node("njal").await, stopped);
        assert_eq!(manager.remove_node("njal").await, stopped);
        assert_eq!(manager.get_node("foo").await, Err(RingError::NotRunning(Lifecycle::Stopped)));
        assert!(!manager.ping().await);
        assert_eq!(
            manager.start().unwrap_err(),
            RingError::NotRunning(Lifecycle::Stopped),
            "A stopped manager cannot be restarted."
        );
    }

    #[tokio::test]
    async fn test_worker_exits_on_stop() {
        let manager = RingManager::new(["kjartan"]);
        let worker = manager.start().expect("Start manager.");
        manager.stop().expect("Stop manager.");

        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("Worker should exit once the mailbox is closed.")
            .expect("Worker should not panic.");
    }

    #[tokio::test]
    async fn test_run_loop_iterations() {
        let manager = RingManager::new(["kjartan"]);
        let worker = manager.start_with(RunLoop::Iterations(2)).unwrap();

        manager.add_node("njal").await.unwrap();
        assert_eq!(manager.get_nodes("foo", 5).await.unwrap().len(), 2);

        worker.await.expect("Worker should exit after two commands.");

        assert_eq!(manager.lifecycle(), Ok(Lifecycle::Stopped));
        assert!(!manager.ping().await);
        assert_eq!(
            manager.add_node("gunnar").await,
            Err(RingError::NotRunning(Lifecycle::Stopped)),
        );
    }

    #[tokio::test]
    async fn test_commands_queued_past_iterations_are_applied() {
        let manager = RingManager::new(Vec::<String>::new());
        let worker = manager.start_with(RunLoop::Iterations(1)).unwrap();

        // The worker does not get polled until this task yields, so both adds
        // are accepted before it has handled its one iteration.
        manager.add_node("njal").await.unwrap();
        manager.add_node("gunnar").await.unwrap();
        assert_eq!(manager.nodes().await.unwrap(), vec!["gunnar", "njal"]);

        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("Worker should exit once the mailbox is drained.")
            .expect("Worker should not panic.");

        assert_eq!(manager.lifecycle(), Ok(Lifecycle::Stopped));
        assert_eq!(
            manager.add_node("kari").await,
            Err(RingError::NotRunning(Lifecycle::Stopped)),
            "A mutation after the worker exits must not be reported as accepted."
        );
    }

    #[test]
    fn test_start_outside_runtime() {
        let manager = RingManager::new(["kjartan"]);
        assert_eq!(manager.start().err(), Some(RingError::NoRuntime));
        assert_eq!(manager.lifecycle(), Ok(Lifecycle::NotStarted));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            manager.start().expect("Start manager inside a runtime.");
            assert_eq!(manager.get_node("foo").await, Ok("kjartan".into()));
        });
    }

    #[tokio::test]
    async fn test_ping_timeout() {
        let manager = RingManager::with_config(
            ["kjartan"],
            ManagerConfig::default()
                .with_mailbox_capacity(1)
                .with_ping_timeout(Duration::from_millis(20)),
        );

        // Running but with no worker draining the mailbox.
        manager.shared().unwrap().state.lock().lifecycle = Lifecycle::Running;

        assert_eq!(
            manager.try_ping().await,
            Err(RingError::Timeout(Duration::from_millis(20)))
        );
    }

    #[test]
    fn test_run_loop() {
        assert!(RunLoop::Forever.should_continue(usize::MAX));
        assert!(RunLoop::Iterations(1).should_continue(0));
        assert!(!RunLoop::Iterations(1).should_continue(1));
        assert!(!RunLoop::Iterations(0).should_continue(0));
    }
}
