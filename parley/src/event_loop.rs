//! The reactor: readiness selection across every network's socket and
//! outbound queue.
//!
//! One poll call per tick. The interest sets are recomputed every tick from
//! network state (connected, queue depth) and every desired handle is
//! re-registered, which re-arms delivery, so the loop behaves like a
//! classic level-triggered select over freshly computed sets.
//!
//! A handler that reports a connection-fatal fault triggers `reconnect` on
//! its network and puts the handle in the skip-set: it is excluded from
//! selection until after the next poll timeout, which makes the timeout
//! double as the fixed reconnect retry interval.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::{Events, Interest, Poll, Token};
use tracing::{debug, warn};

use crate::network::Network;

/// Default poll timeout, doubling as the reconnect retry interval.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reactor configuration.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Upper bound on one readiness wait.
    pub timeout: Duration,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl LoopOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll timeout / reconnect retry interval.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Cooperative stop switch for a running [`EventLoop`].
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Create a stop switch not yet attached to a loop; see
    /// [`EventLoop::use_stop_handle`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask the loop to stop. It exits after finishing the current tick.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-threaded reactor driving a set of networks.
pub struct EventLoop {
    networks: Vec<Arc<Network>>,
    options: LoopOptions,
    poll: Poll,
    events: Events,
    stop: Arc<AtomicBool>,
    skip: HashSet<Token>,
    armed: HashSet<Token>,
}

impl EventLoop {
    /// Create a reactor over `networks` with default options.
    pub fn new(networks: Vec<Arc<Network>>) -> io::Result<Self> {
        Self::with_options(networks, LoopOptions::default())
    }

    /// Create a reactor with explicit options.
    pub fn with_options(networks: Vec<Arc<Network>>, options: LoopOptions) -> io::Result<Self> {
        Ok(Self {
            networks,
            options,
            poll: Poll::new()?,
            events: Events::with_capacity(256),
            stop: Arc::new(AtomicBool::new(false)),
            skip: HashSet::new(),
            armed: HashSet::new(),
        })
    }

    /// The token of a network's socket handle.
    #[must_use]
    pub const fn socket_token(index: usize) -> Token {
        Token(index * 2)
    }

    /// The token of a network's queue readiness handle.
    #[must_use]
    pub const fn queue_token(index: usize) -> Token {
        Token(index * 2 + 1)
    }

    /// Handles to monitor for reading: connected networks and their queues,
    /// minus the skip-set.
    #[must_use]
    pub fn for_reading(&self) -> Vec<Token> {
        let mut tokens = Vec::new();
        for (index, network) in self.networks.iter().enumerate() {
            if network.connected() {
                tokens.push(Self::socket_token(index));
                tokens.push(Self::queue_token(index));
            }
        }
        tokens.retain(|token| !self.skip.contains(token));
        tokens
    }

    /// Handles to monitor for writing: networks with pending outbound
    /// payloads and unconnected networks, minus the skip-set.
    #[must_use]
    pub fn for_writing(&self) -> Vec<Token> {
        let mut tokens = Vec::new();
        for (index, network) in self.networks.iter().enumerate() {
            if !network.queue().is_empty() || !network.connected() {
                tokens.push(Self::socket_token(index));
            }
        }
        tokens.retain(|token| !self.skip.contains(token));
        tokens
    }

    /// A handle that stops the loop from another thread.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: Arc::clone(&self.stop),
        }
    }

    /// Adopt an externally created stop switch, so a handle can exist
    /// before the loop does.
    pub fn use_stop_handle(&mut self, handle: &StopHandle) {
        self.stop = Arc::clone(&handle.flag);
    }

    /// Ask the loop to stop between ticks.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Run the reactor. Blocks until stopped.
    ///
    /// Initiates a connect on every network first; a network that cannot
    /// connect is retried by the regular tick cycle rather than failing the
    /// loop.
    ///
    /// # Errors
    ///
    /// Only poller failures surface here; network faults feed the
    /// reconnect/backoff path instead.
    pub fn start(&mut self) -> io::Result<()> {
        for network in &self.networks {
            if let Err(error) = network.connect() {
                warn!(endpoint = %network.endpoint(), %error, "initial connect failed");
            }
        }

        while !self.stop.load(Ordering::SeqCst) {
            self.tick()?;
        }
        self.stop.store(false, Ordering::SeqCst);

        debug!("event loop stopped");
        Ok(())
    }

    /// One reactor tick: recompute interest sets, wait for readiness, and
    /// run the read/write handlers of every fired handle.
    pub fn tick(&mut self) -> io::Result<()> {
        let reading = self.for_reading();
        let writing = self.for_writing();

        let mut desired: HashMap<Token, Interest> = HashMap::new();
        for token in &reading {
            desired
                .entry(*token)
                .and_modify(|interest| *interest = interest.add(Interest::READABLE))
                .or_insert(Interest::READABLE);
        }
        for token in &writing {
            desired
                .entry(*token)
                .and_modify(|interest| *interest = interest.add(Interest::WRITABLE))
                .or_insert(Interest::WRITABLE);
        }

        let stale: Vec<Token> = self
            .armed
            .iter()
            .copied()
            .filter(|token| !desired.contains_key(token))
            .collect();
        for token in stale {
            self.disarm(token);
            self.armed.remove(&token);
        }

        // Handles whose socket does not exist yet cannot report readiness;
        // their write handler runs unconditionally after the wait so a
        // connect attempt still happens once per tick.
        let mut unarmed_writers = Vec::new();
        for (&token, &interest) in &desired {
            match self.arm(token, interest) {
                Ok(true) => {
                    self.armed.insert(token);
                }
                Ok(false) => {
                    self.armed.remove(&token);
                    if writing.contains(&token) {
                        unarmed_writers.push(token);
                    }
                }
                Err(error) => warn!(?token, %error, "failed to arm handle"),
            }
        }

        match self.poll.poll(&mut self.events, Some(self.options.timeout)) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }

        self.skip.clear();

        let fired: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|event| (event.token(), event.is_readable(), event.is_writable()))
            .collect();

        for (token, readable, writable) in fired {
            if readable && reading.contains(&token) && !self.skip.contains(&token) {
                self.handle_readable(token);
            }
            if writable && writing.contains(&token) && !self.skip.contains(&token) {
                self.handle_writable(token);
            }
        }

        for token in unarmed_writers {
            if !self.skip.contains(&token) {
                self.handle_writable(token);
            }
        }

        Ok(())
    }

    /// Run a readable handle's handler. Connection-fatal faults trigger a
    /// reconnect and skip the handle for the remainder of this tick.
    fn handle_readable(&mut self, token: Token) {
        if token.0 % 2 == 1 {
            // Queue readiness only wakes the tick; wake bytes are consumed
            // by pop.
            return;
        }

        let network = Arc::clone(&self.networks[token.0 / 2]);
        if let Err(error) = network.selected_for_reading() {
            self.handle_fault(token, &network, &error);
        }
    }

    /// Run a writable handle's handler, same fault policy as reads.
    fn handle_writable(&mut self, token: Token) {
        let network = Arc::clone(&self.networks[token.0 / 2]);
        if let Err(error) = network.selected_for_writing() {
            self.handle_fault(token, &network, &error);
        }
    }

    fn handle_fault(&mut self, token: Token, network: &Arc<Network>, error: &crate::network::NetworkError) {
        if error.is_connection_fatal() {
            warn!(endpoint = %network.endpoint(), %error, "connection fault, reconnecting");
            if let Err(reconnect_error) = network.reconnect() {
                warn!(endpoint = %network.endpoint(), %reconnect_error, "reconnect failed");
            }
            self.skip.insert(token);
        } else {
            // Plugin-domain errors never feed the retry path.
            warn!(endpoint = %network.endpoint(), %error, "dispatch error");
        }
    }

    fn arm(&self, token: Token, interest: Interest) -> io::Result<bool> {
        let registry = self.poll.registry();
        let network = &self.networks[token.0 / 2];

        if token.0 % 2 == 1 {
            match network.queue().reregister(registry, token, interest) {
                Ok(()) => Ok(true),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    network.queue().register(registry, token, interest).map(|()| true)
                }
                Err(error) => Err(error),
            }
        } else {
            match network.socket_reregister(registry, token, interest) {
                Ok(found) => Ok(found),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    network.socket_register(registry, token, interest)
                }
                Err(error) => Err(error),
            }
        }
    }

    fn disarm(&self, token: Token) {
        let registry = self.poll.registry();
        let network = &self.networks[token.0 / 2];

        let result = if token.0 % 2 == 1 {
            network.queue().deregister(registry)
        } else {
            network.socket_deregister(registry)
        };

        if let Err(error) = result {
            if error.kind() != io::ErrorKind::NotFound {
                debug!(?token, %error, "failed to disarm handle");
            }
        }
    }
}
