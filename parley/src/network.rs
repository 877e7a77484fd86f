//! Per-endpoint orchestration.
//!
//! A [`Network`] aggregates one connection, one outbound queue, and an
//! ordered plugin registry with per-registration settings, and turns I/O
//! readiness into plugin events. Registration and dispatch may run
//! concurrently from different threads; the outbound queue may be pushed
//! from any thread and is popped only by the reactor.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use mio::{Interest, Registry, Token};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use parley_core::connection::{ConnectProgress, Connection};
use parley_core::endpoint::{Endpoint, EndpointError};
use parley_core::error::ConnectionError;
use parley_core::message::{Message, MessageParser};
use parley_core::queue::SelectableQueue;
use parley_core::settings::{MissingSettings, Settings};
use parley_proto::Rfc2812Parser;

use crate::dispatch::{StoppedHandling, TaskGroup};
use crate::plugin::{Event, Plugin, PluginContext, PluginError};
use crate::query::{Query, QueryError};

/// Error type for network operations.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// A connection-fatal I/O fault; recovery is `reconnect`.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The endpoint address could not be parsed.
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    /// Registration was aborted because required settings are absent.
    #[error(transparent)]
    MissingSettings(#[from] MissingSettings),

    /// The plugin's `Register` invocation failed for another reason.
    #[error("plugin registration failed: {0}")]
    RegistrationFailed(#[source] PluginError),

    /// A plugin failed during sequential dispatch.
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// Concurrent dispatch was attempted after `stop_handling`.
    #[error(transparent)]
    StoppedHandling(#[from] StoppedHandling),

    /// A query captured an error or timed out.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Resource setup failed (e.g. the queue's wake pipe).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl NetworkError {
    /// Check whether this fault requires the reconnect/backoff path.
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Result type alias for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;

/// How plugin events are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Invoke every plugin inline, in registration order. An error aborts
    /// remaining dispatch for that event.
    #[default]
    Sequential,
    /// Run each invocation on the network's task group. No cross-plugin
    /// ordering; errors are logged, not propagated.
    Concurrent,
}

/// Network configuration.
#[derive(Debug, Clone)]
pub struct NetworkOptions {
    /// Dispatch mode used by the I/O path.
    pub dispatch: DispatchMode,
    /// Worker threads backing concurrent dispatch.
    pub worker_threads: usize,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::Sequential,
            worker_threads: num_cpus::get(),
        }
    }
}

impl NetworkOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dispatch mode.
    #[must_use]
    pub const fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Set the dispatch worker pool size.
    #[must_use]
    pub const fn with_worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers;
        self
    }
}

/// Opaque identity of one plugin registration.
///
/// Settings are addressed by handle, so registering the same plugin twice
/// yields two independent entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginHandle(u64);

struct InFlight {
    line: String,
    remaining: usize,
}

/// A client's relationship with one endpoint.
pub struct Network {
    endpoint: Endpoint,
    options: NetworkOptions,
    parser: Box<dyn MessageParser>,
    settings: Settings,
    connection: Mutex<Connection>,
    queue: SelectableQueue,
    plugins: RwLock<Vec<(PluginHandle, Arc<dyn Plugin>)>>,
    plugin_settings: DashMap<PluginHandle, Settings>,
    in_flight: Mutex<VecDeque<InFlight>>,
    tasks: TaskGroup,
    next_handle: AtomicU64,
}

impl Network {
    /// Create a network with the default parser and options.
    pub fn new(endpoint: &str, settings: Settings) -> Result<Arc<Self>> {
        Self::with_options(endpoint, settings, NetworkOptions::default(), Rfc2812Parser::new())
    }

    /// Create a network with explicit options and an injected parser.
    pub fn with_options(
        endpoint: &str,
        settings: Settings,
        options: NetworkOptions,
        parser: impl MessageParser + 'static,
    ) -> Result<Arc<Self>> {
        let endpoint = Endpoint::parse(endpoint)?;
        let queue = SelectableQueue::new()?;
        let tasks = TaskGroup::new(options.worker_threads);

        Ok(Arc::new(Self {
            endpoint,
            options,
            parser: Box::new(parser),
            settings,
            connection: Mutex::new(Connection::new()),
            queue,
            plugins: RwLock::new(Vec::new()),
            plugin_settings: DashMap::new(),
            in_flight: Mutex::new(VecDeque::new()),
            tasks,
            next_handle: AtomicU64::new(1),
        }))
    }

    /// The endpoint this network talks to.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Network-level settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The outbound queue.
    #[must_use]
    pub const fn queue(&self) -> &SelectableQueue {
        &self.queue
    }

    /// Check if the connection is established.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.connection.lock().connected()
    }

    /// A registration's private settings bucket.
    #[must_use]
    pub fn plugin_settings(&self, handle: PluginHandle) -> Option<Settings> {
        self.plugin_settings.get(&handle).map(|entry| entry.clone())
    }

    /// Check whether a handle is currently registered.
    #[must_use]
    pub fn registered(&self, handle: PluginHandle) -> bool {
        self.plugins.read().iter().any(|(h, _)| *h == handle)
    }

    /// Number of active registrations.
    #[must_use]
    pub fn plugin_count(&self) -> usize {
        self.plugins.read().len()
    }

    /// Register a plugin.
    ///
    /// The settings are placed in a fresh bucket for this registration and
    /// the plugin is invoked with [`Event::Register`] — synchronously, in
    /// every dispatch mode — *before* joining the active list.
    ///
    /// # Errors
    ///
    /// [`NetworkError::MissingSettings`] when the plugin requires settings
    /// that are absent, [`NetworkError::RegistrationFailed`] for any other
    /// `Register` failure. Both roll the settings bucket back; no partial
    /// state remains.
    pub fn register(self: &Arc<Self>, plugin: Arc<dyn Plugin>, settings: Settings) -> Result<PluginHandle> {
        let handle = PluginHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));

        let bucket = Settings::new();
        bucket.merge(&settings);
        self.plugin_settings.insert(handle, bucket);

        let ctx = PluginContext::new(Arc::clone(self), handle);
        match plugin.call(&Event::Register, &ctx) {
            Ok(()) => {
                self.plugins.write().push((handle, plugin));
                debug!(endpoint = %self.endpoint, ?handle, "plugin registered");
                Ok(handle)
            }
            Err(PluginError::MissingSettings(missing)) => {
                self.plugin_settings.remove(&handle);
                Err(NetworkError::MissingSettings(missing))
            }
            Err(error) => {
                self.plugin_settings.remove(&handle);
                Err(NetworkError::RegistrationFailed(error))
            }
        }
    }

    /// Unregister a plugin.
    ///
    /// Invokes the plugin with [`Event::Unregister`] (in concurrent mode
    /// this drains the task group first), then removes the registration and
    /// its settings together.
    ///
    /// Returns `Ok(false)` when the handle is not registered.
    pub fn unregister(self: &Arc<Self>, handle: PluginHandle) -> Result<bool> {
        let plugin = {
            let mut plugins = self.plugins.write();
            match plugins.iter().position(|(h, _)| *h == handle) {
                Some(index) => plugins.remove(index).1,
                None => return Ok(false),
            }
        };

        let result = self.invoke_one(handle, &plugin, Event::Unregister);
        self.plugin_settings.remove(&handle);
        debug!(endpoint = %self.endpoint, ?handle, "plugin unregistered");
        result.map(|()| true)
    }

    /// Start or advance the connection.
    ///
    /// Fires [`Event::Connect`] exactly once, at the moment the handshake
    /// completes. Calling on an established connection is a no-op success;
    /// a pending handshake is silent.
    pub fn connect(self: &Arc<Self>) -> Result<()> {
        let (was_connected, progress) = {
            let mut connection = self.connection.lock();
            let was_connected = connection.connected();
            (was_connected, connection.connect(&self.endpoint)?)
        };

        if !was_connected && progress == ConnectProgress::Connected {
            info!(endpoint = %self.endpoint, "connected");
            self.dispatch(Event::Connect)?;
        }
        Ok(())
    }

    /// Fire [`Event::Disconnect`] to all plugins, then close the
    /// connection.
    ///
    /// In concurrent mode the disconnect event drains the task group, so no
    /// plugin logic is still running against this network afterwards.
    pub fn disconnect(self: &Arc<Self>) -> Result<()> {
        let result = self.dispatch(Event::Disconnect);
        self.connection.lock().disconnect();
        info!(endpoint = %self.endpoint, "disconnected");
        result
    }

    /// Disconnect if connected, reset the connection, and connect again.
    ///
    /// The sole recovery action after a connection-fatal fault. Dispatch
    /// errors from the disconnect notification are logged, not propagated,
    /// so recovery always proceeds.
    pub fn reconnect(self: &Arc<Self>) -> Result<()> {
        info!(endpoint = %self.endpoint, "reconnecting");

        if self.connected() {
            if let Err(error) = self.dispatch(Event::Disconnect) {
                warn!(%error, "disconnect notification failed during reconnect");
            }
        }

        {
            let mut connection = self.connection.lock();
            connection.disconnect();
            connection.reset();
        }
        self.in_flight.lock().clear();

        self.connect()
    }

    /// Enqueue a raw outbound line. Safe to call from any thread.
    pub fn send(&self, line: impl Into<String>) {
        self.queue.push(line.into());
    }

    /// Handle read readiness: collect newly complete lines and dispatch
    /// each as [`Event::Receive`]. A no-op while not connected.
    pub fn selected_for_reading(self: &Arc<Self>) -> Result<()> {
        if !self.connected() {
            return Ok(());
        }

        let lines = self.connection.lock().read()?;
        for line in lines {
            let message = self.parser.parse(&line);
            trace!(endpoint = %self.endpoint, command = message.command(), "received");
            self.dispatch(Event::Receive(message))?;
        }
        Ok(())
    }

    /// Handle write readiness.
    ///
    /// While not connected this drives the (re)connection attempt. While
    /// connected it pops at most one queued payload, attempts a (partial)
    /// write, keeps the unflushed remainder buffered, and fires
    /// [`Event::Send`] exactly once per payload — only after its final byte
    /// has been flushed.
    pub fn selected_for_writing(self: &Arc<Self>) -> Result<()> {
        if !self.connected() {
            return self.connect();
        }

        let popped = self.queue.pop();
        let flushed = {
            let mut connection = self.connection.lock();
            match popped {
                Some(mut line) => {
                    if !line.ends_with('\n') {
                        line.push('\n');
                    }
                    self.in_flight.lock().push_back(InFlight {
                        remaining: line.len(),
                        line: line.clone(),
                    });
                    connection.write(&line)?
                }
                None if connection.pending_write_len() > 0 => connection.write("")?,
                None => 0,
            }
        };

        for line in self.take_completed(flushed) {
            trace!(endpoint = %self.endpoint, "sent");
            self.dispatch(Event::Send(line))?;
        }
        Ok(())
    }

    /// Dispatch an event to every plugin, inline and in registration order.
    ///
    /// # Errors
    ///
    /// The first plugin error aborts dispatch for the remaining plugins and
    /// is returned.
    pub fn handle_event(self: &Arc<Self>, event: &Event) -> Result<()> {
        let entries: Vec<(PluginHandle, Arc<dyn Plugin>)> = self.plugins.read().clone();
        for (handle, plugin) in entries {
            let ctx = PluginContext::new(Arc::clone(self), handle);
            plugin.call(event, &ctx).map_err(NetworkError::Plugin)?;
        }
        Ok(())
    }

    /// Dispatch an event to every plugin, one task per plugin on the
    /// network's task group.
    ///
    /// [`Event::Unregister`] and [`Event::Disconnect`] drain the group
    /// before returning, guaranteeing no plugin logic still runs against a
    /// network being torn down.
    ///
    /// # Errors
    ///
    /// [`NetworkError::StoppedHandling`] once [`Network::stop_handling`]
    /// has sealed the group.
    pub fn handle_event_concurrently(self: &Arc<Self>, event: &Event) -> Result<()> {
        let entries: Vec<(PluginHandle, Arc<dyn Plugin>)> = self.plugins.read().clone();
        let drain = matches!(event, Event::Unregister | Event::Disconnect);

        for (handle, plugin) in entries {
            self.spawn_invocation(handle, plugin, event.clone())?;
        }

        if drain {
            self.tasks.drain();
        }
        Ok(())
    }

    /// Seal the task group and block until all outstanding concurrent
    /// invocations complete — the drain barrier before tearing the network
    /// down. Subsequent concurrent dispatch fails with
    /// [`StoppedHandling`].
    pub fn stop_handling(&self) {
        self.tasks.seal_and_drain();
    }

    /// Run a query against this network.
    ///
    /// Registers the query, sends the triggering request, waits for the
    /// reply sequence, and unregisters — the unregistration happens even
    /// when waiting fails.
    ///
    /// # Errors
    ///
    /// Registration failures, plus whatever the query itself captured.
    pub fn run_query(self: &Arc<Self>, query: Arc<Query>, request: impl Into<String>) -> Result<Vec<Message>> {
        let handle = self.register(Arc::clone(&query) as Arc<dyn Plugin>, Settings::new())?;
        self.send(request);

        let result = query.messages();
        let _ = self.unregister(handle);

        result.map_err(NetworkError::from)
    }

    fn dispatch(self: &Arc<Self>, event: Event) -> Result<()> {
        match self.options.dispatch {
            DispatchMode::Sequential => self.handle_event(&event),
            DispatchMode::Concurrent => self.handle_event_concurrently(&event),
        }
    }

    fn invoke_one(self: &Arc<Self>, handle: PluginHandle, plugin: &Arc<dyn Plugin>, event: Event) -> Result<()> {
        match self.options.dispatch {
            DispatchMode::Sequential => {
                let ctx = PluginContext::new(Arc::clone(self), handle);
                plugin.call(&event, &ctx).map_err(NetworkError::Plugin)
            }
            DispatchMode::Concurrent => {
                let drain = matches!(event, Event::Unregister | Event::Disconnect);
                self.spawn_invocation(handle, Arc::clone(plugin), event)?;
                if drain {
                    self.tasks.drain();
                }
                Ok(())
            }
        }
    }

    fn spawn_invocation(self: &Arc<Self>, handle: PluginHandle, plugin: Arc<dyn Plugin>, event: Event) -> Result<()> {
        let ctx = PluginContext::new(Arc::clone(self), handle);
        self.tasks
            .spawn(Box::new(move || {
                if let Err(error) = plugin.call(&event, &ctx) {
                    warn!(%error, "plugin invocation failed");
                }
            }))
            .map_err(NetworkError::from)
    }

    fn take_completed(&self, mut flushed: usize) -> Vec<String> {
        let mut completed = Vec::new();
        let mut in_flight = self.in_flight.lock();

        while flushed > 0 {
            let keep_front = match in_flight.front_mut() {
                None => break,
                Some(front) => {
                    let consume = flushed.min(front.remaining);
                    front.remaining -= consume;
                    flushed -= consume;
                    front.remaining > 0
                }
            };

            if keep_front {
                break;
            }
            if let Some(entry) = in_flight.pop_front() {
                completed.push(entry.line);
            }
        }

        completed
    }

    pub(crate) fn socket_register(&self, registry: &Registry, token: Token, interests: Interest) -> io::Result<bool> {
        self.connection.lock().register(registry, token, interests)
    }

    pub(crate) fn socket_reregister(&self, registry: &Registry, token: Token, interests: Interest) -> io::Result<bool> {
        self.connection.lock().reregister(registry, token, interests)
    }

    pub(crate) fn socket_deregister(&self, registry: &Registry) -> io::Result<()> {
        self.connection.lock().deregister(registry)
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.connected())
            .field("plugins", &self.plugin_count())
            .field("queued", &self.queue.len())
            .finish()
    }
}
