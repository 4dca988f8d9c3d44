//! The sync client.

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::property::Property;
use crate::protocol::SyncState;
use crate::registry::{Registry, LAST_VALUES, LAST_VALUES_REQUEST, THING_ID, TZ_DST_UNTIL, TZ_OFFSET};
use crate::scheduler::{Scheduler, Task, TaskKind, TaskOutcome};
use crate::topics::{self, ThingTopics};
use crate::transport::Transport;
use propsync_codec::{PackCodec, SenmlCodec, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Name of the connection task.
pub const CONNECT_TASK: &str = "conn_task";

/// Name of the sync task.
pub const SYNC_TASK: &str = "sync_task";

/// A device-side cloud property client.
///
/// The client owns the registry of properties, the scheduler running their
/// hooks and the protocol state of the connection. All mutation goes through
/// `&mut Client`; hooks receive the client so they can read and write other
/// properties.
///
/// # Example
///
/// ```
/// use propsync_core::{Client, ClientConfig, ExecutionMode, MemoryTransport, Property};
///
/// let config = ClientConfig::new("device-1").with_mode(ExecutionMode::Polled);
/// let mut client = Client::new(config, MemoryTransport::new());
/// client.register(Property::new("led").with_value(false)).unwrap();
///
/// client.start().unwrap();
/// client.set("led", true).unwrap();
/// client.update().unwrap();
/// ```
pub struct Client {
    pub(crate) config: ClientConfig,
    pub(crate) registry: Registry,
    pub(crate) scheduler: Scheduler,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) codec: Box<dyn PackCodec>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) state: SyncState,
    pub(crate) thing_id: Option<String>,
    pub(crate) topics: Option<ThingTopics>,
    pub(crate) device_topic: String,
    pub(crate) last_keepalive: Duration,
    pub(crate) started: bool,
}

impl Client {
    /// Creates a client over the given transport.
    ///
    /// The cloud-initialized properties `thing_id`, `tz_offset` and
    /// `tz_dst_until` are registered up front.
    pub fn new(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let mut client = Self {
            device_topic: topics::device_inbound(&config.device_id),
            config,
            registry: Registry::new(),
            scheduler: Scheduler::new(),
            transport: Box::new(transport),
            codec: Box::new(SenmlCodec::new()),
            last_keepalive: clock.now(),
            clock,
            state: SyncState::Disconnected,
            thing_id: None,
            topics: None,
            started: false,
        };
        for name in [THING_ID, TZ_OFFSET, TZ_DST_UNTIL] {
            if let Err(err) = client.registry.insert(Property::new(name)) {
                debug!(error = %err, "internal property already present");
            }
        }
        client.ensure_last_values_request();
        client
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.last_keepalive = clock.now();
        self.clock = Arc::new(clock);
        self
    }

    /// Replaces the record pack codec.
    pub fn with_codec(mut self, codec: impl PackCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Device id.
    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    /// Thing id, once discovery completed.
    pub fn thing_id(&self) -> Option<&str> {
        self.thing_id.as_deref()
    }

    /// Protocol state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Returns true while connected to the broker.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected() && self.transport.is_connected()
    }

    /// Property registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Task scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Current unix time of the client's clock.
    pub fn unix_time(&self) -> u64 {
        self.clock.unix_time()
    }

    /// Registers a property.
    ///
    /// An uninitialized leaf with a read hook is seeded from it. Properties
    /// with any hook get a task. Registering an uninitialized property
    /// queues a request for the last known values unless one is pending.
    /// Registered properties are stamped with the client's clock.
    pub fn register(&mut self, mut property: Property) -> ClientResult<()> {
        let name = property.name().to_string();
        let reserved = name == CONNECT_TASK || name == SYNC_TASK;
        if reserved || self.registry.contains(&name) || self.scheduler.contains(&name) {
            return Err(ClientError::DuplicateProperty(name));
        }

        if property.is_leaf() && !property.is_initialized() {
            if let Some(read) = property.read_hook() {
                match read(&*self) {
                    Ok(value) => {
                        let timestamp = self.clock.unix_time();
                        if let Err(err) = property.set_value_at(Some(value), timestamp) {
                            warn!(property = %name, error = %err, "dropping initial value");
                        }
                    }
                    Err(err) => warn!(property = %name, error = %err, "initial read failed"),
                }
            }
        }

        property.stamp(self.clock.unix_time());
        let runnable = property.is_runnable();
        let initialized = property.is_initialized();
        let interval = property.interval().unwrap_or(self.config.default_interval);
        let backoff = property.backoff();
        self.registry.insert(property)?;

        if runnable {
            let mut task = Task::new(name.as_str(), TaskKind::Property, interval);
            if let Some(backoff) = backoff {
                task = task.with_backoff(backoff);
            }
            self.scheduler.add(task)?;
            info!(task = %name, "task created");
        }
        if !initialized {
            self.ensure_last_values_request();
        }
        Ok(())
    }

    fn ensure_last_values_request(&mut self) {
        if self.registry.last_values_pending() {
            return;
        }
        let request = Property::new(LAST_VALUES).with_value(LAST_VALUES_REQUEST);
        if let Err(err) = self.registry.insert(request) {
            debug!(error = %err, "last values request already queued");
        }
    }

    /// Returns true if a property with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Looks up a property.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.registry.get(name)
    }

    /// Value of a leaf property.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.registry.get(name).and_then(Property::value)
    }

    /// Value of a leaf property, or `default` if it is unknown or unset.
    pub fn get_or(&self, name: &str, default: impl Into<Value>) -> Value {
        self.value(name).cloned().unwrap_or_else(|| default.into())
    }

    /// Value of an object field.
    pub fn child_value(&self, name: &str, field: &str) -> Option<&Value> {
        self.registry.get(name).and_then(|p| p.field(field))
    }

    /// Assigns a leaf property locally.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> ClientResult<()> {
        let timestamp = self.clock.unix_time();
        self.registry
            .get_mut(name)
            .ok_or_else(|| ClientError::UnknownProperty(name.to_string()))?
            .set_value_at(Some(value.into()), timestamp)
    }

    /// Assigns an object field locally.
    pub fn set_child(&mut self, name: &str, field: &str, value: impl Into<Value>) -> ClientResult<()> {
        let timestamp = self.clock.unix_time();
        self.registry
            .get_mut(name)
            .ok_or_else(|| ClientError::UnknownProperty(name.to_string()))?
            .set_field_at(field, Some(value.into()), timestamp)
    }

    /// Runs the hooks of a property once: `on_run`, then `on_read`, then
    /// `on_write` if a cloud update is pending.
    ///
    /// A value of the wrong type returned by `on_read` is dropped; an error
    /// returned by any hook fails the task.
    pub fn run_once(&mut self, name: &str) -> TaskOutcome {
        let Some(property) = self.registry.get(name) else {
            return TaskOutcome::Failed(ClientError::UnknownProperty(name.to_string()));
        };
        let (on_run, on_read, on_write) =
            (property.run_hook(), property.read_hook(), property.write_hook());

        if let Some(run) = on_run {
            if let Err(err) = run(self) {
                return TaskOutcome::Failed(ClientError::task_failed(name, err));
            }
        }

        if let Some(read) = on_read {
            match read(&*self) {
                Ok(value) => {
                    let timestamp = self.clock.unix_time();
                    if let Some(property) = self.registry.get_mut(name) {
                        if let Err(err) = property.set_value_at(Some(value), timestamp) {
                            warn!(property = %name, error = %err, "dropping value read");
                        }
                    }
                }
                Err(err) => return TaskOutcome::Failed(ClientError::task_failed(name, err)),
            }
        }

        if let Some(write) = on_write {
            let pending = self.registry.get_mut(name).and_then(Property::take_write);
            if let Some(value) = pending {
                if let Err(err) = write(self, &value) {
                    return TaskOutcome::Failed(ClientError::task_failed(name, err));
                }
            }
        }
        TaskOutcome::Continue
    }

    /// Runs every due task once, in registration order, and returns the
    /// time until the next one is due.
    ///
    /// This is the step shared by both execution modes. In polled mode the
    /// host calls it repeatedly. Only fatal errors are returned; task
    /// failures are handled here.
    pub fn update(&mut self) -> ClientResult<Duration> {
        let now = self.clock.now();
        for (name, kind) in self.scheduler.due(now) {
            if !self.scheduler.contains(&name) {
                continue;
            }
            let outcome = match kind {
                TaskKind::Property => self.run_once(&name),
                TaskKind::Connect => TaskOutcome::from_result(self.reconnect_step()),
                TaskKind::Sync => TaskOutcome::from_result(self.sync_step()),
            };
            self.supervise(&name, kind, outcome, now)?;
        }
        Ok(self
            .scheduler
            .next_wakeup(self.clock.now())
            .unwrap_or(self.config.sync_interval))
    }

    fn supervise(
        &mut self,
        name: &str,
        kind: TaskKind,
        outcome: TaskOutcome,
        now: Duration,
    ) -> ClientResult<()> {
        match outcome {
            TaskOutcome::Continue => self.scheduler.complete_run(name, now),
            TaskOutcome::Done => {
                self.scheduler.remove(name);
                info!(task = %name, "task complete");
            }
            TaskOutcome::Failed(err) if err.is_fatal() => {
                self.scheduler.remove(name);
                error!(task = %name, error = %err, "task failed, stopping client");
                return Err(err);
            }
            TaskOutcome::Failed(err) => {
                self.scheduler.remove(name);
                match kind {
                    TaskKind::Property => {
                        self.registry.remove(name);
                        error!(task = %name, error = %err, "task raised an error, removed with its property");
                    }
                    TaskKind::Connect | TaskKind::Sync => {
                        error!(task = %name, error = %err, "connection lost");
                        self.on_sync_lost();
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ExecutionMode;
    use crate::error::CallbackResult;
    use crate::transport::MemoryTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client() -> (Client, ManualClock) {
        let clock = ManualClock::new(1_700_000_000);
        let config = ClientConfig::new("dev-1").with_mode(ExecutionMode::Polled);
        let client = Client::new(config, MemoryTransport::new()).with_clock(clock.clone());
        (client, clock)
    }

    fn counter() -> (
        Arc<AtomicUsize>,
        impl Fn(&mut Client) -> CallbackResult<()> + Send + Sync + 'static,
    ) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = Arc::clone(&count);
        (count, move |_: &mut Client| -> CallbackResult<()> {
            hook_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn internal_properties_registered() {
        let (client, _) = client();
        assert!(client.contains(THING_ID));
        assert!(client.contains(TZ_OFFSET));
        assert!(client.contains(TZ_DST_UNTIL));
        assert_eq!(
            client.value(LAST_VALUES),
            Some(&Value::Text(LAST_VALUES_REQUEST.into()))
        );
    }

    #[test]
    fn registration_uses_client_clock() {
        let (mut client, clock) = client();
        clock.advance(Duration::from_secs(30));
        client.register(Property::new("led").with_value(false)).unwrap();
        client
            .register(Property::object("light", &["swi", "bri"]).with_field("swi", true))
            .unwrap();

        let now = 1_700_000_030;
        assert_eq!(client.property("led").unwrap().timestamp(), now);
        let light = client.property("light").unwrap();
        assert_eq!(light.timestamp(), now);
        assert_eq!(light.child("swi").unwrap().timestamp(), now);

        clock.advance(Duration::from_secs(5));
        client.set("led", true).unwrap();
        assert_eq!(client.property("led").unwrap().timestamp(), now + 5);
    }

    #[test]
    fn one_last_values_request() {
        let (mut client, _) = client();
        client.register(Property::new("a")).unwrap();
        client.register(Property::new("b")).unwrap();
        client
            .register(Property::object("c", &["x", "y"]))
            .unwrap();

        let requests = client
            .registry()
            .iter()
            .filter(|p| p.name() == LAST_VALUES)
            .count();
        assert_eq!(requests, 1);
        assert!(matches!(
            client.register(Property::new(LAST_VALUES)),
            Err(ClientError::DuplicateProperty(_))
        ));
    }

    #[test]
    fn duplicate_names_rejected() {
        let (mut client, _) = client();
        client.register(Property::new("led").with_value(true)).unwrap();
        assert!(matches!(
            client.register(Property::new("led")),
            Err(ClientError::DuplicateProperty(_))
        ));
        assert!(matches!(
            client.register(Property::new(THING_ID)),
            Err(ClientError::DuplicateProperty(_))
        ));
        assert!(matches!(
            client.register(Property::task(CONNECT_TASK).on_run(|_| Ok(()))),
            Err(ClientError::DuplicateProperty(_))
        ));
    }

    #[test]
    fn read_hook_seeds_uninitialized_leaf() {
        let (mut client, _) = client();
        client
            .register(Property::new("clk").on_read(|_| Ok(Value::Integer(5))))
            .unwrap();

        let clk = client.property("clk").unwrap();
        assert_eq!(clk.value(), Some(&Value::Integer(5)));
        assert!(!clk.is_dirty());
        assert!(client.scheduler().contains("clk"));
    }

    #[test]
    fn setters_and_lookups() {
        let (mut client, _) = client();
        client
            .register(Property::object("light", &["swi", "bri"]))
            .unwrap();
        client.register(Property::new("led").with_value(false)).unwrap();

        client.set("led", true).unwrap();
        assert!(client.property("led").unwrap().is_dirty());
        client.set_child("light", "bri", 3.5).unwrap();
        assert_eq!(client.child_value("light", "bri"), Some(&Value::Float(3.5)));
        assert_eq!(client.get_or("missing", 7), Value::Integer(7));
        assert_eq!(client.get_or("led", false), Value::Bool(true));

        assert!(matches!(
            client.set("missing", 1),
            Err(ClientError::UnknownProperty(_))
        ));
        assert!(matches!(
            client.set("led", 1),
            Err(ClientError::TypeMismatch { .. })
        ));
        assert!(matches!(
            client.set("light", 1),
            Err(ClientError::NotALeaf(_))
        ));
    }

    #[test]
    fn failing_task_is_evicted_alone() {
        let (mut client, clock) = client();
        let (good_runs, good) = counter();
        client.register(Property::task("good").on_run(good)).unwrap();
        client
            .register(Property::task("bad").on_run(|_| Err("sensor offline".into())))
            .unwrap();

        client.update().unwrap();
        assert!(!client.contains("bad"));
        assert!(!client.scheduler().contains("bad"));

        clock.advance(Duration::from_secs(1));
        client.update().unwrap();
        assert_eq!(good_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wrong_type_from_read_hook_keeps_task() {
        let (mut client, clock) = client();
        client
            .register(
                Property::new("clk")
                    .with_value(1)
                    .on_read(|_| Ok(Value::Text("late".into()))),
            )
            .unwrap();

        client.update().unwrap();
        clock.advance(Duration::from_secs(1));
        client.update().unwrap();

        assert_eq!(client.value("clk"), Some(&Value::Integer(1)));
        assert_eq!(client.scheduler().get("clk").unwrap().runs(), 2);
    }

    #[test]
    fn hooks_run_in_order() {
        let (mut client, _) = client();
        client
            .register(
                Property::new("n")
                    .with_value(0)
                    .on_run(|client| {
                        let next = client.value("n").and_then(Value::as_integer).unwrap_or(0) + 10;
                        client.set("n", next)?;
                        Ok(())
                    })
                    .on_read(|client| {
                        let n = client.value("n").and_then(Value::as_integer).unwrap_or(0);
                        Ok(Value::Integer(n + 1))
                    }),
            )
            .unwrap();

        assert!(matches!(client.run_once("n"), TaskOutcome::Continue));
        assert_eq!(client.value("n"), Some(&Value::Integer(11)));
        assert!(matches!(
            client.run_once("missing"),
            TaskOutcome::Failed(ClientError::UnknownProperty(_))
        ));
    }

    #[test]
    fn polled_scheduler_fairness() {
        let (mut client, clock) = client();
        let (fast_runs, fast) = counter();
        let (slow_runs, slow) = counter();
        client
            .register(
                Property::task("fast")
                    .on_run(fast)
                    .with_interval(Duration::from_millis(250)),
            )
            .unwrap();
        client
            .register(
                Property::task("slow")
                    .on_run(slow)
                    .with_interval(Duration::from_secs(1)),
            )
            .unwrap();

        client.update().unwrap();
        for _ in 0..19 {
            clock.advance(Duration::from_millis(50));
            client.update().unwrap();
        }

        let fast = fast_runs.load(Ordering::SeqCst);
        let slow = slow_runs.load(Ordering::SeqCst);
        assert!((3..=5).contains(&fast), "fast ran {fast} times");
        assert!(slow <= 2, "slow ran {slow} times");
    }
}
