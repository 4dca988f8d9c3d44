//! Demo command implementation.
//!
//! Runs a device against a simulated cloud living on the other side of a
//! [`MemoryTransport`]. The cloud assigns a thing id, answers the shadow
//! request, flips `sw1` every few seconds and prints everything the device
//! pushes.

use parking_lot::Mutex;
use propsync_codec::{PackCodec, Record, SenmlCodec, Value};
use propsync_core::objects::{self, ActiveHook};
use propsync_core::topics::{self, ThingTopics};
use propsync_core::{
    CallbackResult, Client, ClientConfig, ExecutionMode, MemoryHandle, MemoryTransport, Property,
    TZ_DST_UNTIL, TZ_OFFSET,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const THING_ID: &str = "demo-thing";

/// Runs the demo command.
pub fn run(device_id: &str, polled: bool, seconds: u64) -> Result<(), Box<dyn std::error::Error>> {
    let mode = if polled {
        ExecutionMode::Polled
    } else {
        ExecutionMode::EventLoop
    };
    let transport = MemoryTransport::new();
    let cloud = SimulatedCloud::new(transport.handle(), device_id);
    let mut client = Client::new(ClientConfig::new(device_id).with_mode(mode), transport);
    register_device(&mut client, cloud)?;

    let duration = Duration::from_secs(seconds);
    info!(device_id, ?mode, seconds, "running demo");
    match mode {
        ExecutionMode::EventLoop => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            match runtime.block_on(tokio::time::timeout(duration, client.run())) {
                Ok(result) => result?,
                Err(_) => info!("demo finished"),
            }
        }
        ExecutionMode::Polled => {
            let deadline = Instant::now() + duration;
            client.start()?;
            while Instant::now() < deadline {
                let wait = client.update()?;
                let remaining = deadline.saturating_duration_since(Instant::now());
                std::thread::sleep(wait.min(remaining));
            }
            info!("demo finished");
        }
    }

    print_summary(&client);
    Ok(())
}

fn register_device(
    client: &mut Client,
    cloud: SimulatedCloud,
) -> Result<(), Box<dyn std::error::Error>> {
    client.register(
        Property::new("sw1")
            .with_interval(Duration::from_millis(250))
            .on_write(|client, value| {
                if let Some(on) = value.as_value() {
                    client.set("led", on.clone())?;
                }
                Ok(())
            }),
    )?;

    client.register(Property::new("led"))?;

    client.register(
        Property::new("clk")
            .with_interval(Duration::from_secs(1))
            .on_read(|client| {
                let secs = client.unix_time() % 86_400;
                Ok(Value::Text(format!(
                    "{:02}:{:02}:{:02}",
                    secs / 3600,
                    secs / 60 % 60,
                    secs % 60
                )))
            }),
    )?;

    client.register(objects::colored_light("clight").with_field("swi", true).on_write(
        |_, clight| {
            let field = |key| clight.field(key).map_or_else(|| "-".to_string(), Value::to_string);
            info!(
                swi = %field("swi"),
                hue = %field("hue"),
                sat = %field("sat"),
                bri = %field("bri"),
                "ColoredLight changed"
            );
            Ok(())
        },
    ))?;

    client.register(
        objects::location("treasureisland")
            .with_field("lat", 31.264_694)
            .with_field("lon", 29.979_987),
    )?;

    let on_active: ActiveHook = Arc::new(|_: &mut Client, schedule: &Property| -> CallbackResult<()> {
        info!(schedule = schedule.name(), "Schedule activated");
        Ok(())
    });
    let (schedule, _) = objects::schedule("schedule", Some(on_active));
    client.register(schedule)?;

    client.register(
        Property::task("user_task")
            .with_interval(Duration::from_secs(1))
            .on_run(|client| {
                #[allow(clippy::cast_precision_loss)]
                let level = (client.unix_time() % 100) as f64;
                client.set_child("clight", "hue", level)?;
                client.set_child("clight", "bri", 100.0 - level)?;
                Ok(())
            }),
    )?;

    let cloud = Mutex::new(cloud);
    client.register(
        Property::task("cloud")
            .with_interval(Duration::from_millis(200))
            .on_run(move |client| cloud.lock().tick(client)),
    )?;
    Ok(())
}

fn print_summary(client: &Client) {
    println!();
    println!("State: {:?}", client.state());
    println!("Thing: {}", client.thing_id().unwrap_or("-"));
    for property in client.registry().iter() {
        if property.is_task() {
            continue;
        }
        if property.is_object() {
            for (_, field) in property.children() {
                print_property(field);
            }
        } else {
            print_property(property);
        }
    }
}

fn print_property(property: &Property) {
    let value = property
        .value()
        .map_or_else(|| "-".to_string(), Value::to_string);
    println!("  {:<24} {}", property.name(), value);
}

/// The cloud end of the demo.
struct SimulatedCloud {
    handle: MemoryHandle,
    codec: SenmlCodec,
    device_topic: String,
    topics: ThingTopics,
    assigned: bool,
    ticks: u64,
    switch: bool,
}

impl SimulatedCloud {
    fn new(handle: MemoryHandle, device_id: &str) -> Self {
        Self {
            handle,
            codec: SenmlCodec::new(),
            device_topic: topics::device_inbound(device_id),
            topics: ThingTopics::new(THING_ID),
            assigned: false,
            ticks: 0,
            switch: false,
        }
    }

    fn tick(&mut self, client: &Client) -> CallbackResult<()> {
        self.ticks += 1;

        if !self.assigned && self.handle.is_subscribed(&self.device_topic) {
            self.send(&self.device_topic, &[Record::new("thing_id", THING_ID)])?;
            self.assigned = true;
            info!(thing_id = THING_ID, "cloud: device linked");
        }

        for message in self.handle.take_published() {
            let mut records = Vec::new();
            self.codec
                .decode(&message.payload, &mut |record| records.push(record))?;
            if message.topic == self.topics.shadow_out {
                info!("cloud: answering last values request");
                let reply = self.last_values(client.unix_time());
                self.send(&self.topics.shadow_in, &reply)?;
                continue;
            }
            for record in records {
                let value = record
                    .value
                    .map_or_else(|| "-".to_string(), |v| v.to_string());
                println!("cloud <- {} = {}", record.name, value);
            }
        }

        if self.handle.is_subscribed(&self.topics.inbound) && self.ticks % 15 == 0 {
            self.switch = !self.switch;
            info!(sw1 = self.switch, "cloud: toggling switch");
            self.send(&self.topics.inbound, &[Record::new("sw1", self.switch)])?;
        }
        Ok(())
    }

    fn send(&self, topic: &str, records: &[Record]) -> CallbackResult<()> {
        let payload = self.codec.encode(records)?;
        self.handle.inject(topic, payload);
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn last_values(&self, now: u64) -> Vec<Record> {
        let start = now as i64 + 3;
        vec![
            Record::new("sw1", false),
            Record::new("led", false),
            Record::new("clight:hue", 20.0),
            Record::new("clight:sat", 75.0),
            Record::new("clight:bri", 60.0),
            Record::new("schedule:frm", start),
            Record::new("schedule:to", start + 3600),
            Record::new("schedule:len", 5),
            Record::new("schedule:msk", 0),
            Record::new(TZ_OFFSET, 0),
            Record::new(TZ_DST_UNTIL, 0),
        ]
    }
}
