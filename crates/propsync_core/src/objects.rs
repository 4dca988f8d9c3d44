//! Object presets for common cloud variable types.
//!
//! Field names follow the cloud's naming for each type, so the cloud
//! dashboard widgets bind to them directly.

use crate::client::Client;
use crate::error::CallbackResult;
use crate::property::Property;
use crate::registry::TZ_OFFSET;
use propsync_codec::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Latitude and longitude.
pub fn location(name: impl Into<String>) -> Property {
    Property::object(name, &["lat", "lon"])
}

/// Hue, saturation and brightness.
pub fn color(name: impl Into<String>) -> Property {
    Property::object(name, &["hue", "sat", "bri"])
}

/// Switch plus color.
pub fn colored_light(name: impl Into<String>) -> Property {
    Property::object(name, &["swi", "hue", "sat", "bri"])
}

/// Switch plus brightness.
pub fn dimmed_light(name: impl Into<String>) -> Property {
    Property::object(name, &["swi", "bri"])
}

/// Switch, volume, mute, playback command, input and channel.
///
/// `pbc` carries a [`Playback`] code and `inp` an [`Input`] code.
pub fn television(name: impl Into<String>) -> Property {
    Property::object(name, &["swi", "vol", "mut", "pbc", "inp", "cha"])
}

/// Playback command of a [`television`] (`pbc` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Playback {
    FastForward = 0,
    Next = 1,
    Pause = 2,
    Play = 3,
    Previous = 4,
    Rewind = 5,
    StartOver = 6,
    Stop = 7,
    None = 255,
}

impl Playback {
    /// Decodes a `pbc` field value.
    pub fn from_value(value: &Value) -> Option<Self> {
        let code = value.as_float()?;
        [
            Playback::FastForward,
            Playback::Next,
            Playback::Pause,
            Playback::Play,
            Playback::Previous,
            Playback::Rewind,
            Playback::StartOver,
            Playback::Stop,
            Playback::None,
        ]
        .into_iter()
        .find(|p| f64::from(*p as u8) == code)
    }
}

impl From<Playback> for Value {
    fn from(playback: Playback) -> Self {
        Value::Integer(i64::from(playback as u8))
    }
}

/// Input source of a [`television`] (`inp` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Input {
    Aux1 = 0,
    Aux2 = 1,
    Aux3 = 2,
    Aux4 = 3,
    Aux5 = 4,
    Aux6 = 5,
    Aux7 = 6,
    BluRay = 7,
    Cable = 8,
    Cd = 9,
    Coax1 = 10,
    Coax2 = 11,
    Composite1 = 12,
    Dvd = 13,
    Game = 14,
    HdRadio = 15,
    Hdmi1 = 16,
    Hdmi2 = 17,
    Hdmi3 = 18,
    Hdmi4 = 19,
    Hdmi5 = 20,
    Hdmi6 = 21,
    Hdmi7 = 22,
    Hdmi8 = 23,
    Hdmi9 = 24,
    Hdmi10 = 25,
    HdmiArc = 26,
    Input1 = 27,
    Input2 = 28,
    Input3 = 29,
    Input4 = 30,
    Input5 = 31,
    Input6 = 32,
    Input7 = 33,
    Input8 = 34,
    Input9 = 35,
    Input10 = 36,
    IPod = 37,
    Line1 = 38,
    Line2 = 39,
    Line3 = 40,
    Line4 = 41,
    Line5 = 42,
    Line6 = 43,
    Line7 = 44,
    MediaPlayer = 45,
    Optical1 = 46,
    Optical2 = 47,
    Phono = 48,
    PlayStation = 49,
    PlayStation3 = 50,
    PlayStation4 = 51,
    Satellite = 52,
    SmartCast = 53,
    Tuner = 54,
    Tv = 55,
    UsbDac = 56,
    Video1 = 57,
    Video2 = 58,
    Video3 = 59,
    Xbox = 60,
}

impl Input {
    const ALL: [Input; 61] = [
        Input::Aux1,
        Input::Aux2,
        Input::Aux3,
        Input::Aux4,
        Input::Aux5,
        Input::Aux6,
        Input::Aux7,
        Input::BluRay,
        Input::Cable,
        Input::Cd,
        Input::Coax1,
        Input::Coax2,
        Input::Composite1,
        Input::Dvd,
        Input::Game,
        Input::HdRadio,
        Input::Hdmi1,
        Input::Hdmi2,
        Input::Hdmi3,
        Input::Hdmi4,
        Input::Hdmi5,
        Input::Hdmi6,
        Input::Hdmi7,
        Input::Hdmi8,
        Input::Hdmi9,
        Input::Hdmi10,
        Input::HdmiArc,
        Input::Input1,
        Input::Input2,
        Input::Input3,
        Input::Input4,
        Input::Input5,
        Input::Input6,
        Input::Input7,
        Input::Input8,
        Input::Input9,
        Input::Input10,
        Input::IPod,
        Input::Line1,
        Input::Line2,
        Input::Line3,
        Input::Line4,
        Input::Line5,
        Input::Line6,
        Input::Line7,
        Input::MediaPlayer,
        Input::Optical1,
        Input::Optical2,
        Input::Phono,
        Input::PlayStation,
        Input::PlayStation3,
        Input::PlayStation4,
        Input::Satellite,
        Input::SmartCast,
        Input::Tuner,
        Input::Tv,
        Input::UsbDac,
        Input::Video1,
        Input::Video2,
        Input::Video3,
        Input::Xbox,
    ];

    /// Decodes an `inp` field value.
    pub fn from_value(value: &Value) -> Option<Self> {
        let code = value.as_float()?;
        Self::ALL.into_iter().find(|i| f64::from(*i as u8) == code)
    }
}

impl From<Input> for Value {
    fn from(input: Input) -> Self {
        Value::Integer(i64::from(input as u8))
    }
}

/// Hook fired when a schedule becomes active. Receives the schedule.
pub type ActiveHook = Arc<dyn Fn(&mut Client, &Property) -> CallbackResult<()> + Send + Sync>;

/// Activation flag of a schedule created by [`schedule`].
#[derive(Debug, Clone, Default)]
pub struct ScheduleState {
    active: Arc<AtomicBool>,
}

impl ScheduleState {
    /// Returns true while the current local time is inside the schedule.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// A schedule: start (`frm`), end (`to`), active length (`len`) and
/// repetition mask (`msk`).
///
/// On every tick the schedule compares the local time (unix time plus the
/// cloud's `tz_offset`) against `frm .. frm + len`. `on_active` fires once
/// on each transition from inactive to active.
pub fn schedule(name: impl Into<String>, on_active: Option<ActiveHook>) -> (Property, ScheduleState) {
    let name = name.into();
    let state = ScheduleState::default();
    let active = Arc::clone(&state.active);
    let key = name.clone();

    let property = Property::object(name, &["frm", "to", "len", "msk"]).on_run(
        move |client: &mut Client| -> CallbackResult<()> {
            let Some(snapshot) = client.property(&key).filter(|p| p.is_initialized()).cloned() else {
                return Ok(());
            };
            let start = snapshot.field("frm").and_then(Value::as_float).unwrap_or(0.0);
            let length = snapshot.field("len").and_then(Value::as_float).unwrap_or(0.0);
            let offset = client.value(TZ_OFFSET).and_then(Value::as_float).unwrap_or(0.0);
            #[allow(clippy::cast_precision_loss)]
            let now = client.unix_time() as f64 + offset;

            if now > start && now < start + length {
                if !active.swap(true, Ordering::SeqCst) {
                    debug!(schedule = %key, "schedule active");
                    if let Some(hook) = &on_active {
                        hook(client, &snapshot)?;
                    }
                }
            } else {
                active.store(false, Ordering::SeqCst);
            }
            Ok(())
        },
    );
    (property, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{ClientConfig, ExecutionMode};
    use crate::transport::MemoryTransport;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn preset_fields() {
        let fields = |p: Property| -> Vec<String> { p.children().map(|(k, _)| k.to_string()).collect() };
        assert_eq!(fields(location("pos")), vec!["lat", "lon"]);
        assert_eq!(fields(color("c")), vec!["bri", "hue", "sat"]);
        assert_eq!(fields(colored_light("l")).len(), 4);
        assert_eq!(fields(dimmed_light("d")), vec!["bri", "swi"]);
        assert_eq!(fields(television("tv")).len(), 6);
        assert_eq!(
            location("pos").child("lat").map(Property::name),
            Some("pos:lat")
        );
    }

    #[test]
    fn television_codes() {
        assert_eq!(Value::from(Playback::Play), Value::Integer(3));
        assert_eq!(Value::from(Playback::None), Value::Integer(255));
        assert_eq!(Value::from(Input::Hdmi1), Value::Integer(16));
        assert_eq!(Value::from(Input::Xbox), Value::Integer(60));

        assert_eq!(Playback::from_value(&Value::Integer(7)), Some(Playback::Stop));
        assert_eq!(Playback::from_value(&Value::Float(2.0)), Some(Playback::Pause));
        assert_eq!(Playback::from_value(&Value::Integer(8)), None);
        assert_eq!(Input::from_value(&Value::Integer(55)), Some(Input::Tv));
        assert_eq!(Input::from_value(&Value::Bool(true)), None);

        let tv = television("tv")
            .with_field("pbc", Playback::Pause)
            .with_field("inp", Input::HdmiArc);
        assert_eq!(tv.field("pbc"), Some(&Value::Integer(2)));
        assert_eq!(tv.field("inp").and_then(Input::from_value), Some(Input::HdmiArc));
    }

    #[test]
    fn schedule_fires_on_activation_edge() {
        let clock = ManualClock::new(NOW);
        let config = ClientConfig::new("dev").with_mode(ExecutionMode::Polled);
        let mut client = Client::new(config, MemoryTransport::new()).with_clock(clock.clone());

        let fired = Arc::new(AtomicUsize::new(0));
        let hook_fired = Arc::clone(&fired);
        let hook: ActiveHook = Arc::new(move |_: &mut Client, schedule: &Property| -> CallbackResult<()> {
            assert_eq!(schedule.name(), "sched");
            hook_fired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let (property, state) = schedule("sched", Some(hook));
        #[allow(clippy::cast_possible_wrap)]
        let start = NOW as i64 + 5;
        let property = property
            .with_field("frm", start)
            .with_field("to", start + 100)
            .with_field("len", 10)
            .with_field("msk", 0);
        client.register(property).unwrap();

        client.update().unwrap();
        assert!(!state.is_active());

        for _ in 0..3 {
            clock.advance(Duration::from_secs(4));
            client.update().unwrap();
        }
        // t = NOW + 12: inside [frm, frm + len)
        assert!(state.is_active());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(10));
        client.update().unwrap();
        assert!(!state.is_active());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn uninitialized_schedule_stays_inactive() {
        let config = ClientConfig::new("dev").with_mode(ExecutionMode::Polled);
        let mut client = Client::new(config, MemoryTransport::new());
        let (property, state) = schedule("sched", None);
        client.register(property).unwrap();

        client.update().unwrap();
        assert!(!state.is_active());
        assert!(client.contains("sched"));
    }
}
