use super::stages;
use crate::channel::{Channel, ChannelError, ChannelManager, ChannelName, ChannelSignal, Connector, LinkEvent};
use crate::config::{FLIGHT_CHANNEL, GUIDANCE_CHANNEL, MissionConfig, OPERATOR_CHANNEL, PERCEPTION_CHANNEL};
use crate::hub::{Binding, MessageHub, ObserverHandle};
use crate::messages::flight::{self, FlightApi};
use crate::messages::guidance::{self, GuidanceApi};
use crate::messages::operator::{self, OperatorApi};
use crate::messages::perception::{self, PerceptionApi};
use crate::messages::{LinkStatus, Message, Schema};
use crate::mode_control::{Effects, MissionContext, ModeController, ModeSpec, Outcome, StateMachine, TreeError};
use crate::service::{PairError, ServicePair};
use crate::store::{MissionStore, StoreError};
use crate::{error, event, info, log, warn};
use strum_macros::Display;
use tokio::sync::mpsc;

/// Store key of the persisted [`MissionRecord`].
pub const RECORD_KEY: &str = "mission.bin";

const ALL_CHANNELS: [&str; 4] = [OPERATOR_CHANNEL, FLIGHT_CHANNEL, GUIDANCE_CHANNEL, PERCEPTION_CHANNEL];

#[derive(Debug, Display)]
pub enum MissionError {
    NotLoaded,
    Tree(TreeError),
    Channel(ChannelError),
    Pair(PairError),
    Store(StoreError),
}

impl std::error::Error for MissionError {}

impl From<TreeError> for MissionError {
    fn from(value: TreeError) -> Self { MissionError::Tree(value) }
}

impl From<ChannelError> for MissionError {
    fn from(value: ChannelError) -> Self { MissionError::Channel(value) }
}

impl From<PairError> for MissionError {
    fn from(value: PairError) -> Self { MissionError::Pair(value) }
}

impl From<StoreError> for MissionError {
    fn from(value: StoreError) -> Self { MissionError::Store(value) }
}

/// Lifecycle phase as driven by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Phase {
    Unloaded,
    Loaded,
    Active,
}

/// What survives a deactivation.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MissionRecord {
    pub activations: u64,
    pub transitions: u64,
    pub last_state: String,
}

/// Handlers the coordinator registers with the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Ping,
    ReportState,
    Telemetry,
    GuidanceFault,
    Machine,
}

#[derive(Default)]
struct Services {
    operator: Option<ServicePair<OperatorApi>>,
    flight: Option<ServicePair<FlightApi>>,
    guidance: Option<ServicePair<GuidanceApi>>,
    perception: Option<ServicePair<PerceptionApi>>,
}

/// Sends `command` through `pair`, logging instead of failing. A disconnected operator is
/// routine and only traced.
fn send_logged<S: Schema>(pair: Option<&mut ServicePair<S>>, channels: &mut ChannelManager, command: S::Outbound) {
    let id = S::outbound_id(&command);
    let Some(pair) = pair else {
        warn!("No {} pair for {id}", S::NAME);
        return;
    };
    match pair.send(channels, command) {
        Ok(_) => {}
        Err(PairError::NotConnected) => event!("Dropping {id}, {} not connected", S::NAME),
        Err(e) => warn!("Sending {id} failed: {e}"),
    }
}

/// Side effects of state hooks, backed by the coordinator's pairs.
struct MissionEnv<'a> {
    services: &'a mut Services,
    channels: &'a mut ChannelManager,
    modes: &'a mut ModeController,
}

impl Effects for MissionEnv<'_> {
    fn apply_mode(&mut self, context: &MissionContext, spec: &ModeSpec) {
        let entered = self.modes.enter(
            context,
            spec,
            self.services.flight.as_mut(),
            self.services.guidance.as_mut(),
            self.channels,
        );
        if let Err(e) = entered {
            warn!("{} entered without guidance mode {}: {e}", context.active(), spec.guidance());
        }
    }

    fn send_flight(&mut self, command: flight::Command) {
        send_logged(self.services.flight.as_mut(), self.channels, command);
    }

    fn send_guidance(&mut self, command: guidance::Command) {
        send_logged(self.services.guidance.as_mut(), self.channels, command);
    }

    fn send_perception(&mut self, command: perception::Command) {
        send_logged(self.services.perception.as_mut(), self.channels, command);
    }

    fn notify_operator(&mut self, event: operator::Event) {
        send_logged(self.services.operator.as_mut(), self.channels, event);
    }
}

fn state_report(context: &MissionContext, modes: &ModeController) -> operator::Event {
    operator::Event::StateReport(operator::StateReport {
        path: context.active().to_string(),
        transitions: context.transitions(),
        mode_ok: !modes.degraded(),
    })
}

/// Composition root of the mission. Owns every component and is the only thing the host
/// and the event loop talk to.
pub struct MissionCoordinator {
    config: MissionConfig,
    channels: ChannelManager,
    hub: MessageHub<Route>,
    machine: StateMachine,
    modes: ModeController,
    services: Services,
    observers: Vec<ObserverHandle>,
    store: MissionStore,
    record: MissionRecord,
    phase: Phase,
}

impl MissionCoordinator {
    /// Creates an unloaded coordinator.
    ///
    /// # Arguments
    /// - `config`: Endpoints, data directory and retry interval.
    /// - `connector`: Transport used for every channel.
    /// - `events`: Inbox the links report to; its receiver feeds [`Self::handle_link_event`].
    pub fn new(
        config: MissionConfig,
        connector: Box<dyn Connector>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Self, MissionError> {
        let machine = stages::build_machine()?;
        let store = MissionStore::new(config.data_dir.clone());
        Ok(Self {
            config,
            channels: ChannelManager::new(connector, events),
            hub: MessageHub::new(),
            machine,
            modes: ModeController::new(),
            services: Services::default(),
            observers: Vec::new(),
            store,
            record: MissionRecord::default(),
            phase: Phase::Unloaded,
        })
    }

    pub fn on_load(&mut self) {
        if self.phase != Phase::Unloaded {
            return;
        }
        self.services.operator = Some(ServicePair::new());
        self.phase = Phase::Loaded;
        info!("Mission loaded");
    }

    pub fn on_unload(&mut self) {
        if self.phase == Phase::Unloaded {
            return;
        }
        self.on_deactivate();
        self.services.operator = None;
        self.phase = Phase::Unloaded;
        info!("Mission unloaded");
    }

    /// Wires the mission up and starts the state machine. Activating an active mission is a
    /// no-op.
    ///
    /// # Errors
    /// `NotLoaded` before [`Self::on_load`]. Any setup failure is returned after everything
    /// set up so far has been torn down again.
    pub fn on_activate(&mut self) -> Result<(), MissionError> {
        match self.phase {
            Phase::Active => return Ok(()),
            Phase::Unloaded => return Err(MissionError::NotLoaded),
            Phase::Loaded => {}
        }
        if let Err(e) = self.setup() {
            error!("Mission activation failed: {e}");
            self.teardown(false);
            return Err(e);
        }
        self.phase = Phase::Active;
        info!("Mission active in {}", self.machine.active());
        Ok(())
    }

    /// Undoes [`Self::on_activate`] in reverse order and persists the mission record. Safe to
    /// call in any phase.
    pub fn on_deactivate(&mut self) {
        if self.phase != Phase::Active {
            return;
        }
        self.teardown(true);
        self.phase = Phase::Loaded;
        info!("Mission deactivated");
    }

    fn setup(&mut self) -> Result<(), MissionError> {
        let operator_ch = self.open_channel(OPERATOR_CHANNEL)?;
        let flight_ch = self.open_channel(FLIGHT_CHANNEL)?;
        let guidance_ch = self.open_channel(GUIDANCE_CHANNEL)?;
        let perception_ch = self.open_channel(PERCEPTION_CHANNEL)?;

        let Services { operator, flight, guidance, perception } = &mut self.services;
        operator.as_mut().ok_or(MissionError::NotLoaded)?.attach(operator_ch.clone(), false)?;
        flight.get_or_insert_with(ServicePair::new).attach(flight_ch, true)?;
        guidance.get_or_insert_with(ServicePair::new).attach(guidance_ch, true)?;
        perception.get_or_insert_with(ServicePair::new).attach(perception_ch, true)?;

        let operator_name = operator_ch.name();
        self.observers.push(self.hub.observe([
            (Binding::on(operator_name, operator::CommandKind::Ping), Route::Ping),
            (Binding::on(operator_name, LinkStatus::Connected), Route::ReportState),
            (Binding::any(flight::EventKind::Status), Route::Telemetry),
            (Binding::any(guidance::EventKind::Fault), Route::GuidanceFault),
        ]));
        let interest = self.machine.interest().into_iter().map(|id| (Binding::any(id), Route::Machine));
        self.observers.push(self.hub.observe(interest));

        let mut env = MissionEnv { services: &mut self.services, channels: &mut self.channels, modes: &mut self.modes };
        env.send_guidance(guidance::Command::Start(guidance::Start {}));
        env.send_perception(perception::Command::Start(perception::Start {}));
        self.machine.start(&mut env);

        self.record = self.load_record()?;
        self.record.activations += 1;
        log!("Activation {} of this mission", self.record.activations);
        Ok(())
    }

    fn open_channel(&mut self, name: &str) -> Result<Channel, ChannelError> {
        let endpoint = self.config.endpoint(name).unwrap_or_default();
        self.channels.open(name, endpoint)
    }

    /// Tears down whatever is set up, in reverse order. Every step tolerates the parts it
    /// undoes being absent.
    fn teardown(&mut self, persist: bool) {
        let transitions = self.machine.context().transitions();
        let last_state = self.machine.active().to_string();
        let was_running = self.machine.is_running();

        let mut env = MissionEnv { services: &mut self.services, channels: &mut self.channels, modes: &mut self.modes };
        self.machine.stop(&mut env);
        if was_running {
            env.send_perception(perception::Command::Stop(perception::Stop {}));
            env.send_guidance(guidance::Command::Stop(guidance::Stop {}));
        }

        for handle in self.observers.drain(..).rev() {
            self.hub.unobserve(handle);
        }

        let Services { operator, flight, guidance, perception } = &mut self.services;
        if let Some(pair) = perception.as_mut() {
            pair.detach();
        }
        if let Some(pair) = guidance.as_mut() {
            pair.detach();
        }
        if let Some(pair) = flight.as_mut() {
            pair.detach();
        }
        if let Some(pair) = operator.as_mut() {
            pair.detach();
        }
        *perception = None;
        *guidance = None;
        *flight = None;

        for name in ALL_CHANNELS.iter().rev() {
            if let Some(channel) = self.channels.channel(name) {
                self.channels.close(&channel);
            }
        }
        self.modes.reset();

        if persist {
            self.record.transitions += transitions;
            self.record.last_state = last_state;
            if let Err(e) = self.save_record() {
                error!("Persisting mission record failed: {e}");
            }
        }
    }

    fn load_record(&self) -> Result<MissionRecord, MissionError> {
        let Some(bytes) = self.store.read(RECORD_KEY)? else {
            return Ok(MissionRecord::default());
        };
        match bincode::serde::decode_from_slice(&bytes, bincode::config::standard()) {
            Ok((record, _)) => Ok(record),
            Err(e) => {
                warn!("Ignoring unreadable mission record: {e}");
                Ok(MissionRecord::default())
            }
        }
    }

    fn save_record(&self) -> Result<(), StoreError> {
        match bincode::serde::encode_to_vec(&self.record, bincode::config::standard()) {
            Ok(bytes) => self.store.write(RECORD_KEY, &bytes),
            Err(e) => {
                error!("Encoding mission record failed: {e}");
                Ok(())
            }
        }
    }

    /// Entry point of the event loop: filters one link event and dispatches what survives.
    pub fn handle_link_event(&mut self, event: LinkEvent) {
        let Some(signal) = self.channels.accept(event) else {
            return;
        };
        match signal {
            ChannelSignal::Status(channel, status) => {
                if status == LinkStatus::Connected {
                    self.flush(&channel);
                }
                self.dispatch(channel.name(), &Message::Link(status));
            }
            ChannelSignal::Frame(channel, frame) => {
                let Services { operator, flight, guidance, perception } = &self.services;
                let decoded = if operator.as_ref().is_some_and(|p| p.is_bound_to(&channel)) {
                    OperatorApi::decode(&frame)
                } else if flight.as_ref().is_some_and(|p| p.is_bound_to(&channel)) {
                    FlightApi::decode(&frame)
                } else if guidance.as_ref().is_some_and(|p| p.is_bound_to(&channel)) {
                    GuidanceApi::decode(&frame)
                } else if perception.as_ref().is_some_and(|p| p.is_bound_to(&channel)) {
                    PerceptionApi::decode(&frame)
                } else {
                    event!("No pair bound to {}, dropping frame", channel.name());
                    return;
                };
                match decoded {
                    Ok(message) => self.dispatch(channel.name(), &message),
                    Err(e) => warn!("Dropping malformed frame on {}: {e}", channel.name()),
                }
            }
        }
    }

    fn flush(&mut self, channel: &Channel) {
        let Services { operator, flight, guidance, perception } = &mut self.services;
        let channels = &mut self.channels;
        let delivered = if let Some(pair) = operator.as_mut().filter(|p| p.is_bound_to(channel)) {
            pair.flush(channels)
        } else if let Some(pair) = flight.as_mut().filter(|p| p.is_bound_to(channel)) {
            pair.flush(channels)
        } else if let Some(pair) = guidance.as_mut().filter(|p| p.is_bound_to(channel)) {
            pair.flush(channels)
        } else if let Some(pair) = perception.as_mut().filter(|p| p.is_bound_to(channel)) {
            pair.flush(channels)
        } else {
            0
        };
        if delivered > 0 {
            log!("Flushed {delivered} queued commands to {}", channel.name());
        }
    }

    fn dispatch(&mut self, source: &ChannelName, message: &Message) {
        event!("{} from {source}", message.id());
        let Self { hub, machine, channels, modes, services, .. } = self;
        hub.dispatch(source, message, |route, _, message| {
            let mut env = MissionEnv { services: &mut *services, channels: &mut *channels, modes: &mut *modes };
            match (route, message) {
                (Route::Machine, _) => {
                    if let Outcome::Transitioned { .. } = machine.handle(&mut env, message) {
                        let report = state_report(machine.context(), env.modes);
                        env.notify_operator(report);
                    }
                }
                (Route::Ping, Message::Operator(operator::Command::Ping(ping))) => {
                    env.notify_operator(operator::Event::Pong(operator::Pong { echo: ping.echo.clone() }));
                }
                (Route::ReportState, _) => {
                    let report = state_report(machine.context(), env.modes);
                    env.notify_operator(report);
                }
                (Route::Telemetry, Message::Flight(flight::Event::Status(status))) => {
                    env.notify_operator(operator::Event::Telemetry(operator::Telemetry {
                        timestamp: status.timestamp,
                        armed: status.armed,
                        altitude_m: status.altitude_m,
                        battery: status.battery,
                    }));
                }
                (Route::GuidanceFault, Message::Guidance(guidance::Event::Fault(fault))) => {
                    warn!("Guidance fault in {}: {}", machine.active(), fault.reason);
                }
                (route, message) => event!("{route:?} ignores {}", message.id()),
            }
        });
    }

    pub fn phase(&self) -> Phase { self.phase }
    pub fn channels(&self) -> &ChannelManager { &self.channels }
    pub fn machine(&self) -> &StateMachine { &self.machine }
    pub fn modes(&self) -> &ModeController { &self.modes }
    pub fn record(&self) -> &MissionRecord { &self.record }
    pub fn active_observers(&self) -> usize { self.hub.active_observers() }
}
