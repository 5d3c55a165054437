use super::coordinator::{MissionCoordinator, MissionError, MissionRecord, Phase, RECORD_KEY};
use crate::channel::loopback::LoopbackConnector;
use crate::channel::{ChannelError, LinkEvent, LinkEventKind};
use crate::config::MissionConfig;
use crate::messages::flight::{self, EstimationMode};
use crate::messages::{guidance, operator, perception};
use crate::store::{MissionStore, StoreError};
use prost::Message as _;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

struct Harness {
    mission: MissionCoordinator,
    link: LoopbackConnector,
    dir: TempDir,
    _inbox: mpsc::UnboundedReceiver<LinkEvent>,
}

fn config(dir: &TempDir) -> MissionConfig {
    MissionConfig {
        operator_endpoint: "listen://127.0.0.1:0".to_string(),
        flight_endpoint: "tcp://127.0.0.1:7001".to_string(),
        guidance_endpoint: "tcp://127.0.0.1:7002".to_string(),
        perception_endpoint: "tcp://127.0.0.1:7003".to_string(),
        data_dir: dir.path().to_path_buf(),
        retry_interval: Duration::from_millis(10),
    }
}

fn harness_with(edit: impl FnOnce(&mut MissionConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&dir);
    edit(&mut cfg);
    let link = LoopbackConnector::default();
    let (tx, rx) = mpsc::unbounded_channel();
    let mission = MissionCoordinator::new(cfg, Box::new(link.clone()), tx).unwrap();
    Harness { mission, link, dir, _inbox: rx }
}

fn active() -> Harness {
    let mut h = harness_with(|_| {});
    h.mission.on_load();
    h.mission.on_activate().unwrap();
    h
}

impl Harness {
    fn event(&mut self, name: &str, kind: LinkEventKind) {
        let channel = self.mission.channels().channel(name).unwrap();
        self.mission.handle_link_event(LinkEvent {
            channel: channel.name().clone(),
            generation: channel.generation(),
            kind,
        });
    }

    fn connect_all(&mut self) {
        for name in ["operator", "flight", "guidance", "perception"] {
            self.event(name, LinkEventKind::Connected);
        }
    }

    fn operator_sends(&mut self, command: operator::Command) {
        let frame = operator::Upstream { content: Some(command) }.encode_to_vec();
        self.event("operator", LinkEventKind::Frame(frame));
    }

    fn flight_reports(&mut self, event: flight::Event) {
        let frame = flight::Report { content: Some(event) }.encode_to_vec();
        self.event("flight", LinkEventKind::Frame(frame));
    }

    fn guidance_reports(&mut self, event: guidance::Event) {
        let frame = guidance::Report { content: Some(event) }.encode_to_vec();
        self.event("guidance", LinkEventKind::Frame(frame));
    }

    fn perception_counts(&mut self, tally: u32) {
        let event = perception::Event::Count(perception::Count { tally });
        let frame = perception::Report { content: Some(event) }.encode_to_vec();
        self.event("perception", LinkEventKind::Frame(frame));
    }

    fn to_operator(&self) -> Vec<operator::Event> {
        self.link
            .sent("operator")
            .iter()
            .filter_map(|f| operator::Downstream::decode(f.as_slice()).unwrap().content)
            .collect()
    }

    fn to_flight(&self) -> Vec<flight::Command> {
        self.link
            .sent("flight")
            .iter()
            .filter_map(|f| flight::Request::decode(f.as_slice()).unwrap().content)
            .collect()
    }

    fn to_guidance(&self) -> Vec<guidance::Command> {
        self.link
            .sent("guidance")
            .iter()
            .filter_map(|f| guidance::Request::decode(f.as_slice()).unwrap().content)
            .collect()
    }

    fn to_perception(&self) -> Vec<perception::Command> {
        self.link
            .sent("perception")
            .iter()
            .filter_map(|f| perception::Request::decode(f.as_slice()).unwrap().content)
            .collect()
    }
}

fn configure(say: bool) -> guidance::Command {
    let params = [("say".to_string(), say.to_string())].into_iter().collect();
    guidance::Command::ConfigureMode(guidance::ConfigureMode { mode: "idle".to_string(), params })
}

fn report(path: &str, transitions: u64) -> operator::Event {
    operator::Event::StateReport(operator::StateReport { path: path.to_string(), transitions, mode_ok: true })
}

fn say() -> operator::Command { operator::Command::Say(operator::Say { text: Some("hello".to_string()) }) }

fn hold() -> operator::Command { operator::Command::Hold(operator::Hold {}) }

#[test]
fn test_activation_requires_load() {
    let mut h = harness_with(|_| {});
    assert!(matches!(h.mission.on_activate(), Err(MissionError::NotLoaded)));
    assert_eq!(h.mission.channels().open_count(), 0);
}

#[test]
fn test_activate_deactivate_round_trip() {
    let mut h = active();
    assert_eq!(h.mission.phase(), Phase::Active);
    assert_eq!(h.mission.channels().open_count(), 4);
    assert_eq!(h.mission.active_observers(), 2);

    h.mission.on_deactivate();
    assert_eq!(h.mission.phase(), Phase::Loaded);
    assert_eq!(h.mission.channels().open_count(), 0);
    assert_eq!(h.mission.active_observers(), 0);
    h.mission.on_deactivate();
    assert_eq!(h.mission.phase(), Phase::Loaded);

    h.mission.on_activate().unwrap();
    assert_eq!(h.mission.channels().open_count(), 4);
    assert_eq!(h.mission.active_observers(), 2);
    assert_eq!(h.mission.machine().active().to_string(), "ground.idle");

    let targets: Vec<String> = h.link.targets().iter().map(|t| t.channel.to_string()).collect();
    assert_eq!(targets.len(), 8);
    assert_eq!(targets[..4], targets[4..]);
}

#[test]
fn test_unload_deactivates_first() {
    let mut h = active();
    h.mission.on_unload();
    assert_eq!(h.mission.phase(), Phase::Unloaded);
    assert_eq!(h.mission.channels().open_count(), 0);
    assert_eq!(h.mission.active_observers(), 0);
}

#[test]
fn test_failed_setup_rolls_back() {
    let mut h = harness_with(|cfg| cfg.flight_endpoint = "serial:///dev/ttyS0".to_string());
    h.mission.on_load();
    let result = h.mission.on_activate();
    assert!(matches!(result, Err(MissionError::Channel(ChannelError::BadEndpoint(_)))));
    assert_eq!(h.mission.phase(), Phase::Loaded);
    assert_eq!(h.mission.channels().open_count(), 0);
    assert_eq!(h.mission.active_observers(), 0);
    assert!(!h.mission.machine().is_running());
    assert_eq!(h.link.targets().len(), 1);
}

#[test]
fn test_store_failure_after_start_rolls_back() {
    let mut h = harness_with(|cfg| {
        let occupied = cfg.data_dir.join("occupied");
        std::fs::write(&occupied, b"x").unwrap();
        cfg.data_dir = occupied;
    });
    h.mission.on_load();
    let result = h.mission.on_activate();
    assert!(matches!(result, Err(MissionError::Store(StoreError::Io(_)))));
    assert_eq!(h.mission.phase(), Phase::Loaded);
    assert_eq!(h.mission.channels().open_count(), 0);
    assert_eq!(h.mission.active_observers(), 0);
    assert!(!h.mission.machine().is_running());
    assert_eq!(h.link.targets().len(), 4);
    assert!(h.to_guidance().is_empty());
    assert!(h.to_perception().is_empty());
}

#[test]
fn test_deactivate_sends_stop_commands() {
    let mut h = active();
    h.connect_all();
    h.link.clear();
    h.mission.on_deactivate();
    assert_eq!(h.to_perception().last(), Some(&perception::Command::Stop(perception::Stop {})));
    assert_eq!(h.to_guidance().last(), Some(&guidance::Command::Stop(guidance::Stop {})));
    assert!(!h.mission.machine().is_running());
}

#[test]
fn test_queued_commands_flush_on_connect() {
    let mut h = active();
    assert!(h.to_guidance().is_empty());

    h.connect_all();
    assert_eq!(h.to_guidance(), vec![guidance::Command::Start(guidance::Start {}), configure(false)]);
    assert_eq!(
        h.to_flight(),
        vec![flight::Command::SetEstimationMode(flight::SetEstimationMode { mode: EstimationMode::Ground as i32 })]
    );
    assert_eq!(h.to_perception(), vec![perception::Command::Start(perception::Start {})]);
}

#[test]
fn test_operator_connect_reports_state_once() {
    let mut h = active();
    h.connect_all();
    h.event("operator", LinkEventKind::Connected);
    assert_eq!(h.to_operator(), vec![report("ground.idle", 0)]);

    h.event("operator", LinkEventKind::Disconnected);
    h.event("operator", LinkEventKind::Connected);
    assert_eq!(h.to_operator().len(), 2);
}

#[test]
fn test_say_and_hold_round_trip() {
    let mut h = active();
    h.connect_all();
    h.link.clear();

    h.operator_sends(say());
    assert_eq!(h.mission.machine().active().to_string(), "ground.say");
    assert_eq!(h.to_guidance(), vec![configure(true)]);
    assert_eq!(h.to_operator(), vec![report("ground.say", 1)]);

    h.link.clear();
    h.operator_sends(hold());
    assert_eq!(h.mission.machine().active().to_string(), "ground.idle");
    assert_eq!(h.to_guidance(), vec![configure(false)]);
    assert_eq!(h.to_operator(), vec![report("ground.idle", 2)]);
    assert_eq!(h.mission.modes().current(), Some("idle"));
}

#[test]
fn test_counts_forwarded_only_while_saying() {
    let mut h = active();
    h.connect_all();
    h.perception_counts(3);
    h.link.clear();

    h.operator_sends(say());
    h.perception_counts(4);
    h.perception_counts(5);
    let counts: Vec<u64> = h
        .to_operator()
        .into_iter()
        .filter_map(|e| match e {
            operator::Event::Count(c) => Some(c.value),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![1, 2]);
    assert_eq!(h.mission.machine().active().to_string(), "ground.say");
}

#[test]
fn test_ping_pong() {
    let mut h = active();
    h.connect_all();
    h.link.clear();
    h.operator_sends(operator::Command::Ping(operator::Ping { echo: Some("abc".to_string()) }));
    assert_eq!(
        h.to_operator(),
        vec![operator::Event::Pong(operator::Pong { echo: Some("abc".to_string()) })]
    );
}

#[test]
fn test_flight_status_becomes_telemetry() {
    let mut h = active();
    h.connect_all();
    h.link.clear();
    h.flight_reports(flight::Event::Status(flight::Status {
        timestamp: 42,
        armed: true,
        altitude_m: 3.5,
        battery: 0.75,
    }));
    assert_eq!(
        h.to_operator(),
        vec![operator::Event::Telemetry(operator::Telemetry {
            timestamp: 42,
            armed: true,
            altitude_m: 3.5,
            battery: 0.75,
        })]
    );
}

#[test]
fn test_flight_with_fault_and_landing() {
    let mut h = active();
    h.connect_all();
    h.operator_sends(operator::Command::Takeoff(operator::Takeoff { altitude_m: 12.0 }));
    assert_eq!(h.mission.machine().active().to_string(), "air.hover");
    assert_eq!(h.to_perception().last(), Some(&perception::Command::Stop(perception::Stop {})));

    h.link.clear();
    h.guidance_reports(guidance::Event::Fault(guidance::Fault { reason: "lost track".to_string() }));
    assert_eq!(h.mission.machine().active().to_string(), "air.descend");
    assert!(h.to_guidance().contains(&guidance::Command::Start(guidance::Start {})));

    h.flight_reports(flight::Event::Landed(flight::Landed {}));
    assert_eq!(h.mission.machine().active().to_string(), "ground.idle");
}

#[test]
fn test_malformed_frames_are_dropped() {
    let mut h = active();
    h.connect_all();
    h.link.clear();
    h.event("operator", LinkEventKind::Frame(vec![0xff, 0xff, 0xff]));
    h.event("operator", LinkEventKind::Frame(Vec::new()));
    assert!(h.to_operator().is_empty());
    assert_eq!(h.mission.machine().active().to_string(), "ground.idle");

    h.operator_sends(say());
    assert_eq!(h.mission.machine().active().to_string(), "ground.say");
}

#[test]
fn test_record_persisted_on_deactivate() {
    let mut h = active();
    h.connect_all();
    h.operator_sends(say());
    h.operator_sends(hold());
    h.operator_sends(say());
    h.mission.on_deactivate();

    let bytes = MissionStore::new(h.dir.path()).read(RECORD_KEY).unwrap().unwrap();
    let (record, _): (MissionRecord, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
    assert_eq!(record, MissionRecord { activations: 1, transitions: 3, last_state: "ground.say".to_string() });

    h.mission.on_activate().unwrap();
    assert_eq!(h.mission.record().activations, 2);
    assert_eq!(h.mission.record().transitions, 3);
}
