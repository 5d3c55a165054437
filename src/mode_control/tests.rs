use super::mode_controller::ModeError;
use super::state_tree::StatePath;
use super::*;
use crate::channel::loopback::LoopbackConnector;
use crate::channel::{ChannelManager, LinkEvent, LinkEventKind};
use crate::messages::flight::{self, EstimationMode, FlightApi};
use crate::messages::guidance::{self, GuidanceApi};
use crate::messages::{Message, MessageId, operator, perception};
use crate::service::{PairError, ServicePair};
use prost::Message as _;
use tokio::sync::mpsc;

#[derive(Default)]
struct Recorder {
    trace: Vec<String>,
    modes: Vec<(String, ModeSpec)>,
    operator: Vec<operator::Event>,
}

impl Effects for Recorder {
    fn apply_mode(&mut self, context: &MissionContext, spec: &ModeSpec) {
        self.trace.push(format!("mode {}", spec.guidance()));
        self.modes.push((context.active().to_string(), spec.clone()));
    }
    fn send_flight(&mut self, _command: flight::Command) {}
    fn send_guidance(&mut self, _command: guidance::Command) {}
    fn send_perception(&mut self, _command: perception::Command) {}
    fn notify_operator(&mut self, event: operator::Event) {
        if let operator::Event::Pong(operator::Pong { echo: Some(echo) }) = &event {
            self.trace.push(echo.clone());
        }
        self.operator.push(event);
    }
}

fn mark(effects: &mut dyn Effects, text: &str) {
    effects.notify_operator(operator::Event::Pong(operator::Pong { echo: Some(text.to_string()) }));
}

fn enter_idle(effects: &mut dyn Effects, _: &mut StateMemory, _: Option<&Message>) { mark(effects, "enter idle"); }
fn exit_idle(effects: &mut dyn Effects, _: &mut StateMemory) { mark(effects, "exit idle"); }
fn enter_say(effects: &mut dyn Effects, _: &mut StateMemory, _: Option<&Message>) { mark(effects, "enter say"); }
fn exit_say(effects: &mut dyn Effects, _: &mut StateMemory) { mark(effects, "exit say"); }

fn count_step(effects: &mut dyn Effects, memory: &mut StateMemory, _: &Message) {
    let value = memory.bump("count");
    effects.notify_operator(operator::Event::Count(operator::Count { value }));
}

fn say_mode(say: bool) -> ModeSpec { ModeSpec::new("idle", EstimationMode::Ground).with_param("say", say) }

fn ground() -> Stage {
    Stage::new("ground", "idle")
        .with(State::new("idle").with_mode(say_mode(false)).on_enter(enter_idle).on_exit(exit_idle))
        .with(
            State::new("say")
                .with_mode(say_mode(true))
                .on_enter(enter_say)
                .on_exit(exit_say)
                .on_step([perception::EventKind::Count], count_step),
        )
}

fn air() -> Stage {
    Stage::new("air", "hover")
        .with(State::new("hover").with_mode(ModeSpec::new("hover", EstimationMode::Inertial)))
        .with(State::new("descend").with_mode(ModeSpec::new("descend", EstimationMode::Inertial)))
}

fn root() -> Stage { Stage::new("mission", "ground").with(ground()).with(air()) }

fn transitions() -> Vec<Transition> {
    vec![
        Transition::new(operator::CommandKind::Say, "ground.idle", "ground.say"),
        Transition::new(operator::CommandKind::Hold, "ground.say", "ground.idle"),
        Transition::new(operator::CommandKind::Takeoff, "ground.idle", "air"),
        Transition::new(operator::CommandKind::Land, "air.hover", "air.descend"),
        Transition::new(flight::EventKind::Landed, "air.descend", "ground"),
    ]
}

fn started() -> (StateMachine, Recorder) {
    let mut machine = StateMachine::new(root(), transitions()).unwrap();
    let mut recorder = Recorder::default();
    machine.start(&mut recorder);
    (machine, recorder)
}

fn say() -> Message { Message::Operator(operator::Command::Say(operator::Say { text: None })) }
fn hold() -> Message { Message::Operator(operator::Command::Hold(operator::Hold {})) }
fn takeoff() -> Message { Message::Operator(operator::Command::Takeoff(operator::Takeoff { altitude_m: 10.0 })) }
fn count() -> Message { Message::Perception(perception::Event::Count(perception::Count { tally: 1 })) }

#[test]
fn test_start_enters_initial_chain() {
    let (machine, recorder) = started();
    assert_eq!(machine.active(), &StatePath::from("ground.idle"));
    assert!(machine.is_running());
    assert_eq!(recorder.trace, vec!["mode idle", "enter idle"]);
    assert_eq!(recorder.modes[0].0, "ground.idle");
}

#[test]
fn test_say_and_hold_toggle_guidance_config() {
    let (mut machine, mut recorder) = started();
    recorder.trace.clear();

    let outcome = machine.handle(&mut recorder, &say());
    assert_eq!(
        outcome,
        Outcome::Transitioned { from: StatePath::from("ground.idle"), to: StatePath::from("ground.say") }
    );
    assert_eq!(recorder.trace, vec!["exit idle", "mode idle", "enter say"]);
    let (path, spec) = recorder.modes.last().unwrap();
    assert_eq!(path, "ground.say");
    assert_eq!(spec.params().get("say").map(String::as_str), Some("true"));

    machine.handle(&mut recorder, &hold());
    assert_eq!(machine.active(), &StatePath::from("ground.idle"));
    let (_, spec) = recorder.modes.last().unwrap();
    assert_eq!(spec.params().get("say").map(String::as_str), Some("false"));
    assert_eq!(machine.context().transitions(), 2);
}

#[test]
fn test_step_keeps_state_and_counts() {
    let (mut machine, mut recorder) = started();
    machine.handle(&mut recorder, &say());
    recorder.operator.clear();

    assert_eq!(machine.handle(&mut recorder, &count()), Outcome::Stepped(StatePath::from("ground.say")));
    assert_eq!(machine.handle(&mut recorder, &count()), Outcome::Stepped(StatePath::from("ground.say")));
    assert_eq!(machine.active(), &StatePath::from("ground.say"));
    assert_eq!(machine.memory().get("count"), 2);
    assert_eq!(
        recorder.operator,
        vec![
            operator::Event::Count(operator::Count { value: 1 }),
            operator::Event::Count(operator::Count { value: 2 }),
        ]
    );
}

#[test]
fn test_memory_cleared_on_reentry() {
    let (mut machine, mut recorder) = started();
    machine.handle(&mut recorder, &say());
    machine.handle(&mut recorder, &count());
    machine.handle(&mut recorder, &hold());
    machine.handle(&mut recorder, &say());
    assert_eq!(machine.memory().get("count"), 0);
}

#[test]
fn test_transition_wins_over_step() {
    let mut table = transitions();
    table.push(Transition::new(perception::EventKind::Count, "ground.say", "ground.idle"));
    let mut machine = StateMachine::new(root(), table).unwrap();
    let mut recorder = Recorder::default();
    machine.start(&mut recorder);
    machine.handle(&mut recorder, &say());
    recorder.operator.clear();

    let outcome = machine.handle(&mut recorder, &count());
    assert!(matches!(outcome, Outcome::Transitioned { .. }));
    assert_eq!(machine.active(), &StatePath::from("ground.idle"));
    assert!(!recorder.operator.iter().any(|e| matches!(e, operator::Event::Count(_))));
}

#[test]
fn test_unmatched_messages_are_ignored() {
    let (mut machine, mut recorder) = started();
    let applied = recorder.modes.len();
    assert_eq!(machine.handle(&mut recorder, &hold()), Outcome::Ignored);
    assert_eq!(machine.handle(&mut recorder, &count()), Outcome::Ignored);
    assert_eq!(machine.active(), &StatePath::from("ground.idle"));
    assert_eq!(recorder.modes.len(), applied);
}

#[test]
fn test_stage_destination_resolves_initial_leaf() {
    let (mut machine, mut recorder) = started();
    machine.handle(&mut recorder, &takeoff());
    assert_eq!(machine.active(), &StatePath::from("air.hover"));
    machine.handle(&mut recorder, &Message::Operator(operator::Command::Land(operator::Land {})));
    machine.handle(&mut recorder, &Message::Flight(flight::Event::Landed(flight::Landed {})));
    assert_eq!(machine.active(), &StatePath::from("ground.idle"));
}

#[test]
fn test_exactly_one_leaf_active() {
    let (mut machine, mut recorder) = started();
    let leaves: Vec<StatePath> = machine.leaf_paths().into_iter().cloned().collect();
    for message in [say(), count(), hold(), takeoff(), hold(), say()] {
        machine.handle(&mut recorder, &message);
        assert_eq!(leaves.iter().filter(|leaf| *leaf == machine.active()).count(), 1);
    }
}

#[test]
fn test_stop_rewinds_and_restart_is_identical() {
    let (mut machine, mut recorder) = started();
    machine.handle(&mut recorder, &say());
    recorder.trace.clear();

    machine.stop(&mut recorder);
    assert_eq!(recorder.trace, vec!["exit say"]);
    assert!(!machine.is_running());
    assert_eq!(machine.handle(&mut recorder, &hold()), Outcome::Ignored);

    recorder.trace.clear();
    machine.start(&mut recorder);
    assert_eq!(recorder.trace, vec!["mode idle", "enter idle"]);
    assert_eq!(machine.context().transitions(), 0);
}

#[test]
fn test_interest_lists_transition_and_step_ids() {
    let (machine, _) = started();
    let interest = machine.interest();
    for id in [
        MessageId::from(operator::CommandKind::Say),
        MessageId::from(operator::CommandKind::Hold),
        MessageId::from(flight::EventKind::Landed),
        MessageId::from(perception::EventKind::Count),
    ] {
        assert!(interest.contains(&id), "missing {id}");
    }
    assert!(!interest.contains(&MessageId::from(operator::CommandKind::Ping)));
}

#[test]
fn test_compose_overrides_by_name() {
    let base = Stage::new("ground", "idle")
        .with(State::new("idle").with_mode(ModeSpec::new("default", EstimationMode::Ground)))
        .with(State::new("safe"));
    let composed = base.compose([Node::from(State::new("idle").with_mode(say_mode(false))), State::new("say").into()]).unwrap();
    let names: Vec<&str> = composed.children().iter().map(Node::name).collect();
    assert_eq!(names, vec!["safe", "idle", "say"]);
    let Node::State(idle) = &composed.children()[1] else { panic!("idle must stay a state") };
    assert_eq!(idle.mode().map(ModeSpec::guidance), Some("idle"));
}

#[test]
fn test_compose_rejects_ambiguous_override() {
    let base = Stage::new("ground", "idle").with(State::new("idle"));
    let result = base.compose([Node::from(State::new("say")), Node::from(State::new("say"))]);
    assert_eq!(result.err(), Some(TreeError::AmbiguousOverride("ground.say".into())));
}

#[test]
fn test_tree_validation_errors() {
    let missing_initial = Stage::new("mission", "ground").with(Stage::new("ground", "nope").with(State::new("idle")));
    assert_eq!(
        StateMachine::new(missing_initial, []).err(),
        Some(TreeError::MissingInitial("ground.nope".into()))
    );

    let empty = Stage::new("mission", "ground").with(Stage::new("ground", "idle"));
    assert_eq!(StateMachine::new(empty, []).err(), Some(TreeError::EmptyStage("ground".into())));

    let dotted = Stage::new("mission", "a.b").with(State::new("a.b"));
    assert!(matches!(StateMachine::new(dotted, []).err(), Some(TreeError::InvalidName(_))));

    let from_stage = [Transition::new(operator::CommandKind::Say, "ground", "air")];
    assert_eq!(StateMachine::new(root(), from_stage).err(), Some(TreeError::NotALeaf("ground".into())));

    let unknown = [Transition::new(operator::CommandKind::Say, "ground.idle", "ground.sing")];
    assert_eq!(StateMachine::new(root(), unknown).err(), Some(TreeError::UnknownPath("ground.sing".into())));

    let conflicting = [
        Transition::new(operator::CommandKind::Say, "ground.idle", "ground.say"),
        Transition::new(operator::CommandKind::Say, "ground.idle", "air"),
    ];
    assert!(matches!(StateMachine::new(root(), conflicting).err(), Some(TreeError::ConflictingTransition(_))));
}

fn controller_fixture() -> (ChannelManager, LoopbackConnector, ServicePair<FlightApi>, ServicePair<GuidanceApi>) {
    let connector = LoopbackConnector::default();
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut channels = ChannelManager::new(Box::new(connector.clone()), tx);
    let mut flight = ServicePair::new();
    let mut guidance = ServicePair::new();
    for name in ["flight", "guidance"] {
        let ch = channels.open(name, "tcp://127.0.0.1:9000").unwrap();
        channels.accept(LinkEvent {
            channel: ch.name().clone(),
            generation: ch.generation(),
            kind: LinkEventKind::Connected,
        });
        if name == "flight" {
            flight.attach(ch, true).unwrap();
        } else {
            guidance.attach(ch, true).unwrap();
        }
    }
    (channels, connector, flight, guidance)
}

#[test]
fn test_mode_controller_sends_estimation_then_configuration() {
    let (mut channels, connector, mut flight, mut guidance) = controller_fixture();
    let (machine, _) = started();
    let mut modes = ModeController::new();

    modes
        .enter(machine.context(), &say_mode(true), Some(&mut flight), Some(&mut guidance), &mut channels)
        .unwrap();

    let flight_frames = connector.sent("flight");
    let estimation = flight::Request::decode(flight_frames[0].as_slice()).unwrap().content.unwrap();
    assert_eq!(
        estimation,
        flight::Command::SetEstimationMode(flight::SetEstimationMode { mode: EstimationMode::Ground as i32 })
    );
    let guidance_frames = connector.sent("guidance");
    let Some(guidance::Command::ConfigureMode(config)) =
        guidance::Request::decode(guidance_frames[0].as_slice()).unwrap().content
    else {
        panic!("expected a mode configuration");
    };
    assert_eq!(config.mode, "idle");
    assert_eq!(config.params.get("say").map(String::as_str), Some("true"));
    assert_eq!(modes.current(), Some("idle"));
    assert!(!modes.degraded());
}

#[test]
fn test_mode_controller_configures_guidance_even_if_flight_fails() {
    let (mut channels, connector, _, mut guidance) = controller_fixture();
    let (machine, _) = started();
    let mut modes = ModeController::new();

    let result = modes.enter(machine.context(), &say_mode(false), None, Some(&mut guidance), &mut channels);
    assert!(matches!(result, Err(ModeError::EstimationFailed(PairError::Detached))));
    assert_eq!(connector.sent("guidance").len(), 1);
    assert!(connector.sent("flight").is_empty());
    assert!(modes.degraded());

    modes.reset();
    assert!(!modes.degraded());
    assert_eq!(modes.current(), None);
}
