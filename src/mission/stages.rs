//! The demo mission: reusable library stages, the mission's overrides on top of them and
//! the transition table.

use crate::info;
use crate::messages::flight::{self, EstimationMode};
use crate::messages::{Message, guidance, operator, perception};
use crate::mode_control::{
    Effects, ModeSpec, Node, Stage, State, StateMachine, StateMemory, Transition, TreeError,
};

const IDLE_MODE: &str = "idle";
const HOVER_MODE: &str = "hover";
const DESCEND_MODE: &str = "descend";
const COUNT_KEY: &str = "count";

/// Ground stage as shipped by the library: a single idle state.
pub fn library_ground() -> Stage {
    Stage::new("ground", "idle")
        .with(State::new("idle").with_mode(ModeSpec::new(IDLE_MODE, EstimationMode::Ground)))
}

/// Airborne stage as shipped by the library.
pub fn library_air() -> Stage {
    Stage::new("air", "hover")
        .with(
            State::new("hover")
                .with_mode(ModeSpec::new(HOVER_MODE, EstimationMode::Visual))
                .on_enter(pause_perception),
        )
        .with(
            State::new("descend")
                .with_mode(ModeSpec::new(DESCEND_MODE, EstimationMode::Inertial))
                .on_enter(enter_descend),
        )
}

fn idle_mode(say: bool) -> ModeSpec { ModeSpec::new(IDLE_MODE, EstimationMode::Ground).with_param("say", say) }

/// Ground stage of this mission: `idle` is replaced by a variant that silences guidance
/// output, and `say` is added.
pub fn mission_ground() -> Result<Stage, TreeError> {
    library_ground().compose([
        Node::from(State::new("idle").with_mode(idle_mode(false)).on_enter(resume_perception)),
        Node::from(
            State::new("say")
                .with_mode(idle_mode(true))
                .on_enter(enter_say)
                .on_step([perception::EventKind::Count], forward_count),
        ),
    ])
}

pub fn transitions() -> Vec<Transition> {
    vec![
        Transition::new(operator::CommandKind::Say, "ground.idle", "ground.say"),
        Transition::new(operator::CommandKind::Hold, "ground.say", "ground.idle"),
        Transition::new(operator::CommandKind::Takeoff, "ground.idle", "air"),
        Transition::new(operator::CommandKind::Land, "air.hover", "air.descend"),
        Transition::new(guidance::EventKind::Fault, "air.hover", "air.descend"),
        Transition::new(flight::EventKind::Landed, "air.descend", "ground"),
    ]
}

/// Builds the complete mission state machine.
pub fn build_machine() -> Result<StateMachine, TreeError> {
    let root = Stage::new("mission", "ground").with(mission_ground()?).with(library_air());
    StateMachine::new(root, transitions())
}

fn enter_say(_: &mut dyn Effects, _: &mut StateMemory, trigger: Option<&Message>) {
    if let Some(Message::Operator(operator::Command::Say(operator::Say { text: Some(text) }))) = trigger {
        info!("Operator says: {text}");
    }
}

fn forward_count(effects: &mut dyn Effects, memory: &mut StateMemory, _: &Message) {
    let value = memory.bump(COUNT_KEY);
    effects.notify_operator(operator::Event::Count(operator::Count { value }));
}

fn resume_perception(effects: &mut dyn Effects, _: &mut StateMemory, _: Option<&Message>) {
    effects.send_perception(perception::Command::Start(perception::Start {}));
}

fn pause_perception(effects: &mut dyn Effects, _: &mut StateMemory, _: Option<&Message>) {
    effects.send_perception(perception::Command::Stop(perception::Stop {}));
}

/// A faulted guidance is restarted so the descent is still guided.
fn enter_descend(effects: &mut dyn Effects, _: &mut StateMemory, trigger: Option<&Message>) {
    if let Some(Message::Guidance(guidance::Event::Fault(fault))) = trigger {
        info!("Descending after guidance fault: {}", fault.reason);
        effects.send_guidance(guidance::Command::Start(guidance::Start {}));
    }
}
