use super::mode_controller::ModeSpec;
use super::state_tree::{FlatTree, Stage, State, StatePath, TreeError};
use crate::messages::{Message, MessageId, flight, guidance, operator, perception};
use crate::{event, state};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Side effects available to state hooks. The coordinator implements this on top of its
/// service pairs; hooks never reach the services any other way.
pub trait Effects {
    /// Applies the guidance mode of a state that is being entered.
    fn apply_mode(&mut self, context: &MissionContext, spec: &ModeSpec);
    fn send_flight(&mut self, command: flight::Command);
    fn send_guidance(&mut self, command: guidance::Command);
    fn send_perception(&mut self, command: perception::Command);
    fn notify_operator(&mut self, event: operator::Event);
}

/// Scratch counters of the active state, cleared whenever a state is entered.
#[derive(Debug, Default)]
pub struct StateMemory {
    counters: BTreeMap<&'static str, u64>,
}

impl StateMemory {
    /// Increments `key` and returns the new value.
    pub fn bump(&mut self, key: &'static str) -> u64 {
        let counter = self.counters.entry(key).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn get(&self, key: &'static str) -> u64 { self.counters.get(key).copied().unwrap_or(0) }

    fn clear(&mut self) { self.counters.clear(); }
}

/// The active state path. Only the state machine writes it, and only while executing a
/// transition.
#[derive(Debug, Clone)]
pub struct MissionContext {
    active: StatePath,
    transitions: u64,
}

impl MissionContext {
    pub fn active(&self) -> &StatePath { &self.active }
    pub fn transitions(&self) -> u64 { self.transitions }
}

/// Guarded rule: on `id` while `from` is active, move to `to`.
#[derive(Debug, Clone)]
pub struct Transition {
    id: MessageId,
    from: StatePath,
    to: StatePath,
}

impl Transition {
    pub fn new(id: impl Into<MessageId>, from: &str, to: &str) -> Self {
        Self { id: id.into(), from: StatePath::from(from), to: StatePath::from(to) }
    }
}

/// Result of handling one message. Exactly one of these happens per message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Transitioned { from: StatePath, to: StatePath },
    Stepped(StatePath),
    Ignored,
}

/// Hierarchical state machine over a validated stage tree.
///
/// Stages only group states, so the machine works on the flattened leaves: a transition
/// whose destination names a stage lands on that stage's initial-child chain.
pub struct StateMachine {
    leaves: HashMap<StatePath, State>,
    transitions: HashMap<StatePath, HashMap<MessageId, StatePath>>,
    initial: StatePath,
    context: MissionContext,
    memory: StateMemory,
    running: bool,
}

impl StateMachine {
    /// Builds a machine from `root` and its transition table.
    ///
    /// # Errors
    /// Fails on any structural tree error, on transition sources that are not leaves, on
    /// unknown destinations and on two transitions sharing message and source.
    pub fn new(root: Stage, transitions: impl IntoIterator<Item = Transition>) -> Result<Self, TreeError> {
        let tree = FlatTree::build(root)?;
        let initial = tree.resolve(&StatePath::root())?;

        let mut table: HashMap<StatePath, HashMap<MessageId, StatePath>> = HashMap::new();
        for transition in transitions {
            if !tree.leaves.contains_key(&transition.from) {
                return Err(if tree.stage_initials.contains_key(&transition.from) {
                    TreeError::NotALeaf(transition.from.to_string())
                } else {
                    TreeError::UnknownPath(transition.from.to_string())
                });
            }
            let to = tree.resolve(&transition.to)?;
            let rules = table.entry(transition.from.clone()).or_default();
            if rules.insert(transition.id, to).is_some() {
                return Err(TreeError::ConflictingTransition(format!("{} from {}", transition.id, transition.from)));
            }
        }

        Ok(Self {
            leaves: tree.leaves,
            transitions: table,
            context: MissionContext { active: initial.clone(), transitions: 0 },
            initial,
            memory: StateMemory::default(),
            running: false,
        })
    }

    /// Every message id that can cause a transition or a step, in a stable order.
    pub fn interest(&self) -> Vec<MessageId> {
        let transition_ids = self.transitions.values().flat_map(HashMap::keys).copied();
        let step_ids = self
            .leaves
            .values()
            .filter_map(|state| state.behavior().step.as_ref())
            .flat_map(|rule| rule.ids().iter().copied());
        transition_ids.chain(step_ids).collect::<BTreeSet<_>>().into_iter().collect()
    }

    /// Enters the initial leaf. No-op if already running.
    pub fn start(&mut self, effects: &mut dyn Effects) {
        if self.running {
            return;
        }
        self.running = true;
        self.context.active = self.initial.clone();
        state!("Starting in {}", self.context.active);
        self.enter_active(effects, None);
    }

    /// Exits the active leaf and rewinds to the initial leaf, so a later `start` behaves
    /// exactly like the first one.
    pub fn stop(&mut self, effects: &mut dyn Effects) {
        if !self.running {
            return;
        }
        self.exit_active(effects);
        state!("Stopped in {}", self.context.active);
        self.running = false;
        self.context = MissionContext { active: self.initial.clone(), transitions: 0 };
    }

    /// Handles one message: a matching transition of the active state wins, otherwise the
    /// active state's step rule runs, otherwise nothing happens.
    pub fn handle(&mut self, effects: &mut dyn Effects, message: &Message) -> Outcome {
        if !self.running {
            return Outcome::Ignored;
        }
        let id = message.id();
        let destination = self.transitions.get(&self.context.active).and_then(|rules| rules.get(&id)).cloned();

        if let Some(to) = destination {
            let from = self.context.active.clone();
            state!("{from} -> {to} on {id}");
            self.exit_active(effects);
            self.context.active = to.clone();
            self.context.transitions += 1;
            self.enter_active(effects, Some(message));
            return Outcome::Transitioned { from, to };
        }

        let step = self
            .leaves
            .get(&self.context.active)
            .and_then(|state| state.behavior().step.as_ref())
            .filter(|rule| rule.matches(id))
            .map(|rule| rule.hook());
        match step {
            Some(hook) => {
                event!("{} steps on {id}", self.context.active);
                hook(effects, &mut self.memory, message);
                Outcome::Stepped(self.context.active.clone())
            }
            None => Outcome::Ignored,
        }
    }

    fn enter_active(&mut self, effects: &mut dyn Effects, message: Option<&Message>) {
        self.memory.clear();
        let Some(state) = self.leaves.get(&self.context.active) else {
            return;
        };
        if let Some(spec) = state.mode() {
            effects.apply_mode(&self.context, spec);
        }
        if let Some(enter) = state.behavior().enter {
            enter(effects, &mut self.memory, message);
        }
    }

    fn exit_active(&mut self, effects: &mut dyn Effects) {
        let Some(state) = self.leaves.get(&self.context.active) else {
            return;
        };
        if let Some(exit) = state.behavior().exit {
            exit(effects, &mut self.memory);
        }
    }

    pub fn context(&self) -> &MissionContext { &self.context }
    pub fn active(&self) -> &StatePath { &self.context.active }
    pub fn initial(&self) -> &StatePath { &self.initial }
    pub fn is_running(&self) -> bool { self.running }
    pub fn memory(&self) -> &StateMemory { &self.memory }

    pub fn leaf_paths(&self) -> Vec<&StatePath> {
        let mut paths: Vec<_> = self.leaves.keys().collect();
        paths.sort();
        paths
    }
}
