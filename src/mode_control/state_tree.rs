use super::mode_controller::ModeSpec;
use super::state_machine::{Effects, StateMemory};
use crate::messages::{Message, MessageId};
use itertools::Itertools;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use strum_macros::Display;

pub type EnterHook = fn(&mut dyn Effects, &mut StateMemory, Option<&Message>);
pub type StepHook = fn(&mut dyn Effects, &mut StateMemory, &Message);
pub type ExitHook = fn(&mut dyn Effects, &mut StateMemory);

/// Dotted path from the root stage to a node, e.g. `ground.idle`. The root itself has the
/// empty path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StatePath(Vec<String>);

impl StatePath {
    pub fn root() -> Self { Self(Vec::new()) }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }
}

impl From<&str> for StatePath {
    fn from(value: &str) -> Self {
        Self(value.split('.').filter(|s| !s.is_empty()).map(str::to_string).collect())
    }
}

impl Display for StatePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0.join(".")) }
}

#[derive(Debug, Display, PartialEq, Eq)]
pub enum TreeError {
    InvalidName(String),
    EmptyStage(String),
    MissingInitial(String),
    DuplicateChild(String),
    AmbiguousOverride(String),
    UnknownPath(String),
    NotALeaf(String),
    ConflictingTransition(String),
}

impl std::error::Error for TreeError {}

/// Step predicate of a state: the messages it handles without leaving.
#[derive(Clone)]
pub struct StepRule {
    ids: Vec<MessageId>,
    hook: StepHook,
}

impl StepRule {
    pub fn matches(&self, id: MessageId) -> bool { self.ids.contains(&id) }
    pub fn ids(&self) -> &[MessageId] { &self.ids }
    pub fn hook(&self) -> StepHook { self.hook }
}

/// Behavior table of a leaf state.
#[derive(Clone, Default)]
pub struct Behavior {
    pub enter: Option<EnterHook>,
    pub step: Option<StepRule>,
    pub exit: Option<ExitHook>,
}

/// Leaf behavior unit. Entering it applies its guidance mode (if any) before the enter hook.
#[derive(Clone)]
pub struct State {
    name: String,
    mode: Option<ModeSpec>,
    behavior: Behavior,
}

impl State {
    pub fn new(name: &str) -> Self { Self { name: name.to_string(), mode: None, behavior: Behavior::default() } }

    pub fn with_mode(mut self, mode: ModeSpec) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn on_enter(mut self, hook: EnterHook) -> Self {
        self.behavior.enter = Some(hook);
        self
    }

    pub fn on_step<I>(mut self, ids: I, hook: StepHook) -> Self
    where
        I: IntoIterator,
        I::Item: Into<MessageId>,
    {
        self.behavior.step = Some(StepRule { ids: ids.into_iter().map(Into::into).collect(), hook });
        self
    }

    pub fn on_exit(mut self, hook: ExitHook) -> Self {
        self.behavior.exit = Some(hook);
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn mode(&self) -> Option<&ModeSpec> { self.mode.as_ref() }
    pub fn behavior(&self) -> &Behavior { &self.behavior }
}

#[derive(Clone)]
pub enum Node {
    Stage(Stage),
    State(State),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Stage(stage) => &stage.name,
            Node::State(state) => &state.name,
        }
    }
}

impl From<Stage> for Node {
    fn from(value: Stage) -> Self { Node::Stage(value) }
}

impl From<State> for Node {
    fn from(value: State) -> Self { Node::State(value) }
}

/// Composite state: ordered children and the name of the child entered by default.
#[derive(Clone)]
pub struct Stage {
    name: String,
    initial: String,
    children: Vec<Node>,
}

impl Stage {
    pub fn new(name: &str, initial: &str) -> Self {
        Self { name: name.to_string(), initial: initial.to_string(), children: Vec::new() }
    }

    pub fn with(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Replaces children of this stage by name: every base child whose name appears among
    /// `overrides` is removed, then all overrides are appended in their given order.
    ///
    /// # Errors
    /// - `AmbiguousOverride` if two overrides share a name.
    /// - `DuplicateChild` if the base stage itself holds two children of one name.
    /// - Any structural error of the composed stage (e.g. `MissingInitial`).
    pub fn compose(self, overrides: impl IntoIterator<Item = Node>) -> Result<Stage, TreeError> {
        let overrides: Vec<Node> = overrides.into_iter().collect();
        if let Some(name) = overrides.iter().map(Node::name).duplicates().next() {
            return Err(TreeError::AmbiguousOverride(format!("{}.{name}", self.name)));
        }
        if let Some(name) = self.children.iter().map(Node::name).duplicates().next() {
            return Err(TreeError::DuplicateChild(format!("{}.{name}", self.name)));
        }
        let Stage { name, initial, children } = self;
        let mut composed: Vec<Node> = children
            .into_iter()
            .filter(|child| overrides.iter().all(|o| o.name() != child.name()))
            .collect();
        composed.extend(overrides);
        let stage = Stage { name, initial, children: composed };
        stage.validate(&StatePath::root().child(&stage.name))?;
        Ok(stage)
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn initial(&self) -> &str { &self.initial }
    pub fn children(&self) -> &[Node] { &self.children }

    /// Checks the subtree rooted here. `path` is this stage's own path, used in errors.
    pub fn validate(&self, path: &StatePath) -> Result<(), TreeError> {
        if self.children.is_empty() {
            return Err(TreeError::EmptyStage(path.to_string()));
        }
        for child in &self.children {
            let name = child.name();
            if name.is_empty() || name.contains('.') {
                return Err(TreeError::InvalidName(format!("{path}:{name}")));
            }
        }
        if let Some(name) = self.children.iter().map(Node::name).duplicates().next() {
            return Err(TreeError::DuplicateChild(path.child(name).to_string()));
        }
        if !self.children.iter().any(|c| c.name() == self.initial) {
            return Err(TreeError::MissingInitial(path.child(&self.initial).to_string()));
        }
        for child in &self.children {
            if let Node::Stage(stage) = child {
                stage.validate(&path.child(&stage.name))?;
            }
        }
        Ok(())
    }
}

/// Leaves of a validated tree, keyed by path, plus the initial leaf of every stage.
pub(crate) struct FlatTree {
    pub leaves: HashMap<StatePath, State>,
    pub stage_initials: HashMap<StatePath, StatePath>,
}

impl FlatTree {
    /// Flattens `root`, whose name is not part of any path.
    pub fn build(root: Stage) -> Result<Self, TreeError> {
        root.validate(&StatePath::root())?;
        let mut tree = FlatTree { leaves: HashMap::new(), stage_initials: HashMap::new() };
        tree.collect(root, &StatePath::root());
        Ok(tree)
    }

    /// Stores all leaves below `stage` and returns the stage's initial leaf.
    fn collect(&mut self, stage: Stage, path: &StatePath) -> StatePath {
        let mut initial_leaf = None;
        for child in stage.children {
            let child_path = path.child(child.name());
            let is_initial = child.name() == stage.initial;
            let leaf = match child {
                Node::State(state) => {
                    self.leaves.insert(child_path.clone(), state);
                    child_path
                }
                Node::Stage(inner) => self.collect(inner, &child_path),
            };
            if is_initial {
                initial_leaf = Some(leaf);
            }
        }
        // validate() guarantees the initial child exists
        let initial_leaf = initial_leaf.unwrap_or_default();
        self.stage_initials.insert(path.clone(), initial_leaf.clone());
        initial_leaf
    }

    /// Resolves a leaf path to itself and a stage path to its initial leaf.
    pub fn resolve(&self, path: &StatePath) -> Result<StatePath, TreeError> {
        if self.leaves.contains_key(path) {
            return Ok(path.clone());
        }
        self.stage_initials
            .get(path)
            .cloned()
            .ok_or_else(|| TreeError::UnknownPath(path.to_string()))
    }
}
