use super::state_machine::MissionContext;
use crate::channel::ChannelManager;
use crate::messages::flight::{self, EstimationMode, FlightApi, SetEstimationMode};
use crate::messages::guidance::{self, ConfigureMode, GuidanceApi};
use crate::service::{PairError, ServicePair};
use crate::{error, state};
use std::collections::BTreeMap;
use strum_macros::Display;

/// Guidance mode a state applies on entry: the guidance mode name, the estimation source the
/// flight controller should switch to, and the configuration payload for guidance.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeSpec {
    guidance: String,
    estimation: EstimationMode,
    params: BTreeMap<String, String>,
}

impl ModeSpec {
    pub fn new(guidance: &str, estimation: EstimationMode) -> Self {
        Self { guidance: guidance.to_string(), estimation, params: BTreeMap::new() }
    }

    pub fn with_param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn guidance(&self) -> &str { &self.guidance }
    pub fn estimation(&self) -> EstimationMode { self.estimation }
    pub fn params(&self) -> &BTreeMap<String, String> { &self.params }
}

#[derive(Debug, Display)]
pub enum ModeError {
    EstimationFailed(PairError),
    ConfigurationFailed(PairError),
    BothFailed(PairError, PairError),
}

impl std::error::Error for ModeError {}

/// Issues the mode change commands that accompany a state entry.
#[derive(Debug, Default)]
pub struct ModeController {
    current: Option<String>,
    applied: u64,
    degraded: bool,
}

impl ModeController {
    pub fn new() -> Self { Self::default() }

    /// Sends the estimation mode to the flight controller, then the mode configuration to
    /// guidance. The second command is sent even if the first one failed; nothing is retried.
    ///
    /// # Arguments
    /// - `context`: Mission context, already pointing at the entered state.
    /// - `spec`: Mode of the entered state.
    /// - `flight`/`guidance`: The service pairs, `None` if not created.
    /// - `channels`: Channel manager owning the pairs' channels.
    pub fn enter(
        &mut self,
        context: &MissionContext,
        spec: &ModeSpec,
        flight: Option<&mut ServicePair<FlightApi>>,
        guidance: Option<&mut ServicePair<GuidanceApi>>,
        channels: &mut ChannelManager,
    ) -> Result<(), ModeError> {
        let estimation = flight.ok_or(PairError::Detached).and_then(|pair| {
            let mode = SetEstimationMode { mode: spec.estimation as i32 };
            pair.send(channels, flight::Command::SetEstimationMode(mode))
        });
        if let Err(e) = &estimation {
            error!("Estimation mode {} for {} failed: {e}", spec.estimation.as_str_name(), context.active());
        }

        let configuration = guidance.ok_or(PairError::Detached).and_then(|pair| {
            let config = ConfigureMode { mode: spec.guidance.clone(), params: spec.params.clone() };
            pair.send(channels, guidance::Command::ConfigureMode(config))
        });
        if let Err(e) = &configuration {
            error!("Guidance mode {} for {} failed: {e}", spec.guidance, context.active());
        }

        self.applied += 1;
        self.current = Some(spec.guidance.clone());
        state!(
            "{} applies guidance mode {} ({})",
            context.active(),
            spec.guidance,
            spec.estimation.as_str_name()
        );

        let result = match (estimation, configuration) {
            (Ok(_), Ok(_)) => Ok(()),
            (Err(e), Ok(_)) => Err(ModeError::EstimationFailed(e)),
            (Ok(_), Err(e)) => Err(ModeError::ConfigurationFailed(e)),
            (Err(a), Err(b)) => Err(ModeError::BothFailed(a, b)),
        };
        self.degraded = result.is_err();
        result
    }

    /// Name of the last guidance mode requested.
    pub fn current(&self) -> Option<&str> { self.current.as_deref() }

    pub fn applied(&self) -> u64 { self.applied }

    /// Whether the last [`ModeController::enter`] failed to send one of its commands.
    pub fn degraded(&self) -> bool { self.degraded }

    /// Forgets the current mode, used when the mission deactivates.
    pub fn reset(&mut self) {
        self.current = None;
        self.degraded = false;
    }
}
