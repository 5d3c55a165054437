mod coordinator;
pub(crate) mod stages;
#[cfg(test)]
mod tests;

pub use coordinator::MissionCoordinator;
