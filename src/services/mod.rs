pub mod actuator;
pub mod logger;
pub mod sampler;
pub mod sessions;
pub mod streamer;

/// Tracks consecutive failures of a periodic operation so a persistent fault
/// warns once instead of every tick.
#[derive(Debug, Default)]
pub(crate) struct FailureStreak {
    consecutive: u64,
}

impl FailureStreak {
    /// Returns `true` when this failure opens a new streak.
    pub(crate) fn fail(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive == 1
    }

    /// Returns the length of the streak that just ended, if any.
    pub(crate) fn succeed(&mut self) -> Option<u64> {
        match std::mem::take(&mut self.consecutive) {
            0 => None,
            n => Some(n),
        }
    }
}
