//! Loop session state carried through every pass of the engine.

/// Whether the loop stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Stop once the iteration counter exceeds `max_iterations`.
    Bounded { max_iterations: u32 },
    /// Never stop; idle-wait for task edits after completion.
    Watch,
}

/// Mutable loop state: the iteration counter and the last recorded
/// task-definition fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSession {
    pub mode: LoopMode,
    /// Next iteration index (1-indexed).
    pub iteration: u32,
    /// Fingerprint recorded at the end of the previous pass (or at start).
    pub fingerprint: String,
}

impl LoopSession {
    pub fn new(mode: LoopMode, fingerprint: impl Into<String>) -> Self {
        Self {
            mode,
            iteration: 1,
            fingerprint: fingerprint.into(),
        }
    }

    pub fn is_watch(&self) -> bool {
        matches!(self.mode, LoopMode::Watch)
    }

    /// Compare `current` against the recorded fingerprint.
    ///
    /// On a change the new value is recorded and, in watch mode, the counter
    /// restarts at 1. Returns whether a change was observed.
    pub fn observe(&mut self, current: &str) -> bool {
        if self.fingerprint == current {
            return false;
        }
        self.fingerprint = current.to_string();
        if self.is_watch() {
            self.iteration = 1;
        }
        true
    }

    pub fn limit_reached(&self) -> bool {
        match self.mode {
            LoopMode::Bounded { max_iterations } => self.iteration > max_iterations,
            LoopMode::Watch => false,
        }
    }

    /// Record the end-of-pass fingerprint without advancing the counter.
    ///
    /// Edits made during the pass belong to the agent and must not count as
    /// external changes.
    pub fn absorb(&mut self, fingerprint: impl Into<String>) {
        self.fingerprint = fingerprint.into();
    }

    /// Close a pass: absorb the fingerprint and move to the next index.
    pub fn finish_iteration(&mut self, fingerprint: impl Into<String>) {
        self.absorb(fingerprint);
        self.iteration += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_fingerprint_is_not_a_change() {
        let mut session = LoopSession::new(LoopMode::Watch, "aaa");
        session.iteration = 4;
        assert!(!session.observe("aaa"));
        assert_eq!(session.iteration, 4);
    }

    #[test]
    fn change_in_watch_mode_restarts_counter() {
        let mut session = LoopSession::new(LoopMode::Watch, "aaa");
        session.iteration = 4;
        assert!(session.observe("bbb"));
        assert_eq!(session.iteration, 1);
        assert_eq!(session.fingerprint, "bbb");
        assert!(!session.observe("bbb"));
    }

    #[test]
    fn change_in_bounded_mode_keeps_counter() {
        let mut session = LoopSession::new(LoopMode::Bounded { max_iterations: 5 }, "aaa");
        session.iteration = 3;
        assert!(session.observe("bbb"));
        assert_eq!(session.iteration, 3);
    }

    #[test]
    fn bounded_limit_is_exclusive_of_max() {
        let mut session = LoopSession::new(LoopMode::Bounded { max_iterations: 2 }, "aaa");
        assert!(!session.limit_reached());
        session.finish_iteration("aaa");
        assert!(!session.limit_reached());
        session.finish_iteration("aaa");
        assert_eq!(session.iteration, 3);
        assert!(session.limit_reached());
    }

    #[test]
    fn watch_mode_never_reaches_limit() {
        let mut session = LoopSession::new(LoopMode::Watch, "aaa");
        session.iteration = u32::MAX;
        assert!(!session.limit_reached());
    }
}
