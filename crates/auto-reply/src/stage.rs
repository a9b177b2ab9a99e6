use std::fmt;

/// One step of the message-processing state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Received,
    Analyzed,
    Routed,
    Processed,
    Responded,
    Dropped,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Responded | Self::Dropped | Self::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Received, Analyzed | Dropped | Failed)
                | (Analyzed, Routed | Dropped | Failed)
                | (Routed, Processed | Failed)
                | (Processed, Responded | Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Analyzed => "analyzed",
            Self::Routed => "routed",
            Self::Processed => "processed",
            Self::Responded => "responded",
            Self::Dropped => "dropped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    const ALL: [Stage; 7] = [
        Stage::Received,
        Stage::Analyzed,
        Stage::Routed,
        Stage::Processed,
        Stage::Responded,
        Stage::Dropped,
        Stage::Failed,
    ];

    #[rstest]
    #[case(Stage::Received, Stage::Analyzed)]
    #[case(Stage::Received, Stage::Dropped)]
    #[case(Stage::Analyzed, Stage::Routed)]
    #[case(Stage::Analyzed, Stage::Dropped)]
    #[case(Stage::Routed, Stage::Processed)]
    #[case(Stage::Processed, Stage::Responded)]
    #[case(Stage::Processed, Stage::Failed)]
    fn forward_edges(#[case] from: Stage, #[case] to: Stage) {
        assert!(from.can_advance_to(to));
    }

    #[rstest]
    #[case(Stage::Received, Stage::Processed)]
    #[case(Stage::Routed, Stage::Analyzed)]
    #[case(Stage::Routed, Stage::Dropped)]
    #[case(Stage::Processed, Stage::Processed)]
    fn illegal_edges(#[case] from: Stage, #[case] to: Stage) {
        assert!(!from.can_advance_to(to));
    }

    #[test]
    fn terminal_stages_have_no_exits() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_advance_to(to), "{from} -> {to}");
            }
        }
    }
}
