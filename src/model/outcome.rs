use std::fmt;

/// Decision inputs computed once per reconciliation and absorbed into the
/// record update and remote calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationOutcome {
    pub is_live: bool,
    pub title_changed: bool,
    pub images_changed: bool,
    pub is_eligible: bool,
    pub should_list: bool,
}

impl ReconciliationOutcome {
    pub fn state(&self) -> ItemState {
        if !self.is_live {
            ItemState::OriginGone
        } else if self.should_list {
            ItemState::Eligible
        } else {
            ItemState::NeedsUpdate
        }
    }
}

/// Per-iteration classification of a candidate item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    Sold,
    OriginGone,
    FetchFailed,
    NeedsUpdate,
    Eligible,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Sold => "sold",
            ItemState::OriginGone => "origin_gone",
            ItemState::FetchFailed => "fetch_failed",
            ItemState::NeedsUpdate => "needs_update",
            ItemState::Eligible => "eligible",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
