//! Classification of what a transfer function changed.
//!
//! Three orthogonal properties are folded into one enum: which side of the
//! fact pair moved (IN, OUT, the true or false OUT of a branch), whether the
//! instruction acted as a no-op at the IR level (the `Nop*` family, which a
//! future optimization can use to skip re-execution), and whether any
//! information is available at all ([`ChangeKind::NoChangeInfo`]).
//!
//! Branch on the predicates, not on specific variants.

use strum::Display;

/// What changed across one transfer-function application.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeKind {
    /// Nothing changed.
    NoChange,
    /// The instruction was a no-op and nothing changed.
    NopNoChange,
    /// Something changed, sides unspecified.
    Changed,
    /// Only the IN fact changed.
    OnlyInChanged,
    /// Only the OUT fact changed.
    OnlyOutChanged,
    /// Both the IN and the OUT fact changed.
    InOutChanged,
    /// Only the true-edge OUT fact of a branch changed.
    OnlyTrueOutChanged,
    /// Only the false-edge OUT fact of a branch changed.
    OnlyFalseOutChanged,
    /// The instruction was a no-op; the IN fact changed.
    NopInChanged,
    /// The instruction was a no-op; the OUT fact changed.
    NopOutChanged,
    /// The instruction was a no-op; both facts changed.
    NopInOutChanged,
    /// No change information was produced.
    #[default]
    NoChangeInfo,
}

impl ChangeKind {
    /// Returns `true` when the instruction acted as an IR-level no-op.
    #[must_use]
    pub fn has_nop(self) -> bool {
        matches!(
            self,
            ChangeKind::NopNoChange
                | ChangeKind::NopInChanged
                | ChangeKind::NopOutChanged
                | ChangeKind::NopInOutChanged
        )
    }

    /// Returns `true` when any fact changed.
    #[must_use]
    pub fn has_change(self) -> bool {
        !matches!(
            self,
            ChangeKind::NoChange | ChangeKind::NopNoChange | ChangeKind::NoChangeInfo
        )
    }

    /// Returns `true` when the IN fact changed.
    #[must_use]
    pub fn has_changed_in(self) -> bool {
        matches!(
            self,
            ChangeKind::Changed
                | ChangeKind::OnlyInChanged
                | ChangeKind::InOutChanged
                | ChangeKind::NopInChanged
                | ChangeKind::NopInOutChanged
        )
    }

    /// Returns `true` when an OUT fact changed, including the directional
    /// branch variants.
    #[must_use]
    pub fn has_changed_out(self) -> bool {
        matches!(
            self,
            ChangeKind::Changed
                | ChangeKind::OnlyOutChanged
                | ChangeKind::InOutChanged
                | ChangeKind::OnlyTrueOutChanged
                | ChangeKind::OnlyFalseOutChanged
                | ChangeKind::NopOutChanged
                | ChangeKind::NopInOutChanged
        )
    }

    /// Returns `true` when change information was produced at all.
    #[must_use]
    pub fn has_change_info(self) -> bool {
        self != ChangeKind::NoChangeInfo
    }
}
