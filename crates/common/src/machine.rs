// Restoration state machine: the transition table as a pure function.
//
// `transition(state, action)` returns a `Plan`: the side effects the engine
// must apply and where the machine goes next. Two targets are resolved
// against storage by the engine:
//
//   ResolveBegin → ANOTHER_COLLECTION_CHECK | ASSOCIATED_PATHWAY_CHECK | ACKNOWLEDGMENT
//   AdvanceRoot  → ACKNOWLEDGMENT (next root pinned) | ASSOCIATED_PATHWAY_CHECK
//
// `Stop` is accepted from every state and always lands on SESSION_CLOSE.

use thiserror::Error;

use crate::types::{
    AuthorityMode, IntegrationChannel, IntegrationCheck, ReadinessResult, RootStatus, RpRoot,
    RpState, SessionPhase,
};

// ── Actions ─────────────────────────────────────────────────────────

/// A practitioner decision at the current step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Start (or resume) the restoration loop from `RESTORE_INIT`.
    Begin,
    /// Re-enter restoration from the session overview, unpinning any root.
    StartRestoration,
    /// Leave `ANOTHER_COLLECTION_CHECK` to add pathways.
    AddPathways,
    Acknowledge,
    Defer { reason: Option<String> },
    Readiness(ReadinessResult),
    ReturnToDiscovery,
    FindAssociatedPathway,
    PickAuthority { mode: AuthorityMode, script: Option<String> },
    ContinueIntegration { channels: Vec<IntegrationChannel> },
    SkipIntegration,
    IntegrationDone,
    ChangeIntegration,
    CompleteIntegration(IntegrationCheck),
    /// Resume a root loop left at `ROOT_COMPLETE`.
    NextRoot,
    AssociatedPathway(bool),
    AnotherPathway(bool),
    Back,
    EndSession,
    Stop,
}

impl Action {
    /// Short label recorded on the audit event.
    pub fn label(&self) -> String {
        match self {
            Self::Begin => "Start root".into(),
            Self::StartRestoration => "Start restoration".into(),
            Self::AddPathways => "Add pathways".into(),
            Self::Acknowledge => "Acknowledge".into(),
            Self::Defer { .. } => "Pause / Defer".into(),
            Self::Readiness(ReadinessResult::Ready) => "Ready".into(),
            Self::Readiness(ReadinessResult::NotReady) => "Not Ready".into(),
            Self::Readiness(ReadinessResult::Conditional) => "Conditional".into(),
            Self::ReturnToDiscovery => "Return to discovery".into(),
            Self::FindAssociatedPathway => "Find associated pathway".into(),
            Self::PickAuthority { mode, .. } => format!("Authority: {mode}"),
            Self::ContinueIntegration { .. } => "Continue".into(),
            Self::SkipIntegration => "Skip to completion".into(),
            Self::IntegrationDone => "Done".into(),
            Self::ChangeIntegration => "Add/Change".into(),
            Self::CompleteIntegration(IntegrationCheck::Integrated) => "Integrated".into(),
            Self::CompleteIntegration(IntegrationCheck::Unsure) => "Unsure (proceed)".into(),
            Self::NextRoot => "Next root".into(),
            Self::AssociatedPathway(true) | Self::AnotherPathway(true) => "Yes".into(),
            Self::AssociatedPathway(false) | Self::AnotherPathway(false) => "No".into(),
            Self::Back => "Back".into(),
            Self::EndSession => "End session".into(),
            Self::Stop => "Stop Session".into(),
        }
    }

    /// Stable kebab-case name, used in errors and by the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::StartRestoration => "start-restoration",
            Self::AddPathways => "add-pathways",
            Self::Acknowledge => "acknowledge",
            Self::Defer { .. } => "defer",
            Self::Readiness(_) => "readiness",
            Self::ReturnToDiscovery => "return-to-discovery",
            Self::FindAssociatedPathway => "find-associated-pathway",
            Self::PickAuthority { .. } => "authority",
            Self::ContinueIntegration { .. } => "continue-integration",
            Self::SkipIntegration => "skip-integration",
            Self::IntegrationDone => "integration-done",
            Self::ChangeIntegration => "change-integration",
            Self::CompleteIntegration(_) => "complete",
            Self::NextRoot => "next-root",
            Self::AssociatedPathway(_) => "associated-pathway",
            Self::AnotherPathway(_) => "another-pathway",
            Self::Back => "back",
            Self::EndSession => "end-session",
            Self::Stop => "stop",
        }
    }
}

// ── Plans ───────────────────────────────────────────────────────────

/// A side effect the engine applies inside the transition's transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Stamp `acknowledgedAt` on the pinned root.
    AcknowledgeRoot,
    /// Move the pinned root to `deferred`.
    DeferRoot { reason: Option<String> },
    StampReadiness(ReadinessResult),
    StampAuthority { mode: AuthorityMode, script: Option<String> },
    StampChannels(Vec<IntegrationChannel>),
    /// Move the pinned root to `restored`.
    RestoreRoot(IntegrationCheck),
    SetPhase(SessionPhase),
    ClearCurrentRoot,
    /// Get-or-create the building collection and point the session at it.
    EnsureBuildingCollection,
    /// Complete the active collection, open a fresh building one, switch the
    /// phase to `new_collection` and unpin the root.
    RollCollection,
    /// `stopRequested = true`, phase `closure`.
    RequestStop,
    /// Stamp `Session.endedAt` (first value wins), phase `closure`.
    EndSession,
}

impl Effect {
    /// Whether the effect writes to the pinned root.
    pub fn needs_root(&self) -> bool {
        matches!(
            self,
            Self::AcknowledgeRoot
                | Self::DeferRoot { .. }
                | Self::StampReadiness(_)
                | Self::StampAuthority { .. }
                | Self::StampChannels(_)
                | Self::RestoreRoot(_)
        )
    }
}

/// Where the machine goes after the effects are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    State(RpState),
    /// Resolve the active collection and root, then pick the entry state.
    ResolveBegin,
    /// Re-run next-root selection from scratch.
    AdvanceRoot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub effects: Vec<Effect>,
    pub target: Target,
}

impl Plan {
    fn go(state: RpState) -> Self {
        Self { effects: Vec::new(), target: Target::State(state) }
    }

    fn with(effects: Vec<Effect>, target: Target) -> Self {
        Self { effects, target }
    }

    /// Whether any effect requires the pinned root.
    pub fn needs_root(&self) -> bool {
        self.effects.iter().any(Effect::needs_root)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MachineError {
    #[error("action `{action}` is not available in state {state}")]
    InvalidAction { state: RpState, action: &'static str },
}

// ── Transition table ────────────────────────────────────────────────

/// Look up the transition for `action` taken in `state`.
pub fn transition(state: RpState, action: &Action) -> Result<Plan, MachineError> {
    use Action as A;
    use RpState as S;

    if matches!(action, A::Stop) {
        return Ok(Plan::with(vec![Effect::RequestStop], Target::State(S::SessionClose)));
    }

    let plan = match (state, action) {
        (S::RestoreInit, A::Begin) => Plan::with(Vec::new(), Target::ResolveBegin),
        (S::RestoreInit | S::AnotherCollectionCheck, A::StartRestoration) => Plan::with(
            vec![
                Effect::EnsureBuildingCollection,
                Effect::SetPhase(SessionPhase::Restoration),
                Effect::ClearCurrentRoot,
            ],
            Target::State(S::RestoreInit),
        ),
        (S::AnotherCollectionCheck, A::AddPathways) => Plan::with(
            vec![Effect::EnsureBuildingCollection, Effect::SetPhase(SessionPhase::Discovery)],
            Target::State(S::RestoreInit),
        ),

        (S::Acknowledgment, A::Acknowledge) => {
            Plan::with(vec![Effect::AcknowledgeRoot], Target::State(S::ReadinessCheck))
        }
        (S::Acknowledgment | S::NotConditional, A::Defer { reason }) => {
            Plan::with(vec![Effect::DeferRoot { reason: reason.clone() }], Target::AdvanceRoot)
        }

        (S::ReadinessCheck, A::Readiness(result)) => {
            let next = match result {
                ReadinessResult::Ready => S::AuthorityTransfer,
                ReadinessResult::NotReady | ReadinessResult::Conditional => S::NotConditional,
            };
            Plan::with(vec![Effect::StampReadiness(*result)], Target::State(next))
        }

        (S::NotConditional, A::ReturnToDiscovery) => Plan::with(
            vec![Effect::SetPhase(SessionPhase::Discovery)],
            Target::State(S::RestoreInit),
        ),
        // Parks the root without deferring it; it stays `identified` and the
        // selector will pick it up again once newer roots are done.
        (S::NotConditional, A::FindAssociatedPathway) => Plan::with(
            vec![
                Effect::SetPhase(SessionPhase::IdentifiedPathsForCollection),
                Effect::ClearCurrentRoot,
            ],
            Target::State(S::RestoreInit),
        ),
        (S::NotConditional, A::EndSession) => {
            Plan::with(vec![Effect::RequestStop], Target::State(S::SessionClose))
        }

        (S::AuthorityTransfer, A::PickAuthority { mode, script }) => Plan::with(
            vec![Effect::StampAuthority { mode: *mode, script: script.clone() }],
            Target::State(S::EmbodiedIntegrationPick),
        ),
        (S::AuthorityTransfer, A::Back) => Plan::go(S::ReadinessCheck),

        (S::EmbodiedIntegrationPick, A::ContinueIntegration { channels }) => Plan::with(
            vec![Effect::StampChannels(channels.clone())],
            Target::State(S::EmbodiedIntegrationGuide),
        ),
        (S::EmbodiedIntegrationPick, A::SkipIntegration) => {
            Plan::go(S::IntegrationCompletionCheck)
        }
        (S::EmbodiedIntegrationPick, A::Back) => Plan::go(S::AuthorityTransfer),

        (S::EmbodiedIntegrationGuide, A::IntegrationDone) => {
            Plan::go(S::IntegrationCompletionCheck)
        }
        (S::EmbodiedIntegrationGuide | S::IntegrationCompletionCheck, A::ChangeIntegration) => {
            Plan::go(S::EmbodiedIntegrationPick)
        }

        (S::IntegrationCompletionCheck, A::CompleteIntegration(check)) => {
            Plan::with(vec![Effect::RestoreRoot(*check)], Target::AdvanceRoot)
        }

        (S::RootComplete, A::NextRoot) => Plan::with(Vec::new(), Target::AdvanceRoot),

        (S::AssociatedPathwayCheck, A::AssociatedPathway(true)) => Plan::with(
            vec![Effect::SetPhase(SessionPhase::IdentifiedPathsForCollection)],
            Target::State(S::RestoreInit),
        ),
        (S::AssociatedPathwayCheck, A::AssociatedPathway(false)) => {
            Plan::go(S::CollectionComplete)
        }

        (S::CollectionComplete, A::AnotherPathway(true)) => {
            Plan::with(vec![Effect::RollCollection], Target::State(S::RestoreInit))
        }
        (S::CollectionComplete, A::AnotherPathway(false)) => Plan::go(S::SessionClose),

        (S::SessionClose, A::EndSession) => Plan::with(
            vec![Effect::EndSession, Effect::SetPhase(SessionPhase::Closure)],
            Target::State(S::SessionClose),
        ),

        _ => return Err(MachineError::InvalidAction { state, action: action.name() }),
    };

    Ok(plan)
}

/// Actions accepted in `state`, as kebab-case names.
pub fn available_actions(state: RpState) -> Vec<&'static str> {
    use RpState as S;

    let mut names: Vec<&'static str> = match state {
        S::RestoreInit => vec!["begin", "start-restoration"],
        S::Acknowledgment => vec!["acknowledge", "defer"],
        S::ReadinessCheck => vec!["readiness"],
        S::NotConditional => {
            vec!["defer", "return-to-discovery", "find-associated-pathway", "end-session"]
        }
        S::AuthorityTransfer => vec!["authority", "back"],
        S::EmbodiedIntegrationPick => vec!["continue-integration", "skip-integration", "back"],
        S::EmbodiedIntegrationGuide => vec!["integration-done", "change-integration"],
        S::IntegrationCompletionCheck => vec!["complete", "change-integration"],
        S::RootComplete => vec!["next-root"],
        S::AssociatedPathwayCheck => vec!["associated-pathway"],
        S::CollectionComplete => vec!["another-pathway"],
        S::AnotherCollectionCheck => vec!["add-pathways", "start-restoration"],
        S::SessionClose => vec!["end-session"],
    };
    names.push("stop");
    names
}

// ── Resolution ──────────────────────────────────────────────────────

/// Entry state for `begin` given what could be resolved.
pub fn resolve_begin(has_collection: bool, root_id: Option<&str>) -> RpState {
    match (has_collection, root_id) {
        (false, _) => RpState::AnotherCollectionCheck,
        (true, None) => RpState::AssociatedPathwayCheck,
        (true, Some(_)) => RpState::Acknowledgment,
    }
}

/// State after an advance, given the selected root (if any).
pub fn resolve_advance(root_id: Option<&str>) -> RpState {
    match root_id {
        Some(_) => RpState::Acknowledgment,
        None => RpState::AssociatedPathwayCheck,
    }
}

/// Next-root selection: newest `identified` root first; only when none are
/// left, newest `deferred` root. `restored` roots are never selected.
///
/// Roots must be passed in insertion order; among equal `created_at` values
/// the later one counts as newer.
pub fn select_next_root(roots: &[RpRoot]) -> Option<&RpRoot> {
    newest_with_status(roots, RootStatus::Identified)
        .or_else(|| newest_with_status(roots, RootStatus::Deferred))
}

fn newest_with_status(roots: &[RpRoot], status: RootStatus) -> Option<&RpRoot> {
    roots
        .iter()
        .enumerate()
        .filter(|(_, root)| root.status == status)
        .max_by(|(ia, a), (ib, b)| a.created_at.cmp(&b.created_at).then(ia.cmp(ib)))
        .map(|(_, root)| root)
}
