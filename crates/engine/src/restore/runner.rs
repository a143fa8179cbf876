// Restoration runner: applies one practitioner action to a session.
//
// Each call is one write transaction: load the checkpoint, look up the
// transition, apply its effects to the pinned root and the checkpoint,
// resolve the target state against storage, persist, append one event.
// Any error drops the transaction and leaves the store untouched.

use anyhow::Context;
use chrono::{DateTime, Utc};
use pathways_common::machine::{self, Action, Effect, Target};
use pathways_common::types::{RootStatus, RpRoot, RpSessionState, RpState, SessionPhase};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{collection, root, session_state};
use crate::error::RestoreError;
use crate::store::meta_db::MetaDb;
use crate::store::roots::RootStore;
use crate::store::sessions::SessionStore;

/// Where a session stands after an action.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub state: RpSessionState,
    /// The pinned root, when the checkpoint names one that exists.
    pub root: Option<RpRoot>,
    pub available: Vec<&'static str>,
}

/// Apply `action` to the session's machine.
pub fn apply(
    db: &mut MetaDb,
    session_id: &str,
    action: &Action,
    now: DateTime<Utc>,
) -> Result<Step, RestoreError> {
    let tx = db.write_transaction()?;
    let mut state = session_state::ensure_in(&tx, session_id, now)?;
    let from = state.current_state;
    let plan = machine::transition(from, action)?;
    let label = action.label();

    let needs_root = plan.needs_root();
    // A restored root is finished; treat it like a missing one.
    let mut pinned = if needs_root {
        pinned_root_in(&tx, &state)?.filter(|root| root.status != RootStatus::Restored)
    } else {
        None
    };
    let mut effects = plan.effects;
    let mut target = plan.target;
    if needs_root && pinned.is_none() {
        warn!(
            session_id,
            state = %from,
            root_id = ?state.current_root_id,
            "pinned root is missing or already restored; re-running selection"
        );
        effects.retain(|effect| !effect.needs_root());
        target = Target::AdvanceRoot;
    }

    for effect in &effects {
        match pinned.as_mut() {
            Some(root) if effect.needs_root() => apply_root_effect(root, effect, now)?,
            _ => apply_session_effect(&tx, &mut state, effect, now)?,
        }
    }
    if let Some(root) = &pinned {
        RootStore::put(&tx, root)?;
    }

    let (next, event_label) = match target {
        Target::State(next) => (next, label),
        Target::ResolveBegin => resolve_begin_in(&tx, &mut state)?,
        Target::AdvanceRoot => advance_in(&tx, &mut state, action)?,
    };

    let payload = json!({ "from": from, "action": action.name() });
    let label = Some(event_label.as_str());
    session_state::transition_in(&tx, &mut state, next, label, Some(payload), now)?;
    tx.commit().context("failed to commit transition")?;

    info!(
        session_id,
        %from,
        to = %next,
        action = action.name(),
        root_id = ?state.current_root_id,
        "transition applied"
    );
    step_for(db, state)
}

/// Current position without changing anything.
pub fn status(db: &MetaDb, session_id: &str) -> Result<Step, RestoreError> {
    let state = session_state::get_state(db, session_id)?
        .ok_or_else(|| RestoreError::not_found("session state", session_id))?;
    step_for(db, state)
}

fn step_for(db: &MetaDb, state: RpSessionState) -> Result<Step, RestoreError> {
    let root = pinned_root_in(db.connection(), &state)?;
    let available = machine::available_actions(state.current_state);
    Ok(Step { state, root, available })
}

fn pinned_root_in(conn: &Connection, state: &RpSessionState) -> anyhow::Result<Option<RpRoot>> {
    let Some(root_id) = state.current_root_id.as_deref() else {
        return Ok(None);
    };
    Ok(RootStore::get(conn, root_id)?.filter(|root| root.session_id == state.session_id))
}

fn apply_root_effect(
    root: &mut RpRoot,
    effect: &Effect,
    now: DateTime<Utc>,
) -> Result<(), RestoreError> {
    match effect {
        Effect::AcknowledgeRoot => {
            root.restoration.acknowledged_at = Some(now);
        }
        Effect::DeferRoot { reason } => return root::defer(root, reason.as_deref(), now),
        Effect::StampReadiness(result) => {
            root.restoration.readiness_result = Some(*result);
        }
        Effect::StampAuthority { mode, script } => {
            root.restoration.authority_mode = Some(*mode);
            if let Some(script) = script.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                root.restoration.authority_script = Some(script.to_string());
            }
        }
        Effect::StampChannels(channels) => {
            // An empty pick keeps whatever was chosen before.
            if !channels.is_empty() {
                root.restoration.channels_used = Some(channels.clone());
            }
        }
        Effect::RestoreRoot(check) => {
            root::restore(root, *check, now);
            return Ok(());
        }
        _ => return Ok(()),
    }
    root.updated_at = now;
    Ok(())
}

fn apply_session_effect(
    conn: &Connection,
    state: &mut RpSessionState,
    effect: &Effect,
    now: DateTime<Utc>,
) -> Result<(), RestoreError> {
    match effect {
        Effect::SetPhase(phase) => state.phase = *phase,
        Effect::ClearCurrentRoot => state.current_root_id = None,
        Effect::EnsureBuildingCollection => {
            collection::ensure_building_in(conn, state, now)?;
        }
        Effect::RollCollection => {
            collection::roll_in(conn, state, now)?;
        }
        Effect::RequestStop => session_state::mark_stopped(state),
        Effect::EndSession => {
            if !SessionStore::mark_ended(conn, &state.session_id, now)? {
                return Err(RestoreError::not_found("session", state.session_id.clone()));
            }
        }
        // Root effects without a pinned root were dropped before this point.
        Effect::AcknowledgeRoot
        | Effect::DeferRoot { .. }
        | Effect::StampReadiness(_)
        | Effect::StampAuthority { .. }
        | Effect::StampChannels(_)
        | Effect::RestoreRoot(_) => {}
    }
    Ok(())
}

/// Resolve `begin` from `RESTORE_INIT`.
///
/// Never creates a collection. A pinned root is kept only if it is still an
/// `identified` root of the active collection; otherwise selection runs.
fn resolve_begin_in(
    conn: &Connection,
    state: &mut RpSessionState,
) -> anyhow::Result<(RpState, String)> {
    let Some(active) = collection::resolve_active_in(conn, state)? else {
        return Ok((machine::resolve_begin(false, None), "No collection".into()));
    };
    if state.current_collection_id.as_deref() != Some(active.id.as_str()) {
        debug!(
            session_id = %state.session_id,
            stale = ?state.current_collection_id,
            collection_id = %active.id,
            "re-pointed session at building collection"
        );
        state.current_collection_id = Some(active.id.clone());
    }

    let kept = match pinned_root_in(conn, state)? {
        Some(root) if root.collection_id == active.id && root.status == RootStatus::Identified => {
            Some(root.id)
        }
        _ => None,
    };
    let root_id = match kept {
        Some(id) => Some(id),
        None => root::pick_next_in(conn, &active.id)?.map(|root| root.id),
    };

    state.current_root_id = root_id.clone();
    let next = machine::resolve_begin(true, root_id.as_deref());
    let label = match root_id {
        Some(_) => {
            state.phase = SessionPhase::Restoration;
            "Start root"
        }
        None => "No roots in collection",
    };
    Ok((next, label.into()))
}

/// Re-run next-root selection over the active collection and pin the result.
fn advance_in(
    conn: &Connection,
    state: &mut RpSessionState,
    action: &Action,
) -> anyhow::Result<(RpState, String)> {
    let picked = match collection::resolve_active_in(conn, state)? {
        Some(active) => {
            state.current_collection_id = Some(active.id.clone());
            root::pick_next_in(conn, &active.id)?
        }
        None => None,
    };

    state.current_root_id = picked.map(|root| root.id);
    let next = machine::resolve_advance(state.current_root_id.as_deref());
    let found = state.current_root_id.is_some();
    let label = match action {
        Action::NextRoot if found => "Next root".to_string(),
        Action::NextRoot => "No more roots".to_string(),
        other if found => format!("{} \u{2192} next root", other.label()),
        other => format!("{} \u{2192} no more roots", other.label()),
    };
    Ok((next, label))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pathways_common::catalog::{CatalogIndex, CatalogNode};
    use pathways_common::types::{
        AuthorityMode, CollectionStatus, IntegrationChannel, IntegrationCheck, ReadinessResult,
    };

    use super::*;
    use crate::restore::root::add_root;
    use crate::store::collections::CollectionStore;
    use crate::store::events::EventStore;
    use crate::store::rp_state::RpStateStore;
    use crate::store::testing::{cleanup, setup, ts};

    fn catalog() -> CatalogIndex {
        let mut nodes = BTreeMap::new();
        for (id, label) in [("jaw", "Jaw tension"), ("neck", "Neck"), ("fear", "Fear")] {
            nodes.insert(
                id.to_string(),
                CatalogNode {
                    label: label.into(),
                    level: 2,
                    domain: "Body".into(),
                    children: Vec::new(),
                    selectable: true,
                },
            );
        }
        CatalogIndex::from_nodes("test", nodes)
    }

    fn run(db: &mut MetaDb, action: Action, at: i64) -> Step {
        apply(db, "s1", &action, ts(at)).expect("action should apply")
    }

    #[test]
    fn begin_without_collection_goes_to_another_collection_check() {
        let (mut db, path) = setup("runner-no-collection");
        let step = run(&mut db, Action::Begin, 0);
        assert_eq!(step.state.current_state, RpState::AnotherCollectionCheck);
        assert!(CollectionStore::list_for_session(db.connection(), "s1").unwrap().is_empty());

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn begin_with_empty_collection_goes_to_associated_check() {
        let (mut db, path) = setup("runner-empty");
        collection::ensure_building_collection(&mut db, "s1", ts(0)).unwrap();
        let step = run(&mut db, Action::Begin, 1);
        assert_eq!(step.state.current_state, RpState::AssociatedPathwayCheck);
        assert!(step.root.is_none());

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn full_root_walk_restores_and_advances() {
        let (mut db, path) = setup("runner-walk");
        let older = add_root(&mut db, &catalog(), "s1", "neck", None, ts(0)).unwrap();
        let newer = add_root(&mut db, &catalog(), "s1", "jaw", None, ts(1)).unwrap();

        let step = run(&mut db, Action::Begin, 2);
        assert_eq!(step.state.current_state, RpState::Acknowledgment);
        assert_eq!(step.state.phase, SessionPhase::Restoration);
        assert_eq!(step.root.as_ref().map(|r| r.id.as_str()), Some(newer.id.as_str()));

        run(&mut db, Action::Acknowledge, 3);
        run(&mut db, Action::Readiness(ReadinessResult::Ready), 4);
        run(
            &mut db,
            Action::PickAuthority { mode: AuthorityMode::Declaration, script: Some(" I release ".into()) },
            5,
        );
        run(&mut db, Action::ContinueIntegration { channels: vec![IntegrationChannel::Breath] }, 6);
        run(&mut db, Action::IntegrationDone, 7);
        let step = run(&mut db, Action::CompleteIntegration(IntegrationCheck::Integrated), 8);

        assert_eq!(step.state.current_state, RpState::Acknowledgment);
        assert_eq!(step.root.as_ref().map(|r| r.id.as_str()), Some(older.id.as_str()));

        let restored = RootStore::get(db.connection(), &newer.id).unwrap().unwrap();
        assert_eq!(restored.status, RootStatus::Restored);
        let record = &restored.restoration;
        assert_eq!(record.acknowledged_at, Some(ts(3)));
        assert_eq!(record.readiness_result, Some(ReadinessResult::Ready));
        assert_eq!(record.authority_mode, Some(AuthorityMode::Declaration));
        assert_eq!(record.authority_script.as_deref(), Some("I release"));
        assert_eq!(record.channels_used, Some(vec![IntegrationChannel::Breath]));
        assert_eq!(record.integration_check, Some(IntegrationCheck::Integrated));
        assert_eq!(record.restored_at, Some(ts(8)));

        let events = EventStore::list_for_session(db.connection(), "s1").unwrap();
        assert_eq!(
            events.last().and_then(|e| e.action.as_deref()),
            Some("Integrated \u{2192} next root")
        );

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn invalid_action_leaves_store_untouched() {
        let (mut db, path) = setup("runner-invalid");
        run(&mut db, Action::Begin, 0);
        let before = RpStateStore::get(db.connection(), "s1").unwrap();
        let events_before = EventStore::list_for_session(db.connection(), "s1").unwrap().len();

        let error = apply(&mut db, "s1", &Action::Acknowledge, ts(1)).unwrap_err();
        assert_eq!(error.code(), "INVALID_ACTION");
        assert_eq!(RpStateStore::get(db.connection(), "s1").unwrap(), before);
        assert_eq!(EventStore::list_for_session(db.connection(), "s1").unwrap().len(), events_before);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn deleted_pinned_root_falls_back_to_selection() {
        let (mut db, path) = setup("runner-dangling");
        let only = add_root(&mut db, &catalog(), "s1", "jaw", None, ts(0)).unwrap();
        run(&mut db, Action::Begin, 1);
        db.connection().execute("DELETE FROM rp_roots WHERE id = ?1", [&only.id]).unwrap();

        let step = run(&mut db, Action::Acknowledge, 2);
        assert_eq!(step.state.current_state, RpState::AssociatedPathwayCheck);
        assert_eq!(step.state.current_root_id, None);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn restored_pinned_root_is_not_worked_again() {
        let (mut db, path) = setup("runner-restored-pin");
        let older = add_root(&mut db, &catalog(), "s1", "neck", None, ts(0)).unwrap();
        let newer = add_root(&mut db, &catalog(), "s1", "jaw", None, ts(1)).unwrap();
        run(&mut db, Action::Begin, 2);
        root::restore_root(&mut db, &newer.id, IntegrationCheck::Integrated, ts(3)).unwrap();

        let step = run(&mut db, Action::Acknowledge, 4);
        assert_eq!(step.state.current_state, RpState::Acknowledgment);
        assert_eq!(step.state.current_root_id.as_deref(), Some(older.id.as_str()));
        let finished = RootStore::get(db.connection(), &newer.id).unwrap().unwrap();
        assert_eq!(finished.restoration.acknowledged_at, None);
        assert_eq!(finished.restoration.restored_at, Some(ts(3)));

        root::restore_root(&mut db, &older.id, IntegrationCheck::Unsure, ts(5)).unwrap();
        let step = run(&mut db, Action::Defer { reason: Some("later".into()) }, 6);
        assert_eq!(step.state.current_state, RpState::AssociatedPathwayCheck);
        assert_eq!(step.state.current_root_id, None);
        let finished = RootStore::get(db.connection(), &older.id).unwrap().unwrap();
        assert_eq!(finished.status, RootStatus::Restored);
        assert_eq!(finished.restoration.deferred_at, None);
        assert_eq!(finished.restoration.deferred_reason, None);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn find_associated_pathway_parks_root_as_identified() {
        let (mut db, path) = setup("runner-park");
        let parked = add_root(&mut db, &catalog(), "s1", "jaw", None, ts(0)).unwrap();
        run(&mut db, Action::Begin, 1);
        run(&mut db, Action::Acknowledge, 2);
        run(&mut db, Action::Readiness(ReadinessResult::Conditional), 3);
        let step = run(&mut db, Action::FindAssociatedPathway, 4);

        assert_eq!(step.state.current_state, RpState::RestoreInit);
        assert_eq!(step.state.phase, SessionPhase::IdentifiedPathsForCollection);
        assert_eq!(step.state.current_root_id, None);
        let stored = RootStore::get(db.connection(), &parked.id).unwrap().unwrap();
        assert_eq!(stored.status, RootStatus::Identified);

        let associated = add_root(&mut db, &catalog(), "s1", "fear", None, ts(5)).unwrap();
        let step = run(&mut db, Action::Begin, 6);
        assert_eq!(step.state.current_root_id.as_deref(), Some(associated.id.as_str()));

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn another_pathway_rolls_collection() {
        let (mut db, path) = setup("runner-roll");
        let first = collection::ensure_building_collection(&mut db, "s1", ts(0)).unwrap();
        run(&mut db, Action::Begin, 1);
        run(&mut db, Action::AssociatedPathway(false), 2);
        let step = run(&mut db, Action::AnotherPathway(true), 3);

        assert_eq!(step.state.current_state, RpState::RestoreInit);
        assert_eq!(step.state.phase, SessionPhase::NewCollection);
        let new_id = step.state.current_collection_id.clone().unwrap();
        assert_ne!(new_id, first.collection.id);

        let old = CollectionStore::get(db.connection(), &first.collection.id).unwrap().unwrap();
        assert_eq!(old.status, CollectionStatus::Complete);
        let new = CollectionStore::get(db.connection(), &new_id).unwrap().unwrap();
        assert_eq!(new.status, CollectionStatus::Building);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn end_session_requires_session_record() {
        let (mut db, path) = setup("runner-end");
        run(&mut db, Action::Stop, 0);
        let error = apply(&mut db, "s1", &Action::EndSession, ts(1)).unwrap_err();
        assert_eq!(error.code(), "NOT_FOUND");

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn status_reports_available_actions() {
        let (mut db, path) = setup("runner-status");
        assert_eq!(status(&db, "s1").unwrap_err().code(), "NOT_FOUND");

        run(&mut db, Action::Begin, 0);
        let step = status(&db, "s1").unwrap();
        assert_eq!(step.available, vec!["add-pathways", "start-restoration", "stop"]);

        drop(db);
        cleanup(&path);
    }
}
