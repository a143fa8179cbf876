// Client-facing session summary.
//
// Pure and deterministic: the same session, roots and notes always produce
// the same bytes. Roots are listed oldest-first within each group even
// though restoration works newest-first.

use crate::types::{RootStatus, RpRoot, Session};

pub const TITLE: &str = "Restorative Pathways \u{2014} Session Summary";

const PLAIN_ENGLISH: &[&str] = &[
    "In this session we used a gentle, body-based process called Restorative Pathways. \
     We listened for themes your system was signaling (stress patterns, protective responses, \
     beliefs, emotions, body sensations, etc.). These themes are not medical diagnoses\u{2014}they \
     are signposts that guide what we support and restore.",
    "Words you may see below: \u{201c}Restored\u{201d} means the process completed for that theme \
     today. \u{201c}Deferred\u{201d} means we paused because the system needed something first \
     (safety, capacity, timing, information, or a prerequisite theme). \u{201c}Identified\u{201d} \
     means it was on the list, but we did not complete it today.",
];

/// Fixed aftercare checklist.
pub const AFTERCARE: &[&str] = &[
    "Hydrate",
    "Rest / gentle movement",
    "Notice changes without forcing meaning",
    "Pause heavy processing for 24 hours (optional)",
];

const DISCLAIMER: &str = "Reminder: this work supports the nervous system and mind\u{2013}body \
     patterns. It does not replace medical care. If symptoms are intense, persistent, or \
     concerning, consult a licensed medical professional.";

/// Render the plain-text summary for one session.
///
/// `client_name` falls back to `"Client"` when blank. `extra_notes` becomes
/// the optional "Additional notes / next steps" section.
pub fn build_summary(
    client_name: &str,
    session: &Session,
    roots: &[RpRoot],
    extra_notes: Option<&str>,
) -> String {
    let mut ordered: Vec<&RpRoot> = roots.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let with_status =
        |status: RootStatus| ordered.iter().copied().filter(move |r| r.status == status);

    let mut lines: Vec<String> = Vec::new();

    lines.push(TITLE.to_string());
    let client = client_name.trim();
    lines.push(format!("Client: {}", if client.is_empty() { "Client" } else { client }));
    lines.push(format!("Date: {}", session.started_at.format("%Y-%m-%d")));
    if let Some(reason) = non_blank(session.reason.as_deref()) {
        lines.push(format!("Focus: {}", compact(reason)));
    }
    if let Some(notes) = non_blank(session.notes.as_deref()) {
        lines.push(String::new());
        lines.push("Session notes".into());
        lines.push(compact(notes));
    }

    lines.push(String::new());
    lines.push("What we did (plain English)".into());
    for paragraph in PLAIN_ENGLISH {
        lines.push(compact(paragraph));
    }

    lines.push(String::new());
    lines.push("What we completed today".into());
    let mut any_restored = false;
    for root in with_status(RootStatus::Restored) {
        any_restored = true;
        push_root(&mut lines, root, "");
        push_note(&mut lines, root);
    }
    if !any_restored {
        lines.push("- (No pathways were completed today.)".into());
    }

    lines.push(String::new());
    lines.push("What we identified to revisit".into());
    let mut any_outstanding = false;
    for root in with_status(RootStatus::Deferred) {
        any_outstanding = true;
        push_root(&mut lines, root, " (paused)");
        if let Some(reason) = non_blank(root.restoration.deferred_reason.as_deref()) {
            lines.push(format!("  What was needed first: {}", compact(reason)));
        }
        push_note(&mut lines, root);
    }
    for root in with_status(RootStatus::Identified) {
        any_outstanding = true;
        push_root(&mut lines, root, " (identified)");
        push_note(&mut lines, root);
    }
    if !any_outstanding {
        lines.push("- (Nothing outstanding from this list.)".into());
    }

    lines.push(String::new());
    lines.push("Next steps (aftercare)".into());
    for item in AFTERCARE {
        lines.push(format!("- {item}"));
    }

    if let Some(extra) = non_blank(extra_notes) {
        lines.push(String::new());
        lines.push("Additional notes / next steps".into());
        lines.push(extra.trim().to_string());
    }

    lines.push(String::new());
    lines.push(compact(DISCLAIMER));

    lines.join("\n")
}

fn push_root(lines: &mut Vec<String>, root: &RpRoot, suffix: &str) {
    lines.push(format!("- {}{suffix}", theme(root)));
    if let Some(pathway) = pathway(root) {
        lines.push(format!("  Pathway: {pathway}"));
    }
}

fn push_note(lines: &mut Vec<String>, root: &RpRoot) {
    if let Some(note) = non_blank(root.notes.as_deref()) {
        lines.push(format!("  Note: {}", compact(note)));
    }
}

fn theme(root: &RpRoot) -> String {
    if root.domain.is_empty() {
        root.leaf_label().to_string()
    } else {
        format!("{} ({})", root.leaf_label(), root.domain)
    }
}

fn pathway(root: &RpRoot) -> Option<String> {
    let joined =
        if root.path.is_empty() { root.domain.clone() } else { root.path.join(" \u{2192} ") };
    (!joined.is_empty()).then_some(joined)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn compact(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
