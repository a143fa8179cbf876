// Core record types for Restorative Pathways sessions.
//
// Every record is stored whole: an update is read-modify-write of the full
// record. Field names serialize in camelCase so backups stay compatible with
// the flat export layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a persisted or user-supplied tag does not name a variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Closed set of string tags with a stable wire form.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant, )+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Self::parse(value).ok_or_else(|| UnknownVariant { kind: $kind, value: value.to_string() })
            }
        }
    };
}

// ── Session ─────────────────────────────────────────────────────────

/// One client encounter. `ended_at` is set at most once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub person_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Machine state ───────────────────────────────────────────────────

text_enum! {
    /// Position in the restoration protocol.
    pub enum RpState ("state") {
        RestoreInit => "RESTORE_INIT",
        Acknowledgment => "ACKNOWLEDGMENT",
        ReadinessCheck => "READINESS_CHECK",
        NotConditional => "NOT_CONDITIONAL",
        AuthorityTransfer => "AUTHORITY_TRANSFER",
        EmbodiedIntegrationPick => "EMBODIED_INTEGRATION_PICK",
        EmbodiedIntegrationGuide => "EMBODIED_INTEGRATION_GUIDE",
        IntegrationCompletionCheck => "INTEGRATION_COMPLETION_CHECK",
        RootComplete => "ROOT_COMPLETE",
        AssociatedPathwayCheck => "ASSOCIATED_PATHWAY_CHECK",
        CollectionComplete => "COLLECTION_COMPLETE",
        AnotherCollectionCheck => "ANOTHER_COLLECTION_CHECK",
        SessionClose => "SESSION_CLOSE",
    }
}

text_enum! {
    /// Coarse session phase, orthogonal to `RpState`.
    pub enum SessionPhase ("phase") {
        Discovery => "discovery",
        Restoration => "restoration",
        Closure => "closure",
        IdentifiedPathsForCollection => "identified_paths_for_collection",
        NewCollection => "new_collection",
    }
}

/// Live machine checkpoint for a session, keyed by `session_id`.
///
/// `current_collection_id` and `current_root_id` are weak pointers: they are
/// re-validated on every read and re-derived when stale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpSessionState {
    pub session_id: String,
    pub phase: SessionPhase,
    pub current_state: RpState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_collection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_root_id: Option<String>,
    #[serde(default)]
    pub stop_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practitioner_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RpSessionState {
    /// Fresh checkpoint: discovery phase at `RESTORE_INIT`.
    pub fn initial(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: SessionPhase::Discovery,
            current_state: RpState::RestoreInit,
            current_collection_id: None,
            current_root_id: None,
            stop_requested: false,
            practitioner_notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ── Collections ─────────────────────────────────────────────────────

text_enum! {
    pub enum CollectionStatus ("collection status") {
        Building => "building",
        Complete => "complete",
    }
}

/// A batch of roots discovered together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpCollection {
    pub id: String,
    pub session_id: String,
    pub status: CollectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Roots ───────────────────────────────────────────────────────────

text_enum! {
    pub enum RootStatus ("root status") {
        Identified => "identified",
        Restored => "restored",
        Deferred => "deferred",
    }
}

text_enum! {
    pub enum ReadinessResult ("readiness result") {
        Ready => "ready",
        NotReady => "not_ready",
        Conditional => "conditional",
    }
}

text_enum! {
    pub enum AuthorityMode ("authority mode") {
        Prayer => "prayer",
        Declaration => "declaration",
        SilentIntention => "silent_intention",
        SymbolicRelease => "symbolic_release",
        Custom => "custom",
    }
}

impl AuthorityMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Prayer => "Prayer",
            Self::Declaration => "Declaration",
            Self::SilentIntention => "Silent Intention",
            Self::SymbolicRelease => "Symbolic Release",
            Self::Custom => "Custom",
        }
    }
}

text_enum! {
    /// Embodiment channel used during integration.
    pub enum IntegrationChannel ("integration channel") {
        StillnessPresence => "stillness_presence",
        Breath => "breath",
        TouchContact => "touch_contact",
        RhythmicInput => "rhythmic_input",
        MeridianTrace => "meridian_trace",
        GentleMovement => "gentle_movement",
    }
}

impl IntegrationChannel {
    pub fn label(self) -> &'static str {
        match self {
            Self::StillnessPresence => "Stillness & Presence",
            Self::Breath => "Breath",
            Self::TouchContact => "Touch / Contact",
            Self::RhythmicInput => "Rhythmic Input",
            Self::MeridianTrace => "Meridian / Energy Tracing",
            Self::GentleMovement => "Gentle Movement",
        }
    }

    /// Short practitioner prompts shown on the guide step.
    pub fn guidance(self) -> &'static [&'static str] {
        match self {
            Self::StillnessPresence => &["Settle into presence.", "Let the body lead; no forcing."],
            Self::Breath => &["Slow exhale.", "Sigh (no forcing).", "Let breath soften the area."],
            Self::TouchContact => {
                &["Supportive hand on the area.", "Gentle contact; ask \u{201c}is this okay?\u{201d}"]
            }
            Self::RhythmicInput => {
                &["Tapping/bilateral/rocking (gentle).", "Stay with what feels regulating."]
            }
            Self::MeridianTrace => &["Trace along a comfortable path.", "Follow sensation changes."],
            Self::GentleMovement => {
                &["Micro-movement or stretch.", "Stop before strain; stay within ease."]
            }
        }
    }
}

text_enum! {
    pub enum IntegrationCheck ("integration check") {
        Integrated => "integrated",
        Unsure => "unsure",
    }
}

/// Provenance of a root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootSource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RootSource {
    pub const DISCOVERY_TREE: &'static str = "discovery_tree";

    pub fn discovery_tree() -> Self {
        Self { kind: Self::DISCOVERY_TREE.to_string(), detail: None }
    }
}

/// Per-root protocol record. Fields are filled as the root advances and are
/// overwritten field by field, never cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Restoration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_result: Option<ReadinessResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_mode: Option<AuthorityMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels_used: Option<Vec<IntegrationChannel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_check: Option<IntegrationCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferred_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferred_reason: Option<String>,
}

/// One identified issue within a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpRoot {
    pub id: String,
    pub session_id: String,
    pub collection_id: String,
    pub pathway_node_id: String,
    pub domain: String,
    /// Catalog labels from top level to leaf, captured when the root was added.
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<RootSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: RootStatus,
    #[serde(default)]
    pub restoration: Restoration,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RpRoot {
    /// Leaf label, falling back to the domain for an empty path.
    pub fn leaf_label(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or(&self.domain)
    }
}

// ── Audit ───────────────────────────────────────────────────────────

/// Append-only audit entry written on every state change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpEvent {
    pub id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<String>,
    pub state: RpState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
