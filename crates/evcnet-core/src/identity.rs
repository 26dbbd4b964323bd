// ── Identifier resolution ──
//
// Card and customer ids come from three places, first match wins:
// an explicit per-action override, the configuration, then whatever
// was last observed in a status or log response.

use dashmap::DashMap;
use tracing::info;

/// Which identifier a start command needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum IdentifierKind {
    #[strum(serialize = "card_id")]
    Card,
    #[strum(serialize = "customer_id")]
    Customer,
}

impl IdentifierKind {
    /// Key under which the auto-detected value is persisted.
    pub fn store_key(self) -> &'static str {
        match self {
            Self::Card => crate::store::keys::CARD_ID,
            Self::Customer => crate::store::keys::CUSTOMER_ID,
        }
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum IdentifierSource {
    Override,
    Configured,
    Detected,
}

/// A resolved identifier value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub value: String,
    pub source: IdentifierSource,
}

/// Resolves card/customer ids without doing any I/O.
///
/// The auto-detected cache is shared with the poller, which feeds it
/// through [`observe`](Self::observe).
#[derive(Debug, Default)]
pub struct IdentityResolver {
    card_id: Option<String>,
    customer_id: Option<String>,
    detected: DashMap<IdentifierKind, String>,
}

impl IdentityResolver {
    pub fn new(card_id: Option<String>, customer_id: Option<String>) -> Self {
        Self {
            card_id: non_blank(card_id.as_deref()),
            customer_id: non_blank(customer_id.as_deref()),
            detected: DashMap::new(),
        }
    }

    pub fn configured(&self, kind: IdentifierKind) -> Option<&str> {
        match kind {
            IdentifierKind::Card => self.card_id.as_deref(),
            IdentifierKind::Customer => self.customer_id.as_deref(),
        }
    }

    pub fn detected(&self, kind: IdentifierKind) -> Option<String> {
        self.detected.get(&kind).map(|v| v.value().clone())
    }

    /// Resolve `kind`: override, then configured, then auto-detected.
    pub fn resolve(&self, kind: IdentifierKind, override_value: Option<&str>) -> Option<Resolved> {
        if let Some(value) = non_blank(override_value) {
            return Some(Resolved {
                value,
                source: IdentifierSource::Override,
            });
        }
        if let Some(value) = self.configured(kind) {
            return Some(Resolved {
                value: value.to_owned(),
                source: IdentifierSource::Configured,
            });
        }
        self.detected(kind).map(|value| Resolved {
            value,
            source: IdentifierSource::Detected,
        })
    }

    /// Load a previously detected value, e.g. from persisted state.
    pub fn seed(&self, kind: IdentifierKind, value: String) {
        if let Some(value) = non_blank(Some(&value)) {
            self.detected.insert(kind, value);
        }
    }

    /// Record a value seen in a portal response. Returns `true` if the
    /// cached value changed (the caller persists it).
    pub fn observe(&self, kind: IdentifierKind, value: &str) -> bool {
        let Some(value) = non_blank(Some(value)) else {
            return false;
        };
        let changed = self.detected.get(&kind).is_none_or(|v| *v.value() != value);
        if changed {
            info!(identifier = %kind, "auto-detected identifier");
            self.detected.insert(kind, value);
        }
        changed
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
