//! Catalog records and the small value types shared by every layer.
//!
//! Dishes and combos share one id space: ids at or above
//! [`COMBO_ID_THRESHOLD`] name combos, everything below names a dish. Status
//! bitmaps index bits by this id, so a single bitmap covers both kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a dish or combo.
pub type EntityId = u32;

/// Opaque user identifier (the upstream identity provider's openid).
pub type UserId = String;

/// Order identifier, allocated by the server when an order is placed.
pub type OrderId = String;

/// First id in the combo range.
pub const COMBO_ID_THRESHOLD: EntityId = 100_000;

/// Returns `true` when `id` names a combo rather than a dish.
#[must_use]
pub fn is_combo_id(id: EntityId) -> bool {
    id >= COMBO_ID_THRESHOLD
}

// ---------------------------------------------------------------------------
// Catalog records
// ---------------------------------------------------------------------------

/// A single dish as stored in the persistent catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dish {
    pub id: EntityId,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub image: String,
    /// Units sold, as last flushed to the store.
    #[serde(default)]
    pub sale: u64,
    /// Favorite count, as last flushed to the store.
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub store_id: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Candidate for the "new" list on the index page.
    #[serde(default)]
    pub is_new: bool,
    /// Candidate for the "recommended" list on the index page.
    #[serde(default)]
    pub is_recommended: bool,
}

/// One constituent of a combo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComboDish {
    pub dish_id: EntityId,
    pub quantity: u32,
    #[serde(default)]
    pub image: String,
}

/// A fixed bundle of dishes sold under its own id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Combo {
    pub id: EntityId,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub sale: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub dishes: Vec<ComboDish>,
}

impl Combo {
    /// Image shown when the combo is rendered as a dish summary: the image of
    /// its first constituent.
    #[must_use]
    pub fn cover_image(&self) -> &str {
        self.dishes.first().map_or("", |d| d.image.as_str())
    }
}

/// One line of a placed order, naming a dish or a combo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub entity_id: EntityId,
    pub quantity: u32,
}

// ---------------------------------------------------------------------------
// Status axes
// ---------------------------------------------------------------------------

/// A boolean dimension of entity visibility, stored as one bitmap per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusAxis {
    /// Dish is published (orderable).
    Publish,
    /// Dish appears in the recommended list.
    Recommend,
    /// Dish appears in the new list.
    New,
    /// Combo is published.
    ComboPublish,
    /// Per-user favorite flag. Only meaningful with a user-scoped key.
    Favorite,
}

impl StatusAxis {
    /// Axes that are stored once for all users.
    pub const GLOBAL: [StatusAxis; 4] = [
        StatusAxis::Publish,
        StatusAxis::Recommend,
        StatusAxis::New,
        StatusAxis::ComboPublish,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StatusAxis::Publish => "publish",
            StatusAxis::Recommend => "recommend",
            StatusAxis::New => "new",
            StatusAxis::ComboPublish => "combo-publish",
            StatusAxis::Favorite => "favorite",
        }
    }

    /// Returns `true` for axes stored per user rather than globally.
    #[must_use]
    pub fn is_user_scoped(self) -> bool {
        matches!(self, StatusAxis::Favorite)
    }
}

impl fmt::Display for StatusAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown axis name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status axis: {0}")]
pub struct UnknownAxis(pub String);

impl FromStr for StatusAxis {
    type Err = UnknownAxis;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publish" => Ok(StatusAxis::Publish),
            "recommend" => Ok(StatusAxis::Recommend),
            "new" => Ok(StatusAxis::New),
            "combo-publish" => Ok(StatusAxis::ComboPublish),
            "favorite" => Ok(StatusAxis::Favorite),
            other => Err(UnknownAxis(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Completion codes
// ---------------------------------------------------------------------------

/// Outcome of an asynchronously processed order.
///
/// `PENDING` is never stored; it is what readers see while no record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionCode(pub i64);

impl CompletionCode {
    pub const PENDING: CompletionCode = CompletionCode(0);
    pub const COMPLETED: CompletionCode = CompletionCode(1);
    pub const OUT_OF_STOCK: CompletionCode = CompletionCode(2);
    pub const REJECTED: CompletionCode = CompletionCode(3);

    #[must_use]
    pub fn is_pending(self) -> bool {
        self == Self::PENDING
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::PENDING => "pending",
            Self::COMPLETED => "completed",
            Self::OUT_OF_STOCK => "out-of-stock",
            Self::REJECTED => "rejected",
            _ => "unknown",
        }
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Denormalized counters that are accumulated in the cache and flushed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    Likes,
    Sales,
}

impl CounterKind {
    pub const ALL: [CounterKind; 2] = [CounterKind::Likes, CounterKind::Sales];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CounterKind::Likes => "likes",
            CounterKind::Sales => "sales",
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending change to one entity's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterDelta {
    pub entity_id: EntityId,
    pub delta: i64,
}
