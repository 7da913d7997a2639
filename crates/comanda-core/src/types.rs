//! # Reference-Data Types
//!
//! Server-owned reference data the terminal caches locally: the menu
//! snapshot (versioned by the server) and the customer directory
//! (time-boxed, no server version).
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Reference Data                                    │
//! │                                                                         │
//! │  ┌───────────────────────────────┐   ┌─────────────────┐               │
//! │  │         MenuSnapshot          │   │    Customer     │               │
//! │  │  ───────────────────────────  │   │  ─────────────  │               │
//! │  │  version (server counter)     │   │  id (UUID)      │               │
//! │  │  items:      Vec<MenuItem>    │   │  name           │               │
//! │  │  categories: Vec<MenuCategory>│   │  phone / email  │               │
//! │  │  currency, service charge     │   │  (TTL-cached)   │               │
//! │  └───────────────────────────────┘   └─────────────────┘               │
//! │                                                                         │
//! │  The snapshot is replaced WHOLESALE on refetch - never merged item by  │
//! │  item - so a single version number describes the entire collection.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Reference Collections
// =============================================================================

/// The reference-data collections the engine keeps fresh.
///
/// ## Revalidation Strategy
/// - `Menu` carries a server-tracked monotonic version; staleness is decided
///   by asking the server "anything changed since version N".
/// - `Customers` has no server version; staleness is decided by the age of
///   the cached copy (fixed TTL window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceCollection {
    Menu,
    Customers,
}

impl ReferenceCollection {
    /// Stable name used in cache keys and log fields.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReferenceCollection::Menu => "menu",
            ReferenceCollection::Customers => "customers",
        }
    }
}

impl std::fmt::Display for ReferenceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Menu
// =============================================================================

/// A single sellable item on the menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MenuItem {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Category this item is listed under.
    pub category_id: String,

    /// Display name shown on the menu grid and kitchen tickets.
    pub name: String,

    /// Optional description for the order screen.
    pub description: Option<String>,

    /// Price in cents (smallest currency unit).
    pub price_cents: i64,

    /// Tax rate in basis points (825 = 8.25%).
    pub tax_rate_bps: u32,

    /// Whether the item can currently be ordered ("86'd" items are false).
    pub is_available: bool,

    /// Display ordering within the category.
    pub sort_order: i64,
}

/// A menu category (Starters, Mains, Drinks, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MenuCategory {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Display ordering on the menu grid.
    pub sort_order: i64,
}

/// The full menu as served by the remote system of record.
///
/// Replaced wholesale on every refetch; `version` is the server's monotonic
/// counter for the whole collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MenuSnapshot {
    /// All sellable items.
    pub items: Vec<MenuItem>,

    /// All categories.
    pub categories: Vec<MenuCategory>,

    /// ISO 4217 currency code ("USD", "EUR", ...).
    pub currency: String,

    /// House service charge in basis points, applied by the (out-of-scope)
    /// pricing layer.
    pub service_charge_bps: u32,

    /// Server-side monotonic version of this collection.
    pub version: i64,

    /// When the server generated this snapshot.
    #[ts(as = "String")]
    pub generated_at: DateTime<Utc>,
}

impl MenuSnapshot {
    /// Items in a category, available ones only, in display order.
    pub fn available_in_category(&self, category_id: &str) -> Vec<&MenuItem> {
        let mut items: Vec<&MenuItem> = self
            .items
            .iter()
            .filter(|i| i.category_id == category_id && i.is_available)
            .collect();
        items.sort_by_key(|i| i.sort_order);
        items
    }
}

// =============================================================================
// Customers
// =============================================================================

/// A customer directory entry.
///
/// The directory has no server version counter, so cached copies are
/// refreshed on a fixed TTL window instead of version negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Customer {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Contact phone, if known.
    pub phone: Option<String>,

    /// Contact email, if known.
    pub email: Option<String>,

    /// Free-form notes ("allergic to peanuts", "regular, table 4").
    pub notes: Option<String>,

    /// When the server last updated this entry.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Write Payloads
// =============================================================================

/// A line on an order ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderLine {
    /// The menu item ordered.
    pub menu_item_id: String,

    /// Quantity ordered.
    pub quantity: i64,

    /// Unit price in cents at the time the order was taken (frozen).
    pub unit_price_cents: i64,

    /// Kitchen note ("no onions").
    pub note: Option<String>,
}

/// Payload for order mutations (`CreateOrder`, `UpdateOrder`, `VoidOrder`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderPayload {
    /// Client-generated order id (UUID v4) - stable across retries.
    pub order_id: String,

    /// Table the order belongs to, if dine-in.
    pub table_id: Option<String>,

    /// Ordered lines.
    pub lines: Vec<OrderLine>,

    /// When the order was taken at the terminal.
    #[ts(as = "String")]
    pub placed_at: DateTime<Utc>,
}

/// Payload for `AdjustInventory` mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryAdjustment {
    /// Item whose stock count changes.
    pub menu_item_id: String,

    /// Signed stock delta (negative for consumption).
    pub delta: i64,

    /// Why the adjustment happened ("sold", "spoilage", "recount").
    pub reason: String,
}

/// Payload for `AssignTable` mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TableAssignment {
    /// Table being seated or cleared.
    pub table_id: String,

    /// Order occupying the table, if any.
    pub order_id: Option<String>,

    /// Party size for the seating.
    pub party_size: Option<i64>,
}

// =============================================================================
// Unit Tests
// =============================================================================
