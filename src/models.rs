use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An authenticated account. The password hash and salt never leave the
/// store layer; this is the wire-safe shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_super_admin: bool,
    pub created_at: String,
}

/// Per-inventory membership role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// A tenant workspace. Every item and project belongs to exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// A user's membership in an inventory, as shown on the members page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

/// A stock-keeping unit. `stock >= 0` is enforced by the store layer on
/// every mutation path, including partial updates that set `stock` directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub stock: i64,
    pub min_stock: i64,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub manufacturer_part_number: Option<String>,
    pub attachments: Vec<String>,
    pub qr_code_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields accepted when creating an item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemCreate {
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub stock: Option<i64>,
    pub min_stock: Option<i64>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub manufacturer_part_number: Option<String>,
    pub attachments: Option<Vec<String>>,
    pub qr_code_url: Option<String>,
}

/// Partial update for an item. `stock`, when present, goes through the same
/// guarded mutation as the add/remove endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub stock: Option<i64>,
    pub min_stock: Option<i64>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub manufacturer_part_number: Option<String>,
    pub attachments: Option<Vec<String>>,
    pub qr_code_url: Option<String>,
}

/// Project lifecycle. Serialized in SCREAMING_SNAKE_CASE on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Planning,
    Active,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "PLANNING",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLANNING" => Ok(Self::Planning),
            "ACTIVE" => Ok(Self::Active),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(format!("Invalid project status: {}", s)),
        }
    }
}

/// One line of a project's bill of materials: how many units of an item
/// the project requires. `quantity > 0` always.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectItem {
    pub id: i64,
    pub project_id: i64,
    pub item_id: i64,
    pub quantity: i64,
    pub item: Option<Item>,
}

/// A build that reserves and consumes items through the three-state
/// lifecycle. Responses embed the full bill of materials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub owner_id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub items: Vec<ProjectItem>,
}

/// Action kinds recorded in the append-only activity log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    Create,
    AddStock,
    RemoveStock,
    Delete,
    ProjectStatus,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::AddStock => "ADD_STOCK",
            Self::RemoveStock => "REMOVE_STOCK",
            Self::Delete => "DELETE",
            Self::ProjectStatus => "PROJECT_STATUS",
        }
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "ADD_STOCK" => Ok(Self::AddStock),
            "REMOVE_STOCK" => Ok(Self::RemoveStock),
            "DELETE" => Ok(Self::Delete),
            "PROJECT_STATUS" => Ok(Self::ProjectStatus),
            _ => Err(format!("Invalid activity action: {}", s)),
        }
    }
}

/// One row of the activity log. Written once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub action: ActivityAction,
    pub item_id: Option<i64>,
    pub project_id: Option<i64>,
    pub detail: String,
    pub created_at: String,
}

// API view types

/// Per-inventory dashboard payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_items: i64,
    pub total_stock: i64,
    pub low_stock: Vec<Item>,
    pub recent_activity: Vec<ActivityEntry>,
    pub most_used: Vec<ItemUsage>,
}

/// How often an item has had stock removed (manually or by project
/// activation), derived from the activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemUsage {
    pub item_id: i64,
    pub name: String,
    pub times_used: i64,
}

/// Cross-tenant totals for the super-admin page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_users: i64,
    pub total_inventories: i64,
    pub total_items: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for s in &["admin", "user"] {
            let parsed: Role = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_project_status_roundtrip() {
        for s in &["PLANNING", "ACTIVE", "COMPLETED"] {
            let parsed: ProjectStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("planning".parse::<ProjectStatus>().is_err());
        assert!("DONE".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn test_activity_action_roundtrip() {
        for s in &["CREATE", "ADD_STOCK", "REMOVE_STOCK", "DELETE", "PROJECT_STATUS"] {
            let parsed: ActivityAction = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("UPDATE".parse::<ActivityAction>().is_err());
    }

    #[test]
    fn test_serde_wire_format() {
        // Statuses and actions are SCREAMING_SNAKE_CASE; roles lowercase.
        assert_eq!(
            serde_json::to_string(&ProjectStatus::Planning).unwrap(),
            "\"PLANNING\""
        );
        assert_eq!(
            serde_json::to_string(&ActivityAction::AddStock).unwrap(),
            "\"ADD_STOCK\""
        );
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(
            serde_json::from_str::<ProjectStatus>("\"COMPLETED\"").unwrap(),
            ProjectStatus::Completed
        );
        assert_eq!(
            serde_json::from_str::<ActivityAction>("\"PROJECT_STATUS\"").unwrap(),
            ActivityAction::ProjectStatus
        );
    }
}
