use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, params};

use crate::engine::{self, StockEffect};
use crate::errors::StoreError;
use crate::models::*;

type Result<T> = std::result::Result<T, StoreError>;

/// Async-safe handle to the inventory database.
///
/// Wraps `InventoryDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads. The mutex also serializes every
/// writer, so concurrent stock adjustments against the same item cannot
/// interleave their read-validate-write steps.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<InventoryDb>>,
}

impl DbHandle {
    pub fn new(db: InventoryDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&InventoryDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Database(anyhow::anyhow!("DB task panicked: {}", e)))?
    }

    /// Acquire the database mutex synchronously. Used for startup
    /// initialization and tests; must not be called from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, InventoryDb>> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

pub struct InventoryDb {
    conn: Connection,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

impl InventoryDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    salt TEXT NOT NULL,
                    is_super_admin INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS inventories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS memberships (
                    inventory_id INTEGER NOT NULL REFERENCES inventories(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    role TEXT NOT NULL DEFAULT 'user',
                    PRIMARY KEY (inventory_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    inventory_id INTEGER NOT NULL REFERENCES inventories(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL DEFAULT 'Misc',
                    description TEXT,
                    stock INTEGER NOT NULL DEFAULT 0,
                    min_stock INTEGER NOT NULL DEFAULT 0,
                    location TEXT,
                    image_url TEXT,
                    manufacturer_part_number TEXT,
                    attachments TEXT NOT NULL DEFAULT '[]',
                    qr_code_url TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    inventory_id INTEGER NOT NULL REFERENCES inventories(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT,
                    status TEXT NOT NULL DEFAULT 'PLANNING',
                    owner_id INTEGER NOT NULL REFERENCES users(id),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS project_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                    quantity INTEGER NOT NULL,
                    UNIQUE (project_id, item_id)
                );

                CREATE TABLE IF NOT EXISTS activity_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    inventory_id INTEGER NOT NULL REFERENCES inventories(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL,
                    action TEXT NOT NULL,
                    item_id INTEGER,
                    project_id INTEGER,
                    detail TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_items_inventory ON items(inventory_id);
                CREATE INDEX IF NOT EXISTS idx_projects_inventory ON projects(inventory_id);
                CREATE INDEX IF NOT EXISTS idx_project_items_project ON project_items(project_id);
                CREATE INDEX IF NOT EXISTS idx_activity_inventory ON activity_log(inventory_id, id);
                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Users & sessions ──────────────────────────────────────────────

    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        salt: &str,
        is_super_admin: bool,
    ) -> Result<User> {
        let taken: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .context("Failed to check username")?;
        if taken {
            return Err(StoreError::UsernameTaken(username.to_string()));
        }
        self.conn
            .execute(
                "INSERT INTO users (username, password_hash, salt, is_super_admin, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![username, password_hash, salt, is_super_admin, now()],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?
            .ok_or_else(|| StoreError::UserNotFound(username.to_string()))
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, is_super_admin, created_at FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        is_super_admin: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to query user")?;
        Ok(user)
    }

    /// Stored credentials for a username: (user_id, password_hash, salt).
    pub fn credentials_for(&self, username: &str) -> Result<Option<(i64, String, String)>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, password_hash, salt FROM users WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .context("Failed to query credentials")?;
        Ok(row)
    }

    pub fn create_session(&self, token: &str, user_id: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![token, user_id, now()],
            )
            .context("Failed to insert session")?;
        Ok(())
    }

    pub fn user_for_token(&self, token: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT u.id, u.username, u.is_super_admin, u.created_at
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1",
                params![token],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        is_super_admin: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to query session")?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, username, is_super_admin, created_at FROM users ORDER BY id")
            .context("Failed to prepare list_users")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    is_super_admin: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .context("Failed to query users")?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row.context("Failed to read user row")?);
        }
        Ok(users)
    }

    pub fn promote_user(&self, id: i64) -> Result<User> {
        let count = self
            .conn
            .execute(
                "UPDATE users SET is_super_admin = 1 WHERE id = ?1",
                params![id],
            )
            .context("Failed to promote user")?;
        if count == 0 {
            return Err(StoreError::UserNotFound(id.to_string()));
        }
        self.get_user(id)?
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))
    }

    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .context("Failed to delete user")?;
        Ok(count > 0)
    }

    // ── Inventories & membership ──────────────────────────────────────

    /// Create an inventory and make the creator its admin, atomically.
    pub fn create_inventory(&self, name: &str, creator_id: i64) -> Result<Inventory> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO inventories (name, created_at) VALUES (?1, ?2)",
            params![name, now()],
        )
        .context("Failed to insert inventory")?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO memberships (inventory_id, user_id, role) VALUES (?1, ?2, 'admin')",
            params![id, creator_id],
        )
        .context("Failed to insert creator membership")?;
        tx.commit().context("Failed to commit inventory create")?;
        self.get_inventory(id)?
            .ok_or(StoreError::InventoryNotFound { id })
    }

    pub fn get_inventory(&self, id: i64) -> Result<Option<Inventory>> {
        let inv = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM inventories WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Inventory {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to query inventory")?;
        Ok(inv)
    }

    pub fn inventories_for_user(&self, user_id: i64) -> Result<Vec<Inventory>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT i.id, i.name, i.created_at
                 FROM inventories i JOIN memberships m ON m.inventory_id = i.id
                 WHERE m.user_id = ?1 ORDER BY i.id",
            )
            .context("Failed to prepare inventories_for_user")?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(Inventory {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .context("Failed to query inventories")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("Failed to read inventory row")?);
        }
        Ok(out)
    }

    pub fn list_all_inventories(&self) -> Result<Vec<Inventory>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM inventories ORDER BY id")
            .context("Failed to prepare list_all_inventories")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Inventory {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .context("Failed to query inventories")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("Failed to read inventory row")?);
        }
        Ok(out)
    }

    pub fn membership_role(&self, inventory_id: i64, user_id: i64) -> Result<Option<Role>> {
        let role: Option<String> = self
            .conn
            .query_row(
                "SELECT role FROM memberships WHERE inventory_id = ?1 AND user_id = ?2",
                params![inventory_id, user_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query membership")?;
        match role {
            Some(r) => Ok(Some(
                Role::from_str(&r).map_err(|e| StoreError::Database(anyhow::anyhow!(e)))?,
            )),
            None => Ok(None),
        }
    }

    pub fn list_members(&self, inventory_id: i64) -> Result<Vec<Member>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT m.user_id, u.username, m.role
                 FROM memberships m JOIN users u ON u.id = m.user_id
                 WHERE m.inventory_id = ?1 ORDER BY u.username",
            )
            .context("Failed to prepare list_members")?;
        let rows = stmt
            .query_map(params![inventory_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("Failed to query members")?;
        let mut members = Vec::new();
        for row in rows {
            let (user_id, username, role) = row.context("Failed to read member row")?;
            members.push(Member {
                user_id,
                username,
                role: Role::from_str(&role).map_err(|e| StoreError::Database(anyhow::anyhow!(e)))?,
            });
        }
        Ok(members)
    }

    /// Add a user to an inventory by username, with the default `user` role.
    pub fn add_member(&self, inventory_id: i64, username: &str) -> Result<Member> {
        let user_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up user")?;
        let user_id = user_id.ok_or_else(|| StoreError::UserNotFound(username.to_string()))?;

        let already: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM memberships WHERE inventory_id = ?1 AND user_id = ?2",
                params![inventory_id, user_id],
                |row| row.get(0),
            )
            .context("Failed to check membership")?;
        if already {
            return Err(StoreError::Validation(format!(
                "'{}' is already a member",
                username
            )));
        }

        self.conn
            .execute(
                "INSERT INTO memberships (inventory_id, user_id, role) VALUES (?1, ?2, 'user')",
                params![inventory_id, user_id],
            )
            .context("Failed to insert membership")?;
        Ok(Member {
            user_id,
            username: username.to_string(),
            role: Role::User,
        })
    }

    pub fn update_member_role(
        &self,
        inventory_id: i64,
        user_id: i64,
        role: Role,
    ) -> Result<Member> {
        let count = self
            .conn
            .execute(
                "UPDATE memberships SET role = ?1 WHERE inventory_id = ?2 AND user_id = ?3",
                params![role.as_str(), inventory_id, user_id],
            )
            .context("Failed to update member role")?;
        if count == 0 {
            return Err(StoreError::UserNotFound(user_id.to_string()));
        }
        let username: String = self
            .conn
            .query_row(
                "SELECT username FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .context("Failed to read username")?;
        Ok(Member {
            user_id,
            username,
            role,
        })
    }

    pub fn remove_member(&self, inventory_id: i64, user_id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM memberships WHERE inventory_id = ?1 AND user_id = ?2",
                params![inventory_id, user_id],
            )
            .context("Failed to remove member")?;
        Ok(count > 0)
    }

    // ── Items ─────────────────────────────────────────────────────────

    pub fn create_item(&self, inventory_id: i64, actor_id: i64, new: &ItemCreate) -> Result<Item> {
        if new.name.trim().is_empty() {
            return Err(StoreError::Validation("Item name must not be empty".into()));
        }
        let stock = new.stock.unwrap_or(0);
        let min_stock = new.min_stock.unwrap_or(0);
        if stock < 0 || min_stock < 0 {
            return Err(StoreError::Validation(
                "stock and min_stock must be non-negative".into(),
            ));
        }
        let attachments = serde_json::to_string(new.attachments.as_deref().unwrap_or(&[]))
            .context("Failed to encode attachments")?;
        let ts = now();

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO items (inventory_id, name, category, description, stock, min_stock,
                                location, image_url, manufacturer_part_number, attachments,
                                qr_code_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                inventory_id,
                new.name,
                new.category.as_deref().unwrap_or("Misc"),
                new.description,
                stock,
                min_stock,
                new.location,
                new.image_url,
                new.manufacturer_part_number,
                attachments,
                new.qr_code_url,
                ts,
            ],
        )
        .context("Failed to insert item")?;
        let id = tx.last_insert_rowid();
        log_activity(
            &tx,
            inventory_id,
            actor_id,
            ActivityAction::Create,
            Some(id),
            None,
            &format!("Created item '{}' with stock {}", new.name, stock),
        )?;
        tx.commit().context("Failed to commit item create")?;
        self.get_item(inventory_id, id)?
            .ok_or(StoreError::ItemNotFound { id })
    }

    pub fn list_items(&self, inventory_id: i64) -> Result<Vec<Item>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM items WHERE inventory_id = ?1 ORDER BY id",
                ITEM_COLUMNS
            ))
            .context("Failed to prepare list_items")?;
        let rows = stmt
            .query_map(params![inventory_id], item_row)
            .context("Failed to query items")?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row.context("Failed to read item row")?.into_item()?);
        }
        Ok(items)
    }

    pub fn get_item(&self, inventory_id: i64, id: i64) -> Result<Option<Item>> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM items WHERE inventory_id = ?1 AND id = ?2",
                    ITEM_COLUMNS
                ),
                params![inventory_id, id],
                item_row,
            )
            .optional()
            .context("Failed to query item")?;
        match raw {
            Some(r) => Ok(Some(r.into_item()?)),
            None => Ok(None),
        }
    }

    /// Partial update. A `stock` field is routed through the same guarded
    /// read-validate-write as the add/remove endpoints, and the delta is
    /// logged, so the "set absolute value" path cannot dodge the invariant.
    pub fn update_item(
        &self,
        inventory_id: i64,
        id: i64,
        actor_id: i64,
        update: &ItemUpdate,
    ) -> Result<Item> {
        let current = self
            .get_item(inventory_id, id)?
            .ok_or(StoreError::ItemNotFound { id })?;

        if let Some(min) = update.min_stock {
            if min < 0 {
                return Err(StoreError::Validation("min_stock must be non-negative".into()));
            }
        }
        if let Some(ref name) = update.name {
            if name.trim().is_empty() {
                return Err(StoreError::Validation("Item name must not be empty".into()));
            }
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if let Some(target) = update.stock {
            if target < 0 {
                return Err(StoreError::Validation("stock must be non-negative".into()));
            }
            let delta = target - current.stock;
            if delta != 0 {
                apply_stock_change(
                    &tx,
                    inventory_id,
                    id,
                    delta,
                    actor_id,
                    None,
                    &format!("Set stock of '{}' to {}", current.name, target),
                )?;
            }
        }

        if let Some(ref v) = update.name {
            tx.execute("UPDATE items SET name = ?1 WHERE id = ?2", params![v, id])
                .context("Failed to update item name")?;
        }
        if let Some(ref v) = update.category {
            tx.execute("UPDATE items SET category = ?1 WHERE id = ?2", params![v, id])
                .context("Failed to update item category")?;
        }
        if let Some(ref v) = update.description {
            tx.execute(
                "UPDATE items SET description = ?1 WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update item description")?;
        }
        if let Some(v) = update.min_stock {
            tx.execute(
                "UPDATE items SET min_stock = ?1 WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update item min_stock")?;
        }
        if let Some(ref v) = update.location {
            tx.execute("UPDATE items SET location = ?1 WHERE id = ?2", params![v, id])
                .context("Failed to update item location")?;
        }
        if let Some(ref v) = update.image_url {
            tx.execute(
                "UPDATE items SET image_url = ?1 WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update item image_url")?;
        }
        if let Some(ref v) = update.manufacturer_part_number {
            tx.execute(
                "UPDATE items SET manufacturer_part_number = ?1 WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update item part number")?;
        }
        if let Some(ref v) = update.attachments {
            let encoded = serde_json::to_string(v).context("Failed to encode attachments")?;
            tx.execute(
                "UPDATE items SET attachments = ?1 WHERE id = ?2",
                params![encoded, id],
            )
            .context("Failed to update item attachments")?;
        }
        if let Some(ref v) = update.qr_code_url {
            tx.execute(
                "UPDATE items SET qr_code_url = ?1 WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update item qr_code_url")?;
        }
        tx.execute(
            "UPDATE items SET updated_at = ?1 WHERE id = ?2",
            params![now(), id],
        )
        .context("Failed to touch item updated_at")?;

        tx.commit().context("Failed to commit item update")?;
        self.get_item(inventory_id, id)?
            .ok_or(StoreError::ItemNotFound { id })
    }

    pub fn delete_item(&self, inventory_id: i64, id: i64, actor_id: i64) -> Result<bool> {
        let Some(item) = self.get_item(inventory_id, id)? else {
            return Ok(false);
        };
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "DELETE FROM items WHERE inventory_id = ?1 AND id = ?2",
            params![inventory_id, id],
        )
        .context("Failed to delete item")?;
        log_activity(
            &tx,
            inventory_id,
            actor_id,
            ActivityAction::Delete,
            Some(id),
            None,
            &format!("Deleted item '{}'", item.name),
        )?;
        tx.commit().context("Failed to commit item delete")?;
        Ok(true)
    }

    /// Direct stock adjustment: positive delta adds, negative removes.
    /// A removal that would take stock below zero is rejected outright,
    /// naming the item and the available quantity.
    pub fn adjust_stock(
        &self,
        inventory_id: i64,
        id: i64,
        delta: i64,
        actor_id: i64,
    ) -> Result<Item> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        apply_stock_change(&tx, inventory_id, id, delta, actor_id, None, "")?;
        tx.execute(
            "UPDATE items SET updated_at = ?1 WHERE id = ?2",
            params![now(), id],
        )
        .context("Failed to touch item updated_at")?;
        tx.commit().context("Failed to commit stock adjustment")?;
        self.get_item(inventory_id, id)?
            .ok_or(StoreError::ItemNotFound { id })
    }

    // ── Projects ──────────────────────────────────────────────────────

    pub fn create_project(
        &self,
        inventory_id: i64,
        owner_id: i64,
        title: &str,
        description: Option<&str>,
    ) -> Result<Project> {
        if title.trim().is_empty() {
            return Err(StoreError::Validation(
                "Project title must not be empty".into(),
            ));
        }
        let ts = now();
        self.conn
            .execute(
                "INSERT INTO projects (inventory_id, title, description, status, owner_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'PLANNING', ?4, ?5, ?5)",
                params![inventory_id, title, description, owner_id, ts],
            )
            .context("Failed to insert project")?;
        let id = self.conn.last_insert_rowid();
        self.get_project(inventory_id, id)?
            .ok_or(StoreError::ProjectNotFound { id })
    }

    pub fn list_projects(&self, inventory_id: i64) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, description, status, owner_id, created_at, updated_at
                 FROM projects WHERE inventory_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map(params![inventory_id], project_row)
            .context("Failed to query projects")?;
        let mut projects = Vec::new();
        for row in rows {
            let mut project = row.context("Failed to read project row")?.into_project()?;
            project.items = self.project_items(inventory_id, project.id)?;
            projects.push(project);
        }
        Ok(projects)
    }

    pub fn get_project(&self, inventory_id: i64, id: i64) -> Result<Option<Project>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, title, description, status, owner_id, created_at, updated_at
                 FROM projects WHERE inventory_id = ?1 AND id = ?2",
                params![inventory_id, id],
                project_row,
            )
            .optional()
            .context("Failed to query project")?;
        match raw {
            Some(r) => {
                let mut project = r.into_project()?;
                project.items = self.project_items(inventory_id, id)?;
                Ok(Some(project))
            }
            None => Ok(None),
        }
    }

    fn project_items(&self, inventory_id: i64, project_id: i64) -> Result<Vec<ProjectItem>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT pi.id, pi.project_id, pi.item_id, pi.quantity
                 FROM project_items pi WHERE pi.project_id = ?1 ORDER BY pi.id",
            )
            .context("Failed to prepare project_items")?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(ProjectItem {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    item_id: row.get(2)?,
                    quantity: row.get(3)?,
                    item: None,
                })
            })
            .context("Failed to query project items")?;
        let mut lines = Vec::new();
        for row in rows {
            let mut line = row.context("Failed to read project item row")?;
            line.item = self.get_item(inventory_id, line.item_id)?;
            lines.push(line);
        }
        Ok(lines)
    }

    /// Delete a project. Only PLANNING projects may be deleted; once stock
    /// has been committed the project is part of the ledger's history.
    pub fn delete_project(&self, inventory_id: i64, id: i64) -> Result<bool> {
        let Some(project) = self.get_project(inventory_id, id)? else {
            return Ok(false);
        };
        if project.status != ProjectStatus::Planning {
            return Err(StoreError::ProjectNotDeletable {
                status: project.status,
            });
        }
        let count = self
            .conn
            .execute(
                "DELETE FROM projects WHERE inventory_id = ?1 AND id = ?2",
                params![inventory_id, id],
            )
            .context("Failed to delete project")?;
        Ok(count > 0)
    }

    /// Add a bill-of-materials line. Pure metadata: no stock moves until
    /// activation. Rejected unless the project is PLANNING. Adding an item
    /// that is already on the project merges by summing quantities.
    pub fn add_project_item(
        &self,
        inventory_id: i64,
        project_id: i64,
        item_id: i64,
        quantity: i64,
    ) -> Result<Project> {
        if quantity <= 0 {
            return Err(StoreError::Validation("quantity must be positive".into()));
        }
        let project = self
            .get_project(inventory_id, project_id)?
            .ok_or(StoreError::ProjectNotFound { id: project_id })?;
        if !engine::can_add_items(project.status) {
            return Err(StoreError::ProjectNotPlanning {
                status: project.status,
            });
        }
        // Item must exist in the same inventory.
        self.get_item(inventory_id, item_id)?
            .ok_or(StoreError::ItemNotFound { id: item_id })?;

        self.conn
            .execute(
                "INSERT INTO project_items (project_id, item_id, quantity) VALUES (?1, ?2, ?3)
                 ON CONFLICT (project_id, item_id)
                 DO UPDATE SET quantity = quantity + excluded.quantity",
                params![project_id, item_id, quantity],
            )
            .context("Failed to insert project item")?;
        self.conn
            .execute(
                "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
                params![now(), project_id],
            )
            .context("Failed to touch project updated_at")?;
        self.get_project(inventory_id, project_id)?
            .ok_or(StoreError::ProjectNotFound { id: project_id })
    }

    /// Execute a status transition, applying its stock effect atomically.
    ///
    /// The whole operation is one SQLite transaction: status validation,
    /// per-line stock checks, deductions/returns, activity entries, and the
    /// status update all commit together or not at all. An insufficient
    /// line aborts everything and reports the offending item.
    pub fn transition_project(
        &self,
        inventory_id: i64,
        project_id: i64,
        actor_id: i64,
        attempted: ProjectStatus,
        return_items: bool,
    ) -> Result<Project> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM projects WHERE inventory_id = ?1 AND id = ?2",
                params![inventory_id, project_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read project status")?;
        let current = current.ok_or(StoreError::ProjectNotFound { id: project_id })?;
        let current = ProjectStatus::from_str(&current)
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e)))?;

        let effect = engine::transition_effect(current, attempted, return_items)?;

        let lines: Vec<(i64, i64)> = {
            let mut stmt = tx
                .prepare("SELECT item_id, quantity FROM project_items WHERE project_id = ?1")
                .context("Failed to prepare line query")?;
            let rows = stmt
                .query_map(params![project_id], |row| Ok((row.get(0)?, row.get(1)?)))
                .context("Failed to query lines")?;
            let mut lines = Vec::new();
            for row in rows {
                lines.push(row.context("Failed to read line")?);
            }
            lines
        };

        match effect {
            StockEffect::Deduct => {
                for (item_id, quantity) in &lines {
                    apply_stock_change(
                        &tx,
                        inventory_id,
                        *item_id,
                        -quantity,
                        actor_id,
                        Some(project_id),
                        &format!("Reserved {} unit(s) for project activation", quantity),
                    )?;
                }
            }
            StockEffect::Return => {
                for (item_id, quantity) in &lines {
                    apply_stock_change(
                        &tx,
                        inventory_id,
                        *item_id,
                        *quantity,
                        actor_id,
                        Some(project_id),
                        &format!("Returned {} unit(s) on project completion", quantity),
                    )?;
                }
            }
            StockEffect::None => {}
        }

        tx.execute(
            "UPDATE projects SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![attempted.as_str(), now(), project_id],
        )
        .context("Failed to update project status")?;
        log_activity(
            &tx,
            inventory_id,
            actor_id,
            ActivityAction::ProjectStatus,
            None,
            Some(project_id),
            &format!("Project moved from {} to {}", current, attempted),
        )?;

        tx.commit().context("Failed to commit transition")?;
        self.get_project(inventory_id, project_id)?
            .ok_or(StoreError::ProjectNotFound { id: project_id })
    }

    // ── Activity & stats ──────────────────────────────────────────────

    pub fn recent_activity(&self, inventory_id: i64, limit: i64) -> Result<Vec<ActivityEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT a.id, a.user_id, COALESCE(u.username, 'deleted'), a.action,
                        a.item_id, a.project_id, a.detail, a.created_at
                 FROM activity_log a LEFT JOIN users u ON u.id = a.user_id
                 WHERE a.inventory_id = ?1 ORDER BY a.id DESC LIMIT ?2",
            )
            .context("Failed to prepare recent_activity")?;
        let rows = stmt
            .query_map(params![inventory_id, limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .context("Failed to query activity")?;
        let mut entries = Vec::new();
        for row in rows {
            let (id, user_id, username, action, item_id, project_id, detail, created_at) =
                row.context("Failed to read activity row")?;
            entries.push(ActivityEntry {
                id,
                user_id,
                username,
                action: ActivityAction::from_str(&action)
                    .map_err(|e| StoreError::Database(anyhow::anyhow!(e)))?,
                item_id,
                project_id,
                detail,
                created_at,
            });
        }
        Ok(entries)
    }

    /// Items ranked by how often stock was removed from them, from the
    /// activity log. Drives the dashboard's "most used" card. The log
    /// outlives item rows, so deleted items keep their place in the
    /// ranking under a placeholder name.
    pub fn most_used_items(&self, inventory_id: i64, limit: i64) -> Result<Vec<ItemUsage>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT a.item_id, COALESCE(i.name, 'deleted item'), COUNT(*) AS uses
                 FROM activity_log a LEFT JOIN items i ON i.id = a.item_id
                 WHERE a.inventory_id = ?1 AND a.action = 'REMOVE_STOCK'
                 GROUP BY a.item_id ORDER BY uses DESC, a.item_id LIMIT ?2",
            )
            .context("Failed to prepare most_used_items")?;
        let rows = stmt
            .query_map(params![inventory_id, limit], |row| {
                Ok(ItemUsage {
                    item_id: row.get(0)?,
                    name: row.get(1)?,
                    times_used: row.get(2)?,
                })
            })
            .context("Failed to query most used items")?;
        let mut usage = Vec::new();
        for row in rows {
            usage.push(row.context("Failed to read usage row")?);
        }
        Ok(usage)
    }

    pub fn dashboard_stats(&self, inventory_id: i64) -> Result<DashboardStats> {
        let (total_items, total_stock): (i64, i64) = self
            .conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(stock), 0) FROM items WHERE inventory_id = ?1",
                params![inventory_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("Failed to query item totals")?;
        let low_stock = self
            .list_items(inventory_id)?
            .into_iter()
            .filter(|i| i.stock <= i.min_stock)
            .collect();
        Ok(DashboardStats {
            total_items,
            total_stock,
            low_stock,
            recent_activity: self.recent_activity(inventory_id, 10)?,
            most_used: self.most_used_items(inventory_id, 5)?,
        })
    }

    pub fn global_stats(&self) -> Result<GlobalStats> {
        let total_users: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .context("Failed to count users")?;
        let total_inventories: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM inventories", [], |row| row.get(0))
            .context("Failed to count inventories")?;
        let total_items: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
            .context("Failed to count items")?;
        Ok(GlobalStats {
            total_users,
            total_inventories,
            total_items,
        })
    }
}

// ── Row mapping ───────────────────────────────────────────────────────

const ITEM_COLUMNS: &str = "id, name, category, description, stock, min_stock, location, \
                            image_url, manufacturer_part_number, attachments, qr_code_url, \
                            created_at, updated_at";

struct ItemRow {
    id: i64,
    name: String,
    category: String,
    description: Option<String>,
    stock: i64,
    min_stock: i64,
    location: Option<String>,
    image_url: Option<String>,
    manufacturer_part_number: Option<String>,
    attachments: String,
    qr_code_url: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ItemRow {
    fn into_item(self) -> Result<Item> {
        let attachments: Vec<String> = serde_json::from_str(&self.attachments)
            .context("Failed to decode attachments column")?;
        Ok(Item {
            id: self.id,
            name: self.name,
            category: self.category,
            description: self.description,
            stock: self.stock,
            min_stock: self.min_stock,
            location: self.location,
            image_url: self.image_url,
            manufacturer_part_number: self.manufacturer_part_number,
            attachments,
            qr_code_url: self.qr_code_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        stock: row.get(4)?,
        min_stock: row.get(5)?,
        location: row.get(6)?,
        image_url: row.get(7)?,
        manufacturer_part_number: row.get(8)?,
        attachments: row.get(9)?,
        qr_code_url: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

struct ProjectRow {
    id: i64,
    title: String,
    description: Option<String>,
    status: String,
    owner_id: i64,
    created_at: String,
    updated_at: String,
}

impl ProjectRow {
    fn into_project(self) -> Result<Project> {
        Ok(Project {
            id: self.id,
            title: self.title,
            description: self.description,
            status: ProjectStatus::from_str(&self.status)
                .map_err(|e| StoreError::Database(anyhow::anyhow!(e)))?,
            owner_id: self.owner_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            items: Vec::new(),
        })
    }
}

fn project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        owner_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// The single guarded stock mutation. Reads current stock, validates the
/// non-negativity invariant, writes the new value, and appends the matching
/// activity entry, all on the caller's connection (usually a transaction).
/// Every stock path in the crate funnels through here.
fn apply_stock_change(
    conn: &Connection,
    inventory_id: i64,
    item_id: i64,
    delta: i64,
    actor_id: i64,
    project_id: Option<i64>,
    detail: &str,
) -> Result<()> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT name, stock FROM items WHERE inventory_id = ?1 AND id = ?2",
            params![inventory_id, item_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .context("Failed to read item stock")?;
    let (name, stock) = row.ok_or(StoreError::ItemNotFound { id: item_id })?;

    let new_stock = stock.checked_add(delta).ok_or_else(|| {
        StoreError::Validation(format!("Stock adjustment for '{}' overflows", name))
    })?;
    if new_stock < 0 {
        return Err(StoreError::InsufficientStock {
            item_id,
            name,
            requested: -delta,
            available: stock,
        });
    }
    conn.execute(
        "UPDATE items SET stock = ?1 WHERE id = ?2",
        params![new_stock, item_id],
    )
    .context("Failed to write item stock")?;

    let action = if delta >= 0 {
        ActivityAction::AddStock
    } else {
        ActivityAction::RemoveStock
    };
    let detail = if detail.is_empty() {
        format!(
            "{} {} unit(s) of '{}' ({} -> {})",
            if delta >= 0 { "Added" } else { "Removed" },
            delta.abs(),
            name,
            stock,
            new_stock
        )
    } else {
        detail.to_string()
    };
    log_activity(
        conn,
        inventory_id,
        actor_id,
        action,
        Some(item_id),
        project_id,
        &detail,
    )
}

/// Append one immutable activity entry. There is deliberately no update or
/// delete counterpart anywhere in the crate.
fn log_activity(
    conn: &Connection,
    inventory_id: i64,
    user_id: i64,
    action: ActivityAction,
    item_id: Option<i64>,
    project_id: Option<i64>,
    detail: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO activity_log (inventory_id, user_id, action, item_id, project_id, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            inventory_id,
            user_id,
            action.as_str(),
            item_id,
            project_id,
            detail,
            now()
        ],
    )
    .context("Failed to append activity entry")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory DB with one user and one inventory. Returns (db, user_id, inventory_id).
    fn seed() -> (InventoryDb, i64, i64) {
        let db = InventoryDb::new_in_memory().unwrap();
        let user = db.create_user("maker", "hash", "salt", false).unwrap();
        let inv = db.create_inventory("workbench", user.id).unwrap();
        (db, user.id, inv.id)
    }

    fn item_with_stock(db: &InventoryDb, inv: i64, actor: i64, name: &str, stock: i64) -> Item {
        db.create_item(
            inv,
            actor,
            &ItemCreate {
                name: name.to_string(),
                stock: Some(stock),
                min_stock: Some(5),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn create_inventory_makes_creator_admin() {
        let (db, user, inv) = seed();
        assert_eq!(db.membership_role(inv, user).unwrap(), Some(Role::Admin));
        let members = db.list_members(inv).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].username, "maker");
    }

    #[test]
    fn adjust_stock_rejects_below_zero() {
        let (db, user, inv) = seed();
        let item = item_with_stock(&db, inv, user, "555 timer", 3);

        let err = db.adjust_stock(inv, item.id, -4, user).unwrap_err();
        match err {
            StoreError::InsufficientStock {
                requested,
                available,
                ref name,
                ..
            } => {
                assert_eq!(requested, 4);
                assert_eq!(available, 3);
                assert_eq!(name, "555 timer");
            }
            other => panic!("Expected InsufficientStock, got {:?}", other),
        }
        // Nothing changed.
        assert_eq!(db.get_item(inv, item.id).unwrap().unwrap().stock, 3);
    }

    #[test]
    fn adjust_stock_add_and_remove() {
        let (db, user, inv) = seed();
        let item = item_with_stock(&db, inv, user, "M3 screw", 10);
        assert_eq!(db.adjust_stock(inv, item.id, 5, user).unwrap().stock, 15);
        assert_eq!(db.adjust_stock(inv, item.id, -15, user).unwrap().stock, 0);
    }

    #[test]
    fn adjust_stock_rejects_overflowing_addition() {
        let (db, user, inv) = seed();
        let item = item_with_stock(&db, inv, user, "bulk wire", 10);

        let err = db.adjust_stock(inv, item.id, i64::MAX, user).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(db.get_item(inv, item.id).unwrap().unwrap().stock, 10);
    }

    #[tokio::test]
    async fn concurrent_removals_never_drive_stock_negative() {
        let (db, user, inv) = seed();
        let item = item_with_stock(&db, inv, user, "contested", 10);
        let item_id = item.id;
        let handle = DbHandle::new(db);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .call(move |db| db.adjust_stock(inv, item_id, -3, user))
                    .await
            }));
        }

        let mut successes = 0;
        let mut rejections = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => successes += 1,
                Err(StoreError::InsufficientStock { .. }) => rejections += 1,
                Err(other) => panic!("Unexpected error: {:?}", other),
            }
        }
        // 10 units at 3 per removal: exactly three can win, whatever the
        // interleaving.
        assert_eq!(successes, 3);
        assert_eq!(rejections, 5);
        let stock = handle
            .call(move |db| Ok(db.get_item(inv, item_id)?.unwrap().stock))
            .await
            .unwrap();
        assert_eq!(stock, 1);
    }

    #[test]
    fn update_item_stock_goes_through_the_guard() {
        let (db, user, inv) = seed();
        let item = item_with_stock(&db, inv, user, "OLED display", 4);

        let err = db
            .update_item(
                inv,
                item.id,
                user,
                &ItemUpdate {
                    stock: Some(-1),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let updated = db
            .update_item(
                inv,
                item.id,
                user,
                &ItemUpdate {
                    stock: Some(9),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.stock, 9);
        // The delta shows up in the activity log like any other adjustment.
        let log = db.recent_activity(inv, 10).unwrap();
        assert!(log.iter().any(|e| e.action == ActivityAction::AddStock
            && e.item_id == Some(item.id)));
    }

    #[test]
    fn activation_and_return_round_trip() {
        // Item A: stock=10, min_stock=5; project takes quantity 4.
        let (db, user, inv) = seed();
        let a = item_with_stock(&db, inv, user, "A", 10);
        let p = db.create_project(inv, user, "LED cube", None).unwrap();
        db.add_project_item(inv, p.id, a.id, 4).unwrap();

        // Adding while PLANNING deducts nothing.
        assert_eq!(db.get_item(inv, a.id).unwrap().unwrap().stock, 10);

        let p = db
            .transition_project(inv, p.id, user, ProjectStatus::Active, false)
            .unwrap();
        assert_eq!(p.status, ProjectStatus::Active);
        assert_eq!(db.get_item(inv, a.id).unwrap().unwrap().stock, 6);

        let p = db
            .transition_project(inv, p.id, user, ProjectStatus::Completed, true)
            .unwrap();
        assert_eq!(p.status, ProjectStatus::Completed);
        assert_eq!(db.get_item(inv, a.id).unwrap().unwrap().stock, 10);
    }

    #[test]
    fn complete_without_return_keeps_deduction() {
        let (db, user, inv) = seed();
        let a = item_with_stock(&db, inv, user, "A", 10);
        let p = db.create_project(inv, user, "robot arm", None).unwrap();
        db.add_project_item(inv, p.id, a.id, 4).unwrap();
        db.transition_project(inv, p.id, user, ProjectStatus::Active, false)
            .unwrap();
        db.transition_project(inv, p.id, user, ProjectStatus::Completed, false)
            .unwrap();
        assert_eq!(db.get_item(inv, a.id).unwrap().unwrap().stock, 6);
    }

    #[test]
    fn insufficient_stock_blocks_activation_atomically() {
        // Item B: stock=2, project wants 5. Activation fails, stock unchanged.
        let (db, user, inv) = seed();
        let b = item_with_stock(&db, inv, user, "B", 2);
        let p = db.create_project(inv, user, "quadcopter", None).unwrap();
        db.add_project_item(inv, p.id, b.id, 5).unwrap();

        let err = db
            .transition_project(inv, p.id, user, ProjectStatus::Active, false)
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { .. }));
        assert_eq!(db.get_item(inv, b.id).unwrap().unwrap().stock, 2);
        // Project still PLANNING.
        assert_eq!(
            db.get_project(inv, p.id).unwrap().unwrap().status,
            ProjectStatus::Planning
        );
    }

    #[test]
    fn activation_with_one_short_line_rolls_back_all_lines() {
        let (db, user, inv) = seed();
        let ok = item_with_stock(&db, inv, user, "plenty", 100);
        let short = item_with_stock(&db, inv, user, "scarce", 1);
        let p = db.create_project(inv, user, "synth", None).unwrap();
        db.add_project_item(inv, p.id, ok.id, 10).unwrap();
        db.add_project_item(inv, p.id, short.id, 2).unwrap();

        let err = db
            .transition_project(inv, p.id, user, ProjectStatus::Active, false)
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { .. }));
        // The sufficient line must NOT have been deducted.
        assert_eq!(db.get_item(inv, ok.id).unwrap().unwrap().stock, 100);
        assert_eq!(db.get_item(inv, short.id).unwrap().unwrap().stock, 1);
    }

    #[test]
    fn completed_is_terminal() {
        let (db, user, inv) = seed();
        let a = item_with_stock(&db, inv, user, "A", 10);
        let p = db.create_project(inv, user, "clock", None).unwrap();
        db.add_project_item(inv, p.id, a.id, 1).unwrap();
        db.transition_project(inv, p.id, user, ProjectStatus::Active, false)
            .unwrap();
        db.transition_project(inv, p.id, user, ProjectStatus::Completed, false)
            .unwrap();

        for target in [
            ProjectStatus::Planning,
            ProjectStatus::Active,
            ProjectStatus::Completed,
        ] {
            let err = db
                .transition_project(inv, p.id, user, target, false)
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidTransition { .. }));
        }
        assert_eq!(db.get_item(inv, a.id).unwrap().unwrap().stock, 9);
    }

    #[test]
    fn add_item_to_active_project_is_rejected() {
        let (db, user, inv) = seed();
        let a = item_with_stock(&db, inv, user, "A", 10);
        let p = db.create_project(inv, user, "printer", None).unwrap();
        db.add_project_item(inv, p.id, a.id, 1).unwrap();
        db.transition_project(inv, p.id, user, ProjectStatus::Active, false)
            .unwrap();

        let err = db.add_project_item(inv, p.id, a.id, 1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::ProjectNotPlanning {
                status: ProjectStatus::Active
            }
        ));
    }

    #[test]
    fn add_project_item_merges_duplicate_lines() {
        let (db, user, inv) = seed();
        let a = item_with_stock(&db, inv, user, "A", 10);
        let p = db.create_project(inv, user, "badge", None).unwrap();
        db.add_project_item(inv, p.id, a.id, 2).unwrap();
        let p = db.add_project_item(inv, p.id, a.id, 3).unwrap();
        assert_eq!(p.items.len(), 1);
        assert_eq!(p.items[0].quantity, 5);
    }

    #[test]
    fn delete_project_only_while_planning() {
        let (db, user, inv) = seed();
        let a = item_with_stock(&db, inv, user, "A", 10);
        let p = db.create_project(inv, user, "keeb", None).unwrap();
        db.add_project_item(inv, p.id, a.id, 1).unwrap();
        db.transition_project(inv, p.id, user, ProjectStatus::Active, false)
            .unwrap();
        let err = db.delete_project(inv, p.id).unwrap_err();
        assert!(matches!(err, StoreError::ProjectNotDeletable { .. }));

        let q = db.create_project(inv, user, "scratch", None).unwrap();
        assert!(db.delete_project(inv, q.id).unwrap());
    }

    #[test]
    fn tenant_scoping_hides_other_inventories() {
        let (db, user, inv) = seed();
        let other_user = db.create_user("guest", "hash", "salt", false).unwrap();
        let other_inv = db.create_inventory("other bench", other_user.id).unwrap();
        let item = item_with_stock(&db, inv, user, "secret part", 1);

        // Looking the item up through the other inventory finds nothing.
        assert!(db.get_item(other_inv.id, item.id).unwrap().is_none());
        assert!(
            db.adjust_stock(other_inv.id, item.id, 1, other_user.id)
                .is_err()
        );
        assert!(db.list_items(other_inv.id).unwrap().is_empty());
    }

    #[test]
    fn activity_log_records_all_action_kinds() {
        let (db, user, inv) = seed();
        let a = item_with_stock(&db, inv, user, "A", 10);
        db.adjust_stock(inv, a.id, 2, user).unwrap();
        db.adjust_stock(inv, a.id, -1, user).unwrap();
        let p = db.create_project(inv, user, "amp", None).unwrap();
        db.add_project_item(inv, p.id, a.id, 1).unwrap();
        db.transition_project(inv, p.id, user, ProjectStatus::Active, false)
            .unwrap();
        db.delete_item(inv, a.id, user).unwrap();

        let log = db.recent_activity(inv, 50).unwrap();
        for action in [
            ActivityAction::Create,
            ActivityAction::AddStock,
            ActivityAction::RemoveStock,
            ActivityAction::ProjectStatus,
            ActivityAction::Delete,
        ] {
            assert!(
                log.iter().any(|e| e.action == action),
                "missing {} in log",
                action
            );
        }
    }

    #[test]
    fn most_used_ranks_by_remove_count() {
        let (db, user, inv) = seed();
        let a = item_with_stock(&db, inv, user, "popular", 100);
        let b = item_with_stock(&db, inv, user, "rare", 100);
        db.adjust_stock(inv, a.id, -1, user).unwrap();
        db.adjust_stock(inv, a.id, -1, user).unwrap();
        db.adjust_stock(inv, b.id, -1, user).unwrap();

        let usage = db.most_used_items(inv, 5).unwrap();
        assert_eq!(usage[0].name, "popular");
        assert_eq!(usage[0].times_used, 2);
        assert_eq!(usage[1].name, "rare");
    }

    #[test]
    fn most_used_keeps_deleted_items_in_the_ranking() {
        let (db, user, inv) = seed();
        let a = item_with_stock(&db, inv, user, "popular", 100);
        db.adjust_stock(inv, a.id, -1, user).unwrap();
        db.adjust_stock(inv, a.id, -1, user).unwrap();
        db.delete_item(inv, a.id, user).unwrap();

        let usage = db.most_used_items(inv, 5).unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].item_id, a.id);
        assert_eq!(usage[0].name, "deleted item");
        assert_eq!(usage[0].times_used, 2);
    }

    #[test]
    fn dashboard_stats_totals_and_low_stock() {
        let (db, user, inv) = seed();
        // min_stock is 5 in the helper; 3 <= 5 so "low" is low on stock.
        item_with_stock(&db, inv, user, "low", 3);
        item_with_stock(&db, inv, user, "fine", 50);

        let stats = db.dashboard_stats(inv).unwrap();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.total_stock, 53);
        assert_eq!(stats.low_stock.len(), 1);
        assert_eq!(stats.low_stock[0].name, "low");
    }

    #[test]
    fn username_must_be_unique() {
        let (db, _, _) = seed();
        let err = db.create_user("maker", "h", "s", false).unwrap_err();
        assert!(matches!(err, StoreError::UsernameTaken(_)));
    }

    #[test]
    fn sessions_resolve_users() {
        let (db, user, _) = seed();
        db.create_session("tok-123", user).unwrap();
        let resolved = db.user_for_token("tok-123").unwrap().unwrap();
        assert_eq!(resolved.username, "maker");
        assert!(db.user_for_token("tok-bogus").unwrap().is_none());
    }

    #[test]
    fn member_management_round_trip() {
        let (db, _admin, inv) = seed();
        db.create_user("helper", "h", "s", false).unwrap();

        let member = db.add_member(inv, "helper").unwrap();
        assert_eq!(member.role, Role::User);

        let err = db.add_member(inv, "helper").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let err = db.add_member(inv, "nobody").unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(_)));

        let member = db
            .update_member_role(inv, member.user_id, Role::Admin)
            .unwrap();
        assert_eq!(member.role, Role::Admin);

        assert!(db.remove_member(inv, member.user_id).unwrap());
        assert!(db.membership_role(inv, member.user_id).unwrap().is_none());
    }
}
