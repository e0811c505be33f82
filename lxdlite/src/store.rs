//! Per-container metadata persistence.
//!
//! Pure database access layer: registered containers, their OS release, and
//! the kernel version captured at the last VM launch. No in-memory cache;
//! queries go directly to sqlite.

use crate::types::{ContainerId, OsRelease, VmType};
use chrono::Utc;
use lxdlite_shared::{LxdliteError, LxdliteResult};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

const LAST_LAUNCH_KERNEL_VERSION_KEY: &str = "last_launch_kernel_version";

/// Sqlite-backed store for container metadata.
pub struct ContainerStore {
    conn: Mutex<Connection>,
}

impl ContainerStore {
    /// Open (creating if needed) a store at the given path.
    pub fn open(path: &Path) -> LxdliteResult<Self> {
        let conn = Connection::open(path).map_err(|e| {
            LxdliteError::Storage(format!("failed to open store at {}: {}", path.display(), e))
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store. Used by tests and by embedders that do not
    /// want persistence.
    pub fn in_memory() -> LxdliteResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LxdliteError::Storage(format!("failed to open in-memory store: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> LxdliteResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS containers (
                vm_name        TEXT NOT NULL,
                container_name TEXT NOT NULL,
                vm_type        TEXT NOT NULL,
                os_release     TEXT,
                created_at     TEXT NOT NULL,
                PRIMARY KEY (vm_name, container_name)
            );
            CREATE TABLE IF NOT EXISTS settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(|e| LxdliteError::Storage(format!("failed to initialize schema: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ========================================================================
    // Container registration
    // ========================================================================

    /// Register a container. Idempotent.
    pub fn register(&self, id: &ContainerId) -> LxdliteResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO containers (vm_name, container_name, vm_type, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id.vm_name,
                id.container_name,
                id.vm_type.as_str(),
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| LxdliteError::Storage(format!("failed to register {}: {}", id, e)))?;

        tracing::debug!(container = %id, "Registered container");
        Ok(())
    }

    /// Drop a container's registration and metadata. Idempotent.
    pub fn unregister(&self, id: &ContainerId) -> LxdliteResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM containers WHERE vm_name = ?1 AND container_name = ?2",
            params![id.vm_name, id.container_name],
        )
        .map_err(|e| LxdliteError::Storage(format!("failed to unregister {}: {}", id, e)))?;

        tracing::debug!(container = %id, "Unregistered container");
        Ok(())
    }

    /// Drop every container registered on the named VM. Used by uninstall.
    pub fn unregister_vm(&self, vm_name: &str) -> LxdliteResult<usize> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM containers WHERE vm_name = ?1", params![vm_name])
            .map_err(|e| {
                LxdliteError::Storage(format!("failed to unregister VM {}: {}", vm_name, e))
            })?;

        tracing::debug!(vm_name, removed, "Unregistered containers for VM");
        Ok(removed)
    }

    pub fn is_registered(&self, id: &ContainerId) -> LxdliteResult<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM containers WHERE vm_name = ?1 AND container_name = ?2",
                params![id.vm_name, id.container_name],
                |row| row.get(0),
            )
            .map_err(|e| LxdliteError::Storage(format!("failed to query {}: {}", id, e)))?;
        Ok(count > 0)
    }

    /// All registered containers, oldest first.
    pub fn registered_containers(&self) -> LxdliteResult<Vec<ContainerId>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT vm_name, container_name, vm_type FROM containers ORDER BY created_at ASC",
            )
            .map_err(|e| LxdliteError::Storage(format!("failed to list containers: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let vm_name: String = row.get(0)?;
                let container_name: String = row.get(1)?;
                let vm_type: String = row.get(2)?;
                Ok((vm_name, container_name, vm_type))
            })
            .map_err(|e| LxdliteError::Storage(format!("failed to list containers: {}", e)))?;

        let mut containers = Vec::new();
        for row in rows {
            let (vm_name, container_name, vm_type) =
                row.map_err(|e| LxdliteError::Storage(format!("failed to read row: {}", e)))?;
            containers.push(ContainerId::with_vm_type(
                vm_name,
                container_name,
                vm_type.parse().unwrap_or(VmType::Unknown),
            ));
        }
        Ok(containers)
    }

    // ========================================================================
    // OS release
    // ========================================================================

    /// Persist the OS release for a container, registering it if needed.
    pub fn set_os_release(&self, id: &ContainerId, release: &OsRelease) -> LxdliteResult<()> {
        let json = serde_json::to_string(release)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO containers (vm_name, container_name, vm_type, os_release, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (vm_name, container_name) DO UPDATE SET os_release = ?4",
            params![
                id.vm_name,
                id.container_name,
                id.vm_type.as_str(),
                json,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| {
            LxdliteError::Storage(format!("failed to store os release for {}: {}", id, e))
        })?;
        Ok(())
    }

    pub fn os_release(&self, id: &ContainerId) -> LxdliteResult<Option<OsRelease>> {
        let conn = self.conn.lock();
        let json: Option<Option<String>> = conn
            .query_row(
                "SELECT os_release FROM containers WHERE vm_name = ?1 AND container_name = ?2",
                params![id.vm_name, id.container_name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| {
                LxdliteError::Storage(format!("failed to read os release for {}: {}", id, e))
            })?;

        match json.flatten() {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Kernel version (enterprise reporting)
    // ========================================================================

    /// Store the kernel version captured after a VM launch; `None` clears it.
    pub fn set_kernel_version(&self, version: Option<&str>) -> LxdliteResult<()> {
        let conn = self.conn.lock();
        match version {
            Some(version) => {
                conn.execute(
                    "INSERT INTO settings (key, value) VALUES (?1, ?2)
                     ON CONFLICT (key) DO UPDATE SET value = ?2",
                    params![LAST_LAUNCH_KERNEL_VERSION_KEY, version],
                )
                .map_err(|e| {
                    LxdliteError::Storage(format!("failed to store kernel version: {}", e))
                })?;
            }
            None => {
                conn.execute(
                    "DELETE FROM settings WHERE key = ?1",
                    params![LAST_LAUNCH_KERNEL_VERSION_KEY],
                )
                .map_err(|e| {
                    LxdliteError::Storage(format!("failed to clear kernel version: {}", e))
                })?;
            }
        }
        Ok(())
    }

    pub fn kernel_version(&self) -> LxdliteResult<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![LAST_LAUNCH_KERNEL_VERSION_KEY],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| LxdliteError::Storage(format!("failed to read kernel version: {}", e)))
    }
}

impl std::fmt::Debug for ContainerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerStore").finish()
    }
}
