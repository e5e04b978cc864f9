use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{Error, Result};

pub type TenantId = i64;

/// The main site; its tables carry the bare prefix (`wp_posts`, not `wp_1_posts`).
pub const MAIN_TENANT: TenantId = 1;

const PUBLISHED: &str = "publish";

/// What the store supports, resolved once when it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub multi_tenant: bool,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub post_type: String,
}

/// A handle on one tenant's tables. Every store call takes one explicitly;
/// the `tenant` tracing span stays entered until the handle is dropped.
pub struct TenantScope {
    tenant: Option<TenantId>,
    prefix: String,
    _span: tracing::span::EnteredSpan,
}

impl TenantScope {
    fn enter(base_prefix: &str, caps: Capabilities, tenant: Option<TenantId>) -> Result<Self> {
        let prefix = match tenant {
            Some(_) if !caps.multi_tenant => return Err(Error::MultiTenantUnsupported),
            Some(id) if id <= 0 => return Err(Error::InvalidTenant(Some(id))),
            Some(id) if id != MAIN_TENANT => format!("{}{}_", base_prefix, id),
            _ => base_prefix.to_string(),
        };
        let span = tracing::info_span!("tenant", id = tenant.unwrap_or(MAIN_TENANT)).entered();
        debug!(prefix = %prefix, "entered tenant scope");
        Ok(TenantScope {
            tenant,
            prefix,
            _span: span,
        })
    }

    pub fn tenant(&self) -> Option<TenantId> {
        self.tenant
    }

    pub fn posts_table(&self) -> String {
        format!("{}posts", self.prefix)
    }

    pub fn options_table(&self) -> String {
        format!("{}options", self.prefix)
    }
}

/// The operations the block commands need from the document store.
pub trait DocumentStore {
    fn capabilities(&self) -> Capabilities;

    fn table_prefix(&self) -> &str;

    fn is_registered_post_type(&self, post_type: &str) -> bool;

    /// All tenant ids, in ascending order. Only meaningful when multi-tenant.
    fn tenant_ids(&self) -> Result<Vec<TenantId>>;

    /// Published documents of `post_type` whose content contains `needle` literally.
    fn find_containing(
        &self,
        scope: &TenantScope,
        post_type: &str,
        needle: &str,
    ) -> Result<Vec<Document>>;

    fn count_published(&self, scope: &TenantScope, post_type: &str) -> Result<usize>;

    fn published_page(
        &self,
        scope: &TenantScope,
        post_type: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Document>>;

    fn update_content(&self, scope: &TenantScope, id: i64, content: &str) -> Result<()>;

    /// Base URL of the tenant's site, without a trailing slash.
    fn home_url(&self, scope: &TenantScope) -> Result<String>;

    fn enter(&self, tenant: Option<TenantId>) -> Result<TenantScope> {
        TenantScope::enter(self.table_prefix(), self.capabilities(), tenant)
    }
}

pub struct SqliteStore {
    conn: Connection,
    prefix: String,
    caps: Capabilities,
    post_types: Vec<String>,
    fallback_home: String,
}

pub fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

impl SqliteStore {
    pub fn open(settings: &Settings) -> Result<Self> {
        let conn = connect(&settings.db_path)?;
        Self::from_connection(conn, settings)
    }

    pub fn from_connection(conn: Connection, settings: &Settings) -> Result<Self> {
        let prefix = settings.table_prefix.clone();
        if prefix.is_empty()
            || !prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::InvalidTablePrefix(prefix));
        }

        let multi_tenant = match settings.multi_tenant {
            Some(flag) => flag,
            None => table_exists(&conn, &format!("{}blogs", prefix))?,
        };
        info!(multi_tenant, prefix = %prefix, "store opened");

        Ok(SqliteStore {
            conn,
            prefix,
            caps: Capabilities { multi_tenant },
            post_types: settings.post_types.clone(),
            fallback_home: settings.home_url.trim_end_matches('/').to_string(),
        })
    }
}

impl DocumentStore for SqliteStore {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn table_prefix(&self) -> &str {
        &self.prefix
    }

    fn is_registered_post_type(&self, post_type: &str) -> bool {
        self.post_types.iter().any(|t| t == post_type)
    }

    fn tenant_ids(&self) -> Result<Vec<TenantId>> {
        let sql = format!("SELECT blog_id FROM {}blogs ORDER BY blog_id", self.prefix);
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<TenantId>, _>>()?;
        Ok(ids)
    }

    fn find_containing(
        &self,
        scope: &TenantScope,
        post_type: &str,
        needle: &str,
    ) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT ID, post_title, post_content, post_type
             FROM {}
             WHERE post_status = ?1 AND post_type = ?2 AND post_content LIKE ?3 ESCAPE '\\'
             ORDER BY ID",
            scope.posts_table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![PUBLISHED, post_type, like_contains(needle)], row_to_document)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count_published(&self, scope: &TenantScope, post_type: &str) -> Result<usize> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE post_status = ?1 AND post_type = ?2",
            scope.posts_table()
        );
        let n: usize = self
            .conn
            .query_row(&sql, params![PUBLISHED, post_type], |r| r.get(0))?;
        Ok(n)
    }

    fn published_page(
        &self,
        scope: &TenantScope,
        post_type: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT ID, post_title, post_content, post_type
             FROM {}
             WHERE post_status = ?1 AND post_type = ?2
             ORDER BY ID
             LIMIT ?3 OFFSET ?4",
            scope.posts_table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![PUBLISHED, post_type, limit as i64, offset as i64],
                row_to_document,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn update_content(&self, scope: &TenantScope, id: i64, content: &str) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET post_content = ?1 WHERE ID = ?2",
            scope.posts_table()
        );
        self.conn.execute(&sql, params![content, id])?;
        Ok(())
    }

    fn home_url(&self, scope: &TenantScope) -> Result<String> {
        let table = scope.options_table();
        if !table_exists(&self.conn, &table)? {
            return Ok(self.fallback_home.clone());
        }
        let sql = format!(
            "SELECT option_value FROM {} WHERE option_name = 'home'",
            table
        );
        let home: Option<String> = self
            .conn
            .query_row(&sql, [], |r| r.get(0))
            .optional()?;
        Ok(match home {
            Some(h) if !h.trim().is_empty() => h.trim().trim_end_matches('/').to_string(),
            _ => self.fallback_home.clone(),
        })
    }
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        content: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        post_type: row.get(3)?,
    })
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

/// `%needle%` with LIKE wildcards in `needle` escaped (escape char `\`).
pub fn like_contains(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::Cell;

    use super::*;

    /// Creates a WordPress-shaped schema for the given tenants in memory.
    /// With `multi_tenant`, a `wp_blogs` table lists every tenant.
    pub fn store(tenants: &[TenantId], multi_tenant: bool) -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        for &t in tenants {
            let prefix = if t == MAIN_TENANT {
                "wp_".to_string()
            } else {
                format!("wp_{}_", t)
            };
            conn.execute_batch(&format!(
                "CREATE TABLE {p}posts (
                    ID           INTEGER PRIMARY KEY,
                    post_title   TEXT,
                    post_content TEXT,
                    post_type    TEXT NOT NULL DEFAULT 'post',
                    post_status  TEXT NOT NULL DEFAULT 'publish'
                );
                CREATE TABLE {p}options (
                    option_name  TEXT PRIMARY KEY,
                    option_value TEXT
                );
                INSERT INTO {p}options VALUES ('home', 'https://site{t}.example/');",
                p = prefix,
                t = t
            ))
            .unwrap();
        }
        if multi_tenant {
            conn.execute_batch("CREATE TABLE wp_blogs (blog_id INTEGER PRIMARY KEY);")
                .unwrap();
            for &t in tenants {
                conn.execute("INSERT INTO wp_blogs (blog_id) VALUES (?1)", [t])
                    .unwrap();
            }
        }
        SqliteStore::from_connection(conn, &Settings::default()).unwrap()
    }

    pub fn insert_post(
        store: &SqliteStore,
        tenant: TenantId,
        post_type: &str,
        status: &str,
        title: &str,
        content: &str,
    ) -> i64 {
        let scope = store.enter(scoped(store, tenant)).unwrap();
        store
            .conn
            .execute(
                &format!(
                    "INSERT INTO {} (post_title, post_content, post_type, post_status)
                     VALUES (?1, ?2, ?3, ?4)",
                    scope.posts_table()
                ),
                params![title, content, post_type, status],
            )
            .unwrap();
        store.conn.last_insert_rowid()
    }

    pub fn content_of(store: &SqliteStore, tenant: TenantId, id: i64) -> String {
        let scope = store.enter(scoped(store, tenant)).unwrap();
        store
            .conn
            .query_row(
                &format!("SELECT post_content FROM {} WHERE ID = ?1", scope.posts_table()),
                [id],
                |r| r.get(0),
            )
            .unwrap()
    }

    fn scoped(store: &SqliteStore, tenant: TenantId) -> Option<TenantId> {
        if store.capabilities().multi_tenant {
            Some(tenant)
        } else {
            None
        }
    }

    /// Wraps a store and counts every query or write issued through it.
    pub struct CountingStore<'a> {
        pub inner: &'a SqliteStore,
        pub calls: Cell<usize>,
    }

    impl<'a> CountingStore<'a> {
        pub fn new(inner: &'a SqliteStore) -> Self {
            CountingStore {
                inner,
                calls: Cell::new(0),
            }
        }

        fn bump(&self) {
            self.calls.set(self.calls.get() + 1);
        }
    }

    impl DocumentStore for CountingStore<'_> {
        fn capabilities(&self) -> Capabilities {
            self.inner.capabilities()
        }
        fn table_prefix(&self) -> &str {
            self.inner.table_prefix()
        }
        fn is_registered_post_type(&self, post_type: &str) -> bool {
            self.inner.is_registered_post_type(post_type)
        }
        fn tenant_ids(&self) -> Result<Vec<TenantId>> {
            self.bump();
            self.inner.tenant_ids()
        }
        fn find_containing(
            &self,
            scope: &TenantScope,
            post_type: &str,
            needle: &str,
        ) -> Result<Vec<Document>> {
            self.bump();
            self.inner.find_containing(scope, post_type, needle)
        }
        fn count_published(&self, scope: &TenantScope, post_type: &str) -> Result<usize> {
            self.bump();
            self.inner.count_published(scope, post_type)
        }
        fn published_page(
            &self,
            scope: &TenantScope,
            post_type: &str,
            limit: usize,
            offset: usize,
        ) -> Result<Vec<Document>> {
            self.bump();
            self.inner.published_page(scope, post_type, limit, offset)
        }
        fn update_content(&self, scope: &TenantScope, id: i64, content: &str) -> Result<()> {
            self.bump();
            self.inner.update_content(scope, id, content)
        }
        fn home_url(&self, scope: &TenantScope) -> Result<String> {
            self.bump();
            self.inner.home_url(scope)
        }
    }
}
