use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Please provide a block name using the --marker-name parameter.")]
    MissingMarkerName,

    #[error("You must provide at least one post type.")]
    MissingPostTypes,

    #[error("You must provide a valid tenant ID (got {0:?}).")]
    InvalidTenant(Option<i64>),

    #[error("Tenant switching was requested, but this store is not multi-tenant.")]
    MultiTenantUnsupported,

    #[error("Could not open {path:?} for writing: {source}")]
    OutputNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No posts found for post type '{0}'.")]
    NoPostsFound(String),

    #[error("Invalid table prefix '{0}': only ASCII letters, digits and '_' are allowed")]
    InvalidTablePrefix(String),

    #[error("Invalid block name '{0}'")]
    InvalidMarkerName(String),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
