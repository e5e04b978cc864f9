use tracing::{debug, info, warn};

use crate::db::{DocumentStore, TenantId};
use crate::error::{Error, Result};
use crate::parser::BlockMarker;

#[derive(Debug, Clone, Default)]
pub struct RemoveRequest {
    pub marker_name: Option<String>,
    pub tenant: Option<TenantId>,
    /// Comma separated, e.g. `post,page`.
    pub post_types: Option<String>,
    pub dry_run: bool,
}

impl RemoveRequest {
    /// Checks everything that does not depend on the store.
    pub fn validate(&self) -> Result<(BlockMarker, Vec<String>)> {
        let marker = BlockMarker::new(self.marker_name.as_deref().unwrap_or_default())?;
        let post_types = parse_post_types(self.post_types.as_deref())?;
        Ok((marker, post_types))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveStats {
    pub documents: usize,
    pub blocks: usize,
    pub skipped_post_types: Vec<String>,
}

pub fn parse_post_types(raw: Option<&str>) -> Result<Vec<String>> {
    let types: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect();
    if types.is_empty() {
        return Err(Error::MissingPostTypes);
    }
    Ok(types)
}

/// Strips every block named in the request from published documents of
/// the given post types, writing each matched document back by id.
///
/// There is no transaction: a storage error stops the run and leaves the
/// documents already written as they are.
pub fn run(store: &impl DocumentStore, req: &RemoveRequest) -> Result<RemoveStats> {
    let (marker, post_types) = req.validate()?;
    let tenant = match (store.capabilities().multi_tenant, req.tenant) {
        (true, Some(t)) if t > 0 => Some(t),
        (true, other) => return Err(Error::InvalidTenant(other)),
        (false, Some(_)) => return Err(Error::MultiTenantUnsupported),
        (false, None) => None,
    };

    let scope = store.enter(tenant)?;
    let open = marker.open_marker();
    let mut stats = RemoveStats::default();

    for post_type in &post_types {
        if !store.is_registered_post_type(post_type) {
            warn!("Post type '{}' does not exist. Skipping.", post_type);
            stats.skipped_post_types.push(post_type.clone());
            continue;
        }

        let docs = store.find_containing(&scope, post_type, &open)?;
        debug!(documents = docs.len(), post_type = %post_type, "candidate documents");

        for doc in docs {
            let removal = marker.remove_all(&doc.content);
            if req.dry_run {
                info!(id = doc.id, blocks = removal.removed, "would update");
            } else {
                store.update_content(&scope, doc.id, &removal.content)?;
                debug!(id = doc.id, blocks = removal.removed, "updated");
            }
            if removal.removed > 0 {
                stats.documents += 1;
                stats.blocks += removal.removed;
            }
        }
    }

    info!(
        block = marker.name(),
        documents = stats.documents,
        blocks = stats.blocks,
        dry_run = req.dry_run,
        "removal complete"
    );
    Ok(stats)
}
