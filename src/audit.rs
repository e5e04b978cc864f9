use std::collections::BTreeSet;

use indicatif::ProgressBar;
use tracing::debug;

use crate::db::{DocumentStore, TenantId};
use crate::error::{Error, Result};
use crate::parser::tree::{collect_names, parse_blocks};
use crate::search::DEFAULT_POST_TYPE;

#[derive(Debug, Clone, Default)]
pub struct AuditRequest {
    pub post_type: Option<String>,
    pub tenant: Option<TenantId>,
}

/// Collects the distinct block names used across every published document
/// of the post type, nested blocks included. Ticks `progress` once per document.
pub fn run(
    store: &impl DocumentStore,
    page_size: usize,
    req: &AuditRequest,
    progress: &ProgressBar,
) -> Result<BTreeSet<String>> {
    let post_type = req.post_type.as_deref().unwrap_or(DEFAULT_POST_TYPE);
    let scope = store.enter(req.tenant)?;

    let total = store.count_published(&scope, post_type)?;
    if total == 0 {
        return Err(Error::NoPostsFound(post_type.to_string()));
    }
    progress.set_length(total as u64);

    let mut names = BTreeSet::new();
    let mut offset = 0;
    loop {
        let page = store.published_page(&scope, post_type, page_size, offset)?;
        debug!(offset, fetched = page.len(), "audit page");
        for doc in &page {
            collect_names(&parse_blocks(&doc.content), &mut names);
            progress.inc(1);
        }
        if page.len() < page_size {
            break;
        }
        offset += page.len();
    }
    progress.finish();

    Ok(names)
}
