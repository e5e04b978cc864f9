use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::Settings;
use crate::db::{Document, DocumentStore, TenantId};
use crate::error::{Error, Result};
use crate::parser::{excerpt, flatten_attributes, BlockMarker};
use crate::report::{CsvReport, ReportRow};

pub const DEFAULT_POST_TYPE: &str = "post";
pub const DEFAULT_FILE: &str = "block-search.csv";

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub marker_name: Option<String>,
    pub tenant: Option<TenantId>,
    pub post_type: Option<String>,
    pub file: Option<String>,
}

impl SearchRequest {
    pub fn marker(&self) -> Result<BlockMarker> {
        BlockMarker::new(self.marker_name.as_deref().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub tenants: usize,
    pub documents: usize,
    pub rows: usize,
}

/// Validates the request, opens the report file, then scans every tenant in scope.
/// Returns where the report was written.
pub fn run(
    store: &impl DocumentStore,
    settings: &Settings,
    req: &SearchRequest,
) -> Result<(PathBuf, SearchStats)> {
    let marker = req.marker()?;
    if let Some(tenant) = req.tenant {
        if !store.capabilities().multi_tenant {
            return Err(Error::MultiTenantUnsupported);
        }
        if tenant <= 0 {
            return Err(Error::InvalidTenant(Some(tenant)));
        }
    }
    let post_type = req.post_type.as_deref().unwrap_or(DEFAULT_POST_TYPE);
    let path = settings
        .upload_dir
        .join(req.file.as_deref().unwrap_or(DEFAULT_FILE));

    let mut report = CsvReport::create(&path)?;
    let stats = search_into(store, &marker, req.tenant, post_type, &mut report)?;
    report.finish()?;

    info!(
        path = %path.display(),
        tenants = stats.tenants,
        documents = stats.documents,
        rows = stats.rows,
        "search complete"
    );
    Ok((path, stats))
}

/// Writes one row per block instance of `marker` found in published
/// `post_type` documents of each tenant in scope.
pub fn search_into<W: Write>(
    store: &impl DocumentStore,
    marker: &BlockMarker,
    tenant: Option<TenantId>,
    post_type: &str,
    report: &mut CsvReport<W>,
) -> Result<SearchStats> {
    let tenants: Vec<Option<TenantId>> = match tenant {
        Some(t) => vec![Some(t)],
        None if store.capabilities().multi_tenant => {
            store.tenant_ids()?.into_iter().map(Some).collect()
        }
        None => vec![None],
    };

    let needle = marker.search_needle();
    let mut stats = SearchStats::default();

    for tenant in tenants {
        let scope = store.enter(tenant)?;
        let home = store.home_url(&scope)?;
        let docs = store.find_containing(&scope, post_type, &needle)?;
        debug!(tenant = ?scope.tenant(), documents = docs.len(), post_type, "candidate documents");

        for doc in &docs {
            let url = permalink(&home, doc);
            for block in marker.extract(&doc.content) {
                debug!(id = doc.id, offset = block.span.start, "block found");
                report.write_row(&ReportRow {
                    document_id: doc.id,
                    url: url.clone(),
                    title: doc.title.clone(),
                    block_name: block.name.to_string(),
                    excerpt: excerpt(block.body),
                    attributes: flatten_attributes(block.attributes.as_ref()),
                })?;
                stats.rows += 1;
            }
        }
        stats.documents += docs.len();
        stats.tenants += 1;
    }

    Ok(stats)
}

/// Plain (query-string) permalink, as the site serves it without rewrites.
pub fn permalink(home: &str, doc: &Document) -> String {
    match doc.post_type.as_str() {
        "page" => format!("{}/?page_id={}", home, doc.id),
        _ => format!("{}/?p={}", home, doc.id),
    }
}
