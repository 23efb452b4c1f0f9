use crate::connection::Collection;
use crate::core::{Document, FindOptions, Projection, Query, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use log::debug;
use serde_json::Value;
use std::collections::HashSet;

/// Identifiers of every document matching `query`, using an id-only projection.
pub async fn all_ids(collection: &Collection, query: &Query) -> Result<Vec<String>> {
    let options = FindOptions::new().projection(Projection::id_only());
    let docs = collection
        .find(query, &options)
        .await
        .map_err(|err| err.into_read())?;

    Ok(docs.iter().filter_map(Document::id_string).collect())
}

/// Runs `query` and applies `transform` to every document found.
///
/// `limit` caps the number of documents read; 0 reads everything.
pub async fn map<T, F>(
    collection: &Collection,
    query: &Query,
    projection: Projection,
    limit: usize,
    transform: F,
) -> Result<Vec<T>>
where
    F: FnMut(Document) -> T,
{
    let options = FindOptions::new().projection(projection).limit(limit);
    let docs = collection
        .find(query, &options)
        .await
        .map_err(|err| err.into_read())?;

    debug!("[map] {} read {} documents", collection.name(), docs.len());
    Ok(docs.into_iter().map(transform).collect())
}

/// `map` with the identity transform, keeping documents `predicate` accepts.
pub async fn filter<P>(
    collection: &Collection,
    query: &Query,
    projection: Projection,
    limit: usize,
    mut predicate: P,
) -> Result<Vec<Document>>
where
    P: FnMut(&Document) -> bool,
{
    let docs = map(collection, query, projection, limit, |doc| doc).await?;
    Ok(docs.into_iter().filter(|doc| predicate(doc)).collect())
}

/// Paged `$in` lookup
///
/// `select` is cut into pages of `page_size` values; up to `fan_out` pages
/// are looked up at once.
#[derive(Debug, Clone, PartialEq)]
pub struct FindManyIn {
    pub key: String,
    pub select: Vec<Value>,
    pub page_size: usize,
    pub fan_out: usize,
}

impl FindManyIn {
    pub const DEFAULT_PAGE_SIZE: usize = 1000;
    pub const DEFAULT_FAN_OUT: usize = 4;

    pub fn new<I, V>(key: impl Into<String>, select: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            key: key.into(),
            select: select.into_iter().map(Into::into).collect(),
            page_size: Self::DEFAULT_PAGE_SIZE,
            fan_out: Self::DEFAULT_FAN_OUT,
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    fn pages(&self) -> impl Iterator<Item = &[Value]> {
        self.select.chunks(self.page_size.max(1))
    }
}

/// Union of the documents whose `key` is in `lookup.select`.
///
/// Results come back in page order; a document matched by more than one page
/// appears once, at its first position.
pub async fn find_many_in(collection: &Collection, lookup: &FindManyIn) -> Result<Vec<Document>> {
    if lookup.select.is_empty() {
        return Ok(Vec::new());
    }

    let options = FindOptions::new();
    let pages: Vec<Vec<Document>> = stream::iter(lookup.pages())
        .map(|page| {
            let query = Query::is_in(lookup.key.clone(), page.iter().cloned());
            let options = &options;
            async move { collection.find(&query, options).await }
        })
        .buffered(lookup.fan_out.max(1))
        .map_err(|err| err.into_read())
        .try_collect()
        .await?;

    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for doc in pages.into_iter().flatten() {
        if doc.id_string().is_none_or(|id| seen.insert(id)) {
            merged.push(doc);
        }
    }
    debug!(
        "[find_many_in] {} {} values matched {} documents",
        collection.name(),
        lookup.select.len(),
        merged.len()
    );
    Ok(merged)
}

/// Field-list projection, or everything when `fields` is empty.
pub fn projection_for(fields: &[&str]) -> Projection {
    if fields.is_empty() {
        Projection::All
    } else {
        Projection::fields(fields.iter().copied())
    }
}
