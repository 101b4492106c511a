use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use vellum_engine::{ObjectTypeDescriptor, TypeRegistry};
use vellum_store::{
    CacheStore, Filter, FindQuery, InMemoryCache, OrderBy, RelationalStore, SimilarityQuery,
    SortDirection,
};
use vellum_types::{CanonicalId, Caller, ObjectType, Record};

use crate::cache::{CacheKeyParts, EmbeddingCache};
use crate::config::SearchConfig;
use crate::embedding::{EmbeddingProvider, HashEmbedder};
use crate::error::{SearchError, SearchResult};
use crate::request::{Connection, Edge, PageInfo, SearchRequest, Visibility};

/// The read pipeline: cursor-paginated relational listing and
/// cache-accelerated hybrid vector search.
pub struct SearchEngine {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn RelationalStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: Option<EmbeddingCache>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn builder(registry: Arc<TypeRegistry>, store: Arc<dyn RelationalStore>) -> SearchEngineBuilder {
        SearchEngineBuilder {
            registry,
            store,
            embedder: None,
            cache: None,
            config: SearchConfig::default(),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run one page request.
    ///
    /// A non-blank query on a type with text search ranks by embedding
    /// distance and pages by `offset`; everything else is ordered by the
    /// sort key and paged by `cursor` (or `offset` when no cursor is given).
    pub async fn search(&self, request: &SearchRequest, caller: &Caller) -> SearchResult<Connection> {
        if request.take == 0 {
            return Err(SearchError::invalid("take must be at least 1"));
        }
        let take = request.take.min(self.config.max_take);
        let descriptor = self.registry.get(&request.object_type)?;

        let mut filters = Vec::new();
        if let Some(visibility) = visibility_filter(descriptor, caller, request.visibility)? {
            filters.push(visibility);
        }
        if let Some(dates) = date_filter(descriptor, request)? {
            filters.push(dates);
        }
        filters.extend(request.filters.iter().map(|(field, value)| match value {
            Value::Array(values) => Filter::In {
                field: field.clone(),
                values: values.clone(),
            },
            other => Filter::eq(field.clone(), other.clone()),
        }));
        let filter = Filter::all(filters);

        match request.normalized_query() {
            Some(query) if descriptor.search.supports_text_search => {
                self.hybrid(descriptor, request, &query, filter, take, caller).await
            }
            Some(_) => Err(SearchError::invalid(format!(
                "{} does not support text search",
                request.object_type
            ))),
            None => self.relational(descriptor, request, filter, take, caller).await,
        }
    }

    /// Read one object by id, honouring default visibility.
    pub async fn find_one(
        &self,
        object_type: &ObjectType,
        id: CanonicalId,
        caller: &Caller,
    ) -> SearchResult<Value> {
        let descriptor = self.registry.get(object_type)?;
        let mut filters = vec![Filter::eq(descriptor.id_field.clone(), id.to_value())];
        filters.extend(visibility_filter(descriptor, caller, Visibility::Visible)?);

        let mut query = FindQuery::new(descriptor.table.clone(), descriptor.id_field.clone());
        query.filter = Filter::all(filters);
        query.take = Some(1);
        query.select = descriptor.projection.clone();

        let row = self
            .store
            .find_many(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::NotFound(format!("{object_type} {id}")))?;
        Ok(descriptor.formatter.format(row, caller))
    }

    // -----------------------------------------------------------------------
    // Relational path
    // -----------------------------------------------------------------------

    async fn relational(
        &self,
        descriptor: &ObjectTypeDescriptor,
        request: &SearchRequest,
        filter: Option<Filter>,
        take: u64,
        caller: &Caller,
    ) -> SearchResult<Connection> {
        let order_by = match requested_sort(descriptor, request)? {
            Some(order) => Some(order.clone()),
            None if descriptor.search.default_sort.field.is_empty() => None,
            None => Some(descriptor.search.default_sort.clone()),
        };

        let mut query = FindQuery::new(descriptor.table.clone(), descriptor.id_field.clone());
        query.filter = filter;
        query.order_by = order_by;
        query.cursor = request.cursor;
        // The store starts at the cursor row itself.
        query.skip = if request.cursor.is_some() { 1 } else { request.offset };
        query.take = Some(take + 1);
        query.select = descriptor.projection.clone();

        let mut rows = self.store.find_many(&query).await?;
        let has_next_page = rows.len() as u64 > take;
        rows.truncate(take as usize);

        tracing::debug!(
            object_type = %request.object_type,
            returned = rows.len(),
            has_next_page,
            "relational page served"
        );
        Ok(connection(descriptor, rows, has_next_page, caller))
    }

    // -----------------------------------------------------------------------
    // Hybrid path
    // -----------------------------------------------------------------------

    async fn hybrid(
        &self,
        descriptor: &ObjectTypeDescriptor,
        request: &SearchRequest,
        query: &str,
        filter: Option<Filter>,
        take: u64,
        caller: &Caller,
    ) -> SearchResult<Connection> {
        let wanted = take + 1;
        let sort = requested_sort(descriptor, request)?
            .map(sort_segment)
            .unwrap_or_else(|| "relevance".to_string());
        let user = user_segment(caller);
        let constraints = serde_json::json!({
            "from": request.date_from,
            "to": request.date_to,
            "filters": request.filters,
        })
        .to_string();
        let key = CacheKeyParts {
            object_type: request.object_type.as_str(),
            sort: &sort,
            user: &user,
            visibility: request.visibility.as_str(),
            normalized_query: query,
            constraints: &constraints,
        }
        .key();

        let mut ids = match &self.cache {
            Some(cache) => cache.window(&key, request.offset, wanted).await?,
            None => Vec::new(),
        };
        let cached = ids.len() as u64;

        if cached < wanted {
            let embedding = self.embedder.embed(query).await?;
            let fresh = self
                .store
                .rank_by_similarity(&SimilarityQuery {
                    table: descriptor.table.clone(),
                    id_field: descriptor.id_field.clone(),
                    embedding,
                    filter: filter.clone(),
                    offset: request.offset + cached,
                    limit: wanted - cached,
                })
                .await?;
            tracing::debug!(
                object_type = %request.object_type,
                cache_key_prefix = key.get(..key.len().saturating_sub(65)).unwrap_or(&key),
                cached,
                fetched = fresh.len(),
                "hybrid search cache miss"
            );
            if let Some(cache) = &self.cache {
                cache.store_window(&key, request.offset + cached, &fresh).await?;
            }
            ids.extend(fresh);
        }

        let has_next_page = ids.len() as u64 > take;
        ids.truncate(take as usize);

        // Cached ids are re-checked against the caller's filter.
        let mut fetch = vec![Filter::In {
            field: descriptor.id_field.clone(),
            values: ids.iter().map(CanonicalId::to_value).collect(),
        }];
        fetch.extend(filter);
        let mut rows_query = FindQuery::new(descriptor.table.clone(), descriptor.id_field.clone());
        rows_query.filter = Filter::all(fetch);
        rows_query.select = descriptor.projection.clone();
        let rows = self.store.find_many(&rows_query).await?;
        let mut by_id: HashMap<CanonicalId, Record> = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.get(&descriptor.id_field).and_then(CanonicalId::from_value)?;
                Some((id, row))
            })
            .collect();
        // Rank order; rows deleted or hidden since ranking drop out.
        let ranked: Vec<Record> = ids.iter().filter_map(|id| by_id.remove(id)).collect();

        Ok(connection(descriptor, ranked, has_next_page, caller))
    }
}

/// The caller's explicit sort, which must name a sortable field.
fn requested_sort<'a>(
    descriptor: &ObjectTypeDescriptor,
    request: &'a SearchRequest,
) -> SearchResult<Option<&'a OrderBy>> {
    match &request.sort {
        Some(order) if descriptor.search.is_sortable(&order.field) => Ok(Some(order)),
        Some(order) => Err(SearchError::invalid(format!(
            "{} cannot be sorted by {}",
            request.object_type, order.field
        ))),
        None => Ok(None),
    }
}

/// Cache key segment for the caller. The id is hex-encoded behind a role
/// tag so no user id can spell another caller's segment.
fn user_segment(caller: &Caller) -> String {
    match &caller.user_id {
        None => "anon".to_string(),
        Some(id) if caller.is_admin => format!("a{}", hex::encode(id)),
        Some(id) => format!("u{}", hex::encode(id)),
    }
}

fn sort_segment(order: &OrderBy) -> String {
    let direction = match order.direction {
        SortDirection::Asc => "asc",
        SortDirection::Desc => "desc",
    };
    format!("{}:{direction}", order.field)
}

fn connection(
    descriptor: &ObjectTypeDescriptor,
    rows: Vec<Record>,
    has_next_page: bool,
    caller: &Caller,
) -> Connection {
    let edges: Vec<Edge> = rows
        .into_iter()
        .filter_map(|row| {
            let cursor = row.get(&descriptor.id_field).and_then(CanonicalId::from_value)?;
            Some(Edge {
                cursor,
                node: descriptor.formatter.format(row, caller),
            })
        })
        .collect();
    let end_cursor = edges.last().map(|e| e.cursor);
    Connection {
        edges,
        page_info: PageInfo {
            has_next_page,
            end_cursor,
        },
    }
}

/// Matches no row.
fn nothing(descriptor: &ObjectTypeDescriptor) -> Filter {
    Filter::In {
        field: descriptor.id_field.clone(),
        values: Vec::new(),
    }
}

/// The row predicate for `visibility`. `None` means every row.
///
/// Types with neither an owner nor a public column are public.
fn visibility_filter(
    descriptor: &ObjectTypeDescriptor,
    caller: &Caller,
    visibility: Visibility,
) -> SearchResult<Option<Filter>> {
    let ownership = &descriptor.ownership;
    let public = ownership
        .public
        .as_ref()
        .map(|field| Filter::eq(field.clone(), true));
    let owned = match (&ownership.owner, &caller.user_id) {
        (Some(field), Some(user)) => Some(Filter::eq(field.clone(), user.clone())),
        _ => None,
    };
    let ownerless = ownership.owner.is_none() && ownership.public.is_none();

    Ok(match visibility {
        Visibility::Visible if caller.is_admin || ownerless => None,
        Visibility::Visible => match (public, owned) {
            (Some(p), Some(o)) => Some(Filter::Any(vec![p, o])),
            (Some(p), None) => Some(p),
            (None, Some(o)) => Some(o),
            (None, None) => Some(nothing(descriptor)),
        },
        Visibility::Mine if caller.is_anonymous() => {
            return Err(SearchError::Unauthorized(
                "anonymous callers own nothing".into(),
            ))
        }
        Visibility::Mine => match owned {
            Some(o) => Some(o),
            None => {
                return Err(SearchError::invalid(format!(
                    "{} has no owner",
                    descriptor.object_type
                )))
            }
        },
        Visibility::Public if ownerless => None,
        Visibility::Public => Some(public.unwrap_or_else(|| nothing(descriptor))),
    })
}

fn date_filter(descriptor: &ObjectTypeDescriptor, request: &SearchRequest) -> SearchResult<Option<Filter>> {
    if request.date_from.is_none() && request.date_to.is_none() {
        return Ok(None);
    }
    let Some(field) = &descriptor.search.date_field else {
        return Err(SearchError::invalid(format!(
            "{} has no date field to bound",
            request.object_type
        )));
    };
    let render = |dt: &chrono::DateTime<chrono::Utc>| {
        Value::String(dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    };
    Ok(Some(Filter::Range {
        field: field.clone(),
        gte: request.date_from.as_ref().map(render),
        lte: request.date_to.as_ref().map(render),
    }))
}

/// Builder for [`SearchEngine`]. Without an embedder it uses
/// [`HashEmbedder`]; without a cache store it caches in memory.
pub struct SearchEngineBuilder {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn RelationalStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    cache: Option<Arc<dyn CacheStore>>,
    config: SearchConfig,
}

impl SearchEngineBuilder {
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> SearchResult<SearchEngine> {
        self.config.validate()?;
        let embedder: Arc<dyn EmbeddingProvider> = match self.embedder {
            Some(embedder) => embedder,
            None => Arc::new(HashEmbedder::default()),
        };
        let cache = if self.config.cache_enabled {
            let store: Arc<dyn CacheStore> = match self.cache {
                Some(store) => store,
                None => Arc::new(InMemoryCache::new()),
            };
            Some(EmbeddingCache::new(store, self.config.cache_ttl()))
        } else {
            None
        };

        tracing::debug!(
            max_take = self.config.max_take,
            cache_enabled = cache.is_some(),
            dimensions = embedder.dimensions(),
            "search engine ready"
        );
        Ok(SearchEngine {
            registry: self.registry,
            store: self.store,
            embedder,
            cache,
            config: self.config,
        })
    }
}
