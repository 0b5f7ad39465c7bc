//! AST cache.
//!
//! Shared between all logical connections.

use lru::LruCache;
use once_cell::sync::Lazy;
use pg_query::*;
use std::num::NonZeroUsize;

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::super::RouteSet;

static CACHE: Lazy<Cache> = Lazy::new(Cache::new);

const DEFAULT_CAPACITY: usize = 1024;

/// AST cache statistics.
#[derive(Default, Debug, Copy, Clone, PartialEq)]
pub struct Stats {
    /// Cache hits.
    pub hits: usize,
    /// Cache misses (new queries).
    pub misses: usize,
    /// Single target routes.
    pub direct: usize,
    /// Multi-target routes.
    pub multi: usize,
}

/// Abstract syntax tree (query) cache entry,
/// with statistics.
#[derive(Debug, Clone)]
pub struct CachedAst {
    /// pg_query-produced AST.
    pub ast: Arc<ParseResult>,
    /// Statistics. Use a separate Mutex to avoid
    /// contention when updating them.
    pub stats: Arc<Mutex<Stats>>,
}

impl CachedAst {
    /// Create new cache entry from pg_query's AST.
    fn new(ast: ParseResult) -> Self {
        Self {
            ast: Arc::new(ast),
            stats: Arc::new(Mutex::new(Stats {
                hits: 1,
                ..Default::default()
            })),
        }
    }

    /// Get the reference to the AST.
    pub fn ast(&self) -> &ParseResult {
        &self.ast
    }

    /// Update stats for this statement, given the routes
    /// calculated by the router.
    pub fn update_stats(&self, routes: &RouteSet) {
        let mut guard = self.stats.lock();

        if routes.len() > 1 {
            guard.multi += 1;
        } else {
            guard.direct += 1;
        }
    }
}

/// Mutex-protected query cache.
#[derive(Debug)]
struct Inner {
    /// Least-recently-used cache.
    queries: LruCache<String, CachedAst>,
    /// Cache global stats.
    stats: Stats,
}

/// AST cache.
#[derive(Clone, Debug)]
pub struct Cache {
    inner: Arc<Mutex<Inner>>,
}

impl Cache {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                queries: LruCache::new(
                    NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
                ),
                stats: Stats::default(),
            })),
        }
    }

    /// Resize cache to capacity, evicting any statements exceeding the capacity.
    ///
    /// Minimum capacity is 1.
    pub fn resize(capacity: usize) {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        CACHE.inner.lock().queries.resize(capacity);

        debug!("ast cache size set to {}", capacity);
    }

    /// Parse a statement by either getting it from cache
    /// or using pg_query parser.
    ///
    /// N.B. There is a race here that allows multiple threads to
    /// parse the same query. That's better than locking the data structure
    /// while we parse the query.
    pub fn parse(&self, query: &str) -> Result<CachedAst> {
        {
            let mut guard = self.inner.lock();
            let ast = guard.queries.get_mut(query).map(|entry| {
                entry.stats.lock().hits += 1; // No contention on this.
                entry.clone()
            });
            if let Some(ast) = ast {
                guard.stats.hits += 1;
                return Ok(ast);
            }
        }

        // Parse query without holding lock.
        let entry = CachedAst::new(parse(query)?);

        let mut guard = self.inner.lock();
        guard.queries.put(query.to_owned(), entry.clone());
        guard.stats.misses += 1;

        Ok(entry)
    }

    /// Get global cache instance.
    pub fn get() -> Self {
        CACHE.clone()
    }

    /// Get cache stats.
    pub fn stats() -> (Stats, usize) {
        let cache = Self::get();
        let (len, query_stats, mut stats) = {
            let guard = cache.inner.lock();
            (
                guard.queries.len(),
                guard
                    .queries
                    .iter()
                    .map(|c| c.1.stats.clone())
                    .collect::<Vec<_>>(),
                guard.stats,
            )
        };
        for stat in query_stats {
            let guard = stat.lock();
            stats.direct += guard.direct;
            stats.multi += guard.multi;
        }
        (stats, len)
    }
}
