//! Bounded LRU cache for query results.
//!
//! Entries are keyed by a structured [`QueryKey`] and hold type-erased,
//! shared results. Lookups downcast back to the concrete result type, so a
//! key can only ever produce the type it was stored with.

use crate::model::EntityKind;
use ordered_float::OrderedFloat;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

type Entry = Arc<dyn Any + Send + Sync>;

/// One cacheable operation together with all of its parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Count(EntityKind),
    Dashboard,
    Titles {
        title_type: Option<String>,
        year_min: Option<i32>,
        year_max: Option<i32>,
        genre: Option<String>,
        min_rating: Option<OrderedFloat<f64>>,
        adult: Option<bool>,
        sort: &'static str,
        page: usize,
        page_size: usize,
    },
    Title(String),
    CastAndCrew { title_id: String, limit: usize },
    Filmography(String),
    SearchTitles { term: String, title_type: Option<String> },
    SearchPeople(String),
    Genres { min_votes: i64, min_count: u64 },
    Episodes(String),
    AlternateTitles(String),
    RatingTrend { year_from: i32, year_to: i32, min_votes: i64 },
}

/// Least-recently-used cache with a fixed entry budget. A capacity of zero
/// disables caching.
pub struct QueryCache {
    data: HashMap<QueryKey, Entry>,
    /// Most recently used at the front.
    order: VecDeque<QueryKey>,
    capacity: usize,
}

impl QueryCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: HashMap::new(),
            order: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Cached result for `key`, promoted to most recently used.
    pub fn get<T: Any + Send + Sync>(&mut self, key: &QueryKey) -> Option<Arc<T>> {
        let entry = Arc::clone(self.data.get(key)?);
        self.touch(key);
        entry.downcast::<T>().ok()
    }

    pub fn put<T: Any + Send + Sync>(&mut self, key: QueryKey, value: Arc<T>) {
        if self.capacity == 0 {
            return;
        }
        if self.data.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else if self.data.len() >= self.capacity {
            if let Some(lru) = self.order.pop_back() {
                self.data.remove(&lru);
            }
        }
        self.order.push_front(key.clone());
        self.data.insert(key, value);
    }

    fn touch(&mut self, key: &QueryKey) {
        if self.order.front() != Some(key) {
            self.order.retain(|k| k != key);
            self.order.push_front(key.clone());
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.order.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = QueryCache::new(2);
        cache.put(QueryKey::Title("tt1".into()), Arc::new(1u64));
        cache.put(QueryKey::Title("tt2".into()), Arc::new(2u64));
        // Touch tt1 so tt2 becomes the eviction candidate.
        assert_eq!(cache.get::<u64>(&QueryKey::Title("tt1".into())).as_deref(), Some(&1));
        cache.put(QueryKey::Title("tt3".into()), Arc::new(3u64));

        assert_eq!(cache.len(), 2);
        assert!(cache.get::<u64>(&QueryKey::Title("tt2".into())).is_none());
        assert!(cache.get::<u64>(&QueryKey::Title("tt3".into())).is_some());
    }

    #[test]
    fn float_parameters_are_distinct_keys() {
        let key = |r: f64| QueryKey::Titles {
            title_type: None,
            year_min: None,
            year_max: None,
            genre: None,
            min_rating: Some(OrderedFloat(r)),
            adult: None,
            sort: "popularity",
            page: 1,
            page_size: 20,
        };
        let mut cache = QueryCache::new(8);
        cache.put(key(7.0), Arc::new("seven"));
        assert!(cache.get::<&str>(&key(7.5)).is_none());
        assert_eq!(cache.get::<&str>(&key(7.0)).as_deref(), Some(&"seven"));
    }

    #[test]
    fn wrong_type_is_a_miss() {
        let mut cache = QueryCache::new(4);
        cache.put(QueryKey::Dashboard, Arc::new(5u32));
        assert!(cache.get::<String>(&QueryKey::Dashboard).is_none());
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let mut cache = QueryCache::new(0);
        cache.put(QueryKey::Dashboard, Arc::new(1u8));
        assert!(cache.is_empty());
    }
}
