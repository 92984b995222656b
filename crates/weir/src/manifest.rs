use std::{collections::HashMap, sync::Arc};

use weir_buffer::{IndexResolver, SharedIndex};
use weir_core::Adaptation;
use weir_timeline::SegmentIndex;

use crate::options::StartAt;

/// Stable key of one representation's timeline index.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct IndexKey {
    pub period: String,
    pub adaptation: String,
    pub representation: String,
}

impl IndexKey {
    pub fn new(
        period: impl Into<String>,
        adaptation: impl Into<String>,
        representation: impl Into<String>,
    ) -> Self {
        Self {
            period: period.into(),
            adaptation: adaptation.into(),
            representation: representation.into(),
        }
    }
}

/// One content period.
#[derive(Clone, Debug)]
pub struct Period {
    pub id: String,
    pub start: f64,
    pub duration: Option<f64>,
    pub adaptations: Vec<Arc<Adaptation>>,
}

/// Arena owning the parsed manifest for one session.
///
/// Timeline indexes live here behind stable handles keyed by
/// (period, adaptation, representation); schedulers borrow handles and
/// never own the manifest, so the session's ownership graph is acyclic
/// and the manifest outlives every scheduler it feeds.
pub struct Manifest {
    periods: Vec<Period>,
    is_live: bool,
    duration: Option<f64>,
    indexes: HashMap<IndexKey, SharedIndex>,
}

impl Manifest {
    #[must_use]
    pub fn new(is_live: bool, duration: Option<f64>) -> Self {
        Self {
            periods: Vec::new(),
            is_live,
            duration,
            indexes: HashMap::new(),
        }
    }

    pub fn push_period(&mut self, period: Period) {
        self.periods.push(period);
    }

    pub fn register_index(&mut self, key: IndexKey, index: Box<dyn SegmentIndex>) {
        self.indexes
            .insert(key, Arc::new(parking_lot::Mutex::new(index)));
    }

    #[must_use]
    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.is_live
    }

    #[must_use]
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    #[must_use]
    pub fn index_for(&self, key: &IndexKey) -> Option<SharedIndex> {
        self.indexes.get(key).cloned()
    }

    /// Resolver handing one adaptation's per-representation indexes to a
    /// scheduler.
    #[must_use]
    pub fn resolver_for(&self, period_id: &str, adaptation: &Adaptation) -> Arc<dyn IndexResolver> {
        let mut map = HashMap::new();
        for rep in &adaptation.representations {
            let key = IndexKey::new(period_id, &adaptation.id, &rep.id);
            if let Some(index) = self.indexes.get(&key) {
                map.insert(rep.id.clone(), Arc::clone(index));
            }
        }
        Arc::new(AdaptationIndexes { map })
    }

    /// Maximum buffered position reachable on a live stream; `None` for
    /// on-demand content (live gap becomes infinite).
    #[must_use]
    pub fn max_buffer_position(&self) -> Option<f64> {
        if !self.is_live {
            return None;
        }
        self.indexes
            .values()
            .filter_map(|index| index.lock().last_position())
            .max_by(f64::total_cmp)
    }

    /// Earliest indexed position across all representations.
    #[must_use]
    pub fn first_position(&self) -> Option<f64> {
        self.indexes
            .values()
            .filter_map(|index| index.lock().first_position())
            .min_by(f64::total_cmp)
    }

    /// Latest indexed position across all representations.
    #[must_use]
    pub fn last_position(&self) -> Option<f64> {
        self.indexes
            .values()
            .filter_map(|index| index.lock().last_position())
            .max_by(f64::total_cmp)
    }

    /// Resolve a `startAt` directive to an absolute position.
    ///
    /// `WallClockTime` is treated as an absolute media position; mapping
    /// wall-clock epochs to media time is the manifest parser's business
    /// and happens before this layer.
    #[must_use]
    pub fn resolve_start_at(&self, start_at: StartAt) -> Option<f64> {
        match start_at {
            StartAt::WallClockTime(at) | StartAt::Position(at) => Some(at),
            StartAt::FromFirstPosition(offset) => self.first_position().map(|f| f + offset),
            StartAt::FromLastPosition(offset) => self.last_position().map(|l| l - offset),
            StartAt::Percentage(pct) => {
                let first = self.first_position()?;
                let last = self.last_position()?;
                Some(first + (last - first) * (pct / 100.0))
            }
        }
    }
}

struct AdaptationIndexes {
    map: HashMap<String, SharedIndex>,
}

impl IndexResolver for AdaptationIndexes {
    fn index_for(&self, representation_id: &str) -> Option<SharedIndex> {
        self.map.get(representation_id).cloned()
    }
}
