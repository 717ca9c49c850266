use dashmap::DashMap;
use uuid::Uuid;

/// Application namespace for name-based surrogate UUIDs.
///
/// Fixed forever: changing it would break cross-run surrogate stability.
pub const SURROGATE_NAMESPACE: Uuid = Uuid::from_u128(0x8f14_1a6e_2b3c_4d5e_9f10_6a7b_8c9d_0e1f);

/// Deterministic `(original, category) → surrogate` mapping.
///
/// The surrogate is the canonical hyphenated text form of
/// `uuidv5(SURROGATE_NAMESPACE, lower(original) + "_" + category)`. The key
/// is lowercased so occurrences differing only by case share one surrogate.
/// A process-local concurrent cache memoises results and doubles as the
/// binding table the report builder reads; the mapping itself is a pure
/// function, so no persistence is needed for determinism.
#[derive(Debug, Default)]
pub struct SurrogateMapper {
    bindings: DashMap<(String, String), String>,
}

impl SurrogateMapper {
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
        }
    }

    /// Return the surrogate for `(original, category)`, computing and caching
    /// it on first use. Idempotent within and across processes.
    pub fn uuid_for(&self, original: &str, category: &str) -> String {
        let key = (original.to_lowercase(), category.to_string());
        if let Some(hit) = self.bindings.get(&key) {
            return hit.value().clone();
        }
        let name = format!("{}_{}", key.0, category);
        let uuid = Uuid::new_v5(&SURROGATE_NAMESPACE, name.as_bytes()).to_string();
        // Racing inserts compute identical values.
        self.bindings.entry(key).or_insert_with(|| uuid.clone());
        uuid
    }

    /// Number of distinct bindings seen by this process.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Snapshot of all bindings as `((lowered original, category), uuid)`,
    /// sorted by key for deterministic consumption.
    pub fn snapshot(&self) -> Vec<((String, String), String)> {
        let mut out: Vec<_> = self
            .bindings
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        out.sort();
        out
    }
}
