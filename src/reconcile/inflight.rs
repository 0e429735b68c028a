use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Conversation ids currently being fetched, shared by every pass of one
/// reconciler so overlapping passes never fetch the same id twice.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an id for fetching. `None` if another pass already holds it.
    /// The claim is released when the returned guard is dropped.
    pub fn try_claim(&self, id: &str) -> Option<InFlightGuard> {
        if !self.ids.lock().insert(id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: self.clone(),
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }
}

/// Exclusive claim on one in-flight id
#[derive(Debug)]
pub struct InFlightGuard {
    set: InFlightSet,
    id: String,
}

impl InFlightGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.ids.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive() {
        let set = InFlightSet::new();
        let guard = set.try_claim("c1").unwrap();

        assert!(set.contains("c1"));
        assert!(set.try_claim("c1").is_none());
        assert_eq!(guard.id(), "c1");
    }

    #[test]
    fn test_drop_releases_claim() {
        let set = InFlightSet::new();
        {
            let _guard = set.try_claim("c1").unwrap();
            assert_eq!(set.len(), 1);
        }
        assert!(set.is_empty());
        assert!(set.try_claim("c1").is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let set = InFlightSet::new();
        let other = set.clone();

        let _guard = set.try_claim("c1").unwrap();
        assert!(other.try_claim("c1").is_none());
        assert!(other.try_claim("c2").is_some());
    }
}
