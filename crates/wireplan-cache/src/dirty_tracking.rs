//! 髒標記追蹤

use std::collections::BTreeSet;

/// 髒標記追蹤器（依鍵排序，迭代順序穩定）
#[derive(Debug, Clone)]
pub struct DirtyTracker<K: Ord + Clone = String> {
    dirty: BTreeSet<K>,
}

impl<K: Ord + Clone> DirtyTracker<K> {
    /// 創建新的追蹤器
    pub fn new() -> Self {
        Self {
            dirty: BTreeSet::new(),
        }
    }

    /// 標記為髒
    pub fn mark_dirty(&mut self, key: K) {
        self.dirty.insert(key);
    }

    /// 檢查是否為髒
    pub fn is_dirty(&self, key: &K) -> bool {
        self.dirty.contains(key)
    }

    /// 清除所有髒標記
    pub fn clear(&mut self) {
        self.dirty.clear();
    }

    /// 取出並清除所有髒鍵
    pub fn drain(&mut self) -> Vec<K> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dirty.len()
    }
}

impl<K: Ord + Clone> Default for DirtyTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_drain() {
        let mut tracker: DirtyTracker = DirtyTracker::new();
        tracker.mark_dirty("B02".to_string());
        tracker.mark_dirty("B01".to_string());
        tracker.mark_dirty("B02".to_string());

        assert!(tracker.is_dirty(&"B01".to_string()));
        assert_eq!(tracker.len(), 2);
        // 依鍵排序取出
        assert_eq!(tracker.drain(), vec!["B01".to_string(), "B02".to_string()]);
        assert!(tracker.is_empty());
    }
}
