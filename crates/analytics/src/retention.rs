// Copyright (C) 2025-present The tripstream Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::ConfigError;
use std::{collections::VecDeque, sync::Arc};

/// Fixed capacity FIFO of the most recent results of an aggregator.
///
/// Items are kept behind an [`Arc`] so a snapshot shares them with the buffer
/// instead of copying, and stays valid while further items are pushed.
#[derive(Debug, Clone)]
pub struct RetentionBuffer<T> {
    items: VecDeque<Arc<T>>,
    capacity: usize,
}

impl<T> RetentionBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            items: VecDeque::new(),
            capacity,
        })
    }

    /// Buffer retaining only the latest item
    pub fn single() -> Self {
        Self {
            items: VecDeque::with_capacity(1),
            capacity: 1,
        }
    }

    /// Appends an item, dropping the oldest one when the buffer is full
    pub fn push(&mut self, item: T) {
        self.push_shared(Arc::new(item));
    }

    /// Appends an item already shared with the caller
    pub fn push_shared(&mut self, item: Arc<T>) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// The retained items, oldest first
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.items.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Arc<T>> {
        self.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity() {
        assert!(matches!(
            RetentionBuffer::<u32>::new(0),
            Err(ConfigError::ZeroCapacity)
        ));
    }

    #[test]
    fn test_evicts_oldest() {
        let mut buffer = RetentionBuffer::new(2).unwrap();
        buffer.push("A");
        buffer.push("B");
        buffer.push("C");
        let snapshot: Vec<_> = buffer.snapshot().into_iter().map(|x| *x).collect();
        assert_eq!(snapshot, vec!["B", "C"]);
        assert_eq!(buffer.latest().map(|x| **x), Some("C"));
    }

    #[test]
    fn test_keeps_last_capacity_items() {
        let capacity = 5;
        let mut buffer = RetentionBuffer::new(capacity).unwrap();
        for i in 0..23u32 {
            buffer.push(i);
            assert!(buffer.len() <= capacity);
        }
        let snapshot: Vec<u32> = buffer.snapshot().into_iter().map(|x| *x).collect();
        assert_eq!(snapshot, vec![18, 19, 20, 21, 22]);
        assert_eq!(buffer.capacity(), capacity);
    }

    #[test]
    fn test_fewer_items_than_capacity() {
        let mut buffer = RetentionBuffer::new(3).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.latest(), None);
        buffer.push(1u8);
        buffer.push(2u8);
        let snapshot: Vec<u8> = buffer.iter().map(|x| **x).collect();
        assert_eq!(snapshot, vec![1, 2]);
    }

    #[test]
    fn test_snapshot_is_independent_of_later_pushes() {
        let mut buffer = RetentionBuffer::new(2).unwrap();
        buffer.push(String::from("first"));
        let snapshot = buffer.snapshot();
        buffer.push(String::from("second"));
        buffer.push(String::from("third"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].as_str(), "first");
        assert_eq!(buffer.snapshot().len(), 2);
    }

    #[test]
    fn test_single() {
        let mut buffer = RetentionBuffer::single();
        buffer.push(1i32);
        buffer.push(2i32);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.snapshot(), vec![Arc::new(2)]);
    }
}
