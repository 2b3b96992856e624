use std::collections::VecDeque;

use crate::asset::{AssetDescriptor, PlacementArgs};

/// One pending append: the asset and the placements it was requested with
#[derive(Debug, Clone, PartialEq)]
pub struct AppendTask {
    pub asset: AssetDescriptor,
    pub args: PlacementArgs,
}

impl AppendTask {
    pub fn new(asset: AssetDescriptor, args: PlacementArgs) -> Self {
        Self { asset, args }
    }
}

/// FIFO of append tasks with a single consumer
#[derive(Debug, Default)]
pub struct AppendQueue {
    tasks: VecDeque<AppendTask>,
}

impl AppendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: AppendTask) {
        self.tasks.push_back(task);
    }

    pub fn pop(&mut self) -> Option<AppendTask> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AppendTask> {
        self.tasks.iter()
    }

    /// Drop every pending task for `view_id`. Returns how many were dropped.
    pub fn evict(&mut self, view_id: &str) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.asset.view_id != view_id);
        before - self.tasks.len()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}
