//! 结果汇总
//!
//! 按提交位置预留固定数量的槽位，任务完成顺序任意，输出顺序总是提交顺序。

use crate::error::OrchestratorError;
use crate::models::outcome::JobOutcome;

/// 结果汇总器
#[derive(Debug)]
pub struct ResultAggregator {
    slots: Vec<Option<JobOutcome>>,
    filled: usize,
}

impl ResultAggregator {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
            filled: 0,
        }
    }

    /// 写入第 index 个任务的结果，每个位置只能写一次
    pub fn insert(&mut self, index: usize, outcome: JobOutcome) -> Result<(), OrchestratorError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(OrchestratorError::SlotOutOfRange { index, len })?;
        if slot.is_some() {
            return Err(OrchestratorError::DuplicateOutcome { index });
        }
        *slot = Some(outcome);
        self.filled += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// 给仍然为空的位置补上结果
    pub fn fill_missing(&mut self, mut make: impl FnMut(usize) -> JobOutcome) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(make(index));
                self.filled += 1;
            }
        }
    }

    /// 按提交顺序取出全部结果
    ///
    /// 未填满时先调用 `fill_missing`，否则缺失的位置会被跳过。
    pub fn into_outcomes(self) -> Vec<JobOutcome> {
        self.slots.into_iter().flatten().collect()
    }
}
