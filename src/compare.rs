// 该文件是 Duizhao （对照） 项目的一部分。
// src/compare.rs - 检测结果匹配与容差判定
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use serde::Serialize;
use thiserror::Error;

use crate::detection::DetectionSet;

/// 默认 IoU 阈值
pub const IOU_THRESHOLD: f64 = 0.5;
/// 默认置信度容差
pub const CONFIDENCE_TOLERANCE: f64 = 0.05;
/// 默认匹配率阈值
pub const MATCH_RATE_THRESHOLD: f64 = 0.90;

#[derive(Error, Debug, PartialEq)]
pub enum ToleranceError {
  #[error("{name} 必须位于 [0, 1] 区间，实际为 {value}")]
  OutOfRange { name: &'static str, value: f64 },
}

/// 判定所用的全部阈值，显式传入匹配器和判定器
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tolerance {
  pub iou_threshold: f64,
  pub confidence_tolerance: f64,
  pub match_rate_threshold: f64,
}

impl Default for Tolerance {
  fn default() -> Self {
    Self {
      iou_threshold: IOU_THRESHOLD,
      confidence_tolerance: CONFIDENCE_TOLERANCE,
      match_rate_threshold: MATCH_RATE_THRESHOLD,
    }
  }
}

impl Tolerance {
  pub fn with_iou_threshold(mut self, value: f64) -> Self {
    self.iou_threshold = value;
    self
  }

  pub fn with_confidence_tolerance(mut self, value: f64) -> Self {
    self.confidence_tolerance = value;
    self
  }

  pub fn with_match_rate_threshold(mut self, value: f64) -> Self {
    self.match_rate_threshold = value;
    self
  }

  pub fn validate(self) -> Result<Self, ToleranceError> {
    for (name, value) in [
      ("IoU 阈值", self.iou_threshold),
      ("置信度容差", self.confidence_tolerance),
      ("匹配率阈值", self.match_rate_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ToleranceError::OutOfRange { name, value });
      }
    }
    Ok(self)
  }
}

/// 一对匹配成功的检测：参考集下标、候选集下标及其 IoU
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchedPair {
  pub reference: usize,
  pub candidate: usize,
  pub iou: f64,
}

/// 一次匹配的结果。
///
/// 参考集的每个下标恰好出现在 `matched` 或 `unmatched_reference` 之一，
/// 候选集同理；每个匹配对的 IoU 不低于阈值且类别相同。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchResult {
  pub matched: Vec<MatchedPair>,
  pub unmatched_reference: Vec<usize>,
  pub unmatched_candidate: Vec<usize>,
}

impl MatchResult {
  /// 根据候选集的使用标记补齐未匹配的候选下标
  pub(crate) fn from_parts(
    matched: Vec<MatchedPair>,
    unmatched_reference: Vec<usize>,
    used_candidate: &[bool],
  ) -> Self {
    let unmatched_candidate = used_candidate
      .iter()
      .enumerate()
      .filter_map(|(index, &used)| (!used).then_some(index))
      .collect();
    Self {
      matched,
      unmatched_reference,
      unmatched_candidate,
    }
  }
}

pub trait Matcher {
  fn match_sets(&self, reference: &DetectionSet, candidate: &DetectionSet) -> MatchResult;
}

mod greedy;
mod judge;
mod optimal;

pub use self::greedy::GreedyMatcher;
pub use self::judge::{
  ConfidenceMismatch, DIAGNOSTIC_EXAMPLES, IndexedDetection, JudgeStatus, Judgement, judge,
};
pub use self::optimal::OptimalMatcher;

/// 匹配策略。默认使用贪心匹配；全局最优匹配需要显式选择。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
  #[default]
  Greedy,
  Optimal,
}

impl MatchStrategy {
  pub fn matcher(self, tolerance: &Tolerance) -> Box<dyn Matcher> {
    match self {
      MatchStrategy::Greedy => Box::new(GreedyMatcher::new(tolerance.iou_threshold)),
      MatchStrategy::Optimal => Box::new(OptimalMatcher::new(tolerance.iou_threshold)),
    }
  }
}

impl std::fmt::Display for MatchStrategy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      MatchStrategy::Greedy => write!(f, "greedy"),
      MatchStrategy::Optimal => write!(f, "optimal"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_tolerance_uses_documented_constants() {
    let tolerance = Tolerance::default();
    assert_eq!(tolerance.iou_threshold, 0.5);
    assert_eq!(tolerance.confidence_tolerance, 0.05);
    assert_eq!(tolerance.match_rate_threshold, 0.90);
    assert!(tolerance.validate().is_ok());
  }

  #[test]
  fn tolerance_rejects_out_of_range_values() {
    let err = Tolerance::default()
      .with_match_rate_threshold(1.5)
      .validate()
      .unwrap_err();
    assert!(matches!(err, ToleranceError::OutOfRange { value, .. } if value == 1.5));
    assert!(
      Tolerance::default()
        .with_iou_threshold(-0.1)
        .validate()
        .is_err()
    );
  }

  #[test]
  fn unmatched_candidates_come_from_unused_flags() {
    let result = MatchResult::from_parts(Vec::new(), vec![0], &[true, false, false]);
    assert_eq!(result.unmatched_candidate, vec![1, 2]);
    assert_eq!(result.unmatched_reference, vec![0]);
  }
}
