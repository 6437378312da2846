// 该文件是 Duizhao （对照） 项目的一部分。
// src/compare/greedy.rs - 贪心匹配
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

use tracing::debug;

use crate::{
  compare::{MatchResult, MatchedPair, Matcher},
  detection::{DetectionSet, iou},
};

/// 按参考集顺序逐个匹配的贪心匹配器。
///
/// 对每个参考检测，在尚未使用的同类候选检测中选出 IoU 最大者，
/// 只有严格更大时才替换，因此并列时先出现者胜出；IoU 为 0 的候选不参与。
/// 结果与输入顺序有关，但对相同输入是确定的；它不保证全局最优，
/// 多个参考检测争夺同一候选检测时可能得到次优配对。
#[derive(Debug, Clone, Copy)]
pub struct GreedyMatcher {
  iou_threshold: f64,
}

impl GreedyMatcher {
  pub fn new(iou_threshold: f64) -> Self {
    Self { iou_threshold }
  }
}

impl Matcher for GreedyMatcher {
  fn match_sets(&self, reference: &DetectionSet, candidate: &DetectionSet) -> MatchResult {
    let mut used = vec![false; candidate.len()];
    let mut matched = Vec::new();
    let mut unmatched_reference = Vec::new();

    for (ri, rd) in reference.iter().enumerate() {
      let mut best: Option<(usize, f64)> = None;
      for (ci, cd) in candidate.iter().enumerate() {
        if used[ci] || cd.class_id != rd.class_id {
          continue;
        }
        let value = iou(rd, cd);
        if value > best.map_or(0.0, |(_, best_iou)| best_iou) {
          best = Some((ci, value));
        }
      }

      match best {
        Some((ci, value)) if value >= self.iou_threshold => {
          debug!("参考检测 {} 匹配候选检测 {}，IoU = {:.4}", ri, ci, value);
          used[ci] = true;
          matched.push(MatchedPair {
            reference: ri,
            candidate: ci,
            iou: value,
          });
        }
        _ => unmatched_reference.push(ri),
      }
    }

    MatchResult::from_parts(matched, unmatched_reference, &used)
  }
}
