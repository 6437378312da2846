// 该文件是 Duizhao （对照） 项目的一部分。
// src/compare/optimal.rs - 全局最优匹配
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

/// 基于匈牙利算法的匹配器。
///
/// 只有类别相同且 IoU 不低于阈值的配对才可选。在可选配对中，
/// 先最大化匹配数量，再最大化 IoU 之和。与贪心匹配的结果可能不同，
/// 需要显式选择。
#[derive(Debug, Clone, Copy)]
pub struct OptimalMatcher {
  iou_threshold: f64,
}

impl OptimalMatcher {
  pub fn new(iou_threshold: f64) -> Self {
    Self { iou_threshold }
  }

  fn eligible_iou(&self, reference: &DetectionSet, candidate: &DetectionSet) -> Vec<Vec<Option<f64>>> {
    reference
      .iter()
      .map(|rd| {
        candidate
          .iter()
          .map(|cd| {
            if cd.class_id != rd.class_id {
              return None;
            }
            let value = iou(rd, cd);
            (value > 0.0 && value >= self.iou_threshold).then_some(value)
          })
          .collect()
      })
      .collect()
  }
}

impl Matcher for OptimalMatcher {
  fn match_sets(&self, reference: &DetectionSet, candidate: &DetectionSet) -> MatchResult {
    let eligible = self.eligible_iou(reference, candidate);
    let n = reference.len().max(candidate.len());

    // 每个可选配对的收益为 bonus + IoU，bonus 大于任何 IoU 之和，保证数量优先
    let bonus = (n + 1) as f64;
    let cost: Vec<Vec<f64>> = (0..n)
      .map(|i| {
        (0..n)
          .map(|j| {
            let gain = eligible
              .get(i)
              .and_then(|row| row.get(j).copied().flatten())
              .map_or(0.0, |value| bonus + value);
            -gain
          })
          .collect()
      })
      .collect();

    let assignment = hungarian(&cost);

    let mut used = vec![false; candidate.len()];
    let mut matched = Vec::new();
    let mut unmatched_reference = Vec::new();
    for (ri, row) in eligible.iter().enumerate() {
      let ci = assignment[ri];
      match row.get(ci).copied().flatten() {
        Some(value) => {
          debug!("参考检测 {} 匹配候选检测 {}，IoU = {:.4}", ri, ci, value);
          used[ci] = true;
          matched.push(MatchedPair {
            reference: ri,
            candidate: ci,
            iou: value,
          });
        }
        None => unmatched_reference.push(ri),
      }
    }

    MatchResult::from_parts(matched, unmatched_reference, &used)
  }
}

/// 方阵最小代价完美匹配，返回每一行分配到的列
fn hungarian(cost: &[Vec<f64>]) -> Vec<usize> {
  let n = cost.len();
  let mut u = vec![0.0; n + 1];
  let mut v = vec![0.0; n + 1];
  // p[j]：分配到第 j 列的行（从 1 开始），0 表示未分配
  let mut p = vec![0usize; n + 1];
  let mut way = vec![0usize; n + 1];

  for i in 1..=n {
    p[0] = i;
    let mut j0 = 0;
    let mut minv = vec![f64::INFINITY; n + 1];
    let mut used = vec![false; n + 1];
    loop {
      used[j0] = true;
      let i0 = p[j0];
      let mut delta = f64::INFINITY;
      let mut j1 = 0;
      for j in 1..=n {
        if used[j] {
          continue;
        }
        let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
        if cur < minv[j] {
          minv[j] = cur;
          way[j] = j0;
        }
        if minv[j] < delta {
          delta = minv[j];
          j1 = j;
        }
      }
      for j in 0..=n {
        if used[j] {
          u[p[j]] += delta;
          v[j] -= delta;
        } else {
          minv[j] -= delta;
        }
      }
      j0 = j1;
      if p[j0] == 0 {
        break;
      }
    }
    loop {
      let j1 = way[j0];
      p[j0] = p[j1];
      j0 = j1;
      if j0 == 0 {
        break;
      }
    }
  }

  let mut assignment = vec![0usize; n];
  for j in 1..=n {
    if p[j] != 0 {
      assignment[p[j] - 1] = j - 1;
    }
  }
  assignment
}
