// 该文件是 Duizhao （对照） 项目的一部分。
// src/compare/judge.rs - 容差判定
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

use crate::{
  compare::{MatchResult, Tolerance},
  detection::{Detection, DetectionSet},
};

/// 诊断信息中每类问题最多列出的条目数
pub const DIAGNOSTIC_EXAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JudgeStatus {
  Pass,
  Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceMismatch {
  pub reference: usize,
  pub candidate: usize,
  pub reference_confidence: f64,
  pub candidate_confidence: f64,
}

impl ConfidenceMismatch {
  pub fn difference(&self) -> f64 {
    (self.reference_confidence - self.candidate_confidence).abs()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndexedDetection {
  pub index: usize,
  pub detection: Detection,
}

/// 一次比对的判定结果，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Judgement {
  pub status: JudgeStatus,
  pub reference_count: usize,
  pub candidate_count: usize,
  /// 参考集为空时没有匹配率
  pub match_rate: Option<f64>,
  pub match_result: MatchResult,
  pub confidence_mismatches: Vec<ConfidenceMismatch>,
  pub unmatched_reference: Vec<IndexedDetection>,
  pub extra_candidate: Vec<IndexedDetection>,
  pub tolerance: Tolerance,
}

/// 根据匹配结果与容差给出判定。
///
/// 参考集为空时直接通过。否则要求匹配率不低于阈值，且所有匹配对的
/// 置信度差不超过容差。多出的候选检测只用于诊断，不影响判定。
pub fn judge(
  reference: &DetectionSet,
  candidate: &DetectionSet,
  match_result: MatchResult,
  tolerance: &Tolerance,
) -> Judgement {
  let confidence_mismatches: Vec<ConfidenceMismatch> = match_result
    .matched
    .iter()
    .map(|pair| ConfidenceMismatch {
      reference: pair.reference,
      candidate: pair.candidate,
      reference_confidence: reference[pair.reference].confidence,
      candidate_confidence: candidate[pair.candidate].confidence,
    })
    .filter(|mismatch| mismatch.difference() > tolerance.confidence_tolerance)
    .collect();

  let unmatched_reference = collect_indexed(reference, &match_result.unmatched_reference);
  let extra_candidate = collect_indexed(candidate, &match_result.unmatched_candidate);

  let (status, match_rate) = if reference.is_empty() {
    (JudgeStatus::Pass, None)
  } else {
    let rate = match_result.matched.len() as f64 / reference.len() as f64;
    let passed = rate >= tolerance.match_rate_threshold && confidence_mismatches.is_empty();
    let status = if passed {
      JudgeStatus::Pass
    } else {
      JudgeStatus::Fail
    };
    (status, Some(rate))
  };

  Judgement {
    status,
    reference_count: reference.len(),
    candidate_count: candidate.len(),
    match_rate,
    match_result,
    confidence_mismatches,
    unmatched_reference,
    extra_candidate,
    tolerance: *tolerance,
  }
}

fn collect_indexed(set: &DetectionSet, indices: &[usize]) -> Vec<IndexedDetection> {
  indices
    .iter()
    .filter_map(|&index| {
      set.get(index).map(|&detection| IndexedDetection { index, detection })
    })
    .collect()
}

impl Judgement {
  pub fn passed(&self) -> bool {
    self.status == JudgeStatus::Pass
  }

  /// 一行结论
  pub fn summary(&self) -> String {
    let Some(rate) = self.match_rate else {
      return if self.candidate_count == 0 {
        "两端均为 0 个检测".to_string()
      } else {
        format!(
          "参考端 0 个检测，候选端 {} 个（无可比对的参考）",
          self.candidate_count
        )
      };
    };

    let mut problems = Vec::new();
    if rate < self.tolerance.match_rate_threshold {
      problems.push(format!(
        "匹配率 {:.1}% 低于 {:.1}%",
        rate * 100.0,
        self.tolerance.match_rate_threshold * 100.0
      ));
    }
    if !self.confidence_mismatches.is_empty() {
      problems.push(format!(
        "{} 对置信度差超过 {}",
        self.confidence_mismatches.len(),
        self.tolerance.confidence_tolerance
      ));
    }

    if problems.is_empty() {
      format!("匹配率 {:.1}%，置信度均在容差内", rate * 100.0)
    } else {
      problems.join("；")
    }
  }

  /// 供人工排查的诊断信息，每类问题最多列出 [`DIAGNOSTIC_EXAMPLES`] 条，
  /// 不影响判定结果
  pub fn diagnostics(&self) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(rate) = self.match_rate {
      lines.push(format!(
        "匹配: {}/{} ({:.1}%)",
        self.match_result.matched.len(),
        self.reference_count,
        rate * 100.0
      ));
    }

    if !self.confidence_mismatches.is_empty() {
      lines.push(format!(
        "置信度不一致 ({}):",
        self.confidence_mismatches.len()
      ));
      for m in self.confidence_mismatches.iter().take(DIAGNOSTIC_EXAMPLES) {
        lines.push(format!(
          "  ref[{}]={:.4} vs cand[{}]={:.4} (差值={:.4})",
          m.reference,
          m.reference_confidence,
          m.candidate,
          m.candidate_confidence,
          m.difference()
        ));
      }
    }

    if !self.unmatched_reference.is_empty() {
      lines.push(format!(
        "未匹配的参考检测 ({}):",
        self.unmatched_reference.len()
      ));
      lines.extend(describe(&self.unmatched_reference));
    }

    if !self.extra_candidate.is_empty() {
      lines.push(format!("多出的候选检测 ({}):", self.extra_candidate.len()));
      lines.extend(describe(&self.extra_candidate));
    }

    lines
  }
}

fn describe(items: &[IndexedDetection]) -> impl Iterator<Item = String> + '_ {
  items.iter().take(DIAGNOSTIC_EXAMPLES).map(|item| {
    format!(
      "  [{}] class={} conf={:.4}",
      item.index, item.detection.class_id, item.detection.confidence
    )
  })
}
