// 该文件是 Duizhao （对照） 项目的一部分。
// src/verdict.rs - 单个模型的判定与整次运行的汇总
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

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  backend::ModelSpec,
  compare::{Judgement, MatchStrategy, Tolerance},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
  Pass,
  Fail,
  Skip,
}

impl std::fmt::Display for Status {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Status::Pass => write!(f, "PASS"),
      Status::Fail => write!(f, "FAIL"),
      Status::Skip => write!(f, "SKIP"),
    }
  }
}

/// 单个模型的判定，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
  /// 导出器无法提供该模型
  Skip { reason: String },
  /// 参考推理失败
  ReferenceError { reason: String },
  /// 待测程序崩溃、超时或输出无法解析
  CandidateError { reason: String },
  /// 两端结果经过匹配与判定
  Judged {
    reference_version: String,
    candidate_version: String,
    judgement: Judgement,
  },
}

impl Verdict {
  pub fn status(&self) -> Status {
    match self {
      Verdict::Skip { .. } => Status::Skip,
      Verdict::ReferenceError { .. } | Verdict::CandidateError { .. } => Status::Fail,
      Verdict::Judged { judgement, .. } if judgement.passed() => Status::Pass,
      Verdict::Judged { .. } => Status::Fail,
    }
  }

  /// 是否真正完成了比对
  pub fn is_tested(&self) -> bool {
    matches!(self, Verdict::Judged { .. })
  }

  /// 汇总表中的标签
  pub fn label(&self) -> String {
    match self {
      Verdict::ReferenceError { .. } => "FAIL (reference error)".to_string(),
      Verdict::CandidateError { .. } => "FAIL (candidate error)".to_string(),
      _ => self.status().to_string(),
    }
  }

  pub fn summary(&self) -> String {
    match self {
      Verdict::Skip { reason } => format!("模型不可用: {}", reason),
      Verdict::ReferenceError { reason } => format!("参考推理失败: {}", reason),
      Verdict::CandidateError { reason } => format!("待测程序失败: {}", reason),
      Verdict::Judged { judgement, .. } => judgement.summary(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelReport {
  pub model: ModelSpec,
  pub verdict: Verdict,
}

/// 整次运行的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
  AllPassed { tested: usize },
  SomeFailed { failed: usize },
  NothingTested,
}

/// 整次运行的汇总，只读
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
  pub generated_at: DateTime<Utc>,
  pub image: PathBuf,
  pub confidence_threshold: f64,
  pub tolerance: Tolerance,
  pub strategy: MatchStrategy,
  pub models: Vec<ModelReport>,
}

impl RunReport {
  pub fn tested(&self) -> usize {
    self.models.iter().filter(|m| m.verdict.is_tested()).count()
  }

  pub fn failed(&self) -> usize {
    self
      .models
      .iter()
      .filter(|m| m.verdict.status() == Status::Fail)
      .count()
  }

  pub fn skipped(&self) -> usize {
    self
      .models
      .iter()
      .filter(|m| m.verdict.status() == Status::Skip)
      .count()
  }

  /// 至少一个模型完成比对且没有任何失败才算通过
  pub fn outcome(&self) -> RunOutcome {
    let tested = self.tested();
    let failed = self.failed();
    if tested == 0 {
      RunOutcome::NothingTested
    } else if failed > 0 {
      RunOutcome::SomeFailed { failed }
    } else {
      RunOutcome::AllPassed { tested }
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self.outcome(), RunOutcome::AllPassed { .. })
  }

  pub fn exit_code(&self) -> ExitCode {
    if self.is_success() {
      ExitCode::SUCCESS
    } else {
      ExitCode::FAILURE
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compare::{GreedyMatcher, Matcher, judge};
  use crate::detection::{BoundingBox, Detection, DetectionSet};

  fn judged(pass: bool) -> Verdict {
    let reference: DetectionSet =
      vec![Detection::new(0, 0.9, BoundingBox::new(0.0, 0.0, 0.5, 0.5))].into();
    let candidate: DetectionSet = if pass {
      reference.clone()
    } else {
      DetectionSet::default()
    };
    let tolerance = Tolerance::default();
    let result = GreedyMatcher::new(0.5).match_sets(&reference, &candidate);
    Verdict::Judged {
      reference_version: "ultralytics-8.3.0".to_string(),
      candidate_version: "V8".to_string(),
      judgement: judge(&reference, &candidate, result, &tolerance),
    }
  }

  fn report(verdicts: Vec<Verdict>) -> RunReport {
    RunReport {
      generated_at: Utc::now(),
      image: PathBuf::from("bus.jpg"),
      confidence_threshold: 0.25,
      tolerance: Tolerance::default(),
      strategy: MatchStrategy::Greedy,
      models: verdicts
        .into_iter()
        .enumerate()
        .map(|(i, verdict)| ModelReport {
          model: ModelSpec::new(&format!("m{}.pt", i), &format!("M{}", i)),
          verdict,
        })
        .collect(),
    }
  }

  fn skip() -> Verdict {
    Verdict::Skip {
      reason: "no weights".to_string(),
    }
  }

  #[test]
  fn labels_match_summary_table() {
    assert_eq!(skip().label(), "SKIP");
    assert_eq!(judged(true).label(), "PASS");
    assert_eq!(judged(false).label(), "FAIL");
    assert_eq!(
      Verdict::CandidateError {
        reason: "exit 1".to_string()
      }
      .label(),
      "FAIL (candidate error)"
    );
    assert_eq!(
      Verdict::ReferenceError {
        reason: "boom".to_string()
      }
      .status(),
      Status::Fail
    );
  }

  #[test]
  fn all_skipped_is_not_a_success() {
    let report = report(vec![skip(), skip()]);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.skipped(), 2);
    assert_eq!(report.outcome(), RunOutcome::NothingTested);
    assert!(!report.is_success());
  }

  #[test]
  fn candidate_errors_do_not_count_as_tested() {
    let report = report(vec![
      Verdict::CandidateError {
        reason: "timeout".to_string(),
      },
      skip(),
    ]);
    assert_eq!(report.tested(), 0);
    assert_eq!(report.outcome(), RunOutcome::NothingTested);
  }

  #[test]
  fn any_failure_fails_the_run() {
    let report = report(vec![
      judged(true),
      Verdict::CandidateError {
        reason: "exit 1".to_string(),
      },
      skip(),
    ]);
    assert_eq!(report.tested(), 1);
    assert_eq!(report.outcome(), RunOutcome::SomeFailed { failed: 1 });
    assert!(!report.is_success());
  }

  #[test]
  fn passing_models_with_skips_succeed() {
    let report = report(vec![judged(true), skip(), judged(true)]);
    assert_eq!(report.outcome(), RunOutcome::AllPassed { tested: 2 });
    assert!(report.is_success());
  }
}
