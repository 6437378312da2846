// 该文件是 Duizhao （对照） 项目的一部分。
// src/task.rs - 逐个模型的比对任务
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

use std::fmt::Display;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
  backend::{Backend, Exporter, InferRequest, ModelSpec, default_worklist},
  compare::{MatchStrategy, Matcher, Tolerance, judge},
  verdict::{ModelReport, RunReport, Verdict},
};

pub trait Task<E, R, C>: Sized {
  type Output;
  type Error;
  fn run_task(self, exporter: E, reference: R, candidate: C) -> Result<Self::Output, Self::Error>;
}

/// 依次对每个模型执行 导出 → 参考推理 → 待测推理 → 比对。
///
/// 单个模型的失败在本地转换为判定结果，不会中断后续模型。
/// 临时导出目录在任务结束时删除，包括提前返回的情况。
#[derive(Debug, Clone)]
pub struct ValidationTask {
  worklist: Vec<ModelSpec>,
  image: PathBuf,
  confidence: f64,
  tolerance: Tolerance,
  strategy: MatchStrategy,
}

impl ValidationTask {
  pub fn new(image: &Path, confidence: f64) -> Self {
    Self {
      worklist: default_worklist(),
      image: image.to_path_buf(),
      confidence,
      tolerance: Tolerance::default(),
      strategy: MatchStrategy::default(),
    }
  }

  pub fn with_worklist(mut self, worklist: Vec<ModelSpec>) -> Self {
    self.worklist = worklist;
    self
  }

  pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
    self.tolerance = tolerance;
    self
  }

  pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
    self.strategy = strategy;
    self
  }

  fn validate_model<E, R, C>(
    &self,
    model: &ModelSpec,
    export_dir: &Path,
    exporter: &E,
    reference: &R,
    candidate: &C,
    matcher: &dyn Matcher,
  ) -> Verdict
  where
    E: Exporter,
    E::Error: Display,
    R: Backend,
    R::Error: Display,
    C: Backend,
    C::Error: Display,
  {
    info!("正在导出 ONNX...");
    let model_path = match exporter.export(model, export_dir) {
      Ok(path) => path,
      Err(e) => {
        warn!("SKIP: 无法导出 {}: {}", model.weights, e);
        return Verdict::Skip {
          reason: e.to_string(),
        };
      }
    };
    info!("ONNX 路径: {}", model_path.display());

    let request = InferRequest {
      model: &model_path,
      image: &self.image,
      confidence: self.confidence,
    };

    info!("正在运行参考推理...");
    let reference_output = match reference.infer(&request) {
      Ok(output) => output,
      Err(e) => {
        error!("参考推理失败: {}", e);
        return Verdict::ReferenceError {
          reason: e.to_string(),
        };
      }
    };

    info!("正在运行待测推理...");
    let candidate_output = match candidate.infer(&request) {
      Ok(output) => output,
      Err(e) => {
        error!("待测推理失败: {}", e);
        return Verdict::CandidateError {
          reason: e.to_string(),
        };
      }
    };

    info!(
      "参考检测数: {}，待测检测数: {}，待测版本: {}",
      reference_output.detections.len(),
      candidate_output.detections.len(),
      candidate_output.version
    );

    let match_result = matcher.match_sets(&reference_output.detections, &candidate_output.detections);
    let judgement = judge(
      &reference_output.detections,
      &candidate_output.detections,
      match_result,
      &self.tolerance,
    );

    Verdict::Judged {
      reference_version: reference_output.version,
      candidate_version: candidate_output.version,
      judgement,
    }
  }
}

impl<E, R, C> Task<E, R, C> for ValidationTask
where
  E: Exporter,
  E::Error: Display,
  R: Backend,
  R::Error: Display,
  C: Backend,
  C::Error: Display,
{
  type Output = RunReport;
  type Error = anyhow::Error;

  fn run_task(self, exporter: E, reference: R, candidate: C) -> Result<Self::Output, Self::Error> {
    info!(
      "开始任务: {} 个模型，匹配策略 {}",
      self.worklist.len(),
      self.strategy
    );
    if self.strategy != MatchStrategy::Greedy {
      warn!("使用非默认匹配策略 {}，结果可能与贪心匹配不同", self.strategy);
    }

    let export_dir = tempfile::Builder::new()
      .prefix("duizhao-export-")
      .tempdir()
      .context("无法创建临时导出目录")?;
    let matcher = self.strategy.matcher(&self.tolerance);

    let mut models = Vec::with_capacity(self.worklist.len());
    for model in &self.worklist {
      info!("模型: {}", model);
      let verdict = self.validate_model(
        model,
        export_dir.path(),
        &exporter,
        &reference,
        &candidate,
        matcher.as_ref(),
      );
      info!("{} >> {}", model.name, verdict.label());
      models.push(ModelReport {
        model: model.clone(),
        verdict,
      });
    }

    if let Err(e) = export_dir.close() {
      warn!("清理临时导出目录失败: {}", e);
    }

    info!("任务完成，退出");
    Ok(RunReport {
      generated_at: Utc::now(),
      image: self.image,
      confidence_threshold: self.confidence,
      tolerance: self.tolerance,
      strategy: self.strategy,
      models,
    })
  }
}
