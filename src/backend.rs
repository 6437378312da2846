// 该文件是 Duizhao （对照） 项目的一部分。
// src/backend.rs - 推理后端与模型导出接口
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

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::detection::DetectionSet;

/// 待测模型：权重名称与展示名称
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
  pub weights: String,
  pub name: String,
}

impl ModelSpec {
  pub fn new(weights: &str, name: &str) -> Self {
    Self {
      weights: weights.to_string(),
      name: name.to_string(),
    }
  }
}

/// 解析 `WEIGHTS[=NAME]`，省略名称时使用权重文件名去掉扩展名
impl FromStr for ModelSpec {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (weights, name) = match s.split_once('=') {
      Some((weights, name)) => (weights.trim(), name.trim()),
      None => {
        let weights = s.trim();
        let stem = Path::new(weights)
          .file_stem()
          .and_then(|stem| stem.to_str())
          .unwrap_or(weights);
        (weights, stem)
      }
    };
    if weights.is_empty() || name.is_empty() {
      return Err(format!("无效的模型描述: '{}'", s));
    }
    Ok(ModelSpec::new(weights, name))
  }
}

impl std::fmt::Display for ModelSpec {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} ({})", self.name, self.weights)
  }
}

/// 默认的待测模型列表
pub fn default_worklist() -> Vec<ModelSpec> {
  vec![
    ModelSpec::new("yolov5nu.pt", "YOLOv5n"),
    ModelSpec::new("yolov8n.pt", "YOLOv8n"),
    ModelSpec::new("yolo11n.pt", "YOLO11n"),
    ModelSpec::new("yolo26n.pt", "YOLO26n"),
  ]
}

/// 一次推理请求，参考端与候选端使用完全相同的输入
#[derive(Debug, Clone, Copy)]
pub struct InferRequest<'a> {
  pub model: &'a Path,
  pub image: &'a Path,
  pub confidence: f64,
}

/// 后端输出的结构化记录
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendOutput {
  pub version: String,
  pub end_to_end: Option<bool>,
  pub num_classes: Option<u32>,
  pub detections: DetectionSet,
}

/// 推理后端。参考实现与待测实现都通过该接口提供检测结果。
pub trait Backend {
  type Error;

  fn infer(&self, request: &InferRequest<'_>) -> Result<BackendOutput, Self::Error>;
}

/// 模型导出器，把权重导出为 ONNX 文件并放入 `export_dir`。
/// 任何失败都被视为该模型不可用。
pub trait Exporter {
  type Error;

  fn export(&self, model: &ModelSpec, export_dir: &Path) -> Result<PathBuf, Self::Error>;
}

impl<T: Backend + ?Sized> Backend for &T {
  type Error = T::Error;

  fn infer(&self, request: &InferRequest<'_>) -> Result<BackendOutput, Self::Error> {
    (**self).infer(request)
  }
}

impl<T: Exporter + ?Sized> Exporter for &T {
  type Error = T::Error;

  fn export(&self, model: &ModelSpec, export_dir: &Path) -> Result<PathBuf, Self::Error> {
    (**self).export(model, export_dir)
  }
}

mod process;
mod record;
mod ultralytics;

pub use self::process::{ProcessBackend, ProcessError, ProcessOutput, run_with_deadline};
pub use self::record::{RecordError, parse_record, read_record};
pub use self::ultralytics::{UltralyticsError, UltralyticsExporter, UltralyticsReference};
