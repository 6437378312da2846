// 该文件是 Duizhao （对照） 项目的一部分。
// src/backend/record.rs - 后端输出记录解析
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

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{
  backend::BackendOutput,
  detection::{Detection, DetectionError, DetectionSet},
};

#[derive(Error, Debug)]
pub enum RecordError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("第 {index} 个检测无效: {source}")]
  InvalidDetection {
    index: usize,
    #[source]
    source: DetectionError,
  },
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DetectionRecord {
  class_id: i64,
  confidence: f64,
  x: f64,
  y: f64,
  width: f64,
  height: f64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Record {
  version: String,
  #[serde(default)]
  model: Option<String>,
  #[serde(default)]
  end_to_end: Option<bool>,
  #[serde(default)]
  num_classes: Option<u32>,
  detections: Vec<DetectionRecord>,
}

/// 解析后端输出的 JSON 记录。
///
/// 记录必须包含 `version` 与 `detections`，每个检测包含 `classId`、
/// `confidence` 以及归一化的 `x`、`y`、`width`、`height`。
pub fn parse_record(text: &str) -> Result<BackendOutput, RecordError> {
  let record: Record = serde_json::from_str(text)?;
  if let Some(model) = &record.model {
    debug!("记录来自模型: {}", model);
  }

  let detections = record
    .detections
    .into_iter()
    .enumerate()
    .map(|(index, d)| {
      Detection::validated(d.class_id, d.confidence, d.x, d.y, d.width, d.height)
        .map_err(|source| RecordError::InvalidDetection { index, source })
    })
    .collect::<Result<Vec<_>, _>>()?;

  Ok(BackendOutput {
    version: record.version,
    end_to_end: record.end_to_end,
    num_classes: record.num_classes,
    detections: DetectionSet::from(detections),
  })
}

/// 从文件读取记录
pub fn read_record(path: &Path) -> Result<BackendOutput, RecordError> {
  let text = std::fs::read_to_string(path)?;
  parse_record(&text)
}
