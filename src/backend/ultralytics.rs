// 该文件是 Duizhao （对照） 项目的一部分。
// src/backend/ultralytics.rs - Ultralytics 导出与参考推理
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

//! 通过 Python 解释器调用 Ultralytics 包。
//!
//! 两个脚本都把包内部的打印重定向到标准错误，标准输出只保留结果：
//! 导出脚本输出 ONNX 文件路径，推理脚本输出与待测程序相同格式的 JSON 记录。

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::backend::{
  Backend, BackendOutput, Exporter, InferRequest, ModelSpec, ProcessError, RecordError,
  parse_record, run_with_deadline,
};

const EXPORT_SCRIPT: &str = r#"
import contextlib
import sys
from pathlib import Path

with contextlib.redirect_stdout(sys.stderr):
    from ultralytics import YOLO

    weights, export_dir, imgsz = sys.argv[1], Path(sys.argv[2]), int(sys.argv[3])
    src = Path(YOLO(weights).export(format="onnx", imgsz=imgsz))
    dst = export_dir / src.name
    if src.resolve() != dst.resolve():
        src.replace(dst)

print(dst)
"#;

const PREDICT_SCRIPT: &str = r#"
import contextlib
import json
import sys

with contextlib.redirect_stdout(sys.stderr):
    import ultralytics
    from ultralytics import YOLO

    model_path, image_path, conf = sys.argv[1], sys.argv[2], float(sys.argv[3])
    results = YOLO(model_path).predict(image_path, conf=conf, verbose=False)

    detections = []
    for result in results:
        img_h, img_w = result.orig_shape
        for box in result.boxes:
            x1, y1, x2, y2 = box.xyxy[0].tolist()
            detections.append({
                "classId": int(box.cls[0].item()),
                "confidence": float(box.conf[0].item()),
                "x": x1 / img_w,
                "y": y1 / img_h,
                "width": (x2 - x1) / img_w,
                "height": (y2 - y1) / img_h,
            })

print(json.dumps({"version": "ultralytics-" + ultralytics.__version__, "detections": detections}))
"#;

/// 导出包含下载权重的时间
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_REFERENCE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_IMGSZ: u32 = 640;

#[derive(Error, Debug)]
pub enum UltralyticsError {
  #[error("{0}")]
  ProcessError(#[from] ProcessError),
  #[error("导出脚本没有给出输出路径")]
  NoExportPath,
  #[error("导出文件不存在: {0}")]
  MissingExport(PathBuf),
  #[error("无法解析参考推理输出: {0}")]
  RecordError(#[from] RecordError),
}

fn python_command(python: &str, script: &str) -> Command {
  let mut command = Command::new(python);
  command.arg("-c").arg(script);
  command
}

/// 最后一个非空行
fn last_line(stdout: &str) -> Option<&str> {
  stdout.lines().map(str::trim).rfind(|line| !line.is_empty())
}

#[derive(Debug, Clone)]
pub struct UltralyticsExporter {
  python: String,
  imgsz: u32,
  timeout: Duration,
}

impl UltralyticsExporter {
  pub fn new(python: &str) -> Self {
    Self {
      python: python.to_string(),
      imgsz: DEFAULT_IMGSZ,
      timeout: DEFAULT_EXPORT_TIMEOUT,
    }
  }

  pub fn with_imgsz(mut self, imgsz: u32) -> Self {
    self.imgsz = imgsz;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

impl Exporter for UltralyticsExporter {
  type Error = UltralyticsError;

  fn export(&self, model: &ModelSpec, export_dir: &Path) -> Result<PathBuf, Self::Error> {
    info!("导出 {} 为 ONNX (imgsz = {})", model.weights, self.imgsz);
    let mut command = python_command(&self.python, EXPORT_SCRIPT);
    command
      .arg(&model.weights)
      .arg(export_dir)
      .arg(self.imgsz.to_string())
      .current_dir(export_dir);

    let output = run_with_deadline(&mut command, self.timeout)?.success()?;
    let path = last_line(&output.stdout)
      .map(PathBuf::from)
      .ok_or(UltralyticsError::NoExportPath)?;
    if !path.is_file() {
      return Err(UltralyticsError::MissingExport(path));
    }
    debug!("导出完成: {}", path.display());
    Ok(path)
  }
}

#[derive(Debug, Clone)]
pub struct UltralyticsReference {
  python: String,
  timeout: Duration,
}

impl UltralyticsReference {
  pub fn new(python: &str) -> Self {
    Self {
      python: python.to_string(),
      timeout: DEFAULT_REFERENCE_TIMEOUT,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

impl Backend for UltralyticsReference {
  type Error = UltralyticsError;

  fn infer(&self, request: &InferRequest<'_>) -> Result<BackendOutput, Self::Error> {
    info!("运行 Ultralytics 参考推理");
    let mut command = python_command(&self.python, PREDICT_SCRIPT);
    command
      .arg(request.model)
      .arg(request.image)
      .arg(request.confidence.to_string());

    let output = run_with_deadline(&mut command, self.timeout)?.success()?;
    Ok(parse_record(&output.stdout)?)
  }
}
