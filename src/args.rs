// 该文件是 Duizhao （对照） 项目的一部分。
// src/args.rs - 项目参数配置
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
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use url::Url;

use duizhao::{
  FromUrl,
  backend::{ModelSpec, default_worklist},
  compare::{
    CONFIDENCE_TOLERANCE, IOU_THRESHOLD, MATCH_RATE_THRESHOLD, MatchStrategy, Tolerance,
    ToleranceError,
  },
  output::{OutputError, OutputWrapper},
};

/// Duizhao 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 待测推理程序，调用方式为 `<程序> <模型.onnx> <图像> <置信度>`
  #[arg(long, value_name = "FILE")]
  pub test_binary: PathBuf,

  /// 测试图像
  #[arg(long, value_name = "FILE")]
  pub image: PathBuf,

  /// 置信度阈值 (0.0 - 1.0)，参考端与待测端使用相同的值
  #[arg(long, default_value_t = 0.25, value_name = "THRESHOLD")]
  pub conf: f64,

  /// 待测模型，可重复指定；省略时使用内置列表
  /// 格式: yolov8n.pt 或 yolov8n.pt=YOLOv8n
  #[arg(long = "model", value_name = "WEIGHTS[=NAME]")]
  pub models: Vec<ModelSpec>,

  /// 匹配所需的最小 IoU (0.0 - 1.0)
  #[arg(long, default_value_t = IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub iou_threshold: f64,

  /// 匹配对之间允许的最大置信度差
  #[arg(long, default_value_t = CONFIDENCE_TOLERANCE, value_name = "DELTA")]
  pub confidence_tolerance: f64,

  /// 通过所需的最小匹配率 (0.0 - 1.0)
  #[arg(long, default_value_t = MATCH_RATE_THRESHOLD, value_name = "RATE")]
  pub match_rate: f64,

  /// 匹配策略
  #[arg(long, value_enum, default_value_t = MatchStrategy::Greedy)]
  pub matcher: MatchStrategy,

  /// 待测程序的超时时间（秒）
  #[arg(long, default_value_t = 120, value_name = "SECONDS")]
  pub timeout: u64,

  /// 运行 Ultralytics 的 Python 解释器
  #[arg(long, default_value = "python3", value_name = "PROGRAM")]
  pub python: String,

  /// ONNX 导出尺寸
  #[arg(long, default_value_t = 640, value_name = "SIZE")]
  pub imgsz: u32,

  /// 额外的报告输出，可重复指定
  /// 支持格式:
  /// - JSON: json:///path/to/report.json
  #[arg(long = "record", value_name = "URL")]
  pub records: Vec<Url>,

  /// 输出调试日志
  #[arg(short, long)]
  pub verbose: bool,
}

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("{what}不存在: {path}: {source}")]
  MissingFile {
    what: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[cfg(feature = "read_image_file")]
  #[error("无法读取测试图像 {path}: {source}")]
  UnreadableImage {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
  #[error("置信度阈值必须位于 [0, 1] 区间，实际为 {0}")]
  InvalidConfidence(f64),
  #[error("超时时间必须大于 0")]
  InvalidTimeout,
  #[error("{0}")]
  Tolerance(#[from] ToleranceError),
  #[error("无效的报告输出: {0}")]
  Output(#[from] OutputError),
}

/// 校验后的运行配置
pub struct Config {
  pub test_binary: PathBuf,
  pub image: PathBuf,
  pub confidence: f64,
  pub worklist: Vec<ModelSpec>,
  pub tolerance: Tolerance,
  pub strategy: MatchStrategy,
  pub timeout: Duration,
  pub python: String,
  pub imgsz: u32,
  pub records: Vec<OutputWrapper>,
}

fn existing_file(what: &'static str, path: &Path) -> Result<PathBuf, ConfigError> {
  path.canonicalize().map_err(|source| ConfigError::MissingFile {
    what,
    path: path.to_path_buf(),
    source,
  })
}

impl Args {
  /// 在处理任何模型之前完成全部校验
  pub fn into_config(self) -> Result<Config, ConfigError> {
    let test_binary = existing_file("待测程序", &self.test_binary)?;
    let image = existing_file("测试图像", &self.image)?;

    #[cfg(feature = "read_image_file")]
    {
      let (width, height) =
        image::image_dimensions(&image).map_err(|source| ConfigError::UnreadableImage {
          path: image.clone(),
          source,
        })?;
      tracing::debug!("测试图像尺寸: {}x{}", width, height);
    }

    if !(0.0..=1.0).contains(&self.conf) {
      return Err(ConfigError::InvalidConfidence(self.conf));
    }
    if self.timeout == 0 {
      return Err(ConfigError::InvalidTimeout);
    }

    let tolerance = Tolerance::default()
      .with_iou_threshold(self.iou_threshold)
      .with_confidence_tolerance(self.confidence_tolerance)
      .with_match_rate_threshold(self.match_rate)
      .validate()?;

    let worklist = if self.models.is_empty() {
      default_worklist()
    } else {
      self.models
    };

    let records = self
      .records
      .iter()
      .map(OutputWrapper::from_url)
      .collect::<Result<Vec<_>, _>>()?;

    Ok(Config {
      test_binary,
      image,
      confidence: self.conf,
      worklist,
      tolerance,
      strategy: self.matcher,
      timeout: Duration::from_secs(self.timeout),
      python: self.python,
      imgsz: self.imgsz,
      records,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use tempfile::TempDir;

  struct Fixture {
    dir: TempDir,
    binary: PathBuf,
    image: PathBuf,
  }

  fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let binary = dir.path().join("candidate");
    std::fs::write(&binary, b"#!/bin/sh\n").unwrap();
    let image = dir.path().join("bus.png");
    #[cfg(feature = "read_image_file")]
    image::RgbImage::new(8, 8).save(&image).unwrap();
    #[cfg(not(feature = "read_image_file"))]
    std::fs::write(&image, b"png").unwrap();
    Fixture { dir, binary, image }
  }

  fn parse(binary: &Path, image: &Path, extra: &[&str]) -> Result<Config, ConfigError> {
    let mut argv = vec![
      "duizhao".to_string(),
      "--test-binary".to_string(),
      binary.display().to_string(),
      "--image".to_string(),
      image.display().to_string(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    Args::parse_from(argv).into_config()
  }

  #[test]
  fn defaults_produce_a_config() {
    let f = fixture();
    let config = parse(&f.binary, &f.image, &["--record", "json:///tmp/report.json"]).unwrap();
    assert_eq!(config.confidence, 0.25);
    assert_eq!(config.worklist, default_worklist());
    assert_eq!(config.tolerance, Tolerance::default());
    assert_eq!(config.strategy, MatchStrategy::Greedy);
    assert_eq!(config.timeout, Duration::from_secs(120));
    assert_eq!(config.python, "python3");
    assert_eq!(config.imgsz, 640);
    assert_eq!(config.records.len(), 1);
  }

  #[test]
  fn models_and_matcher_are_taken_from_flags() {
    let f = fixture();
    let config = parse(
      &f.binary,
      &f.image,
      &["--model", "yolov8n.pt=YOLOv8n", "--model", "custom.pt", "--matcher", "optimal"],
    )
    .unwrap();
    assert_eq!(
      config.worklist,
      vec![ModelSpec::new("yolov8n.pt", "YOLOv8n"), ModelSpec::new("custom.pt", "custom")]
    );
    assert_eq!(config.strategy, MatchStrategy::Optimal);
  }

  #[test]
  fn missing_binary_or_image_is_rejected() {
    let f = fixture();
    let missing = f.dir.path().join("missing");

    let err = parse(&missing, &f.image, &[]).err().unwrap();
    assert!(matches!(err, ConfigError::MissingFile { what: "待测程序", .. }));

    let err = parse(&f.binary, &missing, &[]).err().unwrap();
    assert!(matches!(err, ConfigError::MissingFile { what: "测试图像", .. }));
  }

  #[cfg(feature = "read_image_file")]
  #[test]
  fn undecodable_image_is_rejected() {
    let f = fixture();
    let broken = f.dir.path().join("broken.jpg");
    std::fs::write(&broken, b"not an image").unwrap();
    let err = parse(&f.binary, &broken, &[]).err().unwrap();
    assert!(matches!(err, ConfigError::UnreadableImage { .. }));
  }

  #[test]
  fn out_of_range_values_are_rejected() {
    let f = fixture();

    let err = parse(&f.binary, &f.image, &["--conf", "1.5"]).err().unwrap();
    assert!(matches!(err, ConfigError::InvalidConfidence(v) if v == 1.5));

    let err = parse(&f.binary, &f.image, &["--timeout", "0"]).err().unwrap();
    assert!(matches!(err, ConfigError::InvalidTimeout));

    let err = parse(&f.binary, &f.image, &["--iou-threshold", "1.5"]).err().unwrap();
    assert!(matches!(
      err,
      ConfigError::Tolerance(ToleranceError::OutOfRange { name: "IoU 阈值", .. })
    ));

    let err = parse(&f.binary, &f.image, &["--match-rate", "2"]).err().unwrap();
    assert!(matches!(err, ConfigError::Tolerance(_)));
  }

  #[test]
  fn unsupported_record_scheme_is_rejected() {
    let f = fixture();
    let err = parse(&f.binary, &f.image, &["--record", "rtsp://camera/1"]).err().unwrap();
    assert!(matches!(
      err,
      ConfigError::Output(OutputError::SchemeMismatch(scheme)) if scheme == "rtsp"
    ));
  }
}
