// 该文件是 Duizhao （对照） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{Level, error, warn};

use duizhao::{
  backend::{ProcessBackend, UltralyticsExporter, UltralyticsReference},
  compare::MatchStrategy,
  output::{ConsoleOutput, Render},
  task::{Task, ValidationTask},
};

use args::Config;

fn main() -> ExitCode {
  let args = args::Args::parse();

  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_max_level(if args.verbose {
      Level::DEBUG
    } else {
      Level::INFO
    })
    .init();

  let config = match args.into_config() {
    Ok(config) => config,
    Err(e) => {
      eprintln!("配置错误: {}", e);
      return ExitCode::FAILURE;
    }
  };

  match run(config) {
    Ok(code) => code,
    Err(e) => {
      error!("运行失败: {:#}", e);
      ExitCode::FAILURE
    }
  }
}

fn run(config: Config) -> Result<ExitCode> {
  println!("Duizhao 检测结果对照验证");
  println!("========================");
  println!("待测程序: {}", config.test_binary.display());
  println!("测试图像: {}", config.image.display());
  println!("置信度阈值: {}", config.confidence);
  println!("IoU 阈值: {}", config.tolerance.iou_threshold);
  println!("置信度容差: {}", config.tolerance.confidence_tolerance);
  println!("匹配率阈值: {}", config.tolerance.match_rate_threshold);
  if config.strategy == MatchStrategy::Greedy {
    println!("匹配策略: {}", config.strategy);
  } else {
    println!("匹配策略: {} (非默认)", config.strategy);
  }
  println!(
    "待测模型: {}",
    config
      .worklist
      .iter()
      .map(|model| model.name.as_str())
      .collect::<Vec<_>>()
      .join(", ")
  );

  let exporter = UltralyticsExporter::new(&config.python).with_imgsz(config.imgsz);
  let reference = UltralyticsReference::new(&config.python);
  let candidate = ProcessBackend::new(&config.test_binary).with_timeout(config.timeout);

  let report = ValidationTask::new(&config.image, config.confidence)
    .with_worklist(config.worklist)
    .with_tolerance(config.tolerance)
    .with_strategy(config.strategy)
    .run_task(exporter, reference, candidate)?;

  ConsoleOutput
    .render_report(&report)
    .context("无法输出控制台报告")?;

  let mut record_failed = false;
  for output in &config.records {
    if let Err(e) = output.render_report(&report) {
      error!("保存报告失败: {}", e);
      record_failed = true;
    }
  }
  if record_failed {
    warn!("部分报告未能保存");
    return Ok(ExitCode::FAILURE);
  }

  Ok(report.exit_code())
}
