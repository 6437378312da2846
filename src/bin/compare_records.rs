// 该文件是 Duizhao （对照） 项目的一部分。
// src/bin/compare_records.rs - 离线比对两份检测记录
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{Level, error, info};

use duizhao::{
  backend::{ModelSpec, read_record},
  compare::{
    CONFIDENCE_TOLERANCE, IOU_THRESHOLD, MATCH_RATE_THRESHOLD, MatchStrategy, Matcher, Tolerance,
    judge,
  },
  output::write_model_section,
  verdict::{ModelReport, Status, Verdict},
};

/// 比对两份已保存的检测记录
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// 参考端检测记录 (JSON)
  #[arg(long, value_name = "FILE")]
  reference: PathBuf,

  /// 待测端检测记录 (JSON)
  #[arg(long, value_name = "FILE")]
  candidate: PathBuf,

  /// 报告中显示的名称
  #[arg(long, default_value = "records", value_name = "NAME")]
  name: String,

  #[arg(long, default_value_t = IOU_THRESHOLD, value_name = "THRESHOLD")]
  iou_threshold: f64,

  #[arg(long, default_value_t = CONFIDENCE_TOLERANCE, value_name = "DELTA")]
  confidence_tolerance: f64,

  #[arg(long, default_value_t = MATCH_RATE_THRESHOLD, value_name = "RATE")]
  match_rate: f64,

  /// 匹配策略
  #[arg(long, value_enum, default_value_t = MatchStrategy::Greedy)]
  matcher: MatchStrategy,

  /// 输出调试日志
  #[arg(short, long)]
  verbose: bool,
}

fn main() -> ExitCode {
  let args = Args::parse();

  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_max_level(if args.verbose {
      Level::DEBUG
    } else {
      Level::INFO
    })
    .init();

  match run(args) {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(e) => {
      error!("{:#}", e);
      ExitCode::FAILURE
    }
  }
}

fn run(args: Args) -> Result<bool> {
  let tolerance = Tolerance::default()
    .with_iou_threshold(args.iou_threshold)
    .with_confidence_tolerance(args.confidence_tolerance)
    .with_match_rate_threshold(args.match_rate)
    .validate()?;

  let reference = read_record(&args.reference)
    .with_context(|| format!("无法读取参考记录 {}", args.reference.display()))?;
  let candidate = read_record(&args.candidate)
    .with_context(|| format!("无法读取待测记录 {}", args.candidate.display()))?;
  info!(
    "参考: {} 个检测 ({})，待测: {} 个检测 ({})",
    reference.detections.len(),
    reference.version,
    candidate.detections.len(),
    candidate.version
  );

  let matcher = args.matcher.matcher(&tolerance);
  let match_result = matcher.match_sets(&reference.detections, &candidate.detections);
  let judgement = judge(
    &reference.detections,
    &candidate.detections,
    match_result,
    &tolerance,
  );

  let report = ModelReport {
    model: ModelSpec::new(&args.candidate.display().to_string(), &args.name),
    verdict: Verdict::Judged {
      reference_version: reference.version,
      candidate_version: candidate.version,
      judgement,
    },
  };

  let stdout = std::io::stdout();
  let mut lock = stdout.lock();
  write_model_section(&mut lock, &report).context("无法输出比对结果")?;

  Ok(report.verdict.status() == Status::Pass)
}
