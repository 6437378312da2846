// 该文件是 Duizhao （对照） 项目的一部分。
// src/output/console.rs - 控制台报告
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

use std::io::{self, Write};

use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, Render},
  verdict::{ModelReport, RunOutcome, RunReport, Verdict},
};

const RULE: &str = "============================================================";

/// 把报告打印到标准输出
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleOutput;

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(ConsoleOutput)
  }
}

impl Render<RunReport> for ConsoleOutput {
  type Error = io::Error;

  fn render_report(&self, report: &RunReport) -> Result<(), Self::Error> {
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    write_report(&mut lock, report)?;
    lock.flush()
  }
}

fn write_banner<W: Write>(w: &mut W, title: &str) -> io::Result<()> {
  writeln!(w)?;
  writeln!(w, "{}", RULE)?;
  writeln!(w, "{}", title)?;
  writeln!(w, "{}", RULE)
}

/// 单个模型的详细结果
pub fn write_model_section<W: Write>(w: &mut W, report: &ModelReport) -> io::Result<()> {
  write_banner(w, &format!("模型: {}", report.model))?;

  match &report.verdict {
    Verdict::Skip { reason } => {
      writeln!(w, "  SKIP: {}", reason)?;
    }
    Verdict::ReferenceError { .. } | Verdict::CandidateError { .. } => {
      writeln!(w, "  错误: {}", report.verdict.summary())?;
      writeln!(w, "  >> {}", report.verdict.label())?;
    }
    Verdict::Judged {
      reference_version,
      candidate_version,
      judgement,
    } => {
      writeln!(w, "  参考检测数: {}", judgement.reference_count)?;
      writeln!(w, "  待测检测数: {}", judgement.candidate_count)?;
      writeln!(w, "  参考版本:   {}", reference_version)?;
      writeln!(w, "  待测版本:   {}", candidate_version)?;
      for line in judgement.diagnostics() {
        writeln!(w, "  {}", line)?;
      }
      writeln!(w, "  结论: {}", judgement.summary())?;
      writeln!(w, "  >> {}", report.verdict.label())?;
    }
  }
  Ok(())
}

/// 全部模型的详细结果，之后是汇总表和最终结论
pub fn write_report<W: Write>(w: &mut W, report: &RunReport) -> io::Result<()> {
  for model in &report.models {
    write_model_section(w, model)?;
  }

  write_banner(w, "SUMMARY")?;
  for model in &report.models {
    writeln!(w, "  {}: {}", model.model.name, model.verdict.label())?;
  }
  writeln!(w)?;

  match report.outcome() {
    RunOutcome::NothingTested => writeln!(w, "错误: 没有任何模型完成测试 (no models tested)"),
    RunOutcome::SomeFailed { failed } => writeln!(w, "{} 个模型未通过！", failed),
    RunOutcome::AllPassed { tested } => writeln!(w, "全部 {} 个已测试模型通过。", tested),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  use chrono::Utc;

  use crate::backend::ModelSpec;
  use crate::compare::{GreedyMatcher, MatchStrategy, Matcher, Tolerance, judge};
  use crate::detection::{BoundingBox, Detection, DetectionSet};

  fn render(models: Vec<ModelReport>) -> String {
    let report = RunReport {
      generated_at: Utc::now(),
      image: PathBuf::from("bus.jpg"),
      confidence_threshold: 0.25,
      tolerance: Tolerance::default(),
      strategy: MatchStrategy::Greedy,
      models,
    };
    let mut buffer = Vec::new();
    write_report(&mut buffer, &report).unwrap();
    String::from_utf8(buffer).unwrap()
  }

  fn judged_model() -> ModelReport {
    let reference: DetectionSet = vec![
      Detection::new(0, 0.9, BoundingBox::new(0.0, 0.0, 0.5, 0.5)),
      Detection::new(2, 0.7, BoundingBox::new(0.6, 0.6, 0.2, 0.2)),
    ]
    .into();
    let candidate: DetectionSet =
      vec![Detection::new(0, 0.91, BoundingBox::new(0.01, 0.0, 0.5, 0.5))].into();
    let tolerance = Tolerance::default();
    let result = GreedyMatcher::new(0.5).match_sets(&reference, &candidate);
    ModelReport {
      model: ModelSpec::new("yolov8n.pt", "YOLOv8n"),
      verdict: Verdict::Judged {
        reference_version: "ultralytics-8.3.0".to_string(),
        candidate_version: "V8".to_string(),
        judgement: judge(&reference, &candidate, result, &tolerance),
      },
    }
  }

  #[test]
  fn prints_sections_and_summary() {
    let text = render(vec![
      ModelReport {
        model: ModelSpec::new("yolov5nu.pt", "YOLOv5n"),
        verdict: Verdict::Skip {
          reason: "weights not found".to_string(),
        },
      },
      judged_model(),
    ]);

    assert!(text.contains("模型: YOLOv5n (yolov5nu.pt)"));
    assert!(text.contains("  SKIP: weights not found"));
    assert!(text.contains("  待测版本:   V8"));
    assert!(text.contains("  匹配: 1/2 (50.0%)"));
    assert!(text.contains("  未匹配的参考检测 (1):"));
    assert!(text.contains("    [1] class=2 conf=0.7000"));
    assert!(text.contains("  >> FAIL"));
    assert!(text.contains("  YOLOv5n: SKIP\n"));
    assert!(text.contains("  YOLOv8n: FAIL\n"));
    assert!(text.ends_with("1 个模型未通过！\n"));
  }

  #[test]
  fn reports_candidate_errors_and_empty_runs() {
    let text = render(vec![ModelReport {
      model: ModelSpec::new("yolo11n.pt", "YOLO11n"),
      verdict: Verdict::CandidateError {
        reason: "程序运行超时 (120s)".to_string(),
      },
    }]);
    assert!(text.contains("  >> FAIL (candidate error)"));
    assert!(text.contains("  YOLO11n: FAIL (candidate error)"));
    assert!(text.contains("no models tested"));

    let text = render(Vec::new());
    assert!(text.contains("SUMMARY"));
    assert!(text.contains("no models tested"));
  }
}
