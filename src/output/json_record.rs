// 该文件是 Duizhao （对照） 项目的一部分。
// src/output/json_record.rs - 保存 JSON 报告文件
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

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, output::Render, verdict::RunReport};

#[derive(Error, Debug)]
pub enum JsonRecordError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("缺少输出文件路径")]
  EmptyPath,
}

/// 把完整的运行报告写成 JSON 文件，`json:///path/to/report.json`
#[derive(Debug, Clone)]
pub struct JsonRecordOutput {
  path: PathBuf,
}

impl JsonRecordOutput {
  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl FromUrlWithScheme for JsonRecordOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonRecordOutput {
  type Error = JsonRecordError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonRecordError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    if url.path().is_empty() || url.path() == "/" {
      return Err(JsonRecordError::EmptyPath);
    }

    Ok(JsonRecordOutput {
      path: PathBuf::from(url.path()),
    })
  }
}

impl Render<RunReport> for JsonRecordOutput {
  type Error = JsonRecordError;

  fn render_report(&self, report: &RunReport) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(&self.path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writeln!(writer)?;
    writer.flush()?;

    info!("保存报告到文件: {}", self.path.display());
    Ok(())
  }
}
