// 该文件是 Duizhao （对照） 项目的一部分。
// src/output.rs - 报告输出定义
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, verdict::RunReport};

pub trait Render<Report>: Sized {
  type Error;
  fn render_report(&self, report: &Report) -> Result<(), Self::Error>;
}

mod console;
pub use self::console::{ConsoleOutput, write_model_section, write_report};

#[cfg(feature = "json_record")]
mod json_record;
#[cfg(feature = "json_record")]
pub use self::json_record::{JsonRecordError, JsonRecordOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("控制台输出错误: {0}")]
  ConsoleError(#[from] std::io::Error),
  #[cfg(feature = "json_record")]
  #[error("JSON 记录输出错误: {0}")]
  JsonRecordError(#[from] JsonRecordError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  Console(ConsoleOutput),
  #[cfg(feature = "json_record")]
  JsonRecord(JsonRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      scheme if scheme == ConsoleOutput::SCHEME => {
        Ok(OutputWrapper::Console(ConsoleOutput::from_url(url)?))
      }
      #[cfg(feature = "json_record")]
      scheme if scheme == JsonRecordOutput::SCHEME => {
        Ok(OutputWrapper::JsonRecord(JsonRecordOutput::from_url(url)?))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render<RunReport> for OutputWrapper {
  type Error = OutputError;

  fn render_report(&self, report: &RunReport) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Console(output) => output.render_report(report).map_err(OutputError::from),
      #[cfg(feature = "json_record")]
      OutputWrapper::JsonRecord(output) => {
        output.render_report(report).map_err(OutputError::from)
      }
    }
  }
}
