// 该文件是 Duizhao （对照） 项目的一部分。
// src/backend/process.rs - 子进程后端
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

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendOutput, InferRequest, RecordError, parse_record};

/// 待测程序的默认超时时间
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
/// 解析失败时在错误信息中保留的标准输出长度
const STDOUT_HEAD_CHARS: usize = 500;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("无法启动程序 {program}: {source}")]
  SpawnError {
    program: String,
    #[source]
    source: std::io::Error,
  },
  #[error("等待子进程时发生 I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("程序运行超时 ({0:?})")]
  Timeout(Duration),
  #[error("程序异常退出 (退出码 {code:?}): {stderr}")]
  ExitFailure { code: Option<i32>, stderr: String },
  #[error("无法解析程序输出: {source}; 标准输出: {stdout_head}")]
  MalformedOutput {
    #[source]
    source: RecordError,
    stdout_head: String,
  },
}

#[derive(Debug)]
pub struct ProcessOutput {
  pub status: ExitStatus,
  pub stdout: String,
  pub stderr: String,
}

impl ProcessOutput {
  /// 非零退出时转换为错误
  pub fn success(self) -> Result<Self, ProcessError> {
    if self.status.success() {
      Ok(self)
    } else {
      Err(ProcessError::ExitFailure {
        code: self.status.code(),
        stderr: self.stderr.trim().to_string(),
      })
    }
  }
}

fn read_pipe<R: Read>(pipe: Option<R>) -> String {
  let mut buffer = Vec::new();
  if let Some(mut pipe) = pipe
    && let Err(e) = pipe.read_to_end(&mut buffer)
  {
    warn!("读取子进程输出失败: {}", e);
  }
  String::from_utf8_lossy(&buffer).into_owned()
}

/// 在单独的线程读取管道，避免输出填满缓冲区后子进程阻塞
fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
  let (tx, rx) = mpsc::channel();
  thread::spawn(move || {
    if tx.send(read_pipe(pipe)).is_err() {
      debug!("子进程输出已无人接收");
    }
  });
  rx
}

/// 在截止时间前取回管道内容；子进程退出后仍有后台进程持有管道时返回 `None`
fn collect_before(rx: &Receiver<String>, deadline: Instant) -> Option<String> {
  match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
    Ok(text) => Some(text),
    Err(RecvTimeoutError::Timeout) => None,
    Err(RecvTimeoutError::Disconnected) => Some(String::new()),
  }
}

fn kill_and_reap(child: &mut Child, program: &str) {
  if let Err(e) = child.kill() {
    warn!("终止子进程 {} 失败: {}", program, e);
  }
  if let Err(e) = child.wait() {
    warn!("回收子进程 {} 失败: {}", program, e);
  }
}

/// 阻塞运行命令直到退出并读完输出，或者超时。
///
/// 截止时间同时覆盖等待退出和读取输出两个阶段。超时后子进程会被终止并回收，
/// 不做重试。
pub fn run_with_deadline(command: &mut Command, timeout: Duration) -> Result<ProcessOutput, ProcessError> {
  let program = command.get_program().to_string_lossy().into_owned();
  debug!("启动子进程: {:?}", command);

  let mut child = command
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .map_err(|source| ProcessError::SpawnError {
      program: program.clone(),
      source,
    })?;

  let stdout_reader = spawn_reader(child.stdout.take());
  let stderr_reader = spawn_reader(child.stderr.take());

  let started = Instant::now();
  let deadline = started + timeout;
  let status = loop {
    match child.try_wait() {
      Ok(Some(status)) => break status,
      Ok(None) => {}
      Err(e) => {
        kill_and_reap(&mut child, &program);
        return Err(ProcessError::IoError(e));
      }
    }
    if Instant::now() >= deadline {
      error!("{} 运行超过 {:?}，终止进程", program, timeout);
      kill_and_reap(&mut child, &program);
      return Err(ProcessError::Timeout(timeout));
    }
    thread::sleep(POLL_INTERVAL);
  };

  let Some(stdout) = collect_before(&stdout_reader, deadline) else {
    error!("{} 已退出，但标准输出在 {:?} 内未关闭", program, timeout);
    return Err(ProcessError::Timeout(timeout));
  };
  let Some(stderr) = collect_before(&stderr_reader, deadline) else {
    error!("{} 已退出，但标准错误在 {:?} 内未关闭", program, timeout);
    return Err(ProcessError::Timeout(timeout));
  };
  debug!(
    "{} 退出: {}，耗时 {:.2?}",
    program,
    status,
    started.elapsed()
  );

  Ok(ProcessOutput {
    status,
    stdout,
    stderr,
  })
}

fn stdout_head(stdout: &str) -> String {
  stdout.chars().take(STDOUT_HEAD_CHARS).collect()
}

/// 以子进程方式运行的待测推理程序。
///
/// 调用方式为 `<程序> <模型> <图像> <置信度阈值>`，程序需要在标准输出
/// 打印一条 JSON 记录。
#[derive(Debug, Clone)]
pub struct ProcessBackend {
  program: PathBuf,
  timeout: Duration,
  envs: Vec<(String, String)>,
}

impl ProcessBackend {
  pub fn new(program: &Path) -> Self {
    Self {
      program: program.to_path_buf(),
      timeout: DEFAULT_TIMEOUT,
      envs: vec![("QT_QPA_PLATFORM".to_string(), "offscreen".to_string())],
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_env(mut self, key: &str, value: &str) -> Self {
    self.envs.push((key.to_string(), value.to_string()));
    self
  }

  pub fn program(&self) -> &Path {
    &self.program
  }
}

impl Backend for ProcessBackend {
  type Error = ProcessError;

  fn infer(&self, request: &InferRequest<'_>) -> Result<BackendOutput, Self::Error> {
    info!("运行待测程序: {}", self.program.display());
    let mut command = Command::new(&self.program);
    command
      .arg(request.model)
      .arg(request.image)
      .arg(request.confidence.to_string())
      .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    let output = run_with_deadline(&mut command, self.timeout)?.success()?;
    parse_record(&output.stdout).map_err(|source| ProcessError::MalformedOutput {
      source,
      stdout_head: stdout_head(&output.stdout),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stdout_head_is_truncated_by_chars() {
    let long = "检".repeat(STDOUT_HEAD_CHARS + 10);
    assert_eq!(stdout_head(&long).chars().count(), STDOUT_HEAD_CHARS);
    assert_eq!(stdout_head("short"), "short");
  }

  #[test]
  fn collect_before_gives_up_at_deadline() {
    let (tx, rx) = mpsc::channel::<String>();
    let deadline = Instant::now() + Duration::from_millis(50);
    assert_eq!(collect_before(&rx, deadline), None);

    tx.send("done".to_string()).unwrap();
    assert_eq!(collect_before(&rx, Instant::now()), Some("done".to_string()));
    drop(tx);
    assert_eq!(collect_before(&rx, Instant::now()), Some(String::new()));
  }

  #[test]
  fn missing_program_is_a_spawn_error() {
    let backend = ProcessBackend::new(Path::new("/nonexistent/duizhao-test-binary"));
    let request = InferRequest {
      model: Path::new("model.onnx"),
      image: Path::new("image.jpg"),
      confidence: 0.25,
    };
    assert!(matches!(
      backend.infer(&request),
      Err(ProcessError::SpawnError { .. })
    ));
  }

  #[test]
  fn backend_sets_offscreen_platform() {
    let backend = ProcessBackend::new(Path::new("bin")).with_timeout(Duration::from_secs(3));
    assert_eq!(backend.timeout, Duration::from_secs(3));
    assert!(
      backend
        .envs
        .iter()
        .any(|(k, v)| k == "QT_QPA_PLATFORM" && v == "offscreen")
    );
  }
}
