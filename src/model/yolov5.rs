// 该文件是 Detjob （检测作业） 项目的一部分。
// src/model/yolov5.rs - 外部进程 YOLOv5 推理
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

use std::{
  ffi::OsStr,
  path::{Path, PathBuf},
  process::Command,
  sync::atomic::{AtomicU32, Ordering},
};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  bbox::{BoxParseError, parse_results},
  frame::ImageFrame,
  model::{DetectResult, Model},
};

const YOLOV5_IMAGE_SIZE: u32 = 640;
const YOLOV5_CONF_THRESH: f32 = 0.25;
const YOLOV5_DEFAULT_REPO: &str = "yolov5";
const YOLOV5_DEFAULT_PYTHON: &str = "python";

#[derive(Error, Debug)]
pub enum Yolov5Error {
  #[error("failed to start detector '{program}': {source}")]
  SpawnError {
    program: String,
    source: std::io::Error,
  },
  #[error("detector exited with code {}: {stderr}", exit_code(.code))]
  ExitError { code: Option<i32>, stderr: String },
  #[error("detection result file not found: {}", .0.display())]
  MissingResult(PathBuf),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("result file parse error: {0}")]
  ParseError(#[from] BoxParseError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
  #[error("invalid URI parameter '{key}': {value}")]
  InvalidParam { key: String, value: String },
}

fn exit_code(code: &Option<i32>) -> String {
  code
    .map(|c| c.to_string())
    .unwrap_or_else(|| "<signal>".to_string())
}

/// YOLOv5 外部进程构建器
#[derive(Debug, Clone)]
pub struct Yolov5Builder {
  weights: PathBuf,
  repo: PathBuf,
  python: String,
  image_size: u32,
  confidence: f32,
  runs_dir: Option<PathBuf>,
  keep_runs: bool,
}

impl FromUrlWithScheme for Yolov5Builder {
  const SCHEME: &'static str = "yolov5";
}

impl FromUrl for Yolov5Builder {
  type Error = Yolov5Error;

  /// `yolov5:///app/weights/best.pt?repo=yolov5&python=python3&img=640&conf=0.25&runs=/tmp/runs&keep=true`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolov5Error::SchemeMismatch(format!(
        "expected '{}', got '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = Yolov5Builder::new(url.path());
    for (key, value) in url.query_pairs() {
      let invalid = || Yolov5Error::InvalidParam {
        key: key.to_string(),
        value: value.to_string(),
      };
      match key.as_ref() {
        "repo" => builder = builder.repo(value.as_ref()),
        "python" => builder = builder.python(value.as_ref()),
        "img" => builder = builder.image_size(value.parse().map_err(|_| invalid())?),
        "conf" => builder = builder.confidence(value.parse().map_err(|_| invalid())?),
        "runs" => builder = builder.runs_dir(value.as_ref()),
        "keep" => builder = builder.keep_runs(value.parse().map_err(|_| invalid())?),
        _ => return Err(invalid()),
      }
    }
    Ok(builder)
  }
}

impl Yolov5Builder {
  pub fn new(weights: impl Into<PathBuf>) -> Self {
    Yolov5Builder {
      weights: weights.into(),
      repo: PathBuf::from(YOLOV5_DEFAULT_REPO),
      python: YOLOV5_DEFAULT_PYTHON.to_string(),
      image_size: YOLOV5_IMAGE_SIZE,
      confidence: YOLOV5_CONF_THRESH,
      runs_dir: None,
      keep_runs: false,
    }
  }

  /// YOLOv5 仓库目录，其中包含 detect.py
  pub fn repo(mut self, repo: impl Into<PathBuf>) -> Self {
    self.repo = repo.into();
    self
  }

  pub fn python(mut self, python: impl Into<String>) -> Self {
    self.python = python.into();
    self
  }

  pub fn image_size(mut self, image_size: u32) -> Self {
    self.image_size = image_size;
    self
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  /// 结果目录，默认为 `<repo>/runs/detect`
  pub fn runs_dir(mut self, runs_dir: impl Into<PathBuf>) -> Self {
    self.runs_dir = Some(runs_dir.into());
    self
  }

  /// 通过 [`Model::infer`] 推理后是否保留运行目录，默认删除
  pub fn keep_runs(mut self, keep_runs: bool) -> Self {
    self.keep_runs = keep_runs;
    self
  }

  pub fn build(self) -> Yolov5Process {
    let runs_dir = self
      .runs_dir
      .unwrap_or_else(|| self.repo.join("runs").join("detect"));
    info!(
      "YOLOv5 外部检测: 权重 {}, 仓库 {}, 输入尺寸 {}, 置信度阈值 {}",
      self.weights.display(),
      self.repo.display(),
      self.image_size,
      self.confidence
    );
    Yolov5Process {
      weights: self.weights,
      repo: self.repo,
      python: self.python,
      image_size: self.image_size,
      confidence: self.confidence,
      runs_dir,
      keep_runs: self.keep_runs,
      run_counter: AtomicU32::new(0),
    }
  }
}

/// 每次推理启动一个 detect.py 子进程，同步等待其结束
#[derive(Debug)]
pub struct Yolov5Process {
  weights: PathBuf,
  repo: PathBuf,
  python: String,
  image_size: u32,
  confidence: f32,
  runs_dir: PathBuf,
  keep_runs: bool,
  run_counter: AtomicU32,
}

/// 单次推理的产物
#[derive(Debug, Clone)]
pub struct Yolov5Run {
  pub result: DetectResult,
  /// 本次运行的输出目录
  pub run_dir: PathBuf,
  /// detect.py 保存的标注图像
  pub annotated_image: PathBuf,
}

impl Yolov5Run {
  /// 删除本次运行的输出目录，标注图像也随之删除
  pub fn remove(&self) -> std::io::Result<()> {
    remove_run_dir(&self.run_dir)
  }
}

fn remove_run_dir(run_dir: &Path) -> std::io::Result<()> {
  match std::fs::remove_dir_all(run_dir) {
    Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
    _ => Ok(()),
  }
}

impl Yolov5Process {
  // 每次运行使用独立目录，避免读到上一次的结果
  fn next_run_name(&self) -> String {
    let id = self.run_counter.fetch_add(1, Ordering::Relaxed);
    format!(
      "{}-{}-{:04X}",
      Utc::now().format("%Y%m%d-%H%M%S%.3f"),
      std::process::id(),
      id
    )
  }

  fn command(&self, image: &Path, run_name: impl AsRef<OsStr>) -> Command {
    let mut command = Command::new(&self.python);
    command
      .arg(self.repo.join("detect.py"))
      .arg("--weights")
      .arg(&self.weights)
      .arg("--img")
      .arg(self.image_size.to_string())
      .arg("--conf")
      .arg(self.confidence.to_string())
      .arg("--source")
      .arg(image)
      .arg("--save-txt")
      .arg("--save-conf")
      .arg("--project")
      .arg(&self.runs_dir)
      .arg("--name")
      .arg(run_name.as_ref())
      .arg("--exist-ok");
    command
  }

  /// 运行一次 detect.py，输出目录保留给调用者，由 [`Yolov5Run::remove`] 清理
  pub fn run(&self, image: &Path) -> Result<Yolov5Run, Yolov5Error> {
    self.run_in(image, &self.runs_dir.join(self.next_run_name()))
  }

  fn run_in(&self, image: &Path, run_dir: &Path) -> Result<Yolov5Run, Yolov5Error> {
    let run_dir = run_dir.to_path_buf();
    let run_name = run_dir.file_name().unwrap_or_default().to_os_string();
    info!("开始外部推理: {} -> {}", image.display(), run_dir.display());

    let now = std::time::Instant::now();
    let output = self
      .command(image, &run_name)
      .output()
      .map_err(|source| Yolov5Error::SpawnError {
        program: self.python.clone(),
        source,
      })?;
    debug!("检测进程输出: {}", String::from_utf8_lossy(&output.stdout));

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      error!("推理过程中出错: {}", stderr);
      return Err(Yolov5Error::ExitError {
        code: output.status.code(),
        stderr,
      });
    }
    info!("外部推理完成，耗时: {:.2?}", now.elapsed());

    let mut label_name = image.file_stem().unwrap_or_default().to_os_string();
    label_name.push(".txt");
    let label_file = run_dir.join("labels").join(label_name);
    if !label_file.is_file() {
      error!("未找到包含边界框坐标的结果文件: {}", label_file.display());
      return Err(Yolov5Error::MissingResult(label_file));
    }

    let boxes = parse_results(&std::fs::read_to_string(&label_file)?)?;
    debug!("检测到 {} 个物体", boxes.len());

    let annotated_image = run_dir.join(image.file_name().unwrap_or_default());
    Ok(Yolov5Run {
      result: DetectResult::from(boxes),
      run_dir,
      annotated_image,
    })
  }
}

impl Yolov5Process {
  // 只取检测框，运行目录按 keep_runs 决定是否删除，失败时同样清理
  fn detect(&self, image: &Path) -> Result<DetectResult, Yolov5Error> {
    let run_dir = self.runs_dir.join(self.next_run_name());
    let result = self.run_in(image, &run_dir).map(|run| run.result);
    if !self.keep_runs
      && let Err(e) = remove_run_dir(&run_dir)
    {
      warn!("无法删除运行目录 {}: {}", run_dir.display(), e);
    }
    result
  }
}

impl Model<Path> for Yolov5Process {
  type Output = DetectResult;
  type Error = Yolov5Error;

  fn infer(&self, input: &Path) -> Result<Self::Output, Self::Error> {
    self.detect(input)
  }
}

impl Model<ImageFrame> for Yolov5Process {
  type Output = DetectResult;
  type Error = Yolov5Error;

  fn infer(&self, input: &ImageFrame) -> Result<Self::Output, Self::Error> {
    self.detect(&input.path)
  }
}
