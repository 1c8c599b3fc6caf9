// 该文件是 Detjob （检测作业） 项目的一部分。
// src/bin/infer_one.rs - 单张图像外部进程推理
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
  path::{Path, PathBuf},
  process::ExitCode,
};

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser};
use rand::seq::SliceRandom;
use serde_json::json;
use tracing::{error, info};
use url::Url;

use detjob::{label::LabelTable, model::Yolov5Builder};

/// 调用 YOLOv5 detect.py 对一张图像推理，并以 JSON 输出检测框
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("source").required(true).args(["image", "images"])))]
pub struct Args {
  /// YOLOv5 权重文件
  #[arg(long, env = "DETJOB_WEIGHTS", value_name = "FILE")]
  pub weights: PathBuf,
  /// 待推理的图像
  #[arg(long, value_name = "FILE")]
  pub image: Option<PathBuf>,
  /// 从该目录中随机选取一张图像
  #[arg(long, value_name = "DIR")]
  pub images: Option<PathBuf>,
  /// YOLOv5 仓库目录（包含 detect.py）
  #[arg(long, env = "DETJOB_YOLOV5_REPO", default_value = "yolov5", value_name = "DIR")]
  pub yolov5_repo: PathBuf,
  /// 运行 detect.py 的 Python 解释器
  #[arg(long, env = "DETJOB_PYTHON", default_value = "python", value_name = "EXE")]
  pub python: String,
  /// 标签表文件，用于日志中显示类别名称
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 推理完成后将结果图像上报到该地址
  #[arg(long, value_name = "URL")]
  pub upload: Option<Url>,
}

fn pick_random_image(dir: &Path) -> Result<PathBuf> {
  let mut files = Vec::new();
  for entry in std::fs::read_dir(dir).with_context(|| format!("无法读取目录: {}", dir.display()))? {
    let path = entry?.path();
    if path.is_file() {
      files.push(path);
    }
  }
  match files.choose(&mut rand::thread_rng()) {
    Some(path) => Ok(path.clone()),
    None => bail!("目录中没有图像: {}", dir.display()),
  }
}

#[cfg(feature = "upload")]
fn upload(endpoint: Url, image_name: &str, image_path: &Path) -> Result<()> {
  let uploader = detjob::upload::Uploader::new(endpoint)?;
  uploader.upload(image_name, &image_path.to_string_lossy())?;
  info!("上报成功");
  Ok(())
}

#[cfg(not(feature = "upload"))]
fn upload(_endpoint: Url, _image_name: &str, _image_path: &Path) -> Result<()> {
  bail!("未启用 upload 功能")
}

fn main() -> Result<ExitCode> {
  detjob::init_tracing();

  let args = Args::parse();

  let image = match (&args.image, &args.images) {
    (Some(image), _) => image.clone(),
    (None, Some(dir)) => pick_random_image(dir)?,
    (None, None) => bail!("需要 --image 或 --images"),
  };
  let image_name = image
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default();
  let labels = match &args.labels {
    Some(path) => LabelTable::load(path)?,
    None => LabelTable::default(),
  };

  let process = Yolov5Builder::new(&args.weights)
    .repo(&args.yolov5_repo)
    .python(&args.python)
    .build();

  let run = match process.run(&image) {
    Ok(run) => run,
    Err(e) => {
      error!("推理过程中出错: {}", e);
      return Ok(ExitCode::FAILURE);
    }
  };

  for bbox in run.result.items.iter() {
    info!(
      "{}: {} {:.2}% at ({:.4}, {:.4}, {:.4}x{:.4})",
      image_name,
      labels.display(bbox.class_id),
      bbox.confidence * 100.0,
      bbox.x_center,
      bbox.y_center,
      bbox.width,
      bbox.height
    );
  }
  println!(
    "{}",
    json!({ "image_name": image_name, "box": run.result.items })
  );

  if let Some(endpoint) = args.upload
    && let Err(e) = upload(endpoint, &image_name, &run.annotated_image)
  {
    error!("上报失败: {}", e);
    return Ok(ExitCode::FAILURE);
  }

  Ok(ExitCode::SUCCESS)
}
