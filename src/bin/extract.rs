// 该文件是 Detjob （检测作业） 项目的一部分。
// src/bin/extract.rs - 批量标注目录中的图像
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

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use detjob::{
  FromUrl,
  draw::Draw,
  extract::{DEFAULT_SCORE_THRESHOLD, Extractor},
  label::LabelTable,
  model::ModelWrapper,
};

/// 对目录中的每张图像推理，将置信度超过阈值的检测框绘制到副本上
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测后端 URL（rknn:///m.rknn, yolov5:///w.pt, simulate:）
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像目录
  #[arg(long, value_name = "DIR")]
  pub input: PathBuf,
  /// 输出目录，文件名与输入相同
  #[arg(long, value_name = "DIR")]
  pub output: PathBuf,
  /// 标签表文件，每行 "<编号>: <名称>"
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 标签文本字体（TTF/OTF）
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
  /// 绘制阈值
  #[arg(long, default_value_t = DEFAULT_SCORE_THRESHOLD, value_name = "THRESHOLD")]
  pub threshold: f32,
}

fn main() -> Result<()> {
  detjob::init_tracing();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入目录: {}", args.input.display());
  info!("输出目录: {}", args.output.display());

  let labels = match &args.labels {
    Some(path) => LabelTable::load(path)?,
    None => LabelTable::default(),
  };
  let draw = match &args.font {
    Some(path) => Draw::default().with_font_file(path)?,
    None => Draw::default(),
  };
  let model = ModelWrapper::from_url(&args.model)?;

  let report = Extractor::new(&model, &labels, draw)
    .with_threshold(args.threshold)
    .extract(&args.input, &args.output)?;

  for failure in &report.failed {
    warn!("处理失败 {}: {}", failure.path.display(), failure.reason);
  }
  info!(
    "处理完成: 写出 {} 张, 失败 {} 张, 检测框 {} 个",
    report.written.len(),
    report.failed.len(),
    report.drawn
  );

  Ok(())
}
