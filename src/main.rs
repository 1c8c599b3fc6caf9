// 该文件是 Detjob （检测作业） 项目的一部分。
// src/main.rs - 作业对账主程序
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

use std::{
  io::Write,
  process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Parser, error::ErrorKind};
use tracing::{error, info};

use detjob::{
  FromUrl,
  job::{Job, reconcile},
  model::{ModelWrapper, SimulatedModel, Yolov5Builder},
};

/// 参数个数不符时的退出码
const EXIT_USAGE: u8 = 1;
/// 存在未匹配图像时的退出码，JSON 仍会输出
const EXIT_UNMATCHED: u8 = 2;

fn main() -> Result<ExitCode> {
  let args = match args::Args::try_parse() {
    Ok(args) => args,
    Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
    Err(e) => {
      let _ = e.print();
      return Ok(ExitCode::from(EXIT_USAGE));
    }
  };

  detjob::init_tracing();

  let model = match (&args.model, &args.weights) {
    (Some(url), _) => ModelWrapper::from_url(url)?,
    (None, Some(weights)) => ModelWrapper::Yolov5(
      Yolov5Builder::new(weights)
        .repo(&args.yolov5_repo)
        .python(&args.python)
        .keep_runs(args.keep_runs)
        .build(),
    ),
    (None, None) => ModelWrapper::Simulated(SimulatedModel),
  };
  info!("检测后端: {}", model.kind());
  info!("数据集根目录: {}", args.dataset_root.display());

  let mut job: Job = args.job.parse().context("作业 JSON 解析失败")?;
  let report = reconcile(&mut job, &model, &args.dataset_root, args.on_unmatched)?;

  let mut stdout = std::io::stdout().lock();
  writeln!(stdout, "{}", job.to_json()?)?;
  stdout.flush()?;

  if let Err(e) = report.ensure_consistent() {
    error!("对账错误: {}", e);
    return Ok(ExitCode::from(EXIT_UNMATCHED));
  }

  Ok(ExitCode::SUCCESS)
}
