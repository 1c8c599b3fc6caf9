// 该文件是 Detjob （检测作业） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

use detjob::job::UnmatchedPolicy;

/// 检测作业对账：对作业中的每张图像推理，把结果合并进对应的结果槽，
/// 并将整个作业以 JSON 写到标准输出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 作业 JSON: {"images": [{"id", "path"}], "results": [{"imageId", "data"}]}
  #[arg(value_name = "JOB_DATA")]
  pub job: String,

  /// YOLOv5 权重文件路径；省略时使用模拟检测
  #[arg(value_name = "WEIGHTS")]
  pub weights: Option<PathBuf>,

  /// 检测后端 URL，优先于 WEIGHTS（simulate:, yolov5:///w.pt, rknn:///m.rknn）
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,

  /// 图像路径的根目录
  #[arg(long, env = "DETJOB_DATASET_ROOT", default_value = "/dataset", value_name = "DIR")]
  pub dataset_root: PathBuf,

  /// YOLOv5 仓库目录（包含 detect.py）
  #[arg(long, env = "DETJOB_YOLOV5_REPO", default_value = "yolov5", value_name = "DIR")]
  pub yolov5_repo: PathBuf,

  /// 运行 detect.py 的 Python 解释器
  #[arg(long, env = "DETJOB_PYTHON", default_value = "python", value_name = "EXE")]
  pub python: String,

  /// 保留每张图像的 YOLOv5 运行目录（默认推理后删除）
  #[arg(long)]
  pub keep_runs: bool,

  /// 图像没有唯一结果槽时的处理方式
  #[arg(long, value_enum, default_value_t = UnmatchedPolicy::Error)]
  pub on_unmatched: UnmatchedPolicy,
}
