// 该文件是 Detjob （检测作业） 项目的一部分。
// tests/common/mod.rs - 测试公共工具
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

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

/// 写入一张指定尺寸的纯白 PNG
pub fn write_test_image(path: &Path, width: u32, height: u32) {
  RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
    .save(path)
    .expect("Failed to save test image");
}

/// 按 YOLOv5 的方式写出固定结果文件的 `detect.py` 替身
const STUB_DETECT_OK: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --source) source="$2"; shift 2 ;;
    --project) project="$2"; shift 2 ;;
    --name) name="$2"; shift 2 ;;
    *) shift ;;
  esac
done
stem=$(basename "$source")
stem="${stem%.*}"
mkdir -p "$project/$name/labels"
cp "$source" "$project/$name/"
printf '1 0.5 0.5 0.2 0.2 0.9\n0 0.25 0.25 0.1 0.1 0.4\n' > "$project/$name/labels/$stem.txt"
"#;

/// 模拟检测进程崩溃
const STUB_DETECT_FAIL: &str = r#"
echo "RuntimeError: CUDA out of memory" >&2
exit 3
"#;

/// 正常退出但不写结果文件
const STUB_DETECT_SILENT: &str = r#"
exit 0
"#;

pub enum StubKind {
  Ok,
  Fail,
  Silent,
}

/// 创建假的 YOLOv5 仓库，其中 `detect.py` 是 shell 脚本，需以 `sh` 作为解释器运行
pub fn stub_yolov5_repo(root: &Path, kind: StubKind) -> PathBuf {
  let repo = root.join("yolov5");
  std::fs::create_dir_all(&repo).expect("Failed to create stub repo");
  let script = match kind {
    StubKind::Ok => STUB_DETECT_OK,
    StubKind::Fail => STUB_DETECT_FAIL,
    StubKind::Silent => STUB_DETECT_SILENT,
  };
  std::fs::write(repo.join("detect.py"), script).expect("Failed to write stub detect.py");
  repo
}
