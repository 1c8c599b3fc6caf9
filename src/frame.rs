// 该文件是 Detjob （检测作业） 项目的一部分。
// src/frame.rs - 解码后的图像帧
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

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("image decode error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 图像帧：解码后的 RGB 图像及其来源路径
#[derive(Debug, Clone)]
pub struct ImageFrame {
  pub path: PathBuf,
  pub image: RgbImage,
}

impl ImageFrame {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, FrameError> {
    let path = path.as_ref();
    let image = ImageReader::open(path)?
      .with_guessed_format()?
      .decode()?
      .to_rgb8();

    Ok(ImageFrame {
      path: path.to_path_buf(),
      image,
    })
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// 原始文件名，用于输出同名文件
  pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
    self.path.file_name()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn opens_png_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.png");
    RgbImage::from_pixel(8, 4, image::Rgb([1, 2, 3]))
      .save(&path)
      .unwrap();

    let frame = ImageFrame::open(&path).unwrap();
    assert_eq!((frame.width(), frame.height()), (8, 4));
    assert_eq!(frame.file_name().unwrap(), "a.png");
    assert_eq!(frame.image.get_pixel(0, 0).0, [1, 2, 3]);
  }

  #[test]
  fn missing_or_garbage_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageFrame::open(dir.path().join("none.jpg")),
      Err(FrameError::IoError(_))
    ));

    let garbage = dir.path().join("garbage.jpg");
    std::fs::write(&garbage, b"not an image").unwrap();
    assert!(matches!(
      ImageFrame::open(&garbage),
      Err(FrameError::ImageLoadError(_))
    ));
  }
}
