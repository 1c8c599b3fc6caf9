// 该文件是 Detjob （检测作业） 项目的一部分。
// src/upload.rs - 推理结果上报
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

use reqwest::{StatusCode, blocking::Client};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

#[derive(Error, Debug)]
pub enum UploadError {
  #[error("HTTP 请求错误: {0}")]
  HttpError(#[from] reqwest::Error),
  #[error("上报失败, 状态码: {0}")]
  Status(StatusCode),
}

#[derive(Debug, Serialize)]
struct UploadBody<'a> {
  image_name: &'a str,
  image_path: &'a str,
}

/// 将结果图像的位置 POST 到固定地址，只有 200 视为成功
pub struct Uploader {
  client: Client,
  endpoint: Url,
}

impl Uploader {
  pub fn new(endpoint: Url) -> Result<Self, UploadError> {
    let client = Client::builder().build()?;
    Ok(Self { client, endpoint })
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }

  pub fn upload(&self, image_name: &str, image_path: &str) -> Result<(), UploadError> {
    info!("上报结果图像 {} 到 {}", image_name, self.endpoint);
    let response = self
      .client
      .post(self.endpoint.clone())
      .json(&UploadBody {
        image_name,
        image_path,
      })
      .send()?;

    match response.status() {
      StatusCode::OK => Ok(()),
      status => {
        warn!("上报失败: {}", status);
        Err(UploadError::Status(status))
      }
    }
  }
}
