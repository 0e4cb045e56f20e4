// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/image_dir.rs - 图像目录输入
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

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, info};

use crate::frame::ImageFrame;

/// 只处理以该后缀结尾的文件（区分大小写）
pub const IMAGE_FILE_SUFFIX: &str = ".jpg";

#[derive(Error, Debug)]
pub enum ImageDirInputError {
  #[error("读取目录 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("加载图像 {path} 失败: {source}")]
  ImageLoad {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
}

/// 列出目录下文件名以 `.jpg` 结尾的文件，不递归子目录，顺序与目录遍历顺序一致
pub fn list_image_paths(dir: &Path) -> Result<Vec<PathBuf>, ImageDirInputError> {
  let io_error = |source| ImageDirInputError::Io {
    path: dir.to_path_buf(),
    source,
  };

  let mut paths = Vec::new();
  for entry in std::fs::read_dir(dir).map_err(io_error)? {
    let entry = entry.map_err(io_error)?;
    let path = entry.path();

    // 按字节比较，非 UTF-8 文件名同样保留
    let matched = entry
      .file_name()
      .as_encoded_bytes()
      .ends_with(IMAGE_FILE_SUFFIX.as_bytes());
    if !matched || path.is_dir() {
      debug!("跳过: {}", path.display());
      continue;
    }
    paths.push(path);
  }

  info!("在 {} 中找到 {} 张图像", dir.display(), paths.len());
  Ok(paths)
}

/// 解码一张图像为 RGB8 帧
pub fn load_image_frame(path: &Path) -> Result<ImageFrame, ImageDirInputError> {
  let image = ImageReader::open(path)
    .map_err(|source| ImageDirInputError::Io {
      path: path.to_path_buf(),
      source,
    })?
    .decode()
    .map_err(|source| ImageDirInputError::ImageLoad {
      path: path.to_path_buf(),
      source,
    })?;

  Ok(ImageFrame::new(path, image.into_rgb8()))
}

/// 按目录顺序惰性解码图像的输入源
pub struct ImageDirInput {
  paths: std::vec::IntoIter<PathBuf>,
}

impl ImageDirInput {
  pub fn open(dir: &Path) -> Result<Self, ImageDirInputError> {
    Ok(Self::from_paths(list_image_paths(dir)?))
  }

  pub fn from_paths(paths: Vec<PathBuf>) -> Self {
    Self {
      paths: paths.into_iter(),
    }
  }

  /// 剩余待处理的图像数量
  pub fn remaining(&self) -> usize {
    self.paths.len()
  }
}

impl Iterator for ImageDirInput {
  type Item = Result<ImageFrame, ImageDirInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.paths.next().map(|path| load_image_frame(&path))
  }
}
