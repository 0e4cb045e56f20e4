// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 单张图像帧定义
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

use image::RgbImage;
use ndarray::{Array3, Array4, Axis, ShapeError};

const RGB_CHANNELS: usize = 3;

/// 从目录中读取的一张 RGB 图像，以及它的来源路径
#[derive(Debug, Clone)]
pub struct ImageFrame {
  path: PathBuf,
  image: RgbImage,
}

impl ImageFrame {
  pub fn new(path: impl Into<PathBuf>, image: RgbImage) -> Self {
    Self {
      path: path.into(),
      image,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 输入文件名（不含目录），输出文件沿用该名称
  pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
    self.path.file_name()
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 转为带批次维度的 NHWC 张量，形状为 (1, H, W, 3)
  pub fn to_batch(&self) -> Result<Array4<u8>, ShapeError> {
    let hwc = Array3::from_shape_vec(
      (
        self.height() as usize,
        self.width() as usize,
        RGB_CHANNELS,
      ),
      self.image.as_raw().clone(),
    )?;
    Ok(hwc.insert_axis(Axis(0)))
  }
}
