// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use thiserror::Error;
use tracing::warn;

use crate::{
  frame::ImageFrame,
  label::CategoryIndex,
  model::DetectResult,
  output::{Record, Render, draw::Visualizer},
};

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("输入 {0} 没有文件名")]
  MissingFileName(PathBuf),
  #[error("保存图像 {path} 失败: {source}")]
  Image {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
  #[error("写入记录 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// 把绘制后的图像以输入文件名保存到输出目录
///
/// 输出目录不会被自动创建。
pub struct SaveImageFileOutput<'a> {
  directory: PathBuf,
  visualizer: Visualizer,
  category_index: &'a CategoryIndex,
  record: Option<Record>,
}

impl<'a> SaveImageFileOutput<'a> {
  pub fn new(
    directory: impl Into<PathBuf>,
    visualizer: Visualizer,
    category_index: &'a CategoryIndex,
  ) -> Self {
    Self {
      directory: directory.into(),
      visualizer,
      category_index,
      record: None,
    }
  }

  pub fn with_record(mut self, record: Option<Record>) -> Self {
    self.record = record;
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// 输入帧对应的输出路径
  pub fn output_path(&self, frame: &ImageFrame) -> Result<PathBuf, SaveImageFileError> {
    frame
      .file_name()
      .map(|name| self.directory.join(name))
      .ok_or_else(|| SaveImageFileError::MissingFileName(frame.path().to_path_buf()))
  }

  fn save_image(&self, image: &image::RgbImage, path: &Path) -> Result<(), SaveImageFileError> {
    image.save(path).map_err(|source| SaveImageFileError::Image {
      path: path.to_path_buf(),
      source,
    })?;

    warn!("保存图像到文件: {}", path.display());

    Ok(())
  }
}

impl Render<ImageFrame, DetectResult> for SaveImageFileOutput<'_> {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &ImageFrame, result: &DetectResult) -> Result<(), Self::Error> {
    let path = self.output_path(frame)?;
    let image = self
      .visualizer
      .draw_detections(frame.image(), result, self.category_index);
    self.save_image(&image, &path)?;

    if let Some(record) = &self.record {
      let record_path = path.with_extension("json");
      record
        .record(frame, result, self.category_index, &record_path)
        .map_err(|source| SaveImageFileError::Io {
          path: record_path,
          source,
        })?;
    }

    Ok(())
  }
}
