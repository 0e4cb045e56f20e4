// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/record.rs - 检测结果记录
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

use std::path::Path;

use serde_json::{Value, json};

use crate::{frame::ImageFrame, label::CategoryIndex, model::DetectResult};

/// 将截取后的检测结果写成 JSON 文件
pub struct Record {
  pub label_with_name: bool,
}

impl Default for Record {
  fn default() -> Self {
    Self {
      label_with_name: true,
    }
  }
}

impl Record {
  pub fn to_json(
    &self,
    frame: &ImageFrame,
    result: &DetectResult,
    category_index: &CategoryIndex,
  ) -> Value {
    let detections: Vec<Value> = (0..result.len())
      .map(|i| {
        let bbox = result.boxes.row(i);
        let class_id = result.classes[i];
        let mut item = json!({
          "box": [bbox[0], bbox[1], bbox[2], bbox[3]],
          "class_id": class_id,
          "score": result.scores[i],
        });
        if self.label_with_name {
          item["label"] = json!(category_index.name(class_id));
        }
        item
      })
      .collect();

    json!({
      "image": frame.file_name().map(|name| name.to_string_lossy().into_owned()),
      "width": frame.width(),
      "height": frame.height(),
      "num_detections": result.len(),
      "detections": detections,
    })
  }

  pub fn record(
    &self,
    frame: &ImageFrame,
    result: &DetectResult,
    category_index: &CategoryIndex,
    path: &Path,
  ) -> Result<(), std::io::Error> {
    let value = self.to_json(frame, result, category_index);
    let text = serde_json::to_string_pretty(&value).map_err(std::io::Error::other)?;
    std::fs::write(path, text)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::label::Category;
  use image::RgbImage;
  use ndarray::{Array1, Array2};
  use std::collections::BTreeMap;

  #[test]
  fn writes_every_trimmed_detection() {
    let frame = ImageFrame::new("images/test/street.jpg", RgbImage::new(64, 32));
    let result = DetectResult {
      num_detections: 2,
      boxes: Array2::from_shape_vec((2, 4), vec![0.25, 0.5, 0.75, 1.0, 0.0, 0.0, 0.5, 0.5])
        .unwrap(),
      classes: Array1::from(vec![1, 9]),
      scores: Array1::from(vec![0.5, 0.25]),
      extras: BTreeMap::new(),
    };
    let index: CategoryIndex = [Category {
      id: 1,
      name: "person".into(),
    }]
    .into_iter()
    .collect();

    let value = Record::default().to_json(&frame, &result, &index);
    assert_eq!(value["image"], "street.jpg");
    assert_eq!(value["width"], 64);
    assert_eq!(value["num_detections"], 2);
    assert_eq!(value["detections"][0]["label"], "person");
    assert_eq!(value["detections"][0]["box"], json!([0.25, 0.5, 0.75, 1.0]));
    assert_eq!(value["detections"][1]["class_id"], 9);
    assert!(value["detections"][1]["label"].is_null());

    let ids_only = Record {
      label_with_name: false,
    }
    .to_json(&frame, &result, &index);
    assert!(ids_only["detections"][0].get("label").is_none());
  }
}
