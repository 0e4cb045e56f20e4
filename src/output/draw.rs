// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::{debug, warn};

use crate::label::CategoryIndex;
use crate::model::DetectResult;

pub const DEFAULT_MAX_BOXES_TO_DRAW: usize = 200;
pub const DEFAULT_MIN_SCORE_THRESH: f32 = 0.30;
pub const DEFAULT_LINE_THICKNESS: u32 = 4;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: u32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 无字体时每字符宽度的粗略估计
const LABEL_MARGIN_RATIO: f32 = 0.05;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

const PALETTE_SIZE: usize = 80;
const AGNOSTIC_COLOR: Rgb<u8> = Rgb([255, 140, 0]); // DarkOrange
const UNKNOWN_CLASS_NAME: &str = "N/A";

/// 未指定 `--font` 时使用的内置字体
const BUILTIN_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum FontError {
  #[error("读取字体文件 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("无效的字体文件: {0}")]
  Invalid(PathBuf),
}

/// 绘制选项
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizeOptions {
  /// 框坐标是否为 [0, 1] 归一化坐标
  pub use_normalized_coordinates: bool,
  pub max_boxes_to_draw: usize,
  /// 分数严格大于该阈值才绘制
  pub min_score_thresh: f32,
  /// 不区分类别：不显示类名，统一颜色
  pub agnostic_mode: bool,
  pub line_thickness: u32,
  pub skip_scores: bool,
  pub skip_labels: bool,
}

impl Default for VisualizeOptions {
  fn default() -> Self {
    Self {
      use_normalized_coordinates: true,
      max_boxes_to_draw: DEFAULT_MAX_BOXES_TO_DRAW,
      min_score_thresh: DEFAULT_MIN_SCORE_THRESH,
      agnostic_mode: false,
      line_thickness: DEFAULT_LINE_THICKNESS,
      skip_scores: false,
      skip_labels: false,
    }
  }
}

/// 一个待绘制的框以及叠在它上面的标签
#[derive(Debug, Clone, PartialEq)]
pub struct BoxLabel {
  /// [y_min, x_min, y_max, x_max]
  pub bbox: [f32; 4],
  pub color: Rgb<u8>,
  pub display_strings: Vec<String>,
}

/// 像素坐标下的框，边界包含在内
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelBox {
  left: i32,
  top: i32,
  right: i32,
  bottom: i32,
}

/// 检测结果可视化工具
pub struct Visualizer {
  options: VisualizeOptions,
  font: Option<FontArc>,
  font_scale: PxScale,
  colors: Vec<Rgb<u8>>,
}

impl Default for Visualizer {
  fn default() -> Self {
    Self::new(VisualizeOptions::default())
  }
}

impl Visualizer {
  pub fn new(options: VisualizeOptions) -> Self {
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      options,
      font: builtin_font(),
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      colors,
    }
  }

  /// 替换内置字体
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn load_font(path: &Path) -> Result<FontArc, FontError> {
    let data = std::fs::read(path).map_err(|source| FontError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    FontVec::try_from_vec(data)
      .map(FontArc::new)
      .map_err(|_| FontError::Invalid(path.to_path_buf()))
  }

  pub fn options(&self) -> &VisualizeOptions {
    &self.options
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn class_color(&self, class_id: i64) -> Rgb<u8> {
    if self.options.agnostic_mode {
      return AGNOSTIC_COLOR;
    }
    self.colors[class_id.rem_euclid(self.colors.len() as i64) as usize]
  }

  fn display_string(&self, class_id: i64, score: f32, category_index: &CategoryIndex) -> String {
    let mut display = String::new();
    if !self.options.skip_labels && !self.options.agnostic_mode {
      display.push_str(category_index.name(class_id).unwrap_or(UNKNOWN_CLASS_NAME));
    }
    if !self.options.skip_scores {
      let percent = (100.0 * score).round_ties_even() as i64;
      if display.is_empty() {
        display = format!("{}%", percent);
      } else {
        display = format!("{}: {}%", display, percent);
      }
    }
    display
  }

  /// 挑选需要绘制的检测并按框合并标签
  ///
  /// 只看前 `max_boxes_to_draw` 个检测；坐标完全相同的框只画一次，标签按出现顺序叠放，颜色取最后一个检测的类别。
  pub fn box_labels(&self, result: &DetectResult, category_index: &CategoryIndex) -> Vec<BoxLabel> {
    let limit = self.options.max_boxes_to_draw.min(result.len());
    let mut labels: Vec<BoxLabel> = Vec::new();

    for i in 0..limit {
      let score = result.scores[i];
      if score.is_nan() || score <= self.options.min_score_thresh {
        continue;
      }

      let row = result.boxes.row(i);
      let bbox = [row[0], row[1], row[2], row[3]];
      let class_id = result.classes[i];
      let display = self.display_string(class_id, score, category_index);

      match labels.iter_mut().find(|label| label.bbox == bbox) {
        Some(label) => {
          label.color = self.class_color(class_id);
          label.display_strings.push(display);
        }
        None => labels.push(BoxLabel {
          bbox,
          color: self.class_color(class_id),
          display_strings: vec![display],
        }),
      }
    }

    labels
  }

  fn to_pixel_box(&self, bbox: &[f32; 4], width: u32, height: u32) -> Option<PixelBox> {
    let (w, h) = (width as f32, height as f32);
    let [y_min, x_min, y_max, x_max] = *bbox;
    let (top, left, bottom, right) = if self.options.use_normalized_coordinates {
      (y_min * h, x_min * w, y_max * h, x_max * w)
    } else {
      (y_min, x_min, y_max, x_max)
    };

    let max_x = width as i32 - 1;
    let max_y = height as i32 - 1;
    let pixel = PixelBox {
      left: (left.round() as i32).clamp(0, max_x),
      top: (top.round() as i32).clamp(0, max_y),
      right: (right.round() as i32).clamp(0, max_x),
      bottom: (bottom.round() as i32).clamp(0, max_y),
    };

    (pixel.left < pixel.right && pixel.top < pixel.bottom).then_some(pixel)
  }

  fn draw_box(&self, image: &mut RgbImage, pixel: PixelBox, color: Rgb<u8>) {
    for offset in 0..self.options.line_thickness.max(1) as i32 {
      let left = pixel.left + offset;
      let top = pixel.top + offset;
      let right = pixel.right - offset;
      let bottom = pixel.bottom - offset;
      if left > right || top > bottom {
        break;
      }
      let rect = Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
      draw_hollow_rect_mut(image, rect, color);
    }
  }

  fn text_width(&self, text: &str) -> u32 {
    match &self.font {
      Some(font) => text_size(self.font_scale, font, text).0,
      None => (text.chars().count() as f32 * LABEL_CHAR_WIDTH).ceil() as u32,
    }
  }

  fn line_height(&self) -> u32 {
    match &self.font {
      Some(_) => self.font_scale.y.ceil() as u32,
      None => LABEL_TEXT_HEIGHT,
    }
  }

  // 标签默认画在框的上方，空间不够时画在框下方
  fn draw_labels(&self, image: &mut RgbImage, pixel: PixelBox, strings: &[String], color: Rgb<u8>) {
    let strings: Vec<&String> = strings.iter().filter(|s| !s.is_empty()).collect();
    if strings.is_empty() {
      return;
    }

    let text_height = self.line_height() as f32;
    let margin = (LABEL_MARGIN_RATIO * text_height).ceil();
    let total_height = (1.0 + 2.0 * LABEL_MARGIN_RATIO) * text_height * strings.len() as f32;

    let mut text_bottom = if pixel.top as f32 > total_height {
      pixel.top as f32
    } else {
      pixel.bottom as f32 + total_height
    };

    for text in strings.iter().rev() {
      let text_width = self.text_width(text);
      let bar_height = (text_height + 2.0 * margin).ceil() as u32;
      let bar_top = (text_bottom - bar_height as f32).round() as i32;

      if text_width > 0 {
        let rect = Rect::at(pixel.left, bar_top).of_size(text_width + 2 * margin as u32, bar_height);
        draw_filled_rect_mut(image, rect, color);
      }

      if let Some(font) = &self.font {
        draw_text_mut(
          image,
          LABEL_TEXT_COLOR,
          pixel.left + margin as i32,
          bar_top + margin as i32,
          self.font_scale,
          font,
          text,
        );
      }

      text_bottom -= bar_height as f32;
    }
  }

  /// 在图像副本上绘制检测框与标签，原图不变
  pub fn draw_detections(
    &self,
    image: &RgbImage,
    result: &DetectResult,
    category_index: &CategoryIndex,
  ) -> RgbImage {
    let mut canvas = image.clone();
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
      return canvas;
    }

    for label in self.box_labels(result, category_index) {
      let Some(pixel) = self.to_pixel_box(&label.bbox, width, height) else {
        debug!("跳过退化的检测框: {:?}", label.bbox);
        continue;
      };
      self.draw_box(&mut canvas, pixel, label.color);
      self.draw_labels(&mut canvas, pixel, &label.display_strings, label.color);
    }

    canvas
  }
}

/// 加载 `--font` 指定的字体，未指定时返回 `None`，沿用内置字体
pub fn resolve_font(path: Option<&Path>) -> Result<Option<FontArc>, FontError> {
  let Some(path) = path else {
    return Ok(None);
  };
  let font = Visualizer::load_font(path)?;
  debug!("使用字体: {}", path.display());
  Ok(Some(font))
}

fn builtin_font() -> Option<FontArc> {
  match FontArc::try_from_slice(BUILTIN_FONT) {
    Ok(font) => Some(font),
    Err(err) => {
      warn!("内置字体无法解析: {}，标签将只绘制底色", err);
      None
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::label::Category;
  use ndarray::{Array1, Array2};
  use std::collections::BTreeMap;

  const BACKGROUND: Rgb<u8> = Rgb([10, 200, 10]);

  fn index() -> CategoryIndex {
    [
      Category {
        id: 1,
        name: "person".into(),
      },
      Category {
        id: 2,
        name: "dog".into(),
      },
    ]
    .into_iter()
    .collect()
  }

  fn result(boxes: &[[f32; 4]], classes: &[i64], scores: &[f32]) -> DetectResult {
    let flat: Vec<f32> = boxes.iter().flatten().copied().collect();
    DetectResult {
      num_detections: boxes.len(),
      boxes: Array2::from_shape_vec((boxes.len(), 4), flat).unwrap(),
      classes: Array1::from(classes.to_vec()),
      scores: Array1::from(scores.to_vec()),
      extras: BTreeMap::new(),
    }
  }

  #[test]
  fn draws_normalized_box_in_class_color() {
    let visualizer = Visualizer::default();
    let image = RgbImage::from_pixel(100, 100, BACKGROUND);
    let detections = result(&[[0.2, 0.1, 0.9, 0.8]], &[1], &[0.9]);

    let drawn = visualizer.draw_detections(&image, &detections, &index());
    let color = visualizer.class_color(1);

    // 左、右边
    assert_eq!(*drawn.get_pixel(10, 55), color);
    assert_eq!(*drawn.get_pixel(13, 55), color);
    assert_eq!(*drawn.get_pixel(80, 55), color);
    // 上边
    assert_eq!(*drawn.get_pixel(45, 20), color);
    // 框内与框外保持不变
    assert_eq!(*drawn.get_pixel(45, 55), BACKGROUND);
    assert_eq!(*drawn.get_pixel(5, 55), BACKGROUND);
    assert_eq!(*drawn.get_pixel(90, 55), BACKGROUND);
    // 原图不变
    assert_eq!(*image.get_pixel(10, 55), BACKGROUND);
  }

  #[test]
  fn nothing_drawn_leaves_image_identical() {
    let visualizer = Visualizer::default();
    let image = RgbImage::from_pixel(40, 30, BACKGROUND);

    let empty = DetectResult::empty();
    assert_eq!(visualizer.draw_detections(&image, &empty, &index()), image);

    let low = result(&[[0.1, 0.1, 0.5, 0.5]], &[1], &[0.3]);
    assert_eq!(visualizer.draw_detections(&image, &low, &index()), image);
  }

  #[test]
  fn labels_use_names_and_rounded_scores() {
    let visualizer = Visualizer::default();
    let detections = result(
      &[[0.2, 0.1, 0.9, 0.8], [0.0, 0.0, 0.5, 0.5], [0.1, 0.1, 0.2, 0.2]],
      &[1, 7, 2],
      &[0.9, 0.456, 0.1],
    );

    let labels = visualizer.box_labels(&detections, &index());
    assert_eq!(labels.len(), 2);
    assert_eq!(labels[0].display_strings, vec!["person: 90%"]);
    assert_eq!(labels[1].display_strings, vec!["N/A: 46%"]);
    assert_eq!(labels[1].color, visualizer.class_color(7));
  }

  #[test]
  fn identical_boxes_share_one_label_stack() {
    let visualizer = Visualizer::default();
    let detections = result(
      &[[0.2, 0.2, 0.6, 0.6], [0.2, 0.2, 0.6, 0.6]],
      &[1, 2],
      &[0.8, 0.7],
    );

    let labels = visualizer.box_labels(&detections, &index());
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].display_strings, vec!["person: 80%", "dog: 70%"]);
    assert_eq!(labels[0].color, visualizer.class_color(2));
  }

  #[test]
  fn respects_box_cap_and_options() {
    let options = VisualizeOptions {
      max_boxes_to_draw: 1,
      agnostic_mode: true,
      ..VisualizeOptions::default()
    };
    let visualizer = Visualizer::new(options);
    let detections = result(&[[0.0, 0.0, 0.5, 0.5], [0.5, 0.5, 1.0, 1.0]], &[1, 2], &[0.9, 0.9]);

    let labels = visualizer.box_labels(&detections, &index());
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].display_strings, vec!["90%"]);
    assert_eq!(labels[0].color, AGNOSTIC_COLOR);

    let options = VisualizeOptions {
      skip_scores: true,
      ..VisualizeOptions::default()
    };
    let labels = Visualizer::new(options).box_labels(&detections, &index());
    assert_eq!(labels[1].display_strings, vec!["dog"]);
  }

  #[test]
  fn pixel_coordinates_are_used_as_is() {
    let options = VisualizeOptions {
      use_normalized_coordinates: false,
      line_thickness: 1,
      ..VisualizeOptions::default()
    };
    let visualizer = Visualizer::new(options);
    let image = RgbImage::from_pixel(50, 50, BACKGROUND);
    let detections = result(&[[40.0, 5.0, 45.0, 30.0]], &[2], &[0.5]);

    let drawn = visualizer.draw_detections(&image, &detections, &index());
    assert_eq!(*drawn.get_pixel(5, 42), visualizer.class_color(2));
    assert_eq!(*drawn.get_pixel(6, 42), BACKGROUND);
  }

  #[test]
  fn palette_wraps_for_large_and_negative_ids() {
    let visualizer = Visualizer::default();
    assert_eq!(visualizer.class_color(3), visualizer.class_color(3 + PALETTE_SIZE as i64));
    assert_eq!(visualizer.class_color(-1), visualizer.class_color(PALETTE_SIZE as i64 - 1));
  }

  #[test]
  fn unreadable_font_is_an_error() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("font.ttf");
    assert!(matches!(Visualizer::load_font(&path), Err(FontError::Io { .. })));

    std::fs::write(&path, b"not a font").unwrap();
    assert!(matches!(Visualizer::load_font(&path), Err(FontError::Invalid(_))));
    assert!(matches!(resolve_font(Some(path.as_path())), Err(FontError::Invalid(_))));
    assert!(resolve_font(None).unwrap().is_none());
  }

  #[test]
  fn label_text_is_drawn_with_builtin_font() {
    let visualizer = Visualizer::default();
    assert!(visualizer.has_font());

    let image = RgbImage::from_pixel(200, 200, BACKGROUND);
    let detections = result(&[[0.3, 0.1, 0.9, 0.8]], &[1], &[0.9]);
    let drawn = visualizer.draw_detections(&image, &detections, &index());
    let color = visualizer.class_color(1);

    // 框上方有足够空间，标签底色位于 y = 38..60
    assert_eq!(*drawn.get_pixel(20, 45), color);
    let glyph_pixels = (38..60)
      .flat_map(|y| (20..200).map(move |x| (x, y)))
      .filter(|&(x, y)| drawn.get_pixel(x, y).0.iter().all(|&c| c < 40))
      .count();
    assert!(glyph_pixels > 20, "only {glyph_pixels} text pixels");
  }

  #[test]
  fn nan_scores_are_not_drawn() {
    let visualizer = Visualizer::default();
    let detections = result(
      &[[0.1, 0.1, 0.5, 0.5], [0.2, 0.2, 0.6, 0.6]],
      &[1, 2],
      &[f32::NAN, 0.5],
    );

    let labels = visualizer.box_labels(&detections, &index());
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].display_strings, vec!["dog: 50%"]);
  }

  #[test]
  fn percentages_round_half_to_even() {
    let visualizer = Visualizer::default();
    let detections = result(
      &[[0.1, 0.1, 0.5, 0.5], [0.2, 0.2, 0.6, 0.6]],
      &[1, 2],
      &[0.125, 0.375],
    );

    let labels = visualizer.box_labels(&detections, &index());
    assert_eq!(labels[0].display_strings, vec!["person: 12%"]);
    assert_eq!(labels[1].display_strings, vec!["dog: 38%"]);
  }

  #[test]
  fn empty_class_name_shows_only_score() {
    let visualizer = Visualizer::default();
    let index: CategoryIndex = [Category {
      id: 3,
      name: String::new(),
    }]
    .into_iter()
    .collect();
    let detections = result(&[[0.1, 0.1, 0.5, 0.5]], &[3], &[0.9]);

    let labels = visualizer.box_labels(&detections, &index);
    assert_eq!(labels[0].display_strings, vec!["90%"]);
  }
}
