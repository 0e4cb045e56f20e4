// 该文件是 Shanan （山南西风） 项目的一部分。
// src/label.rs - 标签映射与类别索引
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

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info};

mod pbtxt;

use self::pbtxt::Value;

const BACKGROUND_NAME: &str = "background";

#[derive(Error, Debug)]
pub enum LabelMapError {
  #[error("读取标签文件 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("标签文件第 {line} 行语法错误: {message}")]
  Syntax { line: usize, message: String },
  #[error("标签文件第 {line} 行字段 '{field}' 取值无效: {value}")]
  InvalidValue {
    line: usize,
    field: String,
    value: String,
  },
  #[error("标签 id 必须 >= 0，实际为 {0}")]
  NegativeId(i64),
  #[error("标签 id 0 保留给 background，实际名称为 '{0}'")]
  ReservedBackgroundId(String),
  #[error("标签映射中没有任何 item")]
  Empty,
}

/// 标签映射中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelItem {
  pub id: i64,
  pub name: Option<String>,
  pub display_name: Option<String>,
}

impl LabelItem {
  fn from_message(message: pbtxt::Message) -> Result<Self, LabelMapError> {
    let mut item = LabelItem {
      id: 0,
      name: None,
      display_name: None,
    };

    for field in message.fields {
      let text = match field.value {
        Value::Word(word) | Value::Text(word) => word,
        Value::Message(_) => continue,
      };
      match field.name.as_str() {
        "id" => {
          item.id = text.parse().map_err(|_| LabelMapError::InvalidValue {
            line: field.line,
            field: field.name.clone(),
            value: text,
          })?;
        }
        "name" => item.name = Some(text),
        "display_name" => item.display_name = Some(text),
        other => debug!("忽略标签字段: {}", other),
      }
    }

    Ok(item)
  }

  fn is_background(&self) -> bool {
    self.name.as_deref() == Some(BACKGROUND_NAME)
      || self.display_name.as_deref() == Some(BACKGROUND_NAME)
  }
}

/// 一个类别：id 与用于显示的名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
  pub id: i64,
  pub name: String,
}

/// 类别 id 到类别的只读索引
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryIndex {
  categories: BTreeMap<i64, Category>,
}

impl CategoryIndex {
  pub fn get(&self, id: i64) -> Option<&Category> {
    self.categories.get(&id)
  }

  pub fn name(&self, id: i64) -> Option<&str> {
    self.get(id).map(|c| c.name.as_str())
  }

  pub fn len(&self) -> usize {
    self.categories.len()
  }

  pub fn is_empty(&self) -> bool {
    self.categories.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Category> {
    self.categories.values()
  }
}

impl FromIterator<Category> for CategoryIndex {
  fn from_iter<I: IntoIterator<Item = Category>>(iter: I) -> Self {
    Self {
      categories: iter.into_iter().map(|c| (c.id, c)).collect(),
    }
  }
}

/// 解析后的标签映射文件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
  items: Vec<LabelItem>,
}

impl FromStr for LabelMap {
  type Err = LabelMapError;

  fn from_str(text: &str) -> Result<Self, Self::Err> {
    let message = pbtxt::parse(text)?;
    let items = message
      .fields
      .into_iter()
      .filter_map(|field| match (field.name.as_str(), field.value) {
        ("item", Value::Message(message)) => Some(LabelItem::from_message(message)),
        (name, _) => {
          debug!("忽略顶层字段: {}", name);
          None
        }
      })
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self { items })
  }
}

impl LabelMap {
  pub fn from_file(path: &Path) -> Result<Self, LabelMapError> {
    let text = std::fs::read_to_string(path).map_err(|source| LabelMapError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    text.parse()
  }

  pub fn items(&self) -> &[LabelItem] {
    &self.items
  }

  /// id 必须非负，id 0 只能用于 background
  pub fn validate(&self) -> Result<(), LabelMapError> {
    for item in &self.items {
      if item.id < 0 {
        return Err(LabelMapError::NegativeId(item.id));
      }
      if item.id == 0 && !item.is_background() {
        let name = item.display_name.clone().or(item.name.clone()).unwrap_or_default();
        return Err(LabelMapError::ReservedBackgroundId(name));
      }
    }
    Ok(())
  }

  pub fn max_id(&self) -> Option<i64> {
    self.items.iter().map(|item| item.id).max()
  }

  /// 转为类别列表，只保留 `1..=max_num_classes` 范围内的 id，重复的 id 以首次出现为准
  pub fn categories(&self, max_num_classes: i64, use_display_name: bool) -> Vec<Category> {
    let mut categories: Vec<Category> = Vec::new();
    for item in &self.items {
      if !(1..=max_num_classes).contains(&item.id) {
        info!("忽略 id 为 {} 的标签项：超出类别范围", item.id);
        continue;
      }
      if categories.iter().any(|c| c.id == item.id) {
        continue;
      }

      let name = use_display_name
        .then(|| item.display_name.clone())
        .flatten()
        .or_else(|| item.name.clone())
        .unwrap_or_default();
      categories.push(Category { id: item.id, name });
    }
    categories
  }

  pub fn category_index(&self, use_display_name: bool) -> Result<CategoryIndex, LabelMapError> {
    let max_num_classes = self.max_id().ok_or(LabelMapError::Empty)?;
    Ok(
      self
        .categories(max_num_classes, use_display_name)
        .into_iter()
        .collect(),
    )
  }
}

/// 读取、校验标签文件并构建类别索引
pub fn load_category_index(
  path: &Path,
  use_display_name: bool,
) -> Result<CategoryIndex, LabelMapError> {
  let label_map = LabelMap::from_file(path)?;
  label_map.validate()?;
  let index = label_map.category_index(use_display_name)?;
  info!("从 {} 加载了 {} 个类别", path.display(), index.len());
  Ok(index)
}
