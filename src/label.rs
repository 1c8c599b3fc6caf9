// 该文件是 Detjob （检测作业） 项目的一部分。
// src/label.rs - 类别标签表
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

use std::{borrow::Cow, collections::BTreeMap, path::Path, str::FromStr};

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行格式错误, 期望 '<编号>: <名称>': {text}")]
  Malformed { line: usize, text: String },
  #[error("第 {line} 行类别编号重复: {id}")]
  Duplicate { line: usize, id: u32 },
}

/// 类别编号到名称的映射，加载后只读
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
  names: BTreeMap<u32, String>,
}

impl LabelTable {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let table: LabelTable = text.parse()?;
    info!("加载标签表: {}, 共 {} 个类别", path.display(), table.len());
    Ok(table)
  }

  pub fn name(&self, class_id: u32) -> Option<&str> {
    self.names.get(&class_id).map(String::as_str)
  }

  /// 类别名称，未知编号显示为 `#<编号>`
  pub fn display(&self, class_id: u32) -> Cow<'_, str> {
    match self.name(class_id) {
      Some(name) => Cow::Borrowed(name),
      None => Cow::Owned(format!("#{}", class_id)),
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

impl FromStr for LabelTable {
  type Err = LabelError;

  fn from_str(text: &str) -> Result<Self, Self::Err> {
    let mut names = BTreeMap::new();
    for (idx, raw) in text.lines().enumerate() {
      let line = idx + 1;
      if raw.trim().is_empty() {
        continue;
      }

      let malformed = || LabelError::Malformed {
        line,
        text: raw.to_string(),
      };
      let (id, name) = raw.split_once(':').ok_or_else(malformed)?;
      let id: u32 = id.trim().parse().map_err(|_| malformed())?;
      let name = name.trim();
      if name.is_empty() {
        return Err(malformed());
      }

      if names.insert(id, name.to_string()).is_some() {
        return Err(LabelError::Duplicate { line, id });
      }
    }
    Ok(LabelTable { names })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_index_name_lines() {
    let table: LabelTable = "0: __background__\n1: person\n2: bicycle\n10: traffic light\n"
      .parse()
      .unwrap();
    assert_eq!(table.len(), 4);
    assert_eq!(table.name(1), Some("person"));
    assert_eq!(table.name(10), Some("traffic light"));
    assert_eq!(table.display(2), "bicycle");
    assert_eq!(table.display(99), "#99");
  }

  #[test]
  fn rejects_malformed_and_duplicate_lines() {
    assert!(matches!(
      "1: person\nbicycle\n".parse::<LabelTable>(),
      Err(LabelError::Malformed { line: 2, .. })
    ));
    assert!(matches!(
      "x: person".parse::<LabelTable>(),
      Err(LabelError::Malformed { line: 1, .. })
    ));
    assert!(matches!(
      "1: person\n1: car".parse::<LabelTable>(),
      Err(LabelError::Duplicate { line: 2, id: 1 })
    ));
  }

  #[test]
  fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.txt");
    std::fs::write(&path, "1: person\r\n3: car\r\n").unwrap();
    let table = LabelTable::load(&path).unwrap();
    assert_eq!(table.name(3), Some("car"));
    assert_eq!(table.name(1), Some("person"));
  }
}
