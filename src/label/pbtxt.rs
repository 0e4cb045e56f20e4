// 该文件是 Shanan （山南西风） 项目的一部分。
// src/label/pbtxt.rs - Protobuf 文本格式读取
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

//! 只覆盖标签映射文件用到的 protobuf 文本格式子集：
//! 字段、嵌套消息、字符串/数字/枚举标量以及 `#` 注释。

use std::iter::Peekable;
use std::str::Chars;

use super::LabelMapError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
  Word(String),
  Text(String),
  Colon,
  Open,
  Close,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
  /// 数字或枚举标识符
  Word(String),
  /// 引号字符串
  Text(String),
  Message(Message),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Field {
  pub name: String,
  pub line: usize,
  pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Message {
  pub fields: Vec<Field>,
}

fn syntax(line: usize, message: impl Into<String>) -> LabelMapError {
  LabelMapError::Syntax {
    line,
    message: message.into(),
  }
}

fn is_word_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '+')
}

struct Lexer<'a> {
  chars: Peekable<Chars<'a>>,
  line: usize,
}

impl<'a> Lexer<'a> {
  fn new(text: &'a str) -> Self {
    Self {
      chars: text.chars().peekable(),
      line: 1,
    }
  }

  fn string(&mut self, quote: char) -> Result<String, LabelMapError> {
    let start = self.line;
    let mut out = String::new();
    loop {
      match self.chars.next() {
        None | Some('\n') => return Err(syntax(start, "字符串未闭合")),
        Some(c) if c == quote => return Ok(out),
        Some('\\') => match self.chars.next() {
          Some('n') => out.push('\n'),
          Some('t') => out.push('\t'),
          Some(c @ ('\\' | '\'' | '"')) => out.push(c),
          Some(c) => return Err(syntax(start, format!("不支持的转义字符 '\\{}'", c))),
          None => return Err(syntax(start, "字符串未闭合")),
        },
        Some(c) => out.push(c),
      }
    }
  }

  fn tokenize(mut self) -> Result<Vec<(usize, Token)>, LabelMapError> {
    let mut tokens = Vec::new();
    while let Some(c) = self.chars.next() {
      let token = match c {
        '\n' => {
          self.line += 1;
          continue;
        }
        c if c.is_whitespace() || c == ',' || c == ';' => continue,
        '#' => {
          while self.chars.next_if(|&c| c != '\n').is_some() {}
          continue;
        }
        ':' => Token::Colon,
        '{' | '<' => Token::Open,
        '}' | '>' => Token::Close,
        '"' | '\'' => Token::Text(self.string(c)?),
        c if is_word_char(c) => {
          let mut word = c.to_string();
          while let Some(c) = self.chars.next_if(|&c| is_word_char(c)) {
            word.push(c);
          }
          Token::Word(word)
        }
        c => return Err(syntax(self.line, format!("无法识别的字符 '{}'", c))),
      };
      tokens.push((self.line, token));
    }
    Ok(tokens)
  }
}

struct Parser {
  tokens: std::vec::IntoIter<(usize, Token)>,
  last_line: usize,
}

impl Parser {
  fn next(&mut self) -> Option<(usize, Token)> {
    let next = self.tokens.next();
    if let Some((line, _)) = &next {
      self.last_line = *line;
    }
    next
  }

  fn message(&mut self, nested: bool) -> Result<Message, LabelMapError> {
    let mut message = Message::default();
    loop {
      let (line, name) = match self.next() {
        None if nested => return Err(syntax(self.last_line, "缺少 '}'")),
        None => return Ok(message),
        Some((_, Token::Close)) if nested => return Ok(message),
        Some((line, Token::Word(name))) => (line, name),
        Some((line, token)) => {
          return Err(syntax(line, format!("期望字段名，实际为 {:?}", token)));
        }
      };

      let mut token = self.next();
      let has_colon = matches!(token, Some((_, Token::Colon)));
      if has_colon {
        token = self.next();
      }

      let value = match token {
        Some((_, Token::Open)) => Value::Message(self.message(true)?),
        Some((_, Token::Word(word))) if has_colon => Value::Word(word),
        Some((_, Token::Text(text))) if has_colon => Value::Text(text),
        _ => return Err(syntax(line, format!("字段 '{}' 缺少取值", name))),
      };

      message.fields.push(Field { name, line, value });
    }
  }
}

/// 解析 protobuf 文本格式为通用的消息树
pub(crate) fn parse(text: &str) -> Result<Message, LabelMapError> {
  let tokens = Lexer::new(text).tokenize()?;
  let mut parser = Parser {
    tokens: tokens.into_iter(),
    last_line: 1,
  };
  parser.message(false)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_nested_messages_and_scalars() {
    let text = r#"
      # comment
      item {
        id: 3,
        name: 'dog' # trailing
        display_name: "big \"dog\""
        frequency: FREQUENT
        keypoints { id: 0 label: "nose" }
      }
    "#;
    let message = parse(text).unwrap();
    assert_eq!(message.fields.len(), 1);
    let item = &message.fields[0];
    assert_eq!(item.name, "item");
    assert_eq!(item.line, 3);

    let Value::Message(item) = &item.value else {
      panic!("item 应为消息");
    };
    let values: Vec<_> = item.fields.iter().map(|f| (f.name.as_str(), &f.value)).collect();
    assert_eq!(values[0], ("id", &Value::Word("3".into())));
    assert_eq!(values[1], ("name", &Value::Text("dog".into())));
    assert_eq!(values[2], ("display_name", &Value::Text("big \"dog\"".into())));
    assert_eq!(values[3], ("frequency", &Value::Word("FREQUENT".into())));
    assert!(matches!(values[4].1, Value::Message(_)));
  }

  #[test]
  fn accepts_colon_before_block() {
    let message = parse("item: { id: 1 }").unwrap();
    assert!(matches!(message.fields[0].value, Value::Message(_)));
  }

  #[test]
  fn reports_line_of_syntax_errors() {
    let err = parse("item {\n  id: 1\n  name:\n}").unwrap_err();
    assert!(matches!(err, LabelMapError::Syntax { line: 3, .. }), "{err:?}");

    let err = parse("item {\n  id: 1\n").unwrap_err();
    assert!(matches!(err, LabelMapError::Syntax { .. }));

    let err = parse("item { name: 'open }").unwrap_err();
    assert!(matches!(err, LabelMapError::Syntax { line: 1, .. }));

    let err = parse("}").unwrap_err();
    assert!(matches!(err, LabelMapError::Syntax { line: 1, .. }));
  }
}
