//! INI 文本解析器。
//!
//! # 教案式说明
//! - **意图（Why）**：把半结构化的 INI 文本转换为按出现顺序排列的 [`ConfigEntry`] 列表，
//!   供分层存储按加载顺序合并；
//! - **逻辑（How）**：单遍、逐行扫描，唯一的状态是“当前 section”（初始为空串）：
//!   1. 以 `\r\n`、`\n`、`\r` 或 SUB（0x1A）切分行；
//!   2. 去除首尾空白后依次识别 section 头、注释行、`key = value` 行；
//!   3. 不含 `=` 的行按续行规则追加到上一条目；空值行是删除指令，立即回调调用方；
//! - **契约（What）**：解析器本身不持有状态、永不失败。畸形行被静默忽略，
//!   仅文件读取失败会经由 [`parse_file`] 以 [`ConfigError`] 形式返回。

use std::{fs, path::Path};

use tracing::debug;

use crate::{
    entry::{ConfigEntry, ParseResult},
    error::ConfigError,
};

/// SUB 控制字符，部分老旧编辑器会将其写在文件末尾。
pub(crate) const SUB: char = '\u{1a}';

/// 按照 INI 文件约定切分行，保留行序。
///
/// `\r\n` 视为单个换行；其余的 `\n`、`\r`、SUB 各自独立成为分隔符。
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split("\r\n")
        .flat_map(|chunk| chunk.split(['\n', '\r', SUB]))
}

/// 解析 INI 文本，忽略其中的删除指令。
///
/// 适用于只关心单个文件内容、没有“活动存储”可供删除的场景。
pub fn parse(text: &str) -> ParseResult {
    parse_with(text, |_, _| {})
}

/// 解析 INI 文本，并在遇到删除指令时立即调用 `on_delete(section, key)`。
///
/// # 教案式说明
/// - **意图（Why）**：`key =` 行要求把此前文件加载的同名条目从活动存储中移除。
///   删除必须在解析过程中即时生效，而不是延后到整段解析结束：同一文件里先置空、
///   后重新赋值的键最终应当保留新值；
/// - **契约（What）**：
///   - 回调只影响调用方持有的存储，已经累积在本次结果中的条目不受影响；
///   - 返回值保持行的出现顺序，其中可能包含重复身份，由合并顺序决定最终值。
pub fn parse_with<F>(text: &str, mut on_delete: F) -> ParseResult
where
    F: FnMut(&str, &str),
{
    let mut section = String::new();
    let mut entries: ParseResult = Vec::new();

    for raw in split_lines(text) {
        match classify(raw) {
            Line::Section(name) => section = name.to_owned(),
            Line::Assignment { key, value } if value.is_empty() => {
                debug!(section = section.as_str(), key, "deletion directive");
                on_delete(&section, key);
            }
            Line::Assignment { key, value } => {
                entries.push(ConfigEntry::new(section.as_str(), key, value));
            }
            Line::Continuation(part) => append_continuation(part, &section, &mut entries),
            Line::Ignored => {}
        }
    }

    entries
}

/// 单行的语法类别。解析器与写回器共用同一套判定，保证写出的行被原样读回。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Line<'a> {
    /// 合法的 section 头。
    Section(&'a str),
    /// `key = value`，`value` 已去掉行内注释；为空时即删除指令。
    Assignment { key: &'a str, value: &'a str },
    /// 续行内容，已去掉行内注释。
    Continuation(&'a str),
    /// 空行、注释、畸形 section 头、空键以及其它无法识别的行。
    Ignored,
}

pub(crate) fn classify(raw: &str) -> Line<'_> {
    let line = raw.trim();

    if let Some(rest) = line.strip_prefix('[') {
        // 右括号不在行尾的 section 头被忽略，当前 section 保持不变。
        return section_name(rest).map_or(Line::Ignored, Line::Section);
    }
    if line.starts_with(';') {
        return Line::Ignored;
    }

    match split_assignment(line) {
        Some(("", _)) => Line::Ignored,
        Some((key, rest)) => Line::Assignment {
            key,
            value: strip_inline_comment(rest),
        },
        None if is_continuation(raw) => Line::Continuation(strip_inline_comment(line)),
        None => Line::Ignored,
    }
}

/// 读取并解析单个文件。
///
/// 文件缺失时返回 [`ConfigError::NotFound`]，错误中携带传入的路径。
pub fn parse_file<F>(path: &Path, on_delete: F) -> Result<ParseResult, ConfigError>
where
    F: FnMut(&str, &str),
{
    let text = fs::read_to_string(path).map_err(|err| ConfigError::from_io(path, err))?;
    Ok(parse_with(&text, on_delete))
}

/// 去掉行内注释：在第一个 `" ;"` 或 `"\t;"` 处截断。
///
/// 紧贴在单词中间的 `;` 不被视为注释起点。
pub fn strip_inline_comment(value: &str) -> &str {
    let bytes = value.as_bytes();
    bytes
        .windows(2)
        .position(|pair| matches!(pair, [b' ' | b'\t', b';']))
        .map_or(value, |at| &value[..at])
}

/// `rest` 为去掉左括号后的文本；仅当唯一的 `]` 位于行尾时返回 section 名称。
fn section_name(rest: &str) -> Option<&str> {
    let (name, tail) = rest.split_once(']')?;
    tail.is_empty().then_some(name)
}

/// 在第一个 `=` 处切分，两侧各最多吞掉一个空格（等价于模式 ` ?= ?`）。
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let (key, rest) = line.split_once('=')?;
    let key = key.strip_suffix(' ').unwrap_or(key);
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    Some((key, rest))
}

/// 原始行恰好以一个空格开头、随后是非空白字符时视为续行。
fn is_continuation(raw: &str) -> bool {
    let mut chars = raw.chars();
    chars.next() == Some(' ') && chars.next().is_some_and(|c| !c.is_whitespace())
}

fn append_continuation(part: &str, section: &str, entries: &mut ParseResult) {
    if part.is_empty() {
        return;
    }
    // 上一条目不属于当前 section 时整行丢弃。
    if let Some(last) = entries.last_mut() {
        if last.section == section {
            last.value.push(' ');
            last.value.push_str(part);
        }
    }
}
