//! 单键写回：把一次 `set`/`delete` 落到写回文件中。
//!
//! # 教案式说明
//! - **意图（Why）**：运行期通过 `persist = true` 修改的配置需要在重启后依旧生效，
//!   因此写回器要在尽量保留原文件内容与格式的前提下，只改动目标键所在的行；
//! - **逻辑（How）**：
//!   1. 按解析器相同的规则切分并识别每一行（共用 [`classify`]），跟踪当前 section；
//!   2. 目标 section 的每个副本中，凡是为该键赋值的行都原地替换，紧随其后的续行一并去掉；
//!   3. 没有命中时，把新条目插在目标 section 最后一个副本的末尾；若紧接着就是下一个
//!      section 头，中间补一个空行；
//!   4. section 不存在时在文件末尾新建；
//! - **契约（What）**：
//!   - 删除以空值形式写出（`key =`），重新加载时即构成删除指令；
//!   - 只有能被解析器原样读回的条目才允许写回，见 [`check_persistable`]；
//!   - 文件锁与原子替换不在本模块职责内。

use std::{fs, path::Path};

use tracing::debug;

use super::parser::{Line, SUB, classify, split_lines, strip_inline_comment};
use crate::error::ConfigError;

/// 写回器契约。
///
/// ### 契约说明（What）
/// - `value` 为 `None` 时表示删除；
/// - `file` 为存储配置的写回文件（加载列表中的最后一个）；
/// - 存储在修改内存之前调用 [`validate`](Self::validate)，拒绝的条目既不写入内存也不落盘；
/// - 实现必须可以跨线程移动，存储会被服务线程独占持有。
pub trait PersistenceWriter: Send + Sync {
    fn save(
        &self,
        section: &str,
        key: &str,
        value: Option<&str>,
        file: &Path,
    ) -> Result<(), ConfigError>;

    /// 检查条目能否被写回。默认接受一切。
    fn validate(&self, _section: &str, _key: &str, _value: Option<&str>) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// 默认写回器：就地改写 INI 文件中的单个键。
#[derive(Clone, Copy, Debug, Default)]
pub struct IniFileWriter;

impl PersistenceWriter for IniFileWriter {
    fn save(
        &self,
        section: &str,
        key: &str,
        value: Option<&str>,
        file: &Path,
    ) -> Result<(), ConfigError> {
        check_persistable(section, key, value)?;
        let current = fs::read_to_string(file).map_err(|err| ConfigError::from_io(file, err))?;
        let updated = rewrite_entry(&current, section, key, value.unwrap_or(""));
        fs::write(file, updated).map_err(|err| ConfigError::from_io(file, err))?;
        debug!(
            file = %file.display(),
            section,
            key,
            deleted = value.is_none(),
            "persisted configuration entry"
        );
        Ok(())
    }

    fn validate(&self, section: &str, key: &str, value: Option<&str>) -> Result<(), ConfigError> {
        check_persistable(section, key, value)
    }
}

/// 丢弃所有写回请求，适用于只读部署或测试。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopWriter;

impl PersistenceWriter for NoopWriter {
    fn save(&self, _: &str, _: &str, _: Option<&str>, _: &Path) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// 判断条目写成 INI 行后能否被解析器原样读回。
///
/// ### 拒绝的情形（What）
/// - 任一部分含换行或 SUB：写出后会被切成多行；
/// - section 含 `]`：不再是合法的 section 头；
/// - 键为空、含 `=`、以空白开头，或以 `;`/`[` 开头：读回时不是同一个键；
/// - 值为空（读回即删除指令）、以空白结尾（加载时被裁掉），或含 `" ;"`/`"\t;"`（被当作行内注释截断）。
pub fn check_persistable(section: &str, key: &str, value: Option<&str>) -> Result<(), ConfigError> {
    match unpersistable_reason(section, key, value) {
        Some(reason) => Err(ConfigError::Unpersistable {
            section: section.to_owned(),
            key: key.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

fn unpersistable_reason(section: &str, key: &str, value: Option<&str>) -> Option<&'static str> {
    let breaks = |text: &str| text.contains(['\n', '\r', SUB]);

    if breaks(section) || breaks(key) || value.is_some_and(breaks) {
        return Some("line breaks cannot be written to a single line");
    }
    if section.contains(']') {
        return Some("section name contains `]`");
    }
    if key.is_empty() || key.contains('=') {
        return Some("key is empty or contains `=`");
    }
    if key.starts_with(char::is_whitespace) || key.starts_with([';', '[']) {
        return Some("key would not read back as an assignment");
    }
    let value = value?;
    if value.is_empty() {
        return Some("an empty value reads back as a deletion");
    }
    if value.ends_with(char::is_whitespace) {
        return Some("trailing whitespace is trimmed on load");
    }
    if strip_inline_comment(value).len() != value.len() {
        return Some("value contains an inline comment marker");
    }
    None
}

/// 在 INI 文本中写入（或以空值覆盖）单个条目，返回新的文件内容。
///
/// 输出统一使用 `\n` 换行、以换行结尾，并去掉文件末尾的空行。
pub fn rewrite_entry(content: &str, section: &str, key: &str, value: &str) -> String {
    let entry = render_entry(key, value);
    let mut lines: Vec<String> = Vec::new();
    let mut current = "";
    let mut replaced = false;
    let mut dropping = false;
    // 目标 section 最后一个副本中、最后一个非空行之后的位置；无 section 头的前缀属于空 section。
    let mut insert_at = section.is_empty().then_some(0);

    for raw in split_lines(content) {
        let line = classify(raw);
        if dropping {
            match line {
                Line::Continuation(_) => continue,
                Line::Ignored => {}
                _ => dropping = false,
            }
        }

        match line {
            Line::Section(name) => {
                current = name;
                lines.push(raw.to_owned());
                if current == section {
                    insert_at = Some(lines.len());
                }
            }
            Line::Assignment { key: found, value: old } if current == section && found == key => {
                lines.push(entry.clone());
                replaced = true;
                // 续行只会接到非空值上；删除指令后面的续行属于更早的条目。
                dropping = !old.is_empty();
                insert_at = Some(lines.len());
            }
            _ => {
                lines.push(raw.to_owned());
                if current == section && !raw.trim().is_empty() {
                    insert_at = Some(lines.len());
                }
            }
        }
    }

    if !replaced {
        match insert_at {
            Some(at) => {
                let before_header = lines
                    .get(at)
                    .is_some_and(|next| matches!(classify(next), Line::Section(_)));
                if before_header {
                    lines.insert(at, String::new());
                }
                lines.insert(at, entry);
            }
            None => {
                trim_trailing_blank(&mut lines);
                if !lines.is_empty() {
                    lines.push(String::new());
                }
                lines.push(format!("[{section}]"));
                lines.push(entry);
            }
        }
    }

    finish(lines)
}

fn render_entry(key: &str, value: &str) -> String {
    if value.is_empty() {
        format!("{key} =")
    } else {
        format!("{key} = {value}")
    }
}

fn trim_trailing_blank(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
}

fn finish(mut lines: Vec<String>) -> String {
    trim_trailing_blank(&mut lines);
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ConfigErrorKind, ini::parser::parse};

    #[test]
    fn replaces_existing_key_in_place() {
        let before = "[db]\nmax_size = 100 ; tuned\nname = widget\n";
        let after = rewrite_entry(before, "db", "max_size", "200");
        assert_eq!(after, "[db]\nmax_size = 200\nname = widget\n");
    }

    #[test]
    fn only_touches_the_target_section() {
        let before = "[a]\nk = 1\n\n[b]\nk = 2\n";
        let after = rewrite_entry(before, "b", "k", "3");
        assert_eq!(after, "[a]\nk = 1\n\n[b]\nk = 3\n");
    }

    #[test]
    fn inserts_before_next_section_when_key_is_new() {
        let before = "[a]\nk = 1\n\n[b]\nk = 2\n";
        let after = rewrite_entry(before, "a", "fresh", "yes");
        assert_eq!(after, "[a]\nk = 1\nfresh = yes\n\n[b]\nk = 2\n");
    }

    #[test]
    fn separates_inserted_entry_from_adjacent_header() {
        let after = rewrite_entry("[a]\nk = 1\n[b]\n", "a", "j", "2");
        assert_eq!(after, "[a]\nk = 1\nj = 2\n\n[b]\n");
    }

    #[test]
    fn appends_at_end_of_last_section() {
        let after = rewrite_entry("[a]\nk = 1\n\n\n", "a", "j", "2");
        assert_eq!(after, "[a]\nk = 1\nj = 2\n");
    }

    #[test]
    fn creates_missing_section() {
        let after = rewrite_entry("[a]\nk = 1\n", "log", "level", "info");
        assert_eq!(after, "[a]\nk = 1\n\n[log]\nlevel = info\n");
    }

    #[test]
    fn creates_section_in_empty_file() {
        assert_eq!(rewrite_entry("", "log", "level", "info"), "[log]\nlevel = info\n");
    }

    #[test]
    fn headerless_entries_go_before_the_first_section() {
        let after = rewrite_entry("[a]\nk = 1\n", "", "top", "1");
        assert_eq!(after, "top = 1\n\n[a]\nk = 1\n");
        assert_eq!(parse(&after)[0].section, "");
    }

    #[test]
    fn deletion_is_written_as_empty_value() {
        let after = rewrite_entry("[db]\nname = widget\n", "db", "name", "");
        assert_eq!(after, "[db]\nname =\n");
    }

    #[test]
    fn prefix_keys_and_comments_are_not_matched() {
        let before = "[s]\n; name = old\nnamespace = x\nname = y\n";
        let after = rewrite_entry(before, "s", "name", "z");
        assert_eq!(after, "[s]\n; name = old\nnamespace = x\nname = z\n");
    }

    #[test]
    fn every_copy_of_a_repeated_section_is_updated() {
        let before = "[db]\nk = 1\n\n[log]\nlevel = info\n\n[db]\nk = 2\n";
        let after = rewrite_entry(before, "db", "k", "3");
        assert_eq!(after, "[db]\nk = 3\n\n[log]\nlevel = info\n\n[db]\nk = 3\n");

        let fresh = rewrite_entry(before, "db", "new", "x");
        assert!(fresh.ends_with("[db]\nk = 2\nnew = x\n"), "{fresh}");
    }

    #[test]
    fn repeated_key_is_blanked_everywhere_on_delete() {
        let after = rewrite_entry("[s]\nk = 1\nk = 2\n", "s", "k", "");
        assert_eq!(after, "[s]\nk =\nk =\n");
        assert!(parse(&after).is_empty());
    }

    #[test]
    fn continuation_of_replaced_value_is_dropped() {
        let before = "[db]\nname = widget\n extra\nmax = 1\n";
        let after = rewrite_entry(before, "db", "name", "gadget");
        assert_eq!(after, "[db]\nname = gadget\nmax = 1\n");
    }

    #[test]
    fn keys_are_matched_the_way_the_parser_reads_them() {
        // 解析器读到的键是 `k2 `（只吞掉一个空格），缩进的行也照常识别。
        let before = "[s]\nk2  =  v2\n  k = v\n";
        let after = rewrite_entry(before, "s", "k2 ", "v3");
        let after = rewrite_entry(&after, "s", "k", "w");
        assert_eq!(after, "[s]\nk2  = v3\nk = w\n");

        let entries = parse(&after);
        assert_eq!(entries[0].key, "k2 ");
        assert_eq!(entries[0].value, "v3");
    }

    #[test]
    fn values_that_cannot_be_read_back_are_rejected() {
        for (key, value) in [
            ("k", "two\nlines"),
            ("k", "kept ; cut"),
            ("k", "kept\t; cut"),
            ("k", "trailing "),
            ("k", ""),
            ("", "v"),
            ("a=b", "v"),
            ("; k", "v"),
            (" k", "v"),
        ] {
            let err = check_persistable("s", key, Some(value)).unwrap_err();
            assert_eq!(err.kind(), ConfigErrorKind::Unpersistable, "{key:?} = {value:?}");
        }
        let err = check_persistable("a]b", "k", None).unwrap_err();
        assert_eq!(err.kind(), ConfigErrorKind::Unpersistable);

        check_persistable("s", "url", Some("http://h/?a=1;b=2")).expect("semicolon inside a word");
        check_persistable("s", "k", None).expect("deletion");
    }

    #[test]
    fn file_writer_rewrites_disk_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("local.ini");
        fs::write(&path, "[db]\nmax_size = 100\n").expect("write fixture");

        IniFileWriter
            .save("db", "max_size", Some("200"), &path)
            .expect("save");

        let content = fs::read_to_string(&path).expect("read back");
        assert_eq!(content, "[db]\nmax_size = 200\n");
    }

    #[test]
    fn file_writer_refuses_unpersistable_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("local.ini");
        fs::write(&path, "[db]\nname = widget\n").expect("write fixture");

        let err = IniFileWriter
            .save("db", "name", Some("a ; b"), &path)
            .unwrap_err();
        assert_eq!(err.kind(), ConfigErrorKind::Unpersistable);
        assert_eq!(fs::read_to_string(&path).unwrap(), "[db]\nname = widget\n");
    }

    #[test]
    fn file_writer_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.ini");
        let err = IniFileWriter.save("db", "k", Some("v"), &path).unwrap_err();
        assert_eq!(err.kind(), ConfigErrorKind::NotFound);
    }
}
