use std::fmt;

use serde::{Deserialize, Serialize};

/// 配置项身份：`(section, key)` 二元组。
///
/// ## 设计目的（Why）
/// - 合并后的存储以该类型为键，保证同一身份至多存在一个有效值；
/// - 派生的 `Ord` 先比较 `section` 再比较 `key`，全量导出时的字典序即由此而来。
///
/// ## 契约定义（What）
/// - 大小写与空白均按原样保存，`[DB]` 与 `[db]` 是两个不同的 section。
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub section: String,
    pub key: String,
}

impl EntryKey {
    pub fn new<S, K>(section: S, key: K) -> Self
    where
        S: Into<String>,
        K: Into<String>,
    {
        Self {
            section: section.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.key)
    }
}

/// 单条配置：`(section, key) -> value`。
///
/// ### 契约说明（What）
/// - `value` 始终以文本形式保存；整数、布尔等解释由调用方（或 [`crate::value`]）完成。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub section: String,
    pub key: String,
    pub value: String,
}

impl ConfigEntry {
    pub fn new<S, K, V>(section: S, key: K, value: V) -> Self
    where
        S: Into<String>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            section: section.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    /// 返回条目的身份。
    pub fn identity(&self) -> EntryKey {
        EntryKey::new(self.section.clone(), self.key.clone())
    }

    /// 拆分为 `(身份, 值)`，供存储插入时避免额外克隆。
    pub fn into_parts(self) -> (EntryKey, String) {
        (
            EntryKey {
                section: self.section,
                key: self.key,
            },
            self.value,
        )
    }
}

/// 单个文件的解析结果，保持行出现的先后顺序。
///
/// 重复的 `(section, key)` 是预期情况：合并顺序决定最终值。
pub type ParseResult = Vec<ConfigEntry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_orders_by_section_then_key() {
        let mut keys = vec![
            EntryKey::new("log", "level"),
            EntryKey::new("db", "name"),
            EntryKey::new("db", "max_size"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                EntryKey::new("db", "max_size"),
                EntryKey::new("db", "name"),
                EntryKey::new("log", "level"),
            ]
        );
    }

    #[test]
    fn into_parts_keeps_fields() {
        let (key, value) = ConfigEntry::new("db", "name", "widget").into_parts();
        assert_eq!(key.to_string(), "db.name");
        assert_eq!(value, "widget");
    }
}
