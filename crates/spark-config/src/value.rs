//! 存储文本的类型化解释。
//!
//! 存储内部只保存字符串，由读取方决定如何解释。本模块集中提供常用解释规则，
//! 避免各调用点各自实现一套略有差异的布尔或列表语法。

/// 可由配置文本解释出的类型。
///
/// ### 契约说明（What）
/// - `parse` 对输入先做首尾空白裁剪；无法解释时返回 `None`；
/// - `EXPECTED` 用于错误信息中的类型描述。
pub trait ConfigValueType: Sized {
    const EXPECTED: &'static str;

    fn parse(text: &str) -> Option<Self>;
}

impl ConfigValueType for i64 {
    const EXPECTED: &'static str = "integer";

    fn parse(text: &str) -> Option<Self> {
        text.trim().parse().ok()
    }
}

impl ConfigValueType for u64 {
    const EXPECTED: &'static str = "unsigned integer";

    fn parse(text: &str) -> Option<Self> {
        text.trim().parse().ok()
    }
}

impl ConfigValueType for f64 {
    const EXPECTED: &'static str = "float";

    fn parse(text: &str) -> Option<Self> {
        text.trim().parse().ok().filter(|v: &f64| v.is_finite())
    }
}

impl ConfigValueType for bool {
    const EXPECTED: &'static str = "boolean";

    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

/// 逗号分隔列表：逐项裁剪空白并丢弃空项。
pub fn parse_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}
