//! INI 文件格式：读取（解析）与单键写回。
//!
//! - [`parser`]：文本到有序条目列表，处理 section、注释、续行与删除指令；
//! - [`writer`]：把一次修改写回文件，尽量保留其余内容与格式。

pub mod parser;
pub mod writer;
