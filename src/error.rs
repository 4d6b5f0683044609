//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，替代各模块中分散的
//! `.map_err(|e| e.to_string())`、`format!(...)`、`expect()` 等不一致模式。
//!
//! 服务层与宿主接入层统一返回 `Result<T, AppError>`，
//! 嵌入方通过 `Serialize` 获得结构化的错误信息。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `CaptureError` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，便于跨边界传递。

use serde::Serialize;

use crate::capture::CaptureError;

/// 应用级统一错误类型
///
/// 服务层所有入口均返回此类型，确保嵌入方收到一致的错误格式。
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 捕获流水线错误（定位 / 抓取 / 解码 / 写剪贴板）
    #[error("{0}")]
    Capture(#[from] CaptureError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 持久化存储不可用
    #[error("存储错误: {0}")]
    Storage(String),

    /// 输入模拟失败
    #[error("输入模拟失败: {0}")]
    Input(String),
}

/// 将错误序列化为人类可读的字符串，便于跨边界传递。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
