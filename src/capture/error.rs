//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载捕获链路中的所有终态错误，避免字符串拼接式错误处理。
//! 级联内部的单步失败不会出现在这里——它们在尝试边界被吞掉并记录日志，
//! 只有整条级联耗尽后才翻译为下列某个分类返回给编排层。

use std::fmt;

/// 剪贴板失败子类。不同子类映射不同的用户提示文案。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardFailureKind {
    /// 当前上下文不持有输入焦点，平台拒绝写入。
    FocusDenied,
    /// 该写入机制在当前平台/上下文不可用。
    Unsupported,
    /// 其余未分类失败。
    Unknown,
}

/// 剪贴板写入失败详情。
#[derive(Debug, Clone)]
pub struct ClipboardFailure {
    pub kind: ClipboardFailureKind,
    pub message: String,
}

impl ClipboardFailure {
    pub fn focus_denied(message: impl Into<String>) -> Self {
        Self {
            kind: ClipboardFailureKind::FocusDenied,
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self {
            kind: ClipboardFailureKind::Unsupported,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            kind: ClipboardFailureKind::Unknown,
            message: message.into(),
        }
    }
}

impl fmt::Display for ClipboardFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

/// 捕获链路统一错误类型。
///
/// 该类型会在上层被上转为 `AppError`，用户提示文案按分支选择。
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("定位失败：{0}")]
    Locate(String),

    #[error("抓取失败：{0}")]
    Fetch(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("剪贴板写入失败：{0}")]
    Clipboard(ClipboardFailure),

    #[error("未找到粘贴目标：{0}")]
    NoTarget(String),

    #[error("对端上下文不可达：{0}")]
    Channel(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),
}
