//! # 图片捕获模块（capture）
//!
//! ## 设计思路
//!
//! 该模块将“来源定位 → 字节抓取 → 规范化 → 写入剪贴板”按职责拆分为多个
//! 子模块，避免单文件膨胀与耦合。
//!
//! - `handler`：编排整条捕获流水线
//! - `locator`：从元素快照解析图片来源（七种形态，固定优先级）
//! - `fetcher`：抓取级联（内联 → 直连 → 对端代抓 → 渲染兜底）
//! - `normalizer`：统一解码为不透明 PNG，生成 JPEG 缩略图
//! - `clipboard_writer`：剪贴板策略级联与兜底重试
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 新同事快速上手
//!
//! 可以按下面顺序理解调用链：
//!
//! ```text
//! 宿主触发（用户点击捕获）
//!    ↓
//! service.rs（完整用户动作：捕获 + 入队 + 自动粘贴）
//!    ↓
//! handler.rs（统一编排 + 阶段耗时日志）
//!    ├─ locator.rs（来源定位，无副作用）
//!    ├─ fetcher.rs（抓取级联 + 体积/签名校验）
//!    ├─ normalizer.rs（白底平铺 + PNG 重编码 + 缩略图）
//!    └─ clipboard_writer.rs（策略级联 + 重试）
//!    ↓
//! 返回 CaptureOutcome / CaptureError
//! ```

mod clipboard_writer;
mod config;
mod error;
mod fetcher;
mod handler;
mod locator;
mod normalizer;
mod source;

pub use clipboard_writer::{ClipboardPayload, ClipboardStrategy, FocusFlag, StrategyFuture};
pub use config::{CaptureConfig, ClipboardRoute};
pub use error::{CaptureError, ClipboardFailure, ClipboardFailureKind};
pub use handler::{CaptureHandler, CaptureOutcome};
pub use source::{ImageReference, RasterImage};
