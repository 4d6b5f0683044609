//! # 网页图片捕获与剪贴板搬运引擎 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              宿主接入层（内容脚本宿主 / 演示程序）          │
//! │                                                          │
//! │  dom::Document 快照 ── paste::PageAdapter ── Notifier    │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ Result<T, AppError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            引擎 (Rust)                           │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  ├─ service ──── 完整用户动作：捕获 + 入队 + 自动粘贴      │
//! │  │                                                       │
//! │  ├─ capture ──── 定位·抓取·规范化·写剪贴板流水线          │
//! │  │   ├─ locator        七种元素形态 → ImageReference     │
//! │  │   ├─ fetcher        内联/直连/对端/渲染兜底级联        │
//! │  │   ├─ normalizer     白底 PNG 规范化 + JPEG 缩略图     │
//! │  │   └─ clipboard_writer 策略级联 + 退避重试             │
//! │  │                                                       │
//! │  ├─ peer ─────── 跨上下文消息协议（关联 id + 超时）        │
//! │  ├─ queue ────── 有界图片/提示词队列（新在前，满即淘汰）    │
//! │  ├─ store ────── KvStore trait + JSON 文件/内存实现       │
//! │  ├─ panel ────── 面板选中态 + 位置持久化                  │
//! │  └─ paste ────── 粘贴编排状态机 + 主机白名单              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，服务层所有入口的返回类型 |
//! | [`service`] | 一次用户动作的编排：捕获、入队、白名单命中时自动粘贴 |
//! | [`capture`] | 定位 → 抓取 → 规范化 → 写剪贴板的核心流水线 |
//! | [`peer`] | 页面上下文与特权上下文之间的请求/响应消息通道 |
//! | [`queue`] | 有界持久化队列（图片 + 提示词，提示词按内容去重） |
//! | [`store`] | 键值持久化抽象与 JSON 文件/内存实现 |
//! | [`panel`] | 浮动面板的选中状态与位置持久化 |
//! | [`paste`] | 输入框定位、模板插入、聚焦、粘贴触发的状态链 |
//! | [`dom`] | 宿主页面的只读快照模型（元素、文档、像素表面） |

pub mod capture;
pub mod dom;
pub mod error;
pub mod panel;
pub mod paste;
pub mod peer;
pub mod queue;
pub mod service;
pub mod store;
